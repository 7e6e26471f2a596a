use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::item::{normalize_why, Item, ItemState};

/// Mutation to apply to an item's fields.
///
/// `Session::update` reads the row, applies these in order and writes the
/// whole row back, so derived columns are recomputed on every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldMutation {
    SetWhy(Option<String>),
    SetState(ItemState),
    /// Bump `touchCount` and stamp `lastTouchedAt`.
    Touch(DateTime<Utc>),
    SetStarred(bool),
    SetLastChanceShown(DateTime<Utc>),
}

impl FieldMutation {
    pub fn apply(&self, item: &mut Item) {
        match self {
            FieldMutation::SetWhy(why) => item.why = normalize_why(why.as_deref()),
            FieldMutation::SetState(state) => item.state = *state,
            FieldMutation::Touch(at) => {
                item.touch_count = item.touch_count.saturating_add(1);
                item.last_touched_at = Some(*at);
            }
            FieldMutation::SetStarred(starred) => item.is_starred = *starred,
            FieldMutation::SetLastChanceShown(at) => item.last_chance_shown_at = Some(*at),
        }
    }
}

/// Apply `mutations` in order.
pub fn apply_all(item: &mut Item, mutations: &[FieldMutation]) {
    for m in mutations {
        m.apply(item);
    }
}
