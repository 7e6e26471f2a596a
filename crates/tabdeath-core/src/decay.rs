//! Temporal decay of captured items.
//!
//! Age bands, inclusive upper bounds:
//! ```text
//! 0..=fresh → fresh, ..=fading → fading, ..=critical → critical,
//! ..=archive → archived, beyond → dead
//! ```
//!
//! Decay only moves forward. An item that is already further along than its
//! age suggests (for example after the policy thresholds were raised) keeps
//! its current state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::item::{Item, ItemState};

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Day thresholds for each band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayPolicy {
    pub fresh_days: i64,
    pub fading_days: i64,
    pub critical_days: i64,
    pub archive_days: i64,
    /// Starred items keep their state while starred.
    pub stars_pause_decay: bool,
}

impl Default for DecayPolicy {
    fn default() -> Self {
        Self {
            fresh_days: 7,
            fading_days: 21,
            critical_days: 30,
            archive_days: 90,
            stars_pause_decay: true,
        }
    }
}

/// Whole days elapsed, floor division. Negative when `now` precedes `created_at`.
pub fn age_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let ms = (now - created_at).num_milliseconds();
    ms.div_euclid(MS_PER_DAY)
}

/// First band whose upper bound contains `days`.
pub fn state_for_age(days: i64, policy: &DecayPolicy) -> ItemState {
    if days <= policy.fresh_days {
        ItemState::Fresh
    } else if days <= policy.fading_days {
        ItemState::Fading
    } else if days <= policy.critical_days {
        ItemState::Critical
    } else if days <= policy.archive_days {
        ItemState::Archived
    } else {
        ItemState::Dead
    }
}

/// Next state for `item` at `now`, or `None` when nothing changes.
pub fn next_state(item: &Item, now: DateTime<Utc>, policy: &DecayPolicy) -> Option<ItemState> {
    if item.is_starred && policy.stars_pause_decay {
        return None;
    }
    let candidate = state_for_age(age_days(item.created_at, now), policy);
    if candidate.rank() > item.state.rank() {
        Some(candidate)
    } else {
        None
    }
}

/// Apply decay to `item`, returning it unchanged when paused or not advancing.
pub fn evaluate(item: &Item, now: DateTime<Utc>, policy: &DecayPolicy) -> Item {
    match next_state(item, now, policy) {
        Some(state) => Item {
            state,
            ..item.clone()
        },
        None => item.clone(),
    }
}
