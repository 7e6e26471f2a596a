use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::item::ItemState;

/// Upper bound for a single `list` page.
pub const MAX_LIST_LIMIT: usize = 200;
/// Upper bound for `list_starred_oldest`.
pub const MAX_STARRED_LIMIT: usize = 50;
/// Upper bound for `list_meta_for_cap`.
pub const MAX_META_LIMIT: usize = 10_000;
/// Upper bound for `search_archived` hits.
pub const MAX_SEARCH_LIMIT: usize = 50;
/// How many of the newest archived rows `search_archived` scans.
pub const SEARCH_SCAN_WINDOW: usize = 1000;
/// Upper bound for an op log page.
pub const MAX_OPS_LIMIT: usize = 500;

/// Filter over the item projection. Every set field narrows the result.
///
/// ```json
/// {"state": "critical", "hasWhy": false, "createdAtAfter": "2026-01-01T00:00:00.000Z"}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemQuery {
    pub state: Option<ItemState>,
    pub states: Vec<ItemState>,
    pub is_starred: Option<bool>,
    pub has_why: Option<bool>,
    pub domain: Option<String>,
    /// Inclusive lower bound on `createdAt`.
    pub created_at_after: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `createdAt`.
    pub created_at_before: Option<DateTime<Utc>>,
}

impl ItemQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn in_state(state: ItemState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    pub fn starred() -> Self {
        Self {
            is_starred: Some(true),
            ..Self::default()
        }
    }

    pub fn with_why(has_why: bool) -> Self {
        Self {
            has_why: Some(has_why),
            ..Self::default()
        }
    }

    /// The single predicate `count` uses: state, then star flag, then
    /// has-why. Other filters are ignored by `count`.
    pub fn dominant(&self) -> ItemQuery {
        if let Some(state) = self.state {
            ItemQuery::in_state(state)
        } else if let Some(starred) = self.is_starred {
            ItemQuery {
                is_starred: Some(starred),
                ..Self::default()
            }
        } else if let Some(has_why) = self.has_why {
            ItemQuery::with_why(has_why)
        } else {
            ItemQuery::all()
        }
    }
}

/// Page size and cursor for descending `list` calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListOptions {
    pub limit: usize,
    /// Return only items created strictly before this instant.
    pub cursor: Option<DateTime<Utc>>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            cursor: None,
        }
    }
}

impl ListOptions {
    pub fn limit(limit: usize) -> Self {
        Self {
            limit,
            cursor: None,
        }
    }
}

/// One page of results. `next_cursor` is set only when the page is full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T, C> {
    pub items: Vec<T>,
    pub next_cursor: Option<C>,
}

/// Clamp a caller-supplied limit into `1..=max`.
pub fn clamp_limit(limit: usize, max: usize) -> usize {
    limit.clamp(1, max)
}
