//! Capacity eviction planning.
//!
//! Starred items are never proposed. Among the rest, candidates come in
//! three pools, most disposable first, each oldest first:
//!
//! 1. `dead`
//! 2. `archived`
//! 3. `critical` items whose last-chance prompt was already shown
//!
//! The plan lists every candidate; it does not stop at the minimal excess.

use serde::{Deserialize, Serialize};

use crate::item::{ItemId, ItemMeta, ItemState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapPolicy {
    pub max_items: usize,
}

impl Default for CapPolicy {
    fn default() -> Self {
        Self { max_items: 1000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    OverCap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionPlan {
    pub delete_ids: Vec<ItemId>,
    pub reason: EvictionReason,
}

impl EvictionPlan {
    pub fn is_empty(&self) -> bool {
        self.delete_ids.is_empty()
    }
}

/// Order the eviction candidates in `meta`.
///
/// `_cap` is accepted so callers can swap in a policy that trims to the
/// ceiling; this one returns every eligible id.
pub fn plan_eviction(meta: &[ItemMeta], _cap: &CapPolicy) -> EvictionPlan {
    let mut dead = Vec::new();
    let mut archived = Vec::new();
    let mut reviewed_critical = Vec::new();

    for m in meta.iter().filter(|m| !m.is_starred) {
        match m.state {
            ItemState::Dead => dead.push(m),
            ItemState::Archived => archived.push(m),
            ItemState::Critical if m.last_chance_shown_at.is_some() => reviewed_critical.push(m),
            _ => {}
        }
    }

    // Stable sort keeps input order for equal timestamps.
    for pool in [&mut dead, &mut archived, &mut reviewed_critical] {
        pool.sort_by_key(|m| m.created_at);
    }

    let delete_ids = dead
        .into_iter()
        .chain(archived)
        .chain(reviewed_critical)
        .map(|m| m.id)
        .collect();

    EvictionPlan {
        delete_ids,
        reason: EvictionReason::OverCap,
    }
}
