//! Daily sweep and review buckets.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{CompactionPolicy, MaintenanceConfig};
use crate::decay::{self, DecayPolicy};
use crate::error::Result;
use crate::eviction::{plan_eviction, CapPolicy, EvictionReason};
use crate::item::{Item, ItemState};
use crate::operation::{NewOp, Op};
use crate::query::{ItemQuery, ListOptions};
use crate::sqlite_store::SqliteStore;

/// States the decay sweep looks at. `dead` has nowhere left to go.
const SWEEP_STATES: [ItemState; 4] = [
    ItemState::Fresh,
    ItemState::Fading,
    ItemState::Critical,
    ItemState::Archived,
];

const UNCLAIMED_LIMIT: usize = 25;
const DEATH_ROW_SCAN: usize = 50;
const DEATH_ROW_LIMIT: usize = 10;
const STARRED_LIMIT: usize = 25;

/// What one maintenance run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub scanned: usize,
    pub decayed: usize,
    pub evicted: usize,
    pub eviction_reason: Option<EvictionReason>,
    pub compacted: usize,
}

/// The three lists the popup shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewBuckets {
    /// Newest items with no reason yet.
    pub unclaimed: Vec<Item>,
    /// Critical items not yet surfaced as a last chance.
    pub death_row: Vec<Item>,
    pub starred: Vec<Item>,
}

pub struct MaintenanceService {
    store: Arc<SqliteStore>,
    decay: DecayPolicy,
    cap: CapPolicy,
    compaction: CompactionPolicy,
    config: MaintenanceConfig,
}

impl MaintenanceService {
    pub fn new(
        store: Arc<SqliteStore>,
        decay: DecayPolicy,
        cap: CapPolicy,
        compaction: CompactionPolicy,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            store,
            decay,
            cap,
            compaction,
            config,
        }
    }

    /// Decay sweep, cap enforcement and log compaction in one transaction.
    ///
    /// Safe to re-run: decay only moves forward and eviction only removes
    /// eligible rows.
    pub fn run_daily_maintenance(&self, now: DateTime<Utc>) -> Result<MaintenanceReport> {
        let report = self.store.transaction(|s| {
            let mut report = MaintenanceReport::default();

            let mut updates = Vec::new();
            for state in SWEEP_STATES {
                let batch = s.scan_state(state, self.config.scan_per_state)?;
                report.scanned += batch.len();
                for item in &batch {
                    if let Some(next) = decay::next_state(item, now, &self.decay) {
                        updates.push(Item {
                            state: next,
                            ..item.clone()
                        });
                    }
                }
            }
            s.bulk_put(&updates)?;
            report.decayed = updates.len();

            let total = s.count(&ItemQuery::all())?;
            if total > self.cap.max_items {
                let meta = s.list_meta_for_cap(self.config.meta_limit)?;
                let plan = plan_eviction(&meta, &self.cap);
                if !plan.is_empty() {
                    let deletes: Vec<_> = plan
                        .delete_ids
                        .iter()
                        .map(|id| NewOp::new(*id, now, Op::Delete).into_record())
                        .collect();
                    s.bulk_append(&deletes)?;
                    report.evicted = s.bulk_delete(&plan.delete_ids)?;
                    report.eviction_reason = Some(plan.reason);
                }
            }

            report.compacted = s.compact(self.compaction.effective_keep())?;
            Ok(report)
        })?;

        tracing::info!(
            scanned = report.scanned,
            decayed = report.decayed,
            evicted = report.evicted,
            compacted = report.compacted,
            "daily maintenance complete"
        );
        Ok(report)
    }

    /// Read-only composition of the popup's review lists.
    pub fn get_review_buckets(&self, _now: DateTime<Utc>) -> Result<ReviewBuckets> {
        self.store.read(|s| {
            let unclaimed = s
                .list(&ItemQuery::with_why(false), &ListOptions::limit(UNCLAIMED_LIMIT))?
                .items;
            let death_row = s
                .list(
                    &ItemQuery::in_state(ItemState::Critical),
                    &ListOptions::limit(DEATH_ROW_SCAN),
                )?
                .items
                .into_iter()
                .filter(|item| item.last_chance_shown_at.is_none())
                .take(DEATH_ROW_LIMIT)
                .collect();
            let starred = s
                .list(&ItemQuery::starred(), &ListOptions::limit(STARRED_LIMIT))?
                .items;
            Ok(ReviewBuckets {
                unclaimed,
                death_row,
                starred,
            })
        })
    }
}
