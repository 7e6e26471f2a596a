//! Capture and per-item user actions.
//!
//! Each method is one transaction: the op record and the projection change
//! commit together. Operations on an id that is not in the projection do
//! nothing and log no op.

use std::sync::Arc;

use uuid::Uuid;

use crate::clock::Clock;
use crate::config::StarConfig;
use crate::error::Result;
use crate::item::{normalize_why, CaptureSnapshot, Item, ItemId};
use crate::operation::{NewOp, Op};
use crate::query::ItemQuery;
use crate::sqlite_store::{Session, SqliteStore};
use crate::store::FieldMutation;

pub struct CaptureService {
    store: Arc<SqliteStore>,
    clock: Arc<dyn Clock>,
    stars: StarConfig,
}

impl CaptureService {
    pub fn new(store: Arc<SqliteStore>, clock: Arc<dyn Clock>, stars: StarConfig) -> Self {
        Self {
            store,
            clock,
            stars,
        }
    }

    /// Record a closed tab as a fresh item. Returns the new id.
    pub fn capture_closed_tab(&self, snapshot: CaptureSnapshot) -> Result<ItemId> {
        let id = self.store.transaction(|s| insert_captured(s, &snapshot))?;
        tracing::debug!(%id, domain = %snapshot.domain, "captured closed tab");
        Ok(id)
    }

    /// Capture a whole batch in one transaction.
    pub fn capture_closed_tabs(&self, snapshots: &[CaptureSnapshot]) -> Result<Vec<ItemId>> {
        if snapshots.is_empty() {
            return Ok(Vec::new());
        }
        let ids = self.store.transaction(|s| {
            snapshots
                .iter()
                .map(|snapshot| insert_captured(s, snapshot))
                .collect::<Result<Vec<_>>>()
        })?;
        tracing::debug!(count = ids.len(), "captured closed tab batch");
        Ok(ids)
    }

    /// Set or clear the reason note.
    pub fn annotate_why(&self, id: ItemId, why: Option<&str>) -> Result<()> {
        let why = normalize_why(why);
        let at = self.clock.now();
        self.store.transaction(|s| {
            if s.get(id)?.is_none() {
                return Ok(());
            }
            s.append(&NewOp::new(id, at, Op::SetWhy { why: why.clone() }).into_record())?;
            s.update(id, &[FieldMutation::SetWhy(why.clone())])?;
            Ok(())
        })
    }

    /// Note that the item was reopened.
    pub fn touch(&self, id: ItemId) -> Result<()> {
        let at = self.clock.now();
        self.store.transaction(|s| {
            if s.get(id)?.is_none() {
                return Ok(());
            }
            s.append(&NewOp::new(id, at, Op::Touch).into_record())?;
            s.update(id, &[FieldMutation::Touch(at)])?;
            Ok(())
        })
    }

    /// Star `id`, unstarring the oldest starred item first when every slot
    /// is taken. Missing or already-starred ids are left alone.
    pub fn star(&self, id: ItemId) -> Result<()> {
        let at = self.clock.now();
        let max_stars = self.stars.max_stars;
        let bumped = self.store.transaction(|s| {
            match s.get(id)? {
                Some(item) if !item.is_starred => {}
                _ => return Ok(None),
            }

            let mut bumped = None;
            if s.count(&ItemQuery::starred())? >= max_stars {
                if let Some(oldest) = s.list_starred_oldest(1)?.into_iter().next() {
                    s.append(&NewOp::new(oldest.id, at, Op::Unstar).into_record())?;
                    s.update(oldest.id, &[FieldMutation::SetStarred(false)])?;
                    bumped = Some(oldest.id);
                }
            }

            s.append(&NewOp::new(id, at, Op::Star).into_record())?;
            s.update(id, &[FieldMutation::SetStarred(true)])?;
            Ok(bumped)
        })?;

        if let Some(old) = bumped {
            tracing::debug!(%id, unstarred = %old, "star slots full, released oldest");
        }
        Ok(())
    }

    pub fn unstar(&self, id: ItemId) -> Result<()> {
        let at = self.clock.now();
        self.store.transaction(|s| {
            if s.get(id)?.is_none() {
                return Ok(());
            }
            s.append(&NewOp::new(id, at, Op::Unstar).into_record())?;
            s.update(id, &[FieldMutation::SetStarred(false)])?;
            Ok(())
        })
    }

    pub fn delete(&self, id: ItemId) -> Result<()> {
        let at = self.clock.now();
        self.store.transaction(|s| {
            if s.get(id)?.is_none() {
                return Ok(());
            }
            s.append(&NewOp::new(id, at, Op::Delete).into_record())?;
            s.delete(id)?;
            Ok(())
        })
    }

    /// Stamp `lastChanceShownAt` on each id that has not been shown yet.
    /// The first stamp is kept. No op records are written.
    pub fn mark_last_chance_shown(&self, ids: &[ItemId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let at = self.clock.now();
        self.store.transaction(|s| {
            for id in ids {
                match s.get(*id)? {
                    Some(item) if item.last_chance_shown_at.is_none() => {
                        s.update(*id, &[FieldMutation::SetLastChanceShown(at)])?;
                    }
                    _ => {}
                }
            }
            Ok(())
        })
    }
}

fn insert_captured(s: &Session<'_>, snapshot: &CaptureSnapshot) -> Result<ItemId> {
    let item = Item::fresh(Uuid::new_v4(), snapshot);
    let op = Op::Create {
        url: item.url.clone(),
        title: item.title.clone(),
        domain: item.domain.clone(),
        why: item.why.clone(),
    };
    s.append(&NewOp::new(item.id, item.created_at, op).into_record())?;
    s.put(&item)?;
    Ok(item.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::item::ItemState;
    use crate::operation::OpKind;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap()
    }

    fn setup() -> (Arc<SqliteStore>, Arc<ManualClock>, CaptureService) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(start()));
        let service = CaptureService::new(store.clone(), clock.clone(), StarConfig::default());
        (store, clock, service)
    }

    fn snapshot(title: &str, at: DateTime<Utc>) -> CaptureSnapshot {
        CaptureSnapshot {
            url: format!("https://example.com/{}", title),
            title: title.into(),
            domain: "example.com".into(),
            at,
            why: None,
        }
    }

    fn op_kinds(store: &SqliteStore, id: ItemId) -> Vec<OpKind> {
        store
            .read(|s| s.all_ops())
            .unwrap()
            .into_iter()
            .filter(|r| r.item_id == id)
            .map(|r| r.kind())
            .collect()
    }

    #[test]
    fn capture_writes_item_and_create_op() {
        let (store, _, service) = setup();
        let mut snap = snapshot("a", start());
        snap.why = Some("  read later ".into());
        let id = service.capture_closed_tab(snap).unwrap();

        let item = store.read(|s| s.get(id)).unwrap().unwrap();
        assert_eq!(item.state, ItemState::Fresh);
        assert_eq!(item.touch_count, 0);
        assert!(!item.is_starred);
        assert_eq!(item.why.as_deref(), Some("read later"));

        let ops = store.read(|s| s.all_ops()).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(
            ops[0].op,
            Op::Create {
                url: "https://example.com/a".into(),
                title: "a".into(),
                domain: "example.com".into(),
                why: Some("read later".into()),
            }
        );
        assert_eq!(ops[0].at, start());
    }

    #[test]
    fn capture_batch_is_one_call() {
        let (store, _, service) = setup();
        let snaps: Vec<_> = (0..3).map(|i| snapshot(&format!("t{}", i), start())).collect();
        let ids = service.capture_closed_tabs(&snaps).unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(store.read(|s| s.count(&ItemQuery::all())).unwrap(), 3);
        assert_eq!(store.read(|s| s.count_ops()).unwrap(), 3);
        assert!(service.capture_closed_tabs(&[]).unwrap().is_empty());
    }

    #[test]
    fn annotate_and_touch() {
        let (store, clock, service) = setup();
        let id = service.capture_closed_tab(snapshot("a", start())).unwrap();

        clock.advance(Duration::hours(2));
        service.annotate_why(id, Some("follow up")).unwrap();
        service.touch(id).unwrap();
        service.touch(id).unwrap();

        let item = store.read(|s| s.get(id)).unwrap().unwrap();
        assert_eq!(item.why.as_deref(), Some("follow up"));
        assert_eq!(item.touch_count, 2);
        assert_eq!(item.last_touched_at, Some(start() + Duration::hours(2)));
        assert_eq!(
            op_kinds(&store, id),
            vec![OpKind::Create, OpKind::SetWhy, OpKind::Touch, OpKind::Touch]
        );

        service.annotate_why(id, None).unwrap();
        assert!(store.read(|s| s.get(id)).unwrap().unwrap().why.is_none());
    }

    #[test]
    fn missing_ids_are_silent_noops() {
        let (store, _, service) = setup();
        let ghost = Uuid::new_v4();
        service.annotate_why(ghost, Some("x")).unwrap();
        service.touch(ghost).unwrap();
        service.star(ghost).unwrap();
        service.unstar(ghost).unwrap();
        service.delete(ghost).unwrap();
        service.mark_last_chance_shown(&[ghost]).unwrap();
        assert_eq!(store.read(|s| s.count_ops()).unwrap(), 0);
    }

    #[test]
    fn sixth_star_releases_the_oldest() {
        let (store, _, service) = setup();
        let ids: Vec<_> = (0..6)
            .map(|i| {
                service
                    .capture_closed_tab(snapshot(&format!("s{}", i), start() + Duration::minutes(i)))
                    .unwrap()
            })
            .collect();

        for id in &ids {
            service.star(*id).unwrap();
        }

        let starred = |id: ItemId| store.read(|s| s.get(id)).unwrap().unwrap().is_starred;
        assert!(!starred(ids[0]));
        for id in &ids[1..] {
            assert!(starred(*id));
        }
        assert_eq!(store.read(|s| s.count(&ItemQuery::starred())).unwrap(), 5);
        assert_eq!(
            op_kinds(&store, ids[0]),
            vec![OpKind::Create, OpKind::Star, OpKind::Unstar]
        );
    }

    #[test]
    fn star_twice_is_idempotent() {
        let (store, _, service) = setup();
        let id = service.capture_closed_tab(snapshot("a", start())).unwrap();
        service.star(id).unwrap();
        service.star(id).unwrap();
        assert_eq!(op_kinds(&store, id), vec![OpKind::Create, OpKind::Star]);
        service.unstar(id).unwrap();
        assert!(!store.read(|s| s.get(id)).unwrap().unwrap().is_starred);
    }

    #[test]
    fn delete_removes_projection_and_logs() {
        let (store, _, service) = setup();
        let id = service.capture_closed_tab(snapshot("a", start())).unwrap();
        service.delete(id).unwrap();
        assert!(store.read(|s| s.get(id)).unwrap().is_none());
        assert_eq!(op_kinds(&store, id), vec![OpKind::Create, OpKind::Delete]);
    }

    #[test]
    fn last_chance_marks_are_idempotent() {
        let (store, clock, service) = setup();
        let id = service.capture_closed_tab(snapshot("a", start())).unwrap();
        service.mark_last_chance_shown(&[id]).unwrap();
        clock.advance(Duration::minutes(5));
        service.mark_last_chance_shown(&[id, id]).unwrap();
        let item = store.read(|s| s.get(id)).unwrap().unwrap();
        assert_eq!(item.last_chance_shown_at, Some(start()));
        assert_eq!(op_kinds(&store, id), vec![OpKind::Create]);
    }
}
