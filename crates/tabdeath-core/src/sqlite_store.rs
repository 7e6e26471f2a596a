use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{PersistenceError, Result};
use crate::item::{Item, ItemId, ItemMeta, ItemState};
use crate::operation::{format_ts, Op, OpRecord};
use crate::query::{
    clamp_limit, ItemQuery, ListOptions, Page, MAX_LIST_LIMIT, MAX_META_LIMIT, MAX_OPS_LIMIT,
    MAX_SEARCH_LIMIT, MAX_STARRED_LIMIT, SEARCH_SCAN_WINDOW,
};
use crate::schema::{Schema, SCHEMA_VERSION};
use crate::sql_query::compile_query;
use crate::store::{apply_all, FieldMutation};

const ITEM_COLUMNS: &str = "id, url, title, domain, why, created_at, last_touched_at, state, \
                            touch_count, is_starred, last_chance_shown_at";

/// SQLite-backed op log + item projection.
///
/// All access goes through a [`Session`]: [`SqliteStore::read`] for plain
/// reads, [`SqliteStore::transaction`] for anything that writes. A
/// transaction commits when the closure returns `Ok` and rolls back
/// otherwise, so the log and the projection change together or not at all.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::init_with_connection(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::init_with_connection(Connection::open_in_memory()?)
    }

    fn init_with_connection(conn: Connection) -> Result<Self> {
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize(conn: &Connection) -> Result<()> {
        let current_version = Self::get_schema_version(conn).unwrap_or(0);

        if current_version == 0 {
            conn.execute_batch(Schema::create_tables())?;
            Self::set_schema_version(conn, SCHEMA_VERSION)?;
        } else if current_version < SCHEMA_VERSION {
            for version in current_version..SCHEMA_VERSION {
                if let Some(migration) = Schema::migration(version, version + 1) {
                    conn.execute_batch(migration)
                        .map_err(|e| PersistenceError::Migration(e.to_string()))?;
                }
            }
            Self::set_schema_version(conn, SCHEMA_VERSION)?;
        } else if current_version > SCHEMA_VERSION {
            return Err(PersistenceError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION,
                actual: current_version,
            }
            .into());
        }

        Ok(())
    }

    fn get_schema_version(conn: &Connection) -> Option<u32> {
        conn.query_row(
            "SELECT MAX(version) FROM schema_version",
            [],
            |row| row.get::<_, Option<u32>>(0),
        )
        .ok()
        .flatten()
    }

    fn set_schema_version(conn: &Connection, version: u32) -> Result<()> {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PersistenceError::LockPoisoned(e.to_string()).into())
    }

    /// Run read-only work against the store.
    pub fn read<T>(&self, f: impl FnOnce(&Session<'_>) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&Session { conn: &*conn })
    }

    /// Run `f` inside one transaction spanning the log and the projection.
    pub fn transaction<T>(&self, f: impl FnOnce(&Session<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let out = f(&Session { conn: &*tx })?;
        tx.commit()?;
        Ok(out)
    }
}

/// Unit of work over one connection. Obtained from [`SqliteStore::read`]
/// or [`SqliteStore::transaction`]; never outlives the closure.
pub struct Session<'c> {
    conn: &'c Connection,
}

/// Row as written to `items`: the canonical item plus its derived keys.
pub(crate) struct ItemRow<'a> {
    pub item: &'a Item,
    pub created_at_ms: i64,
    pub has_why: bool,
    pub state_rank: u8,
}

/// Compute the derived columns for `item`. Every projection write goes
/// through here.
pub(crate) fn materialize(item: &Item) -> ItemRow<'_> {
    ItemRow {
        item,
        created_at_ms: item.created_at.timestamp_millis(),
        has_why: item.has_why(),
        state_rank: item.state.rank(),
    }
}

impl<'c> Session<'c> {
    // ==================== Items ====================

    pub fn get(&self, id: ItemId) -> Result<Option<Item>> {
        let sql = format!("SELECT {} FROM items WHERE id = ?1", ITEM_COLUMNS);
        let item = self
            .conn
            .query_row(&sql, params![id.to_string()], row_to_item)
            .optional()?;
        Ok(item)
    }

    /// Upsert the full row.
    pub fn put(&self, item: &Item) -> Result<()> {
        self.write_row(&materialize(item))
    }

    pub fn bulk_put(&self, items: &[Item]) -> Result<()> {
        for item in items {
            self.put(item)?;
        }
        Ok(())
    }

    fn write_row(&self, row: &ItemRow<'_>) -> Result<()> {
        let item = row.item;
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR REPLACE INTO items (id, url, title, domain, why, created_at, last_touched_at,
                 state, touch_count, is_starred, last_chance_shown_at,
                 created_at_ms, has_why, state_rank)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )?;
        stmt.execute(params![
            item.id.to_string(),
            item.url,
            item.title,
            item.domain,
            item.why,
            format_ts(item.created_at),
            item.last_touched_at.map(format_ts),
            item.state.as_str(),
            item.touch_count,
            item.is_starred,
            item.last_chance_shown_at.map(format_ts),
            row.created_at_ms,
            row.has_why,
            row.state_rank,
        ])?;
        Ok(())
    }

    /// Read-modify-write. Returns `false` when `id` is absent.
    pub fn update(&self, id: ItemId, mutations: &[FieldMutation]) -> Result<bool> {
        let Some(mut item) = self.get(id)? else {
            return Ok(false);
        };
        apply_all(&mut item, mutations);
        self.put(&item)?;
        Ok(true)
    }

    /// Remove from the projection only. Returns `false` when `id` is absent.
    pub fn delete(&self, id: ItemId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM items WHERE id = ?1", params![id.to_string()])?;
        Ok(rows > 0)
    }

    /// Returns the number of rows removed.
    pub fn bulk_delete(&self, ids: &[ItemId]) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached("DELETE FROM items WHERE id = ?1")?;
        let mut removed = 0;
        for id in ids {
            removed += stmt.execute(params![id.to_string()])?;
        }
        Ok(removed)
    }

    /// Newest first, optionally continuing from `opts.cursor`.
    pub fn list(&self, q: &ItemQuery, opts: &ListOptions) -> Result<Page<Item, DateTime<Utc>>> {
        let limit = clamp_limit(opts.limit, MAX_LIST_LIMIT);
        let compiled = compile_query(q, opts.cursor.map(|c| c.timestamp_millis()));
        let sql = format!(
            "SELECT {} FROM items {} ORDER BY created_at_ms DESC LIMIT {}",
            ITEM_COLUMNS, compiled.where_clause, limit
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map(compiled.params_ref().as_slice(), row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let next_cursor = if items.len() == limit {
            items.last().map(|i| i.created_at)
        } else {
            None
        };
        Ok(Page { items, next_cursor })
    }

    /// Starred items, oldest first.
    pub fn list_starred_oldest(&self, limit: usize) -> Result<Vec<Item>> {
        let limit = clamp_limit(limit, MAX_STARRED_LIMIT);
        let sql = format!(
            "SELECT {} FROM items WHERE is_starred = 1 ORDER BY created_at_ms ASC LIMIT ?1",
            ITEM_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map(params![limit as i64], row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Items in `state`, oldest first. Used by the decay sweep, which sets
    /// its own batch size instead of the page limit.
    pub fn scan_state(&self, state: ItemState, limit: usize) -> Result<Vec<Item>> {
        let limit = clamp_limit(limit, MAX_META_LIMIT);
        let sql = format!(
            "SELECT {} FROM items WHERE state = ?1 ORDER BY created_at_ms ASC LIMIT ?2",
            ITEM_COLUMNS
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let items = stmt
            .query_map(params![state.as_str(), limit as i64], row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Metadata of `dead` then `archived` items, each oldest first,
    /// truncated to `limit` overall.
    pub fn list_meta_for_cap(&self, limit: usize) -> Result<Vec<ItemMeta>> {
        let limit = clamp_limit(limit, MAX_META_LIMIT);
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, created_at, state, is_starred, last_chance_shown_at
             FROM items WHERE state = ?1 ORDER BY created_at_ms ASC LIMIT ?2",
        )?;

        let mut meta = Vec::new();
        for state in [ItemState::Dead, ItemState::Archived] {
            let rows = stmt
                .query_map(params![state.as_str(), limit as i64], row_to_meta)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            meta.extend(rows);
        }
        meta.truncate(limit);
        Ok(meta)
    }

    /// Case-insensitive substring search over `title` and `why` of the
    /// most recent archived items. Stops at `limit` hits.
    pub fn search_archived(&self, q: &str, limit: usize) -> Result<Vec<Item>> {
        let needle = q.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let limit = clamp_limit(limit, MAX_SEARCH_LIMIT);

        let sql = format!(
            "SELECT {} FROM items WHERE state = 'archived' ORDER BY created_at_ms DESC LIMIT ?1",
            ITEM_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![SEARCH_SCAN_WINDOW as i64], row_to_item)?;

        let mut hits = Vec::new();
        for row in rows {
            let item = row?;
            let hay = format!("{} {}", item.title, item.why.as_deref().unwrap_or("")).to_lowercase();
            if hay.contains(&needle) {
                hits.push(item);
                if hits.len() >= limit {
                    break;
                }
            }
        }
        Ok(hits)
    }

    /// Count by the query's dominant predicate (see [`ItemQuery::dominant`]).
    pub fn count(&self, q: &ItemQuery) -> Result<usize> {
        let compiled = compile_query(&q.dominant(), None);
        let sql = format!("SELECT COUNT(*) FROM items {}", compiled.where_clause);
        let count: i64 = self
            .conn
            .query_row(&sql, compiled.params_ref().as_slice(), |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Every item, by id.
    pub fn all_items(&self) -> Result<Vec<Item>> {
        let sql = format!("SELECT {} FROM items ORDER BY id", ITEM_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map([], row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    // ==================== Op log ====================

    pub fn append(&self, record: &OpRecord) -> Result<()> {
        let payload = serde_json::to_string(&record.op)?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR REPLACE INTO ops (op_id, t, item_id, at, payload) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        stmt.execute(params![
            record.op_id,
            record.kind().as_str(),
            record.item_id.to_string(),
            format_ts(record.at),
            payload,
        ])?;
        Ok(())
    }

    pub fn bulk_append(&self, records: &[OpRecord]) -> Result<()> {
        for record in records {
            self.append(record)?;
        }
        Ok(())
    }

    /// Ops after `after` (exclusive) in op id order.
    pub fn list_since(&self, after: Option<&str>, limit: usize) -> Result<Page<OpRecord, String>> {
        let limit = clamp_limit(limit, MAX_OPS_LIMIT);
        let mut stmt = self.conn.prepare_cached(
            "SELECT op_id, item_id, at, payload FROM ops
             WHERE ?1 IS NULL OR op_id > ?1 ORDER BY op_id ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![after, limit as i64], row_to_raw_op)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let items = rows
            .into_iter()
            .map(RawOp::into_record)
            .collect::<Result<Vec<_>>>()?;

        let next_cursor = if items.len() == limit {
            items.last().map(|r| r.op_id.clone())
        } else {
            None
        };
        Ok(Page { items, next_cursor })
    }

    pub fn all_ops(&self) -> Result<Vec<OpRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT op_id, item_id, at, payload FROM ops ORDER BY op_id ASC")?;
        let rows = stmt
            .query_map([], row_to_raw_op)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(RawOp::into_record).collect()
    }

    pub fn count_ops(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM ops", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Drop the oldest ops (by op id) so at most `keep` remain. Returns the
    /// number removed. Callers pass an already-floored keep count.
    pub fn compact(&self, keep: usize) -> Result<usize> {
        let total = self.count_ops()?;
        let over = total.saturating_sub(keep);
        if over == 0 {
            return Ok(0);
        }
        let removed = self.conn.execute(
            "DELETE FROM ops WHERE op_id IN (SELECT op_id FROM ops ORDER BY op_id ASC LIMIT ?1)",
            params![over as i64],
        )?;
        tracing::debug!(removed, kept = total - removed, "compacted op log");
        Ok(removed)
    }
}

// ==================== Row mapping ====================

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        Box::new(PersistenceError::Serialization(msg)),
    )
}

fn parse_id(idx: usize, s: &str) -> rusqlite::Result<ItemId> {
    uuid::Uuid::parse_str(s).map_err(|e| conversion_error(idx, format!("item id {}: {}", s, e)))
}

fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("timestamp {}: {}", s, e)))
}

fn parse_opt_ts(idx: usize, s: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_ts(idx, &s)).transpose()
}

fn parse_state(idx: usize, s: &str) -> rusqlite::Result<ItemState> {
    ItemState::parse(s).ok_or_else(|| conversion_error(idx, format!("unknown state {}", s)))
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<Item> {
    let id: String = row.get(0)?;
    let created_at: String = row.get(5)?;
    let state: String = row.get(7)?;
    Ok(Item {
        id: parse_id(0, &id)?,
        url: row.get(1)?,
        title: row.get(2)?,
        domain: row.get(3)?,
        why: row.get(4)?,
        created_at: parse_ts(5, &created_at)?,
        last_touched_at: parse_opt_ts(6, row.get(6)?)?,
        state: parse_state(7, &state)?,
        touch_count: row.get(8)?,
        is_starred: row.get(9)?,
        last_chance_shown_at: parse_opt_ts(10, row.get(10)?)?,
    })
}

fn row_to_meta(row: &Row<'_>) -> rusqlite::Result<ItemMeta> {
    let id: String = row.get(0)?;
    let created_at: String = row.get(1)?;
    let state: String = row.get(2)?;
    Ok(ItemMeta {
        id: parse_id(0, &id)?,
        created_at: parse_ts(1, &created_at)?,
        state: parse_state(2, &state)?,
        is_starred: row.get(3)?,
        last_chance_shown_at: parse_opt_ts(4, row.get(4)?)?,
    })
}

struct RawOp {
    op_id: String,
    item_id: ItemId,
    at: DateTime<Utc>,
    payload: String,
}

impl RawOp {
    fn into_record(self) -> Result<OpRecord> {
        let op: Op = serde_json::from_str(&self.payload)?;
        Ok(OpRecord {
            op_id: self.op_id,
            item_id: self.item_id,
            at: self.at,
            op,
        })
    }
}

fn row_to_raw_op(row: &Row<'_>) -> rusqlite::Result<RawOp> {
    let item_id: String = row.get(1)?;
    let at: String = row.get(2)?;
    Ok(RawOp {
        op_id: row.get(0)?,
        item_id: parse_id(1, &item_id)?,
        at: parse_ts(2, &at)?,
        payload: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TabDeathError;
    use crate::item::CaptureSnapshot;
    use crate::operation::NewOp;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn make_item(title: &str, minutes: i64) -> Item {
        Item::fresh(
            Uuid::new_v4(),
            &CaptureSnapshot {
                url: format!("https://example.com/{}", title),
                title: title.into(),
                domain: "example.com".into(),
                at: t0() + Duration::minutes(minutes),
                why: None,
            },
        )
    }

    fn store_with(items: &[Item]) -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.transaction(|s| s.bulk_put(items)).unwrap();
        store
    }

    #[test]
    fn put_and_get_round_trip() {
        let mut item = make_item("rust", 0);
        item.why = Some("learn lifetimes".into());
        item.last_touched_at = Some(t0() + Duration::days(1));
        item.touch_count = 3;
        let store = store_with(&[item.clone()]);

        let back = store.read(|s| s.get(item.id)).unwrap();
        assert_eq!(back, Some(item));
    }

    #[test]
    fn get_nonexistent_returns_none() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.read(|s| s.get(Uuid::new_v4())).unwrap().is_none());
    }

    #[test]
    fn derived_columns_follow_every_write() {
        let item = make_item("a", 0);
        let store = store_with(&[item.clone()]);

        store
            .transaction(|s| {
                s.update(
                    item.id,
                    &[
                        FieldMutation::SetWhy(Some("because".into())),
                        FieldMutation::SetState(ItemState::Archived),
                    ],
                )
            })
            .unwrap();

        let (has_why, rank, ms): (bool, u8, i64) = store
            .read(|s| {
                Ok(s.conn.query_row(
                    "SELECT has_why, state_rank, created_at_ms FROM items WHERE id = ?1",
                    params![item.id.to_string()],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                )?)
            })
            .unwrap();
        assert!(has_why);
        assert_eq!(rank, ItemState::Archived.rank());
        assert_eq!(ms, item.created_at.timestamp_millis());
    }

    #[test]
    fn update_missing_is_noop() {
        let store = SqliteStore::open_in_memory().unwrap();
        let updated = store
            .transaction(|s| s.update(Uuid::new_v4(), &[FieldMutation::SetStarred(true)]))
            .unwrap();
        assert!(!updated);
        assert!(!store.transaction(|s| s.delete(Uuid::new_v4())).unwrap());
    }

    #[test]
    fn failed_transaction_rolls_back_both_tables() {
        let item = make_item("a", 0);
        let store = SqliteStore::open_in_memory().unwrap();

        let result: Result<()> = store.transaction(|s| {
            s.append(&NewOp::new(item.id, item.created_at, Op::Touch).into_record())?;
            s.put(&item)?;
            Err(TabDeathError::Validation("abort".into()))
        });
        assert!(result.is_err());

        store
            .read(|s| {
                assert!(s.get(item.id)?.is_none());
                assert_eq!(s.count_ops()?, 0);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn list_is_newest_first_with_cursor() {
        let items: Vec<_> = (0..5).map(|i| make_item(&format!("t{}", i), i)).collect();
        let store = store_with(&items);

        let first = store
            .read(|s| s.list(&ItemQuery::all(), &ListOptions::limit(2)))
            .unwrap();
        let titles: Vec<_> = first.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["t4", "t3"]);
        assert_eq!(first.next_cursor, Some(items[3].created_at));

        let second = store
            .read(|s| {
                s.list(
                    &ItemQuery::all(),
                    &ListOptions {
                        limit: 10,
                        cursor: first.next_cursor,
                    },
                )
            })
            .unwrap();
        let titles: Vec<_> = second.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["t2", "t1", "t0"]);
        assert!(second.next_cursor.is_none());
    }

    #[test]
    fn list_limit_is_clamped() {
        let items: Vec<_> = (0..3).map(|i| make_item("x", i)).collect();
        let store = store_with(&items);
        let page = store
            .read(|s| s.list(&ItemQuery::all(), &ListOptions::limit(0)))
            .unwrap();
        assert_eq!(page.items.len(), 1);
    }

    #[test]
    fn list_filters() {
        let mut a = make_item("a", 0);
        a.state = ItemState::Critical;
        let mut b = make_item("b", 1);
        b.is_starred = true;
        let mut c = make_item("c", 2);
        c.why = Some("note".into());
        c.domain = "docs.rs".into();
        let store = store_with(&[a.clone(), b.clone(), c.clone()]);

        let list = |q: ItemQuery| {
            store
                .read(|s| s.list(&q, &ListOptions::limit(50)))
                .unwrap()
                .items
                .into_iter()
                .map(|i| i.id)
                .collect::<Vec<_>>()
        };

        assert_eq!(list(ItemQuery::in_state(ItemState::Critical)), vec![a.id]);
        assert_eq!(list(ItemQuery::starred()), vec![b.id]);
        assert_eq!(list(ItemQuery::with_why(true)), vec![c.id]);
        assert_eq!(
            list(ItemQuery {
                domain: Some("docs.rs".into()),
                ..ItemQuery::default()
            }),
            vec![c.id]
        );
        assert_eq!(
            list(ItemQuery {
                states: vec![ItemState::Fresh],
                created_at_before: Some(b.created_at),
                ..ItemQuery::default()
            }),
            vec![b.id]
        );
    }

    #[test]
    fn starred_oldest_first() {
        let mut items: Vec<_> = (0..4).map(|i| make_item("s", i)).collect();
        for it in items.iter_mut().skip(1) {
            it.is_starred = true;
        }
        let store = store_with(&items);
        let starred = store.read(|s| s.list_starred_oldest(2)).unwrap();
        assert_eq!(
            starred.iter().map(|i| i.id).collect::<Vec<_>>(),
            vec![items[1].id, items[2].id]
        );
    }

    #[test]
    fn meta_for_cap_is_dead_then_archived() {
        let mut items: Vec<_> = (0..6).map(|i| make_item("m", i)).collect();
        items[0].state = ItemState::Archived;
        items[1].state = ItemState::Dead;
        items[2].state = ItemState::Archived;
        items[3].state = ItemState::Dead;
        items[4].state = ItemState::Critical;
        let store = store_with(&items);

        let meta = store.read(|s| s.list_meta_for_cap(10)).unwrap();
        let ids: Vec<_> = meta.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![items[1].id, items[3].id, items[0].id, items[2].id]);

        let meta = store.read(|s| s.list_meta_for_cap(3)).unwrap();
        assert_eq!(meta.len(), 3);
        assert_eq!(meta[2].state, ItemState::Archived);
    }

    #[test]
    fn search_archived_matches_title_and_why() {
        let mut a = make_item("Tokio Tutorial", 0);
        a.state = ItemState::Archived;
        let mut b = make_item("Unrelated", 1);
        b.state = ItemState::Archived;
        b.why = Some("compare with TOKIO docs".into());
        let c = make_item("tokio fresh", 2);
        let store = store_with(&[a.clone(), b.clone(), c]);

        let hits = store.read(|s| s.search_archived("  tokio ", 10)).unwrap();
        assert_eq!(hits.iter().map(|i| i.id).collect::<Vec<_>>(), vec![b.id, a.id]);

        let hits = store.read(|s| s.search_archived("tokio", 1)).unwrap();
        assert_eq!(hits.len(), 1);

        assert!(store.read(|s| s.search_archived("   ", 10)).unwrap().is_empty());
    }

    #[test]
    fn search_archived_only_scans_recent_window() {
        let items: Vec<_> = (0..=SEARCH_SCAN_WINDOW as i64)
            .map(|i| {
                let title = if i == 0 { "needle in the oldest" } else { "hay" };
                let mut item = make_item(title, i);
                item.state = ItemState::Archived;
                item
            })
            .collect();
        assert_eq!(items.len(), 1001);
        let store = store_with(&items);

        assert!(store.read(|s| s.search_archived("needle", 50)).unwrap().is_empty());

        // Once it is inside the window it is found.
        store.transaction(|s| s.delete(items[1000].id)).unwrap();
        let hits = store.read(|s| s.search_archived("needle", 50)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, items[0].id);
    }

    #[test]
    fn scan_state_is_oldest_first_and_not_page_limited() {
        let items: Vec<_> = (0..(MAX_LIST_LIMIT as i64 + 50))
            .map(|i| make_item("f", i))
            .collect();
        let store = store_with(&items);

        let scanned = store
            .read(|s| s.scan_state(ItemState::Fresh, MAX_LIST_LIMIT + 20))
            .unwrap();
        assert_eq!(scanned.len(), MAX_LIST_LIMIT + 20);
        assert_eq!(scanned[0].id, items[0].id);
        assert!(scanned.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        assert!(store
            .read(|s| s.scan_state(ItemState::Dead, 10))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn count_uses_dominant_predicate() {
        let mut a = make_item("a", 0);
        a.is_starred = true;
        a.state = ItemState::Fading;
        let mut b = make_item("b", 1);
        b.why = Some("x".into());
        let store = store_with(&[a, b, make_item("c", 2)]);

        store
            .read(|s| {
                assert_eq!(s.count(&ItemQuery::all())?, 3);
                assert_eq!(s.count(&ItemQuery::starred())?, 1);
                assert_eq!(s.count(&ItemQuery::with_why(false))?, 2);
                let q = ItemQuery {
                    state: Some(ItemState::Fresh),
                    is_starred: Some(true),
                    ..ItemQuery::default()
                };
                assert_eq!(s.count(&q)?, 2);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn bulk_delete_counts_removed() {
        let items: Vec<_> = (0..3).map(|i| make_item("d", i)).collect();
        let store = store_with(&items);
        let removed = store
            .transaction(|s| s.bulk_delete(&[items[0].id, items[2].id, Uuid::new_v4()]))
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.read(|s| s.count(&ItemQuery::all())).unwrap(), 1);
    }

    #[test]
    fn ops_round_trip_and_page() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        let records: Vec<_> = (0..5)
            .map(|i| {
                NewOp::new(
                    id,
                    t0() + Duration::seconds(i),
                    Op::SetWhy {
                        why: Some(format!("w{}", i)),
                    },
                )
                .into_record()
            })
            .collect();
        store.transaction(|s| s.bulk_append(&records)).unwrap();

        let page = store.read(|s| s.list_since(None, 3)).unwrap();
        assert_eq!(page.items, records[..3].to_vec());
        assert_eq!(page.next_cursor.as_deref(), Some(records[2].op_id.as_str()));

        let rest = store
            .read(|s| s.list_since(page.next_cursor.as_deref(), 3))
            .unwrap();
        assert_eq!(rest.items, records[3..].to_vec());
        assert!(rest.next_cursor.is_none());

        assert_eq!(store.read(|s| s.all_ops()).unwrap(), records);
    }

    #[test]
    fn compact_removes_oldest_by_op_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        let records: Vec<_> = (0..12_000)
            .map(|i| NewOp::new(Uuid::new_v4(), t0() + Duration::milliseconds(i), Op::Touch).into_record())
            .collect();
        store.transaction(|s| s.bulk_append(&records)).unwrap();

        let removed = store.transaction(|s| s.compact(10_000)).unwrap();
        assert_eq!(removed, 2000);

        let remaining = store.read(|s| s.all_ops()).unwrap();
        assert_eq!(remaining.len(), 10_000);
        assert_eq!(remaining[0].op_id, records[2000].op_id);

        assert_eq!(store.transaction(|s| s.compact(10_000)).unwrap(), 0);
    }

    #[test]
    fn file_store_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tabdeath.db");
        let item = make_item("persist", 0);
        {
            let store = SqliteStore::open(&path).unwrap();
            store.transaction(|s| s.put(&item)).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.read(|s| s.get(item.id)).unwrap(), Some(item));
    }

    #[test]
    fn newer_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tabdeath.db");
        drop(SqliteStore::open(&path).unwrap());
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute("INSERT INTO schema_version (version) VALUES (99)", [])
                .unwrap();
        }
        match SqliteStore::open(&path) {
            Err(TabDeathError::Persistence(PersistenceError::SchemaVersionMismatch {
                actual, ..
            })) => assert_eq!(actual, 99),
            other => panic!("expected version mismatch, got {:?}", other.map(|_| ())),
        }
    }
}
