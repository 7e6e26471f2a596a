//! SQLite schema for the op log and the item projection

/// Schema version for migrations
pub const SCHEMA_VERSION: u32 = 1;

/// SQLite schema definition
pub struct Schema;

impl Schema {
    /// Get the complete schema SQL
    pub fn create_tables() -> &'static str {
        r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Items table (current state projection)
-- created_at_ms, has_why and state_rank are derived from the canonical
-- columns on every write.
CREATE TABLE IF NOT EXISTS items (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    title TEXT NOT NULL,
    domain TEXT NOT NULL,
    why TEXT,
    created_at TEXT NOT NULL,
    last_touched_at TEXT,
    state TEXT NOT NULL,
    touch_count INTEGER NOT NULL DEFAULT 0,
    is_starred INTEGER NOT NULL DEFAULT 0,
    last_chance_shown_at TEXT,
    created_at_ms INTEGER NOT NULL,
    has_why INTEGER NOT NULL DEFAULT 0,
    state_rank INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_state_created ON items(state, created_at_ms);
CREATE INDEX IF NOT EXISTS idx_items_why_created ON items(has_why, created_at_ms);
CREATE INDEX IF NOT EXISTS idx_items_starred_created ON items(is_starred, created_at_ms);
CREATE INDEX IF NOT EXISTS idx_items_domain_created ON items(domain, created_at_ms);
CREATE INDEX IF NOT EXISTS idx_items_created ON items(created_at_ms);

-- Ops table (append-only log)
CREATE TABLE IF NOT EXISTS ops (
    op_id TEXT PRIMARY KEY,
    t TEXT NOT NULL,
    item_id TEXT NOT NULL,
    at TEXT NOT NULL,
    payload TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ops_item ON ops(item_id);
CREATE INDEX IF NOT EXISTS idx_ops_type ON ops(t);
"#
    }

    /// Get migration SQL for a specific version
    pub fn migration(from_version: u32, to_version: u32) -> Option<&'static str> {
        match (from_version, to_version) {
            // (1, 2) => Some("ALTER TABLE ..."),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_sql_has_both_tables() {
        let sql = Schema::create_tables();
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS items"));
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS ops"));
        assert!(sql.contains("items(state, created_at_ms)"));
    }

    #[test]
    fn test_no_pending_migrations() {
        assert!(Schema::migration(SCHEMA_VERSION, SCHEMA_VERSION + 1).is_none());
    }
}
