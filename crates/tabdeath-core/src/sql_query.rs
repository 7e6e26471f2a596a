use rusqlite::types::Value as SqlValue;

use crate::query::ItemQuery;

/// Compiled SQL query fragment with bound parameters.
pub(crate) struct CompiledQuery {
    pub where_clause: String,
    pub params: Vec<SqlValue>,
}

impl CompiledQuery {
    pub fn params_ref(&self) -> Vec<&dyn rusqlite::types::ToSql> {
        self.params
            .iter()
            .map(|p| p as &dyn rusqlite::types::ToSql)
            .collect()
    }
}

/// Translate an ItemQuery into a WHERE clause over the `items` table.
///
/// `cursor_ms`, when set, keeps only rows created strictly before it.
pub(crate) fn compile_query(q: &ItemQuery, cursor_ms: Option<i64>) -> CompiledQuery {
    let mut params = Vec::new();
    let mut conditions = Vec::new();

    if let Some(state) = q.state {
        conditions.push("state = ?".to_string());
        params.push(SqlValue::Text(state.as_str().to_string()));
    }
    if !q.states.is_empty() {
        let placeholders: Vec<&str> = q
            .states
            .iter()
            .map(|s| {
                params.push(SqlValue::Text(s.as_str().to_string()));
                "?"
            })
            .collect();
        conditions.push(format!("state IN ({})", placeholders.join(", ")));
    }
    if let Some(starred) = q.is_starred {
        conditions.push(format!("is_starred = {}", if starred { 1 } else { 0 }));
    }
    if let Some(has_why) = q.has_why {
        conditions.push(format!("has_why = {}", if has_why { 1 } else { 0 }));
    }
    if let Some(ref domain) = q.domain {
        conditions.push("domain = ?".to_string());
        params.push(SqlValue::Text(domain.clone()));
    }
    if let Some(after) = q.created_at_after {
        conditions.push("created_at_ms >= ?".to_string());
        params.push(SqlValue::Integer(after.timestamp_millis()));
    }
    if let Some(before) = q.created_at_before {
        conditions.push("created_at_ms <= ?".to_string());
        params.push(SqlValue::Integer(before.timestamp_millis()));
    }
    if let Some(ms) = cursor_ms {
        conditions.push("created_at_ms < ?".to_string());
        params.push(SqlValue::Integer(ms));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    CompiledQuery {
        where_clause,
        params,
    }
}
