use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::item::ItemId;

/// Kind of mutation recorded in the op log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpKind {
    Create,
    SetWhy,
    Touch,
    Star,
    Unstar,
    Delete,
}

impl OpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Create => "CREATE",
            OpKind::SetWhy => "SET_WHY",
            OpKind::Touch => "TOUCH",
            OpKind::Star => "STAR",
            OpKind::Unstar => "UNSTAR",
            OpKind::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The mutation itself, carrying only the fields its kind needs.
///
/// Internally tagged with `t` so a serialized record reads
/// `{"opId":..,"t":"SET_WHY","id":..,"at":..,"why":..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Op {
    Create {
        url: String,
        title: String,
        domain: String,
        why: Option<String>,
    },
    SetWhy {
        why: Option<String>,
    },
    Touch,
    Star,
    Unstar,
    Delete,
}

impl Op {
    pub fn kind(&self) -> OpKind {
        match self {
            Op::Create { .. } => OpKind::Create,
            Op::SetWhy { .. } => OpKind::SetWhy,
            Op::Touch => OpKind::Touch,
            Op::Star => OpKind::Star,
            Op::Unstar => OpKind::Unstar,
            Op::Delete => OpKind::Delete,
        }
    }
}

/// An op that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOp {
    pub item_id: ItemId,
    pub at: DateTime<Utc>,
    pub op: Op,
}

impl NewOp {
    pub fn new(item_id: ItemId, at: DateTime<Utc>, op: Op) -> Self {
        Self { item_id, at, op }
    }

    /// Assign an op id and produce the persisted record.
    pub fn into_record(self) -> OpRecord {
        OpRecord {
            op_id: make_op_id(self.at, self.item_id, self.op.kind()),
            item_id: self.item_id,
            at: self.at,
            op: self.op,
        }
    }
}

/// One row of the append-only op log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpRecord {
    pub op_id: String,
    #[serde(rename = "id")]
    pub item_id: ItemId,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub op: Op,
}

impl OpRecord {
    pub fn kind(&self) -> OpKind {
        self.op.kind()
    }
}

/// Fixed-width UTC timestamp, lexicographically sortable.
pub fn format_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `{timestamp}:{item}:{kind}:{random}`.
///
/// Sorts by time for a single writer. Ops within the same millisecond are
/// ordered by item id and then by the random suffix, not by issue order.
pub fn make_op_id(at: DateTime<Utc>, item_id: ItemId, kind: OpKind) -> String {
    let rand = Uuid::new_v4().simple().to_string();
    format!("{}:{}:{}:{}", format_ts(at), item_id, kind, &rand[..12])
}
