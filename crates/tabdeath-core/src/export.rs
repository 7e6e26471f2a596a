//! Export of the projection and the op log.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{Result, TabDeathError};
use crate::item::Item;
use crate::operation::{format_ts, OpRecord};
use crate::sqlite_store::SqliteStore;

const CSV_HEADER: [&str; 11] = [
    "id",
    "url",
    "title",
    "domain",
    "why",
    "createdAt",
    "lastTouchedAt",
    "state",
    "touchCount",
    "isStarred",
    "lastChanceShownAt",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// `{exportedAt, items}`, pretty-printed JSON.
    JsonItems,
    /// One op record per line.
    JsonOps,
    /// Items as CSV, every field quoted.
    CsvItems,
}

impl ExportFormat {
    pub fn filename(self) -> &'static str {
        match self {
            ExportFormat::JsonItems => "tabdeath-export.json",
            ExportFormat::JsonOps => "tabdeath-export.jsonl",
            ExportFormat::CsvItems => "tabdeath-export.csv",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::JsonItems => "application/json",
            ExportFormat::JsonOps => "application/jsonl",
            ExportFormat::CsvItems => "text/csv",
        }
    }
}

/// A downloadable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemsDocument {
    pub exported_at: DateTime<Utc>,
    pub items: Vec<Item>,
}

pub struct ExportService {
    store: Arc<SqliteStore>,
    clock: Arc<dyn Clock>,
}

impl ExportService {
    pub fn new(store: Arc<SqliteStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn export(&self, format: ExportFormat) -> Result<ExportArtifact> {
        let text = match format {
            ExportFormat::JsonItems => {
                let items = self.store.read(|s| s.all_items())?;
                let doc = ItemsDocument {
                    exported_at: self.clock.now(),
                    items,
                };
                serde_json::to_string_pretty(&doc)?
            }
            ExportFormat::JsonOps => {
                let ops = self.store.read(|s| s.all_ops())?;
                ops_to_jsonl(&ops)?
            }
            ExportFormat::CsvItems => {
                let items = self.store.read(|s| s.all_items())?;
                items_to_csv(&items)?
            }
        };
        tracing::debug!(?format, bytes = text.len(), "export ready");

        Ok(ExportArtifact {
            filename: format.filename().to_string(),
            mime_type: format.mime_type().to_string(),
            bytes: text.into_bytes(),
        })
    }
}

fn ops_to_jsonl(ops: &[OpRecord]) -> Result<String> {
    let lines = ops
        .iter()
        .map(serde_json::to_string)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

/// Header row unquoted, then one fully quoted row per item. Rows are
/// separated by `\n` with no trailing newline.
pub fn items_to_csv(items: &[Item]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    for item in items {
        writer
            .write_record([
                item.id.to_string(),
                item.url.clone(),
                item.title.clone(),
                item.domain.clone(),
                item.why.clone().unwrap_or_default(),
                format_ts(item.created_at),
                item.last_touched_at.map(format_ts).unwrap_or_default(),
                item.state.as_str().to_string(),
                item.touch_count.to_string(),
                item.is_starred.to_string(),
                item.last_chance_shown_at.map(format_ts).unwrap_or_default(),
            ])
            .map_err(|e| TabDeathError::Export(e.to_string()))?;
    }

    let body = writer
        .into_inner()
        .map_err(|e| TabDeathError::Export(e.to_string()))?;
    let body = String::from_utf8(body).map_err(|e| TabDeathError::Export(e.to_string()))?;

    let mut out = CSV_HEADER.join(",");
    if !body.is_empty() {
        out.push('\n');
        out.push_str(body.trim_end_matches('\n'));
    }
    Ok(out)
}
