//! Message API
//!
//! Every action is one JSON object tagged with `action`, posted to
//! `/messages`. The same [`dispatch`] serves the Unix socket.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use tabdeath_core::query::MAX_SEARCH_LIMIT;
use tabdeath_core::{
    ExportArtifact, ExportFormat, ItemId, ItemQuery, ListOptions, TabDeathError,
};

use crate::ingest::{TabHost, TabId, TabInfo};
use crate::AppState;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Message {
    // Popup / review UI
    GetReviewBuckets,
    SetWhy {
        id: ItemId,
        #[serde(default)]
        why: Option<String>,
    },
    ReopenItem {
        id: ItemId,
        url: String,
    },
    StarItem {
        id: ItemId,
    },
    UnstarItem {
        id: ItemId,
    },
    MarkLastChanceShown {
        ids: Vec<ItemId>,
    },
    Export {
        format: ExportFormat,
    },
    SearchArchived {
        query: String,
        #[serde(default)]
        limit: Option<usize>,
    },
    PromptResult {
        request_id: String,
        #[serde(default)]
        why: Option<String>,
    },
    Touch {
        id: ItemId,
    },
    DeleteItem {
        id: ItemId,
    },
    ListItems {
        #[serde(default)]
        query: ItemQuery,
        #[serde(default)]
        limit: Option<usize>,
        #[serde(default)]
        cursor: Option<DateTime<Utc>>,
    },
    Maintenance,
    Status,

    // Extension background script
    PollHostCommands,
    TabUpdated(TabInfo),
    TabActivated {
        tab_id: TabId,
    },
    TabRemoved {
        tab_id: TabId,
    },
    CloseWithWhy {
        tab_id: TabId,
    },
    Command {
        name: String,
    },
}

/// Result of a dispatched message.
#[derive(Debug)]
pub enum Reply {
    Json(serde_json::Value),
    Artifact(ExportArtifact),
}

impl Reply {
    fn ok() -> Self {
        Reply::Json(json!({ "ok": true }))
    }

    fn value(value: impl serde::Serialize) -> Result<Self, ApiError> {
        serde_json::to_value(value)
            .map(Reply::Json)
            .map_err(|e| ApiError::Internal(e.to_string()))
    }

    /// JSON rendering for transports without headers.
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Reply::Json(value) => value,
            Reply::Artifact(artifact) => json!({
                "ok": true,
                "filename": artifact.filename,
                "mimeType": artifact.mime_type,
                "content": String::from_utf8_lossy(&artifact.bytes),
            }),
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Json(value) => Json(value).into_response(),
            Reply::Artifact(artifact) => (
                [
                    (header::CONTENT_TYPE, artifact.mime_type),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", artifact.filename),
                    ),
                ],
                artifact.bytes,
            )
                .into_response(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("malformed message: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Core(#[from] TabDeathError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Core(TabDeathError::Validation(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Core(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({ "ok": false, "error": self.to_string() })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "message failed");
        } else {
            tracing::warn!(error = %self, "message rejected");
        }
        (status, Json(self.to_json())).into_response()
    }
}

/// Parse a raw message body.
pub fn parse_message(body: &[u8]) -> Result<Message, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Execute one message against the shared state.
pub async fn dispatch(state: &Arc<AppState>, message: Message) -> Result<Reply, ApiError> {
    match message {
        Message::GetReviewBuckets => {
            let now = state.clock.now();
            let buckets = blocking(state, move |st| st.maintenance.get_review_buckets(now)).await?;
            Reply::value(buckets)
        }
        Message::SetWhy { id, why } => {
            blocking(state, move |st| st.capture.annotate_why(id, why.as_deref())).await?;
            Ok(Reply::ok())
        }
        Message::ReopenItem { id, url } => {
            state.outbox.open_url(&url);
            blocking(state, move |st| st.capture.touch(id)).await?;
            Ok(Reply::ok())
        }
        Message::StarItem { id } => {
            blocking(state, move |st| st.capture.star(id)).await?;
            Ok(Reply::ok())
        }
        Message::UnstarItem { id } => {
            blocking(state, move |st| st.capture.unstar(id)).await?;
            Ok(Reply::ok())
        }
        Message::MarkLastChanceShown { ids } => {
            blocking(state, move |st| st.capture.mark_last_chance_shown(&ids)).await?;
            Ok(Reply::ok())
        }
        Message::Export { format } => {
            let artifact = blocking(state, move |st| st.export.export(format)).await?;
            Ok(Reply::Artifact(artifact))
        }
        Message::SearchArchived { query, limit } => {
            let limit = limit.unwrap_or(MAX_SEARCH_LIMIT);
            let items = blocking(state, move |st| {
                st.store.read(|s| s.search_archived(&query, limit))
            })
            .await?;
            Reply::value(items)
        }
        Message::PromptResult { request_id, why } => {
            let resolved = state.ingestor.resolve_prompt(&request_id, why.as_deref());
            Ok(Reply::Json(json!({ "ok": true, "resolved": resolved })))
        }
        Message::Touch { id } => {
            blocking(state, move |st| st.capture.touch(id)).await?;
            Ok(Reply::ok())
        }
        Message::DeleteItem { id } => {
            blocking(state, move |st| st.capture.delete(id)).await?;
            Ok(Reply::ok())
        }
        Message::ListItems {
            query,
            limit,
            cursor,
        } => {
            let opts = ListOptions {
                limit: limit.unwrap_or_else(|| ListOptions::default().limit),
                cursor,
            };
            let page = blocking(state, move |st| st.store.read(|s| s.list(&query, &opts))).await?;
            Reply::value(page)
        }
        Message::Maintenance => {
            let now = state.clock.now();
            let report =
                blocking(state, move |st| st.maintenance.run_daily_maintenance(now)).await?;
            Reply::value(report)
        }
        Message::Status => Ok(Reply::Json(status_json(state).await?)),
        Message::PollHostCommands => Ok(Reply::Json(json!({ "commands": state.outbox.drain() }))),
        Message::TabUpdated(tab) => {
            state.ingestor.on_tab_updated(tab);
            Ok(Reply::ok())
        }
        Message::TabActivated { tab_id } => {
            state.ingestor.on_tab_activated(tab_id);
            Ok(Reply::ok())
        }
        Message::TabRemoved { tab_id } => {
            state.ingestor.on_tab_removed(tab_id);
            Ok(Reply::ok())
        }
        Message::CloseWithWhy { tab_id } => {
            // The prompt answer arrives as a separate message, so the close
            // flow must not hold this request open.
            let state = Arc::clone(state);
            tokio::spawn(async move {
                if let Err(e) = state.ingestor.on_close_with_why(tab_id).await {
                    tracing::error!(error = %e, tab_id, "close with why failed");
                }
            });
            Ok(Reply::ok())
        }
        Message::Command { name } => {
            let state = Arc::clone(state);
            tokio::spawn(async move {
                if let Err(e) = state.ingestor.on_command(&name).await {
                    tracing::error!(error = %e, command = %name, "host command failed");
                }
            });
            Ok(Reply::ok())
        }
    }
}

/// Run a store-bound call on the blocking pool so SQLite work never stalls
/// the async workers.
async fn blocking<T, F>(state: &Arc<AppState>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppState) -> tabdeath_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    let result = tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(result?)
}

async fn status_json(state: &Arc<AppState>) -> Result<serde_json::Value, ApiError> {
    let (items, ops) = blocking(state, |st| {
        st.store
            .read(|s| Ok((s.count(&ItemQuery::all())?, s.count_ops()?)))
    })
    .await?;
    Ok(json!({
        "ok": true,
        "version": env!("CARGO_PKG_VERSION"),
        "items": items,
        "ops": ops,
        "pendingPrompts": state.ingestor.pending_prompts(),
        "pendingCloses": state.ingestor.pending_closes(),
        "cachedTabs": state.ingestor.cached_tabs(),
        "queuedHostCommands": state.outbox.len(),
    }))
}

/// POST /messages
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Reply, ApiError> {
    let message = parse_message(&body)?;
    dispatch(&state, message).await
}

/// GET /status
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    status_json(&state).await.map(Json)
}
