//! Bridge between an explicit close and the "why" prompt shown by the host.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;

use tabdeath_core::normalize_why;

use super::host::{TabHost, TabInfo};

/// Pending prompts keyed by request id. Each entry lives from
/// [`PromptBridge::request_why`] until it is resolved or times out.
pub struct PromptBridge {
    pending: Mutex<HashMap<String, oneshot::Sender<Option<String>>>>,
    timeout: Duration,
}

impl PromptBridge {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Ask the host for a reason and wait up to the timeout.
    ///
    /// Resolves to `None` on timeout, on an explicit cancel, or when the
    /// user submits nothing. A timed-out prompt is closed on the host.
    pub async fn request_why(&self, host: &dyn TabHost, tab: &TabInfo) -> Option<String> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(request_id.clone(), tx);

        host.open_prompt(&request_id, tab);

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(why)) => why,
            Ok(Err(_)) => None,
            Err(_) => {
                self.pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&request_id);
                host.close_prompt(&request_id);
                tracing::debug!(%request_id, "why prompt timed out");
                None
            }
        }
    }

    /// Deliver the user's answer. Returns `false` if no prompt with this id
    /// is waiting (already answered, timed out, or never opened).
    pub fn resolve(&self, request_id: &str, why: Option<&str>) -> bool {
        let sender = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(request_id);
        match sender {
            Some(tx) => {
                let _ = tx.send(normalize_why(why));
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
