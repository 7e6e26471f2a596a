//! The browser side of ingestion.
//!
//! The service never talks to a browser directly. Side effects are queued
//! as [`HostCommand`]s in a [`HostOutbox`] that the extension drains with
//! the `poll_host_commands` message.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

pub type TabId = i64;

/// Last known metadata of a browser tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub tab_id: TabId,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub incognito: bool,
    #[serde(default)]
    pub window_id: Option<i64>,
}

impl TabInfo {
    /// Title, falling back to the URL when the page had none.
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.url
        } else {
            &self.title
        }
    }
}

/// What ingestion needs from the browser.
pub trait TabHost: Send + Sync {
    /// Live lookup; `None` when the tab is gone or unknown.
    fn try_get_tab(&self, tab_id: TabId) -> Option<TabInfo>;
    fn close_tab(&self, tab_id: TabId);
    fn open_url(&self, url: &str);
    fn open_prompt(&self, request_id: &str, tab: &TabInfo);
    fn close_prompt(&self, request_id: &str);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum HostCommand {
    CloseTab {
        tab_id: TabId,
    },
    OpenUrl {
        url: String,
    },
    OpenPrompt {
        request_id: String,
        tab_id: TabId,
        title: String,
        url: String,
    },
    ClosePrompt {
        request_id: String,
    },
}

/// Most commands held while the extension is not polling.
pub const MAX_QUEUED_COMMANDS: usize = 256;

/// Host commands waiting for the extension to pick them up.
///
/// Bounded: when full, the oldest `open_url` is dropped first, then the
/// oldest command of any kind.
#[derive(Debug)]
pub struct HostOutbox {
    capacity: usize,
    queue: Mutex<VecDeque<HostCommand>>,
}

impl Default for HostOutbox {
    fn default() -> Self {
        Self::with_capacity(MAX_QUEUED_COMMANDS)
    }
}

impl HostOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    fn push(&self, command: HostCommand) {
        tracing::debug!(?command, "queued host command");
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        while queue.len() >= self.capacity {
            let victim = queue
                .iter()
                .position(|c| matches!(c, HostCommand::OpenUrl { .. }))
                .unwrap_or(0);
            if let Some(dropped) = queue.remove(victim) {
                tracing::warn!(
                    ?dropped,
                    capacity = self.capacity,
                    "host outbox full, dropping command"
                );
            }
        }
        queue.push_back(command);
    }

    /// Take every queued command, oldest first.
    pub fn drain(&self) -> Vec<HostCommand> {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TabHost for HostOutbox {
    // The outbox only sees tabs through the ingestor's cache.
    fn try_get_tab(&self, _tab_id: TabId) -> Option<TabInfo> {
        None
    }

    fn close_tab(&self, tab_id: TabId) {
        self.push(HostCommand::CloseTab { tab_id });
    }

    fn open_url(&self, url: &str) {
        self.push(HostCommand::OpenUrl {
            url: url.to_string(),
        });
    }

    fn open_prompt(&self, request_id: &str, tab: &TabInfo) {
        self.push(HostCommand::OpenPrompt {
            request_id: request_id.to_string(),
            tab_id: tab.tab_id,
            title: tab.display_title().to_string(),
            url: tab.url.clone(),
        });
    }

    fn close_prompt(&self, request_id: &str) {
        self.push(HostCommand::ClosePrompt {
            request_id: request_id.to_string(),
        });
    }
}
