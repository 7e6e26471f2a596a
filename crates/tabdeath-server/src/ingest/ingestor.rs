//! Tab event ingestion.
//!
//! Passive closes (`tab_removed`) go through the micro-batch queue and are
//! captured without a reason. Explicit closes prompt for a reason first and
//! then ask the host to close the tab.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;

use tabdeath_core::{
    domain_from_url, CaptureService, CaptureSnapshot, Clock, IngestConfig, ItemId, TabDeathError,
};

use super::batch::{BatchSink, MicroBatchQueue};
use super::host::{TabHost, TabId, TabInfo};
use super::prompt::PromptBridge;

/// Keyboard command that closes the active tab with a prompt.
pub const CLOSE_COMMAND: &str = "tabdeath-close";

/// A `tab_removed` event waiting in the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedTab {
    pub tab_id: TabId,
    pub removed_at: DateTime<Utc>,
}

/// Last known metadata per tab, bounded by size and age. Entries are
/// consumed when the tab is captured.
pub struct TabCache {
    tabs: Cache<TabId, TabInfo>,
}

impl TabCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            tabs: Cache::builder()
                .max_capacity(capacity.max(1) as u64)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn upsert(&self, tab: TabInfo) {
        self.tabs.insert(tab.tab_id, tab);
    }

    pub fn take(&self, tab_id: TabId) -> Option<TabInfo> {
        self.tabs.remove(&tab_id)
    }

    pub fn get(&self, tab_id: TabId) -> Option<TabInfo> {
        self.tabs.get(&tab_id)
    }

    pub fn len(&self) -> usize {
        self.tabs.run_pending_tasks();
        self.tabs.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which closed tabs are not worth remembering.
#[derive(Debug, Clone)]
pub struct TabFilter {
    ignore_url_prefixes: Vec<String>,
    ignore_pinned: bool,
    ignore_incognito: bool,
}

impl TabFilter {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            ignore_url_prefixes: config.ignore_url_prefixes.clone(),
            ignore_pinned: config.ignore_pinned,
            ignore_incognito: config.ignore_incognito,
        }
    }

    pub fn should_ignore(&self, tab: &TabInfo) -> bool {
        (self.ignore_pinned && tab.pinned)
            || (self.ignore_incognito && tab.incognito)
            || self
                .ignore_url_prefixes
                .iter()
                .any(|prefix| tab.url.starts_with(prefix.as_str()))
    }
}

fn snapshot_of(tab: &TabInfo, at: DateTime<Utc>, why: Option<String>) -> CaptureSnapshot {
    CaptureSnapshot {
        url: tab.url.clone(),
        title: tab.display_title().to_string(),
        domain: domain_from_url(&tab.url),
        at,
        why,
    }
}

/// Flush target of the passive-close queue.
pub struct CaptureSink {
    cache: Arc<TabCache>,
    host: Arc<dyn TabHost>,
    capture: Arc<CaptureService>,
    filter: TabFilter,
}

impl BatchSink<RemovedTab> for CaptureSink {
    async fn flush(&self, batch: Vec<RemovedTab>) -> tabdeath_core::Result<()> {
        let mut snapshots = Vec::with_capacity(batch.len());
        for removed in batch {
            let Some(tab) = self
                .cache
                .take(removed.tab_id)
                .or_else(|| self.host.try_get_tab(removed.tab_id))
            else {
                tracing::debug!(tab_id = removed.tab_id, "closed tab unknown, skipping");
                continue;
            };
            if self.filter.should_ignore(&tab) {
                tracing::debug!(tab_id = tab.tab_id, "closed tab ignored");
                continue;
            }
            snapshots.push(snapshot_of(&tab, removed.removed_at, None));
        }
        if snapshots.is_empty() {
            return Ok(());
        }
        let capture = Arc::clone(&self.capture);
        run_blocking(move || capture.capture_closed_tabs(&snapshots)).await?;
        Ok(())
    }
}

/// Run a store-bound call on the blocking pool.
async fn run_blocking<T, F>(f: F) -> tabdeath_core::Result<T>
where
    F: FnOnce() -> tabdeath_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TabDeathError::Worker(e.to_string()))?
}

/// Owns the tab cache, the pending prompts and the passive-close queue.
pub struct Ingestor {
    cache: Arc<TabCache>,
    host: Arc<dyn TabHost>,
    capture: Arc<CaptureService>,
    clock: Arc<dyn Clock>,
    filter: TabFilter,
    prompt: PromptBridge,
    queue: MicroBatchQueue<RemovedTab, CaptureSink>,
    active_tab: Mutex<Option<TabId>>,
    disposed: AtomicBool,
}

impl Ingestor {
    pub fn new(
        config: &IngestConfig,
        capture: Arc<CaptureService>,
        host: Arc<dyn TabHost>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Arc::new(TabCache::new(
            config.tab_cache_capacity,
            Duration::from_secs(config.tab_cache_ttl_secs.max(1)),
        ));
        let filter = TabFilter::from_config(config);
        let sink = CaptureSink {
            cache: Arc::clone(&cache),
            host: Arc::clone(&host),
            capture: Arc::clone(&capture),
            filter: filter.clone(),
        };
        Self {
            cache,
            host,
            capture,
            clock,
            filter,
            prompt: PromptBridge::new(Duration::from_secs(config.prompt_timeout_secs)),
            queue: MicroBatchQueue::new(
                sink,
                Duration::from_millis(config.batch_window_ms),
                config.max_batch,
            ),
            active_tab: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn on_tab_updated(&self, tab: TabInfo) {
        if self.is_disposed() || tab.url.is_empty() {
            return;
        }
        self.cache.upsert(tab);
    }

    pub fn on_tab_activated(&self, tab_id: TabId) {
        if self.is_disposed() {
            return;
        }
        *self.active_tab.lock().unwrap_or_else(|e| e.into_inner()) = Some(tab_id);
    }

    /// Queue a passive capture. Must be called from within a tokio runtime.
    pub fn on_tab_removed(&self, tab_id: TabId) {
        if self.is_disposed() {
            return;
        }
        {
            let mut active = self.active_tab.lock().unwrap_or_else(|e| e.into_inner());
            if *active == Some(tab_id) {
                *active = None;
            }
        }
        self.queue.push(RemovedTab {
            tab_id,
            removed_at: self.clock.now(),
        });
    }

    /// Prompt for a reason, capture, then close the tab.
    ///
    /// Ignored tabs are closed without a prompt or capture. Returns the new
    /// item id when something was captured.
    pub async fn on_close_with_why(&self, tab_id: TabId) -> tabdeath_core::Result<Option<ItemId>> {
        if self.is_disposed() {
            return Ok(None);
        }
        // Taking the cache entry keeps the follow-up tab_removed from
        // capturing the same tab again.
        let Some(tab) = self
            .cache
            .take(tab_id)
            .or_else(|| self.host.try_get_tab(tab_id))
        else {
            tracing::debug!(tab_id, "close requested for unknown tab");
            return Ok(None);
        };

        if self.filter.should_ignore(&tab) {
            self.host.close_tab(tab_id);
            return Ok(None);
        }

        let why = self.prompt.request_why(self.host.as_ref(), &tab).await;
        let snapshot = snapshot_of(&tab, self.clock.now(), why);
        let capture = Arc::clone(&self.capture);
        let id = run_blocking(move || capture.capture_closed_tab(snapshot)).await?;
        self.host.close_tab(tab_id);
        Ok(Some(id))
    }

    /// Host keyboard command. Only [`CLOSE_COMMAND`] is handled.
    pub async fn on_command(&self, name: &str) -> tabdeath_core::Result<Option<ItemId>> {
        if self.is_disposed() || name != CLOSE_COMMAND {
            return Ok(None);
        }
        let active = *self.active_tab.lock().unwrap_or_else(|e| e.into_inner());
        match active {
            Some(tab_id) => self.on_close_with_why(tab_id).await,
            None => Ok(None),
        }
    }

    pub fn resolve_prompt(&self, request_id: &str, why: Option<&str>) -> bool {
        self.prompt.resolve(request_id, why)
    }

    pub fn pending_prompts(&self) -> usize {
        self.prompt.pending()
    }

    pub fn cached_tabs(&self) -> usize {
        self.cache.len()
    }

    pub fn pending_closes(&self) -> usize {
        self.queue.pending()
    }

    /// Stop accepting events and flush queued closes.
    pub async fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.queue.flush().await;
        tracing::debug!("ingestor disposed");
    }
}
