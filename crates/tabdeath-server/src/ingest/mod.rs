//! Browser event ingestion: tab cache, passive-close batching and the
//! explicit close prompt.

pub mod batch;
pub mod host;
pub mod ingestor;
pub mod prompt;

pub use batch::{BatchSink, MicroBatchQueue};
pub use host::{HostCommand, HostOutbox, TabHost, TabId, TabInfo};
pub use ingestor::{CaptureSink, Ingestor, RemovedTab, TabCache, TabFilter, CLOSE_COMMAND};
pub use prompt::PromptBridge;
