//! Closed-tab tracking: items decay from fresh to dead, a capacity policy
//! evicts the disposable ones, and every mutation lands in an append-only
//! op log alongside the queryable projection.

pub mod clock;
pub mod config;
pub mod decay;
pub mod error;
pub mod eviction;
pub mod item;
pub mod operation;
pub mod query;
pub mod schema;
pub mod store;

#[cfg(feature = "sqlite")]
pub mod capture;
#[cfg(feature = "sqlite")]
pub mod export;
#[cfg(feature = "sqlite")]
pub mod maintenance;
#[cfg(feature = "sqlite")]
pub(crate) mod sql_query;
#[cfg(feature = "sqlite")]
pub mod sqlite_store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, IngestConfig, ServerConfig, TabDeathConfig};
pub use decay::DecayPolicy;
pub use error::{PersistenceError, Result, TabDeathError};
pub use eviction::{plan_eviction, CapPolicy, EvictionPlan, EvictionReason};
pub use item::*;
pub use operation::{Op, OpKind, OpRecord};
pub use query::{ItemQuery, ListOptions, Page};
pub use store::FieldMutation;

#[cfg(feature = "sqlite")]
pub use capture::CaptureService;
#[cfg(feature = "sqlite")]
pub use export::{ExportArtifact, ExportFormat, ExportService};
#[cfg(feature = "sqlite")]
pub use maintenance::{MaintenanceReport, MaintenanceService, ReviewBuckets};
#[cfg(feature = "sqlite")]
pub use sqlite_store::{Session, SqliteStore};
