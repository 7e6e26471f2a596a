//! Error types for tabdeath-core

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for tabdeath operations
pub type Result<T> = std::result::Result<T, TabDeathError>;

/// Main error type for tabdeath operations
#[derive(Error, Debug)]
pub enum TabDeathError {
    /// Persistence-related errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Rejected input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Export encoding failed
    #[error("Export error: {0}")]
    Export(String),

    /// A worker running store calls panicked or was cancelled
    #[error("Worker error: {0}")]
    Worker(String),
}

/// Persistence-specific errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Schema version mismatch
    #[error("Schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersionMismatch { expected: u32, actual: u32 },

    /// Connection mutex poisoned by a panicking writer
    #[error("Connection lock poisoned: {0}")]
    LockPoisoned(String),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for PersistenceError {
    fn from(err: rusqlite::Error) -> Self {
        PersistenceError::Database(err.to_string())
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        PersistenceError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Serialization(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for TabDeathError {
    fn from(err: rusqlite::Error) -> Self {
        TabDeathError::Persistence(PersistenceError::Database(err.to_string()))
    }
}

impl From<serde_json::Error> for TabDeathError {
    fn from(err: serde_json::Error) -> Self {
        TabDeathError::Persistence(PersistenceError::Serialization(err.to_string()))
    }
}

impl From<std::io::Error> for TabDeathError {
    fn from(err: std::io::Error) -> Self {
        TabDeathError::Persistence(PersistenceError::Io(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TabDeathError::Validation("why must be a string".into());
        assert!(err.to_string().contains("why must be a string"));

        let err: TabDeathError = PersistenceError::SchemaVersionMismatch {
            expected: 2,
            actual: 1,
        }
        .into();
        assert!(err.to_string().contains("expected 2"));
    }

    #[test]
    fn serde_errors_convert() {
        let parse = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: TabDeathError = parse.into();
        assert!(matches!(
            err,
            TabDeathError::Persistence(PersistenceError::Serialization(_))
        ));
    }
}
