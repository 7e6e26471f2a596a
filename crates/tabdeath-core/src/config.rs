//! Configuration for tabdeath
//!
//! Centralized configuration for decay thresholds, capacity limits, log
//! compaction, ingestion filters and server settings. Every section has
//! defaults, so a config file only needs the keys it changes:
//!
//! ```toml
//! [decay]
//! fresh_days = 3
//!
//! [stars]
//! max_stars = 8
//!
//! [ingest]
//! ignore_url_prefixes = ["chrome://", "about:", "file://"]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::decay::DecayPolicy;
use crate::eviction::CapPolicy;

/// Floor applied to `keep_last_n` when compacting the op log.
pub const MIN_KEEP_LAST_N: usize = 1000;

/// System-wide configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabDeathConfig {
    /// Age thresholds for the lifecycle bands
    pub decay: DecayPolicy,
    /// Capacity ceiling for the item projection
    pub cap: CapPolicy,
    /// Star slot settings
    pub stars: StarConfig,
    /// Op log compaction
    pub compaction: CompactionPolicy,
    /// Daily maintenance sweep
    pub maintenance: MaintenanceConfig,
    /// Tab event ingestion
    pub ingest: IngestConfig,
    /// HTTP / socket server
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StarConfig {
    /// Most items that may be starred at once
    pub max_stars: usize,
}

impl Default for StarConfig {
    fn default() -> Self {
        Self { max_stars: 5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionPolicy {
    /// Newest op rows kept after compaction (never below [`MIN_KEEP_LAST_N`])
    pub keep_last_n: usize,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self { keep_last_n: 10_000 }
    }
}

impl CompactionPolicy {
    pub fn effective_keep(&self) -> usize {
        self.keep_last_n.max(MIN_KEEP_LAST_N)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Items examined per state band on each sweep
    pub scan_per_state: usize,
    /// Metadata rows fetched for eviction planning
    pub meta_limit: usize,
    /// Hours between scheduled sweeps
    pub interval_hours: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            scan_per_state: 250,
            meta_limit: 5000,
            interval_hours: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Closed tabs whose URL starts with one of these are not captured
    pub ignore_url_prefixes: Vec<String>,
    pub ignore_pinned: bool,
    pub ignore_incognito: bool,
    /// Coalescing window for tab-close events
    pub batch_window_ms: u64,
    /// Flush as soon as this many events are buffered
    pub max_batch: usize,
    /// How long the "why" prompt waits before giving up
    pub prompt_timeout_secs: u64,
    /// Most tabs remembered by the metadata cache
    pub tab_cache_capacity: usize,
    /// Cached tab metadata older than this is dropped
    pub tab_cache_ttl_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            ignore_url_prefixes: vec![
                "chrome://".to_string(),
                "chrome-extension://".to_string(),
                "about:".to_string(),
            ],
            ignore_pinned: true,
            ignore_incognito: true,
            batch_window_ms: 150,
            max_batch: 100,
            prompt_timeout_secs: 5,
            tab_cache_capacity: 2048,
            tab_cache_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address
    pub addr: String,
    /// Optional Unix domain socket for local clients
    pub socket_path: Option<PathBuf>,
    /// When set, HTTP callers must send `Authorization: Bearer <token>`
    pub api_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:7419".to_string(),
            socket_path: None,
            api_token: None,
        }
    }
}

impl TabDeathConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// `~/.config/tabdeath/config.toml` (platform equivalent)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tabdeath").join("config.toml"))
    }

    /// `~/.local/share/tabdeath/tabdeath.db` (platform equivalent)
    pub fn default_db_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("tabdeath").join("tabdeath.db"))
    }

    /// Load from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config = Self::from_toml(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize configuration to TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.decay;
        if d.fresh_days < 0 {
            return Err(ConfigError::OutOfRange(
                "fresh_days must not be negative".to_string(),
            ));
        }
        if !(d.fresh_days < d.fading_days
            && d.fading_days < d.critical_days
            && d.critical_days < d.archive_days)
        {
            return Err(ConfigError::InvalidThresholds(
                "decay days must increase fresh < fading < critical < archive".to_string(),
            ));
        }

        if self.stars.max_stars == 0 {
            return Err(ConfigError::OutOfRange(
                "max_stars must be positive".to_string(),
            ));
        }

        if self.ingest.max_batch == 0 {
            return Err(ConfigError::OutOfRange(
                "max_batch must be positive".to_string(),
            ));
        }

        if self.maintenance.interval_hours == 0 {
            return Err(ConfigError::OutOfRange(
                "interval_hours must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration loading or validation error
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Threshold values are invalid relative to each other
    #[error("Invalid thresholds: {0}")]
    InvalidThresholds(String),
    /// Value is out of valid range
    #[error("Value out of range: {0}")]
    OutOfRange(String),
    /// File could not be read
    #[error("IO error: {0}")]
    Io(String),
    /// File could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TabDeathConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stars.max_stars, 5);
        assert_eq!(config.cap.max_items, 1000);
        assert_eq!(config.compaction.keep_last_n, 10_000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TabDeathConfig::from_toml(
            r#"
            [decay]
            fresh_days = 3

            [stars]
            max_stars = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.decay.fresh_days, 3);
        assert_eq!(config.decay.fading_days, 21);
        assert_eq!(config.stars.max_stars, 8);
        assert_eq!(config.ingest.prompt_timeout_secs, 5);
        assert_eq!(config.ingest.tab_cache_ttl_secs, 3600);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = TabDeathConfig::default();
        config.server.api_token = Some("secret".into());
        let text = config.to_toml().unwrap();
        assert_eq!(TabDeathConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_json_serialization() {
        let config = TabDeathConfig::default();
        let json = config.to_json().unwrap();
        let parsed = TabDeathConfig::from_json(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_invalid_thresholds() {
        let mut config = TabDeathConfig::default();
        config.decay.fading_days = 5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThresholds(_))
        ));
    }

    #[test]
    fn test_zero_stars_rejected() {
        let mut config = TabDeathConfig::default();
        config.stars.max_stars = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_keep_last_n_floor() {
        let policy = CompactionPolicy { keep_last_n: 10 };
        assert_eq!(policy.effective_keep(), MIN_KEEP_LAST_N);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = TabDeathConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, TabDeathConfig::default());
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[stars]\nmax_stars = 0\n").unwrap();
        assert!(TabDeathConfig::load(&path).is_err());
    }
}
