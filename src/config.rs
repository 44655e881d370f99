//! Configuration file parser for ~/.config/rssward/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as warnings, since they are
//! usually typos.
//!
//! Job intervals are not configured here. They live in the
//! `scheduler_settings` table so they can be retuned while the daemon runs.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level daemon configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. Defaults to `rssward.db` in the config directory.
    pub database_path: Option<PathBuf>,

    /// User-Agent header sent with every feed request.
    pub user_agent: String,

    /// Per-request timeout for feed downloads, in seconds.
    pub request_timeout_secs: u64,

    /// Feed bodies larger than this are rejected.
    pub max_feed_size_bytes: usize,

    /// Articles kept per feed source by the article purge job.
    pub article_retention_cap: u32,

    pub refresh_startup_delay_secs: u64,
    pub orphan_purge_startup_delay_secs: u64,
    pub article_purge_startup_delay_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            user_agent: "Mozilla/5.0 (Windows)".to_string(),
            request_timeout_secs: 30,
            max_feed_size_bytes: 10 * 1024 * 1024,
            article_retention_cap: 200,
            refresh_startup_delay_secs: 1,
            orphan_purge_startup_delay_secs: 2,
            article_purge_startup_delay_secs: 3,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 8] = [
        "database_path",
        "user_agent",
        "request_timeout_secs",
        "max_feed_size_bytes",
        "article_retention_cap",
        "refresh_startup_delay_secs",
        "orphan_purge_startup_delay_secs",
        "article_purge_startup_delay_secs",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Zero timeout, size limit or retention cap → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.max_feed_size_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_feed_size_bytes must be greater than 0".to_string(),
            ));
        }
        if self.article_retention_cap == 0 {
            return Err(ConfigError::Invalid(
                "article_retention_cap must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================
