//! Configuration types for adsync components.
//!
//! Every section has built-in defaults. An optional TOML settings file
//! (see [`default_config_path`]) overrides them, and the CLI layers
//! environment variables and flags on top:
//!
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0:8000"
//!
//! [sync]
//! interval_secs = 1800
//!
//! [rate_limit]
//! max_calls = 60
//! window_secs = 60
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

/// Database connection pool configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DbConfig {
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self { max_connections: 5 }
    }
}

/// HTTP client configuration for Megaphone API calls.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Items requested per listing page.
    pub page_size: u32,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 500,
            page_size: 100,
        }
    }
}

/// Bounded calls per rolling window, shared by every call of one client.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_calls: u32,
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: 60,
            window_secs: 60,
        }
    }
}

/// Background reconciliation schedule.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// Whether `serve` runs the scheduler at all.
    pub enabled: bool,
    /// Run a pass as soon as the scheduler starts.
    pub run_on_startup: bool,
    pub interval_secs: u64,
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            run_on_startup: true,
            interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
        }
    }
}

/// All file-configurable settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub sync: SyncConfig,
    pub http: HttpConfig,
    pub rate_limit: RateLimitConfig,
    pub database: DbConfig,
}

/// Returns `<config_dir>/adsync/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("adsync").join("config.toml"))
}

/// Loads settings from `path`, or from [`default_config_path`] when `None`.
///
/// A missing default file yields the defaults. A missing file that was asked
/// for explicitly is an error.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, AppError> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match default_config_path() {
            Some(p) => (p, false),
            None => return Ok(Settings::default()),
        },
    };

    if !path.exists() {
        if explicit {
            return Err(AppError::Config(format!(
                "settings file not found: {}",
                path.display()
            )));
        }
        return Ok(Settings::default());
    }

    let raw = std::fs::read_to_string(&path).map_err(|e| {
        AppError::Config(format!("cannot read {}: {}", path.display(), e))
    })?;
    let settings: Settings = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("invalid {}: {}", path.display(), e)))?;

    if settings.rate_limit.max_calls == 0 {
        return Err(AppError::Config(
            "rate_limit.max_calls must be at least 1".to_string(),
        ));
    }
    if settings.sync.interval_secs == 0 {
        return Err(AppError::Config(
            "sync.interval_secs must be at least 1".to_string(),
        ));
    }

    tracing::debug!(path = %path.display(), "Loaded settings file");
    Ok(settings)
}
