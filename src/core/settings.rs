//! Service settings: the live configuration artifact.

use super::Validate;
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete service configuration.
///
/// Every section has defaults, so an empty settings file (or none at all)
/// yields a usable configuration.
///
/// ```toml
/// [server]
/// host = "127.0.0.1"
/// port = 8000
///
/// [auth]
/// valid_tokens = ["token", "admin"]
/// admin_tokens = ["admin"]
///
/// [units]
/// dir = "apis"
/// hot_reload = true
///
/// [reload]
/// debounce_ms = 1000
/// workers = 3
///
/// [logging]
/// level = "info"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Bind address of the request-serving layer.
    pub server: ServerSettings,
    /// Token sets for request and admin access.
    pub auth: AuthSettings,
    /// Unit directory and watching.
    pub units: UnitSettings,
    /// Reload coordination tuning.
    pub reload: ReloadSettings,
    /// Log filter.
    pub logging: LoggingSettings,
}

/// Bind address of the request-serving layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Debug mode flag, passed through to the serving layer.
    pub debug: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            debug: false,
        }
    }
}

/// Token sets; refreshed on every configuration reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Tokens accepted for handler requests.
    pub valid_tokens: Vec<String>,
    /// Tokens accepted for administrative operations.
    pub admin_tokens: Vec<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            valid_tokens: vec!["token".to_string(), "admin".to_string()],
            admin_tokens: vec!["admin".to_string()],
        }
    }
}

/// Where units live and whether they are watched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitSettings {
    /// Flat directory holding one manifest file per unit.
    pub dir: PathBuf,
    /// Watch the directory and the settings file for changes.
    pub hot_reload: bool,
    /// Files whose name starts with this prefix are never loaded.
    pub reserved_prefix: String,
}

impl Default for UnitSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("apis"),
            hot_reload: true,
            reserved_prefix: "__".to_string(),
        }
    }
}

/// Reload coordination tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadSettings {
    /// Minimum quiet period before a unit reload starts, in milliseconds.
    pub debounce_ms: u64,
    /// Size of the blocking worker pool.
    pub workers: usize,
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            workers: 3,
        }
    }
}

impl ReloadSettings {
    /// The debounce interval as a `Duration`.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Log filter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing-subscriber` filter directive, e.g. `info` or
    /// `hotswap_handlers=debug,warn`.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Validate for ServiceConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ValidationError::invalid_field("server.port", "must be > 0"));
        }
        if self.units.dir.as_os_str().is_empty() {
            errors.push(ValidationError::invalid_field("units.dir", "must not be empty"));
        }
        if self.reload.workers == 0 {
            errors.push(ValidationError::invalid_field("reload.workers", "must be >= 1"));
        }
        if let Err(e) = tracing_subscriber::EnvFilter::try_new(&self.logging.level) {
            errors.push(ValidationError::invalid_field("logging.level", e.to_string()));
        }

        match ValidationError::from_list(errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
