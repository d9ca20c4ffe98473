//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (CACHEGATE_*)
//! 2. TOML config file (if CACHEGATE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::backoff::BackoffPolicy;
use crate::connection::ConnectionSettings;
use crate::service::ServiceSettings;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (CACHEGATE_*)
/// 2. TOML config file (if CACHEGATE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Connection URL of the remote store.
    ///
    /// Set via CACHEGATE_REDIS_URL environment variable.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Reconnect attempts the store driver makes on its own before giving up.
    ///
    /// Set via CACHEGATE_DRIVER_MAX_RETRIES environment variable.
    #[serde(default = "default_driver_max_retries")]
    pub driver_max_retries: u32,

    /// Handshake deadline for a single connect attempt, in milliseconds.
    ///
    /// Set via CACHEGATE_CONNECT_TIMEOUT_MS environment variable.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Maximum commands in flight on the store connection.
    ///
    /// Set via CACHEGATE_COMMAND_QUEUE_MAX environment variable.
    #[serde(default = "default_command_queue_max")]
    pub command_queue_max: usize,

    /// TTL applied when a write does not name one, in seconds.
    ///
    /// Set via CACHEGATE_DEFAULT_TTL_SECS environment variable.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Deadline for a single cache command, in milliseconds.
    ///
    /// Set via CACHEGATE_OP_TIMEOUT_MS environment variable.
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,

    /// Application-level ceiling on connect attempts.
    ///
    /// Set via CACHEGATE_MAX_CONNECTION_ATTEMPTS environment variable.
    #[serde(default = "default_max_connection_attempts")]
    pub max_connection_attempts: u32,

    /// Quiet window after which the connect attempt counter is zeroed.
    ///
    /// Set via CACHEGATE_RESET_ATTEMPTS_AFTER_MS environment variable.
    #[serde(default = "default_reset_attempts_after_ms")]
    pub reset_attempts_after_ms: u64,

    /// Failed reconnects the cache service tolerates before disabling itself.
    ///
    /// Set via CACHEGATE_MAX_RECONNECT_ATTEMPTS environment variable.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// First delay of the service reconnect schedule, in milliseconds.
    ///
    /// Set via CACHEGATE_RECONNECT_BASE_MS environment variable.
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,

    /// Ceiling of the service reconnect schedule, in milliseconds.
    ///
    /// Set via CACHEGATE_RECONNECT_MAX_MS environment variable.
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,

    /// Pattern deletes matching more keys than this use UNLINK instead of DEL.
    ///
    /// Set via CACHEGATE_BULK_UNLINK_THRESHOLD environment variable.
    #[serde(default = "default_bulk_unlink_threshold")]
    pub bulk_unlink_threshold: usize,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".into()
}

fn default_driver_max_retries() -> u32 {
    10
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_command_queue_max() -> usize {
    5_000
}

fn default_ttl_secs() -> u64 {
    3_600
}

fn default_op_timeout_ms() -> u64 {
    1_500
}

fn default_max_connection_attempts() -> u32 {
    5
}

fn default_reset_attempts_after_ms() -> u64 {
    600_000 // 10 minutes
}

fn default_max_reconnect_attempts() -> u32 {
    3
}

fn default_reconnect_base_ms() -> u64 {
    30_000
}

fn default_reconnect_max_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_bulk_unlink_threshold() -> usize {
    100
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            driver_max_retries: default_driver_max_retries(),
            connect_timeout_ms: default_connect_timeout_ms(),
            command_queue_max: default_command_queue_max(),
            default_ttl_secs: default_ttl_secs(),
            op_timeout_ms: default_op_timeout_ms(),
            max_connection_attempts: default_max_connection_attempts(),
            reset_attempts_after_ms: default_reset_attempts_after_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            bulk_unlink_threshold: default_bulk_unlink_threshold(),
        }
    }
}

impl AppConfig {
    /// Connect timeout as Duration for use with tokio.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Per-command timeout as Duration for use with tokio.
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    /// Settings for the [`ConnectionManager`](crate::ConnectionManager).
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            max_attempts: self.max_connection_attempts,
            connect_timeout: self.connect_timeout(),
            reset_attempts_after: Duration::from_millis(self.reset_attempts_after_ms),
        }
    }

    /// Settings for the [`CacheService`](crate::CacheService).
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            default_ttl_secs: self.default_ttl_secs,
            op_timeout: self.op_timeout(),
            max_reconnect_attempts: self.max_reconnect_attempts,
            reconnect_backoff: BackoffPolicy::service_reconnect()
                .with_base(Duration::from_millis(self.reconnect_base_ms))
                .with_max_delay(Duration::from_millis(self.reconnect_max_ms)),
            bulk_unlink_threshold: self.bulk_unlink_threshold,
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `CACHEGATE_`
    /// 2. TOML file from `CACHEGATE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("CACHEGATE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("CACHEGATE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
