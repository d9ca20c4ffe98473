//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

const URL_SCHEMES: &[&str] = &["redis://", "rediss://", "unix://", "redis+unix://"];

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `redis_url` is empty, and
    /// `ConfigError::Invalid` if:
    /// - `redis_url` has an unsupported scheme
    /// - `connect_timeout_ms` or `op_timeout_ms` is outside 100ms..=60s
    /// - any attempt ceiling, the queue depth or the default TTL is 0
    /// - `reconnect_base_ms` exceeds `reconnect_max_ms`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis_url.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "redis_url".into(),
                hint: "Set CACHEGATE_REDIS_URL environment variable".into(),
            });
        }
        if !URL_SCHEMES.iter().any(|scheme| self.redis_url.starts_with(scheme)) {
            return Err(ConfigError::Invalid {
                field: "redis_url".into(),
                reason: format!("scheme must be one of {}", URL_SCHEMES.join(", ")),
            });
        }

        for (field, value) in [("connect_timeout_ms", self.connect_timeout_ms), ("op_timeout_ms", self.op_timeout_ms)] {
            if value < 100 {
                return Err(ConfigError::Invalid { field: field.into(), reason: "must be at least 100ms".into() });
            }
            if value > 60_000 {
                return Err(ConfigError::Invalid { field: field.into(), reason: "must not exceed 60s (60000ms)".into() });
            }
        }

        for (field, value) in [
            ("max_connection_attempts", self.max_connection_attempts),
            ("max_reconnect_attempts", self.max_reconnect_attempts),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid { field: field.into(), reason: "must be greater than 0".into() });
            }
        }

        if self.command_queue_max == 0 {
            return Err(ConfigError::Invalid {
                field: "command_queue_max".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.default_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "default_ttl_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.reconnect_base_ms > self.reconnect_max_ms {
            return Err(ConfigError::Invalid {
                field: "reconnect_base_ms".into(),
                reason: "must not exceed reconnect_max_ms".into(),
            });
        }

        if self.max_reconnect_attempts > self.max_connection_attempts {
            tracing::warn!(
                max_reconnect_attempts = self.max_reconnect_attempts,
                max_connection_attempts = self.max_connection_attempts,
                "Service reconnect budget exceeds the connection attempt ceiling; \
                 the ceiling will disable the cache first"
            );
        }

        Ok(())
    }
}
