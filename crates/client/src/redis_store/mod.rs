//! Redis driver for the cache service.
//!
//! ### Connections
//! - One multiplexed tokio connection per handshake, verified with PING
//! - At most `command_queue_max` commands in flight; overflow fails fast
//!
//! ### Link repair
//! - A dropped link is repaired in the background on the store-connect
//!   backoff schedule (1s doubling to 30s, plus jitter)
//! - After `max_retries` failed repairs the connection reports not connected
//!
//! ### Logging
//! - Only redacted URLs are ever logged

mod connection;
mod error;
pub mod url;

use std::sync::Arc;

use async_trait::async_trait;
use cachegate_core::{AppConfig, BackoffPolicy, Error, Store, StoreConnection};

pub use connection::RedisConnection;
pub use self::url::{UrlError, parse_store_url, redact};

use error::handshake_error;

/// Configuration for the Redis driver.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Store URL (`redis://`, `rediss://`, `unix://`, `redis+unix://`).
    pub url: String,

    /// Repair attempts on a dropped link before giving up (default: 10)
    pub max_retries: u32,

    /// Maximum commands in flight (default: 5000)
    pub command_queue_max: usize,

    /// Delay schedule between repair attempts
    pub reconnect: BackoffPolicy,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            max_retries: 10,
            command_queue_max: 5_000,
            reconnect: BackoffPolicy::store_connect(),
        }
    }
}

impl From<&AppConfig> for RedisConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            url: config.redis_url.clone(),
            max_retries: config.driver_max_retries,
            command_queue_max: config.command_queue_max,
            reconnect: BackoffPolicy::store_connect(),
        }
    }
}

/// [`Store`] backed by a Redis server.
pub struct RedisStore {
    client: redis::Client,
    config: RedisConfig,
    target: String,
}

impl RedisStore {
    /// Validate the URL and prepare a client. No connection is opened.
    pub fn new(config: RedisConfig) -> Result<Self, Error> {
        let url = parse_store_url(&config.url).map_err(|e| Error::InvalidInput(format!("store URL: {e}")))?;
        let target = redact(&url);
        let client = redis::Client::open(url.as_str())
            .map_err(|e| Error::InvalidInput(format!("store URL {target}: {e}")))?;

        Ok(Self { client, config, target })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn connect(&self) -> Result<Arc<dyn StoreConnection>, Error> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(handshake_error)?;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await.map_err(handshake_error)?;
        tracing::debug!(store = %self.target, %pong, "Store handshake complete");

        Ok(Arc::new(RedisConnection::new(self.client.clone(), conn, &self.config, self.target.clone())))
    }

    fn describe(&self) -> String {
        self.target.clone()
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("target", &self.target)
            .field("max_retries", &self.config.max_retries)
            .field("command_queue_max", &self.config.command_queue_max)
            .finish()
    }
}
