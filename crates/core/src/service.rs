//! Best-effort cache service.
//!
//! [`CacheService`] never fails a caller because the store is down. Every
//! public operation checks availability first and collapses store errors into
//! a miss (`None`) or `false`; the failing operation marks the cache
//! unavailable and schedules a reconnect. Consecutive failed reconnects are
//! counted by an embedded [`CircuitBreaker`]; once it opens, no further
//! reconnects are scheduled until [`CacheService::reactivate_cache`].

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;
use crate::backoff::BackoffPolicy;
use crate::circuit::{CircuitBreaker, Verdict};
use crate::connection::{ConnectionManager, ConnectionState};
use crate::store::StoreConnection;
use crate::timer::Timer;

/// Tunables for [`CacheService`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// TTL used when a write does not name one.
    pub default_ttl_secs: u64,
    /// Deadline for each store command.
    pub op_timeout: Duration,
    /// Failed reconnects tolerated before the circuit opens.
    pub max_reconnect_attempts: u32,
    /// Delay schedule between reconnects.
    pub reconnect_backoff: BackoffPolicy,
    /// Pattern deletes above this many keys use UNLINK.
    pub bulk_unlink_threshold: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            default_ttl_secs: 3_600,
            op_timeout: Duration::from_millis(1_500),
            max_reconnect_attempts: 3,
            reconnect_backoff: BackoffPolicy::service_reconnect(),
            bulk_unlink_threshold: 100,
        }
    }
}

/// Snapshot of the cache's health for operators.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatus {
    pub available: bool,
    pub permanently_disabled: bool,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
    pub connection_state: ConnectionState,
    pub connection_attempts: u32,
    pub max_connection_attempts: u32,
    /// RFC 3339 instant the circuit opened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_since: Option<String>,
}

/// How a pattern delete removed its keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeleteStrategy {
    /// Synchronous DEL.
    Delete,
    /// Background UNLINK.
    Unlink,
}

/// Result of a pattern delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BulkDelete {
    /// Keys matched by the pattern.
    pub count: usize,
    /// Absent when nothing matched.
    pub strategy: Option<DeleteStrategy>,
}

pub struct CacheService {
    manager: Arc<ConnectionManager>,
    settings: ServiceSettings,
    breaker: CircuitBreaker,
    available: AtomicBool,
    reconnect_timer: Timer,
    this: Weak<CacheService>,
}

impl CacheService {
    pub fn new(manager: Arc<ConnectionManager>, settings: ServiceSettings) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            breaker: CircuitBreaker::new(settings.max_reconnect_attempts),
            manager,
            settings,
            available: AtomicBool::new(false),
            reconnect_timer: Timer::new("cache-reconnect"),
            this: this.clone(),
        })
    }

    /// Kick off the first connection in the background.
    pub fn start(&self) {
        if let Some(service) = self.handle() {
            tokio::spawn(async move {
                service.connect_to_store().await;
            });
        }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub(crate) fn handle(&self) -> Option<Arc<Self>> {
        self.this.upgrade()
    }

    /// Whether cache operations will reach the store.
    ///
    /// Re-samples the connection manager; noticing a lost connection
    /// schedules a reconnect.
    pub fn is_available(&self) -> bool {
        if self.breaker.is_open() {
            return false;
        }

        let connected = self.manager.is_connected();
        let believed = self.available.swap(connected, Ordering::SeqCst);
        if believed != connected {
            if connected {
                tracing::info!("Store connection restored");
            } else {
                tracing::warn!("Store connection lost");
                self.schedule_reconnect();
            }
        }
        connected
    }

    pub fn is_permanently_disabled(&self) -> bool {
        self.breaker.is_open()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_timer.is_pending()
    }

    /// Read `key` as JSON, falling back to the raw string.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.get_as(key).await
    }

    /// Read `key` and decode it as `T`.
    ///
    /// Values that are not valid JSON for `T` are retried as a JSON string,
    /// so raw strings written by other clients still decode into `String`.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let conn = self.connection("get")?;
        let raw = self.exec("get", conn.get(key)).await??;
        decode(key, raw)
    }

    /// Write `value` under `key`. Strings are stored raw, anything else as JSON.
    ///
    /// `ttl_secs` defaults to the configured TTL.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_secs: Option<u64>) -> bool {
        let Some(conn) = self.connection("set") else {
            return false;
        };

        let payload = match encode(value) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(key, error = %err, "Refusing to cache a value that cannot be serialized");
                return false;
            }
        };

        // stores reject a zero expiry; one second is the shortest TTL
        let ttl = ttl_secs.unwrap_or(self.settings.default_ttl_secs).max(1);
        self.exec("set", conn.set(key, &payload, ttl)).await.is_some()
    }

    pub async fn has(&self, key: &str) -> bool {
        let Some(conn) = self.connection("has") else {
            return false;
        };
        self.exec("has", conn.exists(key)).await.unwrap_or(false)
    }

    /// Remove `key`. Returns whether an entry was removed.
    pub async fn delete(&self, key: &str) -> bool {
        let Some(conn) = self.connection("delete") else {
            return false;
        };
        let keys = [key.to_string()];
        self.exec("delete", conn.delete(&keys)).await.is_some_and(|removed| removed > 0)
    }

    /// Return the cached value for `key`, computing and caching it on a miss.
    ///
    /// `factory` runs only on a miss or when the cache is unavailable. Its
    /// error is returned as-is; cache failures never are.
    pub async fn get_or_set<T, F, Fut, E>(&self, key: &str, factory: F, ttl_secs: Option<u64>) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.is_available()
            && let Some(cached) = self.get_as::<T>(key).await
        {
            return Ok(cached);
        }

        let value = factory().await?;

        if self.is_available() {
            self.set(key, &value, ttl_secs).await;
        }

        Ok(value)
    }

    /// Keys matching a glob pattern; empty when unavailable.
    pub async fn keys(&self, pattern: &str) -> Vec<String> {
        let Some(conn) = self.connection("keys") else {
            return Vec::new();
        };
        self.exec("keys", conn.keys(pattern)).await.unwrap_or_default()
    }

    /// Values for `keys` in one round trip. Missing keys map to `None`.
    pub async fn get_many(&self, keys: &[String]) -> BTreeMap<String, Option<Value>> {
        if keys.is_empty() {
            return BTreeMap::new();
        }
        let Some(conn) = self.connection("get_many") else {
            return BTreeMap::new();
        };
        let Some(values) = self.exec("get_many", conn.get_many(keys)).await else {
            return BTreeMap::new();
        };

        keys.iter()
            .cloned()
            .zip(values)
            .map(|(key, raw)| {
                let value = raw.and_then(|raw| decode(&key, raw));
                (key, value)
            })
            .collect()
    }

    /// Delete every key matching `pattern`.
    ///
    /// Large matches go through UNLINK so the store reclaims memory off its
    /// command thread. `None` when unavailable or the store failed.
    pub async fn delete_many(&self, pattern: &str) -> Option<BulkDelete> {
        let conn = self.connection("delete_many")?;
        let keys = self.exec("keys", conn.keys(pattern)).await?;

        if keys.is_empty() {
            return Some(BulkDelete { count: 0, strategy: None });
        }

        let strategy = if keys.len() > self.settings.bulk_unlink_threshold {
            self.exec("unlink", conn.unlink(&keys)).await?;
            DeleteStrategy::Unlink
        } else {
            self.exec("delete", conn.delete(&keys)).await?;
            DeleteStrategy::Delete
        };

        tracing::info!(pattern, count = keys.len(), ?strategy, "Cleared cache keys");
        Some(BulkDelete { count: keys.len(), strategy: Some(strategy) })
    }

    /// Drop everything in the store.
    pub async fn flush_all(&self) -> bool {
        let Some(conn) = self.connection("flush_all") else {
            tracing::warn!("Cannot flush cache: store is not available");
            return false;
        };
        let flushed = self.exec("flush_all", conn.flush_all()).await.is_some();
        if flushed {
            tracing::info!("Cache flushed");
        }
        flushed
    }

    /// Re-enable a permanently disabled cache.
    ///
    /// Closes the circuit, zeroes both attempt counters and makes one
    /// connection attempt. If that fails the circuit opens again. On a cache
    /// that is not disabled this only reports availability.
    pub async fn reactivate_cache(&self) -> bool {
        if !self.breaker.is_open() {
            return self.is_available();
        }

        tracing::info!("Trying to reactivate the permanently disabled cache");
        self.breaker.reset();
        self.manager.reset_attempts();

        match self.manager.connect().await {
            Ok(()) => {
                self.mark_connected();
                true
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to reactivate the cache");
                self.available.store(false, Ordering::SeqCst);
                if let Verdict::Tripped { attempts } = self.breaker.trip() {
                    self.disable(attempts);
                }
                false
            }
        }
    }

    pub fn status(&self) -> CacheStatus {
        let available = self.is_available();
        let disabled = self.breaker.is_open();
        CacheStatus {
            available,
            permanently_disabled: disabled,
            reconnect_attempts: self.breaker.failures(),
            max_reconnect_attempts: self.breaker.max_failures(),
            connection_state: self.manager.state(),
            connection_attempts: self.manager.current_attempts(),
            max_connection_attempts: self.manager.max_attempts(),
            disabled_since: self.breaker.opened_at().map(|at| at.to_rfc3339()),
        }
    }

    /// Cancel the reconnect schedule and close the connection.
    pub async fn shutdown(&self) {
        self.reconnect_timer.cancel();
        self.available.store(false, Ordering::SeqCst);
        if let Err(err) = self.manager.shutdown().await {
            tracing::error!(error = %err, "Error shutting down store connection");
        }
    }

    async fn connect_to_store(&self) -> bool {
        if self.breaker.is_open() {
            tracing::warn!("Cache has been permanently disabled after consecutive failures");
            return false;
        }

        match self.manager.connect().await {
            Ok(()) => {
                self.mark_connected();
                true
            }
            Err(Error::AlreadyConnecting) => {
                tracing::debug!("Store connection already in progress");
                false
            }
            Err(Error::ShutDown) => {
                self.available.store(false, Ordering::SeqCst);
                tracing::debug!("Cache service is shut down, not connecting");
                false
            }
            Err(err) => {
                self.available.store(false, Ordering::SeqCst);
                let verdict = match err {
                    Error::AttemptsExhausted { .. } => self.breaker.trip(),
                    _ => self.breaker.record_failure(),
                };
                match verdict {
                    Verdict::Retry { attempt } => {
                        tracing::warn!(
                            attempt,
                            max_attempts = self.breaker.max_failures(),
                            error = %err,
                            "Failed to connect to store; the application will continue to function without cache"
                        );
                        self.schedule_reconnect();
                    }
                    Verdict::Tripped { attempts } => self.disable(attempts),
                }
                false
            }
        }
    }

    fn mark_connected(&self) {
        self.available.store(true, Ordering::SeqCst);
        self.breaker.record_success();
        self.reconnect_timer.cancel();
        tracing::info!("Cache service successfully connected");
    }

    fn disable(&self, attempts: u32) {
        self.reconnect_timer.cancel();
        self.manager.reset_attempts();
        tracing::warn!(
            attempts,
            "Cache has been permanently disabled. The application will continue to function without cache"
        );
    }

    fn schedule_reconnect(&self) {
        if self.breaker.is_open() {
            return;
        }

        let delay = self
            .settings
            .reconnect_backoff
            .delay(self.breaker.failures().saturating_sub(1));
        let this = self.this.clone();
        let scheduled = self.reconnect_timer.schedule(delay, async move {
            if let Some(service) = this.upgrade() {
                service.connect_to_store().await;
            }
        });

        if scheduled {
            tracing::info!(delay_ms = delay.as_millis() as u64, "Scheduling store reconnection attempt");
        }
    }

    fn connection(&self, op: &'static str) -> Option<Arc<dyn StoreConnection>> {
        if !self.is_available() {
            tracing::debug!(op, "Cache unavailable, skipping");
            return None;
        }
        match self.manager.connection() {
            Ok(conn) => Some(conn),
            Err(err) => {
                self.degrade(op, &err);
                None
            }
        }
    }

    async fn exec<T, F>(&self, op: &'static str, command: F) -> Option<T>
    where
        F: Future<Output = Result<T, Error>>,
    {
        let result = match tokio::time::timeout(self.settings.op_timeout, command).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!("{op} exceeded {}ms", self.settings.op_timeout.as_millis()))),
        };
        result.inspect_err(|err| self.degrade(op, err)).ok()
    }

    fn degrade(&self, op: &'static str, err: &Error) {
        tracing::error!(op, error = %err, "Cache operation failed");
        self.available.store(false, Ordering::SeqCst);
        self.schedule_reconnect();
    }
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("manager", &self.manager)
            .field("breaker", &self.breaker)
            .field("available", &self.available)
            .finish()
    }
}

/// Strings pass through unencoded; everything else becomes JSON text.
pub(crate) fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, Error> {
    match serde_json::to_value(value)? {
        Value::String(raw) => Ok(raw),
        other => Ok(other.to_string()),
    }
}

pub(crate) fn decode<T: DeserializeOwned>(key: &str, raw: String) -> Option<T> {
    match serde_json::from_str::<T>(&raw) {
        Ok(value) => Some(value),
        Err(_) => serde_json::from_value(Value::String(raw))
            .inspect_err(|err| tracing::debug!(key, error = %err, "Cached value does not decode as requested type"))
            .ok(),
    }
}
