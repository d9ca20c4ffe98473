//! Remote store abstraction.
//!
//! The store driver is an external collaborator: [`Store`] opens connections,
//! [`StoreConnection`] issues commands on one. The Redis implementation lives
//! in `cachegate-client`; [`MemoryStore`] is an in-process implementation
//! with fault injection for tests and local runs.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::Error;

pub use memory::MemoryStore;

/// A driver able to open connections to the remote store.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Perform the connection handshake.
    async fn connect(&self) -> Result<Arc<dyn StoreConnection>, Error>;

    /// Human-readable target, safe to log.
    fn describe(&self) -> String;
}

/// A live connection to the remote store.
///
/// Values are opaque strings; encoding is the cache service's concern.
#[async_trait]
pub trait StoreConnection: Send + Sync {
    /// Whether the driver still considers the link usable. Turns false once
    /// the driver has given up reconnecting on its own.
    fn is_connected(&self) -> bool;

    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, Error>;

    /// Write `value` with an expiry of `ttl_secs` seconds.
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), Error>;

    async fn exists(&self, key: &str) -> Result<bool, Error>;

    /// Synchronous delete. Returns the number of keys removed.
    async fn delete(&self, keys: &[String]) -> Result<u64, Error>;

    /// Non-blocking delete; memory is reclaimed in the background.
    async fn unlink(&self, keys: &[String]) -> Result<u64, Error>;

    /// Keys matching a glob-style pattern (`*`, `?`, `[...]`).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, Error>;

    async fn flush_all(&self) -> Result<(), Error>;

    /// Close the connection gracefully.
    async fn close(&self) -> Result<(), Error>;
}
