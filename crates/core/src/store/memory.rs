//! In-process store with fault injection.
//!
//! Behaves like a single Redis database: string values with per-key expiry on
//! tokio's clock, glob key patterns, DEL/UNLINK accounting. Tests flip it
//! unreachable, sever live links, slow it down or make commands fail.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{Store, StoreConnection};
use crate::Error;

/// Expiry used when a TTL overflows the clock.
const NEVER: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

#[derive(Debug)]
struct Shared {
    entries: RwLock<HashMap<String, Entry>>,
    reachable: AtomicBool,
    failing: AtomicBool,
    session: AtomicU64,
    connect_delay: parking_lot::Mutex<Duration>,
    command_delay: parking_lot::Mutex<Duration>,
    connects: AtomicUsize,
    commands: AtomicUsize,
    deletes: AtomicUsize,
    unlinks: AtomicUsize,
}

/// In-memory [`Store`]. Clones share the same data and fault switches.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// A reachable, empty store.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                entries: RwLock::new(HashMap::new()),
                reachable: AtomicBool::new(true),
                failing: AtomicBool::new(false),
                session: AtomicU64::new(0),
                connect_delay: parking_lot::Mutex::new(Duration::ZERO),
                command_delay: parking_lot::Mutex::new(Duration::ZERO),
                connects: AtomicUsize::new(0),
                commands: AtomicUsize::new(0),
                deletes: AtomicUsize::new(0),
                unlinks: AtomicUsize::new(0),
            }),
        }
    }

    /// A store that refuses every handshake until made reachable.
    pub fn unreachable() -> Self {
        let store = Self::new();
        store.set_reachable(false);
        store
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.shared.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make every command on a live connection fail.
    pub fn set_failing(&self, failing: bool) {
        self.shared.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay applied to each handshake.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.shared.connect_delay.lock() = delay;
    }

    /// Delay applied to each command.
    pub fn set_command_delay(&self, delay: Duration) {
        *self.shared.command_delay.lock() = delay;
    }

    /// Drop every live link, as a driver does once it stops reconnecting.
    pub fn sever(&self) {
        self.shared.session.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of handshakes attempted.
    pub fn connect_calls(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Number of commands issued on any connection.
    pub fn command_calls(&self) -> usize {
        self.shared.commands.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.shared.deletes.load(Ordering::SeqCst)
    }

    pub fn unlink_calls(&self) -> usize {
        self.shared.unlinks.load(Ordering::SeqCst)
    }

    /// Number of unexpired entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.shared.entries.read().await.values().filter(|e| e.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn connect(&self) -> Result<Arc<dyn StoreConnection>, Error> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);

        let delay = *self.shared.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if !self.shared.reachable.load(Ordering::SeqCst) {
            return Err(Error::HandshakeFailed("connection refused (memory store unreachable)".into()));
        }

        let session = self.shared.session.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Arc::new(MemoryConnection { shared: Arc::clone(&self.shared), session, closed: AtomicBool::new(false) }))
    }

    fn describe(&self) -> String {
        "memory://".into()
    }
}

#[derive(Debug)]
struct MemoryConnection {
    shared: Arc<Shared>,
    session: u64,
    closed: AtomicBool,
}

impl MemoryConnection {
    async fn begin(&self) -> Result<(), Error> {
        self.shared.commands.fetch_add(1, Ordering::SeqCst);

        if !self.is_connected() {
            return Err(Error::Store("connection closed".into()));
        }

        let delay = *self.shared.command_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.shared.failing.load(Ordering::SeqCst) {
            return Err(Error::Store("injected command failure".into()));
        }
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> u64 {
        let now = Instant::now();
        let mut entries = self.shared.entries.write().await;
        keys.iter()
            .filter_map(|key| entries.remove(key))
            .filter(|entry| entry.expires_at > now)
            .count() as u64
    }
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.shared.session.load(Ordering::SeqCst) == self.session
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        self.begin().await?;
        let now = Instant::now();
        let entries = self.shared.entries.read().await;
        Ok(entries.get(key).filter(|e| e.expires_at > now).map(|e| e.value.clone()))
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, Error> {
        self.begin().await?;
        let now = Instant::now();
        let entries = self.shared.entries.read().await;
        Ok(keys
            .iter()
            .map(|key| entries.get(key).filter(|e| e.expires_at > now).map(|e| e.value.clone()))
            .collect())
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), Error> {
        self.begin().await?;
        let now = Instant::now();
        let expires_at = now.checked_add(Duration::from_secs(ttl_secs)).unwrap_or(now + NEVER);
        self.shared
            .entries
            .write()
            .await
            .insert(key.to_string(), Entry { value: value.to_string(), expires_at });
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        self.begin().await?;
        let now = Instant::now();
        Ok(self.shared.entries.read().await.get(key).is_some_and(|e| e.expires_at > now))
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, Error> {
        self.begin().await?;
        self.shared.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(self.remove(keys).await)
    }

    async fn unlink(&self, keys: &[String]) -> Result<u64, Error> {
        self.begin().await?;
        self.shared.unlinks.fetch_add(1, Ordering::SeqCst);
        Ok(self.remove(keys).await)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, Error> {
        self.begin().await?;
        let matcher = glob_to_regex(pattern)?;
        let now = Instant::now();
        let entries = self.shared.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| entry.expires_at > now && matcher.is_match(key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn flush_all(&self) -> Result<(), Error> {
        self.begin().await?;
        self.shared.entries.write().await.clear();
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Translate a Redis glob pattern into an anchored regex.
fn glob_to_regex(pattern: &str) -> Result<Regex, Error> {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            '[' => {
                out.push('[');
                for class_char in chars.by_ref() {
                    if class_char == ']' {
                        break;
                    }
                    if class_char == '\\' || class_char == '[' {
                        out.push('\\');
                    }
                    out.push(class_char);
                }
                out.push(']');
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    Regex::new(&out).map_err(|e| Error::InvalidInput(format!("invalid key pattern {pattern:?}: {e}")))
}
