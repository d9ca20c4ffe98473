//! One multiplexed Redis link with in-place repair.
//!
//! Commands share a single multiplexed tokio connection. A command failing on
//! a broken link takes the link down and starts one background repair loop
//! on the store-connect backoff schedule. Once the driver retry ceiling is
//! spent the loop stops and the connection reports not connected, handing
//! recovery back to the connection manager.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use cachegate_core::{BackoffPolicy, Error, StoreConnection};
use parking_lot::RwLock;
use redis::aio::MultiplexedConnection;
use redis::{Cmd, FromRedisValue, RedisError};
use tokio::sync::Semaphore;

use super::RedisConfig;
use super::error::{command_error, is_link_failure};

/// Keys requested per SCAN round trip.
const SCAN_COUNT: usize = 500;

struct Link {
    client: redis::Client,
    conn: RwLock<Option<MultiplexedConnection>>,
    closed: AtomicBool,
    repairing: AtomicBool,
    /// Repair loops started over the link's lifetime.
    repairs: AtomicU32,
    /// Reconnect attempts that failed, across all loops.
    failed_repairs: AtomicU32,
    permits: Semaphore,
    queue_max: usize,
    max_retries: u32,
    backoff: BackoffPolicy,
    target: String,
}

/// A live connection handed out by [`RedisStore`](super::RedisStore).
pub struct RedisConnection {
    link: Arc<Link>,
}

impl RedisConnection {
    pub(crate) fn new(client: redis::Client, conn: MultiplexedConnection, config: &RedisConfig, target: String) -> Self {
        Self {
            link: Arc::new(Link {
                client,
                conn: RwLock::new(Some(conn)),
                closed: AtomicBool::new(false),
                repairing: AtomicBool::new(false),
                repairs: AtomicU32::new(0),
                failed_repairs: AtomicU32::new(0),
                permits: Semaphore::new(config.command_queue_max),
                queue_max: config.command_queue_max,
                max_retries: config.max_retries,
                backoff: config.reconnect,
                target,
            }),
        }
    }

    async fn run<T>(&self, cmd: &Cmd) -> Result<T, Error>
    where
        T: FromRedisValue + Send,
    {
        let _permit = self
            .link
            .permits
            .try_acquire()
            .map_err(|_| Error::QueueFull(self.link.queue_max))?;

        let mut conn = self.link.handle()?;
        match cmd.query_async(&mut conn).await {
            Ok(value) => Ok(value),
            Err(err) => {
                if is_link_failure(&err) {
                    Link::take_down(&self.link, &err);
                }
                Err(command_error(err))
            }
        }
    }
}

impl Link {
    fn handle(&self) -> Result<MultiplexedConnection, Error> {
        self.conn.read().clone().ok_or(Error::NotConnected)
    }

    fn take_down(link: &Arc<Self>, err: &RedisError) {
        if link.closed.load(Ordering::SeqCst) {
            return;
        }
        link.conn.write().take();

        if link.repairing.swap(true, Ordering::SeqCst) {
            return;
        }
        let repair = link.repairs.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::warn!(store = %link.target, repair, error = %err, "Store link dropped, repairing in background");

        let link = Arc::clone(link);
        tokio::spawn(async move { link.repair().await });
    }

    async fn repair(&self) {
        for attempt in 0..self.max_retries {
            tokio::time::sleep(self.backoff.delay(attempt)).await;
            if self.closed.load(Ordering::SeqCst) {
                break;
            }

            match self.client.get_multiplexed_async_connection().await {
                Ok(conn) => {
                    if !self.closed.load(Ordering::SeqCst) {
                        *self.conn.write() = Some(conn);
                        tracing::info!(store = %self.target, attempt = attempt + 1, "Store link restored");
                    }
                    self.repairing.store(false, Ordering::SeqCst);
                    return;
                }
                Err(err) => {
                    self.failed_repairs.fetch_add(1, Ordering::SeqCst);
                    tracing::warn!(
                        store = %self.target,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %err,
                        "Store link repair failed"
                    );
                }
            }
        }

        self.repairing.store(false, Ordering::SeqCst);
        if !self.closed.load(Ordering::SeqCst) {
            tracing::error!(
                store = %self.target,
                failed = self.failed_repairs.load(Ordering::SeqCst),
                "Maximum store reconnection attempts reached, giving up on link"
            );
        }
    }
}

impl Drop for RedisConnection {
    fn drop(&mut self) {
        self.link.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StoreConnection for RedisConnection {
    fn is_connected(&self) -> bool {
        !self.link.closed.load(Ordering::SeqCst) && self.link.conn.read().is_some()
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.run(&cmd).await
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, Error> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut cmd = redis::cmd("MGET");
        cmd.arg(keys);
        self.run(&cmd).await
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), Error> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("EX").arg(ttl_secs.max(1));
        self.run(&cmd).await
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        let found: u64 = self.run(&cmd).await?;
        Ok(found > 0)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, Error> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("DEL");
        cmd.arg(keys);
        self.run(&cmd).await
    }

    async fn unlink(&self, keys: &[String]) -> Result<u64, Error> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("UNLINK");
        cmd.arg(keys);
        self.run(&cmd).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, Error> {
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor).arg("MATCH").arg(pattern).arg("COUNT").arg(SCAN_COUNT);
            let (next, batch): (u64, Vec<String>) = self.run(&cmd).await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    async fn flush_all(&self) -> Result<(), Error> {
        self.run(&redis::cmd("FLUSHALL")).await
    }

    async fn close(&self) -> Result<(), Error> {
        self.link.closed.store(true, Ordering::SeqCst);
        self.link.conn.write().take();
        tracing::debug!(store = %self.link.target, "Store link closed");
        Ok(())
    }
}
