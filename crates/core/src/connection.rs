//! Connection lifecycle for the remote store.
//!
//! [`ConnectionManager`] owns the single store connection. It serializes
//! connect attempts, counts them against a ceiling, and zeroes the counter
//! once a burst of attempts has been quiet for the reset window.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::Error;
use crate::store::{Store, StoreConnection};
use crate::timer::Timer;

/// Connectivity of the managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Tunables for [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Connect attempts allowed before `connect` fails fast.
    pub max_attempts: u32,
    /// Handshake deadline per attempt.
    pub connect_timeout: Duration,
    /// Quiet window after the first attempt of a burst before the counter resets.
    pub reset_attempts_after: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            connect_timeout: Duration::from_secs(5),
            reset_attempts_after: Duration::from_secs(600),
        }
    }
}

struct Link {
    state: ConnectionState,
    conn: Option<Arc<dyn StoreConnection>>,
}

impl Link {
    fn is_live(&self) -> bool {
        self.state == ConnectionState::Connected && self.conn.as_ref().is_some_and(|c| c.is_connected())
    }
}

/// Owner of the single connection to the remote store.
pub struct ConnectionManager {
    store: Arc<dyn Store>,
    settings: ConnectionSettings,
    link: Mutex<Link>,
    attempts: Arc<AtomicU32>,
    reset_timer: Timer,
    shut_down: AtomicBool,
}

/// Returns the link to Disconnected if a connect future is dropped mid-handshake.
struct ConnectingGuard<'a> {
    link: &'a Mutex<Link>,
    armed: bool,
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut link = self.link.lock();
            if link.state == ConnectionState::Connecting {
                link.state = ConnectionState::Disconnected;
            }
        }
    }
}

impl ConnectionManager {
    pub fn new(store: Arc<dyn Store>, settings: ConnectionSettings) -> Self {
        Self {
            store,
            settings,
            link: Mutex::new(Link { state: ConnectionState::Disconnected, conn: None }),
            attempts: Arc::new(AtomicU32::new(0)),
            reset_timer: Timer::new("connection-attempts-reset"),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Establish the connection.
    ///
    /// Returns immediately when already connected. Fails fast with
    /// [`Error::AlreadyConnecting`] while another attempt is in flight and with
    /// [`Error::AttemptsExhausted`] once the ceiling is reached; neither
    /// counts as an attempt. A handshake that exceeds the connect timeout
    /// fails with [`Error::Timeout`] and counts against the budget. After
    /// [`shutdown`](Self::shutdown) every call fails with [`Error::ShutDown`].
    pub async fn connect(&self) -> Result<(), Error> {
        let attempt = {
            let mut link = self.link.lock();
            if self.shut_down.load(Ordering::SeqCst) {
                return Err(Error::ShutDown);
            }
            match link.state {
                ConnectionState::Connecting => return Err(Error::AlreadyConnecting),
                ConnectionState::Connected if link.is_live() => return Ok(()),
                _ => {}
            }

            let max = self.settings.max_attempts;
            if self.attempts.load(Ordering::SeqCst) >= max {
                tracing::error!(max_attempts = max, "Maximum store connection attempts reached");
                return Err(Error::AttemptsExhausted { max });
            }

            link.state = ConnectionState::Connecting;
            link.conn = None;
            self.attempts.fetch_add(1, Ordering::SeqCst) + 1
        };
        let mut guard = ConnectingGuard { link: &self.link, armed: true };

        if attempt == 1 {
            self.arm_attempts_reset();
        }

        let store = self.store.describe();
        tracing::info!(attempt, max_attempts = self.settings.max_attempts, %store, "Connecting to store");

        let outcome = match tokio::time::timeout(self.settings.connect_timeout, self.store.connect()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "store connection exceeded {}ms",
                self.settings.connect_timeout.as_millis()
            ))),
        };

        guard.armed = false;
        // shutdown flag is read under the link lock
        let discarded = {
            let mut link = self.link.lock();
            match outcome {
                Ok(conn) if self.shut_down.load(Ordering::SeqCst) => {
                    link.state = ConnectionState::Disconnected;
                    conn
                }
                Ok(conn) => {
                    link.state = ConnectionState::Connected;
                    link.conn = Some(conn);
                    self.attempts.store(0, Ordering::SeqCst);
                    self.reset_timer.cancel();
                    tracing::info!(%store, "Store connection established");
                    return Ok(());
                }
                Err(err) => {
                    link.state = ConnectionState::Disconnected;
                    tracing::error!(
                        attempt,
                        max_attempts = self.settings.max_attempts,
                        error = %err,
                        "Failed to connect to store"
                    );
                    return Err(err);
                }
            }
        };

        if let Err(err) = discarded.close().await {
            tracing::error!(error = %err, "Error closing store connection opened during shutdown");
        }
        tracing::info!(%store, "Discarded store connection opened during shutdown");
        Err(Error::ShutDown)
    }

    /// Whether a live connection is available right now.
    pub fn is_connected(&self) -> bool {
        self.link.lock().is_live()
    }

    /// Current state. A connection the driver has given up on reads as Disconnected.
    pub fn state(&self) -> ConnectionState {
        let link = self.link.lock();
        match link.state {
            ConnectionState::Connected if !link.is_live() => ConnectionState::Disconnected,
            state => state,
        }
    }

    /// The live connection handle.
    pub fn connection(&self) -> Result<Arc<dyn StoreConnection>, Error> {
        let link = self.link.lock();
        match &link.conn {
            Some(conn) if link.is_live() => Ok(Arc::clone(conn)),
            _ => {
                tracing::warn!("Attempt to use a store connection that is not connected");
                Err(Error::NotConnected)
            }
        }
    }

    /// Close the connection if one is open. Idempotent.
    pub async fn disconnect(&self) -> Result<(), Error> {
        let conn = {
            let mut link = self.link.lock();
            if link.state == ConnectionState::Connecting {
                return Ok(());
            }
            link.state = ConnectionState::Disconnected;
            link.conn.take()
        };

        if let Some(conn) = conn {
            conn.close().await.inspect_err(|err| {
                tracing::error!(error = %err, "Error closing store connection");
            })?;
            tracing::info!("Store connection closed");
        }
        Ok(())
    }

    /// Zero the attempt counter and drop the pending idle reset. The next
    /// burst arms a fresh one.
    pub fn reset_attempts(&self) {
        self.attempts.store(0, Ordering::SeqCst);
        self.reset_timer.cancel();
        tracing::info!("Store connection attempt counter manually reset");
    }

    pub fn current_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn max_attempts(&self) -> u32 {
        self.settings.max_attempts
    }

    /// Cancel timers and close the connection. A connect still in flight
    /// closes its fresh connection instead of publishing it.
    pub async fn shutdown(&self) -> Result<(), Error> {
        self.shut_down.store(true, Ordering::SeqCst);
        self.reset_timer.cancel();
        self.disconnect().await
    }

    fn arm_attempts_reset(&self) {
        let attempts = Arc::clone(&self.attempts);
        self.reset_timer.reschedule(self.settings.reset_attempts_after, async move {
            attempts.store(0, Ordering::SeqCst);
            tracing::info!("Resetting store connection attempt counter");
        });
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("target", &self.store.describe())
            .field("state", &self.state())
            .field("attempts", &self.current_attempts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn manager(store: &MemoryStore) -> ConnectionManager {
        ConnectionManager::new(Arc::new(store.clone()), ConnectionSettings::default())
    }

    #[tokio::test]
    async fn test_connect_success() {
        let store = MemoryStore::new();
        let manager = manager(&store);

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        manager.connect().await.unwrap();

        assert!(manager.is_connected());
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.current_attempts(), 0);
        assert!(manager.connection().is_ok());
    }

    #[tokio::test]
    async fn test_connect_when_connected_is_noop() {
        let store = MemoryStore::new();
        let manager = manager(&store);

        manager.connect().await.unwrap();
        manager.connect().await.unwrap();
        assert_eq!(store.connect_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_never_exceed_ceiling() {
        let store = MemoryStore::unreachable();
        let manager = manager(&store);

        for attempt in 1..=5 {
            let result = manager.connect().await;
            assert!(matches!(result, Err(Error::HandshakeFailed(_))));
            assert_eq!(manager.current_attempts(), attempt);
        }

        for _ in 0..3 {
            let result = manager.connect().await;
            assert!(matches!(result, Err(Error::AttemptsExhausted { max: 5 })));
            assert_eq!(manager.current_attempts(), 5);
        }
        assert_eq!(store.connect_calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_counter() {
        let store = MemoryStore::unreachable();
        let manager = manager(&store);

        manager.connect().await.unwrap_err();
        manager.connect().await.unwrap_err();
        assert_eq!(manager.current_attempts(), 2);

        store.set_reachable(true);
        manager.connect().await.unwrap();
        assert_eq!(manager.current_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_reset_zeroes_counter() {
        let store = MemoryStore::unreachable();
        let manager = manager(&store);

        for _ in 0..5 {
            manager.connect().await.unwrap_err();
        }
        assert!(matches!(manager.connect().await, Err(Error::AttemptsExhausted { .. })));

        tokio::time::sleep(Duration::from_secs(601)).await;
        assert_eq!(manager.current_attempts(), 0);

        store.set_reachable(true);
        manager.connect().await.unwrap();
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_reset() {
        let store = MemoryStore::unreachable();
        let manager = manager(&store);

        for _ in 0..5 {
            manager.connect().await.unwrap_err();
        }
        manager.reset_attempts();
        assert_eq!(manager.current_attempts(), 0);
        assert!(matches!(manager.connect().await, Err(Error::HandshakeFailed(_))));
        assert_eq!(manager.current_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_counts_as_attempt() {
        let store = MemoryStore::new();
        store.set_connect_delay(Duration::from_secs(10));
        let manager = manager(&store);

        let result = manager.connect().await;
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert_eq!(manager.current_attempts(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_connect_fails_fast() {
        let store = MemoryStore::new();
        store.set_connect_delay(Duration::from_millis(100));
        let manager = manager(&store);

        let (first, second, third) = tokio::join!(manager.connect(), manager.connect(), manager.connect());

        assert!(first.is_ok());
        assert!(matches!(second, Err(Error::AlreadyConnecting)));
        assert!(matches!(third, Err(Error::AlreadyConnecting)));
        assert_eq!(store.connect_calls(), 1);
        assert_eq!(manager.current_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_connect_returns_to_disconnected() {
        let store = MemoryStore::new();
        store.set_connect_delay(Duration::from_secs(2));
        let manager = manager(&store);

        let abandoned = tokio::time::timeout(Duration::from_secs(1), manager.connect()).await;
        assert!(abandoned.is_err());
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        store.set_connect_delay(Duration::ZERO);
        manager.connect().await.unwrap();
    }

    #[tokio::test]
    async fn test_severed_link_reads_disconnected() {
        let store = MemoryStore::new();
        let manager = manager(&store);
        manager.connect().await.unwrap();

        store.sever();
        assert!(!manager.is_connected());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(matches!(manager.connection(), Err(Error::NotConnected)));

        manager.connect().await.unwrap();
        assert!(manager.is_connected());
        assert_eq!(store.connect_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_connect_discards_connection() {
        let store = MemoryStore::new();
        store.set_connect_delay(Duration::from_secs(1));
        let manager = Arc::new(manager(&store));

        let pending = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.connect().await }
        });
        tokio::task::yield_now().await;
        assert_eq!(manager.state(), ConnectionState::Connecting);

        manager.shutdown().await.unwrap();
        assert!(matches!(pending.await.unwrap(), Err(Error::ShutDown)));
        assert!(!manager.is_connected());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(matches!(manager.connection(), Err(Error::NotConnected)));

        assert!(matches!(manager.connect().await, Err(Error::ShutDown)));
        assert_eq!(store.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let store = MemoryStore::new();
        let manager = manager(&store);
        manager.connect().await.unwrap();

        manager.disconnect().await.unwrap();
        manager.disconnect().await.unwrap();
        assert!(!manager.is_connected());
    }
}
