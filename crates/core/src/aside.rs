//! Cache-aside reads for request handlers.
//!
//! Handlers look the key up first and serve a hit straight away. On a miss
//! they compute the value, answer with it, and let the write-back run on its
//! own task so a slow or broken cache never delays the response.

use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::service::{CacheService, encode};

/// A value together with whether it came from the cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Served<T> {
    pub value: T,
    pub cached: bool,
}

impl<T> Served<T> {
    pub fn hit(value: T) -> Self {
        Self { value, cached: true }
    }

    pub fn fresh(value: T) -> Self {
        Self { value, cached: false }
    }
}

impl CacheService {
    /// Serve `key` from the cache, or from `fetch` on a miss.
    ///
    /// Errors from `fetch` are returned unchanged and nothing is cached.
    pub async fn read_through<T, F, Fut, E>(&self, key: &str, ttl_secs: Option<u64>, fetch: F) -> Result<Served<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get_as::<T>(key).await {
            tracing::debug!(key, "Serving cached response");
            return Ok(Served::hit(value));
        }

        let value = fetch().await?;
        self.write_back(key, &value, ttl_secs);
        Ok(Served::fresh(value))
    }

    fn write_back<T: Serialize>(&self, key: &str, value: &T, ttl_secs: Option<u64>) {
        if !self.is_available() {
            return;
        }
        let payload = match encode(value) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(key, error = %err, "Skipping write-back of unserializable value");
                return;
            }
        };
        let Some(service) = self.handle() else {
            return;
        };

        let key = key.to_string();
        tokio::spawn(async move {
            if !service.set(&key, payload.as_str(), ttl_secs).await {
                tracing::debug!(key = %key, "Write-back did not reach the cache");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionManager, ConnectionSettings};
    use crate::key::request_key;
    use crate::service::ServiceSettings;
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
    struct Standing {
        team: String,
        wins: u32,
    }

    fn standings() -> Vec<Standing> {
        vec![Standing { team: "G2".into(), wins: 14 }, Standing { team: "FNC".into(), wins: 11 }]
    }

    async fn connected(store: &MemoryStore) -> Arc<CacheService> {
        let manager = Arc::new(ConnectionManager::new(Arc::new(store.clone()), ConnectionSettings::default()));
        let service = CacheService::new(manager, ServiceSettings::default());
        service.manager().connect().await.unwrap();
        assert!(service.is_available());
        service
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let store = MemoryStore::new();
        let cache = connected(&store).await;
        let key = request_key("standings", "GET", "/standings", "league=lec");

        let first = cache.read_through(&key, Some(60), || async { Ok::<_, String>(standings()) }).await.unwrap();
        assert_eq!(first, Served::fresh(standings()));

        // let the write-back task run
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = cache
            .read_through(&key, Some(60), || async { Err::<Vec<Standing>, _>("must not be called".to_string()) })
            .await
            .unwrap();
        assert_eq!(second, Served::hit(standings()));
    }

    #[tokio::test]
    async fn test_fetch_error_is_not_cached() {
        let store = MemoryStore::new();
        let cache = connected(&store).await;

        let result = cache
            .read_through("standings:GET /standings", None, || async { Err::<Vec<Standing>, _>("upstream down") })
            .await;
        assert_eq!(result.unwrap_err(), "upstream down");

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_unavailable_cache_still_serves() {
        let store = MemoryStore::unreachable();
        let manager = Arc::new(ConnectionManager::new(Arc::new(store.clone()), ConnectionSettings::default()));
        let cache = CacheService::new(manager, ServiceSettings::default());

        let served = cache.read_through("k", None, || async { Ok::<_, String>(standings()) }).await.unwrap();
        assert!(!served.cached);
        assert_eq!(served.value, standings());
        assert_eq!(store.command_calls(), 0);
    }
}
