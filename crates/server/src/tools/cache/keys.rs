//! cache_keys and cache_values tool implementations.
//!
//! Both degrade to empty results while the cache is unavailable.

use std::collections::BTreeMap;

use cachegate_core::CacheService;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{json_result, require};

fn default_pattern() -> String {
    "*".to_string()
}

/// Parameters for the cache_keys tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheKeysParams {
    /// Glob pattern (`*`, `?`, `[...]`). Defaults to every key.
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

/// Output from the cache_keys tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheKeysOutput {
    pub keys: Vec<String>,
}

/// Parameters for the cache_values tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheValuesParams {
    /// Glob pattern selecting the keys to read.
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

/// Output from the cache_values tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheValuesOutput {
    /// Value per key; `null` when the key expired between listing and reading.
    pub values: BTreeMap<String, Option<serde_json::Value>>,
}

/// Implementation of the cache_keys tool.
pub async fn keys_impl(cache: &CacheService, params: CacheKeysParams) -> Result<CallToolResult, McpError> {
    require("pattern", &params.pattern)?;

    let keys = cache.keys(&params.pattern).await;
    json_result(&CacheKeysOutput { keys })
}

/// Implementation of the cache_values tool.
pub async fn values_impl(cache: &CacheService, params: CacheValuesParams) -> Result<CallToolResult, McpError> {
    require("pattern", &params.pattern)?;

    let keys = cache.keys(&params.pattern).await;
    let values = cache.get_many(&keys).await;
    json_result(&CacheValuesOutput { values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::cache::testing::{output, service};
    use cachegate_core::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_keys_by_pattern() {
        let store = MemoryStore::new();
        let cache = service(&store).await;
        cache.set("posts:1", "a", None).await;
        cache.set("posts:2", "b", None).await;
        cache.set("matches:1", "c", None).await;

        let result = keys_impl(&cache, CacheKeysParams { pattern: "posts:*".into() }).await.unwrap();
        let out: CacheKeysOutput = output(&result);
        assert_eq!(out.keys, vec!["posts:1", "posts:2"]);
    }

    #[test]
    fn test_keys_default_pattern() {
        let params: CacheKeysParams = serde_json::from_value(json!({})).unwrap();
        assert_eq!(params.pattern, "*");
    }

    #[tokio::test]
    async fn test_keys_unavailable_is_empty() {
        let store = MemoryStore::unreachable();
        let cache = service(&store).await;

        let result = keys_impl(&cache, CacheKeysParams { pattern: "*".into() }).await.unwrap();
        let out: CacheKeysOutput = output(&result);
        assert!(out.keys.is_empty());
    }

    #[tokio::test]
    async fn test_keys_blank_pattern() {
        let store = MemoryStore::new();
        let cache = service(&store).await;
        assert!(keys_impl(&cache, CacheKeysParams { pattern: " ".into() }).await.is_err());
    }

    #[tokio::test]
    async fn test_values_decode_json_and_raw() {
        let store = MemoryStore::new();
        let cache = service(&store).await;
        cache.set("teams:g2", &json!({"name": "G2", "region": "EU"}), None).await;
        cache.set("teams:raw", "plain text", None).await;

        let result = values_impl(&cache, CacheValuesParams { pattern: "teams:*".into() }).await.unwrap();
        let out: CacheValuesOutput = output(&result);
        assert_eq!(out.values.len(), 2);
        assert_eq!(out.values["teams:g2"], Some(json!({"name": "G2", "region": "EU"})));
        assert_eq!(out.values["teams:raw"], Some(json!("plain text")));
    }
}
