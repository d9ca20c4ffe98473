//! Cache administration MCP tools.
//!
//! This module provides operator tools over the Redis-backed cache service.

pub mod get;
pub mod keys;
pub mod purge;
pub mod status;

pub use get::{CacheGetParams, get_impl};
pub use keys::{CacheKeysParams, CacheValuesParams, keys_impl, values_impl};
pub use purge::{CacheDeleteParams, CacheDeletePatternParams, delete_impl, delete_pattern_impl, flush_impl};
pub use status::{reactivate_impl, status_impl};

use cachegate_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

/// Render a tool output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output).map_err(Error::from)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Reject blank keys and patterns before they reach the store.
pub(crate) fn require(field: &str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use cachegate_core::{CacheService, ConnectionManager, ConnectionSettings, MemoryStore, ServiceSettings};
    use rmcp::model::CallToolResult;
    use serde::de::DeserializeOwned;

    /// A service over `store`, connected when the store is reachable.
    pub async fn service(store: &MemoryStore) -> Arc<CacheService> {
        let manager = Arc::new(ConnectionManager::new(Arc::new(store.clone()), ConnectionSettings::default()));
        let cache = CacheService::new(manager, ServiceSettings::default());
        let _ = cache.manager().connect().await;
        cache
    }

    pub fn output<T: DeserializeOwned>(result: &CallToolResult) -> T {
        let content_val = serde_json::to_value(&result.content[0]).unwrap();
        let text = content_val
            .get("text")
            .and_then(|v| v.as_str())
            .expect("Expected text field in content");
        serde_json::from_str(text).unwrap()
    }
}
