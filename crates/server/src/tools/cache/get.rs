//! cache_get tool implementation.
//!
//! Reads one cached value by key.

use cachegate_core::{CacheService, Error};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{json_result, require};

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// The cache key to read.
    pub key: String,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub key: String,
    /// JSON value, or the raw string when the entry is not JSON.
    pub value: serde_json::Value,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(cache: &CacheService, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    require("key", &params.key)?;

    if !cache.is_available() {
        return Err(Error::Unavailable.into());
    }

    let value = cache
        .get(&params.key)
        .await
        .ok_or_else(|| Error::KeyNotFound(params.key.clone()))?;

    json_result(&CacheGetOutput { key: params.key, value })
}
