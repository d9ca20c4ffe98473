//! cache_delete, cache_delete_pattern and cache_flush tool implementations.
//!
//! Destructive tools report an unavailable cache as `CACHE_UNAVAILABLE`
//! rather than an empty result.

use cachegate_core::{CacheService, DeleteStrategy, Error};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{json_result, require};

/// Parameters for the cache_delete tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheDeleteParams {
    /// The cache key to remove.
    pub key: String,
}

/// Parameters for the cache_delete_pattern tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheDeletePatternParams {
    /// Glob pattern selecting the keys to remove.
    pub pattern: String,
}

/// Output from the cache_delete and cache_flush tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheMessageOutput {
    pub message: String,
}

/// Output from the cache_delete_pattern tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheDeletePatternOutput {
    pub message: String,
    /// Number of keys removed.
    pub count: usize,
    /// `delete` or `unlink`; absent when nothing matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<DeleteStrategy>,
}

fn ensure_available(cache: &CacheService) -> Result<(), Error> {
    if cache.is_available() { Ok(()) } else { Err(Error::Unavailable) }
}

/// Implementation of the cache_delete tool.
pub async fn delete_impl(cache: &CacheService, params: CacheDeleteParams) -> Result<CallToolResult, McpError> {
    require("key", &params.key)?;
    ensure_available(cache)?;

    if !cache.has(&params.key).await {
        return Err(Error::KeyNotFound(params.key).into());
    }
    if !cache.delete(&params.key).await {
        return Err(Error::Store(format!("failed to delete key {:?}", params.key)).into());
    }

    json_result(&CacheMessageOutput { message: format!("Cache key {:?} successfully cleared", params.key) })
}

/// Implementation of the cache_delete_pattern tool.
pub async fn delete_pattern_impl(
    cache: &CacheService, params: CacheDeletePatternParams,
) -> Result<CallToolResult, McpError> {
    require("pattern", &params.pattern)?;
    ensure_available(cache)?;

    let report = cache.delete_many(&params.pattern).await.ok_or(Error::Unavailable)?;
    let message = if report.count == 0 {
        format!("No keys found matching pattern {:?}", params.pattern)
    } else {
        format!("Successfully cleared {} cache keys matching pattern {:?}", report.count, params.pattern)
    };

    json_result(&CacheDeletePatternOutput { message, count: report.count, strategy: report.strategy })
}

/// Implementation of the cache_flush tool.
pub async fn flush_impl(cache: &CacheService) -> Result<CallToolResult, McpError> {
    ensure_available(cache)?;

    if !cache.flush_all().await {
        return Err(Error::Store("flush failed".into()).into());
    }

    json_result(&CacheMessageOutput { message: "All cache successfully cleared".into() })
}
