//! cache_status and cache_reactivate tool implementations.

use cachegate_core::{CacheService, CacheStatus};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Output from the cache_reactivate tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheReactivateOutput {
    /// Whether the cache is usable after the attempt.
    pub success: bool,
    /// Status after the attempt.
    pub status: CacheStatus,
}

/// Implementation of the cache_status tool.
pub async fn status_impl(cache: &CacheService) -> Result<CallToolResult, McpError> {
    json_result(&cache.status())
}

/// Implementation of the cache_reactivate tool.
pub async fn reactivate_impl(cache: &CacheService) -> Result<CallToolResult, McpError> {
    let success = cache.reactivate_cache().await;
    json_result(&CacheReactivateOutput { success, status: cache.status() })
}
