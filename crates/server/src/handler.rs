//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the cache administration tools.
use std::sync::Arc;

use crate::tools::cache::{
    CacheDeleteParams, CacheDeletePatternParams, CacheGetParams, CacheKeysParams, CacheValuesParams, delete_impl,
    delete_pattern_impl, flush_impl, get_impl, keys_impl, reactivate_impl, status_impl, values_impl,
};

use cachegate_core::CacheService;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for cachegate.
#[derive(Clone)]
pub struct CacheGateServer {
    cache: Arc<CacheService>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl CacheGateServer {
    /// Create a new server handler over a running cache service.
    pub fn new(cache: Arc<CacheService>) -> Self {
        Self { cache, tool_router: Self::tool_router() }
    }

    #[tool(description = "Report cache health: availability, whether it is permanently disabled, and attempt counters.")]
    async fn cache_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.cache).await
    }

    /// Re-enable a cache that disabled itself after repeated connection failures.
    #[tool(description = "Reactivate a permanently disabled cache. Resets counters and makes one connection attempt.")]
    async fn cache_reactivate(&self) -> Result<CallToolResult, McpError> {
        reactivate_impl(&self.cache).await
    }

    #[tool(description = "List cache keys matching a glob pattern (default '*'). Empty while the cache is unavailable.")]
    async fn cache_keys(&self, params: Parameters<CacheKeysParams>) -> Result<CallToolResult, McpError> {
        keys_impl(&self.cache, params.0).await
    }

    #[tool(description = "Read one cached value by key. JSON values are decoded; other values are returned as strings.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.cache, params.0).await
    }

    #[tool(description = "Read the values of every key matching a glob pattern in one round trip.")]
    async fn cache_values(&self, params: Parameters<CacheValuesParams>) -> Result<CallToolResult, McpError> {
        values_impl(&self.cache, params.0).await
    }

    #[tool(description = "Delete one cache key. Fails if the cache is unavailable or the key does not exist.")]
    async fn cache_delete(&self, params: Parameters<CacheDeleteParams>) -> Result<CallToolResult, McpError> {
        delete_impl(&self.cache, params.0).await
    }

    /// Large matches are removed with UNLINK so the store frees memory in the background.
    #[tool(description = "Delete every cache key matching a glob pattern. Returns the count and delete strategy used.")]
    async fn cache_delete_pattern(
        &self, params: Parameters<CacheDeletePatternParams>,
    ) -> Result<CallToolResult, McpError> {
        delete_pattern_impl(&self.cache, params.0).await
    }

    #[tool(description = "Remove every entry from the cache store.")]
    async fn cache_flush(&self) -> Result<CallToolResult, McpError> {
        flush_impl(&self.cache).await
    }
}

impl ServerHandler for CacheGateServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "cachegate".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
