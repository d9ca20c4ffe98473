//! cachegate server entry point.
//!
//! Boots the cache service against Redis and serves the operator tools over
//! the MCP stdio transport. Logging goes to stderr to avoid interfering with
//! the JSON-RPC protocol on stdout.
//!
//! The cache starts connecting in the background; the server is usable
//! immediately and keeps running whether or not Redis is reachable.

use std::sync::Arc;

use anyhow::Result;
use cachegate_client::{RedisConfig, RedisStore};
use cachegate_core::{AppConfig, CacheService, ConnectionManager, Store};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;

    let store = RedisStore::new(RedisConfig::from(&config))?;
    tracing::info!(store = %store.describe(), "Starting cachegate server on stdio transport");

    let manager = Arc::new(ConnectionManager::new(Arc::new(store), config.connection_settings()));
    let cache = CacheService::new(manager, config.service_settings());
    cache.start();

    let handler = handler::CacheGateServer::new(Arc::clone(&cache));
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    cache.shutdown().await;
    tracing::info!("cachegate server stopped");

    Ok(())
}
