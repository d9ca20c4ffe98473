//! Core types and shared functionality for cachegate.
//!
//! This crate provides:
//! - Connection lifecycle management for the remote store
//! - Backoff, timers and the circuit breaker governing reconnection
//! - The best-effort cache service and cache-aside helpers
//! - Unified error types
//! - Configuration structures

pub mod aside;
pub mod backoff;
pub mod circuit;
pub mod config;
pub mod connection;
pub mod error;
pub mod key;
pub mod service;
pub mod store;
pub mod timer;

pub use aside::Served;
pub use backoff::BackoffPolicy;
pub use circuit::{CircuitBreaker, CircuitState, Verdict};
pub use config::{AppConfig, ConfigError};
pub use connection::{ConnectionManager, ConnectionSettings, ConnectionState};
pub use error::Error;
pub use service::{BulkDelete, CacheService, CacheStatus, DeleteStrategy, ServiceSettings};
pub use store::{MemoryStore, Store, StoreConnection};
pub use timer::Timer;
