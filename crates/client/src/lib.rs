//! Client code for cachegate.
//!
//! This crate provides the Redis driver behind the core [`Store`] trait:
//! URL validation and redaction, the multiplexed tokio connection with its
//! command queue cap, and background link repair.
//!
//! [`Store`]: cachegate_core::Store

pub mod redis_store;

pub use redis_store::{RedisConfig, RedisConnection, RedisStore, UrlError, parse_store_url, redact};
