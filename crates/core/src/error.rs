//! Unified error types for cachegate.
//!
//! Display strings carry a stable `CODE:` prefix so operators can grep logs
//! and tool errors for the failure class.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Unified error type for the cache subsystem.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Another connect attempt is already in flight.
    #[error("ALREADY_CONNECTING: a connection attempt is already in progress")]
    AlreadyConnecting,

    /// The application-level connect ceiling has been reached.
    #[error("ATTEMPTS_EXHAUSTED: could not connect after {max} attempts")]
    AttemptsExhausted { max: u32 },

    /// A connect or command exceeded its deadline.
    #[error("TIMEOUT: {0}")]
    Timeout(String),

    /// The store refused or failed the connection handshake.
    #[error("HANDSHAKE_FAILED: {0}")]
    HandshakeFailed(String),

    /// A command was issued without a live connection.
    #[error("NOT_CONNECTED: store client is not connected")]
    NotConnected,

    /// The connection manager has been shut down.
    #[error("SHUT_DOWN: store connection manager is shut down")]
    ShutDown,

    /// A store command failed.
    #[error("STORE_ERROR: {0}")]
    Store(String),

    /// Too many commands queued on the connection.
    #[error("QUEUE_FULL: more than {0} commands in flight")]
    QueueFull(usize),

    /// A value could not be encoded for the store.
    #[error("SERIALIZATION_ERROR: {0}")]
    Serialization(String),

    /// The cache is disconnected or permanently disabled.
    #[error("CACHE_UNAVAILABLE")]
    Unavailable,

    /// No entry for the given key.
    #[error("KEY_NOT_FOUND: {0}")]
    KeyNotFound(String),

    /// Invalid input parameters.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::InvalidInput(_) => -32602,
            Error::KeyNotFound(_) => -32001,
            Error::Unavailable => -32002,
            Error::AlreadyConnecting | Error::AttemptsExhausted { .. } => -32003,
            Error::Timeout(_) => -32004,
            Error::HandshakeFailed(_) | Error::NotConnected | Error::ShutDown => -32005,
            Error::Store(_) | Error::QueueFull(_) => -32006,
            Error::Serialization(_) => -32007,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
