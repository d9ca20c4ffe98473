//! Mapping of driver errors onto cache errors.

use cachegate_core::Error;
use redis::RedisError;

/// Whether the error means the link itself is gone, as opposed to a
/// rejected command.
pub(crate) fn is_link_failure(err: &RedisError) -> bool {
    err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() || err.is_timeout()
}

pub(crate) fn handshake_error(err: RedisError) -> Error {
    if err.is_timeout() { Error::Timeout(err.to_string()) } else { Error::HandshakeFailed(err.to_string()) }
}

pub(crate) fn command_error(err: RedisError) -> Error {
    if err.is_timeout() { Error::Timeout(err.to_string()) } else { Error::Store(err.to_string()) }
}
