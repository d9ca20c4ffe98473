//! MCP tool implementations.
//!
//! This module contains all tools exposed by the cachegate server.

pub mod cache;
