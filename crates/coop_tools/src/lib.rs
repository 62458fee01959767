//! # Co-op Development Tools
//!
//! Command-line helpers for working with the session protocol:
//! - Packet decoder and encoder (hex <-> JSON)
//! - Session config validator

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod packet;
pub mod validate;

use thiserror::Error;

/// Errors surfaced by the tools.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Input is not valid hex.
    #[error("Invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Bytes are not a valid message.
    #[error(transparent)]
    Protocol(#[from] coop_core::error::ProtocolError),

    /// JSON input or output failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Config failed to load or validate.
    #[error(transparent)]
    Config(#[from] coop_core::error::ConfigError),

    /// Datagram is missing its control byte.
    #[error("Datagram is empty")]
    EmptyDatagram,
}

/// Result type for tool operations.
pub type Result<T> = std::result::Result<T, ToolError>;
