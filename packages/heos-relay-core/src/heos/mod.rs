//! HEOS CLI protocol plumbing.
//!
//! # Module Structure
//!
//! - `command` - Command model and `heos://` line encoding
//! - `envelope` - Upstream record decoding and wire annotation
//! - `connection` - TCP connection with a serialized writer task
//! - `discovery` - SSDP discovery of HEOS devices
//! - `retry` - Backoff helper for connection attempts
//! - `traits` - Write-side abstraction used by services

pub mod command;
pub mod connection;
pub mod discovery;
pub mod envelope;
pub(crate) mod retry;
pub mod traits;

pub use command::HeosCommand;
pub use connection::{EventReader, HeosConnection};
pub use envelope::{CommandPath, EventEnvelope, HeosHeader, Message};
pub use traits::CommandSink;

use thiserror::Error;

/// Errors from the upstream connection and discovery.
#[derive(Debug, Error)]
pub enum HeosError {
    /// Socket-level failure (connect, read, write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A response line could not be decoded as a HEOS record.
    #[error("Failed to decode upstream record: {0}")]
    Decode(#[from] serde_json::Error),

    /// A response line exceeded the framing limit.
    #[error("Upstream framing error: {0}")]
    Framing(String),

    /// The connection's writer task has stopped.
    #[error("Upstream connection closed")]
    ConnectionClosed,

    /// No connection could be established; commands are not being accepted.
    #[error("{0}")]
    Unavailable(String),

    /// Connecting took longer than allowed.
    #[error("Timed out connecting to {0}")]
    ConnectTimeout(String),

    /// SSDP discovery found no HEOS device.
    #[error("No HEOS device answered discovery within {0}ms")]
    NoDevices(u64),
}

impl HeosError {
    /// Returns true if a later attempt might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::ConnectTimeout(_)
                | Self::NoDevices(_)
                | Self::ConnectionClosed
                | Self::Unavailable(_)
        )
    }
}

/// Result alias for upstream operations.
pub type HeosResult<T> = Result<T, HeosError>;
