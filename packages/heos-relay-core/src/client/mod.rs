//! Client side of the relay.
//!
//! # Module Structure
//!
//! - `model` - Players and now-playing state
//! - `event` - Classification of relayed envelopes
//! - `reconciler` - Pure reducer and the state owner built on it
//! - `position` - Playback position extrapolation
//! - `selection` - Persistence of the selected player
//! - `sse_codec` - `text/event-stream` decoding
//! - `stream` - Streaming endpoint consumer
//! - `commands` - Typed helpers for the command endpoints

pub mod commands;
pub mod event;
pub mod model;
pub mod position;
pub mod reconciler;
pub mod selection;
pub mod sse_codec;
pub mod stream;

pub use commands::RelayClient;
pub use event::KnownEvent;
pub use model::{NowPlaying, Pid, PlayState, Player, PlayerCollection};
pub use position::{format_mm_ss, PositionTracker};
pub use reconciler::{reduce, Reconciler};
pub use selection::{FileSelectionStore, MemorySelectionStore, SelectionStore};
pub use sse_codec::{SseDecoder, SseMessage};
pub use stream::{StreamClient, StreamUpdate};

use thiserror::Error;

use crate::error::ErrorCode;

/// Errors raised on the client side.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request to the relay failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The relay answered with a non-success status.
    #[error("HTTP error {0}: {1}")]
    HttpStatus(u16, String),

    /// The relay URL could not be parsed.
    #[error("Invalid relay URL: {0}")]
    InvalidUrl(String),

    /// The event stream ended or broke.
    #[error("Event stream error: {0}")]
    Stream(String),

    /// Selection of a player that is not in the roster.
    #[error("Unknown player: {0}")]
    UnknownPlayer(String),

    /// Local state file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ErrorCode for ClientError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_error",
            Self::HttpStatus(..) => "http_status",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Stream(_) => "stream_error",
            Self::UnknownPlayer(_) => "unknown_player",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
        }
    }
}

/// Convenient Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Parses a relay base URL, making sure joins land under its path.
pub(crate) fn parse_base_url(base: &str) -> ClientResult<reqwest::Url> {
    let normalized = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{}/", base)
    };
    let url = reqwest::Url::parse(&normalized)
        .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base, e)))?;
    if url.cannot_be_a_base() {
        return Err(ClientError::InvalidUrl(base.to_string()));
    }
    Ok(url)
}
