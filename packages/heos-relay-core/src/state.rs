//! Core configuration and shared upstream status types.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::HEOS_CLI_PORT;

/// Configuration for the relay core.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    // Server
    /// Port for the HTTP server.
    pub bind_port: u16,

    /// Maximum number of concurrently attached stream sessions.
    pub max_sessions: usize,

    /// Events each session may have queued before it is considered stalled.
    pub subscriber_buffer: usize,

    /// Interval between SSE keep-alive comments (seconds).
    pub sse_keepalive_secs: u64,

    // Upstream
    /// HEOS device to connect to. When unset, SSDP discovery is used.
    pub heos_host: Option<IpAddr>,

    /// HEOS CLI port.
    pub heos_port: u16,

    /// How long one SSDP discovery run waits for answers (milliseconds).
    pub discovery_timeout_ms: u64,

    /// Commands queued while the upstream is not yet connected.
    pub pending_command_limit: usize,
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_sessions == 0 {
            return Err("max_sessions must be >= 1".to_string());
        }
        if self.subscriber_buffer == 0 {
            return Err("subscriber_buffer must be >= 1".to_string());
        }
        if self.sse_keepalive_secs == 0 {
            return Err("sse_keepalive_secs must be >= 1".to_string());
        }
        if self.heos_port == 0 {
            return Err("heos_port must be a valid port".to_string());
        }
        if self.pending_command_limit == 0 {
            return Err("pending_command_limit must be >= 1".to_string());
        }
        Ok(())
    }

    /// Explicit upstream address, if a host is configured.
    pub fn heos_addr(&self) -> Option<SocketAddr> {
        self.heos_host.map(|ip| SocketAddr::new(ip, self.heos_port))
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn sse_keepalive(&self) -> Duration {
        Duration::from_secs(self.sse_keepalive_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_port: 8080,
            max_sessions: 500,
            subscriber_buffer: 256,
            sse_keepalive_secs: 15,
            heos_host: None,
            heos_port: HEOS_CLI_PORT,
            discovery_timeout_ms: 3000,
            pending_command_limit: 64,
        }
    }
}

/// Lifecycle status of the upstream control connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum UpstreamStatus {
    /// Initial connection attempts are in progress.
    Connecting,
    /// A connection is live.
    Connected { addr: String },
    /// A live connection dropped and is being re-established.
    Reconnecting,
    /// Initial connection attempts were exhausted. Retries continue slowly.
    Failed { reason: String },
}

impl UpstreamStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

impl fmt::Display for UpstreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected { addr } => write!(f, "connected to {}", addr),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}
