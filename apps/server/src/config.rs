//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to.
    /// Override: `HEOS_RELAY_BIND_PORT`
    pub bind_port: u16,

    /// HEOS device to control. Discovered via SSDP when unset.
    /// Override: `HEOS_RELAY_HEOS_HOST`
    pub heos_host: Option<IpAddr>,

    /// HEOS CLI port.
    pub heos_port: u16,

    /// Maximum number of concurrently attached stream clients.
    /// Override: `HEOS_RELAY_MAX_SESSIONS`
    pub max_sessions: usize,

    /// Per-client event queue depth.
    pub subscriber_buffer: usize,

    /// Seconds between SSE keep-alive comments.
    pub sse_keepalive_secs: u64,

    /// SSDP discovery wait (milliseconds).
    /// Override: `HEOS_RELAY_DISCOVERY_TIMEOUT_MS`
    pub discovery_timeout_ms: u64,

    /// Commands held while the upstream is connecting.
    pub pending_command_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = heos_relay_core::Config::default();
        Self {
            bind_port: core.bind_port,
            heos_host: core.heos_host,
            heos_port: core.heos_port,
            max_sessions: core.max_sessions,
            subscriber_buffer: core.subscriber_buffer,
            sse_keepalive_secs: core.sse_keepalive_secs,
            discovery_timeout_ms: core.discovery_timeout_ms,
            pending_command_limit: core.pending_command_limit,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("HEOS_RELAY_MAX_SESSIONS") {
            if let Ok(max) = val.parse() {
                self.max_sessions = max;
            }
        }

        if let Ok(val) = std::env::var("HEOS_RELAY_DISCOVERY_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                self.discovery_timeout_ms = ms;
            }
        }

        // HEOS_RELAY_BIND_PORT and HEOS_RELAY_HEOS_HOST are handled by clap
        // via #[arg(env = ...)] in main.rs
    }

    /// Converts to heos-relay-core's Config type.
    pub fn to_core_config(&self) -> heos_relay_core::Config {
        heos_relay_core::Config {
            bind_port: self.bind_port,
            max_sessions: self.max_sessions,
            subscriber_buffer: self.subscriber_buffer,
            sse_keepalive_secs: self.sse_keepalive_secs,
            heos_host: self.heos_host,
            heos_port: self.heos_port,
            discovery_timeout_ms: self.discovery_timeout_ms,
            pending_command_limit: self.pending_command_limit,
        }
    }
}
