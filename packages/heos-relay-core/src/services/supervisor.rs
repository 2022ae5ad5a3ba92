//! Background task owning the upstream connection lifecycle.
//!
//! Resolves the device (configured host or SSDP), connects with backoff,
//! attaches the connection to the shared [`UpstreamHandle`] and pumps every
//! decoded envelope through the primer into the hub. A dropped connection
//! starts the cycle again; exhausted attempts mark the upstream failed and
//! fall back to slow retries until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::events::EventHub;
use crate::heos::discovery::discover_first;
use crate::heos::retry::with_retry;
use crate::heos::{CommandSink, EventReader, HeosConnection, HeosError, HeosResult};
use crate::protocol_constants::{UPSTREAM_RETRY_DELAYS_MS, UPSTREAM_SLOW_RETRY_SECS};
use crate::state::Config;

use super::primer::RosterPrimer;
use super::upstream::UpstreamHandle;

/// Connection settings for the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Fixed device address; `None` means discover one.
    pub addr: Option<SocketAddr>,
    pub heos_port: u16,
    pub discovery_timeout: Duration,
    pub retry_delays_ms: Vec<u64>,
    pub slow_retry: Duration,
}

impl SupervisorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            addr: config.heos_addr(),
            heos_port: config.heos_port,
            discovery_timeout: config.discovery_timeout(),
            retry_delays_ms: UPSTREAM_RETRY_DELAYS_MS.to_vec(),
            slow_retry: Duration::from_secs(UPSTREAM_SLOW_RETRY_SECS),
        }
    }
}

/// Drives the upstream connection until cancelled.
pub struct UpstreamSupervisor {
    upstream: Arc<UpstreamHandle>,
    hub: Arc<EventHub>,
    primer: RosterPrimer,
    config: SupervisorConfig,
    cancel: CancellationToken,
}

impl UpstreamSupervisor {
    pub fn new(
        upstream: Arc<UpstreamHandle>,
        hub: Arc<EventHub>,
        config: SupervisorConfig,
        cancel: CancellationToken,
    ) -> Self {
        let primer = RosterPrimer::new(Arc::clone(&upstream) as Arc<dyn CommandSink>);
        Self {
            upstream,
            hub,
            primer,
            config,
            cancel,
        }
    }

    /// Spawns [`run`](Self::run) on the current runtime.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs connect/pump cycles until the cancellation token fires.
    pub async fn run(self) {
        log::info!("[Upstream] Supervisor started");

        loop {
            let attempt = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.establish() => result,
            };

            match attempt {
                Ok((connection, reader)) => {
                    let addr = connection.addr();
                    if let Err(e) = self.upstream.attach(Arc::new(connection), addr) {
                        log::warn!("[Upstream] Dropping connection to {}: {}", addr, e);
                        continue;
                    }
                    if let Err(e) = self.primer.on_connected() {
                        log::warn!("[Upstream] Initial commands to {} not sent: {}", addr, e);
                    }

                    let reason = tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        reason = self.pump(reader) => reason,
                    };
                    self.upstream.detach();
                    log::warn!("[Upstream] Connection to {} lost: {}", addr, reason);
                }
                Err(e) => {
                    self.upstream.fail(e.to_string());
                    log::info!(
                        "[Upstream] Next attempt in {}s",
                        self.config.slow_retry.as_secs()
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.slow_retry) => {}
                    }
                }
            }
        }

        self.upstream.detach();
        log::info!("[Upstream] Supervisor stopped");
    }

    /// Resolves and connects, retrying transient failures.
    async fn establish(&self) -> HeosResult<(HeosConnection, EventReader)> {
        let this = self;
        with_retry("connect", &self.config.retry_delays_ms, move || async move {
            let addr = this.resolve().await?;
            HeosConnection::connect(addr).await
        })
        .await
    }

    async fn resolve(&self) -> HeosResult<SocketAddr> {
        if let Some(addr) = self.config.addr {
            return Ok(addr);
        }
        let device = discover_first(self.config.discovery_timeout).await?;
        Ok(SocketAddr::new(device.ip, self.config.heos_port))
    }

    /// Forwards envelopes until the connection ends, returning why it ended.
    async fn pump(&self, mut reader: EventReader) -> String {
        while let Some(record) = reader.next().await {
            match record {
                Ok(envelope) => {
                    log::trace!(
                        "[Upstream] <- {}/{}",
                        envelope.command().group,
                        envelope.command().command
                    );
                    self.primer.observe(&envelope);
                    self.hub.publish(envelope);
                }
                Err(e @ (HeosError::Decode(_) | HeosError::Framing(_))) => {
                    log::warn!("[Upstream] Skipping undecodable record: {}", e);
                }
                Err(e) => return e.to_string(),
            }
        }
        "closed by device".to_string()
    }
}
