//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where the
//! hub, the upstream handle and the services around them are instantiated
//! and wired together. Nothing in the crate holds these as globals.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::SessionManager;
use crate::error::{RelayError, RelayResult};
use crate::events::EventHub;
use crate::heos::CommandSink;
use crate::services::{CommandDispatcher, SupervisorConfig, UpstreamHandle, UpstreamSupervisor};
use crate::state::Config;

/// Container for all bootstrapped services.
///
/// It's consumed by `AppState` to build the final application state.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Fan-out point for upstream envelopes.
    pub hub: Arc<EventHub>,
    /// Shared upstream handle. Exists before any connection does.
    pub upstream: Arc<UpstreamHandle>,
    /// Forwards command requests upstream.
    pub dispatcher: CommandDispatcher,
    /// Tracks attached stream sessions.
    pub sessions: Arc<SessionManager>,
    /// Validated configuration.
    pub config: Arc<Config>,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Spawns the upstream supervisor.
    pub fn start_background_tasks(&self) -> JoinHandle<()> {
        UpstreamSupervisor::new(
            Arc::clone(&self.upstream),
            Arc::clone(&self.hub),
            SupervisorConfig::from_config(&self.config),
            self.cancel_token.child_token(),
        )
        .spawn()
    }

    /// Initiates graceful shutdown of all services.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        // Signal cancellation to all background tasks
        self.cancel_token.cancel();

        let closed = self.sessions.close_all();
        log::info!("[Bootstrap] Closed {} stream session(s)", closed);

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Bootstraps all application services with their dependencies.
///
/// Services are created in dependency order:
///
/// 1. Hub and upstream handle (no dependencies)
/// 2. Dispatcher (writes through the upstream handle)
/// 3. Session manager (admission ceiling from config)
///
/// No connection is attempted here; call
/// [`BootstrappedServices::start_background_tasks`] for that.
///
/// # Errors
///
/// Returns an error if the configuration is invalid.
pub fn bootstrap_services(config: &Config) -> RelayResult<BootstrappedServices> {
    config.validate().map_err(RelayError::Configuration)?;

    let cancel_token = CancellationToken::new();

    let hub = Arc::new(EventHub::new(config.subscriber_buffer));
    let upstream = Arc::new(UpstreamHandle::new(config.pending_command_limit));

    let dispatcher = CommandDispatcher::new(Arc::clone(&upstream) as Arc<dyn CommandSink>);
    let sessions = Arc::new(SessionManager::new(config.max_sessions));

    Ok(BootstrappedServices {
        hub,
        upstream,
        dispatcher,
        sessions,
        config: Arc::new(config.clone()),
        cancel_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::UpstreamStatus;

    #[test]
    fn invalid_config_is_rejected() {
        let config = Config {
            max_sessions: 0,
            ..Default::default()
        };
        assert!(matches!(
            bootstrap_services(&config),
            Err(RelayError::Configuration(_))
        ));
    }

    #[test]
    fn commands_queue_before_the_supervisor_runs() {
        let services = bootstrap_services(&Config::default()).unwrap();
        assert_eq!(services.upstream.status(), UpstreamStatus::Connecting);

        services.dispatcher.refresh_roster().unwrap();
        assert_eq!(services.upstream.pending_count(), 1);
    }
}
