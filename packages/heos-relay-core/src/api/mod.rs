//! HTTP API layer.
//!
//! This module contains thin handlers that delegate to services.
//! It provides the router construction and server startup functionality.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::bootstrap::BootstrappedServices;
use crate::events::EventHub;
use crate::services::{CommandDispatcher, UpstreamHandle};
use crate::state::Config;

pub mod http;
pub mod response;
pub mod session;
pub mod sse;

pub use session::{SessionGuard, SessionManager};
pub use sse::{SessionState, StreamSession};

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state for the API layer.
///
/// This is a thin wrapper that holds references to services.
/// All business logic lives in the services themselves.
#[derive(Clone)]
pub struct AppState {
    /// Fan-out point for upstream envelopes.
    pub hub: Arc<EventHub>,
    /// Forwards command requests upstream.
    pub dispatcher: CommandDispatcher,
    /// Tracks attached stream sessions.
    pub sessions: Arc<SessionManager>,
    /// Upstream connection status and write path.
    pub upstream: Arc<UpstreamHandle>,
    /// Application configuration.
    pub config: Arc<Config>,
}

/// Builder for constructing an `AppState`.
#[derive(Default)]
pub struct AppStateBuilder {
    hub: Option<Arc<EventHub>>,
    dispatcher: Option<CommandDispatcher>,
    sessions: Option<Arc<SessionManager>>,
    upstream: Option<Arc<UpstreamHandle>>,
    config: Option<Arc<Config>>,
}

impl AppStateBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hub(mut self, hub: Arc<EventHub>) -> Self {
        self.hub = Some(hub);
        self
    }

    pub fn dispatcher(mut self, dispatcher: CommandDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn sessions(mut self, sessions: Arc<SessionManager>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn upstream(mut self, upstream: Arc<UpstreamHandle>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    pub fn config(mut self, config: Arc<Config>) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the `AppState`, panicking if required fields are missing.
    pub fn build(self) -> AppState {
        AppState {
            hub: self.hub.expect("hub is required"),
            dispatcher: self.dispatcher.expect("dispatcher is required"),
            sessions: self.sessions.expect("sessions is required"),
            upstream: self.upstream.expect("upstream is required"),
            config: self.config.expect("config is required"),
        }
    }
}

impl AppState {
    /// Creates a new builder for constructing an `AppState`.
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }

    /// Builds the API state from bootstrapped services.
    pub fn new(services: &BootstrappedServices) -> Self {
        Self::builder()
            .hub(Arc::clone(&services.hub))
            .dispatcher(services.dispatcher.clone())
            .sessions(Arc::clone(&services.sessions))
            .upstream(Arc::clone(&services.upstream))
            .config(Arc::clone(&services.config))
            .build()
    }
}

/// Starts the HTTP server on the configured port and serves until `shutdown`
/// is cancelled.
pub async fn start_server(state: AppState, shutdown: CancellationToken) -> Result<(), ServerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.bind_port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("Server listening on http://{}", listener.local_addr()?);
    let sessions = Arc::clone(&state.sessions);
    let app = http::create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            // Streams never end on their own
            sessions.close_all();
        })
        .await?;
    Ok(())
}
