//! HEOS Relay Core - shared library for the HEOS control relay.
//!
//! The relay holds the single control connection a HEOS household allows
//! per process, multicasts everything the devices report to any number of
//! streaming clients, and turns plain HTTP requests into device commands.
//! The same crate carries the client side: a reconciler that folds the
//! relayed stream into a player collection.
//!
//! # Architecture
//!
//! - [`heos`]: HEOS CLI protocol (commands, envelopes, connection, discovery)
//! - [`events`]: Fan-out hub and browse notifications
//! - [`services`]: Upstream handle, supervisor, roster primer, command dispatcher
//! - [`api`]: HTTP router, stream sessions and server startup
//! - [`client`]: Reconciler, position tracking and relay clients
//! - [`state`]: Configuration and upstream status
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`CommandSink`](heos::CommandSink): the upstream write path
//! - [`SelectionStore`](client::SelectionStore): client-local selection persistence

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod client;
pub mod error;
pub mod events;
pub mod heos;
pub mod protocol_constants;
pub mod services;
pub mod state;

// Re-export commonly used types at the crate root
pub use error::{ErrorCode, RelayError, RelayResult};
pub use events::{BrowseChannel, BrowseNotification, EventHub};
pub use heos::{EventEnvelope, HeosCommand, HeosError};
pub use state::{Config, UpstreamStatus};

// Re-export service types
pub use services::{CommandDispatcher, CommandRequest, UpstreamHandle};

// Re-export client types
pub use client::{
    format_mm_ss, ClientError, FileSelectionStore, KnownEvent, Reconciler, RelayClient,
    StreamClient,
};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, BootstrappedServices};

// Re-export API types
pub use api::{start_server, AppState, AppStateBuilder, ServerError, SessionManager};
