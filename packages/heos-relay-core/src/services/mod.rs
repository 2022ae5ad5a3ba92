//! Application services layer.
//!
//! This module contains the services that sit between the HTTP API and the
//! upstream protocol plumbing in `heos/`.

pub mod dispatcher;
pub mod primer;
pub mod supervisor;
pub mod upstream;

pub use dispatcher::{CommandDispatcher, CommandRequest};
pub use primer::RosterPrimer;
pub use supervisor::{SupervisorConfig, UpstreamSupervisor};
pub use upstream::UpstreamHandle;
