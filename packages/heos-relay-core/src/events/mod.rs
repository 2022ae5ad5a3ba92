//! Event distribution.
//!
//! - [`FanOutHub`] multicasts upstream envelopes to stream sessions
//! - [`BrowseNotification`] is the client-side channel item for browse results

mod browse;
mod hub;

pub use browse::{BrowseChannel, BrowseNotification};
pub use hub::{EventHub, FanOutHub, Subscription};
