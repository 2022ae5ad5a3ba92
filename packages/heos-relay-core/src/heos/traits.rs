//! Trait abstraction for the upstream write path.
//!
//! Services depend on [`CommandSink`] rather than a concrete connection so
//! they can be exercised with in-memory sinks in tests.

use super::{HeosCommand, HeosResult};

/// Accepts commands destined for the upstream control connection.
///
/// Implementations must not block: the command is handed off and the result
/// of the action arrives later through the event stream. Commands written
/// from one caller must reach the device in the order they were written.
pub trait CommandSink: Send + Sync {
    /// Hands a command off for writing.
    fn write(&self, command: HeosCommand) -> HeosResult<()>;
}
