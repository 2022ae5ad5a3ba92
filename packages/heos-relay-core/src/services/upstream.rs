//! Shared handle to the single upstream control connection.
//!
//! The handle exists before any connection does. Commands written while the
//! connection is being (re-)established are queued and flushed in order once
//! it attaches; commands written after initial connection attempts were
//! exhausted are rejected so callers see the outage.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::heos::{CommandSink, HeosCommand, HeosError, HeosResult};
use crate::state::UpstreamStatus;

struct Inner {
    status: UpstreamStatus,
    sink: Option<Arc<dyn CommandSink>>,
    pending: VecDeque<HeosCommand>,
}

/// Reference-counted upstream write path shared by dispatcher and sessions.
pub struct UpstreamHandle {
    inner: Mutex<Inner>,
    pending_limit: usize,
}

impl UpstreamHandle {
    /// Creates a handle in the `Connecting` state.
    pub fn new(pending_limit: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                status: UpstreamStatus::Connecting,
                sink: None,
                pending: VecDeque::new(),
            }),
            pending_limit,
        }
    }

    pub fn status(&self) -> UpstreamStatus {
        self.inner.lock().status.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().status.is_connected()
    }

    /// Number of commands waiting for a connection.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Installs a live connection and flushes queued commands through it.
    ///
    /// The lock is held across the flush so no newer command can overtake a
    /// queued one. If a queued command cannot be written it stays at the head
    /// of the queue, the connection is not installed and the error is returned.
    pub fn attach(&self, sink: Arc<dyn CommandSink>, addr: SocketAddr) -> HeosResult<()> {
        let mut inner = self.inner.lock();
        let mut flushed = 0;
        while let Some(command) = inner.pending.pop_front() {
            if let Err(e) = sink.write(command.clone()) {
                inner.pending.push_front(command);
                inner.sink = None;
                inner.status = UpstreamStatus::Reconnecting;
                log::warn!(
                    "[Upstream] Flushing queued commands to {} failed after {}: {}",
                    addr,
                    flushed,
                    e
                );
                return Err(e);
            }
            flushed += 1;
        }
        if flushed > 0 {
            log::info!("[Upstream] Flushed {} queued command(s) to {}", flushed, addr);
        }
        inner.sink = Some(sink);
        inner.status = UpstreamStatus::Connected {
            addr: addr.to_string(),
        };
        Ok(())
    }

    /// Drops the live connection; later commands queue until the next attach.
    pub fn detach(&self) {
        let mut inner = self.inner.lock();
        inner.sink = None;
        if !matches!(inner.status, UpstreamStatus::Failed { .. }) {
            inner.status = UpstreamStatus::Reconnecting;
        }
    }

    /// Marks the upstream as failed. Queued commands are discarded.
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut inner = self.inner.lock();
        let dropped = inner.pending.len();
        inner.pending.clear();
        inner.sink = None;
        log::error!(
            "[Upstream] Connection failed: {} ({} queued command(s) discarded)",
            reason,
            dropped
        );
        inner.status = UpstreamStatus::Failed { reason };
    }

    fn enqueue(&self, inner: &mut Inner, command: HeosCommand) {
        if inner.pending.len() >= self.pending_limit {
            if let Some(oldest) = inner.pending.pop_front() {
                log::warn!(
                    "[Upstream] Pending queue full ({}), dropping {}",
                    self.pending_limit,
                    oldest
                );
            }
        }
        log::debug!("[Upstream] Queued {} while {}", command, inner.status);
        inner.pending.push_back(command);
    }
}

impl CommandSink for UpstreamHandle {
    fn write(&self, command: HeosCommand) -> HeosResult<()> {
        let mut inner = self.inner.lock();

        if let UpstreamStatus::Failed { reason } = &inner.status {
            return Err(HeosError::Unavailable(reason.clone()));
        }

        let Some(sink) = inner.sink.clone() else {
            self.enqueue(&mut inner, command);
            return Ok(());
        };

        match sink.write(command.clone()) {
            Ok(()) => Ok(()),
            Err(HeosError::ConnectionClosed) => {
                // Writer died ahead of the reader noticing EOF
                inner.sink = None;
                inner.status = UpstreamStatus::Reconnecting;
                self.enqueue(&mut inner, command);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heos::traits::test_support::RecordingSink;

    struct ClosedSink;

    impl CommandSink for ClosedSink {
        fn write(&self, _command: HeosCommand) -> HeosResult<()> {
            Err(HeosError::ConnectionClosed)
        }
    }

    fn addr() -> SocketAddr {
        "192.168.1.31:1255".parse().unwrap()
    }

    #[test]
    fn queues_until_attached_then_flushes_in_order() {
        let handle = UpstreamHandle::new(8);
        handle.write(HeosCommand::new("player", "get_players")).unwrap();
        handle
            .write(HeosCommand::new("player", "play_next").param("pid", "1"))
            .unwrap();
        assert_eq!(handle.pending_count(), 2);

        let sink = Arc::new(RecordingSink::default());
        handle.attach(sink.clone(), addr()).unwrap();
        handle
            .write(HeosCommand::new("player", "get_volume").param("pid", "1"))
            .unwrap();

        assert_eq!(
            sink.lines(),
            vec![
                "player/get_players",
                "player/play_next?pid=1",
                "player/get_volume?pid=1"
            ]
        );
        assert_eq!(handle.pending_count(), 0);
        assert!(handle.is_connected());
    }

    #[test]
    fn overflow_drops_oldest() {
        let handle = UpstreamHandle::new(2);
        for pid in ["1", "2", "3"] {
            handle
                .write(HeosCommand::new("player", "get_volume").param("pid", pid))
                .unwrap();
        }
        let sink = Arc::new(RecordingSink::default());
        handle.attach(sink.clone(), addr()).unwrap();
        assert_eq!(
            sink.lines(),
            vec!["player/get_volume?pid=2", "player/get_volume?pid=3"]
        );
    }

    #[test]
    fn failed_upstream_rejects_commands() {
        let handle = UpstreamHandle::new(8);
        handle.write(HeosCommand::new("player", "get_players")).unwrap();
        handle.fail("no devices");

        let err = handle
            .write(HeosCommand::new("player", "get_players"))
            .unwrap_err();
        assert!(matches!(err, HeosError::Unavailable(ref r) if r == "no devices"));
        assert_eq!(handle.pending_count(), 0);

        // A later successful attach lifts the failure
        let sink = Arc::new(RecordingSink::default());
        handle.attach(sink.clone(), addr()).unwrap();
        handle.write(HeosCommand::new("player", "get_players")).unwrap();
        assert_eq!(sink.lines(), vec!["player/get_players"]);
    }

    #[test]
    fn detach_queues_again() {
        let handle = UpstreamHandle::new(8);
        let sink = Arc::new(RecordingSink::default());
        handle.attach(sink.clone(), addr()).unwrap();
        handle.detach();
        assert_eq!(handle.status(), UpstreamStatus::Reconnecting);

        handle.write(HeosCommand::new("player", "get_players")).unwrap();
        assert!(sink.lines().is_empty());
        assert_eq!(handle.pending_count(), 1);
    }

    #[test]
    fn failed_flush_keeps_queue_and_stays_detached() {
        let handle = UpstreamHandle::new(8);
        for pid in ["1", "2"] {
            handle
                .write(HeosCommand::new("player", "play_next").param("pid", pid))
                .unwrap();
        }

        let err = handle.attach(Arc::new(ClosedSink), addr()).unwrap_err();
        assert!(matches!(err, HeosError::ConnectionClosed));
        assert_eq!(handle.status(), UpstreamStatus::Reconnecting);
        assert_eq!(handle.pending_count(), 2);

        // Newer commands queue behind the unsent ones
        handle
            .write(HeosCommand::new("player", "play_next").param("pid", "3"))
            .unwrap();
        let sink = Arc::new(RecordingSink::default());
        handle.attach(sink.clone(), addr()).unwrap();
        assert_eq!(
            sink.lines(),
            vec![
                "player/play_next?pid=1",
                "player/play_next?pid=2",
                "player/play_next?pid=3"
            ]
        );
        assert!(handle.is_connected());
    }

    #[test]
    fn closed_writer_requeues_command() {
        let handle = UpstreamHandle::new(8);
        handle.attach(Arc::new(ClosedSink), addr()).unwrap();

        handle.write(HeosCommand::new("player", "get_players")).unwrap();
        assert_eq!(handle.status(), UpstreamStatus::Reconnecting);
        assert_eq!(handle.pending_count(), 1);
    }
}
