//! Stream session tracking and admission.
//!
//! - `SessionManager`: Tracks attached sessions and enforces the ceiling
//! - `SessionGuard`: RAII guard for automatic cleanup on detach

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{RelayError, RelayResult};

struct SessionInfo {
    attached_at: Instant,
}

/// Manages all attached stream sessions.
///
/// Admission is decided with a single atomic counter so concurrent attaches
/// can never overshoot `max_sessions`.
pub struct SessionManager {
    sessions: DashMap<u64, SessionInfo>,
    next_id: AtomicU64,
    active: AtomicUsize,
    max_sessions: usize,
    /// Replaced after `close_all()` so later sessions are unaffected.
    global_cancel: RwLock<CancellationToken>,
}

impl SessionManager {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            active: AtomicUsize::new(0),
            max_sessions,
            global_cancel: RwLock::new(CancellationToken::new()),
        }
    }

    /// Admits a new session, or fails with `TooManySessions` at the ceiling.
    pub fn register(self: &Arc<Self>) -> RelayResult<SessionGuard> {
        let max = self.max_sessions;
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .map_err(|_| {
                log::warn!("[Session] Rejecting attach: {} sessions active", max);
                RelayError::TooManySessions(max)
            })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel_token = self.global_cancel.read().child_token();
        self.sessions.insert(
            id,
            SessionInfo {
                attached_at: Instant::now(),
            },
        );
        log::info!(
            "[Session] Session {} registered (total: {})",
            id,
            self.sessions.len()
        );

        Ok(SessionGuard {
            id,
            manager: Arc::clone(self),
            cancel_token,
        })
    }

    fn unregister(&self, id: u64) {
        if let Some((_, info)) = self.sessions.remove(&id) {
            self.active.fetch_sub(1, Ordering::AcqRel);
            log::info!(
                "[Session] Session {} unregistered after {:?} (remaining: {})",
                id,
                info.attached_at.elapsed(),
                self.sessions.len()
            );
        }
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Force-closes all sessions. Returns how many were signalled.
    pub fn close_all(&self) -> usize {
        let count = self.sessions.len();
        if count > 0 {
            log::info!("[Session] Force-closing {} session(s)", count);
        }
        let mut guard = self.global_cancel.write();
        guard.cancel();
        *guard = CancellationToken::new();
        count
    }
}

/// RAII guard that unregisters a session when dropped.
pub struct SessionGuard {
    id: u64,
    manager: Arc<SessionManager>,
    cancel_token: CancellationToken,
}

impl SessionGuard {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancelled when the manager force-closes sessions.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.manager.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_rejects_and_frees_on_drop() {
        let manager = Arc::new(SessionManager::new(2));
        let a = manager.register().unwrap();
        let _b = manager.register().unwrap();

        assert!(matches!(
            manager.register(),
            Err(RelayError::TooManySessions(2))
        ));
        assert_eq!(manager.session_count(), 2);

        drop(a);
        assert_eq!(manager.session_count(), 1);
        assert!(manager.register().is_ok());
    }

    #[test]
    fn close_all_cancels_existing_but_not_new_sessions() {
        let manager = Arc::new(SessionManager::new(10));
        let old = manager.register().unwrap();
        assert_eq!(manager.close_all(), 1);
        assert!(old.cancel_token().is_cancelled());

        let fresh = manager.register().unwrap();
        assert!(!fresh.cancel_token().is_cancelled());
    }

    #[test]
    fn concurrent_attaches_never_overshoot() {
        let manager = Arc::new(SessionManager::new(8));
        let admitted: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..32)
                .map(|_| {
                    let manager = Arc::clone(&manager);
                    s.spawn(move || manager.register().ok())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(admitted.iter().flatten().count(), 8);
    }
}
