//! Stream Session: one per attached client.
//!
//! `Attaching → Streaming → Closed`. A session subscribes to the hub before
//! it asks upstream for a fresh roster, so the roster answer cannot slip past
//! it. Every attach triggers that request even though the answer goes to all
//! sessions. Once closed a session is never reused.

use std::convert::Infallible;
use std::sync::Arc;

use axum::response::sse::Event;
use futures::Stream;

use crate::events::{EventHub, Subscription};
use crate::heos::EventEnvelope;
use crate::services::CommandDispatcher;

use super::session::SessionGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Attaching,
    Streaming,
    Closed,
}

/// Per-client pipe from the hub to the wire.
pub struct StreamSession {
    guard: SessionGuard,
    subscription: Option<Subscription<EventEnvelope>>,
    state: SessionState,
}

impl StreamSession {
    /// Attaches to the hub and requests a roster refresh.
    ///
    /// A refresh that cannot be dispatched does not prevent attaching; the
    /// session simply streams whatever arrives once the upstream recovers.
    pub fn attach(
        guard: SessionGuard,
        hub: &Arc<EventHub>,
        dispatcher: &CommandDispatcher,
    ) -> Self {
        let mut session = Self {
            guard,
            subscription: None,
            state: SessionState::Attaching,
        };

        session.subscription = Some(hub.subscribe());
        if let Err(e) = dispatcher.refresh_roster() {
            log::warn!(
                "[Session] Session {} attached without roster refresh: {}",
                session.guard.id(),
                e
            );
        }

        session.state = SessionState::Streaming;
        log::debug!("[Session] Session {} streaming", session.guard.id());
        session
    }

    pub fn id(&self) -> u64 {
        self.guard.id()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Waits for the next envelope to send.
    ///
    /// Returns `None` and closes the session when the hub evicted it or the
    /// session was force-closed.
    pub async fn next_envelope(&mut self) -> Option<Arc<EventEnvelope>> {
        let subscription = self.subscription.as_mut()?;
        let next = tokio::select! {
            _ = self.guard.cancel_token().cancelled() => None,
            envelope = subscription.recv() => envelope,
        };
        if next.is_none() {
            self.close();
        }
        next
    }

    /// Terminal transition. Releases the hub subscription.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.subscription.take();
        self.state = SessionState::Closed;
        log::debug!("[Session] Session {} closed", self.guard.id());
    }

    /// Converts the session into an SSE event stream.
    ///
    /// The transport drops the stream when the client goes away, which drops
    /// the session and with it the subscription and session slot.
    pub fn into_event_stream(mut self) -> impl Stream<Item = Result<Event, Infallible>> {
        async_stream::stream! {
            while let Some(envelope) = self.next_envelope().await {
                if let Some(event) = encode(&envelope) {
                    yield Ok(event);
                }
            }
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Encodes one envelope as an SSE `data:` record.
pub fn encode(envelope: &EventEnvelope) -> Option<Event> {
    match Event::default().json_data(envelope) {
        Ok(event) => Some(event),
        Err(e) => {
            log::warn!(
                "[Session] Failed to encode {}/{}: {}",
                envelope.command().group,
                envelope.command().command,
                e
            );
            None
        }
    }
}
