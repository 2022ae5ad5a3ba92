//! In-process notification channel for browse results.
//!
//! Browse responses never touch player state. The reconciler hands them to
//! this channel and whichever catalog view is open subscribes to it.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::heos::EventEnvelope;

/// A browse-group response surfaced to the catalog subsystem.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseNotification {
    /// Command within the `browse` group (`get_music_sources`, `browse`, ...).
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub message: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl BrowseNotification {
    pub fn from_envelope(envelope: &EventEnvelope) -> Self {
        Self {
            command: envelope.heos.command.command.clone(),
            result: envelope.heos.result.clone(),
            message: envelope.heos.message.parsed.clone(),
            payload: envelope.payload.clone(),
        }
    }

    /// Entries of the payload list, or nothing if the payload is not a list.
    pub fn items(&self) -> &[Value] {
        self.payload
            .as_ref()
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Broadcast channel carrying [`BrowseNotification`]s.
#[derive(Clone)]
pub struct BrowseChannel {
    tx: broadcast::Sender<BrowseNotification>,
}

impl BrowseChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BrowseNotification> {
        self.tx.subscribe()
    }

    /// Sends a notification, returning how many listeners received it.
    pub fn notify(&self, notification: BrowseNotification) -> usize {
        match self.tx.send(notification) {
            Ok(n) => n,
            Err(e) => {
                log::trace!("[Browse] No listeners for {}", e.0.command);
                0
            }
        }
    }
}

impl Default for BrowseChannel {
    fn default() -> Self {
        Self::new(32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notification_reaches_listener() {
        let channel = BrowseChannel::new(4);
        let mut rx = channel.subscribe();

        let env = EventEnvelope::from_upstream_line(
            r#"{"heos": {"command": "browse/get_music_sources", "result": "success", "message": ""}, "payload": [{"name": "Pandora", "sid": 1}]}"#,
        )
        .unwrap();
        assert_eq!(channel.notify(BrowseNotification::from_envelope(&env)), 1);

        let got = rx.recv().await.unwrap();
        assert_eq!(got.command, "get_music_sources");
        assert_eq!(got.items().len(), 1);
    }

    #[test]
    fn notify_without_listeners_is_not_an_error() {
        let channel = BrowseChannel::default();
        let n = BrowseNotification {
            command: "browse".into(),
            result: None,
            message: BTreeMap::new(),
            payload: None,
        };
        assert_eq!(channel.notify(n.clone()), 0);
        assert!(n.items().is_empty());
    }
}
