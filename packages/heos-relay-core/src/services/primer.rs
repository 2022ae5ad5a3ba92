//! Keeps the relayed stream complete enough for a fresh client to render.
//!
//! A roster alone carries names only. For every player in a roster, and for
//! every player whose now-playing item changes, the primer requests play
//! state, media and volume so the answers flow through the hub to everyone.

use std::sync::Arc;

use serde_json::Value;

use crate::heos::{CommandSink, EventEnvelope, HeosCommand, HeosResult};

/// Issues follow-up queries in reaction to upstream envelopes.
pub struct RosterPrimer {
    sink: Arc<dyn CommandSink>,
}

impl RosterPrimer {
    pub fn new(sink: Arc<dyn CommandSink>) -> Self {
        Self { sink }
    }

    /// Commands issued every time a connection is established.
    pub fn on_connected(&self) -> HeosResult<()> {
        self.sink.write(
            HeosCommand::new("system", "register_for_change_events").param("enable", "on"),
        )?;
        self.refresh_roster()
    }

    /// Requests the player list.
    pub fn refresh_roster(&self) -> HeosResult<()> {
        self.sink.write(HeosCommand::new("player", "get_players"))
    }

    /// Reacts to one upstream envelope.
    pub fn observe(&self, envelope: &EventEnvelope) {
        let command = envelope.command();
        let result = if command.is("player", "get_players") {
            if envelope.is_failure() || envelope.is_under_process() {
                return;
            }
            roster_pids(envelope.payload.as_ref())
                .iter()
                .try_for_each(|pid| self.query_player(pid))
        } else if command.is("event", "player_now_playing_changed") {
            match envelope.heos.message.get("pid") {
                Some(pid) => self.query_player(pid),
                None => Ok(()),
            }
        } else if command.is("event", "players_changed") {
            self.refresh_roster()
        } else {
            Ok(())
        };

        if let Err(e) = result {
            log::warn!("[Primer] Follow-up for {} not sent: {}", command.command, e);
        }
    }

    fn query_player(&self, pid: &str) -> HeosResult<()> {
        for action in ["get_play_state", "get_now_playing_media", "get_volume"] {
            self.sink
                .write(HeosCommand::new("player", action).param("pid", pid))?;
        }
        Ok(())
    }
}

/// Player ids of a roster payload, in payload order.
///
/// Ids are numbers on the wire but tolerated as strings.
fn roster_pids(payload: Option<&Value>) -> Vec<String> {
    payload
        .and_then(Value::as_array)
        .map(|players| {
            players
                .iter()
                .filter_map(|p| match p.get("pid")? {
                    Value::Number(n) => Some(n.to_string()),
                    Value::String(s) => Some(s.clone()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heos::traits::test_support::RecordingSink;

    fn primer() -> (RosterPrimer, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (RosterPrimer::new(sink.clone()), sink)
    }

    fn envelope(line: &str) -> EventEnvelope {
        EventEnvelope::from_upstream_line(line).unwrap()
    }

    #[test]
    fn connect_registers_for_events_and_fetches_roster() {
        let (primer, sink) = primer();
        primer.on_connected().unwrap();
        assert_eq!(
            sink.lines(),
            vec![
                "system/register_for_change_events?enable=on",
                "player/get_players"
            ]
        );
    }

    #[test]
    fn roster_queries_each_player() {
        let (primer, sink) = primer();
        primer.observe(&envelope(
            r#"{"heos": {"command": "player/get_players", "result": "success", "message": ""}, "payload": [{"name": "Kitchen", "pid": -1234}, {"name": "Den", "pid": "77"}]}"#,
        ));
        assert_eq!(
            sink.lines(),
            vec![
                "player/get_play_state?pid=-1234",
                "player/get_now_playing_media?pid=-1234",
                "player/get_volume?pid=-1234",
                "player/get_play_state?pid=77",
                "player/get_now_playing_media?pid=77",
                "player/get_volume?pid=77",
            ]
        );
    }

    #[test]
    fn failed_roster_is_ignored() {
        let (primer, sink) = primer();
        primer.observe(&envelope(
            r#"{"heos": {"command": "player/get_players", "result": "fail", "message": "eid=2&text=ID Not Valid"}}"#,
        ));
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn now_playing_change_queries_that_player() {
        let (primer, sink) = primer();
        primer.observe(&envelope(
            r#"{"heos": {"command": "event/player_now_playing_changed", "message": "pid=5"}}"#,
        ));
        assert_eq!(sink.lines().len(), 3);
        assert_eq!(sink.lines()[0], "player/get_play_state?pid=5");
    }

    #[test]
    fn players_changed_refreshes_roster() {
        let (primer, sink) = primer();
        primer.observe(&envelope(
            r#"{"heos": {"command": "event/players_changed", "message": ""}}"#,
        ));
        primer.observe(&envelope(
            r#"{"heos": {"command": "event/player_volume_changed", "message": "pid=5&level=3&mute=off"}}"#,
        ));
        assert_eq!(sink.lines(), vec!["player/get_players"]);
    }
}
