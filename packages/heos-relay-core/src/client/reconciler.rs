//! Client State Reconciler.
//!
//! Folds the relayed envelope stream into a keyed player collection.
//! [`reduce`] is the pure core; [`Reconciler`] wraps it with selection,
//! position tracking and the browse notification channel. Everything here
//! runs on one task, so the collection has a single writer.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value;

use crate::events::{BrowseChannel, BrowseNotification};
use crate::heos::EventEnvelope;

use super::event::KnownEvent;
use super::model::{NowPlaying, Pid, Player, PlayerCollection};
use super::position::PositionTracker;
use super::selection::SelectionStore;
use super::ClientError;

/// Applies one event to the collection.
///
/// A roster replaces the collection outright. Every other player event is
/// a shallow merge into the referenced player's `NowPlaying`, and is a no-op
/// when that player is not in the collection. Browse events never change
/// players.
pub fn reduce(mut players: PlayerCollection, event: &KnownEvent) -> PlayerCollection {
    if let KnownEvent::Players(roster) = event {
        return roster
            .iter()
            .map(|player| (player.pid.clone(), player.clone()))
            .collect();
    }

    let Some(pid) = event.pid() else {
        return players;
    };
    let Some(player) = players.get_mut(pid) else {
        log::debug!("[Reconciler] Ignoring event for unknown player {}", pid);
        return players;
    };
    let now_playing = player.now_playing_mut();

    match event {
        KnownEvent::NowPlayingMedia { media, .. } => {
            now_playing.merge(media.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        KnownEvent::PlayStateReport { state, .. } | KnownEvent::StateChanged { state, .. } => {
            now_playing.merge([("state", Value::String(state.clone()))]);
        }
        KnownEvent::VolumeReport { level, .. } | KnownEvent::VolumeChanged { level, .. } => {
            now_playing.merge([("volume", Value::String(level.clone()))]);
        }
        KnownEvent::NowPlayingChanged { fields, .. }
        | KnownEvent::NowPlayingProgress { fields, .. } => {
            now_playing.merge_strings(fields);
        }
        KnownEvent::Players(_) | KnownEvent::Browse(_) => {}
    }
    players
}

/// Owns the client's view of the player fleet.
pub struct Reconciler {
    players: PlayerCollection,
    active: Option<Pid>,
    positions: HashMap<Pid, PositionTracker>,
    selection: Box<dyn SelectionStore>,
    browse: BrowseChannel,
}

impl Reconciler {
    pub fn new(selection: Box<dyn SelectionStore>, browse: BrowseChannel) -> Self {
        Self {
            players: PlayerCollection::new(),
            active: None,
            positions: HashMap::new(),
            selection,
            browse,
        }
    }

    /// Applies one envelope. Returns the classified event, or `None` if the
    /// envelope was not recognized and therefore ignored.
    pub fn apply(&mut self, envelope: &EventEnvelope, now: Instant) -> Option<KnownEvent> {
        let event = KnownEvent::classify(envelope)?;

        if let KnownEvent::Browse(notification) = &event {
            self.browse.notify(notification.clone());
            return Some(event);
        }

        self.players = reduce(std::mem::take(&mut self.players), &event);

        match &event {
            KnownEvent::Players(_) => self.on_roster(),
            other => self.track_position(other, now),
        }
        Some(event)
    }

    /// Advances position extrapolation for every player.
    ///
    /// Writes only the extrapolated positions, never player state.
    pub fn tick(&mut self, now: Instant) {
        for tracker in self.positions.values_mut() {
            tracker.tick(now);
        }
    }

    /// Changes the active player and remembers the choice.
    pub fn select(&mut self, pid: &str) -> Result<(), ClientError> {
        if !self.players.contains_key(pid) {
            return Err(ClientError::UnknownPlayer(pid.to_string()));
        }
        self.active = Some(pid.to_string());
        self.selection.save(pid)
    }

    pub fn players(&self) -> &PlayerCollection {
        &self.players
    }

    pub fn player(&self, pid: &str) -> Option<&Player> {
        self.players.get(pid)
    }

    pub fn active_pid(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_player(&self) -> Option<&Player> {
        self.player(self.active.as_deref()?)
    }

    /// Extrapolated position (ms) of a player.
    pub fn position_ms(&self, pid: &str) -> Option<f64> {
        self.positions.get(pid)?.position_ms()
    }

    /// Subscribes to browse results.
    pub fn browse_notifications(&self) -> tokio::sync::broadcast::Receiver<BrowseNotification> {
        self.browse.subscribe()
    }

    fn on_roster(&mut self) {
        self.positions.retain(|pid, _| self.players.contains_key(pid));

        let remembered = self
            .selection
            .load()
            .filter(|pid| self.players.contains_key(pid));
        self.active = remembered.or_else(|| self.players.keys().next().cloned());
        log::debug!(
            "[Reconciler] Roster of {} player(s), active: {:?}",
            self.players.len(),
            self.active
        );
    }

    fn track_position(&mut self, event: &KnownEvent, now: Instant) {
        let Some(pid) = event.pid() else {
            return;
        };
        if !self.players.contains_key(pid) {
            return;
        }
        let tracker = self.positions.entry(pid.to_string()).or_default();
        if let Some(ms) = event.cur_pos_sample() {
            tracker.sample(ms, now);
        }
        if let Some(state) = event.state_sample() {
            tracker.set_state(state, now);
        }
    }
}

/// Now-playing state of a player, if it has any yet.
pub fn now_playing<'a>(players: &'a PlayerCollection, pid: &str) -> Option<&'a NowPlaying> {
    players.get(pid)?.now_playing.as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::model::PlayState;
    use crate::client::selection::MemorySelectionStore;
    use serde_json::json;
    use std::time::Duration;

    fn envelope(line: &str) -> EventEnvelope {
        EventEnvelope::from_upstream_line(line).unwrap()
    }

    fn event(line: &str) -> KnownEvent {
        KnownEvent::classify(&envelope(line)).unwrap()
    }

    fn roster(players: &str) -> KnownEvent {
        event(&format!(
            r#"{{"heos": {{"command": "player/get_players", "result": "success", "message": ""}}, "payload": {}}}"#,
            players
        ))
    }

    fn two_players() -> PlayerCollection {
        reduce(
            PlayerCollection::new(),
            &roster(r#"[{"pid": "1", "name": "X"}, {"pid": "2", "name": "Y"}]"#),
        )
    }

    const MEDIA: &str = r#"{"heos": {"command": "player/get_now_playing_media", "result": "success", "message": "pid=1"}, "payload": {"type": "song", "song": "A", "album": "C", "artist": "B", "image_url": "http://img", "mid": "m1", "sid": 1}}"#;

    #[test]
    fn roster_replaces_collection() {
        let before = reduce(
            PlayerCollection::new(),
            &roster(r#"[{"pid": "3", "name": "Z"}]"#),
        );
        let after = reduce(
            before,
            &roster(r#"[{"pid": "1", "name": "X"}, {"pid": "2", "name": "Y"}]"#),
        );

        assert_eq!(after.keys().collect::<Vec<_>>(), vec!["1", "2"]);
        assert!(!after.contains_key("3"));
        assert_eq!(after["2"].name, "Y");
    }

    #[test]
    fn roster_preserves_no_prior_state() {
        let players = reduce(two_players(), &event(MEDIA));
        assert!(players["1"].now_playing.is_some());

        let players = reduce(
            players,
            &roster(r#"[{"pid": "1", "name": "X"}, {"pid": "2", "name": "Y"}]"#),
        );
        assert!(players["1"].now_playing.is_none());
    }

    #[test]
    fn media_merge_is_idempotent() {
        let once = reduce(two_players(), &event(MEDIA));
        let twice = reduce(once.clone(), &event(MEDIA));
        assert_eq!(once, twice);

        let np = now_playing(&once, "1").unwrap();
        assert_eq!(np.song.as_deref(), Some("A"));
        assert_eq!(np.extra["mid"], "m1");
    }

    #[test]
    fn unknown_pid_is_a_no_op() {
        let before = two_players();
        for line in [
            r#"{"heos": {"command": "player/get_now_playing_media", "result": "success", "message": "pid=99"}, "payload": {"song": "A"}}"#,
            r#"{"heos": {"command": "player/get_play_state", "result": "success", "message": "pid=99&state=play"}}"#,
            r#"{"heos": {"command": "player/get_volume", "result": "success", "message": "pid=99&level=5"}}"#,
            r#"{"heos": {"command": "event/player_now_playing_changed", "message": "pid=99"}}"#,
            r#"{"heos": {"command": "event/player_now_playing_progress", "message": "pid=99&cur_pos=1000&duration=2000"}}"#,
            r#"{"heos": {"command": "event/player_state_changed", "message": "pid=99&state=pause"}}"#,
            r#"{"heos": {"command": "event/player_volume_changed", "message": "pid=99&level=3&mute=off"}}"#,
        ] {
            let after = reduce(before.clone(), &event(line));
            assert_eq!(after, before, "{}", line);
        }
    }

    #[test]
    fn partial_merge_preserves_prior_fields() {
        let mut players = two_players();
        players["1"]
            .now_playing_mut()
            .merge([("song", json!("A")), ("artist", json!("B")), ("volume", json!(50))]);

        let players = reduce(
            players,
            &event(r#"{"heos": {"command": "player/get_volume", "result": "success", "message": "pid=1&level=80"}}"#),
        );

        let np = now_playing(&players, "1").unwrap();
        assert_eq!(np.song.as_deref(), Some("A"));
        assert_eq!(np.artist.as_deref(), Some("B"));
        assert_eq!(np.volume, Some(80));
    }

    #[test]
    fn play_state_creates_now_playing_with_pid() {
        let players = reduce(
            two_players(),
            &event(r#"{"heos": {"command": "player/get_play_state", "result": "success", "message": "pid=2&state=play"}}"#),
        );
        let np = now_playing(&players, "2").unwrap();
        assert_eq!(np.pid, "2");
        assert_eq!(np.state, Some(PlayState::Play));
        assert_eq!(np.song, None);
    }

    #[test]
    fn progress_and_changes_merge_message_fields() {
        let players = reduce(
            two_players(),
            &event(r#"{"heos": {"command": "event/player_now_playing_progress", "message": "pid=1&cur_pos=65000&duration=180000"}}"#),
        );
        let players = reduce(
            players,
            &event(r#"{"heos": {"command": "event/player_state_changed", "message": "pid=1&state=pause"}}"#),
        );
        let players = reduce(
            players,
            &event(r#"{"heos": {"command": "event/player_volume_changed", "message": "pid=1&level=12&mute=off"}}"#),
        );

        let np = now_playing(&players, "1").unwrap();
        assert_eq!(np.cur_pos, Some(65000));
        assert_eq!(np.duration, Some(180000));
        assert_eq!(np.state, Some(PlayState::Pause));
        assert_eq!(np.volume, Some(12));
    }

    #[test]
    fn first_player_selected_without_memory() {
        let mut rec = Reconciler::new(Box::new(MemorySelectionStore::new()), BrowseChannel::default());
        rec.apply(
            &envelope(r#"{"heos": {"command": "player/get_players", "result": "success", "message": ""}, "payload": [{"pid": 7, "name": "A"}, {"pid": 8, "name": "B"}]}"#),
            Instant::now(),
        );
        assert_eq!(rec.active_pid(), Some("7"));
    }

    #[test]
    fn remembered_selection_wins_when_present() {
        let mut rec = Reconciler::new(
            Box::new(MemorySelectionStore::with_selection("8")),
            BrowseChannel::default(),
        );
        rec.apply(
            &envelope(r#"{"heos": {"command": "player/get_players", "result": "success", "message": ""}, "payload": [{"pid": 7, "name": "A"}, {"pid": 8, "name": "B"}]}"#),
            Instant::now(),
        );
        assert_eq!(rec.active_player().map(|p| p.name.as_str()), Some("B"));

        // A remembered player that left the roster falls back to the first
        let mut rec = Reconciler::new(
            Box::new(MemorySelectionStore::with_selection("42")),
            BrowseChannel::default(),
        );
        rec.apply(
            &envelope(r#"{"heos": {"command": "player/get_players", "result": "success", "message": ""}, "payload": [{"pid": 7, "name": "A"}]}"#),
            Instant::now(),
        );
        assert_eq!(rec.active_pid(), Some("7"));
    }

    #[test]
    fn select_persists_and_rejects_unknown() {
        let mut rec = Reconciler::new(Box::new(MemorySelectionStore::new()), BrowseChannel::default());
        rec.apply(
            &envelope(r#"{"heos": {"command": "player/get_players", "result": "success", "message": ""}, "payload": [{"pid": 7, "name": "A"}, {"pid": 8, "name": "B"}]}"#),
            Instant::now(),
        );
        rec.select("8").unwrap();
        assert_eq!(rec.active_pid(), Some("8"));
        assert!(matches!(rec.select("9"), Err(ClientError::UnknownPlayer(_))));
    }

    #[tokio::test]
    async fn browse_results_go_to_channel_not_players() {
        let mut rec = Reconciler::new(Box::new(MemorySelectionStore::new()), BrowseChannel::default());
        let mut rx = rec.browse_notifications();

        let applied = rec.apply(
            &envelope(r#"{"heos": {"command": "browse/get_music_sources", "result": "success", "message": ""}, "payload": [{"name": "Pandora", "sid": 1}, {"name": "TuneIn", "sid": 3}]}"#),
            Instant::now(),
        );

        assert!(matches!(applied, Some(KnownEvent::Browse(_))));
        assert!(rec.players().is_empty());
        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.command, "get_music_sources");
        assert_eq!(notification.items().len(), 2);
    }

    #[test]
    fn unrecognized_envelopes_are_ignored() {
        let mut rec = Reconciler::new(Box::new(MemorySelectionStore::new()), BrowseChannel::default());
        let applied = rec.apply(
            &envelope(r#"{"heos": {"command": "event/groups_changed", "message": ""}}"#),
            Instant::now(),
        );
        assert!(applied.is_none());
    }

    #[test]
    fn position_follows_progress_and_ticks() {
        let t0 = Instant::now();
        let mut rec = Reconciler::new(Box::new(MemorySelectionStore::new()), BrowseChannel::default());
        rec.apply(
            &envelope(r#"{"heos": {"command": "player/get_players", "result": "success", "message": ""}, "payload": [{"pid": 1, "name": "A"}]}"#),
            t0,
        );
        rec.apply(
            &envelope(r#"{"heos": {"command": "event/player_now_playing_progress", "message": "pid=1&cur_pos=40000&duration=200000"}}"#),
            t0,
        );
        rec.apply(
            &envelope(r#"{"heos": {"command": "player/get_play_state", "result": "success", "message": "pid=1&state=play"}}"#),
            t0,
        );

        rec.tick(t0 + Duration::from_secs(2));
        assert_eq!(rec.position_ms("1"), Some(42_000.0));

        rec.apply(
            &envelope(r#"{"heos": {"command": "event/player_now_playing_progress", "message": "pid=1&cur_pos=65000&duration=200000"}}"#),
            t0 + Duration::from_secs(2),
        );
        assert_eq!(rec.position_ms("1"), Some(65_000.0));

        // Tick only touches positions
        rec.tick(t0 + Duration::from_secs(3));
        assert_eq!(
            now_playing(rec.players(), "1").unwrap().cur_pos,
            Some(65_000)
        );
    }
}
