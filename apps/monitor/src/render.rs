//! One-line summaries of client state for the log.

use heos_relay_core::client::Player;
use heos_relay_core::{format_mm_ss, BrowseNotification};

/// `Kitchen [play] Song - Artist (01:05 / 03:00) vol 40`
pub fn player_line(player: &Player, position_ms: Option<f64>) -> String {
    let Some(np) = &player.now_playing else {
        return format!("{} [idle]", player.name);
    };

    let state = np.state.map(|s| s.to_string()).unwrap_or_else(|| "?".into());
    let title = match (np.song.as_deref(), np.artist.as_deref()) {
        (Some(song), Some(artist)) if !artist.is_empty() => format!("{} - {}", song, artist),
        (Some(song), _) => song.to_string(),
        (None, _) => "(nothing playing)".to_string(),
    };
    let mut line = format!(
        "{} [{}] {} ({} / {})",
        player.name,
        state,
        title,
        format_mm_ss(position_ms),
        format_mm_ss(np.duration.map(|d| d as f64)),
    );
    if let Some(volume) = np.volume {
        line.push_str(&format!(" vol {}", volume));
    }
    line
}

/// `get_music_sources: 3 item(s): Pandora, TuneIn, Local Music`
pub fn browse_line(notification: &BrowseNotification) -> String {
    if notification.result.as_deref() == Some("fail") {
        let reason = notification
            .message
            .get("text")
            .map(String::as_str)
            .unwrap_or("unknown error");
        return format!("{} failed: {}", notification.command, reason);
    }

    let items = notification.items();
    let names: Vec<&str> = items
        .iter()
        .filter_map(|item| item.get("name").and_then(|n| n.as_str()))
        .collect();
    format!(
        "{}: {} item(s): {}",
        notification.command,
        items.len(),
        names.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use heos_relay_core::client::{NowPlaying, PlayState};
    use heos_relay_core::EventEnvelope;

    fn player(now_playing: Option<NowPlaying>) -> Player {
        Player {
            pid: "1".into(),
            name: "Kitchen".into(),
            now_playing,
            extra: Default::default(),
        }
    }

    #[test]
    fn renders_idle_and_playing_players() {
        assert_eq!(player_line(&player(None), None), "Kitchen [idle]");

        let np = NowPlaying {
            song: Some("Song".into()),
            artist: Some("Artist".into()),
            state: Some(PlayState::Play),
            duration: Some(180_000),
            volume: Some(40),
            ..NowPlaying::new("1")
        };
        assert_eq!(
            player_line(&player(Some(np)), Some(65_000.0)),
            "Kitchen [play] Song - Artist (01:05 / 03:00) vol 40"
        );
    }

    #[test]
    fn renders_browse_results_and_failures() {
        let ok = EventEnvelope::from_upstream_line(
            r#"{"heos": {"command": "browse/get_music_sources", "result": "success", "message": ""}, "payload": [{"name": "Pandora"}, {"name": "TuneIn"}]}"#,
        )
        .unwrap();
        assert_eq!(
            browse_line(&BrowseNotification::from_envelope(&ok)),
            "get_music_sources: 2 item(s): Pandora, TuneIn"
        );

        let failed = EventEnvelope::from_upstream_line(
            r#"{"heos": {"command": "browse/browse", "result": "fail", "message": "eid=2&text=ID Not Valid"}}"#,
        )
        .unwrap();
        assert_eq!(
            browse_line(&BrowseNotification::from_envelope(&failed)),
            "browse failed: ID Not Valid"
        );
    }
}
