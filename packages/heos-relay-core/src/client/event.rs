//! Typed view of the envelopes the reconciler understands.
//!
//! Classification looks only at `(commandGroup, command)`. Payload shape is
//! never used to guess what an envelope is.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::events::BrowseNotification;
use crate::heos::EventEnvelope;

use super::model::{Player, Pid, PlayState};

/// Envelopes that affect client state.
#[derive(Debug, Clone, PartialEq)]
pub enum KnownEvent {
    /// `player/get_players`: the full roster, in payload order.
    Players(Vec<Player>),
    /// `player/get_now_playing_media`: media payload for one player.
    NowPlayingMedia { pid: Pid, media: Map<String, Value> },
    /// `player/get_play_state`.
    PlayStateReport { pid: Pid, state: String },
    /// `player/get_volume`.
    VolumeReport { pid: Pid, level: String },
    /// `event/player_now_playing_changed`: all parsed message fields.
    NowPlayingChanged {
        pid: Pid,
        fields: BTreeMap<String, String>,
    },
    /// `event/player_now_playing_progress`: carries `cur_pos` and `duration`.
    NowPlayingProgress {
        pid: Pid,
        fields: BTreeMap<String, String>,
    },
    /// `event/player_state_changed`.
    StateChanged { pid: Pid, state: String },
    /// `event/player_volume_changed`.
    VolumeChanged { pid: Pid, level: String },
    /// Anything in the `browse` group.
    Browse(BrowseNotification),
}

impl KnownEvent {
    /// Classifies an envelope, or returns `None` for anything unrecognized.
    ///
    /// Failed and still-processing player responses carry no state and are
    /// treated as unrecognized. Browse envelopes pass through regardless so
    /// the catalog view can show errors.
    pub fn classify(envelope: &EventEnvelope) -> Option<Self> {
        let path = envelope.command();
        if path.group == "browse" {
            return Some(Self::Browse(BrowseNotification::from_envelope(envelope)));
        }
        if envelope.is_failure() || envelope.is_under_process() {
            return None;
        }

        let message = &envelope.heos.message;
        let pid = || message.get("pid").filter(|p| !p.is_empty()).map(str::to_string);
        let field = |key: &str| message.get(key).map(str::to_string);

        let event = match (path.group.as_str(), path.command.as_str()) {
            ("player", "get_players") => {
                let entries = envelope.payload.as_ref()?.as_array()?;
                Self::Players(entries.iter().filter_map(Player::from_roster_entry).collect())
            }
            ("player", "get_now_playing_media") => Self::NowPlayingMedia {
                pid: pid()?,
                media: envelope
                    .payload
                    .as_ref()
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
            },
            ("player", "get_play_state") => Self::PlayStateReport {
                pid: pid()?,
                state: field("state")?,
            },
            ("player", "get_volume") => Self::VolumeReport {
                pid: pid()?,
                level: field("level")?,
            },
            ("event", "player_now_playing_changed") => Self::NowPlayingChanged {
                pid: pid()?,
                fields: message.parsed.clone(),
            },
            ("event", "player_now_playing_progress") => Self::NowPlayingProgress {
                pid: pid()?,
                fields: message.parsed.clone(),
            },
            ("event", "player_state_changed") => Self::StateChanged {
                pid: pid()?,
                state: field("state")?,
            },
            ("event", "player_volume_changed") => Self::VolumeChanged {
                pid: pid()?,
                level: field("level")?,
            },
            _ => return None,
        };
        Some(event)
    }

    /// The player a per-player event refers to.
    pub fn pid(&self) -> Option<&str> {
        match self {
            Self::NowPlayingMedia { pid, .. }
            | Self::PlayStateReport { pid, .. }
            | Self::VolumeReport { pid, .. }
            | Self::NowPlayingChanged { pid, .. }
            | Self::NowPlayingProgress { pid, .. }
            | Self::StateChanged { pid, .. }
            | Self::VolumeChanged { pid, .. } => Some(pid),
            Self::Players(_) | Self::Browse(_) => None,
        }
    }

    /// Position sample (ms) carried by this event, if any.
    pub fn cur_pos_sample(&self) -> Option<u64> {
        match self {
            Self::NowPlayingChanged { fields, .. } | Self::NowPlayingProgress { fields, .. } => {
                fields.get("cur_pos")?.parse().ok()
            }
            Self::NowPlayingMedia { media, .. } => media.get("cur_pos")?.as_u64(),
            _ => None,
        }
    }

    /// Play state carried by this event, if any.
    pub fn state_sample(&self) -> Option<PlayState> {
        match self {
            Self::PlayStateReport { state, .. } | Self::StateChanged { state, .. } => state.parse().ok(),
            Self::NowPlayingChanged { fields, .. } | Self::NowPlayingProgress { fields, .. } => {
                fields.get("state")?.parse().ok()
            }
            _ => None,
        }
    }
}
