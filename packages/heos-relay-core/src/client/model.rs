//! Client-side entities: players and their now-playing state.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Player identifier. Numeric on the wire, kept as its decimal string.
pub type Pid = String;

/// Normalizes a `pid` value that may arrive as a number or a string.
pub(crate) fn pid_from_value(value: &Value) -> Option<Pid> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    Play,
    Pause,
    Stop,
}

impl FromStr for PlayState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "play" => Ok(Self::Play),
            "pause" => Ok(Self::Pause),
            "stop" => Ok(Self::Stop),
            _ => Err(()),
        }
    }
}

impl fmt::Display for PlayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Stop => "stop",
        })
    }
}

/// What a player is currently playing.
///
/// Known fields are typed; anything else the device reports (`mid`, `sid`,
/// `station`, ...) is kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub pid: Pid,
    pub song: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub image_url: Option<String>,
    pub state: Option<PlayState>,
    /// Track length in milliseconds.
    pub duration: Option<u64>,
    /// Device-reported position in milliseconds at the last sync.
    pub cur_pos: Option<u64>,
    /// 0 to 100.
    pub volume: Option<u8>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl NowPlaying {
    pub fn new(pid: impl Into<Pid>) -> Self {
        Self {
            pid: pid.into(),
            ..Default::default()
        }
    }

    /// Shallow overwrite: each given field replaces the stored one, every
    /// other field is kept.
    ///
    /// Values that do not fit a typed field are ignored for that field.
    pub fn merge<I, K>(&mut self, fields: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (key, value) in fields {
            let key = key.into();
            match key.as_str() {
                "pid" => {
                    if let Some(pid) = pid_from_value(&value) {
                        self.pid = pid;
                    }
                }
                "song" => self.song = as_string(&value),
                "artist" => self.artist = as_string(&value),
                "album" => self.album = as_string(&value),
                "image_url" => self.image_url = as_string(&value),
                "state" => {
                    if let Some(state) = value.as_str().and_then(|s| s.parse().ok()) {
                        self.state = Some(state);
                    }
                }
                "duration" => {
                    if let Some(ms) = as_u64(&value) {
                        self.duration = Some(ms);
                    }
                }
                "cur_pos" => {
                    if let Some(ms) = as_u64(&value) {
                        self.cur_pos = Some(ms);
                    }
                }
                "volume" | "level" => {
                    if let Some(level) = as_u64(&value).and_then(|v| u8::try_from(v).ok()) {
                        self.volume = Some(level.min(100));
                    }
                }
                _ => {
                    self.extra.insert(key, value);
                }
            }
        }
    }

    /// Merges a flat string map such as a parsed message.
    pub fn merge_strings<'a, I>(&mut self, fields: I)
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        self.merge(
            fields
                .into_iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone()))),
        );
    }
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// One entry of the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub pid: Pid,
    pub name: String,
    /// `None` until the first event that needs it.
    pub now_playing: Option<NowPlaying>,
    /// Remaining roster attributes (`model`, `ip`, `gid`, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Player {
    /// Builds a player from a roster entry. Entries without a usable `pid`
    /// are rejected.
    pub fn from_roster_entry(entry: &Value) -> Option<Self> {
        let object = entry.as_object()?;
        let pid = pid_from_value(object.get("pid")?)?;
        let name = object
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let extra = object
            .iter()
            .filter(|(k, _)| k.as_str() != "pid" && k.as_str() != "name")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Some(Self {
            pid,
            name,
            now_playing: None,
            extra,
        })
    }

    /// The now-playing state, created with only `pid` set if absent.
    pub fn now_playing_mut(&mut self) -> &mut NowPlaying {
        let pid = &self.pid;
        self.now_playing
            .get_or_insert_with(|| NowPlaying::new(pid.clone()))
    }
}

/// Players keyed by `pid`, in roster order.
pub type PlayerCollection = IndexMap<Pid, Player>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_overwrites_only_given_fields() {
        let mut np = NowPlaying::new("1");
        np.merge([("song", json!("A")), ("artist", json!("B")), ("volume", json!(50))]);
        np.merge([("level", json!("80"))]);

        assert_eq!(np.song.as_deref(), Some("A"));
        assert_eq!(np.artist.as_deref(), Some("B"));
        assert_eq!(np.volume, Some(80));
    }

    #[test]
    fn numeric_strings_become_typed_fields() {
        let mut np = NowPlaying::new("1");
        np.merge([
            ("cur_pos", json!("65000")),
            ("duration", json!(180000)),
            ("state", json!("pause")),
            ("station", json!("Radio 1")),
        ]);
        assert_eq!(np.cur_pos, Some(65000));
        assert_eq!(np.duration, Some(180000));
        assert_eq!(np.state, Some(PlayState::Pause));
        assert_eq!(np.extra["station"], "Radio 1");
    }

    #[test]
    fn unknown_state_keeps_previous() {
        let mut np = NowPlaying::new("1");
        np.merge([("state", json!("play"))]);
        np.merge([("state", json!("buffering"))]);
        assert_eq!(np.state, Some(PlayState::Play));
    }

    #[test]
    fn roster_entry_normalizes_numeric_pid() {
        let player =
            Player::from_roster_entry(&json!({"name": "Kitchen", "pid": -1234, "model": "HEOS 1"}))
                .unwrap();
        assert_eq!(player.pid, "-1234");
        assert_eq!(player.name, "Kitchen");
        assert_eq!(player.extra["model"], "HEOS 1");
        assert!(player.now_playing.is_none());

        assert!(Player::from_roster_entry(&json!({"name": "no id"})).is_none());
    }
}
