//! Event Envelope: the annotated wire record relayed to every client.
//!
//! Upstream records arrive as single JSON lines where `heos.command` is a
//! `group/command` string and `heos.message` is a flat query-like string.
//! The relay re-shapes both into structured form and passes `payload` and
//! `options` through verbatim.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::command::unescape_value;
use super::HeosResult;

/// Annotated event record as sent to stream subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub heos: HeosHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

/// The `heos` block of an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeosHeader {
    pub command: CommandPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default)]
    pub message: Message,
}

/// Routing key of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandPath {
    #[serde(rename = "commandGroup")]
    pub group: String,
    pub command: String,
}

impl CommandPath {
    /// Splits a `group/command` string. A path without `/` is all group.
    pub fn parse(path: &str) -> Self {
        match path.split_once('/') {
            Some((group, command)) => Self {
                group: group.to_string(),
                command: command.to_string(),
            },
            None => Self {
                group: path.to_string(),
                command: String::new(),
            },
        }
    }

    pub fn is(&self, group: &str, command: &str) -> bool {
        self.group == group && self.command == command
    }
}

/// Message string in both raw and parsed form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub unparsed: String,
    #[serde(default)]
    pub parsed: BTreeMap<String, String>,
}

impl Message {
    /// Parses a flat `k=v&k2=v2` message string.
    ///
    /// Segments without `=` become keys with an empty value, which is how the
    /// protocol spells flags such as `command under process`.
    pub fn parse(raw: &str) -> Self {
        let parsed = raw
            .split('&')
            .filter(|segment| !segment.is_empty())
            .map(|segment| match segment.split_once('=') {
                Some((k, v)) => (unescape_value(k), unescape_value(v)),
                None => (unescape_value(segment), String::new()),
            })
            .collect();
        Self {
            unparsed: raw.to_string(),
            parsed,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.parsed.get(key).map(String::as_str)
    }
}

/// Raw upstream record before annotation.
#[derive(Debug, Deserialize)]
struct RawRecord {
    heos: RawHeader,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    options: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    command: String,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl EventEnvelope {
    /// Decodes and annotates one upstream JSON line.
    pub fn from_upstream_line(line: &str) -> HeosResult<Self> {
        Self::from_upstream_bytes(line.as_bytes())
    }

    /// Same as [`from_upstream_line`](Self::from_upstream_line) for a raw
    /// frame. Bytes that are not UTF-8 fail as a decode error.
    pub fn from_upstream_bytes(line: &[u8]) -> HeosResult<Self> {
        let raw: RawRecord = serde_json::from_slice(line)?;
        Ok(Self {
            heos: HeosHeader {
                command: CommandPath::parse(&raw.heos.command),
                result: raw.heos.result,
                message: Message::parse(raw.heos.message.as_deref().unwrap_or_default()),
            },
            payload: raw.payload,
            options: raw.options,
        })
    }

    pub fn command(&self) -> &CommandPath {
        &self.heos.command
    }

    pub fn parsed(&self) -> &BTreeMap<String, String> {
        &self.heos.message.parsed
    }

    /// Whether the upstream reported this command as failed.
    pub fn is_failure(&self) -> bool {
        self.heos.result.as_deref() == Some("fail")
    }

    /// Whether this is an interim "command under process" acknowledgement.
    pub fn is_under_process(&self) -> bool {
        self.heos.message.parsed.contains_key("command under process")
    }
}
