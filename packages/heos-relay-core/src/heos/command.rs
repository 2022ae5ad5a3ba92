//! Upstream command representation and line encoding.

use std::fmt;

use crate::protocol_constants::{HEOS_COMMAND_PREFIX, HEOS_LINE_TERMINATOR};

/// A single command written to the upstream control connection.
///
/// Parameters keep their insertion order so the encoded line matches what
/// callers built, which keeps logs and tests predictable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeosCommand {
    group: String,
    action: String,
    params: Vec<(String, String)>,
}

impl HeosCommand {
    /// Creates a command without parameters.
    pub fn new(group: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            action: action.into(),
            params: Vec::new(),
        }
    }

    /// Appends a parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Appends a parameter only when a value is present.
    ///
    /// Absent values are forwarded as absent, never as an empty string.
    #[must_use]
    pub fn param_opt(self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.param(key, v),
            None => self,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Looks up a parameter value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Encodes the command as a complete CLI line, terminator included.
    pub fn encode(&self) -> String {
        let mut line = format!("{}{}", HEOS_COMMAND_PREFIX, self);
        line.push_str(HEOS_LINE_TERMINATOR);
        line
    }
}

impl fmt::Display for HeosCommand {
    /// Formats as `group/action?k=v&...` without scheme or terminator.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.action)?;
        for (i, (key, value)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", sep, key, escape_value(value))?;
        }
        Ok(())
    }
}

/// Escapes the characters the CLI reserves inside parameter values.
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            other => out.push(other),
        }
    }
    out
}

/// Reverses [`escape_value`]. Unknown escape sequences are left untouched.
pub fn unescape_value(value: &str) -> String {
    if !value.contains('%') {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(idx) = rest.find('%') {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];
        let decoded = match tail.get(..3) {
            Some("%25") => Some('%'),
            Some("%26") => Some('&'),
            Some(s) if s.eq_ignore_ascii_case("%3D") => Some('='),
            _ => None,
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[3..];
            }
            None => {
                out.push('%');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
