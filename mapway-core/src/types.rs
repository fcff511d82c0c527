//! Domain types for the routing table and its change events.
//!
//! A [`ChangeRequest`] is the raw record published on the subscription channel.
//! It becomes a [`ChangeEvent`] only after trimming and validation; everything
//! downstream of the decoder works with validated events.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InvalidEvent;

// ---------------------------------------------------------------------------
// Routing entries
// ---------------------------------------------------------------------------

/// One `key value` row of the routing table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingEntry {
    pub key: String,
    pub value: String,
}

impl RoutingEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// The table-file line for this entry, without the trailing newline.
    pub fn to_line(&self) -> String {
        format!("{} {}", self.key, self.value)
    }

    /// Parse a table-file line. The key is everything before the first
    /// whitespace run, the value is the remainder.
    ///
    /// Blank lines and lines starting with whitespace (empty key) yield `None`.
    pub fn from_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let key = leading_key(line);
        if key.is_empty() {
            return None;
        }
        let value = line[key.len()..].trim_start();
        Some(Self::new(key, value))
    }
}

impl fmt::Display for RoutingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.key, self.value)
    }
}

/// The leading token of a table-file line: the text before the first whitespace.
///
/// A line starting with whitespace has an empty leading token.
pub fn leading_key(line: &str) -> &str {
    match line.find(char::is_whitespace) {
        Some(idx) => &line[..idx],
        None => line,
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// The two supported change actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Add,
    Remove,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Add => "add",
            Action::Remove => "remove",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact, case-sensitive match; surrounding whitespace is not forgiven.
impl FromStr for Action {
    type Err = InvalidEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Action::Add),
            "remove" => Ok(Action::Remove),
            other => Err(InvalidEvent::UnknownAction(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire record
// ---------------------------------------------------------------------------

/// The change record as published on the channel: `{"Key", "Value", "Action"}`.
///
/// Field names also match in lowercase and uppercase; missing fields decode
/// as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeRequest {
    #[serde(rename = "Key", alias = "key", alias = "KEY")]
    pub key: String,
    #[serde(rename = "Value", alias = "value", alias = "VALUE")]
    pub value: String,
    #[serde(rename = "Action", alias = "action", alias = "ACTION")]
    pub action: String,
}

impl ChangeRequest {
    pub fn add(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            action: Action::Add.to_string(),
        }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: String::new(),
            action: Action::Remove.to_string(),
        }
    }

    /// Decode the first JSON value of a channel payload. Anything after it is ignored.
    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        let mut values = serde_json::Deserializer::from_str(payload).into_iter::<ChangeRequest>();
        match values.next() {
            Some(decoded) => decoded,
            None => Err(<serde_json::Error as serde::de::Error>::custom(
                "empty change payload",
            )),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Validated event
// ---------------------------------------------------------------------------

/// A trimmed, validated change ready to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub key: String,
    pub value: String,
    pub action: Action,
}

impl TryFrom<ChangeRequest> for ChangeEvent {
    type Error = InvalidEvent;

    fn try_from(request: ChangeRequest) -> Result<Self, Self::Error> {
        let action: Action = request.action.parse()?;
        let key = request.key.trim();
        let value = request.value.trim();

        if key.is_empty() {
            return Err(InvalidEvent::EmptyKey);
        }
        if key.contains(char::is_whitespace) {
            return Err(InvalidEvent::KeyHasWhitespace(key.to_string()));
        }
        if value.contains(['\r', '\n']) {
            return Err(InvalidEvent::ValueHasLineBreak(key.to_string()));
        }
        if action == Action::Add && value.is_empty() {
            return Err(InvalidEvent::EmptyValue(key.to_string()));
        }

        Ok(Self {
            key: key.to_string(),
            value: value.to_string(),
            action,
        })
    }
}
