use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::common::{
    errors::{ControlError, ControlResult},
    time::parse_timespan,
    types::CueNumber,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CueKind {
    #[default]
    Normal,
    /// Stops the live clock as soon as it is passed.
    Hold,
}

/// One entry of a scene's cue stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CueEntry {
    #[serde(alias = "position", deserialize_with = "deserialize_position")]
    pub position_ms: u64,
    #[serde(rename = "type", default)]
    pub kind: CueKind,
    #[serde(default)]
    pub payload: Value,
}

impl CueEntry {
    pub fn new(position_ms: u64, kind: CueKind, payload: Value) -> Self {
        Self {
            position_ms,
            kind,
            payload,
        }
    }
}

/// Positions are milliseconds, or a time span such as `"1:30"` or `"90s"`.
fn deserialize_position<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPosition {
        Millis(f64),
        Span(String),
    }

    match RawPosition::deserialize(deserializer)? {
        RawPosition::Millis(ms) if ms.is_finite() && ms >= 0.0 => Ok(ms.round() as u64),
        RawPosition::Millis(ms) => Err(serde::de::Error::custom(format!(
            "position must be a non-negative number, got {ms}"
        ))),
        RawPosition::Span(span) => Ok(parse_timespan(&span)),
    }
}

/// A scene's entries, sorted ascending by position.
///
/// Sorting happens once, here; equal positions keep their upload order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CueStack {
    entries: Vec<CueEntry>,
}

impl CueStack {
    pub fn new(mut entries: Vec<CueEntry>) -> Self {
        entries.sort_by_key(|e| e.position_ms);
        Self { entries }
    }

    /// Parses and validates an externally supplied JSON array of entries.
    pub fn from_json(value: Value) -> ControlResult<Self> {
        if !value.is_array() {
            return Err(ControlError::validation("cue stack must be an array"));
        }
        let entries: Vec<CueEntry> = serde_json::from_value(value)
            .map_err(|e| ControlError::validation(format!("invalid cue entry: {e}")))?;
        Ok(Self::new(entries))
    }

    pub fn entries(&self) -> &[CueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CueEntry> {
        self.entries.get(index)
    }

    /// Number of entries at or before `position_ms`.
    pub fn cursor_for(&self, position_ms: u64) -> usize {
        self.entries.partition_point(|e| e.position_ms <= position_ms)
    }

    /// Moves `cursor` forward one entry at a time while the entry under it
    /// is at or before `position_ms`. Never moves backwards.
    pub fn advance(&self, mut cursor: usize, position_ms: u64) -> usize {
        while let Some(entry) = self.entries.get(cursor) {
            if entry.position_ms > position_ms {
                break;
            }
            cursor += 1;
        }
        cursor
    }
}

/// A lighting cue to fire once tracked media reaches `at_ms`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaCue {
    #[serde(alias = "at", deserialize_with = "deserialize_position")]
    pub at_ms: u64,
    #[serde(deserialize_with = "deserialize_cue_number")]
    pub cue: CueNumber,
}

fn deserialize_cue_number<'de, D>(deserializer: D) -> Result<CueNumber, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawCue {
        Number(f64),
        Label(String),
    }

    let raw = match RawCue::deserialize(deserializer)? {
        RawCue::Number(n) => n.to_string(),
        RawCue::Label(label) => label,
    };
    CueNumber::parse(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid cue number {raw:?}")))
}

/// Cue content for a whole show, as stored in the cue file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShowFile {
    #[serde(default)]
    pub scenes: HashMap<String, Value>,
    #[serde(default)]
    pub active: Option<String>,
    /// Lighting cues keyed by the mixer media input that drives them.
    #[serde(default)]
    pub media: HashMap<String, Vec<MediaCue>>,
}

impl ShowFile {
    pub fn parse(text: &str) -> ControlResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| ControlError::validation(format!("invalid cue file: {e}")))
    }
}
