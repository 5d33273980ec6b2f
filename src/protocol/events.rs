use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MEDIA_PLAYBACK_STARTED: &str = "MediaInputPlaybackStarted";
pub const MEDIA_PLAYBACK_ENDED: &str = "MediaInputPlaybackEnded";
pub const MEDIA_ACTION_TRIGGERED: &str = "MediaInputActionTriggered";

/// An event pushed by the mixer, fanned out to every subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct MixerEvent {
    pub event_type: String,
    pub event_data: Value,
}

impl MixerEvent {
    pub fn input_name(&self) -> Option<&str> {
        self.event_data.get("inputName").and_then(Value::as_str)
    }

    pub fn media_action(&self) -> Option<MediaAction> {
        self.event_data
            .get("mediaAction")
            .and_then(Value::as_str)
            .and_then(MediaAction::from_wire)
    }
}

/// Transport actions a media input accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaAction {
    Play,
    Pause,
    Stop,
    Restart,
    Next,
    Previous,
}

impl MediaAction {
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Play => "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_PLAY",
            Self::Pause => "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_PAUSE",
            Self::Stop => "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_STOP",
            Self::Restart => "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_RESTART",
            Self::Next => "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_NEXT",
            Self::Previous => "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_PREVIOUS",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        Some(match s {
            "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_PLAY" => Self::Play,
            "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_PAUSE" => Self::Pause,
            "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_STOP" => Self::Stop,
            "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_RESTART" => Self::Restart,
            "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_NEXT" => Self::Next,
            "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_PREVIOUS" => Self::Previous,
            _ => return None,
        })
    }
}

/// Playback state of a media input as reported by `GetMediaInputStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaState {
    None,
    Playing,
    Opening,
    Buffering,
    Paused,
    Stopped,
    Ended,
    Error,
}

impl MediaState {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "OBS_MEDIA_STATE_PLAYING" => Self::Playing,
            "OBS_MEDIA_STATE_OPENING" => Self::Opening,
            "OBS_MEDIA_STATE_BUFFERING" => Self::Buffering,
            "OBS_MEDIA_STATE_PAUSED" => Self::Paused,
            "OBS_MEDIA_STATE_STOPPED" => Self::Stopped,
            "OBS_MEDIA_STATE_ENDED" => Self::Ended,
            "OBS_MEDIA_STATE_ERROR" => Self::Error,
            _ => Self::None,
        }
    }

    /// Paused, stopped and ended media can all be resumed with PLAY.
    pub fn is_resumable(self) -> bool {
        matches!(self, Self::Paused | Self::Stopped | Self::Ended)
    }
}

/// Snapshot of a media input's transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaStatus {
    pub state: MediaState,
    /// Total length in milliseconds, when the mixer knows it.
    pub duration_ms: Option<u64>,
    /// Playback position in milliseconds, when the mixer knows it.
    pub cursor_ms: Option<u64>,
}

impl MediaStatus {
    pub fn from_response(data: &Value) -> Self {
        let ms = |key: &str| {
            data.get(key)
                .and_then(Value::as_f64)
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(|v| v as u64)
        };
        Self {
            state: data
                .get("mediaState")
                .and_then(Value::as_str)
                .map(MediaState::from_wire)
                .unwrap_or(MediaState::None),
            duration_ms: ms("mediaDuration"),
            cursor_ms: ms("mediaCursor"),
        }
    }
}
