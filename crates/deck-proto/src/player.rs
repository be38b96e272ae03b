//! Wire types for the media player HTTP API and its webhook feed.
//!
//! The player API reports the full zone state as JSON on `GET /{room}/state`
//! and pushes `{ "type": ..., "data": { "roomName": ..., ... } }` events to a
//! webhook.  Only the fields the control surface draws are modelled; anything
//! else in the payload is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Transport state as reported by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaybackState {
    Playing,
    #[serde(alias = "PAUSED_PLAYBACK")]
    Paused,
    #[default]
    Stopped,
    /// Reported briefly while the player switches tracks or buffers.
    Transitioning,
}

impl PlaybackState {
    pub fn is_playing(self) -> bool {
        self == PlaybackState::Playing
    }

    /// The state a play/pause toggle is expected to land in.
    pub fn toggled(self) -> Self {
        if self.is_playing() {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct Track {
    pub artist: String,
    pub title: String,
    /// Track length in seconds; `0` for streams.
    #[serde(rename = "duration")]
    pub duration_secs: i64,
    #[serde(rename = "absoluteAlbumArtUri")]
    pub art_locator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlayMode {
    pub shuffle: bool,
}

/// Full zone state.  Upstream may report `elapsed_secs > duration_secs`;
/// nothing here enforces the relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerState {
    pub playback_state: PlaybackState,
    pub current_track: Track,
    #[serde(rename = "elapsedTime")]
    pub elapsed_secs: i64,
    #[serde(rename = "volume")]
    pub volume_percent: i32,
    pub play_mode: PlayMode,
}

// ── Push events ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum PushEventError {
    #[error("malformed push event: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown push event kind {0:?}")]
    UnknownKind(String),
}

/// A webhook event that the surface cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    VolumeChange {
        room_name: String,
        new_volume: i32,
        previous_volume: Option<i32>,
    },
    TransportState {
        room_name: String,
        state: PlayerState,
    },
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeChangeData {
    room_name: String,
    new_volume: i32,
    #[serde(default)]
    previous_volume: Option<i32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransportStateData {
    room_name: String,
    state: PlayerState,
}

impl PushEvent {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, PushEventError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, PushEventError> {
        let raw: RawEvent = serde_json::from_value(value)?;
        match raw.kind.as_str() {
            "volume-change" => {
                let data: VolumeChangeData = serde_json::from_value(raw.data)?;
                Ok(PushEvent::VolumeChange {
                    room_name: data.room_name,
                    new_volume: data.new_volume,
                    previous_volume: data.previous_volume,
                })
            }
            "transport-state" => {
                let data: TransportStateData = serde_json::from_value(raw.data)?;
                Ok(PushEvent::TransportState {
                    room_name: data.room_name,
                    state: data.state,
                })
            }
            other => Err(PushEventError::UnknownKind(other.to_string())),
        }
    }

    pub fn room_name(&self) -> &str {
        match self {
            PushEvent::VolumeChange { room_name, .. } => room_name,
            PushEvent::TransportState { room_name, .. } => room_name,
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Fire-and-forget commands understood by the player API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    Previous,
    PlayPause,
    Next,
    ShuffleToggle,
    Playlist(String),
    /// Relative volume change; the player clamps the result.
    Volume(i32),
}

impl PlayerCommand {
    /// Path segments appended after the room name.
    pub fn path_segments(&self) -> Vec<String> {
        match self {
            PlayerCommand::Previous => vec!["previous".into()],
            PlayerCommand::PlayPause => vec!["playpause".into()],
            PlayerCommand::Next => vec!["next".into()],
            PlayerCommand::ShuffleToggle => vec!["shuffle".into(), "toggle".into()],
            PlayerCommand::Playlist(name) => vec!["playlist".into(), name.clone()],
            PlayerCommand::Volume(delta) => vec!["volume".into(), format!("{:+}", delta)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_paused_playback_alias() {
        let state: PlayerState =
            serde_json::from_value(json!({ "playbackState": "PAUSED_PLAYBACK" })).unwrap();
        assert_eq!(state.playback_state, PlaybackState::Paused);
        assert_eq!(state.current_track, Track::default());
    }

    #[test]
    fn test_toggle_from_transitioning_targets_playing() {
        assert_eq!(PlaybackState::Transitioning.toggled(), PlaybackState::Playing);
        assert_eq!(PlaybackState::Playing.toggled(), PlaybackState::Paused);
    }

    #[test]
    fn test_volume_command_is_signed() {
        assert_eq!(
            PlayerCommand::Volume(5).path_segments(),
            vec!["volume".to_string(), "+5".to_string()]
        );
        assert_eq!(
            PlayerCommand::Volume(-10).path_segments(),
            vec!["volume".to_string(), "-10".to_string()]
        );
    }

    #[test]
    fn test_unknown_kind_is_reported() {
        let err = PushEvent::from_value(json!({ "type": "topology-change", "data": [] }))
            .unwrap_err();
        assert!(matches!(err, PushEventError::UnknownKind(k) if k == "topology-change"));
    }
}
