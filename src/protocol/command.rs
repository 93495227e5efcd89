//! Player command messages.
//!
//! Commands arrive as JSON text frames from the controller server, one object
//! per frame, discriminated by a literal `type` field.
//!
//! # Command Types
//!
//! | Type | Payload |
//! |------|---------|
//! | `toggle-play-pause` | — |
//! | `previous-track` | — |
//! | `next-track` | — |
//! | `set-volume` | number (target volume, 0.0–1.0) |
//! | `fast-rewind` | number (seconds) |
//! | `fast-forward` | number (seconds) |
//!
//! Payload *ranges* are not checked here. The validator only guards the shape
//! of the message (discriminant plus payload primitive type); clamping or
//! rejecting out-of-range values is the consumer's job.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// PlayerCommand
// ============================================================================

/// A playback command received from the controller server.
///
/// # Format
///
/// ```json
/// { "type": "set-volume", "payload": 0.5 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PlayerCommand {
    /// Toggle between play and pause.
    TogglePlayPause,

    /// Go to the previous track.
    PreviousTrack,

    /// Go to the next track.
    NextTrack,

    /// Set the player volume.
    SetVolume {
        /// Target volume. Consumers expect 0.0–1.0.
        payload: f64,
    },

    /// Rewind by the given number of seconds.
    FastRewind {
        /// Rewind duration in seconds.
        payload: f64,
    },

    /// Fast forward by the given number of seconds.
    FastForward {
        /// Forward duration in seconds.
        payload: f64,
    },
}

impl PlayerCommand {
    /// Parses a raw JSON value into a typed command.
    ///
    /// Returns `None` unless [`is_player_command`] accepts the value. This is
    /// the only path from untrusted input to a [`PlayerCommand`].
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        if !is_player_command(value) {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// Returns the wire discriminant for this command.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TogglePlayPause => "toggle-play-pause",
            Self::PreviousTrack => "previous-track",
            Self::NextTrack => "next-track",
            Self::SetVolume { .. } => "set-volume",
            Self::FastRewind { .. } => "fast-rewind",
            Self::FastForward { .. } => "fast-forward",
        }
    }
}

// ============================================================================
// Validator
// ============================================================================

/// Returns `true` if the value has the shape of a [`PlayerCommand`].
///
/// Structural check only: the value must be an object, `type` must be one of
/// the known discriminants, and commands that carry a payload must carry a
/// number. Semantic range checks are left to the consumer.
#[must_use]
pub fn is_player_command(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };

    match obj.get("type").and_then(Value::as_str) {
        Some("toggle-play-pause" | "previous-track" | "next-track") => true,
        Some("set-volume" | "fast-rewind" | "fast-forward") => {
            obj.get("payload").is_some_and(Value::is_number)
        }
        _ => false,
    }
}

// ============================================================================
// Tests
// ============================================================================
