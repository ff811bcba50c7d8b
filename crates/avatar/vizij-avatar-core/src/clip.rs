//! Clip data model.
//!
//! Clips arrive from the clip registry as JSON bytes:
//!
//! ```json
//! {
//!   "name": "wave",
//!   "duration": 1.2,
//!   "tracks": [
//!     { "joint": "rightUpperArm",
//!       "keys": [ { "time": 0.0, "rotation": [0, 0, 0, 1] } ] }
//!   ],
//!   "expressions": {
//!     "tracks": [ { "channel": "happy", "keys": [ { "time": 0.0, "value": 0.0 } ] } ]
//!   }
//! }
//! ```
//!
//! Times are in seconds from clip start; rotations are local `[x, y, z, w]`.

use serde::{Deserialize, Serialize};

use crate::error::AvatarError;

/// One rotation sample for a joint.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct RotationKey {
    pub time: f32,
    pub rotation: [f32; 4],
}

/// Rotation keys targeting one humanoid joint.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JointTrack {
    pub joint: String,
    pub keys: Vec<RotationKey>,
}

/// One scalar sample for an expression channel.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExpressionKey {
    pub time: f32,
    pub value: f32,
}

/// Keys targeting one named expression (blend shape) channel.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExpressionTrack {
    pub channel: String,
    pub keys: Vec<ExpressionKey>,
}

/// Optional facial-expression channels carried by discrete clips.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ExpressionMetadata {
    #[serde(default)]
    pub tracks: Vec<ExpressionTrack>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClipData {
    pub name: String,
    /// Duration in seconds.
    #[serde(rename = "duration")]
    pub duration_s: f32,
    #[serde(default)]
    pub tracks: Vec<JointTrack>,
    #[serde(default)]
    pub expressions: Option<ExpressionMetadata>,
}

impl ClipData {
    /// Decode registry bytes and validate.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, AvatarError> {
        let clip: ClipData = serde_json::from_slice(bytes)?;
        clip.validate_basic()?;
        Ok(clip)
    }

    /// Validate basic invariants (positive duration, ordered in-range key times).
    pub fn validate_basic(&self) -> Result<(), AvatarError> {
        let invalid = |reason: String| AvatarError::InvalidClip {
            name: self.name.clone(),
            reason,
        };
        if !self.duration_s.is_finite() || self.duration_s <= 0.0 {
            return Err(invalid("duration must be > 0 s".into()));
        }
        for track in &self.tracks {
            check_times(track.keys.iter().map(|k| k.time), self.duration_s)
                .map_err(|r| invalid(format!("track '{}': {r}", track.joint)))?;
        }
        if let Some(meta) = &self.expressions {
            for track in &meta.tracks {
                check_times(track.keys.iter().map(|k| k.time), self.duration_s)
                    .map_err(|r| invalid(format!("expression '{}': {r}", track.channel)))?;
            }
        }
        Ok(())
    }

    /// A clip can drive a skeleton only if it validates and has joint tracks.
    pub fn is_playable(&self) -> bool {
        !self.tracks.is_empty() && self.validate_basic().is_ok()
    }

    pub fn has_expressions(&self) -> bool {
        self.expressions
            .as_ref()
            .is_some_and(|m| !m.tracks.is_empty())
    }
}

fn check_times(times: impl Iterator<Item = f32>, duration: f32) -> Result<(), String> {
    let mut last = f32::NEG_INFINITY;
    for t in times {
        if !t.is_finite() || t < 0.0 || t > duration {
            return Err(format!("key time {t} outside [0, {duration}]"));
        }
        if t < last {
            return Err("key times must be non-decreasing".into());
        }
        last = t;
    }
    Ok(())
}
