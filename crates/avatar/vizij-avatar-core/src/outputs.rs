//! Output contracts from the avatar core.
//!
//! Each frame yields the viseme sample (if audio ran) and a list of semantic
//! events. Hosts forward events to their UI/status layer; joint and expression
//! writes have already been applied through the skeleton/expression adapters.

use serde::{Deserialize, Serialize};

use crate::viseme::VisemeFrame;

/// Asset/model loading status.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Status {
    #[default]
    Idle,
    Loading,
    Ready,
    Error {
        message: String,
    },
}

/// Discrete signals emitted during a frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AvatarEvent {
    StatusChanged { status: Status },
    AudioError { message: String },
    GestureStarted { slug: String },
    GestureFinished { slug: String },
    /// A `Pose` clip reached its last frame and is being held.
    GestureHeld { slug: String },
    GestureReleased { slug: String },
    GestureDropped { slug: String, reason: String },
    LimbSkipped { limb: String, reason: String },
}

/// Outputs returned by `Avatar::update()`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AvatarFrame {
    #[serde(default)]
    pub viseme: Option<VisemeFrame>,
    #[serde(default)]
    pub events: Vec<AvatarEvent>,
}

impl AvatarFrame {
    #[inline]
    pub fn clear(&mut self) {
        self.viseme = None;
        self.events.clear();
    }

    #[inline]
    pub fn push_event(&mut self, event: AvatarEvent) {
        self.events.push(event);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.viseme.is_none() && self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_with_state_tag() {
        let json = serde_json::to_value(Status::Error {
            message: "boom".into(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"state": "error", "message": "boom"}));
        let idle = serde_json::to_value(Status::Idle).unwrap();
        assert_eq!(idle, serde_json::json!({"state": "idle"}));
    }
}
