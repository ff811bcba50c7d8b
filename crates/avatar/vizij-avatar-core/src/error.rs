//! Error types for the avatar core.

use serde::{Deserialize, Serialize};

/// Errors surfaced by public avatar operations.
///
/// Per-frame work never returns these directly; failures inside `update` are
/// converted into [`AvatarEvent`](crate::outputs::AvatarEvent)s instead.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AvatarError {
    /// A queued request carried an empty slug.
    #[error("animation request slug must not be empty")]
    EmptySlug,

    /// No continuous clip registered under this name.
    #[error("Clip not found: {name}")]
    UnknownClip { name: String },

    /// Clip data failed validation.
    #[error("Invalid clip '{name}': {reason}")]
    InvalidClip { name: String, reason: String },

    /// Clip bytes could not be decoded.
    #[error("Clip parse error: {reason}")]
    ClipParse { reason: String },

    /// A joint needed by a limb is absent from the skeleton.
    #[error("Joint '{joint}' missing for limb '{limb}'")]
    MissingJoint { limb: String, joint: String },

    /// Audio analysis attach/read failure.
    #[error("Audio error: {reason}")]
    Audio { reason: String },

    /// Configuration rejected by validation.
    #[error("Invalid config: {reason}")]
    Config { reason: String },
}

impl AvatarError {
    pub fn audio(reason: impl Into<String>) -> Self {
        Self::Audio {
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Check if the frame loop can carry on after this error.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnknownClip { .. }
                | Self::InvalidClip { .. }
                | Self::ClipParse { .. }
                | Self::MissingJoint { .. }
                | Self::Audio { .. }
        )
    }

    /// Get error category for logging.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::EmptySlug | Self::Config { .. } => "input",
            Self::UnknownClip { .. } | Self::InvalidClip { .. } | Self::ClipParse { .. } => {
                "asset"
            }
            Self::MissingJoint { .. } => "skeleton",
            Self::Audio { .. } => "audio",
        }
    }
}

impl From<serde_json::Error> for AvatarError {
    fn from(err: serde_json::Error) -> Self {
        Self::ClipParse {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_and_recoverability() {
        assert_eq!(AvatarError::EmptySlug.category(), "input");
        assert!(!AvatarError::EmptySlug.is_recoverable());

        let missing = AvatarError::MissingJoint {
            limb: "leftArm".into(),
            joint: "leftLowerArm".into(),
        };
        assert_eq!(missing.category(), "skeleton");
        assert!(missing.is_recoverable());
        assert_eq!(
            missing.to_string(),
            "Joint 'leftLowerArm' missing for limb 'leftArm'"
        );
    }

    #[test]
    fn json_errors_become_parse_errors() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let converted: AvatarError = err.into();
        assert!(matches!(converted, AvatarError::ClipParse { .. }));
    }
}
