//! Core configuration for vizij-avatar-core.
//!
//! Every field has a default, so hosts can deserialize partial JSON and only
//! override what they care about.

use serde::{Deserialize, Serialize};

use crate::error::AvatarError;

/// Top-level configuration grouping every component.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    pub viseme: VisemeConfig,
    pub blend: BlendConfig,
    pub queue: QueueConfig,
    pub ik: IkConfig,
    pub rest_pose: RestPoseConfig,
}

/// Audio → viseme signal shaping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisemeConfig {
    /// RMS value that maps to a full 1.0 level.
    pub reference_rms: f32,
    pub noise_floor: f32,
    pub gamma: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    /// Ascending bucket thresholds; bucket index = count strictly exceeded.
    pub thresholds: Vec<f32>,
    pub blink_max_intensity: f32,
    pub blink_suppress_ms: f32,
    pub blink_interval_min_ms: f32,
    pub blink_interval_max_ms: f32,
    /// Samples pulled from the audio source per tick.
    pub buffer_size: usize,
    /// Expression channel per viseme bucket (len = thresholds + 1).
    pub channels: Vec<String>,
    pub blink_channel: String,
    /// Fixed RNG seed for blink scheduling (tests/replay).
    pub seed: Option<u64>,
}

impl Default for VisemeConfig {
    fn default() -> Self {
        Self {
            reference_rms: 1.0,
            noise_floor: 0.02,
            gamma: 0.55,
            attack_ms: 30.0,
            release_ms: 60.0,
            thresholds: vec![0.22, 0.38, 0.58, 0.78],
            blink_max_intensity: 0.25,
            blink_suppress_ms: 220.0,
            blink_interval_min_ms: 2800.0,
            blink_interval_max_ms: 4200.0,
            buffer_size: 1024,
            channels: ["ih", "ou", "ee", "oh", "aa"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            blink_channel: "blink".to_string(),
            seed: None,
        }
    }
}

/// Continuous clip scheduling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    pub fade_in_sec: f32,
    pub fade_out_sec: f32,
    pub trigger_interval_min_sec: f32,
    pub trigger_interval_max_sec: f32,
    pub seed: Option<u64>,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            fade_in_sec: 0.25,
            fade_out_sec: 0.25,
            trigger_interval_min_sec: 3.0,
            trigger_interval_max_sec: 6.0,
            seed: None,
        }
    }
}

/// Gesture queue behavior.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Priority of the token raised while a gesture is active.
    pub suspend_priority: i32,
    pub fade_in_sec: f32,
    pub fade_out_sec: f32,
    /// How long the head request may wait on its clip fetch before it is
    /// dropped so the requests behind it can run.
    pub load_timeout_sec: f32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            suspend_priority: 100,
            fade_in_sec: 0.2,
            fade_out_sec: 0.25,
            load_timeout_sec: 3.0,
        }
    }
}

/// Iteration caps and tolerance for the FABRIK solver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IkConfig {
    /// Position-only passes per outer pass.
    pub max_iterations: u32,
    pub outer_passes: u32,
    /// End-effector distance (metres) counted as converged.
    pub tolerance: f32,
}

impl Default for IkConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            outer_passes: 2,
            tolerance: 0.01,
        }
    }
}

/// Resting arm placement, relative to each upper arm.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestPoseConfig {
    pub left_hand_direction: [f32; 3],
    pub right_hand_direction: [f32; 3],
    /// Fraction of the total arm length to reach along the direction.
    pub reach: f32,
}

impl Default for RestPoseConfig {
    fn default() -> Self {
        Self {
            left_hand_direction: [0.15, -1.0, 0.05],
            right_hand_direction: [-0.15, -1.0, 0.05],
            reach: 0.97,
        }
    }
}

impl AvatarConfig {
    /// Parse a (possibly partial) JSON config and validate it.
    pub fn from_json_str(json: &str) -> Result<Self, AvatarError> {
        let cfg: AvatarConfig =
            serde_json::from_str(json).map_err(|e| AvatarError::config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), AvatarError> {
        let v = &self.viseme;
        if !positive(v.reference_rms) {
            return Err(AvatarError::config("viseme.reference_rms must be > 0"));
        }
        if !(0.0..1.0).contains(&v.noise_floor) {
            return Err(AvatarError::config("viseme.noise_floor must be in [0, 1)"));
        }
        if !positive(v.gamma) {
            return Err(AvatarError::config("viseme.gamma must be > 0"));
        }
        if v.thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AvatarError::config(
                "viseme.thresholds must be strictly ascending",
            ));
        }
        if v.channels.len() != v.thresholds.len() + 1 {
            return Err(AvatarError::config(format!(
                "viseme.channels needs {} entries (thresholds + 1), got {}",
                v.thresholds.len() + 1,
                v.channels.len()
            )));
        }
        if v.blink_interval_min_ms > v.blink_interval_max_ms || v.blink_interval_min_ms < 0.0 {
            return Err(AvatarError::config("viseme blink interval is inverted"));
        }
        if v.buffer_size == 0 {
            return Err(AvatarError::config("viseme.buffer_size must be > 0"));
        }
        let b = &self.blend;
        if b.trigger_interval_min_sec > b.trigger_interval_max_sec
            || b.trigger_interval_min_sec < 0.0
        {
            return Err(AvatarError::config("blend trigger interval is inverted"));
        }
        if !positive(self.queue.load_timeout_sec) {
            return Err(AvatarError::config("queue.load_timeout_sec must be > 0"));
        }
        if self.ik.max_iterations == 0 || self.ik.outer_passes == 0 {
            return Err(AvatarError::config("ik iteration caps must be > 0"));
        }
        if !positive(self.ik.tolerance) {
            return Err(AvatarError::config("ik.tolerance must be > 0"));
        }
        Ok(())
    }
}

/// Finite and strictly positive (rejects NaN).
fn positive(x: f32) -> bool {
    x.is_finite() && x > 0.0
}
