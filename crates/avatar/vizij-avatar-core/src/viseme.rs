//! VisemeSignalExtractor: audio buffer → smoothed mouth-shape signal.
//!
//! Per tick:
//! 1. RMS of the time-domain buffer, normalized by `reference_rms` to 0..1.
//! 2. Noise floor removal, re-normalization and gamma compression.
//! 3. Asymmetric smoothing (short attack, longer release).
//! 4. Bucketing against ascending thresholds.
//! 5. Blink scheduling, gated off while the mouth is moving.
//!
//! The extractor never fails towards its caller: read errors are reported in the
//! returned [`VisemeTick`] and the tick is treated as silence.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::audio::{AudioSource, AudioTap};
use crate::config::VisemeConfig;
use crate::error::AvatarError;
use crate::expression::ExpressionTarget;

fn is_false(b: &bool) -> bool {
    !*b
}

/// One viseme sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisemeFrame {
    /// Milliseconds since the extractor started.
    pub t: f64,
    /// Bucket index, `0..=thresholds.len()`.
    pub index: u8,
    /// Smoothed intensity in `[0, 1]`.
    pub intensity: f32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub blink: bool,
}

/// Output of [`VisemeSignalExtractor::tick`].
#[derive(Clone, Debug, PartialEq)]
pub struct VisemeTick {
    pub frame: VisemeFrame,
    /// Audio read failure for this tick, if any.
    pub fault: Option<AvatarError>,
}

#[derive(Debug)]
pub struct VisemeSignalExtractor {
    cfg: VisemeConfig,
    tap: Option<AudioTap>,
    buffer: Vec<f32>,
    smoothed: f32,
    elapsed_ms: f64,
    next_blink_at: Option<f64>,
    rng: SmallRng,
}

impl VisemeSignalExtractor {
    pub fn new(cfg: VisemeConfig) -> Self {
        let rng = match cfg.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            buffer: vec![0.0; cfg.buffer_size.max(1)],
            cfg,
            tap: None,
            smoothed: 0.0,
            elapsed_ms: 0.0,
            next_blink_at: None,
            rng,
        }
    }

    pub fn config(&self) -> &VisemeConfig {
        &self.cfg
    }

    /// Attach a new audio source. The previous source is always closed first,
    /// even when `open` fails.
    pub fn attach<F>(&mut self, open: F) -> Result<(), AvatarError>
    where
        F: FnOnce() -> Result<Box<dyn AudioSource>, AvatarError>,
    {
        self.detach();
        match open() {
            Ok(source) => {
                self.tap = Some(AudioTap::new(source));
                tracing::debug!("audio source attached");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "audio source failed to attach");
                Err(err)
            }
        }
    }

    pub fn detach(&mut self) {
        // Dropping the tap closes the source.
        self.tap = None;
    }

    pub fn is_attached(&self) -> bool {
        self.tap.is_some()
    }

    pub fn smoothed(&self) -> f32 {
        self.smoothed
    }

    /// Pull one buffer from the attached source and produce a frame.
    /// Without a source the tick is silence.
    pub fn tick(&mut self, delta_ms: f32) -> VisemeTick {
        let mut fault = None;
        let level = match self.tap.as_mut() {
            None => 0.0,
            Some(tap) => match tap.read(&mut self.buffer) {
                Ok(()) => rms_level(&self.buffer, self.cfg.reference_rms),
                Err(err) => {
                    tracing::warn!(error = %err, "audio read failed; treating tick as silence");
                    fault = Some(err);
                    0.0
                }
            },
        };
        VisemeTick {
            frame: self.step(level, delta_ms),
            fault,
        }
    }

    /// Produce a frame from caller-supplied samples.
    pub fn process(&mut self, samples: &[f32], delta_ms: f32) -> VisemeFrame {
        let level = rms_level(samples, self.cfg.reference_rms);
        self.step(level, delta_ms)
    }

    /// Release the audio source and reset signal state.
    pub fn dispose(&mut self) {
        self.detach();
        self.smoothed = 0.0;
        self.next_blink_at = None;
    }

    fn step(&mut self, level: f32, delta_ms: f32) -> VisemeFrame {
        let delta_ms = if delta_ms.is_finite() { delta_ms.max(0.0) } else { 0.0 };
        self.elapsed_ms += f64::from(delta_ms);

        let target = shape_level(level, self.cfg.noise_floor, self.cfg.gamma);
        let window = if target > self.smoothed {
            self.cfg.attack_ms
        } else {
            self.cfg.release_ms
        };
        let alpha = if window <= 0.0 {
            1.0
        } else {
            (delta_ms / window).min(1.0)
        };
        self.smoothed += (target - self.smoothed) * alpha;

        let blink = self.blink_due();
        VisemeFrame {
            t: self.elapsed_ms,
            index: bucket_index(self.smoothed, &self.cfg.thresholds),
            intensity: self.smoothed,
            blink,
        }
    }

    fn blink_interval(&mut self) -> f64 {
        let lo = self.cfg.blink_interval_min_ms.max(0.0);
        let hi = self.cfg.blink_interval_max_ms.max(lo);
        f64::from(self.rng.gen_range(lo..=hi))
    }

    fn blink_due(&mut self) -> bool {
        let now = self.elapsed_ms;
        let next = match self.next_blink_at {
            Some(next) => next,
            None => {
                let next = now + self.blink_interval();
                self.next_blink_at = Some(next);
                next
            }
        };
        if self.smoothed > self.cfg.blink_max_intensity {
            // No blinking mid-utterance.
            let deferred = now + f64::from(self.cfg.blink_suppress_ms);
            self.next_blink_at = Some(next.max(deferred));
            return false;
        }
        if now >= next {
            self.next_blink_at = Some(now + self.blink_interval());
            return true;
        }
        false
    }
}

/// RMS of `samples` divided by `reference`, clamped to `[0, 1]`.
pub fn rms_level(samples: &[f32], reference: f32) -> f32 {
    if samples.is_empty() || reference <= 0.0 {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    let rms = (sum_sq / samples.len() as f32).sqrt();
    let level = rms / reference;
    if level.is_finite() {
        level.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Remove the noise floor, re-normalize to `[0, 1]` and apply gamma.
/// Levels at or below the floor map to exactly 0.
pub fn shape_level(level: f32, noise_floor: f32, gamma: f32) -> f32 {
    if level <= noise_floor {
        return 0.0;
    }
    let span = (1.0 - noise_floor).max(f32::EPSILON);
    ((level - noise_floor) / span).clamp(0.0, 1.0).powf(gamma)
}

/// Number of thresholds strictly exceeded.
pub fn bucket_index(intensity: f32, thresholds: &[f32]) -> u8 {
    thresholds.iter().filter(|t| intensity > **t).count() as u8
}

/// Write a viseme frame onto expression channels: the bucket's channel gets the
/// intensity, the other bucket channels 0, and the blink channel 1 on blink frames.
pub fn apply_viseme(frame: &VisemeFrame, cfg: &VisemeConfig, target: &mut dyn ExpressionTarget) {
    for (i, channel) in cfg.channels.iter().enumerate() {
        let value = if i == frame.index as usize {
            frame.intensity
        } else {
            0.0
        };
        target.set_expression(channel, value);
    }
    target.set_expression(&cfg.blink_channel, if frame.blink { 1.0 } else { 0.0 });
}
