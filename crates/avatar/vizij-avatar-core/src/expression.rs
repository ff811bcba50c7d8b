//! Expression keyframe sampling for discrete clips.

use crate::clip::ExpressionMetadata;
use crate::sampling::sample_expression;

/// Host sink for named expression (blend shape) weights.
pub trait ExpressionTarget {
    fn set_expression(&mut self, channel: &str, weight: f32);
}

/// Samples the expression channels of the active discrete clip once per frame.
///
/// Channels written while a clip was active are reset to 0 once no clip carries
/// them, so a finished gesture never leaves a face stuck mid-expression.
#[derive(Debug, Default)]
pub struct ExpressionKeyframeSampler {
    touched: Vec<String>,
}

impl ExpressionKeyframeSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write every channel in `active` at its clip time; `None` clears the
    /// channels touched previously.
    pub fn apply(
        &mut self,
        active: Option<(&ExpressionMetadata, f32)>,
        target: &mut dyn ExpressionTarget,
    ) {
        let mut written: Vec<String> = Vec::new();
        if let Some((meta, time)) = active {
            for track in &meta.tracks {
                if let Some(value) = sample_expression(&track.keys, time) {
                    target.set_expression(&track.channel, value);
                    written.push(track.channel.clone());
                }
            }
        }
        for stale in self.touched.iter().filter(|c| !written.contains(c)) {
            target.set_expression(stale, 0.0);
        }
        self.touched = written;
    }

    /// Channels written on the last `apply`.
    pub fn touched(&self) -> &[String] {
        &self.touched
    }

    pub fn reset(&mut self, target: &mut dyn ExpressionTarget) {
        self.apply(None, target);
    }
}
