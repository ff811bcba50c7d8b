//! Accumulation of per-joint rotation contributions.
//!
//! Quaternions are summed component-wise after aligning each contribution to the
//! hemisphere of the first one, then normalized at finalize (weighted NLERP).

use hashbrown::HashMap;

use crate::interp::{dot4, normalize4};
use crate::skeleton::JointHandle;

#[derive(Clone, Copy, Debug)]
struct QuatSum {
    sum: [f32; 4],
    w: f32,
    /// Hemisphere reference (first contribution).
    reference: [f32; 4],
}

#[derive(Default, Debug)]
pub struct RotationAccumulator {
    entries: HashMap<JointHandle, QuatSum>,
}

impl RotationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Add a weighted rotation for `joint`. Zero/negative weights are ignored.
    pub fn add(&mut self, joint: JointHandle, q: [f32; 4], w: f32) {
        if w <= 0.0 {
            return;
        }
        let entry = self.entries.entry(joint).or_insert(QuatSum {
            sum: [0.0; 4],
            w: 0.0,
            reference: q,
        });
        let sign = if dot4(entry.reference, q) < 0.0 { -1.0 } else { 1.0 };
        for i in 0..4 {
            entry.sum[i] += q[i] * w * sign;
        }
        entry.w += w;
    }

    /// Total weight accumulated for `joint` (0 if untouched).
    pub fn weight(&self, joint: JointHandle) -> f32 {
        self.entries.get(&joint).map(|e| e.w).unwrap_or(0.0)
    }

    /// Blend the accumulated rotation over `rest`, filling weight below 1.0
    /// with the rest rotation. Returns `None` when nothing touched the joint.
    pub fn resolve(&self, joint: JointHandle, rest: [f32; 4]) -> Option<[f32; 4]> {
        let entry = self.entries.get(&joint)?;
        let mut sum = entry.sum;
        if entry.w < 1.0 {
            let fill = 1.0 - entry.w;
            let sign = if dot4(entry.reference, rest) < 0.0 { -1.0 } else { 1.0 };
            for i in 0..4 {
                sum[i] += rest[i] * fill * sign;
            }
        }
        Some(normalize4(sum))
    }

    pub fn joints(&self) -> impl Iterator<Item = JointHandle> + '_ {
        self.entries.keys().copied()
    }
}
