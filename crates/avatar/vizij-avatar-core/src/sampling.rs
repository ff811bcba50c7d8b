//! Track sampling for clip rotation and expression keys.
//!
//! Model:
//! - Keys are ordered by time (seconds from clip start).
//! - Rotation segments blend with shortest-arc NLERP.
//! - Expression segments blend linearly.
//! - Times before the first / after the last key clamp to the boundary key.

use crate::clip::{ExpressionKey, JointTrack, RotationKey};
use crate::interp::{lerp_f32, nlerp_quat, IDENTITY_QUAT};

/// Anything with a time stamp on the clip timeline.
pub trait Keyed {
    fn time(&self) -> f32;
}

impl Keyed for RotationKey {
    #[inline]
    fn time(&self) -> f32 {
        self.time
    }
}

impl Keyed for ExpressionKey {
    #[inline]
    fn time(&self) -> f32 {
        self.time
    }
}

/// Find the segment [i, i+1] that contains time t, and return (i, i+1, local_t),
/// where local_t is normalized to [0, 1] between keys[i].time .. keys[i+1].time.
/// Edge cases:
/// - If t <= first.time, returns (0, 0, 0) and caller should pick keys[0].
/// - If t >= last.time, returns (last, last, 0) and caller should pick keys[last].
pub fn find_segment<K: Keyed>(keys: &[K], t: f32) -> (usize, usize, f32) {
    let n = keys.len();
    if n == 0 {
        return (0, 0, 0.0);
    }
    if n == 1 || t <= keys[0].time() {
        return (0, 0, 0.0);
    }
    if t >= keys[n - 1].time() {
        return (n - 1, n - 1, 0.0);
    }
    // First key strictly after t; keys[hi - 1].time() <= t < keys[hi].time().
    let hi = keys.partition_point(|k| k.time() <= t);
    let lo = hi - 1;
    let t0 = keys[lo].time();
    let t1 = keys[hi].time();
    let denom = (t1 - t0).max(f32::EPSILON);
    (lo, hi, ((t - t0) / denom).clamp(0.0, 1.0))
}

/// Sample a joint track at clip time `t` (seconds).
pub fn sample_rotation(track: &JointTrack, t: f32) -> [f32; 4] {
    let keys = &track.keys;
    match keys.len() {
        // No keys: neutral rotation (fail-soft).
        0 => IDENTITY_QUAT,
        1 => keys[0].rotation,
        _ => {
            let (i0, i1, lt) = find_segment(keys, t);
            if i0 == i1 {
                return keys[i0].rotation;
            }
            nlerp_quat(keys[i0].rotation, keys[i1].rotation, lt)
        }
    }
}

/// Linearly interpolated expression value at `t`, clamped at the ends.
/// Returns `None` for a track without keys.
pub fn sample_expression(keys: &[ExpressionKey], t: f32) -> Option<f32> {
    match keys.len() {
        0 => None,
        1 => Some(keys[0].value),
        _ => {
            let (i0, i1, lt) = find_segment(keys, t);
            if i0 == i1 {
                return Some(keys[i0].value);
            }
            Some(lerp_f32(keys[i0].value, keys[i1].value, lt))
        }
    }
}
