//! IKPoseSolver: FABRIK position solve plus rotation derivation.
//!
//! A [`JointChain`] captures, root → end effector:
//! - world positions,
//! - local rotations,
//! - each bone's child offset in the bone's own frame (its rest direction),
//! - the world rotation of the root's parent.
//!
//! [`solve`] moves positions with forward/backward passes, turns the solved
//! positions into local rotations (shortest arc, parent space), then re-derives
//! positions by forward kinematics so the written pose is rigid.

use std::f32::consts::PI;

use nalgebra::{Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::config::IkConfig;
use crate::error::AvatarError;
use crate::interp::{from_unit_quat, from_vec3, to_unit_quat, to_vec3};
use crate::skeleton::{JointHandle, Skeleton};

const EPS: f32 = 1e-6;

/// Diagnostics for one solve. A nonzero error is not a failure.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IkSolution {
    /// Final end-effector distance to the target (metres).
    pub error: f32,
    /// Position passes run across all outer passes.
    pub iterations: u32,
    pub reachable: bool,
}

#[derive(Clone, Debug)]
pub struct JointChain {
    handles: Vec<JointHandle>,
    root: Vector3<f32>,
    positions: Vec<Vector3<f32>>,
    local: Vec<UnitQuaternion<f32>>,
    /// Offset of joint i+1 in joint i's frame.
    offsets: Vec<Vector3<f32>>,
    lengths: Vec<f32>,
    parent_rotation: UnitQuaternion<f32>,
}

impl JointChain {
    /// Chain with identity rotations through the given world positions.
    pub fn from_positions(points: &[[f32; 3]]) -> Self {
        let positions: Vec<Vector3<f32>> = points.iter().map(|p| to_vec3(*p)).collect();
        let offsets: Vec<Vector3<f32>> = positions.windows(2).map(|w| w[1] - w[0]).collect();
        Self {
            handles: Vec::new(),
            root: positions.first().copied().unwrap_or_else(Vector3::zeros),
            local: vec![UnitQuaternion::identity(); positions.len()],
            lengths: offsets.iter().map(|o| o.norm()).collect(),
            offsets,
            positions,
            parent_rotation: UnitQuaternion::identity(),
        }
    }

    /// Capture a chain from named skeleton joints, root first.
    /// Any missing joint fails the whole limb.
    pub fn from_skeleton(
        skeleton: &dyn Skeleton,
        limb: &str,
        names: &[&str],
    ) -> Result<Self, AvatarError> {
        let handles = names
            .iter()
            .map(|name| {
                skeleton.joint(name).ok_or_else(|| AvatarError::MissingJoint {
                    limb: limb.to_string(),
                    joint: name.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let positions: Vec<Vector3<f32>> = handles
            .iter()
            .map(|h| to_vec3(skeleton.world_position(*h)))
            .collect();
        let world: Vec<UnitQuaternion<f32>> = handles
            .iter()
            .map(|h| to_unit_quat(skeleton.world_rotation(*h)))
            .collect();
        let local: Vec<UnitQuaternion<f32>> = handles
            .iter()
            .map(|h| to_unit_quat(skeleton.local_rotation(*h)))
            .collect();

        let parent_rotation = match (world.first(), local.first()) {
            (Some(w), Some(l)) => w * l.inverse(),
            _ => UnitQuaternion::identity(),
        };
        let offsets: Vec<Vector3<f32>> = (0..positions.len().saturating_sub(1))
            .map(|i| world[i].inverse() * (positions[i + 1] - positions[i]))
            .collect();

        Ok(Self {
            handles,
            root: positions.first().copied().unwrap_or_else(Vector3::zeros),
            lengths: offsets.iter().map(|o| o.norm()).collect(),
            offsets,
            positions,
            local,
            parent_rotation,
        })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn segment_lengths(&self) -> &[f32] {
        &self.lengths
    }

    pub fn total_length(&self) -> f32 {
        self.lengths.iter().sum()
    }

    pub fn root(&self) -> [f32; 3] {
        from_vec3(&self.root)
    }

    pub fn positions(&self) -> Vec<[f32; 3]> {
        self.positions.iter().map(from_vec3).collect()
    }

    pub fn end_effector(&self) -> Option<[f32; 3]> {
        self.positions.last().map(from_vec3)
    }

    pub fn local_rotations(&self) -> Vec<[f32; 4]> {
        self.local.iter().map(from_unit_quat).collect()
    }

    /// Write solved local rotations to the joints this chain was captured from.
    pub fn write_to(&self, skeleton: &mut dyn Skeleton) {
        for (handle, rotation) in self.handles.iter().zip(&self.local) {
            skeleton.set_local_rotation(*handle, from_unit_quat(rotation));
        }
    }

    fn error_to(&self, target: &Vector3<f32>) -> f32 {
        self.positions
            .last()
            .map_or(f32::INFINITY, |end| (end - target).norm())
    }

    /// Straight line from the root toward `target` at cumulative arc lengths.
    fn extend_toward(&mut self, target: &Vector3<f32>) {
        let dir = direction(&(target - self.root), &Vector3::y());
        let mut reach = 0.0;
        self.positions[0] = self.root;
        for i in 0..self.lengths.len() {
            reach += self.lengths[i];
            self.positions[i + 1] = self.root + dir * reach;
        }
    }

    fn fabrik_pass(&mut self, target: &Vector3<f32>) {
        let n = self.positions.len();
        // Forward: pin the end effector, walk toward the root.
        self.positions[n - 1] = *target;
        for i in (0..n - 1).rev() {
            self.positions[i] = place(&self.positions[i + 1], &self.positions[i], self.lengths[i]);
        }
        // Backward: pin the root, walk toward the end effector.
        self.positions[0] = self.root;
        for i in 0..n - 1 {
            self.positions[i + 1] =
                place(&self.positions[i], &self.positions[i + 1], self.lengths[i]);
        }
    }

    /// Rotate each bone so its rest direction points at its solved child.
    fn derive_rotations(&mut self) {
        let mut parent = self.parent_rotation;
        for i in 0..self.offsets.len() {
            let current = self.local[i] * self.offsets[i];
            let desired = parent.inverse() * (self.positions[i + 1] - self.positions[i]);
            self.local[i] = shortest_arc(&current, &desired) * self.local[i];
            parent *= self.local[i];
        }
    }

    fn forward_kinematics(&mut self) {
        let mut rotation = self.parent_rotation;
        self.positions[0] = self.root;
        for i in 0..self.offsets.len() {
            rotation *= self.local[i];
            self.positions[i + 1] = self.positions[i] + rotation * self.offsets[i];
        }
    }
}

/// Solve `chain` toward the world-space `target`. Never fails; unreachable
/// targets produce the fully extended pose pointing at the target.
pub fn solve(chain: &mut JointChain, target: [f32; 3], cfg: &IkConfig) -> IkSolution {
    let target = to_vec3(target);
    if chain.len() < 2 {
        return IkSolution {
            error: chain.error_to(&target),
            iterations: 0,
            reachable: false,
        };
    }

    let reachable = (target - chain.root).norm() <= chain.total_length();
    let mut iterations = 0;
    if !reachable {
        chain.extend_toward(&target);
        chain.derive_rotations();
        chain.forward_kinematics();
        return IkSolution {
            error: chain.error_to(&target),
            iterations,
            reachable,
        };
    }

    for _ in 0..cfg.outer_passes {
        if chain.error_to(&target) < cfg.tolerance {
            break;
        }
        for _ in 0..cfg.max_iterations {
            iterations += 1;
            chain.fabrik_pass(&target);
            if chain.error_to(&target) < cfg.tolerance {
                break;
            }
        }
        chain.derive_rotations();
        chain.forward_kinematics();
    }

    IkSolution {
        error: chain.error_to(&target),
        iterations,
        reachable,
    }
}

fn direction(v: &Vector3<f32>, fallback: &Vector3<f32>) -> Vector3<f32> {
    let norm = v.norm();
    if norm > EPS {
        v / norm
    } else {
        *fallback
    }
}

/// Point at `length` from `anchor` in the direction of `toward`.
fn place(anchor: &Vector3<f32>, toward: &Vector3<f32>, length: f32) -> Vector3<f32> {
    anchor + direction(&(toward - anchor), &Vector3::y()) * length
}

/// Shortest rotation taking direction `from` onto direction `to`.
fn shortest_arc(from: &Vector3<f32>, to: &Vector3<f32>) -> UnitQuaternion<f32> {
    if from.norm() < EPS || to.norm() < EPS {
        return UnitQuaternion::identity();
    }
    if let Some(q) = UnitQuaternion::rotation_between(from, to) {
        return q;
    }
    // Antiparallel: half turn about any axis perpendicular to `from`.
    let mut axis = from.cross(&Vector3::x());
    if axis.norm() < EPS {
        axis = from.cross(&Vector3::z());
    }
    UnitQuaternion::from_axis_angle(&Unit::new_normalize(axis), PI)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arm() -> JointChain {
        // Horizontal arm along -X: upper 0.3 m, lower 0.25 m.
        JointChain::from_positions(&[[0.0, 1.4, 0.0], [-0.3, 1.4, 0.0], [-0.55, 1.4, 0.0]])
    }

    fn dist(a: [f32; 3], b: [f32; 3]) -> f32 {
        (to_vec3(a) - to_vec3(b)).norm()
    }

    #[test]
    fn reachable_target_converges() {
        let mut chain = arm();
        let target = [-0.2, 1.05, 0.15];
        let sol = solve(&mut chain, target, &IkConfig::default());
        assert!(sol.reachable);
        assert!(sol.error < 0.01, "error {}", sol.error);
        let end = chain.end_effector().unwrap();
        assert!(dist(end, target) < 0.01);
    }

    #[test]
    fn solved_pose_keeps_segment_lengths() {
        let mut chain = arm();
        solve(&mut chain, [-0.1, 1.1, 0.2], &IkConfig::default());
        let p = chain.positions();
        assert!((dist(p[0], p[1]) - 0.3).abs() < 1e-4);
        assert!((dist(p[1], p[2]) - 0.25).abs() < 1e-4);
    }

    #[test]
    fn unreachable_target_extends_without_stretching() {
        let mut chain = arm();
        let sol = solve(&mut chain, [0.0, 0.0, 0.0], &IkConfig::default());
        assert!(!sol.reachable);
        let p = chain.positions();
        assert!((dist(p[0], p[1]) - 0.3).abs() < 1e-4);
        assert!((dist(p[1], p[2]) - 0.25).abs() < 1e-4);
        // Straight down toward the target.
        assert!((p[2][1] - (1.4 - 0.55)).abs() < 1e-4);
        assert!((sol.error - 0.85).abs() < 1e-3);
    }

    #[test]
    fn antiparallel_arc_is_half_turn() {
        let q = shortest_arc(&Vector3::x(), &(-Vector3::x()));
        let v = q * Vector3::x();
        assert!((v + Vector3::x()).norm() < 1e-5);
    }

    #[test]
    fn degenerate_chain_reports_without_solving() {
        let mut chain = JointChain::from_positions(&[[0.0, 0.0, 0.0]]);
        let sol = solve(&mut chain, [1.0, 0.0, 0.0], &IkConfig::default());
        assert_eq!(sol.iterations, 0);
        assert!((sol.error - 1.0).abs() < 1e-6);
    }
}
