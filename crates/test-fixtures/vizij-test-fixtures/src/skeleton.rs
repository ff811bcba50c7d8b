use std::collections::HashSet;

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use vizij_avatar_core::{bones, JointHandle, Skeleton};

#[derive(Debug, Clone)]
struct Joint {
    name: String,
    parent: Option<usize>,
    /// Position in the parent's frame.
    offset: Vector3<f32>,
    local: UnitQuaternion<f32>,
}

/// Small in-memory humanoid. Y up, facing +Z, the character's left on +X.
#[derive(Debug, Clone)]
pub struct MemorySkeleton {
    joints: Vec<Joint>,
    hidden: HashSet<String>,
}

impl MemorySkeleton {
    /// T-pose humanoid with VRM bone names; upper arm 0.28 m, lower arm 0.25 m.
    pub fn humanoid() -> Self {
        let mut skel = Self {
            joints: Vec::new(),
            hidden: HashSet::new(),
        };
        let hips = skel.push(bones::HIPS, None, [0.0, 1.0, 0.0]);
        let spine = skel.push(bones::SPINE, Some(hips), [0.0, 0.1, 0.0]);
        let chest = skel.push(bones::CHEST, Some(spine), [0.0, 0.15, 0.0]);
        let neck = skel.push(bones::NECK, Some(chest), [0.0, 0.2, 0.0]);
        skel.push(bones::HEAD, Some(neck), [0.0, 0.1, 0.0]);
        for side in [1.0_f32, -1.0] {
            let (shoulder, upper, lower, hand) = if side > 0.0 {
                (
                    bones::LEFT_SHOULDER,
                    bones::LEFT_UPPER_ARM,
                    bones::LEFT_LOWER_ARM,
                    bones::LEFT_HAND,
                )
            } else {
                (
                    bones::RIGHT_SHOULDER,
                    bones::RIGHT_UPPER_ARM,
                    bones::RIGHT_LOWER_ARM,
                    bones::RIGHT_HAND,
                )
            };
            let s = skel.push(shoulder, Some(chest), [0.05 * side, 0.15, 0.0]);
            let u = skel.push(upper, Some(s), [0.1 * side, 0.0, 0.0]);
            let l = skel.push(lower, Some(u), [0.28 * side, 0.0, 0.0]);
            skel.push(hand, Some(l), [0.25 * side, 0.0, 0.0]);
        }
        skel
    }

    /// Same skeleton with `name` hidden from lookups.
    pub fn without(mut self, name: &str) -> Self {
        self.hidden.insert(name.to_string());
        self
    }

    pub fn local_rotation_of(&self, name: &str) -> Option<[f32; 4]> {
        self.joint(name).map(|h| self.local_rotation(h))
    }

    pub fn world_position_of(&self, name: &str) -> Option<[f32; 3]> {
        self.joint(name).map(|h| self.world_position(h))
    }

    /// Copy of every joint's local rotation, in declaration order.
    pub fn pose(&self) -> Vec<(String, [f32; 4])> {
        self.joints
            .iter()
            .map(|j| (j.name.clone(), quat_to_array(&j.local)))
            .collect()
    }

    fn push(&mut self, name: &str, parent: Option<usize>, offset: [f32; 3]) -> usize {
        self.joints.push(Joint {
            name: name.to_string(),
            parent,
            offset: Vector3::new(offset[0], offset[1], offset[2]),
            local: UnitQuaternion::identity(),
        });
        self.joints.len() - 1
    }

    fn world(&self, index: usize) -> (Vector3<f32>, UnitQuaternion<f32>) {
        let joint = &self.joints[index];
        match joint.parent {
            None => (joint.offset, joint.local),
            Some(parent) => {
                let (p, r) = self.world(parent);
                (p + r * joint.offset, r * joint.local)
            }
        }
    }
}

fn quat_to_array(q: &UnitQuaternion<f32>) -> [f32; 4] {
    [q.i, q.j, q.k, q.w]
}

impl Skeleton for MemorySkeleton {
    fn joint(&self, name: &str) -> Option<JointHandle> {
        if self.hidden.contains(name) {
            return None;
        }
        self.joints
            .iter()
            .position(|j| j.name == name)
            .map(|i| JointHandle(i as u32))
    }

    fn world_position(&self, joint: JointHandle) -> [f32; 3] {
        let (p, _) = self.world(joint.0 as usize);
        [p.x, p.y, p.z]
    }

    fn world_rotation(&self, joint: JointHandle) -> [f32; 4] {
        let (_, r) = self.world(joint.0 as usize);
        quat_to_array(&r)
    }

    fn local_rotation(&self, joint: JointHandle) -> [f32; 4] {
        quat_to_array(&self.joints[joint.0 as usize].local)
    }

    fn set_local_rotation(&mut self, joint: JointHandle, rotation: [f32; 4]) {
        if let Some(j) = self.joints.get_mut(joint.0 as usize) {
            j.local = UnitQuaternion::new_normalize(Quaternion::new(
                rotation[3],
                rotation[0],
                rotation[1],
                rotation[2],
            ));
        }
    }
}
