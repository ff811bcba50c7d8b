//! Skeleton access and joint binding.
//!
//! The core never owns a scene graph. Hosts implement [`Skeleton`] over whatever
//! engine they use: one name → handle lookup plus handle-based transform access.
//! [`JointBindings`] caches lookups so per-frame writes never re-resolve names.

use hashbrown::HashMap;

/// Opaque joint handle issued by the host skeleton.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct JointHandle(pub u32);

/// Host skeleton adapter.
///
/// Positions are world-space metres, rotations `[x, y, z, w]` quaternions.
/// `world_*` values must reflect any `set_local_rotation` made earlier.
pub trait Skeleton {
    fn joint(&self, name: &str) -> Option<JointHandle>;
    fn world_position(&self, joint: JointHandle) -> [f32; 3];
    fn world_rotation(&self, joint: JointHandle) -> [f32; 4];
    fn local_rotation(&self, joint: JointHandle) -> [f32; 4];
    fn set_local_rotation(&mut self, joint: JointHandle, rotation: [f32; 4]);
}

/// Humanoid bone names (VRM naming).
pub mod bones {
    pub const HIPS: &str = "hips";
    pub const SPINE: &str = "spine";
    pub const CHEST: &str = "chest";
    pub const NECK: &str = "neck";
    pub const HEAD: &str = "head";
    pub const LEFT_SHOULDER: &str = "leftShoulder";
    pub const LEFT_UPPER_ARM: &str = "leftUpperArm";
    pub const LEFT_LOWER_ARM: &str = "leftLowerArm";
    pub const LEFT_HAND: &str = "leftHand";
    pub const RIGHT_SHOULDER: &str = "rightShoulder";
    pub const RIGHT_UPPER_ARM: &str = "rightUpperArm";
    pub const RIGHT_LOWER_ARM: &str = "rightLowerArm";
    pub const RIGHT_HAND: &str = "rightHand";

    pub const LEFT_ARM: [&str; 3] = [LEFT_UPPER_ARM, LEFT_LOWER_ARM, LEFT_HAND];
    pub const RIGHT_ARM: [&str; 3] = [RIGHT_UPPER_ARM, RIGHT_LOWER_ARM, RIGHT_HAND];
}

/// Name → handle cache. Misses are cached too; call [`JointBindings::clear`]
/// when the host swaps skeletons.
#[derive(Default, Debug)]
pub struct JointBindings {
    rows: HashMap<String, Option<JointHandle>>,
}

impl JointBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a joint name once; later calls hit the cache.
    pub fn resolve(&mut self, skeleton: &dyn Skeleton, name: &str) -> Option<JointHandle> {
        if let Some(row) = self.rows.get(name) {
            return *row;
        }
        let handle = skeleton.joint(name);
        if handle.is_none() {
            tracing::debug!(joint = name, "joint not present on skeleton; track ignored");
        }
        self.rows.insert(name.to_string(), handle);
        handle
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
