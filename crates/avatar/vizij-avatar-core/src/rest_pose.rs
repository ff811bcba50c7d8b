//! Arm rest-pose normalization.
//!
//! Avatars often ship in a T-pose. Before any clip plays, each arm is solved so
//! the hand hangs beside the body: the target is the upper arm position plus
//! the configured direction scaled to `reach` of the arm's length.

use serde::{Deserialize, Serialize};

use crate::config::{IkConfig, RestPoseConfig};
use crate::error::AvatarError;
use crate::ik::{solve, IkSolution, JointChain};
use crate::interp::{from_vec3, to_vec3};
use crate::skeleton::{bones, Skeleton};

/// Per-limb outcome of a rest-pose pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LimbOutcome {
    Solved { limb: String, solution: IkSolution },
    Skipped { limb: String, reason: String },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RestPoseReport {
    pub limbs: Vec<LimbOutcome>,
}

impl RestPoseReport {
    pub fn solved(&self) -> usize {
        self.limbs
            .iter()
            .filter(|l| matches!(l, LimbOutcome::Solved { .. }))
            .count()
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&str, &str)> {
        self.limbs.iter().filter_map(|l| match l {
            LimbOutcome::Skipped { limb, reason } => Some((limb.as_str(), reason.as_str())),
            LimbOutcome::Solved { .. } => None,
        })
    }
}

pub const LEFT_ARM: &str = "leftArm";
pub const RIGHT_ARM: &str = "rightArm";

/// Lower both arms into the configured rest pose. Only the chain joints are written.
pub fn normalize_arm_rest_pose(
    skeleton: &mut dyn Skeleton,
    rest: &RestPoseConfig,
    ik: &IkConfig,
) -> RestPoseReport {
    let limbs = [
        (LEFT_ARM, bones::LEFT_ARM, rest.left_hand_direction),
        (RIGHT_ARM, bones::RIGHT_ARM, rest.right_hand_direction),
    ];
    let mut report = RestPoseReport::default();
    for (limb, names, dir) in limbs {
        let outcome = match solve_limb(skeleton, limb, &names, dir, rest.reach, ik) {
            Ok(solution) => {
                tracing::debug!(limb, error = solution.error, "rest pose solved");
                LimbOutcome::Solved {
                    limb: limb.to_string(),
                    solution,
                }
            }
            Err(err) => {
                tracing::warn!(limb, error = %err, "skipping rest pose for limb");
                LimbOutcome::Skipped {
                    limb: limb.to_string(),
                    reason: err.to_string(),
                }
            }
        };
        report.limbs.push(outcome);
    }
    report
}

fn solve_limb(
    skeleton: &mut dyn Skeleton,
    limb: &str,
    names: &[&str],
    direction: [f32; 3],
    reach: f32,
    ik: &IkConfig,
) -> Result<IkSolution, AvatarError> {
    let mut chain = JointChain::from_skeleton(&*skeleton, limb, names)?;
    let dir = to_vec3(direction);
    let dir = if dir.norm() > 1e-6 {
        dir.normalize()
    } else {
        -nalgebra::Vector3::y()
    };
    let target = to_vec3(chain.root()) + dir * chain.total_length() * reach;
    let solution = solve(&mut chain, from_vec3(&target), ik);
    chain.write_to(skeleton);
    Ok(solution)
}
