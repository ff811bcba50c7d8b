//! Vizij Avatar Core (engine-agnostic)
//!
//! Frame-driven avatar runtime: audio → viseme signal, idle clip blending under
//! priority suspension, a FIFO gesture/pose queue, FABRIK arm rest pose and
//! expression keyframe overlay. Hosts plug in their engine through the
//! [`Skeleton`], [`ExpressionTarget`], [`AudioSource`] and [`ClipRegistry`] traits
//! and drive everything from [`Avatar::update`] once per rendered frame.

pub mod accumulate;
pub mod audio;
pub mod clip;
pub mod config;
pub mod error;
pub mod expression;
pub mod ik;
pub mod interp;
pub mod mixer;
pub mod outputs;
pub mod queue;
pub mod registry;
pub mod rest_pose;
pub mod runtime;
pub mod sampling;
pub mod scheduler;
pub mod skeleton;
pub mod suspension;
pub mod viseme;

// Re-exports for consumers (adapters)
pub use audio::{AudioSource, AudioTap};
pub use clip::{ClipData, ExpressionKey, ExpressionMetadata, ExpressionTrack, JointTrack, RotationKey};
pub use config::{AvatarConfig, BlendConfig, IkConfig, QueueConfig, RestPoseConfig, VisemeConfig};
pub use error::AvatarError;
pub use expression::{ExpressionKeyframeSampler, ExpressionTarget};
pub use ik::{solve as solve_ik, IkSolution, JointChain};
pub use mixer::{ActionId, LoopMode, Mixer, MixerEvent};
pub use outputs::{AvatarEvent, AvatarFrame, Status};
pub use queue::{
    ActiveAnimation, GestureAnimationQueue, GestureCompletion, GestureIntent, GestureOutcome,
    QueueState, QueuedAnimationRequest,
};
pub use registry::{ClipLibrary, ClipRegistry, ClipStatus};
pub use rest_pose::{normalize_arm_rest_pose, LimbOutcome, RestPoseReport};
pub use runtime::{Avatar, AvatarCue};
pub use scheduler::{AnimationBlendScheduler, ClipHandle, ClipMode, ContinuousClip};
pub use skeleton::{bones, JointBindings, JointHandle, Skeleton};
pub use suspension::{SuspensionSet, SuspensionToken, TokenId};
pub use viseme::{VisemeFrame, VisemeSignalExtractor, VisemeTick};
