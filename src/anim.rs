//! Skeletons, animation data and per-instance pose evaluation
pub mod pose;
pub mod types;
pub mod util;

// Re-exports
pub use {
    pose::{Joint, Pose},
    types::{
        Animation, AnimationInstance, AnimationState, Bone, Channel, Keyframe,
        QuatKey, Skeleton, VectorKey,
    },
    util::bracket,
};
