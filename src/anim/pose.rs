use super::{
    types::{Animation, Skeleton},
    util,
};
use crate::math;
use log::trace;
use nalgebra_glm as glm;

/// Per-instance runtime mirror of a `Bone`
#[derive(Clone, Debug)]
pub struct Joint {
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Copy of the bone's bind pose
    pub offset: glm::Mat4,
    /// Animation driven transform relative to the parent
    pub local_transform: glm::Mat4,
    /// Derived from the local transforms up the chain
    pub global_transform: glm::Mat4,
}

/// Live skeletal state of one actor. `matrices` are skin ready, one per joint,
/// in the same order as the skeleton's bones.
#[derive(Clone, Debug, Default)]
pub struct Pose {
    pub matrices: Vec<glm::Mat4>,
    pub joints: Vec<Joint>,
    pub root_joint: usize,
}

impl Pose {
    /// Creates joints in the skeleton's rest pose
    #[must_use]
    pub fn new(skeleton: &Skeleton) -> Self {
        let joints = skeleton
            .bones
            .iter()
            .map(|bone| Joint {
                parent: bone.parent,
                children: bone.children.clone(),
                offset: bone.matrix,
                local_transform: bone.local_transform,
                global_transform: glm::Mat4::identity(),
            })
            .collect::<Vec<_>>();
        let mut pose = Self {
            matrices: vec![glm::Mat4::identity(); joints.len()],
            joints,
            root_joint: skeleton.root_bone,
        };
        if !pose.joints.is_empty() {
            pose.update_transforms(pose.root_joint);
            pose.update_matrices();
        }
        pose
    }

    /// Samples every channel of `animation` at `time` into the joints' local
    /// transforms, then refreshes global transforms and skin matrices.
    ///
    /// `time` is used as given. Looping and clamping are the caller's job.
    ///
    /// # Panics
    /// Will panic if a channel targets a joint index outside this pose
    pub fn animate(&mut self, animation: &Animation, time: f32) {
        for channel in &animation.channels {
            assert!(
                channel.index < self.joints.len(),
                "channel targets joint {} but the pose has {}",
                channel.index,
                self.joints.len()
            );
            let position =
                util::sample_vector(&channel.positions, time, glm::Vec3::zeros());
            let rotation = util::sample_rotation(&channel.rotations, time);
            let scale = util::sample_vector(
                &channel.scales,
                time,
                glm::vec3(1.0, 1.0, 1.0),
            );
            self.joints[channel.index].local_transform =
                util::compose(&position, &rotation, &scale);
        }
        trace!(
            "animate {} at {} over {} channels",
            animation.name,
            time,
            animation.channels.len()
        );

        if !self.joints.is_empty() {
            self.update_transforms(self.root_joint);
        }
        self.update_matrices();
    }

    /// Recomputes `global_transform` for `joint` and all its descendants from
    /// scratch. Each global is the joint's local transform followed by every
    /// ancestor's local transform, ending with the root.
    pub fn update_transforms(&mut self, joint: usize) {
        let parent_global = self.joints[joint]
            .parent
            .map_or_else(glm::Mat4::identity, |p| {
                self.joints[p].global_transform
            });
        // Explicit stack avoids deep recursion on long chains
        let mut stack = vec![(joint, parent_global)];
        while let Some((index, parent_global)) = stack.pop() {
            let global = self.joints[index].local_transform * parent_global;
            self.joints[index].global_transform = global;
            for child in &self.joints[index].children {
                stack.push((*child, global));
            }
        }
    }

    /// Skinning matrices: inverse bind pose followed by the current global
    fn update_matrices(&mut self) {
        for (matrix, joint) in self.matrices.iter_mut().zip(&self.joints) {
            *matrix = math::inverse(&joint.offset) * joint.global_transform;
        }
    }

    /// Resets every skin matrix to identity (mesh shows its bind pose)
    pub fn reset(&mut self) {
        for m in &mut self.matrices {
            *m = glm::Mat4::identity();
        }
    }
}
