use crate::{
    math,
    media::Mesh,
    physics::{BodyHandle, JointHandle},
};
use nalgebra_glm as glm;
use std::sync::Arc;

/// Static scenery. The collision box is centred on the mesh bounds, so the
/// body sits at `centre * pose` rather than at the object's own origin.
#[derive(Clone)]
pub struct Object {
    pub mesh: Arc<Mesh>,
    pub body: BodyHandle,
    pub centre: glm::Mat4,
}

impl Object {
    /// Object pose from its body pose
    #[must_use]
    pub fn pose_from_body(&self, body_pose: &glm::Mat4) -> glm::Mat4 {
        math::inverse(&self.centre) * body_pose
    }

    /// Body pose that puts the object at `pose`
    #[must_use]
    pub fn body_from_pose(&self, pose: &glm::Mat4) -> glm::Mat4 {
        self.centre * pose
    }
}

/// A posed point voices can follow
#[derive(Clone, Copy, Debug)]
pub struct Emitter {
    pub body: BodyHandle,
}

/// A free 6-DOF constraint joining two bodies owned by other entities
#[derive(Clone, Copy, Debug)]
pub struct Constraint {
    pub joint: JointHandle,
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
}
