//! Rigid body simulation seam.
//!
//! The scene only talks to physics through [`PhysicsWorld`]. Poses cross the
//! seam as row-vector matrices; scale is never part of a body pose.
mod headless;
#[cfg(feature = "rapier")]
mod rapier_world;

pub use headless::{HeadlessWorld, StepRecord};
#[cfg(feature = "rapier")]
pub use rapier_world::RapierWorld;

use nalgebra_glm as glm;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JointHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CharacterHandle(pub u32);

#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    Box { half_extents: glm::Vec3 },
    Sphere { radius: f32 },
    /// Upright capsule, `height` includes both caps
    Capsule { radius: f32, height: f32 },
    ConvexHull(Vec<glm::Vec3>),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BodyKind {
    Static,
    Dynamic { mass: f32 },
    /// Moved only by pose writes
    Kinematic,
}

#[derive(Clone, Debug)]
pub struct BodyDesc {
    pub shape: Shape,
    pub kind: BodyKind,
    pub pose: glm::Mat4,
}

/// Angular limits of a bone joint, radians
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JointLimits {
    /// Every axis free
    Free,
    Cone { swing: f32, twist: f32 },
}

/// A 6-DOF constraint. The frames are in each body's local space and are
/// held together by the solver.
#[derive(Clone, Debug)]
pub struct JointDesc {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub frame_a: glm::Mat4,
    pub frame_b: glm::Mat4,
    pub limits: JointLimits,
}

#[derive(Clone, Debug)]
pub struct CharacterDesc {
    pub position: glm::Vec3,
    pub radius: f32,
    pub height: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub body: Option<BodyHandle>,
    pub point: glm::Vec3,
    pub normal: glm::Vec3,
    /// Fraction of the way from the ray start to its end
    pub fraction: f32,
}

pub trait PhysicsWorld {
    fn add_body(&mut self, desc: &BodyDesc) -> BodyHandle;
    fn remove_body(&mut self, body: BodyHandle);
    /// World pose, identity for an unknown handle
    fn body_pose(&self, body: BodyHandle) -> glm::Mat4;
    fn set_body_pose(&mut self, body: BodyHandle, pose: &glm::Mat4);

    fn add_joint(&mut self, desc: &JointDesc) -> JointHandle;
    fn remove_joint(&mut self, joint: JointHandle);

    fn add_character(&mut self, desc: &CharacterDesc) -> CharacterHandle;
    fn remove_character(&mut self, character: CharacterHandle);
    /// Displacement applied on every fixed substep
    fn set_walk_direction(&mut self, character: CharacterHandle, walk: &glm::Vec3);
    /// Vertical scale of the capsule, 1.0 is full height
    fn set_character_scale(&mut self, character: CharacterHandle, scale_y: f32);
    fn character_pose(&self, character: CharacterHandle) -> glm::Mat4;
    fn set_character_pose(&mut self, character: CharacterHandle, pose: &glm::Mat4);
    fn on_ground(&self, character: CharacterHandle) -> bool;
    fn jump(&mut self, character: CharacterHandle, speed: f32);

    /// Closest hit along the segment
    fn ray_test(&self, from: &glm::Vec3, to: &glm::Vec3) -> Option<RayHit>;

    /// Advances the simulation by `time_step` seconds using at most
    /// `max_sub_steps` fixed substeps and returns how many ran. A budget of
    /// zero runs a single step of exactly `time_step`.
    fn step(&mut self, time_step: f32, max_sub_steps: u32) -> u32;

    fn body_count(&self) -> usize;
    fn joint_count(&self) -> usize;
    fn character_count(&self) -> usize;
}

/// Fixed timestep accumulator. Leftover time under one step carries to the
/// next call; substeps over the budget are dropped.
#[derive(Clone, Copy, Debug)]
pub struct SubstepClock {
    pub fixed_time_step: f32,
    local_time: f32,
}

impl SubstepClock {
    #[must_use]
    pub const fn new(fixed_time_step: f32) -> Self {
        Self {
            fixed_time_step,
            local_time: 0.0,
        }
    }

    /// Returns the number of fixed steps to run and their length
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn advance(&mut self, time_step: f32, max_sub_steps: u32) -> (u32, f32) {
        if max_sub_steps == 0 {
            self.local_time = 0.0;
            return if time_step > 0.0 { (1, time_step) } else { (0, 0.0) };
        }
        self.local_time += time_step;
        let mut steps = 0;
        if self.local_time >= self.fixed_time_step {
            steps = (self.local_time / self.fixed_time_step) as u32;
            self.local_time -= steps as f32 * self.fixed_time_step;
        }
        (steps.min(max_sub_steps), self.fixed_time_step)
    }

    /// Time waiting for the next fixed step
    #[must_use]
    pub const fn remainder(&self) -> f32 {
        self.local_time
    }
}

#[cfg(test)]
mod tests {
    use super::SubstepClock;

    #[test]
    fn accumulates_partial_steps() {
        let mut clock = SubstepClock::new(0.01);
        assert_eq!(clock.advance(0.005, 10).0, 0);
        assert_eq!(clock.advance(0.006, 10).0, 1);
        assert!((clock.remainder() - 0.001).abs() < 1.0e-5);
    }

    #[test]
    fn budget_caps_steps_and_drops_the_rest() {
        let mut clock = SubstepClock::new(0.01);
        assert_eq!(clock.advance(1.0, 5), (5, 0.01));
        assert!(clock.remainder() < 0.01);
    }

    #[test]
    fn zero_budget_is_one_variable_step() {
        let mut clock = SubstepClock::new(0.01);
        assert_eq!(clock.advance(0.004, 0), (1, 0.004));
        assert_eq!(clock.advance(0.0, 0), (0, 0.0));
    }
}
