use super::Camera;
use crate::{
    anim::{AnimationInstance, Pose},
    arena::Handle,
    config::ActorConfig,
    math,
    media::Mesh,
    physics::{CharacterHandle, PhysicsWorld},
};
use log::trace;
use nalgebra_glm as glm;
use std::sync::Arc;

pub const CROUCH_SCALE: f32 = 0.5;
pub const STAND_SCALE: f32 = 1.0;

/// A character capsule with a camera and an animated skeleton. Only the
/// capsule is simulated. The skeleton is played back on top of wherever
/// the capsule ends up.
pub struct Actor {
    pub mesh: Arc<Mesh>,
    pub character: CharacterHandle,
    pub camera: Handle<Camera>,
    pub pose: Pose,
    /// Evaluated in order each tick. The last one wins.
    pub animations: Vec<AnimationInstance>,
    /// Desired walk per physics step, in the actor's own frame
    pub walk_direction: glm::Vec3,
    /// `x` is pitch and `z` is yaw, radians
    pub look_direction: glm::Vec3,
    pub crouch: bool,
    /// Current vertical scale of the capsule
    pub crouch_scale: f32,
    pub height: f32,
    /// Applied to the skeleton before the actor's world placement
    pub offset: glm::Mat4,
    /// Applied to the camera before the look rotation
    pub camera_offset: glm::Mat4,
    jump_requested: bool,
}

impl Actor {
    /// # Panics
    /// Panics if the mesh has no skeleton
    #[must_use]
    pub fn new(
        mesh: Arc<Mesh>,
        character: CharacterHandle,
        camera: Handle<Camera>,
        height: f32,
    ) -> Self {
        assert!(
            mesh.skeleton.is_some(),
            "actor mesh {} has no skeleton",
            mesh.name
        );
        let pose = mesh
            .skeleton
            .as_ref()
            .map(Pose::new)
            .unwrap_or_default();
        Self {
            mesh,
            character,
            camera,
            pose,
            animations: Vec::new(),
            walk_direction: glm::Vec3::zeros(),
            look_direction: glm::Vec3::zeros(),
            crouch: false,
            crouch_scale: STAND_SCALE,
            height,
            offset: glm::Mat4::identity(),
            camera_offset: glm::Mat4::identity(),
            jump_requested: false,
        }
    }

    #[must_use]
    pub fn yaw(&self) -> f32 {
        self.look_direction.z
    }

    #[must_use]
    pub fn pitch(&self) -> f32 {
        self.look_direction.x
    }

    /// Jumps on the next tick if the capsule is then on the ground
    pub fn jump(&mut self) {
        self.jump_requested = true;
    }

    /// Adds a stopped instance of the named skeleton animation. Returns its
    /// index in `animations`.
    pub fn add_animation(&mut self, name: &str) -> Option<usize> {
        let animation = self
            .mesh
            .skeleton
            .as_ref()?
            .animation_by_name(name)?
            .clone();
        self.animations.push(AnimationInstance::new(animation));
        Some(self.animations.len() - 1)
    }

    /// Walk, crouch and capsule placement for one tick. Returns the
    /// capsule position.
    pub fn locomotion(
        &mut self,
        physics: &mut dyn PhysicsWorld,
        update_time: f32,
        config: &ActorConfig,
    ) -> glm::Vec3 {
        let yaw = math::rotation_y(self.yaw());
        let crouch = if self.crouch { 1.0 } else { 0.0 };
        let walk = math::transform_normal(
            &(self.walk_direction / (1.0 + crouch)),
            &yaw,
        );
        physics.set_walk_direction(self.character, &walk);

        let rate = config.crouch_rate * update_time;
        let before = self.crouch_scale;
        self.crouch_scale = if self.crouch {
            (before - rate).max(CROUCH_SCALE)
        } else {
            (before + rate).min(STAND_SCALE)
        };
        physics.set_character_scale(self.character, self.crouch_scale);

        let mut position =
            math::get_translation(&physics.character_pose(self.character));
        let delta = self.crouch_scale - before;
        if delta > 0.0 && physics.on_ground(self.character) {
            position.y += delta;
        }
        physics.set_character_pose(
            self.character,
            &(yaw * math::translation(&position)),
        );

        if self.jump_requested {
            self.jump_requested = false;
            if physics.on_ground(self.character) {
                physics.jump(self.character, config.jump_speed);
            }
        }
        position
    }

    /// World pose of the actor's camera with the capsule at `position`
    #[must_use]
    pub fn camera_pose(&self, position: &glm::Vec3) -> glm::Mat4 {
        let look = math::rotation_x(self.pitch()) * math::rotation_y(self.yaw());
        let stand = glm::vec3(0.0, 0.5 * self.height * self.crouch_scale, 0.0);
        self.camera_offset
            * (look * math::translation(position) * math::translation(&stand))
    }

    /// Advances every animation instance and places the skeleton at the
    /// capsule. With no instances the skeleton shows its bind pose.
    pub fn animate(&mut self, update_time: f32, position: &glm::Vec3) {
        if self.animations.is_empty() {
            self.pose.reset();
        }
        for instance in &mut self.animations {
            instance.wrap();
            self.pose.animate(&instance.animation, instance.current_time);
            instance.advance(update_time);
            trace!(
                "{} at {}",
                instance.animation.name,
                instance.current_time
            );
        }
        let place = self.offset
            * (math::rotation_y(self.yaw()) * math::translation(position));
        for m in &mut self.pose.matrices {
            *m *= place;
        }
    }
}
