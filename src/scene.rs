//! Physics-backed scene graph and its per-tick update.
//!
//! Every entity type lives in its own arena and every body, character and
//! joint it owns is registered in this scene's physics world only. Removing
//! an entity releases all of them, together with any constraint attached to
//! its bodies.
mod actor;
mod camera;
mod light;
mod object;
mod prop;

pub use actor::{Actor, CROUCH_SCALE, STAND_SCALE};
pub use camera::{Camera, CameraProperties, Voice};
pub use light::{pack_lights, Light, LightKind};
pub use object::{Constraint, Emitter, Object};
pub use prop::Prop;

use crate::{
    arena::{Arena, Handle},
    audio::{AudioBuffer, AudioDevice, Placement, VoiceId, VoiceState},
    config::{ActorConfig, EngineConfig, PhysicsConfig},
    context::EngineContext,
    gpu::{LightBlock, TextureHandle},
    math,
    media::Mesh,
    physics::{
        BodyDesc, BodyHandle, BodyKind, CharacterDesc, JointDesc, JointLimits,
        PhysicsWorld, RayHit, Shape,
    },
};
use log::{debug, trace};
use nalgebra_glm as glm;
use std::sync::Arc;

/// Radius of the kinematic body carrying a camera, light or emitter pose
const MARKER_RADIUS: f32 = 0.1;

/// Physics substeps allowed per millisecond of update time
const MS_PER_SUB_STEP: f32 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SceneId(pub u32);

/// Any entity of a scene
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entity {
    Object(Handle<Object>),
    Light(Handle<Light>),
    Camera(Handle<Camera>),
    Emitter(Handle<Emitter>),
    Prop(Handle<Prop>),
    Actor(Handle<Actor>),
}

pub struct Scene<P: PhysicsWorld> {
    id: SceneId,
    pub physics: P,
    physics_config: PhysicsConfig,
    actor_config: ActorConfig,
    objects: Arena<Object>,
    lights: Arena<Light>,
    cameras: Arena<Camera>,
    emitters: Arena<Emitter>,
    props: Arena<Prop>,
    actors: Arena<Actor>,
    constraints: Arena<Constraint>,
    pub skybox: Option<TextureHandle>,
}

impl<P: PhysicsWorld> Scene<P> {
    /// Scenes are normally created through `EngineContext::create_scene`
    /// which hands out the id
    #[must_use]
    pub fn new(id: SceneId, physics: P, config: &EngineConfig) -> Self {
        Self {
            id,
            physics,
            physics_config: config.physics.clone(),
            actor_config: config.actor.clone(),
            objects: Arena::new(),
            lights: Arena::new(),
            cameras: Arena::new(),
            emitters: Arena::new(),
            props: Arena::new(),
            actors: Arena::new(),
            constraints: Arena::new(),
            skybox: None,
        }
    }

    #[must_use]
    pub const fn id(&self) -> SceneId {
        self.id
    }

    fn marker_body(&mut self, pose: &glm::Mat4) -> BodyHandle {
        self.physics.add_body(&BodyDesc {
            shape: Shape::Sphere {
                radius: MARKER_RADIUS,
            },
            kind: BodyKind::Kinematic,
            pose: *pose,
        })
    }

    /// Static mesh with a collision box fitted to its bounds
    pub fn add_object(
        &mut self,
        mesh: Arc<Mesh>,
        pose: &glm::Mat4,
    ) -> Handle<Object> {
        let (centre, half) = mesh.bounding_box();
        let centre = math::translation(&centre);
        let body = self.physics.add_body(&BodyDesc {
            shape: Shape::Box { half_extents: half },
            kind: BodyKind::Static,
            pose: centre * pose,
        });
        self.objects.insert(Object { mesh, body, centre })
    }

    pub fn remove_object(&mut self, object: Handle<Object>) -> bool {
        let Some(object) = self.objects.remove(object) else {
            return false;
        };
        self.release_bodies(&[object.body]);
        true
    }

    pub fn add_light(
        &mut self,
        kind: LightKind,
        colour: [f32; 3],
        pose: &glm::Mat4,
    ) -> Handle<Light> {
        let body = self.marker_body(pose);
        self.lights.insert(Light { body, kind, colour })
    }

    pub fn remove_light(&mut self, light: Handle<Light>) -> bool {
        let Some(light) = self.lights.remove(light) else {
            return false;
        };
        self.release_bodies(&[light.body]);
        true
    }

    pub fn add_camera(
        &mut self,
        properties: CameraProperties,
        pose: &glm::Mat4,
    ) -> Handle<Camera> {
        let body = self.marker_body(pose);
        self.cameras.insert(Camera::new(body, properties))
    }

    /// Also stops and deletes the camera's voices
    pub fn remove_camera(
        &mut self,
        audio: &mut dyn AudioDevice,
        camera: Handle<Camera>,
    ) -> bool {
        let Some(camera) = self.cameras.remove(camera) else {
            return false;
        };
        for voice in &camera.voices {
            audio.stop(voice.id);
            audio.delete_voice(voice.id);
        }
        self.release_bodies(&[camera.body]);
        true
    }

    pub fn add_emitter(&mut self, pose: &glm::Mat4) -> Handle<Emitter> {
        let body = self.marker_body(pose);
        self.emitters.insert(Emitter { body })
    }

    /// Voices following the emitter stay where they were last placed
    pub fn remove_emitter(&mut self, emitter: Handle<Emitter>) -> bool {
        let Some(removed) = self.emitters.remove(emitter) else {
            return false;
        };
        for camera in self.cameras.values_mut() {
            for voice in &mut camera.voices {
                if voice.emitter == Some(emitter) {
                    voice.emitter = None;
                }
            }
        }
        self.release_bodies(&[removed.body]);
        true
    }

    pub fn add_prop(
        &mut self,
        mesh: Arc<Mesh>,
        pose: &glm::Mat4,
    ) -> Handle<Prop> {
        let prop =
            Prop::new(&mut self.physics, mesh, pose, &self.physics_config);
        self.props.insert(prop)
    }

    pub fn remove_prop(&mut self, prop: Handle<Prop>) -> bool {
        let Some(mut prop) = self.props.remove(prop) else {
            return false;
        };
        self.drop_constraints(&prop.bodies);
        prop.release(&mut self.physics);
        true
    }

    /// Creates the actor's capsule at `position` and a camera for it
    ///
    /// # Panics
    /// Panics if the mesh has no skeleton
    pub fn add_actor(
        &mut self,
        mesh: Arc<Mesh>,
        position: &glm::Vec3,
        camera: CameraProperties,
    ) -> Handle<Actor> {
        let height = self.actor_config.height;
        let character = self.physics.add_character(&CharacterDesc {
            position: *position,
            radius: self.actor_config.radius,
            height,
        });
        let camera = self.add_camera(camera, &math::translation(position));
        let actor = Actor::new(mesh, character, camera, height);
        let pose = actor.camera_pose(position);
        if let Some(c) = self.cameras.get(camera) {
            self.physics.set_body_pose(c.body, &pose);
        }
        self.actors.insert(actor)
    }

    /// Also removes the actor's camera
    pub fn remove_actor(
        &mut self,
        audio: &mut dyn AudioDevice,
        actor: Handle<Actor>,
    ) -> bool {
        let Some(actor) = self.actors.remove(actor) else {
            return false;
        };
        self.physics.remove_character(actor.character);
        self.remove_camera(audio, actor.camera);
        true
    }

    /// Joins the bodies of two entities with a free 6-DOF constraint. The
    /// frames are in each body's local space. Actors have no body to join.
    pub fn add_constraint(
        &mut self,
        a: Entity,
        b: Entity,
        frame_a: &glm::Mat4,
        frame_b: &glm::Mat4,
    ) -> Option<Handle<Constraint>> {
        let body_a = self.body_of(a)?;
        let body_b = self.body_of(b)?;
        let joint = self.physics.add_joint(&JointDesc {
            body_a,
            body_b,
            frame_a: *frame_a,
            frame_b: *frame_b,
            limits: JointLimits::Free,
        });
        Some(self.constraints.insert(Constraint {
            joint,
            body_a,
            body_b,
        }))
    }

    pub fn remove_constraint(
        &mut self,
        constraint: Handle<Constraint>,
    ) -> bool {
        let Some(constraint) = self.constraints.remove(constraint) else {
            return false;
        };
        self.physics.remove_joint(constraint.joint);
        true
    }

    fn drop_constraints(&mut self, bodies: &[BodyHandle]) {
        let attached: Vec<_> = self
            .constraints
            .iter()
            .filter(|(_, c)| {
                bodies.contains(&c.body_a) || bodies.contains(&c.body_b)
            })
            .map(|(h, _)| h)
            .collect();
        for h in attached {
            self.remove_constraint(h);
        }
    }

    fn release_bodies(&mut self, bodies: &[BodyHandle]) {
        self.drop_constraints(bodies);
        for body in bodies {
            self.physics.remove_body(*body);
        }
    }

    /// Removes every entity, stopping and deleting every voice
    pub fn clear(&mut self, audio: &mut dyn AudioDevice) {
        for h in self.actors.handles() {
            self.remove_actor(audio, h);
        }
        for h in self.props.handles() {
            self.remove_prop(h);
        }
        for h in self.objects.handles() {
            self.remove_object(h);
        }
        for h in self.lights.handles() {
            self.remove_light(h);
        }
        for h in self.cameras.handles() {
            self.remove_camera(audio, h);
        }
        for h in self.emitters.handles() {
            self.remove_emitter(h);
        }
        for h in self.constraints.handles() {
            self.remove_constraint(h);
        }
    }

    /// Body whose pose is the entity's pose, or the root bone's body for a
    /// prop
    #[must_use]
    pub fn body_of(&self, entity: Entity) -> Option<BodyHandle> {
        match entity {
            Entity::Object(h) => self.objects.get(h).map(|o| o.body),
            Entity::Light(h) => self.lights.get(h).map(|l| l.body),
            Entity::Camera(h) => self.cameras.get(h).map(|c| c.body),
            Entity::Emitter(h) => self.emitters.get(h).map(|e| e.body),
            Entity::Prop(h) => self.props.get(h).and_then(|p| {
                let root =
                    p.mesh.skeleton.as_ref().map_or(0, |s| s.root_bone);
                p.bodies.get(root).copied()
            }),
            Entity::Actor(_) => None,
        }
    }

    /// Entity owning a body. Any bone body of a prop maps to the prop.
    #[must_use]
    pub fn entity_of(&self, body: BodyHandle) -> Option<Entity> {
        if let Some((h, _)) = self.objects.iter().find(|(_, o)| o.body == body)
        {
            return Some(Entity::Object(h));
        }
        if let Some((h, _)) = self.lights.iter().find(|(_, l)| l.body == body) {
            return Some(Entity::Light(h));
        }
        if let Some((h, _)) = self.cameras.iter().find(|(_, c)| c.body == body)
        {
            return Some(Entity::Camera(h));
        }
        if let Some((h, _)) =
            self.emitters.iter().find(|(_, e)| e.body == body)
        {
            return Some(Entity::Emitter(h));
        }
        self.props
            .iter()
            .find(|(_, p)| p.bodies.contains(&body))
            .map(|(h, _)| Entity::Prop(h))
    }

    /// World pose of any entity
    #[must_use]
    pub fn pose(&self, entity: Entity) -> Option<glm::Mat4> {
        let physics = &self.physics;
        match entity {
            Entity::Object(h) => self
                .objects
                .get(h)
                .map(|o| o.pose_from_body(&physics.body_pose(o.body))),
            Entity::Prop(h) => self.props.get(h).map(|p| p.pose(physics)),
            Entity::Actor(h) => self
                .actors
                .get(h)
                .map(|a| physics.character_pose(a.character)),
            Entity::Light(_) | Entity::Camera(_) | Entity::Emitter(_) => {
                self.body_of(entity).map(|b| physics.body_pose(b))
            }
        }
    }

    /// Moves an entity. An actor keeps its yaw, so only the translation of
    /// `pose` is used for it.
    pub fn set_pose(&mut self, entity: Entity, pose: &glm::Mat4) -> bool {
        match entity {
            Entity::Object(h) => {
                let Some(o) = self.objects.get(h) else {
                    return false;
                };
                self.physics.set_body_pose(o.body, &o.body_from_pose(pose));
            }
            Entity::Prop(h) => {
                let Some(p) = self.props.get_mut(h) else {
                    return false;
                };
                p.set_pose(&mut self.physics, pose);
            }
            Entity::Actor(h) => {
                let Some(a) = self.actors.get(h) else {
                    return false;
                };
                let placed = math::rotation_y(a.yaw())
                    * math::translation(&math::get_translation(pose));
                self.physics.set_character_pose(a.character, &placed);
            }
            Entity::Light(_) | Entity::Camera(_) | Entity::Emitter(_) => {
                let Some(body) = self.body_of(entity) else {
                    return false;
                };
                self.physics.set_body_pose(body, pose);
            }
        }
        true
    }

    /// Plays a buffer through a camera. The voice follows `emitter` while
    /// it plays, otherwise it stays at the listener.
    pub fn play_voice(
        &mut self,
        audio: &mut dyn AudioDevice,
        camera: Handle<Camera>,
        buffer: &AudioBuffer,
        emitter: Option<Handle<Emitter>>,
        looping: bool,
    ) -> Option<VoiceId> {
        let camera = self.cameras.get_mut(camera)?;
        let id = audio.create_voice(buffer);
        audio.play(id, looping);
        camera.voices.push(Voice {
            id,
            emitter,
            looping,
        });
        debug!("Voice {:?} playing, looping={}", id, looping);
        Some(id)
    }

    /// Nearest hit between two points and the entity that was hit
    #[must_use]
    pub fn ray_test(
        &self,
        from: &glm::Vec3,
        to: &glm::Vec3,
    ) -> Option<(RayHit, Option<Entity>)> {
        let hit = self.physics.ray_test(from, to)?;
        Some((hit, hit.body.and_then(|b| self.entity_of(b))))
    }

    /// Lights packed for a camera at `view`
    #[must_use]
    pub fn light_block(&self, view: &glm::Mat4) -> LightBlock {
        pack_lights(
            self.lights
                .values()
                .map(|l| (l, self.physics.body_pose(l.body))),
            view,
        )
    }

    /// Substep budget for a tick. Long ticks do not buy more substeps than
    /// the configured ceiling.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn max_sub_steps(&self, update_time: f32) -> u32 {
        let budget = (update_time / MS_PER_SUB_STEP) as u32;
        budget.min(self.physics_config.max_sub_steps)
    }

    /// Advances the scene by `update_time` milliseconds. Cameras that are
    /// the view of one of the context's render targets drive audio.
    pub fn update(&mut self, ctx: &mut EngineContext, update_time: f32) {
        let views = ctx.views(self.id);
        self.update_with(ctx.audio.as_mut(), &views, update_time);
    }

    /// `update` with the audio device and view cameras given directly
    pub fn update_with(
        &mut self,
        audio: &mut dyn AudioDevice,
        views: &[Handle<Camera>],
        update_time: f32,
    ) {
        trace!("Scene {:?} update {}", self.id, update_time);
        for actor in self.actors.values_mut() {
            let position = actor.locomotion(
                &mut self.physics,
                update_time,
                &self.actor_config,
            );
            if let Some(camera) = self.cameras.get(actor.camera) {
                let pose = actor.camera_pose(&position);
                self.physics.set_body_pose(camera.body, &pose);
            }
            actor.animate(update_time, &position);
        }

        for camera in self.cameras.values_mut() {
            release_finished_voices(audio, &mut camera.voices);
        }

        for (h, camera) in self.cameras.iter() {
            if !views.contains(&h) {
                continue;
            }
            let pose = self.physics.body_pose(camera.body);
            audio.set_listener(&placement(&pose));
            for voice in &camera.voices {
                if audio.state(voice.id) != VoiceState::Playing {
                    continue;
                }
                let Some(emitter) =
                    voice.emitter.and_then(|e| self.emitters.get(e))
                else {
                    continue;
                };
                let pose = self.physics.body_pose(emitter.body);
                audio.set_voice_placement(voice.id, &placement(&pose));
            }
        }

        for prop in self.props.values_mut() {
            prop.update(&self.physics);
        }

        let max_sub_steps = self.max_sub_steps(update_time);
        let steps = self.physics.step(update_time / 1000.0, max_sub_steps);
        trace!("{} physics substeps of at most {}", steps, max_sub_steps);
    }

    #[must_use]
    pub const fn objects(&self) -> &Arena<Object> {
        &self.objects
    }

    #[must_use]
    pub const fn lights(&self) -> &Arena<Light> {
        &self.lights
    }

    #[must_use]
    pub const fn cameras(&self) -> &Arena<Camera> {
        &self.cameras
    }

    #[must_use]
    pub const fn emitters(&self) -> &Arena<Emitter> {
        &self.emitters
    }

    #[must_use]
    pub const fn props(&self) -> &Arena<Prop> {
        &self.props
    }

    #[must_use]
    pub const fn actors(&self) -> &Arena<Actor> {
        &self.actors
    }

    #[must_use]
    pub const fn constraints(&self) -> &Arena<Constraint> {
        &self.constraints
    }

    pub fn light_mut(&mut self, light: Handle<Light>) -> Option<&mut Light> {
        self.lights.get_mut(light)
    }

    pub fn camera_mut(
        &mut self,
        camera: Handle<Camera>,
    ) -> Option<&mut Camera> {
        self.cameras.get_mut(camera)
    }

    pub fn actor_mut(&mut self, actor: Handle<Actor>) -> Option<&mut Actor> {
        self.actors.get_mut(actor)
    }

    /// Number of entities of every type
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.objects.len()
            + self.lights.len()
            + self.cameras.len()
            + self.emitters.len()
            + self.props.len()
            + self.actors.len()
    }
}

/// Deletes one-shot voices that have played to the end
fn release_finished_voices(audio: &mut dyn AudioDevice, voices: &mut Vec<Voice>) {
    voices.retain(|voice| {
        if voice.looping || audio.state(voice.id) != VoiceState::Stopped {
            return true;
        }
        audio.delete_voice(voice.id);
        trace!("Voice {:?} finished", voice.id);
        false
    });
}

/// Listener or voice placement from a world pose
fn placement(pose: &glm::Mat4) -> Placement {
    Placement {
        position: math::get_translation(pose),
        forward: math::basis(pose, 2),
        up: math::basis(pose, 1),
    }
}
