use super::{
    BodyDesc, BodyHandle, BodyKind, CharacterDesc, CharacterHandle, JointDesc,
    JointHandle, JointLimits, PhysicsWorld, RayHit, Shape, SubstepClock,
};
use crate::{config::PhysicsConfig, math};
use ahash::AHashMap;
use log::{debug, warn};
use nalgebra_glm as glm;
use rapier3d::{control::KinematicCharacterController, prelude::*};

struct Character {
    shape: SharedShape,
    radius: f32,
    height: f32,
    position: Isometry<Real>,
    walk: glm::Vec3,
    grounded: bool,
    vertical_speed: f32,
}

/// Rigid body simulation backed by rapier
pub struct RapierWorld {
    gravity: Vector<Real>,
    clock: SubstepClock,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    controller: KinematicCharacterController,
    next_id: u32,
    body_handles: AHashMap<u32, RigidBodyHandle>,
    joint_handles: AHashMap<u32, ImpulseJointHandle>,
    characters: AHashMap<u32, Character>,
}

impl RapierWorld {
    #[must_use]
    pub fn new(config: &PhysicsConfig) -> Self {
        Self {
            gravity: vector![
                config.gravity[0],
                config.gravity[1],
                config.gravity[2]
            ],
            clock: SubstepClock::new(config.fixed_time_step),
            integration_parameters: IntegrationParameters {
                dt: config.fixed_time_step,
                ..IntegrationParameters::default()
            },
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            controller: KinematicCharacterController::default(),
            next_id: 0,
            body_handles: AHashMap::new(),
            joint_handles: AHashMap::new(),
            characters: AHashMap::new(),
        }
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn collider(shape: &Shape) -> ColliderBuilder {
        match shape {
            Shape::Box { half_extents } => ColliderBuilder::cuboid(
                half_extents.x,
                half_extents.y,
                half_extents.z,
            ),
            Shape::Sphere { radius } => ColliderBuilder::ball(*radius),
            Shape::Capsule { radius, height } => ColliderBuilder::capsule_y(
                (height * 0.5 - radius).max(0.0),
                *radius,
            ),
            Shape::ConvexHull(points) => {
                let points = points
                    .iter()
                    .map(|p| point![p.x, p.y, p.z])
                    .collect::<Vec<_>>();
                ColliderBuilder::convex_hull(&points).unwrap_or_else(|| {
                    warn!("Degenerate convex hull replaced by a sphere");
                    ColliderBuilder::ball(0.05)
                })
            }
        }
    }

    fn capsule(radius: f32, height: f32) -> SharedShape {
        SharedShape::capsule_y((height * 0.5 - radius).max(0.0), radius)
    }

    fn move_characters(&mut self, dt: f32) {
        for c in self.characters.values_mut() {
            let mut desired = vector![c.walk.x, c.walk.y, c.walk.z];
            if !c.grounded {
                c.vertical_speed += self.gravity.y * dt;
            }
            desired.y += c.vertical_speed * dt;
            let movement = self.controller.move_shape(
                dt,
                &self.bodies,
                &self.colliders,
                &self.query_pipeline,
                c.shape.as_ref(),
                &c.position,
                desired,
                QueryFilter::default(),
                |_| {},
            );
            c.position.translation.vector += movement.translation;
            c.grounded = movement.grounded;
            if c.grounded && c.vertical_speed < 0.0 {
                c.vertical_speed = 0.0;
            }
        }
    }

    fn refresh_queries(&mut self) {
        self.query_pipeline.update(&self.bodies, &self.colliders);
    }
}

impl PhysicsWorld for RapierWorld {
    fn add_body(&mut self, desc: &BodyDesc) -> BodyHandle {
        let builder = match desc.kind {
            BodyKind::Static => RigidBodyBuilder::fixed(),
            BodyKind::Dynamic { .. } => RigidBodyBuilder::dynamic(),
            BodyKind::Kinematic => RigidBodyBuilder::kinematic_position_based(),
        };
        let handle = self
            .bodies
            .insert(builder.position(math::to_isometry(&desc.pose)).build());
        let mut collider = Self::collider(&desc.shape);
        if let BodyKind::Dynamic { mass } = desc.kind {
            collider = collider.mass(mass);
        }
        self.colliders
            .insert_with_parent(collider.build(), handle, &mut self.bodies);
        self.refresh_queries();
        let id = self.next_id();
        self.body_handles.insert(id, handle);
        BodyHandle(id)
    }

    fn remove_body(&mut self, body: BodyHandle) {
        if let Some(handle) = self.body_handles.remove(&body.0) {
            self.bodies.remove(
                handle,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            );
            // Joints attached to the body went with it
            let joints = &self.impulse_joints;
            self.joint_handles.retain(|_, j| joints.get(*j).is_some());
            self.refresh_queries();
        }
    }

    fn body_pose(&self, body: BodyHandle) -> glm::Mat4 {
        self.body_handles
            .get(&body.0)
            .and_then(|h| self.bodies.get(*h))
            .map_or_else(glm::Mat4::identity, |b| {
                math::from_isometry(b.position())
            })
    }

    fn set_body_pose(&mut self, body: BodyHandle, pose: &glm::Mat4) {
        let iso = math::to_isometry(pose);
        if let Some(b) = self
            .body_handles
            .get(&body.0)
            .and_then(|h| self.bodies.get_mut(*h))
        {
            if b.is_kinematic() {
                b.set_next_kinematic_position(iso);
            }
            b.set_position(iso, true);
        }
    }

    fn add_joint(&mut self, desc: &JointDesc) -> JointHandle {
        let (Some(a), Some(b)) = (
            self.body_handles.get(&desc.body_a.0).copied(),
            self.body_handles.get(&desc.body_b.0).copied(),
        ) else {
            warn!("Joint between unknown bodies ignored");
            return JointHandle(0);
        };
        let mut builder = match desc.limits {
            JointLimits::Free => GenericJointBuilder::new(JointAxesMask::empty()),
            JointLimits::Cone { swing, twist } => {
                GenericJointBuilder::new(JointAxesMask::LIN_AXES)
                    .limits(JointAxis::AngX, [-swing, swing])
                    .limits(JointAxis::AngY, [-twist, twist])
                    .limits(JointAxis::AngZ, [-swing, swing])
            }
        };
        builder = builder
            .local_frame1(math::to_isometry(&desc.frame_a))
            .local_frame2(math::to_isometry(&desc.frame_b));
        let handle = self.impulse_joints.insert(a, b, builder.build(), true);
        let id = self.next_id();
        self.joint_handles.insert(id, handle);
        JointHandle(id)
    }

    fn remove_joint(&mut self, joint: JointHandle) {
        if let Some(handle) = self.joint_handles.remove(&joint.0) {
            self.impulse_joints.remove(handle, true);
        }
    }

    fn add_character(&mut self, desc: &CharacterDesc) -> CharacterHandle {
        let id = self.next_id();
        self.characters.insert(
            id,
            Character {
                shape: Self::capsule(desc.radius, desc.height),
                radius: desc.radius,
                height: desc.height,
                position: Isometry::translation(
                    desc.position.x,
                    desc.position.y,
                    desc.position.z,
                ),
                walk: glm::Vec3::zeros(),
                grounded: false,
                vertical_speed: 0.0,
            },
        );
        CharacterHandle(id)
    }

    fn remove_character(&mut self, character: CharacterHandle) {
        self.characters.remove(&character.0);
    }

    fn set_walk_direction(
        &mut self,
        character: CharacterHandle,
        walk: &glm::Vec3,
    ) {
        if let Some(c) = self.characters.get_mut(&character.0) {
            c.walk = *walk;
        }
    }

    fn set_character_scale(&mut self, character: CharacterHandle, scale_y: f32) {
        if let Some(c) = self.characters.get_mut(&character.0) {
            c.shape = Self::capsule(c.radius, c.height * scale_y);
        }
    }

    fn character_pose(&self, character: CharacterHandle) -> glm::Mat4 {
        self.characters
            .get(&character.0)
            .map_or_else(glm::Mat4::identity, |c| {
                math::from_isometry(&c.position)
            })
    }

    fn set_character_pose(
        &mut self,
        character: CharacterHandle,
        pose: &glm::Mat4,
    ) {
        if let Some(c) = self.characters.get_mut(&character.0) {
            c.position = math::to_isometry(pose);
        }
    }

    fn on_ground(&self, character: CharacterHandle) -> bool {
        self.characters.get(&character.0).is_some_and(|c| c.grounded)
    }

    fn jump(&mut self, character: CharacterHandle, speed: f32) {
        if let Some(c) = self.characters.get_mut(&character.0) {
            if c.grounded {
                c.grounded = false;
                c.vertical_speed = speed;
            }
        }
    }

    fn ray_test(&self, from: &glm::Vec3, to: &glm::Vec3) -> Option<RayHit> {
        let dir = to - from;
        let ray = Ray::new(point![from.x, from.y, from.z], vector![dir.x, dir.y, dir.z]);
        let (collider, hit) = self.query_pipeline.cast_ray_and_get_normal(
            &self.bodies,
            &self.colliders,
            &ray,
            1.0,
            true,
            QueryFilter::default(),
        )?;
        let parent = self.colliders.get(collider).and_then(Collider::parent);
        let body = parent.and_then(|p| {
            self.body_handles
                .iter()
                .find(|(_, h)| **h == p)
                .map(|(id, _)| BodyHandle(*id))
        });
        Some(RayHit {
            body,
            point: glm::lerp(from, to, hit.toi),
            normal: glm::vec3(hit.normal.x, hit.normal.y, hit.normal.z),
            fraction: hit.toi,
        })
    }

    fn step(&mut self, time_step: f32, max_sub_steps: u32) -> u32 {
        let (sub_steps, dt) = self.clock.advance(time_step, max_sub_steps);
        self.integration_parameters.dt = dt;
        for _ in 0..sub_steps {
            self.move_characters(dt);
            self.pipeline.step(
                &self.gravity,
                &self.integration_parameters,
                &mut self.islands,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.bodies,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                &mut self.ccd_solver,
                Some(&mut self.query_pipeline),
                &(),
                &(),
            );
        }
        debug!("Rapier step {} s ran {} substeps", time_step, sub_steps);
        sub_steps
    }

    fn body_count(&self) -> usize {
        self.body_handles.len()
    }

    fn joint_count(&self) -> usize {
        self.joint_handles.len()
    }

    fn character_count(&self) -> usize {
        self.characters.len()
    }
}
