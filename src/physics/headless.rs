use super::{
    BodyDesc, BodyHandle, CharacterDesc, CharacterHandle, JointDesc,
    JointHandle, PhysicsWorld, RayHit, Shape, SubstepClock,
};
use crate::{config::PhysicsConfig, math};
use ahash::AHashMap;
use log::{debug, trace};
use nalgebra_glm as glm;

/// One call to `step`, as the world received it
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepRecord {
    pub time_step: f32,
    pub max_sub_steps: u32,
    pub sub_steps: u32,
}

struct Body {
    desc: BodyDesc,
    pose: glm::Mat4,
}

struct Character {
    pose: glm::Mat4,
    walk: glm::Vec3,
    scale_y: f32,
    grounded: bool,
    vertical_speed: f32,
    ground_y: f32,
}

/// Physics world without dynamics
///
/// Bodies hold whatever pose they were given. Characters move by their walk
/// direction once per fixed substep and follow a simple ballistic arc after
/// a jump, landing back at the height they left from. Every `step` call is
/// recorded in `steps`.
pub struct HeadlessWorld {
    gravity: glm::Vec3,
    clock: SubstepClock,
    next_id: u32,
    bodies: AHashMap<u32, Body>,
    joints: AHashMap<u32, JointDesc>,
    characters: AHashMap<u32, Character>,
    pub steps: Vec<StepRecord>,
}

impl HeadlessWorld {
    #[must_use]
    pub fn new(config: &PhysicsConfig) -> Self {
        Self {
            gravity: glm::make_vec3(&config.gravity),
            clock: SubstepClock::new(config.fixed_time_step),
            next_id: 0,
            bodies: AHashMap::new(),
            joints: AHashMap::new(),
            characters: AHashMap::new(),
            steps: Vec::new(),
        }
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Forces the grounded flag of a character
    pub fn set_grounded(
        &mut self,
        character: CharacterHandle,
        grounded: bool,
    ) {
        if let Some(c) = self.characters.get_mut(&character.0) {
            c.grounded = grounded;
            c.vertical_speed = 0.0;
            c.ground_y = math::get_translation(&c.pose).y;
        }
    }

    #[must_use]
    pub fn character_scale(&self, character: CharacterHandle) -> Option<f32> {
        self.characters.get(&character.0).map(|c| c.scale_y)
    }

    #[must_use]
    pub fn walk_direction(
        &self,
        character: CharacterHandle,
    ) -> Option<glm::Vec3> {
        self.characters.get(&character.0).map(|c| c.walk)
    }

    #[must_use]
    pub fn joint(&self, joint: JointHandle) -> Option<&JointDesc> {
        self.joints.get(&joint.0)
    }

    #[must_use]
    pub fn body_shape(&self, body: BodyHandle) -> Option<&Shape> {
        self.bodies.get(&body.0).map(|b| &b.desc.shape)
    }

    fn move_characters(&mut self, dt: f32) {
        let gravity = self.gravity.y;
        for c in self.characters.values_mut() {
            let mut position = math::get_translation(&c.pose) + c.walk;
            if !c.grounded {
                c.vertical_speed += gravity * dt;
                position.y += c.vertical_speed * dt;
                if position.y <= c.ground_y {
                    position.y = c.ground_y;
                    c.vertical_speed = 0.0;
                    c.grounded = true;
                }
            }
            math::set_translation(&mut c.pose, &position);
        }
    }
}

/// Local space bounds of a shape
fn local_bounds(shape: &Shape) -> (glm::Vec3, glm::Vec3) {
    match shape {
        Shape::Box { half_extents } => (-half_extents, *half_extents),
        Shape::Sphere { radius } => {
            let r = glm::vec3(*radius, *radius, *radius);
            (-r, r)
        }
        Shape::Capsule { radius, height } => {
            let r = glm::vec3(*radius, height * 0.5, *radius);
            (-r, r)
        }
        Shape::ConvexHull(points) => points.iter().fold(
            (glm::Vec3::repeat(f32::MAX), glm::Vec3::repeat(f32::MIN)),
            |(lo, hi), p| (glm::min2(&lo, p), glm::max2(&hi, p)),
        ),
    }
}

/// Slab test of a local space segment against a box, returning the entry
/// fraction and the face normal
fn ray_box(
    from: &glm::Vec3,
    to: &glm::Vec3,
    min: &glm::Vec3,
    max: &glm::Vec3,
) -> Option<(f32, glm::Vec3)> {
    let dir = to - from;
    let (mut enter, mut exit) = (0.0_f32, 1.0_f32);
    let mut normal = glm::Vec3::zeros();
    for axis in 0..3 {
        if dir[axis].abs() < math::EPSILON {
            if from[axis] < min[axis] || from[axis] > max[axis] {
                return None;
            }
            continue;
        }
        let inv = 1.0 / dir[axis];
        let (mut t0, mut t1) =
            ((min[axis] - from[axis]) * inv, (max[axis] - from[axis]) * inv);
        let mut sign = -1.0;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
            sign = 1.0;
        }
        if t0 > enter {
            enter = t0;
            normal = glm::Vec3::zeros();
            normal[axis] = sign;
        }
        exit = exit.min(t1);
        if enter > exit {
            return None;
        }
    }
    Some((enter, normal))
}

impl PhysicsWorld for HeadlessWorld {
    fn add_body(&mut self, desc: &BodyDesc) -> BodyHandle {
        let id = self.next_id();
        self.bodies.insert(
            id,
            Body {
                desc: desc.clone(),
                pose: desc.pose,
            },
        );
        trace!("Headless body {} added as {:?}", id, desc.kind);
        BodyHandle(id)
    }

    fn remove_body(&mut self, body: BodyHandle) {
        self.bodies.remove(&body.0);
    }

    fn body_pose(&self, body: BodyHandle) -> glm::Mat4 {
        self.bodies
            .get(&body.0)
            .map_or_else(glm::Mat4::identity, |b| b.pose)
    }

    fn set_body_pose(&mut self, body: BodyHandle, pose: &glm::Mat4) {
        if let Some(b) = self.bodies.get_mut(&body.0) {
            b.pose = *pose;
        }
    }

    fn add_joint(&mut self, desc: &JointDesc) -> JointHandle {
        let id = self.next_id();
        self.joints.insert(id, desc.clone());
        JointHandle(id)
    }

    fn remove_joint(&mut self, joint: JointHandle) {
        self.joints.remove(&joint.0);
    }

    fn add_character(&mut self, desc: &CharacterDesc) -> CharacterHandle {
        let id = self.next_id();
        self.characters.insert(
            id,
            Character {
                pose: math::translation(&desc.position),
                walk: glm::Vec3::zeros(),
                scale_y: 1.0,
                grounded: true,
                vertical_speed: 0.0,
                ground_y: desc.position.y,
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
            c.scale_y = scale_y;
        }
    }

    fn character_pose(&self, character: CharacterHandle) -> glm::Mat4 {
        self.characters
            .get(&character.0)
            .map_or_else(glm::Mat4::identity, |c| c.pose)
    }

    fn set_character_pose(
        &mut self,
        character: CharacterHandle,
        pose: &glm::Mat4,
    ) {
        if let Some(c) = self.characters.get_mut(&character.0) {
            c.pose = *pose;
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
                c.ground_y = math::get_translation(&c.pose).y;
            }
        }
    }

    fn ray_test(&self, from: &glm::Vec3, to: &glm::Vec3) -> Option<RayHit> {
        let mut best: Option<RayHit> = None;
        for (id, body) in &self.bodies {
            let inv = math::inverse(&body.pose);
            let (min, max) = local_bounds(&body.desc.shape);
            let local_from = math::transform_point(from, &inv);
            let local_to = math::transform_point(to, &inv);
            if let Some((fraction, normal)) =
                ray_box(&local_from, &local_to, &min, &max)
            {
                if best.map_or(true, |b| fraction < b.fraction) {
                    best = Some(RayHit {
                        body: Some(BodyHandle(*id)),
                        point: glm::lerp(from, to, fraction),
                        normal: math::transform_normal(&normal, &body.pose),
                        fraction,
                    });
                }
            }
        }
        best
    }

    fn step(&mut self, time_step: f32, max_sub_steps: u32) -> u32 {
        let (sub_steps, dt) = self.clock.advance(time_step, max_sub_steps);
        for _ in 0..sub_steps {
            self.move_characters(dt);
        }
        self.steps.push(StepRecord {
            time_step,
            max_sub_steps,
            sub_steps,
        });
        debug!(
            "Headless step {} s, budget {}, ran {}",
            time_step, max_sub_steps, sub_steps
        );
        sub_steps
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn joint_count(&self) -> usize {
        self.joints.len()
    }

    fn character_count(&self) -> usize {
        self.characters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::BodyKind;

    fn world() -> HeadlessWorld {
        HeadlessWorld::new(&PhysicsConfig::default())
    }

    #[test]
    fn ray_hits_nearest_box() {
        let mut world = world();
        let shape = Shape::Box {
            half_extents: glm::vec3(1.0, 1.0, 1.0),
        };
        let near = world.add_body(&BodyDesc {
            shape: shape.clone(),
            kind: BodyKind::Static,
            pose: math::translation(&glm::vec3(0.0, 0.0, 5.0)),
        });
        world.add_body(&BodyDesc {
            shape,
            kind: BodyKind::Static,
            pose: math::translation(&glm::vec3(0.0, 0.0, 9.0)),
        });
        let hit = world
            .ray_test(&glm::Vec3::zeros(), &glm::vec3(0.0, 0.0, 20.0))
            .unwrap();
        assert_eq!(hit.body, Some(near));
        assert!((hit.point.z - 4.0).abs() < 1.0e-4);
        assert!((hit.normal.z + 1.0).abs() < 1.0e-4);
        assert!(world
            .ray_test(&glm::vec3(5.0, 0.0, 0.0), &glm::vec3(5.0, 0.0, 20.0))
            .is_none());
    }

    #[test]
    fn character_walks_per_substep() {
        let mut world = world();
        let c = world.add_character(&CharacterDesc {
            position: glm::Vec3::zeros(),
            radius: 0.3,
            height: 1.8,
        });
        world.set_walk_direction(c, &glm::vec3(0.1, 0.0, 0.0));
        let ran = world.step(0.06, 10);
        assert_eq!(ran, 3);
        let x = math::get_translation(&world.character_pose(c)).x;
        assert!((x - 0.3).abs() < 1.0e-4);
    }

    #[test]
    fn jump_lands_back() {
        let mut world = world();
        let c = world.add_character(&CharacterDesc {
            position: glm::vec3(0.0, 2.0, 0.0),
            radius: 0.3,
            height: 1.8,
        });
        world.jump(c, 4.0);
        assert!(!world.on_ground(c));
        world.step(0.1, 10);
        assert!(math::get_translation(&world.character_pose(c)).y > 2.0);
        world.step(2.0, 200);
        assert!(world.on_ground(c));
        let y = math::get_translation(&world.character_pose(c)).y;
        assert!((y - 2.0).abs() < 1.0e-4);
    }
}
