use crate::{
    config::PhysicsConfig,
    math,
    media::Mesh,
    physics::{
        BodyDesc, BodyHandle, BodyKind, JointDesc, JointHandle, JointLimits,
        PhysicsWorld, Shape,
    },
};
use log::debug;
use nalgebra_glm as glm;
use std::sync::Arc;

/// Bones with fewer hull points than this get a small sphere instead
const MIN_HULL_POINTS: usize = 4;
const BONE_SPHERE_RADIUS: f32 = 0.05;
const MIN_BONE_MASS: f32 = 0.01;

/// A jointed assembly with one dynamic body per bone. A mesh without bones
/// is a single body.
pub struct Prop {
    pub mesh: Arc<Mesh>,
    /// One per bone, in bone order
    pub bodies: Vec<BodyHandle>,
    pub joints: Vec<JointHandle>,
    /// Live body pose of each bone
    pub matrices: Vec<glm::Mat4>,
    /// Skinning matrix of each bone, `inverse(bone.matrix) * matrices[b]`
    pub skin: Vec<glm::Mat4>,
    /// Each bone's pose relative to its parent's accumulated pose
    pub deltas: Vec<glm::Mat4>,
    /// Offset of the collision box of a bone-less mesh
    centre: glm::Mat4,
}

impl Prop {
    /// Creates the bodies with every bone at its bind pose relative to
    /// `pose`, and a limited joint between each bone and its parent
    pub fn new(
        physics: &mut dyn PhysicsWorld,
        mesh: Arc<Mesh>,
        pose: &glm::Mat4,
        config: &PhysicsConfig,
    ) -> Self {
        let (centre, half) = mesh.bounding_box();
        let centre = math::translation(&centre);
        let mut bodies = Vec::new();
        let mut joints = Vec::new();

        if let Some(skeleton) = &mesh.skeleton {
            for bone in &skeleton.bones {
                let shape = if bone.convex.len() >= MIN_HULL_POINTS {
                    Shape::ConvexHull(bone.convex.clone())
                } else {
                    Shape::Sphere {
                        radius: BONE_SPHERE_RADIUS,
                    }
                };
                bodies.push(physics.add_body(&BodyDesc {
                    shape,
                    kind: BodyKind::Dynamic {
                        mass: bone.volume.max(MIN_BONE_MASS),
                    },
                    pose: bone.matrix * pose,
                }));
            }
            let limits = JointLimits::Cone {
                swing: config.joint_swing_limit,
                twist: config.joint_twist_limit,
            };
            for bone in &skeleton.bones {
                let Some(parent) = bone.parent else {
                    continue;
                };
                // The joint sits at the child's origin
                let frame_a = bone.matrix
                    * math::inverse(&skeleton.bones[parent].matrix);
                joints.push(physics.add_joint(&JointDesc {
                    body_a: bodies[parent],
                    body_b: bodies[bone.index],
                    frame_a,
                    frame_b: glm::Mat4::identity(),
                    limits,
                }));
            }
        } else {
            bodies.push(physics.add_body(&BodyDesc {
                shape: Shape::Box { half_extents: half },
                kind: BodyKind::Dynamic {
                    mass: (8.0 * half.x * half.y * half.z).max(MIN_BONE_MASS),
                },
                pose: centre * pose,
            }));
        }
        debug!(
            "Prop {} with {} bodies and {} joints",
            mesh.name,
            bodies.len(),
            joints.len()
        );

        let count = mesh.bone_count();
        let mut prop = Self {
            mesh,
            matrices: vec![glm::Mat4::identity(); bodies.len()],
            skin: vec![glm::Mat4::identity(); count],
            deltas: vec![glm::Mat4::identity(); count],
            bodies,
            joints,
            centre,
        };
        prop.update(physics);
        prop
    }

    /// Pose of the prop as a whole, taken from its root body
    #[must_use]
    pub fn pose(&self, physics: &dyn PhysicsWorld) -> glm::Mat4 {
        match &self.mesh.skeleton {
            Some(skeleton) => {
                let root = skeleton.root_bone;
                math::inverse(&skeleton.bones[root].matrix)
                    * physics.body_pose(self.bodies[root])
            }
            None => {
                math::inverse(&self.centre)
                    * physics.body_pose(self.bodies[0])
            }
        }
    }

    /// Moves every body so the prop is at `pose` with its bones back at
    /// their bind pose
    pub fn set_pose(&mut self, physics: &mut dyn PhysicsWorld, pose: &glm::Mat4) {
        match &self.mesh.skeleton {
            Some(skeleton) => {
                for (bone, body) in skeleton.bones.iter().zip(&self.bodies) {
                    physics.set_body_pose(*body, &(bone.matrix * pose));
                }
            }
            None => physics.set_body_pose(self.bodies[0], &(self.centre * pose)),
        }
        self.update(physics);
    }

    /// World matrix for drawing a bone-less prop
    #[must_use]
    pub fn world(&self) -> glm::Mat4 {
        math::inverse(&self.centre) * self.matrices[0]
    }

    /// Reads every bone's body and re-expresses it relative to its parent,
    /// starting at the root bone with an identity accumulator
    pub fn update(&mut self, physics: &dyn PhysicsWorld) {
        let Some(skeleton) = &self.mesh.skeleton else {
            self.matrices[0] = physics.body_pose(self.bodies[0]);
            return;
        };
        let mut stack = vec![(skeleton.root_bone, glm::Mat4::identity())];
        while let Some((b, acc)) = stack.pop() {
            let bone = &skeleton.bones[b];
            self.matrices[b] = physics.body_pose(self.bodies[b]);
            self.skin[b] = math::inverse(&bone.matrix) * self.matrices[b];
            let tmatrix = self.skin[b] * math::inverse(&acc);
            self.deltas[b] = tmatrix;
            for child in &bone.children {
                let bind =
                    math::get_translation(&skeleton.bones[*child].matrix);
                stack.push((*child, math::translation(&bind) * tmatrix * acc));
            }
        }
    }

    /// Removes every joint and body from the world
    pub fn release(&mut self, physics: &mut dyn PhysicsWorld) {
        for joint in self.joints.drain(..) {
            physics.remove_joint(joint);
        }
        for body in self.bodies.drain(..) {
            physics.remove_body(body);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        anim::{Bone, Skeleton},
        physics::HeadlessWorld,
        vertex::{Buffers, Vertex},
    };

    /// Two stacked unit cubes, one per bone
    fn blocks() -> Mesh {
        let mut buffers = Buffers::new();
        for bone in 0..2u32 {
            #[allow(clippy::cast_precision_loss)]
            let y = bone as f32;
            for corner in 0..8 {
                let bit = |n: u32| if corner & n == 0 { -0.4 } else { 0.4 };
                buffers.vertices.push(Vertex {
                    position: [bit(1), y + 0.5 + bit(2), bit(4)],
                    bones: [bone, 0, 0, 0],
                    weights: [1.0, 0.0, 0.0, 0.0],
                    ..Vertex::default()
                });
            }
        }
        buffers.indices.extend([0, 1, 2]);
        let root = Bone::new("root", 0, None);
        let mut top = Bone::new("top", 1, Some(0));
        top.matrix = math::translation(&glm::vec3(0.0, 1.0, 0.0));
        top.local_transform = top.matrix;
        let mut mesh = Mesh::new("blocks", buffers);
        mesh.skeleton = Some(Skeleton::new(vec![root, top]).unwrap());
        mesh.derive_bone_hulls(0.5);
        mesh
    }

    #[test]
    fn one_body_per_bone() {
        let mut physics = HeadlessWorld::new(&PhysicsConfig::default());
        let prop = Prop::new(
            &mut physics,
            Arc::new(blocks()),
            &glm::Mat4::identity(),
            &PhysicsConfig::default(),
        );
        assert_eq!(prop.bodies.len(), 2);
        assert_eq!(prop.joints.len(), 1);
        assert!(matches!(
            physics.body_shape(prop.bodies[1]),
            Some(Shape::ConvexHull(points)) if points.len() == 8
        ));
        let joint = physics.joint(prop.joints[0]).unwrap();
        assert_eq!(joint.body_a, prop.bodies[0]);
        let offset = math::get_translation(&joint.frame_a);
        assert!((offset - glm::vec3(0.0, 1.0, 0.0)).norm() < 1.0e-5);
        for skin in &prop.skin {
            assert!(math::mat_eq_eps(skin, &glm::Mat4::identity(), 1.0e-5));
        }
    }

    #[test]
    fn moved_prop_skins_every_bone() {
        let mut physics = HeadlessWorld::new(&PhysicsConfig::default());
        let mut prop = Prop::new(
            &mut physics,
            Arc::new(blocks()),
            &glm::Mat4::identity(),
            &PhysicsConfig::default(),
        );
        let to = math::translation(&glm::vec3(2.0, 0.0, -1.0));
        prop.set_pose(&mut physics, &to);
        for skin in &prop.skin {
            assert!(math::mat_eq_eps(skin, &to, 1.0e-5));
        }
        assert!(math::mat_eq_eps(&prop.pose(&physics), &to, 1.0e-5));
        // The root has nothing above it to be relative to
        assert!(math::mat_eq_eps(&prop.deltas[0], &to, 1.0e-5));
    }

    #[test]
    fn child_delta_uses_bind_translation() {
        let mut root = Bone::new("root", 0, None);
        root.matrix = math::translation(&glm::vec3(0.0, 1.0, 0.0));
        root.local_transform = root.matrix;
        // Rest offset from the parent differs from the bind position
        let mut child = Bone::new("child", 1, Some(0));
        child.matrix = math::translation(&glm::vec3(0.0, 3.0, 0.0));
        child.local_transform = math::translation(&glm::vec3(0.0, 2.0, 0.0));
        let mut mesh = Mesh::new("chain", Buffers::new());
        mesh.skeleton = Some(Skeleton::new(vec![root, child]).unwrap());

        let mut physics = HeadlessWorld::new(&PhysicsConfig::default());
        let prop = Prop::new(
            &mut physics,
            Arc::new(mesh),
            &glm::Mat4::identity(),
            &PhysicsConfig::default(),
        );
        assert!(math::mat_eq_eps(
            &prop.deltas[0],
            &glm::Mat4::identity(),
            1.0e-5
        ));
        let delta = math::get_translation(&prop.deltas[1]);
        assert!((delta - glm::vec3(0.0, -3.0, 0.0)).norm() < 1.0e-5);
    }

    #[test]
    fn boneless_mesh_is_one_box() {
        let mut buffers = Buffers::new();
        for x in [1.0, 3.0] {
            buffers.vertices.push(Vertex {
                position: [x, 0.0, 0.0],
                ..Vertex::default()
            });
        }
        buffers.vertices.push(Vertex {
            position: [1.0, 2.0, 0.0],
            ..Vertex::default()
        });
        buffers.indices.extend([0, 1, 2]);
        let mut physics = HeadlessWorld::new(&PhysicsConfig::default());
        let pose = math::translation(&glm::vec3(0.0, 5.0, 0.0));
        let prop = Prop::new(
            &mut physics,
            Arc::new(Mesh::new("plank", buffers)),
            &pose,
            &PhysicsConfig::default(),
        );
        assert_eq!(prop.bodies.len(), 1);
        assert!(prop.joints.is_empty());
        assert!(matches!(
            physics.body_shape(prop.bodies[0]),
            Some(Shape::Box { .. })
        ));
        assert!(math::mat_eq_eps(&prop.world(), &pose, 1.0e-5));
    }
}
