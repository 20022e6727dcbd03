//! Tests for skeletal pose evaluation
//!
//! Matrices are row-vector, so a global transform is the joint's local
//! transform followed by each ancestor's, ending with the root.

use log::info;
use nalgebra_glm as glm;
use ovgl::{
    anim::{
        util, Animation, AnimationInstance, Bone, Channel, Pose, QuatKey,
        Skeleton, VectorKey,
    },
    math,
};
use std::sync::Once;

const EPSILON: f32 = 0.0001f32; // Small value for float comparisons
static INIT: Once = Once::new();

/// Initializes logging in a "once per test run" manner. Call at the start of
/// each test that needs logging.
fn init_tests() {
    INIT.call_once(|| {
        env_logger::init();
    });
}

fn vkey(time: f32, x: f32) -> VectorKey {
    VectorKey {
        time,
        value: glm::vec3(x, 0.0, 0.0),
    }
}

/// Root with a child one unit above it, bind pose equal to rest pose
fn two_bones() -> Skeleton {
    let mut root = Bone::new("root", 0, None);
    root.local_transform = glm::Mat4::identity();
    let mut child = Bone::new("child", 1, Some(0));
    child.matrix = math::translation(&glm::vec3(0.0, 1.0, 0.0));
    child.local_transform = child.matrix;
    Skeleton::new(vec![root, child]).unwrap()
}

fn slide() -> Animation {
    Animation::new(
        "slide",
        vec![Channel {
            index: 1,
            positions: vec![vkey(0.0, 0.0), vkey(10.0, 10.0)],
            ..Channel::default()
        }],
    )
}

#[test]
fn animate_is_deterministic() {
    init_tests();
    let skeleton = two_bones();
    let mut animation = slide();
    animation.channels[0].rotations = vec![
        QuatKey {
            time: 0.0,
            value: glm::Quat::identity(),
        },
        QuatKey {
            time: 10.0,
            value: glm::quat_angle_axis(1.3, &glm::vec3(0.0, 0.0, 1.0)),
        },
    ];

    let mut pose = Pose::new(&skeleton);
    pose.animate(&animation, 3.7);
    let first = pose.matrices.clone();
    for _ in 0..10 {
        pose.animate(&animation, 3.7);
        assert_eq!(pose.matrices, first);
    }

    // A fresh pose reaches the same matrices
    let mut other = Pose::new(&skeleton);
    other.animate(&animation, 3.7);
    assert_eq!(other.matrices, first);
    info!("Deterministic over {} joints", first.len());
}

#[test]
fn keys_are_hit_exactly() {
    init_tests();
    let keys = [vkey(0.0, 1.5), vkey(2.0, 7.25), vkey(5.0, -3.0)];
    for key in &keys {
        let v = util::sample_vector(&keys, key.time, glm::Vec3::zeros());
        assert_eq!(v, key.value);
    }
}

#[test]
fn wraparound_with_two_keys() {
    init_tests();
    let keys = [vkey(0.0, 0.0), vkey(4.0, 8.0)];
    assert_eq!(util::bracket(&keys, 4.0), (1, 0));
    assert_eq!(util::bracket(&keys, 100.0), (1, 0));
    // The spliced pair holds the last value
    let v = util::sample_vector(&keys, 6.0, glm::Vec3::zeros());
    assert_eq!(v, keys[1].value);
}

#[test]
fn wraparound_with_four_keys() {
    init_tests();
    let keys = [
        vkey(0.0, 0.0),
        vkey(1.0, 1.0),
        vkey(2.0, 4.0),
        vkey(3.0, 9.0),
    ];
    assert_eq!(util::bracket(&keys, 1.5), (1, 2));
    assert_eq!(util::bracket(&keys, 3.0), (3, 0));
    assert_eq!(util::bracket(&keys, 3.5), (3, 0));
    let v = util::sample_vector(&keys, 3.5, glm::Vec3::zeros());
    assert_eq!(v, keys[3].value);
}

#[test]
fn three_level_chain_composes_in_order() {
    init_tests();
    let mut root = Bone::new("root", 0, None);
    root.local_transform = math::rotation_y(0.5)
        * math::translation(&glm::vec3(1.0, 0.0, 0.0));
    let mut child = Bone::new("child", 1, Some(0));
    child.local_transform = math::rotation_x(0.25)
        * math::translation(&glm::vec3(0.0, 2.0, 0.0));
    let mut grandchild = Bone::new("grandchild", 2, Some(1));
    let twist = glm::quat_angle_axis(-0.75, &glm::vec3(0.0, 0.0, 1.0));
    grandchild.local_transform = math::from_quat(&twist)
        * math::translation(&glm::vec3(0.0, 0.0, 3.0));
    let skeleton = Skeleton::new(vec![root, child, grandchild]).unwrap();

    let mut pose = Pose::new(&skeleton);
    pose.update_transforms(pose.root_joint);
    let local = |i: usize| pose.joints[i].local_transform;
    let expected = local(2) * local(1) * local(0);
    assert!(math::mat_eq_eps(
        &pose.joints[2].global_transform,
        &expected,
        EPSILON
    ));
    assert!(math::mat_eq_eps(
        &pose.joints[1].global_transform,
        &(local(1) * local(0)),
        EPSILON
    ));
}

#[test]
fn child_slides_halfway() {
    init_tests();
    let skeleton = two_bones();
    let mut pose = Pose::new(&skeleton);
    pose.animate(&slide(), 5.0);

    let local = math::get_translation(&pose.joints[1].local_transform);
    assert!(glm::length(&(local - glm::vec3(5.0, 0.0, 0.0))) < EPSILON);

    // The channel replaced the rest offset, so the skin moves the child's
    // vertices from its bind position to the animated one
    let expected = math::inverse(&skeleton.bones[1].matrix)
        * pose.joints[1].global_transform;
    assert!(math::mat_eq_eps(&pose.matrices[1], &expected, EPSILON));
    let moved = math::transform_point(
        &glm::vec3(0.0, 1.0, 0.0),
        &pose.matrices[1],
    );
    assert!(glm::length(&(moved - glm::vec3(5.0, 0.0, 0.0))) < EPSILON);

    // The root has no channel and stays at rest
    assert!(math::mat_eq_eps(
        &pose.matrices[0],
        &glm::Mat4::identity(),
        EPSILON
    ));
}

#[test]
fn looping_instance_wraps_to_start() {
    init_tests();
    let mut instance = AnimationInstance::new(std::sync::Arc::new(slide()));
    instance.play_looped();
    instance.advance(1100.0);
    assert!(instance.current_time > instance.end_time);
    instance.wrap();
    assert!((instance.current_time - instance.start_time).abs() < EPSILON);

    instance.play();
    instance.advance(1100.0);
    instance.wrap();
    assert!((instance.current_time - instance.end_time).abs() < EPSILON);
}
