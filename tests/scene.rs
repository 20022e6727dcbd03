//! Scene update tests against the headless physics and audio backends

use log::info;
use nalgebra_glm as glm;
use ovgl::{
    anim::{Animation, Bone, Channel, Skeleton, VectorKey},
    arena::Handle,
    audio::{AudioBuffer, HeadlessAudio},
    config::EngineConfig,
    gpu::HeadlessDevice,
    math,
    media::Mesh,
    physics::{HeadlessWorld, PhysicsWorld},
    render_target::{Destination, ViewRef},
    scene::{
        Actor, CameraProperties, Entity, LightKind, SceneId, CROUCH_SCALE,
        STAND_SCALE,
    },
    vertex::{Buffers, Vertex},
    EngineContext, Scene,
};
use std::sync::{Arc, Once};

const EPSILON: f32 = 0.0001f32; // Small value for float comparisons
const YAW: f32 = 0.5;
/// One unit of animation time per tick
const TICK: f32 = 100.0;
static INIT: Once = Once::new();

/// Initializes logging in a "once per test run" manner. Call at the start of
/// each test that needs logging.
fn init_tests() {
    INIT.call_once(|| {
        env_logger::init();
    });
}

fn scene() -> Scene<HeadlessWorld> {
    let config = EngineConfig::default();
    Scene::new(SceneId(1), HeadlessWorld::new(&config.physics), &config)
}

/// Two bone column: the root covers y in [0, 1] and the child [1, 2]
fn stick() -> Arc<Mesh> {
    Arc::new(stick_mesh())
}

fn stick_mesh() -> Mesh {
    let mut buffers = Buffers::new();
    for (y, bone) in [(0.0, 0), (0.9, 0), (1.1, 1), (2.0, 1)] {
        for (x, z) in [(-0.1, -0.1), (0.1, -0.1), (0.1, 0.1), (-0.1, 0.1)] {
            buffers.vertices.push(Vertex {
                position: [x, y, z],
                normal: [0.0, 1.0, 0.0],
                bones: [bone, 0, 0, 0],
                weights: [1.0, 0.0, 0.0, 0.0],
                ..Vertex::default()
            });
        }
    }
    for ring in 0..3 {
        let base = ring * 4;
        buffers.indices.extend([base, base + 1, base + 5]);
        buffers.indices.extend([base, base + 5, base + 4]);
    }

    let root = Bone::new("root", 0, None);
    let mut child = Bone::new("child", 1, Some(0));
    child.matrix = math::translation(&glm::vec3(0.0, 1.0, 0.0));
    child.local_transform = child.matrix;
    let mut mesh = Mesh::new("stick", buffers);
    mesh.skeleton = Some(Skeleton::new(vec![root, child]).unwrap());
    mesh.derive_bone_hulls(0.5);
    mesh
}

/// Moves the child bone from its rest offset along `axis`, one unit per
/// unit of animation time over [0, 10]
fn shift(name: &str, axis: glm::Vec3) -> Animation {
    let key = |time: f32| VectorKey {
        time,
        value: glm::vec3(0.0, 1.0, 0.0) + axis * time,
    };
    Animation::new(
        name,
        vec![Channel {
            index: 1,
            positions: vec![key(0.0), key(10.0)],
            ..Channel::default()
        }],
    )
}

/// Stick actor at x = 5 with `slide` and `lift` animations, turned by
/// `YAW`
fn animated_actor(scene: &mut Scene<HeadlessWorld>) -> Handle<Actor> {
    let mut mesh = stick_mesh();
    if let Some(skeleton) = mesh.skeleton.as_mut() {
        skeleton.animations = vec![
            Arc::new(shift("slide", glm::vec3(1.0, 0.0, 0.0))),
            Arc::new(shift("lift", glm::vec3(0.0, 1.0, 0.0))),
        ];
    }
    let actor = scene.add_actor(
        Arc::new(mesh),
        &glm::vec3(5.0, 0.0, 0.0),
        CameraProperties::default(),
    );
    scene.actor_mut(actor).unwrap().look_direction.z = YAW;
    actor
}

/// Skin of a bone moved by `offset` with the actor placed on top
fn placed(offset: glm::Vec3) -> glm::Mat4 {
    math::translation(&offset)
        * math::rotation_y(YAW)
        * math::translation(&glm::vec3(5.0, 0.0, 0.0))
}

#[test]
#[allow(clippy::float_cmp)]
fn crouch_scale_is_clamped() {
    init_tests();
    let mut scene = scene();
    let mut audio = HeadlessAudio::new();
    let actor = scene.add_actor(
        stick(),
        &glm::Vec3::zeros(),
        CameraProperties::default(),
    );
    let character = scene.actors().get(actor).unwrap().character;

    scene.actor_mut(actor).unwrap().crouch = true;
    let mut last = STAND_SCALE;
    for _ in 0..100 {
        scene.update_with(&mut audio, &[], 16.0);
        let scale = scene.physics.character_scale(character).unwrap();
        assert!(scale <= last);
        assert!(scale >= CROUCH_SCALE);
        last = scale;
    }
    assert_eq!(last, CROUCH_SCALE);

    scene.actor_mut(actor).unwrap().crouch = false;
    for _ in 0..100 {
        scene.update_with(&mut audio, &[], 16.0);
        let scale = scene.physics.character_scale(character).unwrap();
        assert!(scale >= last);
        assert!(scale <= STAND_SCALE);
        last = scale;
    }
    assert_eq!(last, STAND_SCALE);
    assert_eq!(scene.actors().get(actor).unwrap().crouch_scale, STAND_SCALE);
}

#[test]
fn animation_wraps_or_holds_at_the_end() {
    init_tests();
    let mut scene = scene();
    let mut audio = HeadlessAudio::new();
    let actor = animated_actor(&mut scene);
    {
        let actor = scene.actor_mut(actor).unwrap();
        let slide = actor.add_animation("slide").unwrap();
        actor.animations[slide].play_looped();
    }
    let skin = |scene: &Scene<HeadlessWorld>, b: usize| {
        scene.actors().get(actor).unwrap().pose.matrices[b]
    };
    let time = |scene: &Scene<HeadlessWorld>| {
        scene.actors().get(actor).unwrap().animations[0].current_time
    };

    // Each tick evaluates the current time and then advances it
    for _ in 0..4 {
        scene.update_with(&mut audio, &[], TICK);
    }
    let x = glm::vec3(1.0, 0.0, 0.0);
    assert!(math::mat_eq_eps(&skin(&scene, 1), &placed(x * 3.0), EPSILON));
    assert!((time(&scene) - 4.0).abs() < EPSILON);
    // The root has no channel and only gets the placement
    assert!(math::mat_eq_eps(
        &skin(&scene, 0),
        &placed(glm::Vec3::zeros()),
        EPSILON
    ));

    // Up to the last key, then past the end
    for _ in 0..7 {
        scene.update_with(&mut audio, &[], TICK);
    }
    assert!(math::mat_eq_eps(&skin(&scene, 1), &placed(x * 10.0), EPSILON));
    assert!((time(&scene) - 11.0).abs() < EPSILON);
    scene.update_with(&mut audio, &[], TICK);
    assert!(math::mat_eq_eps(&skin(&scene, 1), &placed(x * 0.0), EPSILON));
    assert!((time(&scene) - 1.0).abs() < EPSILON);

    // Played once it holds the last key
    scene.actor_mut(actor).unwrap().animations[0].play();
    for _ in 0..15 {
        scene.update_with(&mut audio, &[], TICK);
    }
    assert!(math::mat_eq_eps(&skin(&scene, 1), &placed(x * 10.0), EPSILON));
    assert!((time(&scene) - 11.0).abs() < EPSILON);

    // Stopped instances are still shown but no longer advance
    scene.actor_mut(actor).unwrap().animations[0].stop();
    scene.update_with(&mut audio, &[], TICK);
    assert!((time(&scene) - 10.0).abs() < EPSILON);
}

#[test]
fn last_animation_instance_wins() {
    init_tests();
    let mut scene = scene();
    let mut audio = HeadlessAudio::new();
    let actor = animated_actor(&mut scene);
    {
        let actor = scene.actor_mut(actor).unwrap();
        for name in ["slide", "lift"] {
            let i = actor.add_animation(name).unwrap();
            actor.animations[i].play_looped();
        }
    }
    for _ in 0..4 {
        scene.update_with(&mut audio, &[], TICK);
    }
    let skin = |scene: &Scene<HeadlessWorld>| {
        scene.actors().get(actor).unwrap().pose.matrices[1]
    };
    let y = glm::vec3(0.0, 3.0, 0.0);
    assert!(math::mat_eq_eps(&skin(&scene), &placed(y), EPSILON));

    // Without the later instance the earlier one shows through
    scene.actor_mut(actor).unwrap().animations.pop();
    scene.update_with(&mut audio, &[], TICK);
    let x = glm::vec3(4.0, 0.0, 0.0);
    assert!(math::mat_eq_eps(&skin(&scene), &placed(x), EPSILON));
}

#[test]
fn substeps_are_bounded() {
    init_tests();
    let mut scene = scene();
    let mut audio = HeadlessAudio::new();
    for update_time in [100.0, 1000.0, 5000.0, 60_000.0] {
        scene.update_with(&mut audio, &[], update_time);
    }
    let budgets: Vec<_> =
        scene.physics.steps.iter().map(|s| s.max_sub_steps).collect();
    assert_eq!(budgets, vec![20, 200, 200, 200]);
    for step in &scene.physics.steps {
        assert!(step.sub_steps <= step.max_sub_steps);
    }
}

#[test]
fn removal_releases_physics() {
    init_tests();
    let mut scene = scene();
    let mut audio = HeadlessAudio::new();
    let at = math::translation(&glm::vec3(0.0, 3.0, 0.0));

    let object = scene.add_object(stick(), &glm::Mat4::identity());
    let light = scene.add_light(LightKind::Directional, [1.0; 3], &at);
    let prop = scene.add_prop(stick(), &at);
    let emitter = scene.add_emitter(&at);
    let actor = scene.add_actor(
        stick(),
        &glm::vec3(5.0, 0.0, 0.0),
        CameraProperties::default(),
    );
    assert_eq!(scene.props().get(prop).unwrap().bodies.len(), 2);
    assert_eq!(scene.physics.joint_count(), 1);

    let constraint = scene
        .add_constraint(
            Entity::Object(object),
            Entity::Prop(prop),
            &glm::Mat4::identity(),
            &glm::Mat4::identity(),
        )
        .unwrap();
    assert_eq!(scene.physics.joint_count(), 2);
    assert!(scene
        .add_constraint(
            Entity::Actor(actor),
            Entity::Prop(prop),
            &glm::Mat4::identity(),
            &glm::Mat4::identity(),
        )
        .is_none());

    // The constraint goes with the prop's bodies
    assert!(scene.remove_prop(prop));
    assert!(scene.constraints().get(constraint).is_none());
    assert_eq!(scene.physics.joint_count(), 0);
    assert!(!scene.remove_prop(prop));
    assert!(scene.pose(Entity::Prop(prop)).is_none());

    assert!(scene.remove_object(object));
    assert!(scene.remove_light(light));
    assert!(scene.remove_emitter(emitter));
    // Takes its camera along
    assert!(scene.remove_actor(&mut audio, actor));
    assert_eq!(scene.cameras().len(), 0);

    assert_eq!(scene.entity_count(), 0);
    assert_eq!(scene.physics.body_count(), 0);
    assert_eq!(scene.physics.character_count(), 0);
}

#[test]
fn clear_stops_every_voice() {
    init_tests();
    let mut scene = scene();
    let mut audio = HeadlessAudio::new();
    let camera = scene.add_camera(
        CameraProperties::default(),
        &glm::Mat4::identity(),
    );
    let buffer = AudioBuffer::default();
    scene.play_voice(&mut audio, camera, &buffer, None, true);
    scene.play_voice(&mut audio, camera, &buffer, None, false);
    scene.add_prop(stick(), &glm::Mat4::identity());
    assert_eq!(audio.voice_count(), 2);

    scene.clear(&mut audio);
    assert_eq!(audio.voice_count(), 0);
    assert_eq!(scene.entity_count(), 0);
    assert_eq!(scene.physics.body_count(), 0);
    assert_eq!(scene.physics.joint_count(), 0);
}

#[test]
fn finished_one_shot_voices_are_released() {
    init_tests();
    let mut scene = scene();
    let mut audio = HeadlessAudio::new();
    let camera = scene.add_camera(
        CameraProperties::default(),
        &glm::Mat4::identity(),
    );
    let buffer = AudioBuffer::default();
    let shots: Vec<_> = (0..100)
        .filter_map(|_| {
            scene.play_voice(&mut audio, camera, &buffer, None, false)
        })
        .collect();
    let music = scene
        .play_voice(&mut audio, camera, &buffer, None, true)
        .unwrap();
    let held = |scene: &Scene<HeadlessWorld>| {
        scene.cameras().get(camera).unwrap().voices.len()
    };

    // Still playing, so nothing is released
    scene.update_with(&mut audio, &[camera], 16.0);
    assert_eq!(held(&scene), 101);

    for voice in &shots {
        audio.finish(*voice);
    }
    scene.update_with(&mut audio, &[camera], 16.0);
    assert_eq!(held(&scene), 1);
    assert_eq!(audio.voice_count(), 1);

    // A stopped looping voice is kept for the caller to restart
    audio.finish(music);
    scene.update_with(&mut audio, &[], 16.0);
    assert_eq!(held(&scene), 1);
    assert_eq!(audio.voice_count(), 1);
}

#[test]
fn view_cameras_place_listener_and_voices() {
    init_tests();
    let mut scene = scene();
    let mut audio = HeadlessAudio::new();
    let camera = scene.add_camera(
        CameraProperties::default(),
        &math::translation(&glm::vec3(1.0, 2.0, 3.0)),
    );
    let other = scene.add_camera(
        CameraProperties::default(),
        &glm::Mat4::identity(),
    );
    let emitter =
        scene.add_emitter(&math::translation(&glm::vec3(-4.0, 0.0, 0.0)));
    let buffer = AudioBuffer::default();
    let follows = scene
        .play_voice(&mut audio, camera, &buffer, Some(emitter), true)
        .unwrap();
    let fixed = scene
        .play_voice(&mut audio, camera, &buffer, None, true)
        .unwrap();
    scene.play_voice(&mut audio, other, &buffer, None, true);

    // Not a view yet, so nothing is placed
    scene.update_with(&mut audio, &[], 16.0);
    assert_eq!(audio.listener_updates, 0);

    scene.update_with(&mut audio, &[camera], 16.0);
    assert_eq!(audio.listener_updates, 1);
    let listener = audio.listener.unwrap();
    let near = |a: glm::Vec3, b: glm::Vec3| glm::length(&(a - b)) < EPSILON;
    assert!(near(listener.position, glm::vec3(1.0, 2.0, 3.0)));
    let placed = audio.voice_placement(follows).unwrap();
    assert!(near(placed.position, glm::vec3(-4.0, 0.0, 0.0)));
    assert!(audio.voice_placement(fixed).is_none());

    // Removing the emitter leaves the voice where it was
    assert!(scene.remove_emitter(emitter));
    scene.update_with(&mut audio, &[camera], 16.0);
    assert_eq!(audio.voice_placement(follows), Some(placed));
}

#[test]
fn ray_finds_the_entity() {
    init_tests();
    let mut scene = scene();
    let object = scene.add_object(
        stick(),
        &math::translation(&glm::vec3(0.0, 0.0, 5.0)),
    );
    let (hit, entity) = scene
        .ray_test(&glm::vec3(0.0, 1.0, 0.0), &glm::vec3(0.0, 1.0, 10.0))
        .unwrap();
    assert_eq!(entity, Some(Entity::Object(object)));
    assert!(hit.point.z < 5.0);
    assert!(scene
        .ray_test(&glm::vec3(9.0, 9.0, 0.0), &glm::vec3(9.0, 9.0, 10.0))
        .is_none());
}

#[test]
fn context_drives_update_and_render() {
    init_tests();
    let mut ctx = EngineContext::new(
        EngineConfig::default(),
        Box::new(HeadlessDevice::new()),
        Box::new(HeadlessAudio::new()),
    )
    .unwrap();
    let physics = HeadlessWorld::new(&ctx.config.physics);
    let mut scene = ctx.create_scene(physics);
    let camera = scene.add_camera(
        CameraProperties::default(),
        &glm::Mat4::identity(),
    );
    scene.add_object(stick(), &glm::Mat4::identity());

    let target = ctx.create_render_target(Destination::Window, 320, 200);
    assert!(ctx.views(scene.id()).is_empty());
    ctx.render_target_mut(target).unwrap().view = Some(ViewRef {
        scene: scene.id(),
        camera,
    });
    assert_eq!(ctx.views(scene.id()), vec![camera]);

    scene.update(&mut ctx, 16.0);
    assert_eq!(scene.physics.steps.len(), 1);
    assert!(ctx.render(target, &scene));
    ctx.render_all(&scene);

    assert!(ctx.remove_render_target(target));
    assert!(!ctx.render(target, &scene));
    ctx.release();
    info!("Rendered scene {:?}", scene.id());
}
