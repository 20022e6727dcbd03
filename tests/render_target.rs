//! Compositor tests. The headless device records every call, so these check
//! the order of passes and the handles they use.

use log::info;
use nalgebra_glm as glm;
use ovgl::{
    config::{EngineConfig, RenderConfig},
    gpu::{
        Command, GraphicsDevice, HeadlessDevice, Pass, ResourceKind,
        TextureDesc, TextureFormat,
    },
    math,
    media::{mesh, MediaLibrary, Mesh},
    physics::HeadlessWorld,
    render_target::{
        Destination, Interface, Rect, RenderTarget, ViewRef, BLOOM_PASSES,
    },
    scene::{CameraProperties, Entity, SceneId},
    vertex::Buffers,
    Scene,
};
use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes logging in a "once per test run" manner. Call at the start of
/// each test that needs logging.
fn init_tests() {
    INIT.call_once(|| {
        env_logger::init();
    });
}

fn triangle(name: &str) -> Mesh {
    let mut buffers = Buffers::new();
    for p in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
        buffers.vertices.push(mesh::vertex(p, [0.0, 0.0, 1.0], [0.0; 2]));
    }
    buffers.indices.extend([0, 1, 2]);
    Mesh::new(name, buffers)
}

/// Config with every post-process pass off
fn plain() -> RenderConfig {
    RenderConfig {
        multi_sample: true,
        samples: 4,
        bloom: 0.0,
        auto_luminance: false,
        motion_blur: false,
    }
}

struct Fixture {
    device: HeadlessDevice,
    media: MediaLibrary,
    scene: Scene<HeadlessWorld>,
    target: RenderTarget,
}

fn output_texture(device: &mut HeadlessDevice, size: u32) -> Destination {
    Destination::Texture(device.create_texture(
        &TextureDesc {
            width: size,
            height: size,
            format: TextureFormat::Rgba8,
            mipmaps: false,
        },
        None,
    ))
}

impl Fixture {
    /// Window target, or a texture target when `texture` is set
    fn new(texture: bool, config: &RenderConfig) -> Self {
        let mut device = HeadlessDevice::new();
        let destination = if texture {
            output_texture(&mut device, 256)
        } else {
            Destination::Window
        };
        let media = MediaLibrary::new(&mut device).unwrap();
        let engine = EngineConfig::default();
        let mut scene = Scene::new(
            SceneId(7),
            HeadlessWorld::new(&engine.physics),
            &engine,
        );
        let camera = scene.add_camera(
            CameraProperties::default(),
            &glm::Mat4::identity(),
        );
        let mut target =
            RenderTarget::new(&mut device, destination, 320, 240, config);
        target.view = Some(ViewRef {
            scene: scene.id(),
            camera,
        });
        Self {
            device,
            media,
            scene,
            target,
        }
    }

    fn render(&mut self) -> Vec<Command> {
        self.device.commands.clear();
        self.target
            .render(&mut self.device, &mut self.media, &self.scene);
        self.device.commands.clone()
    }
}

fn passes(commands: &[Command]) -> Vec<Pass> {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::Pass { pass, .. } => Some(*pass),
            _ => None,
        })
        .collect()
}

#[test]
fn resize_twice_does_not_leak() {
    init_tests();
    let mut device = HeadlessDevice::new();
    let window = Destination::Window;
    let mut target =
        RenderTarget::new(&mut device, window, 640, 480, &plain());
    let kinds = [
        ResourceKind::Texture,
        ResourceKind::Renderbuffer,
        ResourceKind::Framebuffer,
    ];
    let counts = |d: &HeadlessDevice| kinds.map(|k| d.live_count(k));
    let before = counts(&device);

    target.resize(&mut device, 640, 480);
    target.resize(&mut device, 640, 480);
    assert_eq!(counts(&device), before);
    assert_eq!(device.bad_deletes, 0);
    assert_eq!(target.size(), (640, 480));
    let ms = target.multisample_framebuffer();
    assert_eq!(device.framebuffer_size(ms), Some((640, 480)));
    let primary = target.primary_texture();
    assert_eq!(device.texture_size(primary), Some((640, 480)));

    target.resize(&mut device, 1024, 768);
    let ms = target.multisample_framebuffer();
    assert_eq!(device.framebuffer_size(ms), Some((1024, 768)));
    assert_eq!(counts(&device), before);

    target.release(&mut device);
    target.release(&mut device);
    assert_eq!(device.live_total(), 0);
    assert_eq!(device.bad_deletes, 0);
}

#[test]
fn multisampling_follows_the_effect_on_resize() {
    init_tests();
    let mut device = HeadlessDevice::new();
    let config = RenderConfig {
        multi_sample: false,
        samples: 8,
        ..plain()
    };
    let mut target =
        RenderTarget::new(&mut device, Destination::Window, 64, 64, &config);
    assert_eq!(target.samples(), 1);
    assert_eq!(device.renderbuffer_samples(), vec![1, 1]);

    // Takes effect at the next rebuild
    target.effects.multi_sample = true;
    assert_eq!(target.samples(), 1);
    target.resize(&mut device, 64, 64);
    assert_eq!(target.samples(), 8);
    assert_eq!(device.renderbuffer_samples(), vec![8, 8]);

    target.effects.multi_sample = false;
    target.resize(&mut device, 64, 64);
    assert_eq!(device.renderbuffer_samples(), vec![1, 1]);
    target.release(&mut device);
    assert!(device.renderbuffer_samples().is_empty());
}

#[test]
fn texture_destination_keeps_its_texture() {
    init_tests();
    let mut device = HeadlessDevice::new();
    let destination = output_texture(&mut device, 256);
    let Destination::Texture(output) = destination else {
        unreachable!()
    };
    let mut target =
        RenderTarget::new(&mut device, destination, 256, 256, &plain());
    target.resize(&mut device, 128, 128);
    target.release(&mut device);
    // Only the destination texture is left and it is the caller's
    assert_eq!(device.live_total(), 1);
    assert_eq!(device.texture_size(output), Some((256, 256)));
    assert_eq!(device.bad_deletes, 0);
}

#[test]
fn opaque_geometry_is_drawn_first() {
    init_tests();
    let mut f = Fixture::new(false, &plain());
    let effect = f.media.default_effect();
    let glass = f.media.create_material("glass", effect);
    f.media.material_mut(glass).unwrap().post_render = true;

    let mut clear_mesh = triangle("window pane");
    clear_mesh.materials = vec![glass];
    let clear_mesh = f.media.add_mesh(&mut f.device, clear_mesh);
    let solid = f.media.add_mesh(&mut f.device, triangle("wall"));
    // Added in the opposite order to the one they must be drawn in
    f.scene.add_object(clear_mesh.clone(), &glm::Mat4::identity());
    f.scene.add_object(solid.clone(), &glm::Mat4::identity());

    let commands = f.render();
    let draws: Vec<_> = commands
        .iter()
        .filter_map(|c| match c {
            Command::Draw { vertex_buffer, .. } => Some(*vertex_buffer),
            _ => None,
        })
        .collect();
    assert_eq!(draws, vec![solid.vertex_buffer, clear_mesh.vertex_buffer]);

    let ms = f.target.multisample_framebuffer();
    assert_eq!(commands[0], Command::BindFramebuffer(Some(ms)));
    assert!(commands.contains(&Command::Clear {
        colour: true,
        depth: true
    }));
    let blit = commands
        .iter()
        .position(|c| matches!(c, Command::Blit { from, .. } if *from == ms))
        .unwrap();
    let last_draw = commands
        .iter()
        .rposition(|c| matches!(c, Command::Draw { .. }))
        .unwrap();
    assert!(blit > last_draw);

    // Composited onto the window from the primary texture
    assert!(commands.contains(&Command::BindFramebuffer(None)));
    assert_eq!(
        commands.last(),
        Some(&Command::Pass {
            pass: Pass::Copy,
            input: f.target.primary_texture(),
        })
    );
}

#[test]
fn skybox_replaces_colour_clear() {
    init_tests();
    let mut f = Fixture::new(false, &plain());
    let sky = f.media.load_texture(&mut f.device, "").unwrap();
    f.scene.skybox = Some(sky);
    let commands = f.render();
    let clear = commands
        .iter()
        .position(|c| {
            *c == Command::Clear {
                colour: false,
                depth: true,
            }
        })
        .unwrap();
    assert_eq!(commands[clear + 1], Command::Skybox(sky));
}

#[test]
fn luminance_follows_the_frame_slowly() {
    init_tests();
    let config = RenderConfig {
        auto_luminance: true,
        ..plain()
    };
    let mut f = Fixture::new(false, &config);
    f.device.luminance = 0.0;
    let commands = f.render();
    assert!((f.target.luminance() - 0.99).abs() < 1.0e-6);
    let primary = f.target.primary_texture();
    assert!(commands.contains(&Command::Mipmaps(primary)));
    assert!(passes(&commands)
        .iter()
        .any(|p| matches!(p, Pass::Brightness { .. })));

    for _ in 0..1000 {
        f.render();
    }
    assert!((f.target.luminance() - 0.5).abs() < 1.0e-6);
}

#[test]
fn bloom_runs_every_direction_pair() {
    init_tests();
    let config = RenderConfig {
        bloom: 2.0,
        ..plain()
    };
    let mut f = Fixture::new(false, &config);
    let all = passes(&f.render());
    let blurs = all
        .iter()
        .filter(|p| matches!(p, Pass::Blur { .. }))
        .count();
    assert_eq!(blurs, 2 * BLOOM_PASSES);
    assert_eq!(all.iter().filter(|p| **p == Pass::Additive).count(), 1);
}

#[test]
fn motion_blur_needs_camera_motion() {
    init_tests();
    let config = RenderConfig {
        motion_blur: true,
        ..plain()
    };
    let motion = |texture| {
        let mut f = Fixture::new(texture, &config);
        let still = passes(&f.render());
        let again = passes(&f.render());
        for p in still.iter().chain(&again) {
            assert!(!matches!(p, Pass::MotionBlur { .. }));
        }
        let camera = f.target.view.unwrap().camera;
        f.scene
            .set_pose(Entity::Camera(camera), &math::rotation_y(0.2));
        let moved = passes(&f.render());
        assert!(moved.iter().any(|p| matches!(p, Pass::MotionBlur { .. })));
        f.target.motion()
    };

    let window = motion(false);
    let texture = motion(true);
    info!("Motion {:?} on a window, {:?} on a texture", window, texture);
    assert!(window.x.abs() > 0.0);
    assert!(texture.x.abs() > window.x.abs());
}

#[test]
fn nothing_is_drawn_without_a_view() {
    init_tests();
    let mut f = Fixture::new(false, &plain());
    let view = f.target.view.take().unwrap();
    assert!(f.render().is_empty());

    f.target.view = Some(ViewRef {
        scene: SceneId(99),
        ..view
    });
    assert!(f.render().is_empty());
}

#[test]
fn interfaces_draw_over_the_image() {
    init_tests();
    let mut f = Fixture::new(false, &plain());
    f.target.rect = Rect::new(0.0, 0.0, 0.5, 1.0);
    let mut hud = Interface::new(Rect::new(10.0, 10.0, 0.25, 0.25));
    hud.add_child(Interface::new(Rect::FULL));
    f.target.interfaces.push(hud);

    let commands = f.render();
    let copy = commands
        .iter()
        .rposition(|c| matches!(c, Command::Pass { pass: Pass::Copy, .. }))
        .unwrap();
    let rects = commands
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, Command::Rect { .. }))
        .map(|(i, _)| i)
        .collect::<Vec<_>>();
    assert_eq!(rects.len(), 2);
    assert!(rects.iter().all(|i| *i > copy));
}
