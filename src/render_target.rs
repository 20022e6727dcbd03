//! Multi-pass compositor drawing one scene camera into a window or texture.
//!
//! Geometry is drawn into a multisampled framebuffer, resolved into the
//! single sample "primary" texture and post-processed there before being
//! composited onto the destination with the UI on top.
mod interface;
mod postprocess;

pub use interface::{Interface, Rect};
pub use postprocess::{
    bloom_directions, camera_motion, smooth_luminance, Effects, BLOOM_PASSES,
    TEXTURE_MOTION_DIVISOR, WINDOW_MOTION_DIVISOR,
};

use crate::{
    arena::Handle,
    config::RenderConfig,
    gpu::{
        Attachment, DrawCall, FramebufferHandle, GraphicsDevice, LightBlock,
        Pass, RenderbufferHandle, TextureDesc, TextureFormat, TextureHandle,
        Viewport,
    },
    media::{MaterialHandle, MediaLibrary, Mesh},
    physics::PhysicsWorld,
    scene::{Camera, Scene, SceneId},
};
use log::{debug, trace, warn};
use nalgebra_glm as glm;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Destination {
    /// The window's back buffer
    Window,
    Texture(TextureHandle),
}

/// Camera a render target draws from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewRef {
    pub scene: SceneId,
    pub camera: Handle<Camera>,
}

/// Every device resource of a render target. Unallocated handles are the
/// default value.
#[derive(Clone, Copy, Debug, Default)]
struct Resources {
    colour_buffer: RenderbufferHandle,
    depth_buffer: RenderbufferHandle,
    multisample_fb: FramebufferHandle,
    primary: TextureHandle,
    effect_fb: FramebufferHandle,
    secondary: TextureHandle,
    secondary_fb: FramebufferHandle,
    bloom: TextureHandle,
    bloom_fb: FramebufferHandle,
    bloom_swap: TextureHandle,
    bloom_swap_fb: FramebufferHandle,
    output_fb: FramebufferHandle,
}

impl Resources {
    fn create(
        device: &mut dyn GraphicsDevice,
        destination: Destination,
        width: u32,
        height: u32,
        samples: u32,
    ) -> Self {
        let colour_buffer = device.create_renderbuffer(
            width,
            height,
            TextureFormat::Rgba16F,
            samples,
        );
        let depth_buffer = device.create_renderbuffer(
            width,
            height,
            TextureFormat::Depth24,
            samples,
        );
        let multisample_fb = device.create_framebuffer(
            Attachment::Renderbuffer(colour_buffer),
            Some(depth_buffer),
        );
        let mut target = |w: u32, h: u32, mipmaps: bool| {
            let texture = device.create_texture(
                &TextureDesc {
                    width: w,
                    height: h,
                    format: TextureFormat::Rgba16F,
                    mipmaps,
                },
                None,
            );
            let fb =
                device.create_framebuffer(Attachment::Texture(texture), None);
            (texture, fb)
        };
        let (primary, effect_fb) = target(width, height, true);
        let (secondary, secondary_fb) = target(width, height, false);
        let (bw, bh) = bloom_size(width, height);
        let (bloom, bloom_fb) = target(bw, bh, false);
        let (bloom_swap, bloom_swap_fb) = target(bw, bh, false);
        let output_fb = match destination {
            Destination::Window => FramebufferHandle::default(),
            Destination::Texture(texture) => {
                device.create_framebuffer(Attachment::Texture(texture), None)
            }
        };
        Self {
            colour_buffer,
            depth_buffer,
            multisample_fb,
            primary,
            effect_fb,
            secondary,
            secondary_fb,
            bloom,
            bloom_fb,
            bloom_swap,
            bloom_swap_fb,
            output_fb,
        }
    }

    /// Frees every allocated handle and leaves all of them unallocated
    fn release(&mut self, device: &mut dyn GraphicsDevice) {
        for fb in [
            self.multisample_fb,
            self.effect_fb,
            self.secondary_fb,
            self.bloom_fb,
            self.bloom_swap_fb,
            self.output_fb,
        ] {
            if fb.is_allocated() {
                device.delete_framebuffer(fb);
            }
        }
        for rb in [self.colour_buffer, self.depth_buffer] {
            if rb.is_allocated() {
                device.delete_renderbuffer(rb);
            }
        }
        let textures =
            [self.primary, self.secondary, self.bloom, self.bloom_swap];
        for texture in textures {
            if texture.is_allocated() {
                device.delete_texture(texture);
            }
        }
        *self = Self::default();
    }
}

fn bloom_size(width: u32, height: u32) -> (u32, u32) {
    (
        (width / postprocess::BLOOM_DOWNSAMPLE).max(1),
        (height / postprocess::BLOOM_DOWNSAMPLE).max(1),
    )
}

#[allow(clippy::cast_precision_loss)]
fn full_viewport(width: u32, height: u32) -> Viewport {
    Viewport {
        x: 0.0,
        y: 0.0,
        width: width as f32,
        height: height as f32,
    }
}

pub struct RenderTarget {
    destination: Destination,
    width: u32,
    height: u32,
    /// Sample count used while `effects.multi_sample` is on
    max_samples: u32,
    samples: u32,
    /// Where the final image lands on the destination
    pub rect: Rect,
    pub view: Option<ViewRef>,
    pub effects: Effects,
    pub interfaces: Vec<Interface>,
    resources: Resources,
    luminance: f32,
    previous_view: Option<glm::Mat4>,
    motion: glm::Vec2,
}

impl RenderTarget {
    #[must_use]
    pub fn new(
        device: &mut dyn GraphicsDevice,
        destination: Destination,
        width: u32,
        height: u32,
        config: &RenderConfig,
    ) -> Self {
        let mut target = Self {
            destination,
            width: 0,
            height: 0,
            max_samples: config.samples.max(1),
            samples: 1,
            rect: Rect::FULL,
            view: None,
            effects: Effects::from(config),
            interfaces: Vec::new(),
            resources: Resources::default(),
            luminance: postprocess::MAX_LUMINANCE,
            previous_view: None,
            motion: glm::Vec2::zeros(),
        };
        target.resize(device, width, height);
        target
    }

    /// Recreates every device resource at the new size. There is no partial
    /// path; calling it again with the same size frees and recreates
    /// everything. The multisample buffers follow `effects.multi_sample` as
    /// it is at this call.
    pub fn resize(
        &mut self,
        device: &mut dyn GraphicsDevice,
        width: u32,
        height: u32,
    ) {
        self.resources.release(device);
        self.width = width.max(1);
        self.height = height.max(1);
        self.samples = if self.effects.multi_sample {
            self.max_samples
        } else {
            1
        };
        self.resources = Resources::create(
            device,
            self.destination,
            self.width,
            self.height,
            self.samples,
        );
        self.previous_view = None;
        debug!("Render target resized to {}x{}", self.width, self.height);
    }

    /// Frees every device resource. The target must be resized before it
    /// is rendered again.
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        self.resources.release(device);
    }

    #[must_use]
    pub const fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Samples per pixel of the multisample buffers
    #[must_use]
    pub const fn samples(&self) -> u32 {
        self.samples
    }

    #[must_use]
    pub const fn destination(&self) -> Destination {
        self.destination
    }

    /// Framebuffer geometry is drawn into
    #[must_use]
    pub const fn multisample_framebuffer(&self) -> FramebufferHandle {
        self.resources.multisample_fb
    }

    /// Single sample texture holding the post-processed image
    #[must_use]
    pub const fn primary_texture(&self) -> TextureHandle {
        self.resources.primary
    }

    #[must_use]
    pub const fn luminance(&self) -> f32 {
        self.luminance
    }

    #[must_use]
    pub const fn motion(&self) -> glm::Vec2 {
        self.motion
    }

    /// Motion blur is scaled down more for windows than for textures
    #[must_use]
    pub const fn motion_divisor(&self) -> f32 {
        match self.destination {
            Destination::Window => WINDOW_MOTION_DIVISOR,
            Destination::Texture(_) => TEXTURE_MOTION_DIVISOR,
        }
    }

    /// Draws the view camera's scene, post-processes it and composites it
    /// with the UI. Does nothing without a view or if the view belongs to
    /// another scene.
    pub fn render<P: PhysicsWorld>(
        &mut self,
        device: &mut dyn GraphicsDevice,
        media: &mut MediaLibrary,
        scene: &Scene<P>,
    ) {
        let Some(view) = self.view else {
            return;
        };
        if view.scene != scene.id() {
            warn!("View of {:?} rendered with {:?}", view.scene, scene.id());
            return;
        }
        let Some(camera) = scene.cameras().get(view.camera) else {
            warn!("View camera {:?} no longer exists", view.camera);
            return;
        };
        let view_matrix =
            Camera::view_matrix(&scene.physics.body_pose(camera.body));
        let projection = camera.projection();
        let full = full_viewport(self.width, self.height);
        let r = self.resources;

        device.bind_framebuffer(Some(r.multisample_fb));
        device.set_viewport(&full);
        device.clear(scene.skybox.is_none(), true);
        if let Some(skybox) = scene.skybox {
            device.draw_skybox(skybox, &view_matrix, &projection);
        }
        device.set_multisample(self.effects.multi_sample);
        let frame = Frame {
            view: view_matrix,
            projection,
            lights: scene.light_block(&view_matrix),
        };
        // Every opaque material first, then every post-render material
        for post_render in [false, true] {
            draw_scene(device, media, scene, &frame, post_render);
        }

        device.blit(r.multisample_fb, r.effect_fb, self.width, self.height);

        if self.effects.auto_luminance {
            self.auto_luminance(device);
        }
        if self.effects.bloom > 0.0 {
            self.bloom(device);
        }
        if self.effects.motion_blur {
            self.motion_blur(device, &view_matrix);
        }
        self.previous_view = Some(view_matrix);

        let output = match self.destination {
            Destination::Window => None,
            Destination::Texture(_) => Some(r.output_fb),
        };
        let viewport = self.rect.resolve(&full);
        device.bind_framebuffer(output);
        device.set_viewport(&viewport);
        device.fullscreen_pass(&Pass::Copy, r.primary);
        for interface in &self.interfaces {
            interface.render(device, &viewport);
        }
    }

    /// Runs `pass` on the primary texture through the secondary one
    fn through_secondary(
        &self,
        device: &mut dyn GraphicsDevice,
        pass: &Pass,
    ) {
        let r = &self.resources;
        device.bind_framebuffer(Some(r.secondary_fb));
        device.fullscreen_pass(pass, r.primary);
        device.bind_framebuffer(Some(r.effect_fb));
        device.fullscreen_pass(&Pass::Copy, r.secondary);
    }

    fn auto_luminance(&mut self, device: &mut dyn GraphicsDevice) {
        device.generate_mipmaps(self.resources.primary);
        let average = device.average_luminance(self.resources.primary);
        self.luminance = smooth_luminance(self.luminance, average);
        trace!("Luminance {} from average {}", self.luminance, average);
        self.through_secondary(
            device,
            &Pass::Brightness {
                luminance: self.luminance,
            },
        );
    }

    fn bloom(&self, device: &mut dyn GraphicsDevice) {
        let r = &self.resources;
        let (bw, bh) = bloom_size(self.width, self.height);
        device.bind_framebuffer(Some(r.bloom_fb));
        device.set_viewport(&full_viewport(bw, bh));
        device.fullscreen_pass(&Pass::Copy, r.primary);
        for (a, b) in bloom_directions(self.effects.bloom) {
            let magnitude = self.effects.bloom;
            device.bind_framebuffer(Some(r.bloom_swap_fb));
            device.fullscreen_pass(
                &Pass::Blur {
                    direction: a,
                    magnitude,
                },
                r.bloom,
            );
            device.bind_framebuffer(Some(r.bloom_fb));
            device.fullscreen_pass(
                &Pass::Blur {
                    direction: b,
                    magnitude,
                },
                r.bloom_swap,
            );
        }
        device.bind_framebuffer(Some(r.effect_fb));
        device.set_viewport(&full_viewport(self.width, self.height));
        device.fullscreen_pass(&Pass::Additive, r.bloom);
    }

    fn motion_blur(
        &mut self,
        device: &mut dyn GraphicsDevice,
        view: &glm::Mat4,
    ) {
        let Some(previous) = self.previous_view else {
            return;
        };
        self.motion = camera_motion(&previous, view, self.motion_divisor());
        if self.motion == glm::Vec2::zeros() {
            return;
        }
        self.through_secondary(
            device,
            &Pass::MotionBlur {
                motion: self.motion,
            },
        );
    }
}

/// Camera state shared by every draw of a frame
struct Frame {
    view: glm::Mat4,
    projection: glm::Mat4,
    lights: LightBlock,
}

/// Objects, then props, then actors, drawing only subsets whose material
/// matches `post_render`
fn draw_scene<P: PhysicsWorld>(
    device: &mut dyn GraphicsDevice,
    media: &mut MediaLibrary,
    scene: &Scene<P>,
    frame: &Frame,
    post_render: bool,
) {
    let identity = glm::Mat4::identity();
    let mut draw = |mesh: &Mesh, world: &glm::Mat4, skin: &[glm::Mat4]| {
        draw_mesh(device, media, mesh, world, skin, frame, post_render);
    };
    for object in scene.objects().values() {
        let body = scene.physics.body_pose(object.body);
        draw(&object.mesh, &object.pose_from_body(&body), &[]);
    }
    for prop in scene.props().values() {
        if prop.skin.is_empty() {
            draw(&prop.mesh, &prop.world(), &[]);
        } else {
            draw(&prop.mesh, &identity, &prop.skin);
        }
    }
    for actor in scene.actors().values() {
        draw(&actor.mesh, &identity, &actor.pose.matrices);
    }
}

fn draw_mesh(
    device: &mut dyn GraphicsDevice,
    media: &mut MediaLibrary,
    mesh: &Mesh,
    world: &glm::Mat4,
    matrices: &[glm::Mat4],
    frame: &Frame,
    post_render: bool,
) {
    for subset in &mesh.subsets {
        let mut handle = mesh
            .materials
            .get(subset.material)
            .copied()
            .unwrap_or_default();
        if media.material_mut(handle).is_none() {
            handle = MaterialHandle::default();
        }
        let Some(material) = media.material_mut(handle) else {
            continue;
        };
        if material.post_render != post_render {
            continue;
        }
        let (textures, vectors) = material.bind(device);
        device.draw(&DrawCall {
            vertex_buffer: mesh.vertex_buffer,
            index_buffer: mesh.index_buffer,
            first_index: subset.first_index,
            index_count: subset.index_count,
            effect: material.effect,
            world: *world,
            view: frame.view,
            projection: frame.projection,
            matrices,
            textures: &textures,
            vectors: &vectors,
            lights: &frame.lights,
        });
    }
}
