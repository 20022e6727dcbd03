//! Graphics device seam.
//!
//! Handles are plain ids. A handle of 0 is never allocated, so a zeroed
//! handle field means "nothing allocated yet" and teardown can skip it.
mod headless;

pub use headless::{Command, HeadlessDevice};

use crate::ov_error::OvError;
use nalgebra_glm as glm;

macro_rules! handle {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
        pub struct $name(pub u32);

        impl $name {
            /// True for a handle the device actually allocated
            #[must_use]
            pub const fn is_allocated(self) -> bool {
                self.0 != 0
            }
        }
    };
}

handle!(TextureHandle);
handle!(RenderbufferHandle);
handle!(FramebufferHandle);
handle!(BufferHandle);
handle!(EffectHandle);
handle!(ParamHandle);

/// Resource classes the device tracks separately
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Texture,
    Renderbuffer,
    Framebuffer,
    Buffer,
    Effect,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8,
    Rgba16F,
    Depth24,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub mipmaps: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attachment {
    Texture(TextureHandle),
    Renderbuffer(RenderbufferHandle),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Index,
}

/// Pixel rectangle, origin at the bottom left
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Full screen pass run by the compositor
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Pass {
    Copy,
    /// Scales colour by `1 / luminance`
    Brightness { luminance: f32 },
    /// Directional blur along `direction` in texels
    Blur { direction: glm::Vec2, magnitude: f32 },
    /// Adds the input onto the target
    Additive,
    /// Smears along the screen space camera motion
    MotionBlur { motion: glm::Vec2 },
}

pub const MAX_LIGHTS: usize = 4;

/// Lights packed as the lighting shaders expect them. Positions and
/// directions are in view space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LightBlock {
    /// xyz position, w is the kind (0 point, 1 spot, 2 directional)
    pub position: [[f32; 4]; MAX_LIGHTS],
    /// rgb colour, w is the range
    pub colour: [[f32; 4]; MAX_LIGHTS],
    /// xyz direction, w is the cosine of the outer cone
    pub direction: [[f32; 4]; MAX_LIGHTS],
    pub count: u32,
}

/// Everything needed to draw one mesh subset
#[derive(Clone, Copy, Debug)]
pub struct DrawCall<'a> {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub first_index: u32,
    pub index_count: u32,
    pub effect: EffectHandle,
    pub world: glm::Mat4,
    pub view: glm::Mat4,
    pub projection: glm::Mat4,
    /// Skin matrices, empty for rigid meshes
    pub matrices: &'a [glm::Mat4],
    pub textures: &'a [(ParamHandle, TextureHandle)],
    pub vectors: &'a [(ParamHandle, glm::Vec4)],
    pub lights: &'a LightBlock,
}

pub trait GraphicsDevice {
    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        pixels: Option<&[u8]>,
    ) -> TextureHandle;
    fn delete_texture(&mut self, texture: TextureHandle);
    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)>;

    fn create_renderbuffer(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
        samples: u32,
    ) -> RenderbufferHandle;
    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferHandle);

    fn create_framebuffer(
        &mut self,
        colour: Attachment,
        depth: Option<RenderbufferHandle>,
    ) -> FramebufferHandle;
    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle);
    fn framebuffer_size(&self, framebuffer: FramebufferHandle)
        -> Option<(u32, u32)>;

    fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> BufferHandle;
    fn delete_buffer(&mut self, buffer: BufferHandle);

    /// # Errors
    /// Returns `OvError::ShaderCompile` with the compiler log
    fn compile_effect(
        &mut self,
        name: &str,
        source: &str,
    ) -> Result<EffectHandle, OvError>;
    fn delete_effect(&mut self, effect: EffectHandle);
    /// Looks up a named parameter of a compiled effect
    fn parameter(&self, effect: EffectHandle, name: &str) -> Option<ParamHandle>;

    /// `None` binds the window's back buffer
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>);
    fn set_viewport(&mut self, viewport: &Viewport);
    fn clear(&mut self, colour: bool, depth: bool);
    fn set_multisample(&mut self, enabled: bool);
    fn blit(
        &mut self,
        from: FramebufferHandle,
        to: FramebufferHandle,
        width: u32,
        height: u32,
    );
    fn generate_mipmaps(&mut self, texture: TextureHandle);
    /// Average luminance read from the smallest mip level
    fn average_luminance(&mut self, texture: TextureHandle) -> f32;
    /// Draws a full screen quad sampling `input` into the bound framebuffer
    fn fullscreen_pass(&mut self, pass: &Pass, input: TextureHandle);
    fn draw(&mut self, call: &DrawCall);
    fn draw_skybox(
        &mut self,
        texture: TextureHandle,
        view: &glm::Mat4,
        projection: &glm::Mat4,
    );
    fn draw_rect(
        &mut self,
        viewport: &Viewport,
        colour: [f32; 4],
        texture: Option<TextureHandle>,
    );
}
