use super::{
    Attachment, BufferHandle, BufferKind, DrawCall, EffectHandle,
    FramebufferHandle, GraphicsDevice, ParamHandle, Pass, RenderbufferHandle,
    ResourceKind, TextureDesc, TextureFormat, TextureHandle, Viewport,
};
use crate::ov_error::OvError;
use ahash::AHashMap;
use log::{trace, warn};
use nalgebra_glm as glm;

/// A device call as recorded by `HeadlessDevice`
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    BindFramebuffer(Option<FramebufferHandle>),
    Viewport(Viewport),
    Clear { colour: bool, depth: bool },
    Multisample(bool),
    Blit {
        from: FramebufferHandle,
        to: FramebufferHandle,
    },
    Mipmaps(TextureHandle),
    Pass { pass: Pass, input: TextureHandle },
    Draw {
        effect: EffectHandle,
        vertex_buffer: BufferHandle,
        index_count: u32,
        joints: usize,
    },
    Skybox(TextureHandle),
    Rect {
        viewport: Viewport,
        texture: Option<TextureHandle>,
    },
}

struct Effect {
    name: String,
    source: String,
}

/// Graphics device that allocates ids and records commands
///
/// Live resources are tracked per kind so tests can check for leaks.
/// Deleting an unknown or already deleted handle is counted in
/// `bad_deletes` rather than ignored.
pub struct HeadlessDevice {
    next_id: u32,
    live: AHashMap<u32, ResourceKind>,
    sizes: AHashMap<u32, (u32, u32)>,
    samples: AHashMap<u32, u32>,
    effects: AHashMap<u32, Effect>,
    pub commands: Vec<Command>,
    pub bad_deletes: usize,
    /// Value returned by `average_luminance`
    pub luminance: f32,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 0,
            live: AHashMap::new(),
            sizes: AHashMap::new(),
            samples: AHashMap::new(),
            effects: AHashMap::new(),
            commands: Vec::new(),
            bad_deletes: 0,
            luminance: 0.5,
        }
    }

    #[must_use]
    pub fn live_count(&self, kind: ResourceKind) -> usize {
        self.live.values().filter(|k| **k == kind).count()
    }

    #[must_use]
    pub fn live_total(&self) -> usize {
        self.live.len()
    }

    /// Sample counts of the live renderbuffers, lowest first
    #[must_use]
    pub fn renderbuffer_samples(&self) -> Vec<u32> {
        let mut samples: Vec<_> = self
            .samples
            .iter()
            .filter(|(id, _)| self.live.contains_key(id))
            .map(|(_, n)| *n)
            .collect();
        samples.sort_unstable();
        samples
    }

    #[must_use]
    pub fn effect_name(&self, effect: EffectHandle) -> Option<&str> {
        self.effects.get(&effect.0).map(|e| e.name.as_str())
    }

    fn allocate(&mut self, kind: ResourceKind, size: Option<(u32, u32)>) -> u32 {
        self.next_id += 1;
        self.live.insert(self.next_id, kind);
        if let Some(size) = size {
            self.sizes.insert(self.next_id, size);
        }
        trace!("Headless {:?} {} allocated", kind, self.next_id);
        self.next_id
    }

    fn release(&mut self, id: u32, kind: ResourceKind) {
        if self.live.get(&id) == Some(&kind) {
            self.live.remove(&id);
            self.sizes.remove(&id);
            self.samples.remove(&id);
        } else {
            warn!("Delete of {:?} {} which is not live", kind, id);
            self.bad_deletes += 1;
        }
    }

    fn size_of(&self, id: u32, kind: ResourceKind) -> Option<(u32, u32)> {
        (self.live.get(&id) == Some(&kind))
            .then(|| self.sizes.get(&id).copied())
            .flatten()
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        _pixels: Option<&[u8]>,
    ) -> TextureHandle {
        TextureHandle(
            self.allocate(ResourceKind::Texture, Some((desc.width, desc.height))),
        )
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.release(texture.0, ResourceKind::Texture);
    }

    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.size_of(texture.0, ResourceKind::Texture)
    }

    fn create_renderbuffer(
        &mut self,
        width: u32,
        height: u32,
        _format: TextureFormat,
        samples: u32,
    ) -> RenderbufferHandle {
        let id =
            self.allocate(ResourceKind::Renderbuffer, Some((width, height)));
        self.samples.insert(id, samples);
        RenderbufferHandle(id)
    }

    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        self.release(renderbuffer.0, ResourceKind::Renderbuffer);
    }

    fn create_framebuffer(
        &mut self,
        colour: Attachment,
        _depth: Option<RenderbufferHandle>,
    ) -> FramebufferHandle {
        let size = match colour {
            Attachment::Texture(t) => self.texture_size(t),
            Attachment::Renderbuffer(r) => {
                self.size_of(r.0, ResourceKind::Renderbuffer)
            }
        };
        FramebufferHandle(self.allocate(ResourceKind::Framebuffer, size))
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.release(framebuffer.0, ResourceKind::Framebuffer);
    }

    fn framebuffer_size(
        &self,
        framebuffer: FramebufferHandle,
    ) -> Option<(u32, u32)> {
        self.size_of(framebuffer.0, ResourceKind::Framebuffer)
    }

    fn create_buffer(&mut self, _kind: BufferKind, _data: &[u8]) -> BufferHandle {
        BufferHandle(self.allocate(ResourceKind::Buffer, None))
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.release(buffer.0, ResourceKind::Buffer);
    }

    fn compile_effect(
        &mut self,
        name: &str,
        source: &str,
    ) -> Result<EffectHandle, OvError> {
        if source.trim().is_empty() {
            return Err(OvError::ShaderCompile(format!("{name}: empty source")));
        }
        let id = self.allocate(ResourceKind::Effect, None);
        self.effects.insert(
            id,
            Effect {
                name: name.to_string(),
                source: source.to_string(),
            },
        );
        Ok(EffectHandle(id))
    }

    fn delete_effect(&mut self, effect: EffectHandle) {
        self.effects.remove(&effect.0);
        self.release(effect.0, ResourceKind::Effect);
    }

    /// Any name that appears in the effect source is a parameter. The handle
    /// is the byte offset of its first occurrence plus one.
    fn parameter(&self, effect: EffectHandle, name: &str) -> Option<ParamHandle> {
        let source = &self.effects.get(&effect.0)?.source;
        let offset = source.find(name)?;
        u32::try_from(offset + 1).ok().map(ParamHandle)
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        self.commands.push(Command::BindFramebuffer(framebuffer));
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.commands.push(Command::Viewport(*viewport));
    }

    fn clear(&mut self, colour: bool, depth: bool) {
        self.commands.push(Command::Clear { colour, depth });
    }

    fn set_multisample(&mut self, enabled: bool) {
        self.commands.push(Command::Multisample(enabled));
    }

    fn blit(
        &mut self,
        from: FramebufferHandle,
        to: FramebufferHandle,
        _width: u32,
        _height: u32,
    ) {
        self.commands.push(Command::Blit { from, to });
    }

    fn generate_mipmaps(&mut self, texture: TextureHandle) {
        self.commands.push(Command::Mipmaps(texture));
    }

    fn average_luminance(&mut self, _texture: TextureHandle) -> f32 {
        self.luminance
    }

    fn fullscreen_pass(&mut self, pass: &Pass, input: TextureHandle) {
        self.commands.push(Command::Pass {
            pass: *pass,
            input,
        });
    }

    fn draw(&mut self, call: &DrawCall) {
        self.commands.push(Command::Draw {
            effect: call.effect,
            vertex_buffer: call.vertex_buffer,
            index_count: call.index_count,
            joints: call.matrices.len(),
        });
    }

    fn draw_skybox(
        &mut self,
        texture: TextureHandle,
        _view: &glm::Mat4,
        _projection: &glm::Mat4,
    ) {
        self.commands.push(Command::Skybox(texture));
    }

    fn draw_rect(
        &mut self,
        viewport: &Viewport,
        _colour: [f32; 4],
        texture: Option<TextureHandle>,
    ) {
        self.commands.push(Command::Rect {
            viewport: *viewport,
            texture,
        });
    }
}
