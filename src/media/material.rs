use crate::gpu::{EffectHandle, GraphicsDevice, ParamHandle, TextureHandle};
use log::warn;
use nalgebra_glm as glm;
use smallvec::SmallVec;

/// Index into the library's material list. Index 0 is the default material
/// and is always present.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MaterialHandle(pub usize);

/// A named effect parameter. The device handle is looked up the first time
/// the material is bound and reused afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct Binding<T> {
    pub name: String,
    pub param: Option<ParamHandle>,
    pub value: T,
}

pub type TextureBindings = SmallVec<[(ParamHandle, TextureHandle); 4]>;
pub type VectorBindings = SmallVec<[(ParamHandle, glm::Vec4); 4]>;

#[derive(Clone, Debug)]
pub struct Material {
    pub name: String,
    pub effect: EffectHandle,
    pub textures: Vec<Binding<TextureHandle>>,
    pub vectors: Vec<Binding<glm::Vec4>>,
    /// Drawn after all opaque geometry
    pub post_render: bool,
}

impl Material {
    #[must_use]
    pub fn new(name: &str, effect: EffectHandle) -> Self {
        Self {
            name: name.to_string(),
            effect,
            textures: Vec::new(),
            vectors: Vec::new(),
            post_render: false,
        }
    }

    /// Sets or replaces a texture parameter
    pub fn set_texture(&mut self, name: &str, texture: TextureHandle) {
        if let Some(b) = self.textures.iter_mut().find(|b| b.name == name) {
            b.value = texture;
        } else {
            self.textures.push(Binding {
                name: name.to_string(),
                param: None,
                value: texture,
            });
        }
    }

    /// Sets or replaces a vector parameter
    pub fn set_vector(&mut self, name: &str, value: glm::Vec4) {
        if let Some(b) = self.vectors.iter_mut().find(|b| b.name == name) {
            b.value = value;
        } else {
            self.vectors.push(Binding {
                name: name.to_string(),
                param: None,
                value,
            });
        }
    }

    /// Changing the effect invalidates every cached parameter handle
    pub fn set_effect(&mut self, effect: EffectHandle) {
        self.effect = effect;
        for b in &mut self.textures {
            b.param = None;
        }
        for b in &mut self.vectors {
            b.param = None;
        }
    }

    /// Resolves parameter handles that are not cached yet and returns every
    /// binding the effect actually has
    pub fn bind(
        &mut self,
        device: &dyn GraphicsDevice,
    ) -> (TextureBindings, VectorBindings) {
        let effect = self.effect;
        let textures = self
            .textures
            .iter_mut()
            .filter_map(|b| resolve(device, effect, b).map(|p| (p, b.value)))
            .collect();
        let vectors = self
            .vectors
            .iter_mut()
            .filter_map(|b| resolve(device, effect, b).map(|p| (p, b.value)))
            .collect();
        (textures, vectors)
    }
}

fn resolve<T>(
    device: &dyn GraphicsDevice,
    effect: EffectHandle,
    binding: &mut Binding<T>,
) -> Option<ParamHandle> {
    if binding.param.is_none() {
        binding.param = device.parameter(effect, &binding.name);
        if binding.param.is_none() {
            warn!("Effect parameter {} not found", binding.name);
        }
    }
    binding.param
}
