//! Asset import and the resource library shared by every scene.
pub mod gltf_file;
pub mod material;
pub mod mesh;
pub mod obj_file;
pub mod scene_file;
pub mod texture;
pub mod types;

pub use material::{Material, MaterialHandle};
pub use mesh::{Mesh, Subset};
pub use texture::Textures;
pub use types::{ImportError, ImportMaterial, ImportOptions, MeshLoaded};

use crate::{
    audio::AudioBuffer,
    gpu::{EffectHandle, GraphicsDevice, TextureHandle},
    ov_error::OvError,
};
use ahash::AHashMap;
use log::{info, warn};
use nalgebra_glm as glm;
use std::{path::Path, sync::Arc};

pub const DEFAULT_EFFECT: &str = "default";

/// Source for the effect every imported material starts with
const DEFAULT_EFFECT_SOURCE: &str = "\
float4x4 world; float4x4 view_proj; float4x4 matrices[128];
sampler2D diffuse; float4 tint; float4 surface;
";

/// Meshes, materials, effects, textures and audio buffers, loaded once and
/// shared by reference between scenes
pub struct MediaLibrary {
    meshes: Vec<Arc<Mesh>>,
    materials: Vec<Material>,
    effects: AHashMap<String, EffectHandle>,
    textures: Textures,
    audio: Vec<Arc<AudioBuffer>>,
}

impl MediaLibrary {
    /// Creates the library with its default effect and material
    ///
    /// # Errors
    /// May return `OvError`
    pub fn new(device: &mut dyn GraphicsDevice) -> Result<Self, OvError> {
        let effect =
            device.compile_effect(DEFAULT_EFFECT, DEFAULT_EFFECT_SOURCE)?;
        let mut textures = Textures::new();
        let white = textures.load(device, "")?;
        let mut material = Material::new(DEFAULT_EFFECT, effect);
        material.set_texture("diffuse", white);
        material.set_vector("tint", glm::vec4(1.0, 1.0, 1.0, 1.0));
        let mut effects = AHashMap::new();
        effects.insert(DEFAULT_EFFECT.to_string(), effect);
        Ok(Self {
            meshes: Vec::new(),
            materials: vec![material],
            effects,
            textures,
            audio: Vec::new(),
        })
    }

    /// # Errors
    /// May return `OvError`
    pub fn import_gltf(
        &mut self,
        device: &mut dyn GraphicsDevice,
        path: &Path,
        options: &ImportOptions,
    ) -> Result<Arc<Mesh>, OvError> {
        let loaded = gltf_file::load(path, options)?;
        Ok(self.add_loaded(device, loaded))
    }

    /// # Errors
    /// May return `OvError`
    pub fn import_obj(
        &mut self,
        device: &mut dyn GraphicsDevice,
        path: &Path,
        options: &ImportOptions,
    ) -> Result<Arc<Mesh>, OvError> {
        let loaded = obj_file::load(path, options)?;
        Ok(self.add_loaded(device, loaded))
    }

    /// Creates a library material for each imported material and registers
    /// the mesh. A texture that fails to load is replaced by the default.
    pub fn add_loaded(
        &mut self,
        device: &mut dyn GraphicsDevice,
        loaded: MeshLoaded,
    ) -> Arc<Mesh> {
        let MeshLoaded {
            mut mesh,
            materials,
        } = loaded;
        mesh.materials = materials
            .iter()
            .map(|m| self.add_import_material(device, m))
            .collect();
        self.add_mesh(device, mesh)
    }

    fn add_import_material(
        &mut self,
        device: &mut dyn GraphicsDevice,
        import: &ImportMaterial,
    ) -> MaterialHandle {
        let texture = self
            .textures
            .load(device, &import.colour_filename)
            .unwrap_or_else(|e| {
                warn!("{}: {}, using default", import.colour_filename, e);
                self.default_texture(device)
            });
        let handle = self.create_material(&import.name, self.default_effect());
        let material = &mut self.materials[handle.0];
        material.set_texture("diffuse", texture);
        let [r, g, b] = import.diffuse;
        material.set_vector("tint", glm::vec4(r, g, b, 1.0));
        material.set_vector(
            "surface",
            glm::vec4(import.roughness, import.metalness, 0.0, 0.0),
        );
        handle
    }

    fn default_texture(
        &mut self,
        device: &mut dyn GraphicsDevice,
    ) -> TextureHandle {
        // The empty name is cached by `new` so this cannot fail
        self.textures.load(device, "").unwrap_or_default()
    }

    /// Assigns the mesh its library id, gives every subset a material and
    /// uploads it. Skinned meshes built by hand should have their bone
    /// hulls derived before this is called.
    pub fn add_mesh(
        &mut self,
        device: &mut dyn GraphicsDevice,
        mut mesh: Mesh,
    ) -> Arc<Mesh> {
        mesh.id = self.meshes.len();
        let slots = mesh.subsets.iter().map(|s| s.material + 1).max();
        let slots = slots.unwrap_or(0);
        if mesh.materials.len() < slots {
            mesh.materials.resize(slots, MaterialHandle::default());
        }
        mesh.upload(device);
        info!("Mesh {} registered as {}", mesh.name, mesh.id);
        let mesh = Arc::new(mesh);
        self.meshes.push(Arc::clone(&mesh));
        mesh
    }

    #[must_use]
    pub fn mesh(&self, id: usize) -> Option<&Arc<Mesh>> {
        self.meshes.get(id)
    }

    #[must_use]
    pub fn meshes(&self) -> &[Arc<Mesh>] {
        &self.meshes
    }

    /// Compiles an effect and registers it by name, replacing any effect of
    /// the same name
    ///
    /// # Errors
    /// Returns `OvError::ShaderCompile` if the device rejects the source
    pub fn add_effect(
        &mut self,
        device: &mut dyn GraphicsDevice,
        name: &str,
        source: &str,
    ) -> Result<EffectHandle, OvError> {
        let effect = device.compile_effect(name, source)?;
        if let Some(old) = self.effects.insert(name.to_string(), effect) {
            device.delete_effect(old);
            for m in self.materials.iter_mut().filter(|m| m.effect == old) {
                m.set_effect(effect);
            }
        }
        Ok(effect)
    }

    #[must_use]
    pub fn effect(&self, name: &str) -> Option<EffectHandle> {
        self.effects.get(name).copied()
    }

    #[must_use]
    pub fn default_effect(&self) -> EffectHandle {
        self.effect(DEFAULT_EFFECT).unwrap_or_default()
    }

    pub fn create_material(
        &mut self,
        name: &str,
        effect: EffectHandle,
    ) -> MaterialHandle {
        self.materials.push(Material::new(name, effect));
        MaterialHandle(self.materials.len() - 1)
    }

    /// Falls back to the default material for an unknown handle
    #[must_use]
    pub fn material(&self, handle: MaterialHandle) -> &Material {
        self.materials
            .get(handle.0)
            .unwrap_or(&self.materials[0])
    }

    pub fn material_mut(
        &mut self,
        handle: MaterialHandle,
    ) -> Option<&mut Material> {
        self.materials.get_mut(handle.0)
    }

    /// # Errors
    /// May return `OvError`
    pub fn load_texture(
        &mut self,
        device: &mut dyn GraphicsDevice,
        filename: &str,
    ) -> Result<TextureHandle, OvError> {
        self.textures.load(device, filename)
    }

    pub fn add_audio(&mut self, buffer: AudioBuffer) -> Arc<AudioBuffer> {
        info!(
            "Audio buffer {} with {:.2} seconds",
            self.audio.len(),
            buffer.duration()
        );
        let buffer = Arc::new(buffer);
        self.audio.push(Arc::clone(&buffer));
        buffer
    }

    #[must_use]
    pub fn audio(&self, index: usize) -> Option<&Arc<AudioBuffer>> {
        self.audio.get(index)
    }

    /// Frees every device resource the library owns
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        for mesh in self.meshes.drain(..) {
            if mesh.vertex_buffer.is_allocated() {
                device.delete_buffer(mesh.vertex_buffer);
            }
            if mesh.index_buffer.is_allocated() {
                device.delete_buffer(mesh.index_buffer);
            }
        }
        self.textures.clear(device);
        for (_, effect) in self.effects.drain() {
            device.delete_effect(effect);
        }
        self.materials.truncate(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{HeadlessDevice, ResourceKind};
    use crate::vertex::Buffers;

    fn triangle() -> Mesh {
        let mut buffers = Buffers::new();
        for p in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
            buffers.vertices.push(mesh::vertex(p, [0.0, 0.0, 1.0], [0.0; 2]));
        }
        buffers.indices.extend([0, 1, 2]);
        Mesh::new("triangle", buffers)
    }

    #[test]
    fn meshes_are_numbered_and_uploaded() {
        let mut device = HeadlessDevice::new();
        let mut library = MediaLibrary::new(&mut device).unwrap();
        let a = library.add_mesh(&mut device, triangle());
        let b = library.add_mesh(&mut device, triangle());
        assert_eq!((a.id, b.id), (0, 1));
        assert!(a.vertex_buffer.is_allocated());
        assert_eq!(a.materials, vec![MaterialHandle(0)]);
        assert_eq!(device.live_count(ResourceKind::Buffer), 4);
        library.release(&mut device);
        assert_eq!(device.live_total(), 0);
        assert_eq!(device.bad_deletes, 0);
    }

    #[test]
    fn missing_texture_falls_back_to_default() {
        let mut device = HeadlessDevice::new();
        let mut library = MediaLibrary::new(&mut device).unwrap();
        let loaded = MeshLoaded {
            mesh: triangle(),
            materials: vec![ImportMaterial {
                name: "painted".to_string(),
                colour_filename: "no/such/file.png".to_string(),
                ..ImportMaterial::default()
            }],
        };
        let mesh = library.add_loaded(&mut device, loaded);
        let white = library.material(MaterialHandle(0)).textures[0].value;
        let material = library.material(mesh.materials[0]);
        assert_eq!(material.name, "painted");
        assert_eq!(material.textures[0].value, white);
    }

    #[test]
    fn replacing_an_effect_rebinds_materials() {
        let mut device = HeadlessDevice::new();
        let mut library = MediaLibrary::new(&mut device).unwrap();
        let old = library.default_effect();
        let new = library
            .add_effect(&mut device, DEFAULT_EFFECT, "sampler2D diffuse;")
            .unwrap();
        assert_ne!(old, new);
        assert_eq!(library.material(MaterialHandle(0)).effect, new);
        assert_eq!(device.live_count(ResourceKind::Effect), 1);
    }
}
