use crate::{
    gpu::{GraphicsDevice, TextureDesc, TextureFormat, TextureHandle},
    ov_error::OvError,
};
use ahash::AHashMap;
use image::io::Reader;
use log::info;

/// Texture cache keyed by file name. An empty file name is the default
/// texture, a single white pixel.
#[derive(Default)]
pub struct Textures {
    cache: AHashMap<String, TextureHandle>,
}

impl Textures {
    #[must_use]
    pub fn new() -> Self {
        Self {
            // Reserve space to perhaps avoid some realloc/rehash
            cache: AHashMap::with_capacity(16),
        }
    }

    /// # Errors
    /// May return `OvError`
    pub fn load(
        &mut self,
        device: &mut dyn GraphicsDevice,
        filename: &str,
    ) -> Result<TextureHandle, OvError> {
        if let Some(texture) = self.cache.get(filename) {
            info!("Texture cache hit: {}", filename);
            return Ok(*texture);
        }
        info!("Texture cache miss: {}", filename);
        let texture = if filename.is_empty() {
            load_default(device)
        } else {
            let image = Reader::open(filename)?.decode()?.into_rgba8();
            let (width, height) = image.dimensions();
            info!("{filename} texture loaded w: {width}, h: {height}");
            upload_rgba8(device, width, height, image.as_raw())
        };
        self.cache.insert(filename.to_string(), texture);
        Ok(texture)
    }

    /// Decodes an in-memory image (PNG or JPEG) and caches it under `name`
    ///
    /// # Errors
    /// May return `OvError`
    pub fn load_from_memory(
        &mut self,
        device: &mut dyn GraphicsDevice,
        name: &str,
        bytes: &[u8],
    ) -> Result<TextureHandle, OvError> {
        if let Some(texture) = self.cache.get(name) {
            return Ok(*texture);
        }
        let image = image::load_from_memory(bytes)?.into_rgba8();
        let (width, height) = image.dimensions();
        let texture = upload_rgba8(device, width, height, image.as_raw());
        self.cache.insert(name.to_string(), texture);
        Ok(texture)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Frees every cached texture
    pub fn clear(&mut self, device: &mut dyn GraphicsDevice) {
        for (_, texture) in self.cache.drain() {
            device.delete_texture(texture);
        }
    }
}

fn upload_rgba8(
    device: &mut dyn GraphicsDevice,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> TextureHandle {
    device.create_texture(
        &TextureDesc {
            width,
            height,
            format: TextureFormat::Rgba8,
            mipmaps: true,
        },
        Some(pixels),
    )
}

fn load_default(device: &mut dyn GraphicsDevice) -> TextureHandle {
    upload_rgba8(device, 1, 1, &[255, 255, 255, 255])
}
