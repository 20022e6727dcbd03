use crate::{
    anim::Skeleton,
    gpu::{BufferHandle, BufferKind, GraphicsDevice},
    math,
    vertex::{Buffers, Vertex},
};
use itertools::Itertools;
use log::{debug, info};
use nalgebra_glm as glm;

/// Range of the index buffer drawn with one material slot
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Subset {
    pub first_index: u32,
    pub index_count: u32,
    /// Slot into the owning mesh's `materials`
    pub material: usize,
}

/// Geometry shared by every entity that uses it
///
/// `id` is the mesh's position in the `MediaLibrary` and is what scene files
/// store. The GPU buffers stay unallocated until the library uploads the
/// mesh.
pub struct Mesh {
    pub id: usize,
    pub name: String,
    pub buffers: Buffers,
    pub subsets: Vec<Subset>,
    /// Library materials, one per subset material slot
    pub materials: Vec<super::MaterialHandle>,
    pub min: glm::Vec3,
    pub max: glm::Vec3,
    pub skeleton: Option<Skeleton>,
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
}

impl Mesh {
    /// Mesh from raw buffers with one subset covering every index
    #[must_use]
    pub fn new(name: &str, buffers: Buffers) -> Self {
        let index_count =
            u32::try_from(buffers.indices.len()).unwrap_or(u32::MAX);
        let mut mesh = Self {
            id: 0,
            name: name.to_string(),
            buffers,
            subsets: vec![Subset {
                first_index: 0,
                index_count,
                material: 0,
            }],
            materials: Vec::new(),
            min: glm::Vec3::zeros(),
            max: glm::Vec3::zeros(),
            skeleton: None,
            vertex_buffer: BufferHandle::default(),
            index_buffer: BufferHandle::default(),
        };
        mesh.update_bounds();
        mesh
    }

    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.skeleton.as_ref().map_or(0, |s| s.bones.len())
    }

    /// Centre and half extents of the bounding box
    #[must_use]
    pub fn bounding_box(&self) -> (glm::Vec3, glm::Vec3) {
        ((self.min + self.max) * 0.5, (self.max - self.min) * 0.5)
    }

    pub fn update_bounds(&mut self) {
        let mut it = self
            .buffers
            .vertices
            .iter()
            .map(|v| glm::make_vec3(&v.position));
        let Some(first) = it.next() else {
            self.min = glm::Vec3::zeros();
            self.max = glm::Vec3::zeros();
            return;
        };
        let (min, max) = it.fold((first, first), |(lo, hi), p| {
            (glm::min2(&lo, &p), glm::max2(&hi, &p))
        });
        self.min = min;
        self.max = max;
    }

    /// Derives each bone's collision hull from the vertices it influences
    /// by at least `hull_weight`, expressed in the bone's own space
    pub fn derive_bone_hulls(&mut self, hull_weight: f32) {
        let Some(skeleton) = self.skeleton.as_mut() else {
            return;
        };
        for bone in &mut skeleton.bones {
            let inv = math::inverse(&bone.matrix);
            bone.convex = self
                .buffers
                .vertices
                .iter()
                .filter(|v| v.weight_for(bone.index) >= hull_weight)
                .map(|v| {
                    math::transform_point(&glm::make_vec3(&v.position), &inv)
                })
                .collect();
            let Some(first) = bone.convex.first().copied() else {
                bone.min = glm::Vec3::zeros();
                bone.max = glm::Vec3::zeros();
                bone.length = 0.0;
                bone.volume = 0.0;
                continue;
            };
            let (min, max) =
                bone.convex.iter().fold((first, first), |(lo, hi), p| {
                    (glm::min2(&lo, p), glm::max2(&hi, p))
                });
            let extent = max - min;
            bone.min = min;
            bone.max = max;
            bone.length = extent.y;
            bone.volume = extent.x * extent.y * extent.z;
            debug!(
                "Bone {} hull from {} vertices, volume {}",
                bone.name,
                bone.convex.len(),
                bone.volume
            );
        }
    }

    /// Replaces every normal with the normalized sum of the unnormalized
    /// normals of the faces using the vertex, so larger faces count for more
    pub fn calculate_normals(&mut self) {
        let vertices = &mut self.buffers.vertices;
        for v in vertices.iter_mut() {
            v.normal = [0.0; 3];
        }
        for (i0, i1, i2) in self.buffers.indices.iter().tuples() {
            let p = |i: &u32| glm::make_vec3(&vertices[*i as usize].position);
            let (v0, v1, v2) = (p(i0), p(i1), p(i2));
            let face = glm::cross(&(v0 - v1), &(v1 - v2));
            for i in [i0, i1, i2] {
                let n = &mut vertices[*i as usize].normal;
                n[0] += face.x;
                n[1] += face.y;
                n[2] += face.z;
            }
        }
        for v in vertices.iter_mut() {
            let n = glm::make_vec3(&v.normal);
            if glm::length(&n) > math::EPSILON {
                v.normal = glm::normalize(&n).into();
            }
        }
    }

    /// Creates the device buffers. Calling again frees the old ones first.
    pub fn upload(&mut self, device: &mut dyn GraphicsDevice) {
        self.release(device);
        self.vertex_buffer = device
            .create_buffer(BufferKind::Vertex, self.buffers.vertex_bytes());
        self.index_buffer =
            device.create_buffer(BufferKind::Index, self.buffers.index_bytes());
        info!(
            "Mesh {} uploaded, {} vertices, {} indices",
            self.name,
            self.buffers.vertices.len(),
            self.buffers.indices.len()
        );
    }

    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        if self.vertex_buffer.is_allocated() {
            device.delete_buffer(self.vertex_buffer);
            self.vertex_buffer = BufferHandle::default();
        }
        if self.index_buffer.is_allocated() {
            device.delete_buffer(self.index_buffer);
            self.index_buffer = BufferHandle::default();
        }
    }
}

/// Convenience constructor for a vertex with no skin
#[must_use]
pub fn vertex(
    position: [f32; 3],
    normal: [f32; 3],
    tex_coord: [f32; 2],
) -> Vertex {
    Vertex {
        position,
        normal,
        tex_coord,
        ..Vertex::default()
    }
}
