// Vertices are uploaded as a single interleaved stream. Skinned and static
// meshes share the layout; static meshes leave every bone weight at zero.
use bytemuck::{Pod, Zeroable};

/// Maximum bone influences per vertex
pub const MAX_INFLUENCES: usize = 4;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Zeroable, Pod)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coord: [f32; 2],
    pub bones: [u32; MAX_INFLUENCES],
    pub weights: [f32; MAX_INFLUENCES],
}

impl Vertex {
    /// Weight this vertex gives to `bone`, summed over duplicate slots
    #[must_use]
    pub fn weight_for(&self, bone: usize) -> f32 {
        self.bones
            .iter()
            .zip(self.weights)
            .filter(|(b, _)| **b as usize == bone)
            .map(|(_, w)| w)
            .sum()
    }
}

pub struct Buffers {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Buffers {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Raw bytes of the vertex stream as the device expects them
    #[must_use]
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    #[must_use]
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

impl Default for Buffers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 64);
        let mut buffers = Buffers::new();
        buffers.vertices.push(Vertex::default());
        buffers.indices.extend([0, 0, 0]);
        assert_eq!(buffers.vertex_bytes().len(), 64);
        assert_eq!(buffers.index_bytes().len(), 12);
    }

    #[test]
    fn weight_for_sums_matching_slots() {
        let v = Vertex {
            bones: [2, 5, 2, 0],
            weights: [0.25, 0.5, 0.25, 0.0],
            ..Vertex::default()
        };
        assert!((v.weight_for(2) - 0.5).abs() < f32::EPSILON);
        assert!((v.weight_for(5) - 0.5).abs() < f32::EPSILON);
        assert!(v.weight_for(7).abs() < f32::EPSILON);
    }
}
