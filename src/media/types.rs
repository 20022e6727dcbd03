use super::mesh::Mesh;
use serde::{Deserialize, Serialize};

/// Result of importing a model file. Subset material slots index into
/// `materials`.
pub struct MeshLoaded {
    pub mesh: Mesh,
    pub materials: Vec<ImportMaterial>,
}

/// Material as read from a model file, before any texture is loaded
#[derive(Clone, Debug, PartialEq)]
pub struct ImportMaterial {
    pub name: String,
    pub colour_filename: String, // Colour texture for diffuse
    pub diffuse: [f32; 3],       // Multiplier for diffuse
    pub roughness: f32,
    pub metalness: f32,
}

impl Default for ImportMaterial {
    fn default() -> Self {
        Self {
            name: String::new(),
            colour_filename: String::new(),
            diffuse: [1.0, 1.0, 1.0],
            roughness: 0.5,
            metalness: 0.0,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
#[serde(default)]
pub struct ImportOptions {
    pub scale: f32,
    /// Flip V so textures authored with a top left origin sample correctly
    pub flip_uvs: bool,
    /// Minimum skin weight for a vertex to count towards a bone's hull
    pub hull_weight: f32,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            flip_uvs: true,
            hull_weight: 0.5,
        }
    }
}

/// Errors specific to importing data. `OvError` has a `From` trait to
/// handle these.
#[derive(Debug, PartialEq, Eq)]
pub enum ImportError {
    General,
    NoTriangles,
    NoIndices,
    NoPositions,
    NoNormals,
    NoWeights,
    CountMismatch,
    SparseMesh,
    BigJointIndices,
    NoInverseBind,
    SparseAnimation,
    NoSampler,
    Morphing,
    NoNodeInfo(usize),
    NoRootNode(usize),
    ConflictingRootNodes(usize),
    TooManyBones(usize),
    TruncatedFile,
    UnknownMesh(usize),
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::General => write!(f, "general import error"),
            Self::NoTriangles => {
                write!(f, "only triangulated meshes are supported")
            }
            Self::NoIndices => {
                write!(f, "only indexed meshes are supported")
            }
            Self::NoPositions => {
                write!(f, "vertex positions are required")
            }
            Self::NoNormals => {
                write!(f, "vertex normals are required")
            }
            Self::NoWeights => {
                write!(f, "vertex weights are required for a skinned mesh")
            }
            Self::CountMismatch => {
                write!(f, "there is a mismatch in the count of vertices")
            }
            Self::SparseMesh => {
                write!(f, "sparse mesh data is not supported")
            }
            Self::BigJointIndices => {
                write!(f, "joint index does not match any bone of the skin")
            }
            Self::NoInverseBind => {
                write!(
                    f,
                    "inverse bind matrices are required for a skinned mesh"
                )
            }
            Self::SparseAnimation => {
                write!(f, "sparse animation data is not supported")
            }
            Self::NoSampler => {
                write!(f, "a sampler is required for animation")
            }
            Self::Morphing => {
                write!(f, "morphing animation is not supported")
            }
            Self::NoNodeInfo(a) => write!(f, "node {a} has missing info"),
            Self::NoRootNode(a) => write!(f, "skin {a} has no root node"),
            Self::ConflictingRootNodes(a) => {
                write!(f, "skin {a} has conflicting root nodes")
            }
            Self::TooManyBones(a) => {
                write!(f, "skin has {a} bones which is more than supported")
            }
            Self::TruncatedFile => write!(f, "scene file ended early"),
            Self::UnknownMesh(a) => {
                write!(f, "scene file refers to mesh {a} which is not loaded")
            }
        }
    }
}
