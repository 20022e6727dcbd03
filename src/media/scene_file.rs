//! Binary library and scene dump.
//!
//! Everything is little-endian with no header or version. The file is the
//! mesh section followed by the entity section:
//!
//! ```text
//! u32 mesh count
//!   u32 vertex count, vertices (position, normal, uv, bones, weights)
//!   u32 face count, u32 index triples
//!   u32 bone count, bones (i32 parent or -1, 16 f32 matrix,
//!       16 f32 local transform)
//! u32 object count, objects (u32 mesh, 16 f32 pose)
//! u32 prop count, props (u32 mesh, 16 f32 pose)
//! u32 light count, lights (u32 kind, 3 f32 params, 3 f32 colour,
//!     16 f32 pose)
//! u32 camera count, cameras (4 f32 aspect/fovy/near/far, 16 f32 pose)
//! ```
//!
//! Mesh indices in the entity section are library mesh ids when written.
//! Actors and emitters are not stored.
use super::{
    types::{ImportError, ImportOptions},
    MediaLibrary, Mesh,
};
use crate::{
    anim::{Bone, Skeleton},
    gpu::GraphicsDevice,
    ov_error::OvError,
    physics::PhysicsWorld,
    scene::{CameraProperties, Entity, LightKind, Scene},
    vertex::{Buffers, Vertex, MAX_INFLUENCES},
};
use log::info;
use nalgebra_glm as glm;
use std::{
    io::{self, Read, Write},
    sync::Arc,
};

/// Counts are trusted only this far when reserving memory
const MAX_RESERVE: usize = 1 << 16;

struct Out<W: Write>(W);

impl<W: Write> Out<W> {
    fn u32(&mut self, v: u32) -> io::Result<()> {
        self.0.write_all(&v.to_le_bytes())
    }

    fn count(&mut self, n: usize) -> Result<(), OvError> {
        let n = u32::try_from(n).map_err(|_| OvError::IndexTooLarge)?;
        Ok(self.u32(n)?)
    }

    fn f32s(&mut self, v: &[f32]) -> io::Result<()> {
        for x in v {
            self.0.write_all(&x.to_le_bytes())?;
        }
        Ok(())
    }

    fn mat(&mut self, m: &glm::Mat4) -> io::Result<()> {
        self.f32s(m.as_slice())
    }
}

struct In<R: Read>(R);

impl<R: Read> In<R> {
    fn bytes<const N: usize>(&mut self) -> Result<[u8; N], OvError> {
        let mut buf = [0; N];
        self.0.read_exact(&mut buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                OvError::ImportError(ImportError::TruncatedFile)
            } else {
                OvError::StdIoError(e)
            }
        })?;
        Ok(buf)
    }

    fn u32(&mut self) -> Result<u32, OvError> {
        Ok(u32::from_le_bytes(self.bytes()?))
    }

    fn i32(&mut self) -> Result<i32, OvError> {
        Ok(i32::from_le_bytes(self.bytes()?))
    }

    fn f32(&mut self) -> Result<f32, OvError> {
        Ok(f32::from_le_bytes(self.bytes()?))
    }

    fn count(&mut self) -> Result<usize, OvError> {
        Ok(self.u32()? as usize)
    }

    fn f32s<const N: usize>(&mut self) -> Result<[f32; N], OvError> {
        let mut v = [0.0; N];
        for x in &mut v {
            *x = self.f32()?;
        }
        Ok(v)
    }

    fn mat(&mut self) -> Result<glm::Mat4, OvError> {
        Ok(glm::Mat4::from_column_slice(&self.f32s::<16>()?))
    }
}

/// Writes every library mesh followed by the scene's entities
///
/// # Errors
/// May return `OvError`
pub fn write<P: PhysicsWorld, W: Write>(
    writer: W,
    library: &MediaLibrary,
    scene: &Scene<P>,
) -> Result<(), OvError> {
    let mut out = Out(writer);
    write_meshes(&mut out, library.meshes())?;
    write_entities(&mut out, scene)?;
    Ok(())
}

/// Registers the file's meshes with the library and adds its entities to
/// `scene`. Returns the meshes in file order.
///
/// # Errors
/// Returns `ImportError::TruncatedFile` if the data ends early and
/// `ImportError::UnknownMesh` if an entity refers past the mesh section
pub fn read<P: PhysicsWorld, R: Read>(
    reader: R,
    device: &mut dyn GraphicsDevice,
    library: &mut MediaLibrary,
    scene: &mut Scene<P>,
) -> Result<Vec<Arc<Mesh>>, OvError> {
    let mut input = In(reader);
    let meshes = read_meshes(&mut input)?
        .into_iter()
        .map(|m| library.add_mesh(device, m))
        .collect::<Vec<_>>();
    read_entities(&mut input, scene, |i| meshes.get(i).cloned())?;
    Ok(meshes)
}

/// Writes only the entity section
///
/// # Errors
/// May return `OvError`
pub fn write_scene<P: PhysicsWorld, W: Write>(
    writer: W,
    scene: &Scene<P>,
) -> Result<(), OvError> {
    write_entities(&mut Out(writer), scene)
}

/// Reads only the entity section, resolving mesh indices as library ids
///
/// # Errors
/// Returns `ImportError::TruncatedFile` if the data ends early and
/// `ImportError::UnknownMesh` for an id the library does not have
pub fn read_scene<P: PhysicsWorld, R: Read>(
    reader: R,
    library: &MediaLibrary,
    scene: &mut Scene<P>,
) -> Result<(), OvError> {
    read_entities(&mut In(reader), scene, |i| library.mesh(i).cloned())
}

fn write_meshes<W: Write>(
    out: &mut Out<W>,
    meshes: &[Arc<Mesh>],
) -> Result<(), OvError> {
    out.count(meshes.len())?;
    for mesh in meshes {
        out.count(mesh.buffers.vertices.len())?;
        for v in &mesh.buffers.vertices {
            out.f32s(&v.position)?;
            out.f32s(&v.normal)?;
            out.f32s(&v.tex_coord)?;
            for b in v.bones {
                out.u32(b)?;
            }
            out.f32s(&v.weights)?;
        }
        out.count(mesh.buffers.indices.len() / 3)?;
        for i in &mesh.buffers.indices {
            out.u32(*i)?;
        }
        let bones = mesh.skeleton.as_ref().map_or(&[][..], |s| &s.bones);
        out.count(bones.len())?;
        for bone in bones {
            let parent = match bone.parent {
                Some(p) => {
                    i32::try_from(p).map_err(|_| OvError::IndexTooLarge)?
                }
                None => -1,
            };
            out.0.write_all(&parent.to_le_bytes())?;
            out.mat(&bone.matrix)?;
            out.mat(&bone.local_transform)?;
        }
    }
    Ok(())
}

fn read_meshes<R: Read>(input: &mut In<R>) -> Result<Vec<Mesh>, OvError> {
    let count = input.count()?;
    let mut meshes = Vec::with_capacity(count.min(MAX_RESERVE));
    for m in 0..count {
        let vertex_count = input.count()?;
        let mut buffers = Buffers::new();
        buffers.vertices.reserve(vertex_count.min(MAX_RESERVE));
        for _ in 0..vertex_count {
            let position = input.f32s()?;
            let normal = input.f32s()?;
            let tex_coord = input.f32s()?;
            let mut bones = [0; MAX_INFLUENCES];
            for b in &mut bones {
                *b = input.u32()?;
            }
            buffers.vertices.push(Vertex {
                position,
                normal,
                tex_coord,
                bones,
                weights: input.f32s()?,
            });
        }
        let face_count = input.count()?;
        buffers.indices.reserve(face_count.min(MAX_RESERVE) * 3);
        for _ in 0..face_count * 3 {
            let index = input.u32()?;
            if index as usize >= vertex_count {
                return Err(OvError::IndexTooLarge);
            }
            buffers.indices.push(index);
        }
        let bone_count = input.count()?;
        let mut bones = Vec::with_capacity(bone_count.min(MAX_RESERVE));
        for b in 0..bone_count {
            let parent = usize::try_from(input.i32()?).ok();
            let mut bone = Bone::new(&format!("bone.{b}"), b, parent);
            bone.matrix = input.mat()?;
            bone.local_transform = input.mat()?;
            bones.push(bone);
        }
        let mut mesh = Mesh::new(&format!("mesh.{m}"), buffers);
        if !bones.is_empty() {
            mesh.skeleton = Some(Skeleton::new(bones)?);
            mesh.derive_bone_hulls(ImportOptions::default().hull_weight);
        }
        meshes.push(mesh);
    }
    info!("Read {} meshes", meshes.len());
    Ok(meshes)
}

fn write_entities<P: PhysicsWorld, W: Write>(
    out: &mut Out<W>,
    scene: &Scene<P>,
) -> Result<(), OvError> {
    let pose =
        |e: Entity| scene.pose(e).unwrap_or_else(glm::Mat4::identity);

    out.count(scene.objects().len())?;
    for (h, object) in scene.objects().iter() {
        out.count(object.mesh.id)?;
        out.mat(&pose(Entity::Object(h)))?;
    }

    out.count(scene.props().len())?;
    for (h, prop) in scene.props().iter() {
        out.count(prop.mesh.id)?;
        out.mat(&pose(Entity::Prop(h)))?;
    }

    out.count(scene.lights().len())?;
    for (h, light) in scene.lights().iter() {
        let params = match light.kind {
            LightKind::Point { range } => [range, 0.0, 0.0],
            LightKind::Spot {
                range,
                inner_cone,
                outer_cone,
            } => [range, inner_cone, outer_cone],
            LightKind::Directional => [0.0; 3],
        };
        out.u32(light.kind.tag())?;
        out.f32s(&params)?;
        out.f32s(&light.colour)?;
        out.mat(&pose(Entity::Light(h)))?;
    }

    out.count(scene.cameras().len())?;
    for (h, camera) in scene.cameras().iter() {
        let p = camera.properties();
        out.f32s(&[p.aspect_ratio, p.fovy, p.near, p.far])?;
        out.mat(&pose(Entity::Camera(h)))?;
    }
    Ok(())
}

fn read_entities<P: PhysicsWorld, R: Read>(
    input: &mut In<R>,
    scene: &mut Scene<P>,
    resolve: impl Fn(usize) -> Option<Arc<Mesh>>,
) -> Result<(), OvError> {
    let mesh = |input: &mut In<R>| -> Result<Arc<Mesh>, OvError> {
        let index = input.count()?;
        resolve(index)
            .ok_or(OvError::ImportError(ImportError::UnknownMesh(index)))
    };

    for _ in 0..input.count()? {
        let mesh = mesh(input)?;
        let pose = input.mat()?;
        scene.add_object(mesh, &pose);
    }
    for _ in 0..input.count()? {
        let mesh = mesh(input)?;
        let pose = input.mat()?;
        scene.add_prop(mesh, &pose);
    }
    for _ in 0..input.count()? {
        let tag = input.u32()?;
        let [range, inner_cone, outer_cone] = input.f32s()?;
        let kind = match tag {
            0 => LightKind::Point { range },
            1 => LightKind::Spot {
                range,
                inner_cone,
                outer_cone,
            },
            2 => LightKind::Directional,
            _ => return Err(OvError::InvalidFile),
        };
        let colour = input.f32s()?;
        let pose = input.mat()?;
        scene.add_light(kind, colour, &pose);
    }
    for _ in 0..input.count()? {
        let [aspect_ratio, fovy, near, far] = input.f32s()?;
        let pose = input.mat()?;
        let properties = CameraProperties {
            aspect_ratio,
            fovy,
            near,
            far,
        };
        scene.add_camera(properties, &pose);
    }
    info!("Scene now has {} entities", scene.entity_count());
    Ok(())
}
