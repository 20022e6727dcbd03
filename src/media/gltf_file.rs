// Some code inspired by
// https://github.com/KhronosGroup/glTF-Tutorials/

use super::{
    mesh::{Mesh, Subset},
    types::{ImportError, ImportMaterial, ImportOptions, MeshLoaded},
};
use crate::{
    anim::{util, Animation, Bone, Channel, QuatKey, Skeleton, VectorKey},
    math,
    ov_error::OvError,
    vertex::{Buffers, Vertex},
};
use ahash::AHashMap;
use gltf::{
    accessor::Iter,
    animation::{util::ReadOutputs, Interpolation},
    buffer::Data,
    image::Source,
    mesh::Mode,
    Document, Gltf,
};
use log::{debug, error, info, warn};
use nalgebra_glm as glm;
use std::{fs, io, path::Path, sync::Arc};

/// Bones beyond this cannot be addressed by the skinning shaders
pub const MAX_BONES: usize = 128;

fn load_impl(path: &Path) -> Result<(Document, Vec<Data>), OvError> {
    let base = path.parent().unwrap_or_else(|| Path::new("./"));
    let file = fs::File::open(path)?;
    let reader = io::BufReader::new(file);
    let gltf = Gltf::from_reader(reader)?;
    let buffers = gltf::import_buffers(&gltf.document, Some(base), gltf.blob)?;
    info!(
        "{:?}, base path={:?}, buffer count={}",
        path,
        base,
        buffers.len(),
    );
    Ok((gltf.document, buffers))
}

/// Loads a glTF file as one mesh. Every primitive of every mesh becomes a
/// subset. The first skin, if any, becomes the skeleton and every animation
/// in the file is attached to it.
///
/// # Errors
/// May return `OvError`
pub fn load(
    path: &Path,
    import_options: &ImportOptions,
) -> Result<MeshLoaded, OvError> {
    let (document, buffers) = load_impl(path)?;
    let name = path
        .file_stem()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("gltf");
    let mut mesh = load_geometry(name, &document, &buffers, import_options)?;

    if let Some(skin) = document.skins().next() {
        if document.skins().count() > 1 {
            warn!("Only the first of {} skins is used", document.skins().count());
        }
        let (mut skeleton, node_to_bone) =
            load_skeleton(&document, &skin, &buffers, import_options.scale)?;
        let bone_count = skeleton.bones.len();
        if mesh
            .buffers
            .vertices
            .iter()
            .any(|v| v.bones.iter().any(|b| *b as usize >= bone_count))
        {
            return Err(ImportError::BigJointIndices.into());
        }
        skeleton.animations = load_animations(
            &document,
            &buffers,
            &node_to_bone,
            import_options.scale,
        )?;
        info!(
            "Skeleton with {} bones and {} animations",
            bone_count,
            skeleton.animations.len()
        );
        mesh.skeleton = Some(skeleton);
        mesh.derive_bone_hulls(import_options.hull_weight);
    }

    let base_path = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(MeshLoaded {
        mesh,
        materials: load_materials(base_path, &document),
    })
}

fn load_geometry(
    name: &str,
    document: &Document,
    buffers: &[Data],
    import_options: &ImportOptions,
) -> Result<Mesh, OvError> {
    let scale = import_options.scale;
    let mut out = Buffers::new();
    let mut subsets = Vec::new();

    for m in document.meshes() {
        info!("mesh={}, name={:?}", m.index(), m.name());
        for p in m.primitives() {
            if p.mode() != Mode::Triangles {
                error!("Not a triangle mesh");
                return Err(ImportError::NoTriangles.into());
            }
            let reader = p.reader(|x| Some(&buffers[x.index()]));
            let base = u32::try_from(out.vertices.len())
                .map_err(|_| OvError::VertexCountTooLarge)?;
            let first_index = u32::try_from(out.indices.len())
                .map_err(|_| OvError::IndexCountTooLarge)?;

            let Iter::Standard(positions) =
                reader.read_positions().ok_or(ImportError::NoPositions)?
            else {
                return Err(ImportError::SparseMesh.into());
            };
            let mut verts: Vec<Vertex> = positions
                .map(|p| Vertex {
                    position: [p[0] * scale, p[1] * scale, p[2] * scale],
                    ..Vertex::default()
                })
                .collect();

            let Iter::Standard(normals) =
                reader.read_normals().ok_or(ImportError::NoNormals)?
            else {
                return Err(ImportError::SparseMesh.into());
            };
            let mut normal_count = 0;
            for (v, n) in verts.iter_mut().zip(normals) {
                v.normal = n;
                normal_count += 1;
            }
            if normal_count != verts.len() {
                return Err(ImportError::CountMismatch.into());
            }

            if let Some(uvs) = reader.read_tex_coords(0) {
                for (v, uv) in verts.iter_mut().zip(uvs.into_f32()) {
                    v.tex_coord = uv;
                }
            }

            if let Some(joints) = reader.read_joints(0) {
                let weights = reader
                    .read_weights(0)
                    .ok_or(ImportError::NoWeights)?
                    .into_f32();
                for ((v, j), w) in verts.iter_mut().zip(joints.into_u16()).zip(weights)
                {
                    v.bones = j.map(u32::from);
                    v.weights = w;
                }
            }

            let indices = reader.read_indices().ok_or(ImportError::NoIndices)?;
            let count_before = out.indices.len();
            out.indices.extend(indices.into_u32().map(|i| i + base));
            let index_count = u32::try_from(out.indices.len() - count_before)
                .map_err(|_| OvError::IndexCountTooLarge)?;
            info!(
                "Submesh={}, Index count={}, Vertex count={}",
                p.index(),
                index_count,
                verts.len(),
            );
            out.vertices.append(&mut verts);
            subsets.push(Subset {
                first_index,
                index_count,
                material: p.material().index().unwrap_or(0),
            });
        }
    }

    if out.indices.is_empty() {
        return Err(ImportError::NoTriangles.into());
    }
    let mut mesh = Mesh::new(name, out);
    mesh.subsets = subsets;
    Ok(mesh)
}

/// Local transform of a node as a row-vector matrix
fn node_local(node: &gltf::Node, scale: f32) -> glm::Mat4 {
    let (t, r, s) = node.transform().decomposed();
    util::compose(
        &(glm::Vec3::from(t) * scale),
        &glm::Quat::from(r),
        &glm::Vec3::from(s),
    )
}

fn load_skeleton(
    document: &Document,
    skin: &gltf::Skin,
    buffers: &[Data],
    scale: f32,
) -> Result<(Skeleton, AHashMap<usize, usize>), OvError> {
    // Parent of every node in the file
    let mut parents = AHashMap::<usize, usize>::new();
    for node in document.nodes() {
        for child in node.children() {
            parents.insert(child.index(), node.index());
        }
    }
    let nodes: Vec<gltf::Node> = document.nodes().collect();

    let joints: Vec<gltf::Node> = skin.joints().collect();
    if joints.len() > MAX_BONES {
        return Err(ImportError::TooManyBones(joints.len()).into());
    }
    let node_to_bone: AHashMap<usize, usize> = joints
        .iter()
        .enumerate()
        .map(|(i, n)| (n.index(), i))
        .collect();

    let reader = skin.reader(|x| Some(&buffers[x.index()]));
    let inverse_binds: Vec<glm::Mat4> = reader
        .read_inverse_bind_matrices()
        .ok_or(ImportError::NoInverseBind)?
        .map(|m| {
            let mut m = glm::Mat4::from(m).transpose();
            let t = math::get_translation(&m) * scale;
            math::set_translation(&mut m, &t);
            m
        })
        .collect();
    if inverse_binds.len() != joints.len() {
        return Err(ImportError::CountMismatch.into());
    }

    // Nearest ancestor that is also a joint
    let joint_parent = |mut node: usize| -> Option<usize> {
        while let Some(p) = parents.get(&node) {
            if let Some(bone) = node_to_bone.get(p) {
                return Some(*bone);
            }
            node = *p;
        }
        None
    };

    let mut bones: Vec<Bone> = joints
        .iter()
        .enumerate()
        .map(|(i, node)| {
            let name = node.name().map_or_else(
                || format!("node.{}", node.index()),
                ToString::to_string,
            );
            let mut bone = Bone::new(&name, i, joint_parent(node.index()));
            bone.matrix = math::inverse(&inverse_binds[i]);
            bone.local_transform = node_local(node, scale);
            bone
        })
        .collect();

    let mut node_to_bone = node_to_bone.clone();
    let roots: Vec<usize> = bones
        .iter()
        .filter(|b| b.parent.is_none())
        .map(|b| b.index)
        .collect();
    if roots.len() > 1 {
        // Joints hang off a node that is not itself a joint. It becomes an
        // extra bone which no vertex references.
        let common = skin
            .skeleton()
            .map(|n| n.index())
            .or_else(|| parents.get(&joints[roots[0]].index()).copied())
            .ok_or(ImportError::NoRootNode(skin.index()))?;
        let index = bones.len();
        let node = &nodes[common];
        let mut root = Bone::new(
            node.name().unwrap_or("root"),
            index,
            None,
        );
        root.local_transform = node_local(node, scale);
        root.matrix = root.local_transform;
        let mut ancestor = parents.get(&common).copied();
        while let Some(a) = ancestor {
            root.matrix *= node_local(&nodes[a], scale);
            ancestor = parents.get(&a).copied();
        }
        for r in roots {
            let mut chain = parents.get(&joints[r].index()).copied();
            while chain.is_some_and(|c| c != common) {
                chain = chain.and_then(|c| parents.get(&c).copied());
            }
            if chain.is_none() {
                return Err(ImportError::ConflictingRootNodes(skin.index()).into());
            }
            bones[r].parent = Some(index);
        }
        debug!("Added root node {} for skin {}", common, skin.index());
        bones.push(root);
        node_to_bone.insert(common, index);
    }

    for (i, node) in joints.iter().enumerate() {
        let (_, _, s) = node.transform().decomposed();
        let compare = glm::not_equal_eps(
            &glm::Vec3::from(s),
            &glm::vec3(1.0, 1.0, 1.0),
            0.005,
        );
        if compare.x || compare.y || compare.z {
            warn!("Joint {} is scaled, hulls may be distorted", i);
        }
    }

    Ok((Skeleton::new(bones)?, node_to_bone))
}

/// Every glTF animation that targets at least one bone
fn load_animations(
    document: &Document,
    buffers: &[Data],
    node_to_bone: &AHashMap<usize, usize>,
    scale: f32,
) -> Result<Vec<Arc<Animation>>, OvError> {
    let mut animations = Vec::new();
    for animation in document.animations() {
        let mut channels = AHashMap::<usize, Channel>::new();
        for channel in animation.channels() {
            let node = channel.target().node().index();
            let Some(bone) = node_to_bone.get(&node).copied() else {
                debug!("Animation channel for non-bone node {} skipped", node);
                continue;
            };
            let interpolation = channel.sampler().interpolation();
            let reader = channel.reader(|x| Some(&buffers[x.index()]));
            let times: Vec<f32> = match reader.read_inputs() {
                Some(Iter::Standard(times)) => times.collect(),
                Some(Iter::Sparse(_)) => {
                    return Err(ImportError::SparseAnimation.into())
                }
                None => return Err(ImportError::NoSampler.into()),
            };
            let target = channels.entry(bone).or_insert_with(|| Channel {
                index: bone,
                ..Channel::default()
            });
            // Cubic spline outputs are (in tangent, value, out tangent)
            let pick = |i: usize| {
                interpolation != Interpolation::CubicSpline || i % 3 == 1
            };
            match reader.read_outputs().ok_or(ImportError::NoSampler)? {
                ReadOutputs::Translations(it) => {
                    let values = it.enumerate().filter(|(i, _)| pick(*i));
                    target.positions = times
                        .iter()
                        .zip(values)
                        .map(|(time, (_, v))| VectorKey {
                            time: *time,
                            value: glm::Vec3::from(v) * scale,
                        })
                        .collect();
                }
                ReadOutputs::Rotations(it) => {
                    let values =
                        it.into_f32().enumerate().filter(|(i, _)| pick(*i));
                    target.rotations = times
                        .iter()
                        .zip(values)
                        .map(|(time, (_, q))| QuatKey {
                            time: *time,
                            value: glm::Quat::from(q),
                        })
                        .collect();
                }
                ReadOutputs::Scales(it) => {
                    let values = it.enumerate().filter(|(i, _)| pick(*i));
                    target.scales = times
                        .iter()
                        .zip(values)
                        .map(|(time, (_, s))| VectorKey {
                            time: *time,
                            value: glm::Vec3::from(s),
                        })
                        .collect();
                }
                ReadOutputs::MorphTargetWeights(_) => {
                    error!("Morphing not supported");
                    return Err(ImportError::Morphing.into());
                }
            }
        }
        if channels.is_empty() {
            continue;
        }
        let mut channels: Vec<Channel> = channels.into_values().collect();
        channels.sort_unstable_by_key(|c| c.index);
        let name = animation.name().map_or_else(
            || format!("animation.{}", animation.index()),
            ToString::to_string,
        );
        let animation = Animation::new(&name, channels);
        debug!(
            "Animation {} from {} to {}",
            animation.name, animation.start_time, animation.end_time
        );
        animations.push(Arc::new(animation));
    }
    Ok(animations)
}

fn load_materials(
    base_path: &Path,
    document: &Document,
) -> Vec<ImportMaterial> {
    info!("Materials={}", document.materials().count());
    document
        .materials()
        .map(|m| {
            let pbr = m.pbr_metallic_roughness();
            let base = pbr.base_color_factor();
            let colour_filename =
                pbr.base_color_texture().map_or_else(String::new, |tex| {
                    if let Source::Uri { uri, mime_type: _ } =
                        tex.texture().source().source()
                    {
                        base_path.join(uri).display().to_string()
                    } else {
                        warn!("Embedded images are not supported");
                        String::new()
                    }
                });
            ImportMaterial {
                name: m.name().unwrap_or("N/A").to_string(),
                colour_filename,
                diffuse: [base[0], base[1], base[2]],
                roughness: pbr.roughness_factor(),
                metalness: pbr.metallic_factor(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_an_io_error() {
        let result = load(Path::new("no/such/file.gltf"), &ImportOptions::default());
        assert!(matches!(result, Err(OvError::StdIoError(_))));
    }
}
