use super::{
    mesh::{Mesh, Subset},
    types::{ImportError, ImportMaterial, ImportOptions, MeshLoaded},
};
use crate::{
    ov_error::OvError,
    vertex::{Buffers, Vertex},
};
use log::{debug, info, warn};
use std::path::Path;

/// Reads an OBJ file and its MTL library from disk
///
/// # Errors
/// May return `OvError`
pub fn load(
    path: &Path,
    options: &ImportOptions,
) -> Result<MeshLoaded, OvError> {
    let parsed = tobj::load_obj(path, &tobj::GPU_LOAD_OPTIONS);
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let name = path
        .file_stem()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("obj");
    process_obj(name, dir, options, parsed)
}

/// Builds a mesh from already parsed OBJ data. Every OBJ model becomes one
/// subset of a single mesh. Texture names are resolved against `dir`.
///
/// # Errors
/// May return `OvError`
pub fn process_obj(
    name: &str,
    dir: &Path,
    options: &ImportOptions,
    parsed: tobj::LoadResult,
) -> Result<MeshLoaded, OvError> {
    let (models, obj_materials) = parsed?;
    let started = std::time::Instant::now();
    let mut buffers = Buffers::new();
    let mut subsets = Vec::with_capacity(models.len());
    let mut missing_normals = false;

    for model in &models {
        let src = &model.mesh;
        if !src.normals.is_empty() && src.normals.len() != src.positions.len()
        {
            return Err(ImportError::CountMismatch.into());
        }
        debug!(
            "Model {:?}: {} positions, {} indices",
            model.name,
            src.positions.len() / 3,
            src.indices.len()
        );
        let base = u32::try_from(buffers.vertices.len())
            .map_err(|_| OvError::VertexCountTooLarge)?;
        let first_index = u32::try_from(buffers.indices.len())
            .map_err(|_| OvError::IndexCountTooLarge)?;
        let index_count = u32::try_from(src.indices.len())
            .map_err(|_| OvError::IndexCountTooLarge)?;
        missing_normals |= src.normals.is_empty();

        let mut normals = src.normals.chunks_exact(3);
        let mut uvs = src.texcoords.chunks_exact(2);
        for p in src.positions.chunks_exact(3) {
            let mut vertex = Vertex {
                position: [
                    p[0] * options.scale,
                    p[1] * options.scale,
                    p[2] * options.scale,
                ],
                ..Vertex::default()
            };
            if let Some(n) = normals.next() {
                vertex.normal = [n[0], n[1], n[2]];
            }
            if let Some(uv) = uvs.next() {
                let v = if options.flip_uvs { 1.0 - uv[1] } else { uv[1] };
                vertex.tex_coord = [uv[0], v];
            }
            buffers.vertices.push(vertex);
        }
        for index in &src.indices {
            let index =
                index.checked_add(base).ok_or(OvError::IndexTooLarge)?;
            buffers.indices.push(index);
        }
        subsets.push(Subset {
            first_index,
            index_count,
            material: src.material_id.unwrap_or(0),
        });
    }

    if buffers.indices.is_empty() {
        return Err(ImportError::NoTriangles.into());
    }
    let mut mesh = Mesh::new(name, buffers);
    mesh.subsets = subsets;
    if missing_normals {
        warn!("{} has no normals so they are generated from faces", name);
        mesh.calculate_normals();
    }
    info!(
        "OBJ {} with {} subsets read in {:?}",
        name,
        mesh.subsets.len(),
        started.elapsed()
    );

    let materials = obj_materials
        .unwrap_or_default()
        .iter()
        .map(|m| import_material(m, dir))
        .collect();
    Ok(MeshLoaded { mesh, materials })
}

/// MTL has no PBR terms. The proposed "Pr" and "Pm" extension keys are read
/// for roughness and metalness when present.
fn import_material(m: &tobj::Material, dir: &Path) -> ImportMaterial {
    let param = |key: &str, default: f32| {
        m.unknown_param
            .get(key)
            .and_then(|v| v.parse::<f32>().ok())
            .unwrap_or(default)
    };
    let colour_filename = if m.diffuse_texture.is_empty() {
        String::new()
    } else {
        dir.join(&m.diffuse_texture).display().to_string()
    };
    debug!("MTL material {:?} uses {:?}", m.name, colour_filename);
    ImportMaterial {
        name: m.name.clone(),
        colour_filename,
        diffuse: m.diffuse,
        roughness: param("Pr", 0.5),
        metalness: param("Pm", 0.0),
    }
}
