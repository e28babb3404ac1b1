use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::data_structures::{
    material::MAX_TEXTURE_UNITS,
    model::{MaterialTexture, MeshData},
    scene::{Scene, SceneData, SceneImage, SceneStats},
    texture::Texture,
};

/**
 * This module contains all logic for loading scenes and their textures from files.
 */
mod gltf_import;
mod obj_import;
pub mod postprocess;
pub mod texture;

use postprocess::{ImportFlags, RawGeometry, join_identical_vertices};

/// A scene file could not be imported. Rendering continues without its meshes.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to import {}: {}", .path.display(), .reason)]
pub struct ImportError {
    pub path: PathBuf,
    pub reason: String,
}

impl ImportError {
    pub fn new(path: &Path, reason: impl fmt::Display) -> Self {
        Self {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

pub async fn load_string(path: &Path) -> anyhow::Result<String> {
    Ok(tokio::fs::read_to_string(path).await?)
}

pub async fn load_binary(path: &Path) -> anyhow::Result<Vec<u8>> {
    Ok(tokio::fs::read(path).await?)
}

/// Read an image referenced by a scene. Unreadable files are logged and kept as
/// empty entries so the material falls back to the default texture.
pub(crate) async fn load_image(path: PathBuf) -> SceneImage {
    let bytes = match load_binary(&path).await {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            log::warn!("Texture {} could not be read: {e}", path.display());
            None
        }
    };
    SceneImage {
        label: path.display().to_string(),
        format: path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase),
        bytes,
    }
}

/// Resolve a path referenced inside a scene file against the scene's directory.
pub(crate) fn resolve_relative(scene: &Path, reference: &str) -> PathBuf {
    scene
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(reference)
}

/// A primitive as produced by an importer, before clean-up and validation.
pub(crate) struct ImportedMesh {
    pub name: String,
    pub geometry: RawGeometry,
    pub textures: Vec<MaterialTexture<usize>>,
}

/// Parse a scene file into CPU-side meshes. The file format follows the extension.
pub async fn import_scene(path: impl AsRef<Path>) -> Result<SceneData, ImportError> {
    let path = path.as_ref();
    let flags = ImportFlags::default();
    log::info!("Loading scene data: {} ({flags:?})", path.display());

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    let (imported, images, mut stats) = match extension.as_str() {
        "gltf" | "glb" => gltf_import::import_gltf(path).await?,
        "obj" => obj_import::import_obj(path).await?,
        _ => return Err(ImportError::new(path, "unsupported scene format")),
    };
    if flags.calc_tangent_space {
        log::debug!("Tangents are not part of the vertex format and are not stored");
    }

    let mut meshes = Vec::with_capacity(imported.len());
    for mut mesh in imported {
        if mesh.textures.len() > MAX_TEXTURE_UNITS {
            let extra: Vec<_> = mesh.textures[MAX_TEXTURE_UNITS..]
                .iter()
                .map(|t| t.kind.to_string())
                .collect();
            log::warn!(
                "Mesh {:?} in {} uses {} textures, only {MAX_TEXTURE_UNITS} sampler units exist; unbound: {}",
                mesh.name,
                path.display(),
                mesh.textures.len(),
                extra.join(", ")
            );
            mesh.textures.truncate(MAX_TEXTURE_UNITS);
        }
        let vertices = mesh.geometry.vertices();
        let (vertices, indices) = if flags.join_identical_vertices {
            join_identical_vertices(&vertices, &mesh.geometry.indices)
        } else {
            (vertices, mesh.geometry.indices)
        };
        match MeshData::new(mesh.name.as_str(), vertices, indices, mesh.textures) {
            Ok(data) => meshes.push(data),
            Err(e) => {
                log::warn!("Mesh {:?} in {} skipped: {e}", mesh.name, path.display());
                stats.dropped_primitives += 1;
            }
        }
    }
    stats.meshes = meshes.len();
    log::info!("Loaded {}: {stats}", path.display());

    Ok(SceneData {
        meshes,
        images,
        stats,
    })
}

/// Import a scene and upload it.
pub async fn load_scene(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    fallback: &Arc<Texture>,
    path: impl AsRef<Path>,
) -> Result<Scene, ImportError> {
    let data = import_scene(path).await?;
    Ok(Scene::upload(device, queue, layout, fallback, data))
}

pub(crate) type Imported = (Vec<ImportedMesh>, Vec<SceneImage>, SceneStats);
