//! Wavefront OBJ import, with materials from the referenced `.mtl` libraries.

use std::{
    collections::HashMap,
    io::{BufReader, Cursor},
    path::{Path, PathBuf},
};

use futures::future::join_all;

use crate::{
    data_structures::{
        material::TextureKind,
        model::MaterialTexture,
        scene::SceneStats,
    },
    resources::{
        ImportError, ImportedMesh, Imported, load_image, load_string, resolve_relative,
        postprocess::RawGeometry,
    },
};

pub(crate) async fn import_obj(path: &Path) -> Result<Imported, ImportError> {
    let obj_text = load_string(path)
        .await
        .map_err(|e| ImportError::new(path, e))?;
    let mut obj_reader = BufReader::new(Cursor::new(obj_text));

    let (models, obj_materials) = tobj::load_obj_buf_async(
        &mut obj_reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |p| {
            let mtl_path = resolve_relative(path, &p);
            async move {
                match load_string(&mtl_path).await {
                    Ok(mat_text) => tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(mat_text))),
                    Err(e) => {
                        log::warn!("Material library {} not found: {e}", mtl_path.display());
                        Err(tobj::LoadError::OpenFileFailed)
                    }
                }
            }
        },
    )
    .await
    .map_err(|e| ImportError::new(path, e))?;

    let obj_materials = obj_materials.unwrap_or_else(|e| {
        log::warn!("Materials of {} could not be loaded: {e}", path.display());
        Vec::new()
    });

    // Every distinct texture file becomes one image entry.
    let mut image_paths: Vec<PathBuf> = Vec::new();
    let mut image_index: HashMap<PathBuf, usize> = HashMap::new();
    let materials: Vec<Vec<MaterialTexture<usize>>> = obj_materials
        .iter()
        .map(|m| {
            [
                (TextureKind::Diffuse, &m.diffuse_texture),
                (TextureKind::Specular, &m.specular_texture),
                (TextureKind::Normal, &m.normal_texture),
                (TextureKind::Height, &m.shininess_texture),
            ]
            .into_iter()
            .filter_map(|(kind, file)| {
                let file = file.as_deref().filter(|f| !f.is_empty())?;
                let image_path = resolve_relative(path, file);
                let handle = *image_index.entry(image_path.clone()).or_insert_with(|| {
                    image_paths.push(image_path);
                    image_paths.len() - 1
                });
                Some(MaterialTexture { kind, handle })
            })
            .collect()
        })
        .collect();

    let images = join_all(image_paths.into_iter().map(load_image)).await;

    let meshes = models
        .into_iter()
        .map(|m| {
            let mesh = m.mesh;
            let textures = mesh
                .material_id
                .and_then(|id| materials.get(id))
                .cloned()
                .unwrap_or_default();
            ImportedMesh {
                name: m.name,
                geometry: RawGeometry {
                    positions: mesh
                        .positions
                        .chunks_exact(3)
                        .map(|p| [p[0], p[1], p[2]])
                        .collect(),
                    normals: mesh
                        .normals
                        .chunks_exact(3)
                        .map(|n| [n[0], n[1], n[2]])
                        .collect(),
                    // OBJ puts the texture origin at the bottom left
                    tex_coords: mesh
                        .texcoords
                        .chunks_exact(2)
                        .map(|t| [t[0], 1.0 - t[1]])
                        .collect(),
                    indices: mesh.indices,
                },
                textures,
            }
        })
        .collect();

    let stats = SceneStats {
        materials: obj_materials.len(),
        textures: images.len(),
        ..Default::default()
    };
    Ok((meshes, images, stats))
}
