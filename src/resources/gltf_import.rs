//! glTF 2.0 import (`.gltf` with external or embedded buffers, and `.glb`).

use std::path::Path;

use gltf::mesh::Mode;

use crate::{
    data_structures::{
        material::TextureKind,
        model::MaterialTexture,
        scene::{SceneImage, SceneStats},
    },
    resources::{
        ImportError, ImportedMesh, Imported, load_binary, load_image, resolve_relative,
        postprocess::{RawGeometry, triangulate_fan, triangulate_strip},
    },
};

pub(crate) async fn import_gltf(path: &Path) -> Result<Imported, ImportError> {
    let bytes = load_binary(path)
        .await
        .map_err(|e| ImportError::new(path, e))?;
    let gltf = gltf::Gltf::from_slice(&bytes).map_err(|e| ImportError::new(path, e))?;

    // Load buffers
    let mut buffer_data: Vec<Vec<u8>> = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => match gltf.blob.as_deref() {
                Some(blob) => buffer_data.push(blob.into()),
                None => return Err(ImportError::new(path, "binary chunk referenced but missing")),
            },
            gltf::buffer::Source::Uri(uri) if uri.starts_with("data:") => {
                return Err(ImportError::new(path, "embedded data URIs are not supported"));
            }
            gltf::buffer::Source::Uri(uri) => {
                let bin = load_binary(&resolve_relative(path, uri))
                    .await
                    .map_err(|e| ImportError::new(path, format!("buffer {uri}: {e}")))?;
                buffer_data.push(bin);
            }
        }
    }

    // Load images
    let mut images = Vec::new();
    for image in gltf.images() {
        let label = format!("{}#image{}", path.display(), image.index());
        let image = match image.source() {
            gltf::image::Source::View { view, mime_type } => {
                let bytes = buffer_data
                    .get(view.buffer().index())
                    .and_then(|buffer| buffer.get(view.offset()..view.offset() + view.length()))
                    .map(<[u8]>::to_vec);
                if bytes.is_none() {
                    log::warn!("Image view of {label} lies outside its buffer");
                }
                SceneImage {
                    label,
                    bytes,
                    format: mime_type.rsplit('/').next().map(str::to_owned),
                }
            }
            gltf::image::Source::Uri { uri, .. } if uri.starts_with("data:") => {
                log::warn!("{label} uses an embedded data URI, which is not supported");
                SceneImage {
                    label,
                    bytes: None,
                    format: None,
                }
            }
            gltf::image::Source::Uri { uri, .. } => load_image(resolve_relative(path, uri)).await,
        };
        images.push(image);
    }

    let mut stats = SceneStats {
        materials: gltf.materials().count(),
        textures: gltf.textures().count(),
        lights: gltf.lights().map_or(0, |lights| lights.count()),
        cameras: gltf.cameras().count(),
        animations: gltf.animations().count(),
        ..Default::default()
    };

    let mut meshes = Vec::new();
    for mesh in gltf.meshes() {
        let mesh_name = mesh
            .name()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("mesh{}", mesh.index()));
        for primitive in mesh.primitives() {
            let name = format!("{mesh_name}/{}", primitive.index());
            let mode = primitive.mode();
            if !matches!(mode, Mode::Triangles | Mode::TriangleStrip | Mode::TriangleFan) {
                log::debug!("Dropping {name}: {mode:?} primitives are not rendered");
                stats.dropped_primitives += 1;
                continue;
            }

            let reader = primitive.reader(|buffer| buffer_data.get(buffer.index()).map(Vec::as_slice));
            let Some(positions) = reader.read_positions() else {
                log::warn!("Dropping {name}: primitive has no positions");
                stats.dropped_primitives += 1;
                continue;
            };
            let positions: Vec<[f32; 3]> = positions.collect();
            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };
            let indices = match mode {
                Mode::TriangleStrip => triangulate_strip(&indices),
                Mode::TriangleFan => triangulate_fan(&indices),
                _ => indices,
            };
            let geometry = RawGeometry {
                normals: reader.read_normals().map(Iterator::collect).unwrap_or_default(),
                tex_coords: reader
                    .read_tex_coords(0)
                    .map(|uv| uv.into_f32().collect())
                    .unwrap_or_default(),
                positions,
                indices,
            };

            meshes.push(ImportedMesh {
                name,
                geometry,
                textures: material_textures(&primitive.material()),
            });
        }
    }

    Ok((meshes, images, stats))
}

/// Texture slots of a glTF material, mapped onto the engine's texture kinds.
///
/// Most important first: slots past the available sampler units are left unbound.
fn material_textures(material: &gltf::Material) -> Vec<MaterialTexture<usize>> {
    let pbr = material.pbr_metallic_roughness();
    [
        (
            TextureKind::Diffuse,
            pbr.base_color_texture().map(|t| t.texture()),
        ),
        (
            TextureKind::Specular,
            pbr.metallic_roughness_texture().map(|t| t.texture()),
        ),
        (
            TextureKind::Normal,
            material.normal_texture().map(|t| t.texture()),
        ),
        (
            TextureKind::Occlusion,
            material.occlusion_texture().map(|t| t.texture()),
        ),
        (
            TextureKind::Emissive,
            material.emissive_texture().map(|t| t.texture()),
        ),
    ]
    .into_iter()
    .filter_map(|(kind, texture)| {
        texture.map(|texture| MaterialTexture {
            kind,
            handle: texture.source().index(),
        })
    })
    .collect()
}
