//! Imported scenes, before and after upload.
//!
//! [`SceneData`] is what an importer produces: validated meshes whose textures refer
//! to entries of an image list. [`Scene`] is the GPU-resident result of
//! [`Scene::upload`], the ordered list of meshes the frame driver draws.

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    camera::Aabb,
    data_structures::{
        material::TextureKind,
        model::{MaterialTexture, Mesh, MeshData},
        texture::Texture,
    },
};

/// Counts reported by the importer. Only used for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneStats {
    pub meshes: usize,
    pub materials: usize,
    pub textures: usize,
    pub lights: usize,
    pub cameras: usize,
    pub animations: usize,
    /// Point and line primitives, and meshes that failed validation.
    pub dropped_primitives: usize,
}

impl fmt::Display for SceneStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "meshes: {}, materials: {}, textures: {}, lights: {}, cameras: {}, animations: {}, dropped: {}",
            self.meshes,
            self.materials,
            self.textures,
            self.lights,
            self.cameras,
            self.animations,
            self.dropped_primitives
        )
    }
}

/// Encoded image referenced by scene materials.
#[derive(Debug, Clone)]
pub struct SceneImage {
    pub label: String,
    /// Raw file contents, `None` if they could not be read.
    pub bytes: Option<Vec<u8>>,
    /// File extension hint for the decoder.
    pub format: Option<String>,
}

/// CPU-side result of an import. Texture handles index into `images`.
#[derive(Debug, Clone, Default)]
pub struct SceneData {
    pub meshes: Vec<MeshData<usize>>,
    pub images: Vec<SceneImage>,
    pub stats: SceneStats,
}

/// Meshes resident on the GPU, in importer order.
#[derive(Debug, Default)]
pub struct Scene {
    pub meshes: Vec<Mesh>,
    pub stats: SceneStats,
}

impl Scene {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Decode images and upload every mesh.
    ///
    /// Each image is decoded once per colour space and shared by all meshes using it.
    /// Images that cannot be decoded are replaced by `fallback`.
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        fallback: &Arc<Texture>,
        data: SceneData,
    ) -> Self {
        let SceneData {
            meshes,
            images,
            stats,
        } = data;
        let mut cache: HashMap<(usize, bool), Arc<Texture>> = HashMap::new();
        let mut resolve = |t: &MaterialTexture<usize>| -> Result<Arc<Texture>, std::convert::Infallible> {
            let srgb = t.kind.is_srgb();
            let texture = cache
                .entry((t.handle, srgb))
                .or_insert_with(|| decode(device, queue, images.get(t.handle), t.kind, fallback));
            Ok(texture.clone())
        };

        let meshes = meshes
            .into_iter()
            .map(|data| {
                let Ok(data) = data.map_textures(&mut resolve);
                Mesh::new(device, layout, fallback, data)
            })
            .collect::<Vec<_>>();
        log::info!(
            "Uploaded {} meshes with {} distinct textures",
            meshes.len(),
            cache.len()
        );
        Self { meshes, stats }
    }

    pub fn bounds(&self) -> Option<Aabb> {
        self.meshes
            .iter()
            .filter_map(Mesh::bounds)
            .reduce(Aabb::union)
    }
}

fn decode(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    image: Option<&SceneImage>,
    kind: TextureKind,
    fallback: &Arc<Texture>,
) -> Arc<Texture> {
    let Some(image) = image else {
        log::warn!("Material references a missing image; using the fallback texture");
        return fallback.clone();
    };
    let Some(bytes) = &image.bytes else {
        return fallback.clone();
    };
    match Texture::from_bytes(
        device,
        queue,
        bytes,
        &image.label,
        image.format.as_deref(),
        kind.is_srgb(),
    ) {
        Ok(texture) => Arc::new(texture),
        Err(e) => {
            log::warn!("Could not decode {} ({kind}): {e}; using the fallback texture", image.label);
            fallback.clone()
        }
    }
}
