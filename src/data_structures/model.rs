//! Vertices and meshes.
//!
//! [`MeshData`] is the validated CPU-side description of a mesh and can be built
//! without a GPU. [`Mesh`] owns the uploaded buffers and issues the draw call.

use std::{cell::OnceCell, sync::Arc};

use wgpu::util::DeviceExt;

use crate::{
    camera::Aabb,
    data_structures::{
        material::{MAX_TEXTURE_UNITS, TextureBinding, TextureKind, bind_textures},
        texture::{Texture, create_default_sampler},
    },
    pipelines::shader::{MATERIAL_BLOCK_SIZE, ShaderProgram},
};

/// Bind group index of the per-draw material group.
pub const MATERIAL_GROUP: u32 = 1;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
}

impl Vertex {
    const ATTRIBS: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// A texture reference together with the material slot it fills.
///
/// `T` is whatever identifies the texture at the current stage: an image index while
/// importing, an `Arc<Texture>` once uploaded.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialTexture<T> {
    pub kind: TextureKind,
    pub handle: T,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum MeshError {
    #[error("index count {0} is not a multiple of 3")]
    IndexCount(usize),
    #[error("index {index} at position {position} is out of bounds for {vertex_count} vertices")]
    IndexOutOfBounds {
        index: u32,
        position: usize,
        vertex_count: usize,
    },
    #[error("{count} textures exceed the {max} available sampler units")]
    TooManyTextures { count: usize, max: usize },
}

/// Validated geometry and textures of a single mesh.
#[derive(Clone, Debug)]
pub struct MeshData<T> {
    pub name: String,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    textures: Vec<MaterialTexture<T>>,
    bindings: Vec<TextureBinding>,
}

impl<T> MeshData<T> {
    pub fn new(
        name: impl Into<String>,
        vertices: Vec<Vertex>,
        indices: Vec<u32>,
        textures: Vec<MaterialTexture<T>>,
    ) -> Result<Self, MeshError> {
        if indices.len() % 3 != 0 {
            return Err(MeshError::IndexCount(indices.len()));
        }
        if let Some((position, &index)) = indices
            .iter()
            .enumerate()
            .find(|&(_, &i)| i as usize >= vertices.len())
        {
            return Err(MeshError::IndexOutOfBounds {
                index,
                position,
                vertex_count: vertices.len(),
            });
        }
        if textures.len() > MAX_TEXTURE_UNITS {
            return Err(MeshError::TooManyTextures {
                count: textures.len(),
                max: MAX_TEXTURE_UNITS,
            });
        }
        let bindings = bind_textures(textures.iter().map(|t| t.kind));
        Ok(Self {
            name: name.into(),
            vertices,
            indices,
            textures,
            bindings,
        })
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn textures(&self) -> &[MaterialTexture<T>] {
        &self.textures
    }

    pub fn bindings(&self) -> &[TextureBinding] {
        &self.bindings
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.vertices.iter().map(|v| v.position))
    }

    /// Swap the texture handles while keeping geometry and bindings.
    pub fn map_textures<U, E>(
        self,
        mut f: impl FnMut(&MaterialTexture<T>) -> Result<U, E>,
    ) -> Result<MeshData<U>, E> {
        let textures = self
            .textures
            .iter()
            .map(|t| {
                Ok(MaterialTexture {
                    kind: t.kind,
                    handle: f(t)?,
                })
            })
            .collect::<Result<Vec<_>, E>>()?;
        Ok(MeshData {
            name: self.name,
            vertices: self.vertices,
            indices: self.indices,
            textures,
            bindings: self.bindings,
        })
    }
}

/// A mesh resident on the GPU.
///
/// Buffers are immutable after creation and released when the mesh is dropped.
#[derive(Debug)]
pub struct Mesh {
    pub name: String,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    num_elements: u32,
    material_buffer: wgpu::Buffer,
    material_bind_group: wgpu::BindGroup,
    bindings: Vec<TextureBinding>,
    bounds: Option<Aabb>,
}

impl Mesh {
    /// Upload `data` and build the material bind group.
    ///
    /// Texture `i` lands on sampler unit `i`; units without a texture get `fallback`.
    pub fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        fallback: &Texture,
        data: MeshData<Arc<Texture>>,
    ) -> Self {
        let bounds = data.bounds();
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{:?} Vertex Buffer", data.name)),
            contents: bytemuck::cast_slice(&data.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{:?} Index Buffer", data.name)),
            contents: bytemuck::cast_slice(&data.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let material_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{:?} Material Buffer", data.name)),
            size: MATERIAL_BLOCK_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let units: Vec<&Texture> = (0..MAX_TEXTURE_UNITS)
            .map(|unit| {
                data.textures
                    .get(unit)
                    .map(|t| t.handle.as_ref())
                    .unwrap_or(fallback)
            })
            .collect();
        // only created when a unit's texture brings no sampler of its own
        let default_sampler = OnceCell::new();
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: material_buffer.as_entire_binding(),
        }];
        for (unit, texture) in units.iter().enumerate() {
            let sampler = match texture.sampler.as_ref() {
                Some(sampler) => sampler,
                None => default_sampler.get_or_init(|| create_default_sampler(device)),
            };
            entries.push(wgpu::BindGroupEntry {
                binding: texture_binding(unit),
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: sampler_binding(unit),
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        let material_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &entries,
            label: Some(&format!("{:?} Material Bind Group", data.name)),
        });

        Self {
            name: data.name,
            vertex_buffer,
            index_buffer,
            num_elements: data.indices.len() as u32,
            material_buffer,
            material_bind_group,
            bindings: data.bindings,
            bounds,
        }
    }

    pub fn index_count(&self) -> u32 {
        self.num_elements
    }

    pub fn bindings(&self) -> &[TextureBinding] {
        &self.bindings
    }

    pub fn bounds(&self) -> Option<Aabb> {
        self.bounds
    }

    /// Stage this mesh's texture units on `program` and draw all triangles.
    ///
    /// The caller must have activated `program` on `pass`.
    pub fn draw(&self, program: &mut ShaderProgram, queue: &wgpu::Queue, pass: &mut wgpu::RenderPass<'_>) {
        if self.num_elements == 0 {
            return;
        }
        program.bind_material(&self.bindings);
        program.upload_uniforms(queue, &self.material_buffer);

        pass.set_bind_group(MATERIAL_GROUP, &self.material_bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.num_elements, 0, 0..1);
    }
}

/// Binding slot of the texture on sampler unit `unit` within the material group.
pub const fn texture_binding(unit: usize) -> u32 {
    1 + 2 * unit as u32
}

/// Binding slot of the sampler on sampler unit `unit` within the material group.
pub const fn sampler_binding(unit: usize) -> u32 {
    2 + 2 * unit as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(x: f32) -> Vertex {
        Vertex {
            position: [x, 0.0, 0.0],
            ..Default::default()
        }
    }

    fn quad() -> Vec<Vertex> {
        (0..4).map(|i| vertex(i as f32)).collect()
    }

    #[test]
    fn valid_mesh_keeps_every_index() {
        let data = MeshData::<u32>::new("quad", quad(), vec![0, 1, 2, 2, 3, 0], vec![]).unwrap();
        assert_eq!(data.indices().len(), 6);
        assert_eq!(data.vertices().len(), 4);
    }

    #[test]
    fn partial_triangles_are_rejected() {
        let err = MeshData::<u32>::new("quad", quad(), vec![0, 1, 2, 3], vec![]).unwrap_err();
        assert_eq!(err, MeshError::IndexCount(4));
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let err = MeshData::<u32>::new("quad", quad(), vec![0, 1, 4], vec![]).unwrap_err();
        assert_eq!(
            err,
            MeshError::IndexOutOfBounds {
                index: 4,
                position: 2,
                vertex_count: 4
            }
        );
    }

    #[test]
    fn empty_mesh_is_legal() {
        let data = MeshData::<u32>::new("empty", vec![], vec![], vec![]).unwrap();
        assert!(data.bounds().is_none());
    }

    #[test]
    fn too_many_textures_are_rejected() {
        let textures = (0..=MAX_TEXTURE_UNITS as u32)
            .map(|handle| MaterialTexture {
                kind: TextureKind::Diffuse,
                handle,
            })
            .collect();
        let err = MeshData::new("busy", quad(), vec![0, 1, 2], textures).unwrap_err();
        assert!(matches!(err, MeshError::TooManyTextures { .. }));
    }

    #[test]
    fn mapping_textures_keeps_bindings() {
        let textures = vec![
            MaterialTexture {
                kind: TextureKind::Diffuse,
                handle: 7u32,
            },
            MaterialTexture {
                kind: TextureKind::Specular,
                handle: 9u32,
            },
        ];
        let data = MeshData::new("tex", quad(), vec![0, 1, 2], textures).unwrap();
        let mapped = data
            .map_textures(|t| Ok::<_, ()>(format!("img{}", t.handle)))
            .unwrap();
        assert_eq!(mapped.textures()[1].handle, "img9");
        assert_eq!(mapped.bindings()[1].uniform_name, "material.texture_specular1");
    }

    #[test]
    fn vertex_layout_matches_struct_offsets() {
        let layout = Vertex::desc();
        assert_eq!(layout.array_stride, 32);
        let offsets: Vec<_> = layout.attributes.iter().map(|a| a.offset).collect();
        assert_eq!(
            offsets,
            [
                std::mem::offset_of!(Vertex, position) as u64,
                std::mem::offset_of!(Vertex, normal) as u64,
                std::mem::offset_of!(Vertex, tex_coords) as u64,
            ]
        );
    }
}
