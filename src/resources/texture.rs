use crate::data_structures::{
    material::MAX_TEXTURE_UNITS,
    model::{sampler_binding, texture_binding},
};

/// Layout of the per-draw material group: the uniform block followed by one
/// texture/sampler pair per sampler unit.
pub fn material_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let visibility = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
    let mut entries = vec![wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }];
    for unit in 0..MAX_TEXTURE_UNITS {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: texture_binding(unit),
            visibility,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2,
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: sampler_binding(unit),
            visibility,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &entries,
        label: Some("material_bind_group_layout"),
    })
}

/// Sampler units available on `device`, never more than the material layout provides.
pub fn available_texture_units(device: &wgpu::Device) -> usize {
    (device.limits().max_sampled_textures_per_shader_stage as usize).min(MAX_TEXTURE_UNITS)
}
