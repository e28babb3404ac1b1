#![cfg(feature = "integration-tests")]

use std::sync::Arc;

use scene_ngin::{
    camera::FrameUniform,
    context::frame_layout,
    data_structures::{
        material::TextureKind,
        model::{MaterialTexture, Mesh, MeshData, Vertex},
        texture::Texture,
    },
    flow::{CAPTURE_FORMAT, capture_frame},
    pipelines::shader::ShaderProgram,
    resources::texture::material_layout,
};
use wgpu::util::DeviceExt;

const SIZE: (u32, u32) = (256, 256);

struct Gpu {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

async fn headless_gpu() -> Option<Gpu> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::new_without_display_handle());
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .ok()?;
    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            trace: wgpu::Trace::Off,
        })
        .await
        .ok()?;
    Some(Gpu { device, queue })
}

fn frame_bind_group(device: &wgpu::Device) -> wgpu::BindGroup {
    let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Test Frame Buffer"),
        contents: bytemuck::cast_slice(&[FrameUniform::new()]),
        usage: wgpu::BufferUsages::UNIFORM,
    });
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout: &frame_layout(device),
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }],
        label: Some("test_frame_bind_group"),
    })
}

fn clear_colour() -> wgpu::Color {
    wgpu::Color {
        r: 0.39,
        g: 0.58,
        b: 0.93,
        a: 1.0,
    }
}

fn assert_close(pixel: &image::Rgba<u8>, expected: [u8; 4]) {
    for (got, want) in pixel.0.iter().zip(expected) {
        assert!(got.abs_diff(want) <= 1, "pixel {pixel:?}, expected {expected:?}");
    }
}

/// One triangle covering the whole viewport.
fn covering_triangle() -> Vec<Vertex> {
    let corner = |x: f32, y: f32| Vertex {
        position: [x, y, 0.5],
        normal: [0.0, 0.0, 1.0],
        tex_coords: [0.0, 0.0],
    };
    vec![corner(-1.0, -1.0), corner(3.0, -1.0), corner(-1.0, 3.0)]
}

#[tokio::test]
async fn empty_scene_renders_the_clear_colour() {
    let Some(gpu) = headless_gpu().await else {
        eprintln!("no graphics adapter available, skipping");
        return;
    };
    let material_layout = material_layout(&gpu.device);
    let mut program = ShaderProgram::new(
        &gpu.device,
        CAPTURE_FORMAT,
        &frame_layout(&gpu.device),
        &material_layout,
        &ShaderProgram::compile_default().unwrap(),
    );

    let image = capture_frame(
        &gpu.device,
        &gpu.queue,
        &mut program,
        &frame_bind_group(&gpu.device),
        &[],
        clear_colour(),
        SIZE,
    )
    .await
    .unwrap();

    for pixel in image.pixels() {
        assert_close(pixel, [99, 148, 237, 255]);
    }
}

#[tokio::test]
async fn untextured_mesh_samples_the_fallback_texture() {
    let Some(gpu) = headless_gpu().await else {
        eprintln!("no graphics adapter available, skipping");
        return;
    };
    let material_layout = material_layout(&gpu.device);
    let mut program = ShaderProgram::new(
        &gpu.device,
        CAPTURE_FORMAT,
        &frame_layout(&gpu.device),
        &material_layout,
        &ShaderProgram::compile_default().unwrap(),
    );
    let fallback = Texture::create_solid(&gpu.device, &gpu.queue, [255, 255, 255, 255], "white");

    let data = MeshData::<Arc<Texture>>::new("cover", covering_triangle(), vec![0, 1, 2], Vec::new())
        .unwrap();
    let mesh = Mesh::new(&gpu.device, &material_layout, &fallback, data);
    assert_eq!(mesh.index_count(), 3);

    let image = capture_frame(
        &gpu.device,
        &gpu.queue,
        &mut program,
        &frame_bind_group(&gpu.device),
        std::slice::from_ref(&mesh),
        clear_colour(),
        SIZE,
    )
    .await
    .unwrap();

    assert_close(image.get_pixel(SIZE.0 / 2, SIZE.1 / 2), [255, 255, 255, 255]);
    assert_close(image.get_pixel(0, 0), [255, 255, 255, 255]);
    assert_close(image.get_pixel(SIZE.0 - 1, SIZE.1 - 1), [255, 255, 255, 255]);
}

#[tokio::test]
async fn diffuse_sampler_follows_the_texture_order() {
    let Some(gpu) = headless_gpu().await else {
        eprintln!("no graphics adapter available, skipping");
        return;
    };
    let material_layout = material_layout(&gpu.device);
    let mut program = ShaderProgram::new(
        &gpu.device,
        CAPTURE_FORMAT,
        &frame_layout(&gpu.device),
        &material_layout,
        &ShaderProgram::compile_default().unwrap(),
    );
    let fallback = Texture::create_solid(&gpu.device, &gpu.queue, [255, 255, 255, 255], "white");
    let solid = |rgba, label| Arc::new(Texture::create_solid(&gpu.device, &gpu.queue, rgba, label));

    // the specular map takes unit 0, so the diffuse map sits on unit 1
    let data = MeshData::new(
        "cover",
        covering_triangle(),
        vec![0, 1, 2],
        vec![
            MaterialTexture {
                kind: TextureKind::Specular,
                handle: solid([255, 0, 0, 255], "red"),
            },
            MaterialTexture {
                kind: TextureKind::Diffuse,
                handle: solid([0, 255, 0, 255], "green"),
            },
        ],
    )
    .unwrap();
    assert_eq!(data.bindings()[1].unit, 1);
    let mesh = Mesh::new(&gpu.device, &material_layout, &fallback, data);

    let image = capture_frame(
        &gpu.device,
        &gpu.queue,
        &mut program,
        &frame_bind_group(&gpu.device),
        std::slice::from_ref(&mesh),
        clear_colour(),
        SIZE,
    )
    .await
    .unwrap();

    assert_close(image.get_pixel(SIZE.0 / 2, SIZE.1 / 2), [0, 255, 0, 255]);
    assert_close(image.get_pixel(0, 0), [0, 255, 0, 255]);
}

#[tokio::test]
async fn second_mesh_does_not_inherit_the_first_ones_units() {
    let Some(gpu) = headless_gpu().await else {
        eprintln!("no graphics adapter available, skipping");
        return;
    };
    let material_layout = material_layout(&gpu.device);
    let mut program = ShaderProgram::new(
        &gpu.device,
        CAPTURE_FORMAT,
        &frame_layout(&gpu.device),
        &material_layout,
        &ShaderProgram::compile_default().unwrap(),
    );
    let fallback = Texture::create_solid(&gpu.device, &gpu.queue, [255, 255, 255, 255], "white");
    let solid = |rgba, label| Arc::new(Texture::create_solid(&gpu.device, &gpu.queue, rgba, label));
    let texture = |kind, handle| MaterialTexture { kind, handle };

    // drawn first; its diffuse map is on unit 1
    let first = MeshData::new(
        "first",
        covering_triangle(),
        vec![0, 1, 2],
        vec![
            texture(TextureKind::Specular, solid([255, 0, 0, 255], "red")),
            texture(TextureKind::Diffuse, solid([0, 255, 0, 255], "green")),
        ],
    )
    .unwrap();
    // drawn on top with only a specular map, so its diffuse uniform must read unit 0
    let mut second_triangle = covering_triangle();
    for vertex in &mut second_triangle {
        vertex.position[2] = 0.25;
    }
    let second = MeshData::new(
        "second",
        second_triangle,
        vec![0, 1, 2],
        vec![texture(TextureKind::Specular, solid([0, 0, 255, 255], "blue"))],
    )
    .unwrap();
    let meshes = [
        Mesh::new(&gpu.device, &material_layout, &fallback, first),
        Mesh::new(&gpu.device, &material_layout, &fallback, second),
    ];

    let image = capture_frame(
        &gpu.device,
        &gpu.queue,
        &mut program,
        &frame_bind_group(&gpu.device),
        &meshes,
        clear_colour(),
        SIZE,
    )
    .await
    .unwrap();

    assert_close(image.get_pixel(SIZE.0 / 2, SIZE.1 / 2), [0, 0, 255, 255]);
}
