//! Shader programs built from a vertex and a fragment WGSL source.
//!
//! Compilation happens in two steps. [`ShaderProgram::compile`] parses and validates
//! each stage with naga and then links them: entry points, the interface between the
//! stages and every resource binding are checked against the engine's bind group
//! layout. This step needs no GPU, so shader mistakes surface before a window exists.
//! [`ShaderProgram::new`] then turns a [`LinkedShader`] into a render pipeline.
//!
//! Per-draw uniforms live in the material block at `@group(1) @binding(0)`. Its
//! scalar members are reflected and can be set by name, e.g.
//! `material.texture_diffuse1`.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fmt,
    path::Path,
};

use naga::{AddressSpace, Binding, ScalarKind, TypeInner};

use crate::{
    camera::FRAME_GROUP,
    data_structures::{
        material::{MAX_TEXTURE_UNITS, TextureBinding},
        model::{MATERIAL_GROUP, Vertex},
        texture::Texture,
    },
    pipelines::basic::mk_render_pipeline,
};

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// Size of the per-mesh material uniform buffer.
pub const MATERIAL_BLOCK_SIZE: wgpu::BufferAddress = 256;

pub const DEFAULT_VERTEX_SHADER: &str = include_str!("mesh.vert.wgsl");
pub const DEFAULT_FRAGMENT_SHADER: &str = include_str!("mesh.frag.wgsl");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn entry_point(self) -> &'static str {
        match self {
            ShaderStage::Vertex => VERTEX_ENTRY,
            ShaderStage::Fragment => FRAGMENT_ENTRY,
        }
    }

    fn naga_stage(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ShaderError {
    #[error("could not read {stage} shader {path}: {source}")]
    Read {
        stage: ShaderStage,
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{stage} shader failed to compile:\n{log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("shader program failed to link:\n{log}")]
    Link { log: String },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum UniformError {
    #[error("uniform `{0}` is not declared by the shader program")]
    NotFound(String),
    #[error("uniform `{name}` is declared as {declared:?} and cannot hold {value:?}")]
    KindMismatch {
        name: String,
        declared: UniformKind,
        value: UniformValue,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Int(i32),
    Float(f32),
}

/// Scalar type of a reflected uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Int,
    Uint,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSlot {
    pub offset: u32,
    pub kind: UniformKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceKind {
    UniformBuffer,
    Texture,
    Sampler,
}

/// Resource the engine binds at `(group, binding)`, if any.
fn engine_resource(group: u32, binding: u32) -> Option<ResourceKind> {
    let units = MAX_TEXTURE_UNITS as u32;
    match (group, binding) {
        (FRAME_GROUP, 0) | (MATERIAL_GROUP, 0) => Some(ResourceKind::UniformBuffer),
        (MATERIAL_GROUP, b) if b <= 2 * units => {
            if b % 2 == 1 {
                Some(ResourceKind::Texture)
            } else {
                Some(ResourceKind::Sampler)
            }
        }
        _ => None,
    }
}

/// Two stages that compiled and linked, plus the reflected material uniforms.
#[derive(Debug, Clone)]
pub struct LinkedShader {
    vertex_source: String,
    fragment_source: String,
    uniforms: HashMap<String, UniformSlot>,
}

impl LinkedShader {
    pub fn uniform_names(&self) -> BTreeSet<&str> {
        self.uniforms.keys().map(String::as_str).collect()
    }

    pub fn uniform(&self, name: &str) -> Option<UniformSlot> {
        self.uniforms.get(name).copied()
    }

    pub fn uniform_block(&self) -> UniformBlock {
        UniformBlock::new(self.uniforms.clone())
    }
}

/// CPU copy of the material block, written by name and uploaded per draw.
///
/// Values set with [`UniformBlock::set`] persist until overwritten.
/// [`UniformBlock::stage_material`] starts every mesh from a zeroed block.
#[derive(Debug, Clone)]
pub struct UniformBlock {
    slots: HashMap<String, UniformSlot>,
    bytes: Vec<u8>,
    reported: HashSet<String>,
    misses: u64,
}

impl UniformBlock {
    fn new(slots: HashMap<String, UniformSlot>) -> Self {
        Self {
            slots,
            bytes: vec![0; MATERIAL_BLOCK_SIZE as usize],
            reported: HashSet::new(),
            misses: 0,
        }
    }

    pub fn set(&mut self, name: &str, value: UniformValue) -> Result<(), UniformError> {
        let Some(slot) = self.slots.get(name).copied() else {
            self.misses += 1;
            if self.reported.insert(name.to_owned()) {
                log::warn!("Uniform `{name}` is not declared by the active shader program");
            }
            return Err(UniformError::NotFound(name.to_owned()));
        };
        let mismatch = || UniformError::KindMismatch {
            name: name.to_owned(),
            declared: slot.kind,
            value,
        };
        let word: [u8; 4] = match (slot.kind, value) {
            (UniformKind::Int, UniformValue::Bool(b)) => (b as i32).to_ne_bytes(),
            (UniformKind::Int, UniformValue::Int(v)) => v.to_ne_bytes(),
            (UniformKind::Uint, UniformValue::Bool(b)) => (b as u32).to_ne_bytes(),
            (UniformKind::Uint, UniformValue::Int(v)) => {
                u32::try_from(v).map_err(|_| mismatch())?.to_ne_bytes()
            }
            (UniformKind::Float, UniformValue::Int(v)) => (v as f32).to_ne_bytes(),
            (UniformKind::Float, UniformValue::Float(v)) => v.to_ne_bytes(),
            _ => return Err(mismatch()),
        };
        let offset = slot.offset as usize;
        self.bytes[offset..offset + 4].copy_from_slice(&word);
        Ok(())
    }

    /// Zero every staged value. Miss counts are kept.
    pub fn reset(&mut self) {
        self.bytes.fill(0);
    }

    /// Reset the block and point each binding's uniform at its sampler unit.
    ///
    /// Names the program does not declare are counted as misses and skipped.
    pub fn stage_material(&mut self, bindings: &[TextureBinding]) {
        self.reset();
        for binding in bindings {
            let _ = self.set(&binding.uniform_name, UniformValue::Int(binding.unit as i32));
        }
    }

    /// Current value of a uniform, decoded with its declared kind.
    pub fn get(&self, name: &str) -> Option<UniformValue> {
        let slot = self.slots.get(name)?;
        let offset = slot.offset as usize;
        let word: [u8; 4] = self.bytes[offset..offset + 4].try_into().ok()?;
        Some(match slot.kind {
            UniformKind::Int => UniformValue::Int(i32::from_ne_bytes(word)),
            UniformKind::Uint => UniformValue::Int(u32::from_ne_bytes(word) as i32),
            UniformKind::Float => UniformValue::Float(f32::from_ne_bytes(word)),
        })
    }

    /// Number of lookups of undeclared uniform names so far.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// A linked program resident on the GPU.
#[derive(Debug)]
pub struct ShaderProgram {
    pipeline: wgpu::RenderPipeline,
    uniforms: UniformBlock,
}

impl ShaderProgram {
    /// Compile both stages and link them.
    ///
    /// Returns the first failing stage's diagnostic, or every link problem found.
    pub fn compile(vertex_source: &str, fragment_source: &str) -> Result<LinkedShader, ShaderError> {
        let vertex = compile_stage(ShaderStage::Vertex, vertex_source)?;
        let fragment = compile_stage(ShaderStage::Fragment, fragment_source)?;
        let uniforms = link(&vertex, &fragment)?;
        Ok(LinkedShader {
            vertex_source: vertex_source.to_owned(),
            fragment_source: fragment_source.to_owned(),
            uniforms,
        })
    }

    /// Read both stages from disk and compile them.
    pub fn from_files(
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
    ) -> Result<LinkedShader, ShaderError> {
        let vertex = read_stage(ShaderStage::Vertex, vertex_path.as_ref())?;
        let fragment = read_stage(ShaderStage::Fragment, fragment_path.as_ref())?;
        Self::compile(&vertex, &fragment)
    }

    /// The built-in textured mesh program.
    pub fn compile_default() -> Result<LinkedShader, ShaderError> {
        Self::compile(DEFAULT_VERTEX_SHADER, DEFAULT_FRAGMENT_SHADER)
    }

    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        frame_layout: &wgpu::BindGroupLayout,
        material_layout: &wgpu::BindGroupLayout,
        linked: &LinkedShader,
    ) -> Self {
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh Pipeline Layout"),
            bind_group_layouts: &[Some(frame_layout), Some(material_layout)],
            immediate_size: 0,
        });
        let vertex = wgpu::ShaderModuleDescriptor {
            label: Some("Mesh Vertex Shader"),
            source: wgpu::ShaderSource::Wgsl(linked.vertex_source.as_str().into()),
        };
        let fragment = wgpu::ShaderModuleDescriptor {
            label: Some("Mesh Fragment Shader"),
            source: wgpu::ShaderSource::Wgsl(linked.fragment_source.as_str().into()),
        };
        let pipeline = mk_render_pipeline(
            device,
            &layout,
            color_format,
            Some(wgpu::BlendState::ALPHA_BLENDING),
            Some(Texture::DEPTH_FORMAT),
            &[Vertex::desc()],
            vertex,
            fragment,
        );
        Self {
            pipeline,
            uniforms: linked.uniform_block(),
        }
    }

    /// Make this program the active one for subsequent draws on `pass`.
    pub fn use_program(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_pipeline(&self.pipeline);
    }

    pub fn set_uniform(&mut self, name: &str, value: UniformValue) -> Result<(), UniformError> {
        self.uniforms.set(name, value)
    }

    /// Stage the sampler units of one mesh's material.
    pub fn bind_material(&mut self, bindings: &[TextureBinding]) {
        self.uniforms.stage_material(bindings);
    }

    pub fn uniforms(&self) -> &UniformBlock {
        &self.uniforms
    }

    /// Copy the staged material block into `buffer`.
    pub fn upload_uniforms(&self, queue: &wgpu::Queue, buffer: &wgpu::Buffer) {
        queue.write_buffer(buffer, 0, self.uniforms.bytes());
    }
}

/// Read the source of one stage from disk.
pub fn read_stage(stage: ShaderStage, path: &Path) -> Result<String, ShaderError> {
    std::fs::read_to_string(path).map_err(|source| ShaderError::Read {
        stage,
        path: path.display().to_string(),
        source,
    })
}

fn compile_stage(stage: ShaderStage, source: &str) -> Result<naga::Module, ShaderError> {
    let diagnostic = |log: String, fallback: String| ShaderError::Compile {
        stage,
        log: if log.trim().is_empty() { fallback } else { log },
    };
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| diagnostic(e.emit_to_string(source), e.to_string()))?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    )
    .validate(&module)
    .map_err(|e| diagnostic(e.emit_to_string(source), e.to_string()))?;
    Ok(module)
}

fn link(vertex: &naga::Module, fragment: &naga::Module) -> Result<HashMap<String, UniformSlot>, ShaderError> {
    let mut log = Vec::new();

    let vs = find_entry(vertex, ShaderStage::Vertex, &mut log);
    let fs = find_entry(fragment, ShaderStage::Fragment, &mut log);
    if let (Some(vs), Some(fs)) = (vs, fs) {
        let outputs: HashSet<u32> = vs
            .function
            .result
            .iter()
            .flat_map(|r| locations(vertex, r.ty, r.binding.as_ref()))
            .collect();
        let mut inputs: Vec<u32> = fs
            .function
            .arguments
            .iter()
            .flat_map(|a| locations(fragment, a.ty, a.binding.as_ref()))
            .collect();
        inputs.sort_unstable();
        for location in inputs.into_iter().filter(|l| !outputs.contains(l)) {
            log.push(format!(
                "fragment input @location({location}) is not written by the vertex stage"
            ));
        }
    }

    let mut declared: HashMap<(u32, u32), (ResourceKind, ShaderStage)> = HashMap::new();
    let mut blocks = Vec::new();
    for (stage, module) in [(ShaderStage::Vertex, vertex), (ShaderStage::Fragment, fragment)] {
        for (_, var) in module.global_variables.iter() {
            let Some(rb) = &var.binding else {
                continue;
            };
            let name = var.name.as_deref().unwrap_or("<unnamed>");
            let Some(kind) = resource_kind(module, var) else {
                log.push(format!("{stage} resource `{name}` has an unsupported address space or type"));
                continue;
            };
            match engine_resource(rb.group, rb.binding) {
                Some(expected) if expected == kind => {}
                Some(expected) => log.push(format!(
                    "{stage} resource `{name}` at @group({}) @binding({}) is a {kind:?}, the engine binds a {expected:?}",
                    rb.group, rb.binding
                )),
                None => log.push(format!(
                    "{stage} resource `{name}` at @group({}) @binding({}) is not provided by the engine",
                    rb.group, rb.binding
                )),
            }
            match declared.get(&(rb.group, rb.binding)) {
                Some((other, other_stage)) if *other != kind => log.push(format!(
                    "@group({}) @binding({}) is a {other:?} in the {other_stage} stage but a {kind:?} in the {stage} stage",
                    rb.group, rb.binding
                )),
                _ => {
                    declared.insert((rb.group, rb.binding), (kind, stage));
                }
            }
            if (rb.group, rb.binding) == (MATERIAL_GROUP, 0) && kind == ResourceKind::UniformBuffer {
                blocks.push((stage, reflect_block(module, var)));
            }
        }
    }

    let mut uniforms = HashMap::new();
    for (stage, (slots, span)) in blocks {
        if u64::from(span) > MATERIAL_BLOCK_SIZE {
            log.push(format!(
                "{stage} material block is {span} bytes, at most {MATERIAL_BLOCK_SIZE} are available"
            ));
        }
        if uniforms.is_empty() {
            uniforms = slots;
        } else if uniforms != slots {
            log.push("the material block is declared differently in the two stages".to_string());
        }
    }

    if log.is_empty() {
        Ok(uniforms)
    } else {
        Err(ShaderError::Link {
            log: log.join("\n"),
        })
    }
}

fn find_entry<'m>(
    module: &'m naga::Module,
    stage: ShaderStage,
    log: &mut Vec<String>,
) -> Option<&'m naga::EntryPoint> {
    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.name == stage.entry_point() && ep.stage == stage.naga_stage());
    if entry.is_none() {
        log.push(format!(
            "{stage} source has no @{stage} entry point named `{}`",
            stage.entry_point()
        ));
    }
    entry
}

/// User-defined IO locations of an argument or result, looking into structs.
fn locations(module: &naga::Module, ty: naga::Handle<naga::Type>, binding: Option<&Binding>) -> Vec<u32> {
    match binding {
        Some(Binding::Location { location, .. }) => vec![*location],
        Some(Binding::BuiltIn(_)) => Vec::new(),
        None => match &module.types[ty].inner {
            TypeInner::Struct { members, .. } => members
                .iter()
                .filter_map(|m| match &m.binding {
                    Some(Binding::Location { location, .. }) => Some(*location),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        },
    }
}

fn resource_kind(module: &naga::Module, var: &naga::GlobalVariable) -> Option<ResourceKind> {
    match var.space {
        AddressSpace::Uniform => Some(ResourceKind::UniformBuffer),
        AddressSpace::Handle => match module.types[var.ty].inner {
            TypeInner::Image { .. } => Some(ResourceKind::Texture),
            TypeInner::Sampler { .. } => Some(ResourceKind::Sampler),
            _ => None,
        },
        _ => None,
    }
}

fn uniform_kind(inner: &TypeInner) -> Option<UniformKind> {
    match inner {
        TypeInner::Scalar(scalar) if scalar.width == 4 => match scalar.kind {
            ScalarKind::Sint => Some(UniformKind::Int),
            ScalarKind::Uint => Some(UniformKind::Uint),
            ScalarKind::Float => Some(UniformKind::Float),
            _ => None,
        },
        _ => None,
    }
}

/// Named scalar slots of a uniform block and the block's size in bytes.
fn reflect_block(module: &naga::Module, var: &naga::GlobalVariable) -> (HashMap<String, UniformSlot>, u32) {
    let var_name = var.name.clone().unwrap_or_default();
    let inner = &module.types[var.ty].inner;
    let mut slots = HashMap::new();
    match inner {
        TypeInner::Struct { members, span } => {
            for member in members {
                let (Some(name), Some(kind)) = (&member.name, uniform_kind(&module.types[member.ty].inner)) else {
                    continue;
                };
                slots.insert(
                    format!("{var_name}.{name}"),
                    UniformSlot {
                        offset: member.offset,
                        kind,
                    },
                );
            }
            (slots, *span)
        }
        _ => {
            if let Some(kind) = uniform_kind(inner) {
                slots.insert(var_name, UniformSlot { offset: 0, kind });
            }
            (slots, inner.size(module.to_ctx()))
        }
    }
}
