use scene_ngin::pipelines::shader::{
    DEFAULT_FRAGMENT_SHADER, DEFAULT_VERTEX_SHADER, ShaderError, ShaderProgram, ShaderStage,
    UniformError, UniformValue,
};

const FLAT_FRAGMENT: &str = r#"
struct FragmentInput {
    @location(0) tex_coords: vec2<f32>,
};

@fragment
fn fs_main(in: FragmentInput) -> @location(0) vec4<f32> {
    return vec4<f32>(in.tex_coords, 0.0, 1.0);
}
"#;

#[test]
fn default_program_exposes_material_uniforms() {
    let linked = ShaderProgram::compile_default().unwrap();
    let names = linked.uniform_names();
    assert!(names.contains("material.texture_diffuse1"));
    assert!(names.contains("material.texture_specular1"));

    let mut uniforms = linked.uniform_block();
    uniforms.set("material.texture_diffuse1", UniformValue::Int(2)).unwrap();
    assert_eq!(uniforms.get("material.texture_diffuse1"), Some(UniformValue::Int(2)));
}

#[test]
fn syntax_error_reports_a_compile_log() {
    let broken = "@fragment fn fs_main( -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";
    match ShaderProgram::compile(DEFAULT_VERTEX_SHADER, broken) {
        Err(ShaderError::Compile { stage, log }) => {
            assert_eq!(stage, ShaderStage::Fragment);
            assert!(!log.trim().is_empty());
        }
        other => panic!("expected a compile error, got {other:?}"),
    }
}

#[test]
fn vertex_errors_are_reported_before_fragment_errors() {
    let result = ShaderProgram::compile("fn vs_main(", "fn fs_main(");
    assert!(matches!(
        result,
        Err(ShaderError::Compile {
            stage: ShaderStage::Vertex,
            ..
        })
    ));
}

#[test]
fn program_without_material_block_links_and_misses_lookups() {
    let linked = ShaderProgram::compile(DEFAULT_VERTEX_SHADER, FLAT_FRAGMENT).unwrap();
    assert!(linked.uniform_names().is_empty());

    let mut uniforms = linked.uniform_block();
    let err = uniforms
        .set("material.texture_diffuse1", UniformValue::Int(0))
        .unwrap_err();
    assert_eq!(err, UniformError::NotFound("material.texture_diffuse1".into()));
    assert_eq!(uniforms.misses(), 1);
}

#[test]
fn unwritten_fragment_input_fails_to_link() {
    let fragment = r#"
@fragment
fn fs_main(@location(5) tint: vec4<f32>) -> @location(0) vec4<f32> {
    return tint;
}
"#;
    match ShaderProgram::compile(DEFAULT_VERTEX_SHADER, fragment) {
        Err(ShaderError::Link { log }) => assert!(log.contains("@location(5)"), "{log}"),
        other => panic!("expected a link error, got {other:?}"),
    }
}

#[test]
fn missing_entry_point_fails_to_link() {
    let fragment = FLAT_FRAGMENT.replace("fs_main", "main");
    match ShaderProgram::compile(DEFAULT_VERTEX_SHADER, &fragment) {
        Err(ShaderError::Link { log }) => assert!(log.contains("fs_main"), "{log}"),
        other => panic!("expected a link error, got {other:?}"),
    }
}

#[test]
fn resources_outside_the_engine_layout_fail_to_link() {
    let fragment = r#"
@group(2) @binding(0)
var<uniform> extra: vec4<f32>;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return extra;
}
"#;
    assert!(matches!(
        ShaderProgram::compile(DEFAULT_VERTEX_SHADER, fragment),
        Err(ShaderError::Link { .. })
    ));
}

#[test]
fn unreadable_shader_file_is_a_read_error() {
    let missing = std::env::temp_dir().join("scene-ngin-missing.wgsl");
    let err = ShaderProgram::from_files(&missing, &missing).unwrap_err();
    assert!(matches!(
        err,
        ShaderError::Read {
            stage: ShaderStage::Vertex,
            ..
        }
    ));
    assert!(DEFAULT_FRAGMENT_SHADER.contains("fs_main"));
}
