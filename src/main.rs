use std::{path::PathBuf, process::ExitCode};

use clap::Parser;

use scene_ngin::{
    config::Settings,
    flow::{self, StartupError},
    pipelines::shader::{
        DEFAULT_FRAGMENT_SHADER, DEFAULT_VERTEX_SHADER, ShaderError, ShaderProgram, ShaderStage,
        read_stage,
    },
};

/// Render a glTF or OBJ scene with a WGSL shader program.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON settings file. Missing or invalid files fall back to defaults.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,
    /// WGSL vertex stage with a `vs_main` entry point. Built-in shader if omitted.
    #[arg(long)]
    vertex_shader: Option<PathBuf>,
    /// WGSL fragment stage with an `fs_main` entry point. Built-in shader if omitted.
    #[arg(long)]
    fragment_shader: Option<PathBuf>,
}

/// The stage at `path`, or the built-in source when no path was given.
fn stage_source(stage: ShaderStage, path: Option<&PathBuf>, builtin: &str) -> Result<String, ShaderError> {
    match path {
        Some(path) => read_stage(stage, path),
        None => Ok(builtin.to_owned()),
    }
}

fn start(args: &Args) -> Result<(), StartupError> {
    let settings = Settings::load(&args.config);
    log::info!("Settings: {settings:?}");

    let vertex = stage_source(
        ShaderStage::Vertex,
        args.vertex_shader.as_ref(),
        DEFAULT_VERTEX_SHADER,
    )?;
    let fragment = stage_source(
        ShaderStage::Fragment,
        args.fragment_shader.as_ref(),
        DEFAULT_FRAGMENT_SHADER,
    )?;
    let linked = ShaderProgram::compile(&vertex, &fragment)?;
    log::info!("Shader program linked; uniforms: {:?}", linked.uniform_names());

    flow::run(settings, linked)
}

fn main() -> ExitCode {
    let args = Args::parse();
    flow::init_logging();

    match start(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}
