//! Frame driver and application event loop.
//!
//! [`run`] opens the window, creates the GPU context, imports the configured scene and
//! then drives frames until the window is closed. Every frame follows the same order:
//!
//! 1. Clear colour and depth
//! 2. Run the [`FrameUpdate`] hook
//! 3. Activate the shader program
//! 4. Draw each mesh of the scene in import order
//! 5. Submit the command buffer and present
//!
//! Frames are paced by [`FramePacer`], which schedules wake-ups with
//! [`ControlFlow::WaitUntil`] instead of sleeping, so input is handled while waiting.

use std::{
    iter,
    time::{Duration, Instant},
};

use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window},
};

use crate::{
    camera::FRAME_GROUP,
    config::Settings,
    context::{Context, ContextError},
    data_structures::{model::Mesh, scene::Scene},
    pipelines::shader::{LinkedShader, ShaderError, ShaderProgram},
    resources::load_scene,
};

/// Lifecycle of the frame loop.
///
/// A quit request never interrupts a frame: the loop finishes the current iteration
/// and stops afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Running,
    Quitting,
    Stopped,
}

impl LoopState {
    pub fn request_quit(&mut self) {
        if *self == LoopState::Running {
            *self = LoopState::Quitting;
        }
    }

    /// Called at the end of every loop iteration.
    pub fn end_iteration(&mut self) {
        if *self == LoopState::Quitting {
            *self = LoopState::Stopped;
        }
    }

    pub fn is_running(self) -> bool {
        self == LoopState::Running
    }
}

/// Schedules frames at a fixed rate without blocking the event loop.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Duration,
    next_frame: Instant,
    last_frame: Option<Instant>,
}

impl FramePacer {
    /// A `target_fps` of zero renders as fast as the loop allows.
    pub fn new(target_fps: u32, now: Instant) -> Self {
        let interval = if target_fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(1_000_000_000 / u64::from(target_fps))
        };
        Self {
            interval,
            next_frame: now,
            last_frame: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_frame(&self) -> Instant {
        self.next_frame
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_frame
    }

    /// Record a frame starting at `now` and return the time since the previous one.
    ///
    /// A loop that fell behind resumes from `now` rather than rendering a burst of
    /// late frames.
    pub fn begin_frame(&mut self, now: Instant) -> Duration {
        let dt = self
            .last_frame
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        self.last_frame = Some(now);
        self.next_frame += self.interval;
        if self.next_frame < now {
            self.next_frame = now + self.interval;
        }
        dt
    }
}

/// Per-frame hook run between clearing and drawing. Does nothing by default.
pub trait FrameUpdate {
    fn update(&mut self, _ctx: &Context, _scene: &mut Scene, _dt: Duration) {}
}

impl FrameUpdate for () {}

/// Startup failed before the first frame.
#[derive(thiserror::Error, Debug)]
pub enum StartupError {
    #[error("event loop: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("window creation failed: {0}")]
    Window(#[from] winit::error::OsError),
    #[error("GPU context creation failed: {0}")]
    Context(#[from] ContextError),
    #[error(transparent)]
    Shader(#[from] ShaderError),
}

impl StartupError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            StartupError::EventLoop(_) | StartupError::Window(_) => 2,
            StartupError::Context(_) => 3,
            StartupError::Shader(_) => 4,
        }
    }
}

/// Install the `env_logger` backend. `RUST_LOG` selects levels, `info` by default.
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("info");
    if let Err(e) = env_logger::Builder::from_env(env).try_init() {
        println!("Warning: Could not initialize logger: {}", e);
    }
}

/// GPU state that exists once the window does.
#[derive(Debug)]
struct AppState {
    ctx: Context,
    program: ShaderProgram,
    scene: Scene,
    is_surface_configured: bool,
}

impl AppState {
    fn resize(&mut self, width: u32, height: u32) {
        if self.ctx.resize(width, height) {
            self.is_surface_configured = true;
        }
    }

    fn render(&mut self, update: &mut impl FrameUpdate, dt: Duration) -> Result<(), wgpu::SurfaceError> {
        // Rendering requires the surface to be configured
        if !self.is_surface_configured {
            return Ok(());
        }

        let output = self.ctx.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut render_pass = begin_frame_pass(
                &mut encoder,
                &view,
                &self.ctx.depth_texture.view,
                self.ctx.clear_colour,
            );
            update.update(&self.ctx, &mut self.scene, dt);
            draw_meshes(
                &mut render_pass,
                &mut self.program,
                &self.ctx.queue,
                &self.ctx.frame_bind_group,
                &self.scene.meshes,
            );
        }

        self.ctx.queue.submit(iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

/// Start a pass that clears `view` to `clear_colour` and `depth_view` to the far plane.
pub fn begin_frame_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    depth_view: &wgpu::TextureView,
    clear_colour: wgpu::Color,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Render Pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(clear_colour),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: depth_view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        occlusion_query_set: None,
        timestamp_writes: None,
        multiview_mask: None,
    })
}

/// Activate `program` and draw `meshes` in order.
pub fn draw_meshes(
    render_pass: &mut wgpu::RenderPass<'_>,
    program: &mut ShaderProgram,
    queue: &wgpu::Queue,
    frame_bind_group: &wgpu::BindGroup,
    meshes: &[Mesh],
) {
    program.use_program(render_pass);
    render_pass.set_bind_group(FRAME_GROUP, frame_bind_group, &[]);
    for mesh in meshes {
        mesh.draw(program, queue, render_pass);
    }
}

pub struct App<U: FrameUpdate = ()> {
    async_runtime: tokio::runtime::Runtime,
    settings: Settings,
    linked: LinkedShader,
    update: U,
    state: Option<AppState>,
    loop_state: LoopState,
    pacer: FramePacer,
    error: Option<StartupError>,
}

impl<U: FrameUpdate> App<U> {
    pub fn new(
        async_runtime: tokio::runtime::Runtime,
        settings: Settings,
        linked: LinkedShader,
        update: U,
    ) -> Self {
        let pacer = FramePacer::new(settings.target_fps, Instant::now());
        Self {
            async_runtime,
            settings,
            linked,
            update,
            state: None,
            loop_state: LoopState::Running,
            pacer,
            error: None,
        }
    }

    pub fn loop_state(&self) -> LoopState {
        self.loop_state
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: StartupError) {
        log::error!("{error}");
        self.error = Some(error);
        self.loop_state = LoopState::Stopped;
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<AppState, StartupError> {
        let mut window_attributes = Window::default_attributes()
            .with_title(self.settings.win_title.clone())
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.settings.screen_width,
                self.settings.screen_height,
            ));
        if self.settings.fullscreen {
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        let window = std::sync::Arc::new(event_loop.create_window(window_attributes)?);

        let mut ctx = self
            .async_runtime
            .block_on(Context::new(window.clone(), &self.settings))?;
        let program = ShaderProgram::new(
            &ctx.device,
            ctx.config.format,
            &ctx.frame_layout,
            &ctx.material_layout,
            &self.linked,
        );

        let scene = if self.settings.scene.is_empty() {
            log::info!("No scene configured");
            Scene::empty()
        } else {
            let loaded = self.async_runtime.block_on(load_scene(
                &ctx.device,
                &ctx.queue,
                &ctx.material_layout,
                &ctx.fallback_texture,
                &self.settings.scene,
            ));
            loaded.unwrap_or_else(|e| {
                log::warn!("{e}; rendering without a scene");
                Scene::empty()
            })
        };
        ctx.frame_bounds(scene.bounds());

        let mut state = AppState {
            ctx,
            program,
            scene,
            is_surface_configured: false,
        };
        let size = window.inner_size();
        state.resize(size.width, size.height);
        Ok(state)
    }
}

impl<U: FrameUpdate> ApplicationHandler for App<U> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() || !self.loop_state.is_running() {
            return;
        }
        match self.init(event_loop) {
            Ok(state) => {
                state.ctx.window().request_redraw();
                self.state = Some(state);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let state = match &mut self.state {
            Some(state) => state,
            None => return,
        };

        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                log::info!("Quit requested");
                self.loop_state.request_quit();
            }
            WindowEvent::Resized(size) => state.resize(size.width, size.height),
            WindowEvent::RedrawRequested => {
                if !self.loop_state.is_running() {
                    return;
                }
                let dt = self.pacer.begin_frame(Instant::now());
                match state.render(&mut self.update, dt) {
                    Ok(()) => {}
                    // Reconfigure the surface if it's lost or outdated
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        let size = state.ctx.window().inner_size();
                        state.resize(size.width, size.height);
                    }
                    Err(e) => {
                        log::error!("Unable to render {}", e);
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        self.loop_state.end_iteration();
        match self.loop_state {
            LoopState::Running => {
                if let Some(state) = &self.state {
                    if self.pacer.is_due(Instant::now()) {
                        state.ctx.window().request_redraw();
                    }
                    event_loop.set_control_flow(ControlFlow::WaitUntil(self.pacer.next_frame()));
                }
            }
            LoopState::Quitting | LoopState::Stopped => event_loop.exit(),
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            log::info!(
                "Shutting down; {} uniform lookups missed",
                state.program.uniforms().misses()
            );
        }
        self.state = None;
        self.loop_state = LoopState::Stopped;
    }
}

/// Open the window and drive frames until it is closed.
pub fn run(settings: Settings, linked: LinkedShader) -> Result<(), StartupError> {
    run_with(settings, linked, ())
}

/// [`run`] with a custom per-frame hook.
pub fn run_with<U: FrameUpdate>(
    settings: Settings,
    linked: LinkedShader,
    update: U,
) -> Result<(), StartupError> {
    let async_runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| StartupError::Context(ContextError::Runtime(e)))?;
    let event_loop = EventLoop::new()?;
    let mut app = App::new(async_runtime, settings, linked, update);
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Render one frame of `meshes` into an offscreen `Rgba8Unorm` target and read it back.
///
/// `width` must be a multiple of 64 so rows meet the copy alignment.
#[cfg(feature = "integration-tests")]
pub async fn capture_frame(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    program: &mut ShaderProgram,
    frame_bind_group: &wgpu::BindGroup,
    meshes: &[Mesh],
    clear_colour: wgpu::Color,
    (width, height): (u32, u32),
) -> anyhow::Result<image::RgbaImage> {
    use crate::data_structures::texture::Texture;

    let extent3d = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let target = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Capture Output Texture"),
        size: extent3d,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: CAPTURE_FORMAT,
        usage: wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());
    let depth = Texture::create_depth_texture(device, [width, height], "capture_depth");

    let u32_size = std::mem::size_of::<u32>() as u32;
    let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        size: (u32_size * width * height) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        label: Some("Capture Buffer"),
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Capture Encoder"),
    });
    {
        let mut render_pass = begin_frame_pass(&mut encoder, &view, &depth.view, clear_colour);
        draw_meshes(&mut render_pass, program, queue, frame_bind_group, meshes);
    }
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            aspect: wgpu::TextureAspect::All,
            texture: &target,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &output_buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(u32_size * width),
                rows_per_image: Some(height),
            },
        },
        extent3d,
    );
    queue.submit(iter::once(encoder.finish()));

    let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
    let buffer_slice = output_buffer.slice(..);
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        tx.send(result).ok();
    });
    device.poll(wgpu::PollType::Wait {
        submission_index: None,
        timeout: Some(Duration::from_secs(3)),
    })?;
    rx.receive()
        .await
        .ok_or_else(|| anyhow::anyhow!("capture buffer mapping was dropped"))??;
    let data = buffer_slice.get_mapped_range().to_vec();
    output_buffer.unmap();
    image::RgbaImage::from_raw(width, height, data)
        .ok_or_else(|| anyhow::anyhow!("capture buffer has the wrong size"))
}

/// Colour format of [`capture_frame`] targets.
#[cfg(feature = "integration-tests")]
pub const CAPTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quit_finishes_the_current_iteration() {
        let mut state = LoopState::default();
        assert!(state.is_running());
        state.end_iteration();
        assert_eq!(state, LoopState::Running);

        state.request_quit();
        assert_eq!(state, LoopState::Quitting);
        state.request_quit();
        assert_eq!(state, LoopState::Quitting);

        state.end_iteration();
        assert_eq!(state, LoopState::Stopped);
        state.request_quit();
        assert_eq!(state, LoopState::Stopped);
    }

    #[test]
    fn pacer_spaces_frames_by_the_target_rate() {
        let start = Instant::now();
        let mut pacer = FramePacer::new(50, start);
        assert_eq!(pacer.interval(), Duration::from_millis(20));
        assert!(pacer.is_due(start));

        assert_eq!(pacer.begin_frame(start), Duration::ZERO);
        assert_eq!(pacer.next_frame(), start + Duration::from_millis(20));
        assert!(!pacer.is_due(start + Duration::from_millis(10)));
        assert!(pacer.is_due(start + Duration::from_millis(20)));

        let dt = pacer.begin_frame(start + Duration::from_millis(21));
        assert_eq!(dt, Duration::from_millis(21));
        assert_eq!(pacer.next_frame(), start + Duration::from_millis(40));
    }

    #[test]
    fn late_pacer_does_not_burst() {
        let start = Instant::now();
        let mut pacer = FramePacer::new(100, start);
        pacer.begin_frame(start);
        let late = start + Duration::from_millis(500);
        pacer.begin_frame(late);
        assert_eq!(pacer.next_frame(), late + Duration::from_millis(10));
    }

    #[test]
    fn unpaced_loop_is_always_due() {
        let start = Instant::now();
        let mut pacer = FramePacer::new(0, start);
        pacer.begin_frame(start);
        assert!(pacer.is_due(start));
    }

    #[test]
    fn exit_codes_follow_the_failing_stage() {
        let shader = StartupError::Shader(ShaderError::Link { log: "x".into() });
        assert_eq!(shader.exit_code(), 4);
        let context = StartupError::Context(ContextError::NoSurfaceFormat);
        assert_eq!(context.exit_code(), 3);
    }
}
