use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use toygraph::{
    DirectoryResolver, GpuContext, HotDocument, Input, OffscreenRenderer, Projection,
    RendererConfig, RendererEvent, ShaderDate, ShadertoyRenderer,
};

/// Widest sound target; longer clips add rows.
const SOUND_ROW: u32 = 4096;

#[derive(Parser, Debug)]
#[command(version, about = "Render Shadertoy-style JSON shader documents")]
struct Args {
    /// Shader document (JSON)
    document: PathBuf,

    #[arg(long, default_value_t = 800)]
    width: u32,

    #[arg(long, default_value_t = 450)]
    height: u32,

    /// rect, fisheye or cross-eye
    #[arg(long, default_value = "rect", value_parser = parse_projection)]
    projection: Projection,

    /// Directory media sources are looked up in (default: the document's directory)
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Decode assets on a worker thread
    #[arg(long)]
    async_assets: bool,

    /// Render one frame to this PNG and exit
    #[arg(long, value_name = "PNG")]
    screenshot: Option<PathBuf>,

    /// Render this many seconds of the sound pass and exit
    #[arg(long, value_name = "SECONDS")]
    sound: Option<f32>,

    /// Raw interleaved f32 stereo output of --sound
    #[arg(long, value_name = "FILE", default_value = "sound.f32")]
    sound_file: PathBuf,
}

fn parse_projection(name: &str) -> Result<Projection, String> {
    Projection::from_name(name).ok_or_else(|| format!("unknown projection '{name}'"))
}

impl Args {
    fn config(&self) -> RendererConfig {
        RendererConfig::new()
            .size(self.width, self.height)
            .projection(self.projection)
            .async_assets(self.async_assets)
    }

    fn asset_root(&self) -> PathBuf {
        self.assets.clone().unwrap_or_else(|| {
            self.document
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        })
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Some(path) = &args.screenshot {
        return screenshot(&args, path);
    }
    if let Some(seconds) = args.sound {
        return sound(&args, seconds);
    }

    let document = HotDocument::new(&args.document)
        .with_context(|| format!("loading {}", args.document.display()))?;
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = Viewer::new(args, document);
    event_loop.run_app(&mut app)?;
    Ok(())
}

fn offscreen(args: &Args, width: u32, height: u32) -> Result<OffscreenRenderer> {
    let gpu = Arc::new(GpuContext::headless(width, height)?);
    let mut offscreen = OffscreenRenderer::new(gpu, args.config().size(width, height));
    let document = toygraph::ShaderDocument::from_path(&args.document)
        .with_context(|| format!("loading {}", args.document.display()))?;
    if let Some(error) = document.error() {
        bail!("{}: {error}", args.document.display());
    }
    let renderer = offscreen.renderer_mut();
    // Single shots wait for every asset.
    renderer.set_async_loading(false);
    renderer.set_asset_resolver(DirectoryResolver::new(args.asset_root()));
    renderer.set_document(document);
    renderer.set_date(ShaderDate::now());
    Ok(offscreen)
}

fn screenshot(args: &Args, path: &Path) -> Result<()> {
    let mut offscreen = offscreen(args, args.width, args.height)?;
    let image = offscreen.render_to_image(args.width, args.height)?;
    image
        .save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    log::info!("wrote {}", path.display());
    Ok(())
}

fn sound(args: &Args, seconds: f32) -> Result<()> {
    let config = args.config();
    let frames = (seconds.max(0.0) * config.sample_rate).ceil() as u32;
    let rows = frames.div_ceil(SOUND_ROW).max(1);
    let mut offscreen = offscreen(args, SOUND_ROW, rows)?;

    let renderer = offscreen.renderer_mut();
    renderer.set_resolution(SOUND_ROW, rows);
    let mut samples = renderer.render_sound_samples()?;
    samples.truncate(frames as usize * 2);

    std::fs::write(&args.sound_file, bytemuck::cast_slice::<f32, u8>(&samples))
        .with_context(|| format!("writing {}", args.sound_file.display()))?;
    log::info!(
        "wrote {frames} stereo frames ({seconds}s) to {}",
        args.sound_file.display()
    );
    Ok(())
}

struct Viewer {
    args: Args,
    document: HotDocument,
    window: Option<Arc<Window>>,
    gpu: Option<Arc<GpuContext>>,
    renderer: ShadertoyRenderer,
    events: flume::Receiver<RendererEvent>,
    input: Input,
    start_time: Instant,
    frame: i32,
    fps_report: Instant,
}

impl Viewer {
    fn new(args: Args, document: HotDocument) -> Self {
        let renderer = ShadertoyRenderer::new(args.config());
        let events = renderer.events();
        Self {
            args,
            document,
            window: None,
            gpu: None,
            renderer,
            events,
            input: Input::new(),
            start_time: Instant::now(),
            frame: 0,
            fps_report: Instant::now(),
        }
    }

    fn restart_clock(&mut self) {
        self.start_time = Instant::now();
        self.frame = 0;
    }

    fn redraw(&mut self) {
        let (Some(window), Some(gpu)) = (self.window.clone(), self.gpu.clone()) else {
            return;
        };

        if let Some(document) = self.document.check_reload() {
            self.renderer.set_document(document.clone());
            self.restart_clock();
        }
        for event in self.events.try_iter() {
            log::debug!("{event:?}");
        }

        self.renderer
            .set_global_time(self.start_time.elapsed().as_secs_f32());
        self.renderer.set_frame_number(self.frame);
        self.renderer.set_date(ShaderDate::now());
        self.input
            .apply(&mut self.renderer, window.inner_size().height);

        let output = match gpu.current_frame() {
            Ok(output) => output,
            Err(e) => {
                log::warn!("{e}");
                return;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        if self.renderer.render(&view, true).is_ok() {
            self.frame += 1;
        } else {
            clear(&gpu, &view, wgpu::Color { r: 0.4, g: 0.0, b: 0.0, a: 1.0 });
        }
        output.present();

        if self.fps_report.elapsed().as_secs_f32() >= 1.0 {
            self.fps_report = Instant::now();
            let title = match self.renderer.last_error() {
                Some(_) => format!("{} - error", self.document.document().info().name),
                None => format!(
                    "{} - {:.0} fps",
                    self.document.document().info().name,
                    self.renderer.measured_fps()
                ),
            };
            window.set_title(&title);
        }
    }
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attributes = Window::default_attributes()
            .with_title("toygraph")
            .with_inner_size(PhysicalSize::new(self.args.width, self.args.height));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("cannot create window: {e}");
                event_loop.exit();
                return;
            }
        };
        let gpu = match GpuContext::new(window.clone()) {
            Ok(gpu) => Arc::new(gpu),
            Err(e) => {
                log::error!("{e}");
                event_loop.exit();
                return;
            }
        };

        let size = window.inner_size();
        self.renderer.set_context(gpu.clone());
        self.renderer.set_resolution(size.width, size.height);
        self.renderer
            .set_asset_resolver(DirectoryResolver::new(self.args.asset_root()));
        self.renderer.set_document(self.document.document().clone());
        self.restart_clock();

        self.gpu = Some(gpu);
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        self.input.handle_event(&event);
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(gpu) = &self.gpu {
                    gpu.resize_surface(size.width, size.height);
                }
                if size.width > 0 && size.height > 0 {
                    self.renderer.set_resolution(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                self.redraw();
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

/// Fallback frame shown while the document cannot be rendered.
fn clear(gpu: &GpuContext, view: &wgpu::TextureView, color: wgpu::Color) {
    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Fallback Clear"),
        });
    {
        let _render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Fallback Clear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(color),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }
    gpu.queue.submit(std::iter::once(encoder.finish()));
}
