//! Per-frame orchestration of a document's passes.
//!
//! [`ShadertoyRenderer`] owns everything GPU-side that a document needs:
//! compiled programs, buffer rings, channel textures and samplers. It walks
//! through a small state machine:
//!
//! ```text
//! Unloaded -> Parsed -> GraphBuilt -> Compiled -> Ready
//!                           ^                       |
//!                           +--- structural change  +--> Error
//! ```
//!
//! Structural changes (document, resolution, projection, context, pass
//! edits) drop all GPU resources and rebuild them on the next
//! [`prepare`](ShadertoyRenderer::prepare). A failed build is not retried
//! until the next structural change.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use toygraph::{GpuContext, RendererConfig, ShaderDocument, ShadertoyRenderer};
//!
//! let gpu = Arc::new(GpuContext::headless(64, 64).unwrap());
//! let mut renderer = ShadertoyRenderer::new(RendererConfig::new().size(64, 64));
//! renderer.set_context(gpu.clone());
//! renderer.set_document(ShaderDocument::from_json_str(r#"{
//!     "info": { "id": "demo" },
//!     "renderpass": [{ "type": "image",
//!         "code": "void mainImage(out vec4 c, in vec2 f) { c = vec4(f / iResolution.xy, 0., 1.); }" }]
//! }"#));
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use glam::Vec2;

use crate::assets::{
    AssetEvent, AssetResolver, BackgroundResolver, PixelData, Resolved, cubemap_faces,
};
use crate::document::{FilterMode, PassKind, RenderPass, ShaderDocument, ShaderInput};
use crate::error::{RenderError, RenderResult};
use crate::gpu::GpuContext;
use crate::graph::{AssetRequest, ChannelBinding, PassGraph, PassNode, VirtualInput};
use crate::keyboard::{KEYBOARD_HEIGHT, KEYBOARD_WIDTH, KeyboardState};
use crate::program::{PassProgram, ShaderProgramCache};
use crate::render_target::{FramebufferRing, RenderTarget, SOUND_FORMAT};
use crate::shader_gen::Projection;
use crate::texture::{ChannelTexture, SamplerSet};
use crate::uniforms::{FrameInputs, ShaderDate, ShadertoyUniforms};

/// Renderer settings.
#[derive(Clone, Debug, PartialEq)]
pub struct RendererConfig {
    pub width: u32,
    pub height: u32,
    pub projection: Projection,
    /// Wrap asset resolvers in a [`BackgroundResolver`].
    pub async_assets: bool,
    pub sample_rate: f32,
    pub eye_distance: f32,
    pub eye_rotation: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            projection: Projection::Rect,
            async_assets: false,
            sample_rate: 44_100.0,
            eye_distance: 0.1,
            eye_rotation: 0.0,
        }
    }
}

impl RendererConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn async_assets(mut self, enabled: bool) -> Self {
        self.async_assets = enabled;
        self
    }

    pub fn sample_rate(mut self, rate: f32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn eye_distance(mut self, distance: f32) -> Self {
        self.eye_distance = distance;
        self
    }

    pub fn eye_rotation(mut self, rotation: f32) -> Self {
        self.eye_rotation = rotation;
        self
    }
}

/// Build state of the current document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RendererState {
    /// No document set.
    Unloaded,
    /// A valid document is set; nothing built yet.
    Parsed,
    /// Programs were dropped; the graph is rebuilt on the next prepare.
    GraphBuilt,
    /// Programs compiled, frame resources pending.
    Compiled,
    /// Frames can be rendered.
    Ready,
    /// The last build failed; see [`ShadertoyRenderer::last_error`].
    Error,
}

/// Notifications for the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RendererEvent {
    /// A previously missing asset arrived; the next frame will look different.
    ContentChanged,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct TextureKey {
    source: String,
    vflip: bool,
    mipmaps: bool,
    cube: bool,
}

impl TextureKey {
    fn new(source: &str, input: Option<&ShaderInput>, cube: bool) -> Self {
        Self {
            source: source.to_string(),
            vflip: input.is_some_and(|i| i.vflip()),
            mipmaps: input.is_some_and(|i| i.filter() == FilterMode::Mipmap),
            cube,
        }
    }
}

/// GPU objects of one build. Dropped as a whole on every structural change.
struct FrameResources {
    graph: PassGraph,
    programs: ShaderProgramCache,
    rings: HashMap<usize, FramebufferRing>,
    textures: HashMap<TextureKey, ChannelTexture>,
    failed_textures: HashSet<TextureKey>,
    placeholder: ChannelTexture,
    placeholder_cube: ChannelTexture,
    keyboard: ChannelTexture,
    camera: Option<ChannelTexture>,
    samplers: SamplerSet,
}

impl FrameResources {
    /// Creates textures for assets whose pixels have arrived.
    fn create_textures(
        &mut self,
        gpu: &GpuContext,
        doc: &ShaderDocument,
        pixels: &HashMap<String, Arc<PixelData>>,
    ) {
        for node in self.graph.nodes() {
            let Some(pass) = doc.render_pass(node.pass) else {
                continue;
            };
            for (channel, binding) in node.channels.iter().enumerate() {
                let ChannelBinding::Asset { source, cubemap } = binding else {
                    continue;
                };
                let key = TextureKey::new(source, pass.input(channel), *cubemap);
                if self.textures.contains_key(&key) || self.failed_textures.contains(&key) {
                    continue;
                }
                let label = format!("{source} ({})", pass.name());
                let texture = if *cubemap {
                    let faces = cubemap_faces(source);
                    let found: Vec<&PixelData> = faces
                        .iter()
                        .filter_map(|face| pixels.get(face).map(|p| p.as_ref()))
                        .collect();
                    let Ok(faces) = <[&PixelData; 6]>::try_from(found) else {
                        continue;
                    };
                    ChannelTexture::cube_from_faces(gpu, &faces, key.vflip, key.mipmaps, &label)
                } else {
                    let Some(data) = pixels.get(source) else {
                        continue;
                    };
                    ChannelTexture::from_pixels(gpu, data, key.vflip, key.mipmaps, &label)
                };
                match texture {
                    Ok(texture) => {
                        self.textures.insert(key, texture);
                    }
                    Err(e) => {
                        log::warn!("{e}; channel stays unbound");
                        self.failed_textures.insert(key);
                    }
                }
            }
        }
    }

    /// Binds the four channels of `node` and records their sizes in `uniforms`.
    fn bind_channels(
        &self,
        gpu: &GpuContext,
        program: &PassProgram,
        node: &PassNode,
        pass: &RenderPass,
        uniforms: &mut ShadertoyUniforms,
    ) -> wgpu::BindGroup {
        let mut entries = Vec::with_capacity(node.channels.len() * 2);
        for (channel, binding) in node.channels.iter().enumerate() {
            let input = pass.input(channel);
            let cube = program.cube_channels[channel];
            let bound: Option<(&wgpu::TextureView, u32, u32)> = match binding {
                ChannelBinding::Unbound => None,
                ChannelBinding::Asset { source, cubemap } => self
                    .textures
                    .get(&TextureKey::new(source, input, *cubemap))
                    .filter(|t| t.cube == cube)
                    .map(|t| (&t.view, t.width, t.height)),
                ChannelBinding::Virtual(VirtualInput::Keyboard) => {
                    Some((&self.keyboard.view, KEYBOARD_WIDTH, KEYBOARD_HEIGHT))
                }
                ChannelBinding::Virtual(VirtualInput::Camera) => {
                    self.camera.as_ref().map(|t| (&t.view, t.width, t.height))
                }
                ChannelBinding::Virtual(
                    VirtualInput::Microphone | VirtualInput::Music | VirtualInput::MusicStream,
                ) => None,
                ChannelBinding::Pass(source_pass) => self.rings.get(source_pass).map(|ring| {
                    let target = ring.readable();
                    (&target.view, target.width(), target.height())
                }),
            };
            let view = match bound {
                Some((view, width, height)) => {
                    uniforms.set_channel_resolution(channel, width, height);
                    view
                }
                None if cube => &self.placeholder_cube.view,
                None => &self.placeholder.view,
            };
            let sampler = self.samplers.get(
                input.map(|i| i.filter()).unwrap_or_default(),
                input.map(|i| i.wrap()).unwrap_or_default(),
            );
            entries.push(wgpu::BindGroupEntry {
                binding: (channel as u32) * 2,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: (channel as u32) * 2 + 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} Channels", program.name)),
            layout: program.channel_layout(),
            entries: &entries,
        })
    }
}

/// Renders a [`ShaderDocument`] frame by frame.
pub struct ShadertoyRenderer {
    config: RendererConfig,
    gpu: Option<Arc<GpuContext>>,
    document: Option<ShaderDocument>,
    state: RendererState,
    needs_rebuild: bool,
    last_error: Option<String>,
    resources: Option<FrameResources>,
    resolver: Option<Box<dyn AssetResolver>>,
    pixels: HashMap<String, Arc<PixelData>>,
    keyboard: KeyboardState,
    camera_frame: Option<PixelData>,
    frame: FrameInputs,
    last_frame: Option<Instant>,
    measured_fps: f64,
    events_tx: flume::Sender<RendererEvent>,
    events_rx: flume::Receiver<RendererEvent>,
}

impl ShadertoyRenderer {
    pub fn new(config: RendererConfig) -> Self {
        let (events_tx, events_rx) = flume::bounded(16);
        let frame = FrameInputs {
            sample_rate: config.sample_rate,
            eye_distance: config.eye_distance,
            eye_rotation: config.eye_rotation,
            ..Default::default()
        };
        Self {
            config,
            gpu: None,
            document: None,
            state: RendererState::Unloaded,
            needs_rebuild: false,
            last_error: None,
            resources: None,
            resolver: None,
            pixels: HashMap::new(),
            keyboard: KeyboardState::default(),
            camera_frame: None,
            frame,
            last_frame: None,
            measured_fps: 0.0,
            events_tx,
            events_rx,
        }
    }

    // --- structural changes ---

    /// Attaches the GPU context all resources are created on.
    pub fn set_context(&mut self, gpu: Arc<GpuContext>) {
        self.gpu = Some(gpu);
        self.invalidate();
    }

    /// Releases every GPU object and the context itself.
    pub fn release_context(&mut self) {
        self.resources = None;
        self.gpu = None;
        self.invalidate();
    }

    pub fn set_document(&mut self, document: ShaderDocument) {
        self.resources = None;
        if document.is_valid() {
            log::info!(
                "document '{}' with {} passes",
                document.info().id,
                document.render_passes().len()
            );
            retain_requested(
                &mut self.pixels,
                PassGraph::build(&document).asset_requests(),
            );
            self.state = RendererState::Parsed;
            self.needs_rebuild = true;
            self.last_error = None;
        } else {
            let error = document.error().unwrap_or("invalid document").to_string();
            log::error!("document rejected: {error}");
            self.state = RendererState::Error;
            self.needs_rebuild = false;
            self.last_error = Some(error);
        }
        self.document = Some(document);
    }

    pub fn document(&self) -> Option<&ShaderDocument> {
        self.document.as_ref()
    }

    /// Applies `edit` to the current document. A rebuild is scheduled only
    /// when `edit` reports a change; refused edits leave the renderer as is.
    /// Returns `false` without a document.
    pub fn edit_document(&mut self, edit: impl FnOnce(&mut ShaderDocument) -> bool) -> bool {
        let Some(document) = self.document.as_mut() else {
            return false;
        };
        let changed = edit(document);
        if changed {
            self.invalidate();
        }
        changed
    }

    /// Sets the output size. The same size is a no-op.
    pub fn set_resolution(&mut self, width: u32, height: u32) {
        if (self.config.width, self.config.height) == (width, height) {
            return;
        }
        log::debug!("resolution {width}x{height}");
        self.config.width = width;
        self.config.height = height;
        self.invalidate();
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn set_projection_mode(&mut self, projection: Projection) {
        if self.config.projection == projection {
            return;
        }
        self.config.projection = projection;
        self.invalidate();
    }

    pub fn projection_mode(&self) -> Projection {
        self.config.projection
    }

    /// Drops all programs and frame resources; they are rebuilt on the next
    /// [`prepare`](Self::prepare).
    pub fn invalidate(&mut self) {
        self.resources = None;
        if !self.document.as_ref().is_some_and(ShaderDocument::is_valid) {
            return;
        }
        self.needs_rebuild = true;
        if !matches!(self.state, RendererState::Unloaded | RendererState::Parsed) {
            self.state = RendererState::GraphBuilt;
        }
    }

    // --- assets ---

    /// Installs the asset source. With `async_assets` configured it is moved
    /// to a worker thread.
    pub fn set_asset_resolver<R: AssetResolver + 'static>(&mut self, resolver: R) {
        let resolver: Box<dyn AssetResolver> = if self.config.async_assets {
            Box::new(BackgroundResolver::new(resolver))
        } else {
            Box::new(resolver)
        };
        self.resolver = Some(resolver);
        if let (Some(resolver), Some(res)) = (self.resolver.as_deref_mut(), &self.resources) {
            request_assets(resolver, &mut self.pixels, res.graph.asset_requests());
        }
    }

    pub fn set_async_loading(&mut self, enabled: bool) {
        self.config.async_assets = enabled;
    }

    /// Adds decoded pixels for `source` directly, bypassing the resolver.
    pub fn insert_asset(&mut self, source: impl Into<String>, pixels: Arc<PixelData>) {
        self.pixels.insert(source.into(), pixels);
    }

    // --- per-frame inputs ---

    pub fn set_mouse(&mut self, position: Vec2, left: bool, right: bool) {
        self.frame.mouse = [
            position.x,
            position.y,
            if left { 1.0 } else { 0.0 },
            if right { 1.0 } else { 0.0 },
        ];
    }

    /// `code` is a JavaScript key code.
    pub fn set_keyboard(&mut self, code: u8, pressed: bool) {
        self.keyboard.set_key(code, pressed);
    }

    pub fn set_global_time(&mut self, seconds: f32) {
        self.frame.time = seconds;
    }

    pub fn set_frame_number(&mut self, frame: i32) {
        self.frame.frame = frame;
    }

    pub fn set_date(&mut self, date: ShaderDate) {
        self.frame.date = date;
    }

    pub fn set_eye_distance(&mut self, distance: f32) {
        self.frame.eye_distance = distance;
    }

    pub fn set_eye_rotation(&mut self, rotation: f32) {
        self.frame.eye_rotation = rotation;
    }

    /// Newest camera image; uploaded during the next prepare when a pass
    /// samples the camera.
    pub fn set_camera_frame(&mut self, frame: PixelData) {
        self.camera_frame = Some(frame);
    }

    pub fn frame_inputs(&self) -> &FrameInputs {
        &self.frame
    }

    // --- status ---

    pub fn state(&self) -> RendererState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == RendererState::Ready && !self.needs_rebuild
    }

    /// Message of the last failure, cleared by a successful build.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Frames per second between the last two continuous frames.
    pub fn measured_fps(&self) -> f64 {
        self.measured_fps
    }

    /// Receiver of [`RendererEvent`]s.
    pub fn events(&self) -> flume::Receiver<RendererEvent> {
        self.events_rx.clone()
    }

    // --- frame ---

    /// Builds programs if needed and refreshes per-frame state.
    ///
    /// `continuous` frames measure the time between calls; single-shot
    /// frames report zero delta and fps.
    pub fn prepare(&mut self, continuous: bool) -> RenderResult<()> {
        if self.needs_rebuild {
            self.needs_rebuild = false;
            if let Err(e) = self.rebuild() {
                return Err(self.fail(e));
            }
        }
        if self.state != RendererState::Ready {
            return Err(RenderError::NotReady);
        }

        let now = Instant::now();
        if continuous {
            let delta = self
                .last_frame
                .map(|last| now.duration_since(last).as_secs_f64())
                .unwrap_or(0.0);
            self.measured_fps = if delta > 0.0 { 1.0 / delta } else { 0.0 };
            self.frame.time_delta = delta as f32;
            self.last_frame = Some(now);
        } else {
            self.measured_fps = 0.0;
            self.frame.time_delta = 0.0;
            self.last_frame = None;
        }
        self.frame.frame_rate = self.measured_fps as f32;

        self.poll_assets();
        self.update_virtual_inputs();
        Ok(())
    }

    /// Draws buffer passes, then image passes, into `destination`.
    ///
    /// `destination` must have the context's output format and should match
    /// the configured resolution.
    pub fn render(&mut self, destination: &wgpu::TextureView, continuous: bool) -> RenderResult<()> {
        self.prepare(continuous)?;
        let passes: Vec<usize> = self
            .resources
            .as_ref()
            .map(|res| {
                res.graph
                    .ordered(&[PassKind::Buffer, PassKind::Image])
                    .map(|node| node.pass)
                    .collect()
            })
            .unwrap_or_default();
        self.encode(&passes, destination)
            .map_err(|e| self.record(e))
    }

    /// Draws the first sound pass into `destination`, an [`SOUND_FORMAT`]
    /// target. Each texel holds one stereo sample in red and green.
    pub fn render_sound(&mut self, destination: &wgpu::TextureView) -> RenderResult<()> {
        self.prepare(false)?;
        let sound = self
            .resources
            .as_ref()
            .and_then(|res| res.graph.sound_pass())
            .ok_or(RenderError::NoSoundPass)?;
        self.encode(&[sound], destination)
            .map_err(|e| self.record(e))
    }

    /// Renders the sound pass at the current resolution and returns
    /// interleaved stereo samples, `width * height` frames.
    pub fn render_sound_samples(&mut self) -> RenderResult<Vec<f32>> {
        let gpu = self.gpu.clone().ok_or(RenderError::NoContext)?;
        let target = RenderTarget::new(
            &gpu,
            self.config.width,
            self.config.height,
            SOUND_FORMAT,
            "Sound Target",
        )
        .map_err(|e| self.record(e))?;
        self.render_sound(&target.view)?;
        let bytes = target.read_pixels(&gpu).map_err(|e| self.record(e))?;
        Ok(bytes
            .chunks_exact(16)
            .flat_map(|texel| {
                [
                    bytemuck::pod_read_unaligned::<f32>(&texel[0..4]),
                    bytemuck::pod_read_unaligned::<f32>(&texel[4..8]),
                ]
            })
            .collect())
    }

    fn encode(&mut self, passes: &[usize], destination: &wgpu::TextureView) -> RenderResult<()> {
        let gpu = self.gpu.clone().ok_or(RenderError::NoContext)?;
        let (Some(res), Some(doc)) = (self.resources.as_mut(), self.document.as_ref()) else {
            return Err(RenderError::NotReady);
        };
        res.create_textures(&gpu, doc, &self.pixels);

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Shadertoy Frame"),
            });

        for &index in passes {
            let (Some(program), Some(node), Some(pass)) = (
                res.programs.program(index),
                res.graph.node(index),
                doc.render_pass(index),
            ) else {
                continue;
            };
            let mut uniforms =
                ShadertoyUniforms::new(self.config.width, self.config.height, &self.frame);
            let channels = res.bind_channels(&gpu, program, node, pass, &mut uniforms);
            program.write_uniforms(&gpu, &uniforms);

            {
                let target = match node.kind {
                    PassKind::Buffer => match res.rings.get(&index) {
                        Some(ring) => &ring.writable().view,
                        None => continue,
                    },
                    PassKind::Image | PassKind::Sound => destination,
                };
                let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some(&program.name),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: target,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                program.draw(&mut render_pass, res.programs.quad(), &channels);
            }
            log::trace!("drew pass '{}'", program.name);

            if node.kind == PassKind::Buffer {
                if let Some(ring) = res.rings.get_mut(&index) {
                    ring.swap();
                }
            }
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn rebuild(&mut self) -> RenderResult<()> {
        self.resources = None;
        let gpu = self.gpu.clone().ok_or(RenderError::NoContext)?;
        let (width, height) = (self.config.width.max(1), self.config.height.max(1));
        gpu.check_texture_size(width, height, "resolution")?;

        let (graph, programs, rings) = {
            let doc = self.document.as_ref().ok_or(RenderError::NotReady)?;
            if !doc.is_valid() {
                return Err(RenderError::InvalidDocument(
                    doc.error().unwrap_or("no render passes").to_string(),
                ));
            }
            let graph = PassGraph::build(doc);
            self.state = RendererState::GraphBuilt;

            let programs =
                ShaderProgramCache::build(&gpu, doc, &graph, self.config.projection, gpu.format())?;
            self.state = RendererState::Compiled;

            let rings = graph
                .ordered(&[PassKind::Buffer])
                .filter_map(|node| Some((node.pass, doc.render_pass(node.pass)?)))
                .map(|(index, pass)| {
                    FramebufferRing::new(&gpu, width, height, pass.name()).map(|ring| (index, ring))
                })
                .collect::<RenderResult<HashMap<usize, FramebufferRing>>>()?;
            (graph, programs, rings)
        };

        retain_requested(&mut self.pixels, graph.asset_requests());
        if let Some(resolver) = self.resolver.as_deref_mut() {
            request_assets(resolver, &mut self.pixels, graph.asset_requests());
        } else if !graph.asset_requests().is_empty() {
            log::debug!(
                "no asset resolver; {} sources stay unbound",
                graph.asset_requests().len()
            );
        }

        self.resources = Some(FrameResources {
            graph,
            programs,
            rings,
            textures: HashMap::new(),
            failed_textures: HashSet::new(),
            placeholder: ChannelTexture::placeholder(&gpu, false),
            placeholder_cube: ChannelTexture::placeholder(&gpu, true),
            keyboard: ChannelTexture::keyboard(&gpu),
            camera: None,
            samplers: SamplerSet::new(&gpu),
        });
        self.keyboard.mark_dirty();
        self.state = RendererState::Ready;
        self.last_error = None;
        log::info!("renderer ready at {width}x{height} ({})", self.config.projection.name());
        Ok(())
    }

    fn poll_assets(&mut self) {
        let Some(resolver) = self.resolver.as_deref_mut() else {
            return;
        };
        let mut changed = false;
        for event in resolver.poll() {
            match event {
                AssetEvent::Ready { source, pixels } => {
                    log::debug!("asset {source} arrived");
                    self.pixels.insert(source, pixels);
                    changed = true;
                }
                AssetEvent::Failed { source, error } => {
                    log::warn!("asset {source} unavailable: {error}");
                }
            }
        }
        if changed {
            // A full queue already holds a pending redraw request.
            let _ = self.events_tx.try_send(RendererEvent::ContentChanged);
        }
    }

    fn update_virtual_inputs(&mut self) {
        let (Some(gpu), Some(res)) = (self.gpu.as_deref(), self.resources.as_mut()) else {
            return;
        };
        if let Some(bytes) = self.keyboard.take_upload() {
            res.keyboard.write_keyboard(gpu, &bytes);
        }
        if !res.graph.uses_virtual(VirtualInput::Camera) {
            return;
        }
        if let Some(frame) = self.camera_frame.take() {
            let reused = res.camera.as_ref().is_some_and(|t| t.update(gpu, &frame));
            if !reused {
                res.camera = ChannelTexture::from_pixels(gpu, &frame, false, false, "Camera")
                    .inspect_err(|e| log::warn!("{e}"))
                    .ok();
            }
        }
    }

    /// Records a build failure and moves to [`RendererState::Error`].
    fn fail(&mut self, error: RenderError) -> RenderError {
        self.resources = None;
        self.state = RendererState::Error;
        self.record(error)
    }

    fn record(&mut self, error: RenderError) -> RenderError {
        log::error!("{error}");
        self.last_error = Some(error.to_string());
        error
    }
}

/// Sources `requests` need, cubemaps expanded to their six faces.
fn requested_sources(requests: &[AssetRequest]) -> Vec<String> {
    requests
        .iter()
        .flat_map(|request| {
            if request.cubemap {
                Vec::from(cubemap_faces(&request.source))
            } else {
                vec![request.source.clone()]
            }
        })
        .collect()
}

/// Drops decoded pixels no request refers to.
fn retain_requested(pixels: &mut HashMap<String, Arc<PixelData>>, requests: &[AssetRequest]) {
    let wanted: HashSet<String> = requested_sources(requests).into_iter().collect();
    pixels.retain(|source, _| wanted.contains(source));
}

fn request_assets(
    resolver: &mut dyn AssetResolver,
    pixels: &mut HashMap<String, Arc<PixelData>>,
    requests: &[AssetRequest],
) {
    for source in requested_sources(requests) {
        if pixels.contains_key(&source) {
            continue;
        }
        match resolver.resolve(&source) {
            Ok(Resolved::Ready(data)) => {
                pixels.insert(source, data);
            }
            Ok(Resolved::Pending) => log::debug!("asset {source} pending"),
            Err(e) => log::warn!("asset {source}: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssetError;
    use serde_json::json;

    fn document() -> ShaderDocument {
        ShaderDocument::from_json(json!({
            "info": { "id": "state" },
            "renderpass": [{
                "type": "image",
                "code": "void mainImage(out vec4 c, in vec2 f) { c = vec4(1.0); }",
                "inputs": [{ "channel": 0, "ctype": "cubemap", "src": "/media/sky.png" }]
            }]
        }))
    }

    #[test]
    fn starts_unloaded() {
        let renderer = ShadertoyRenderer::new(RendererConfig::new());
        assert_eq!(renderer.state(), RendererState::Unloaded);
        assert!(!renderer.is_ready());
        assert_eq!(renderer.resolution(), (256, 256));
        assert_eq!(renderer.last_error(), None);
    }

    #[test]
    fn invalid_document_is_an_error() {
        let mut renderer = ShadertoyRenderer::new(RendererConfig::new());
        renderer.set_document(ShaderDocument::from_json(json!({ "info": {} })));
        assert_eq!(renderer.state(), RendererState::Error);
        assert!(renderer.last_error().unwrap().contains("renderpass"));
        // Nothing to rebuild from.
        renderer.set_resolution(32, 32);
        assert_eq!(renderer.state(), RendererState::Error);
    }

    #[test]
    fn build_without_context_fails_once() {
        let mut renderer = ShadertoyRenderer::new(RendererConfig::new());
        renderer.set_document(document());
        assert_eq!(renderer.state(), RendererState::Parsed);

        let err = renderer.prepare(true).unwrap_err();
        assert!(matches!(err, RenderError::NoContext));
        assert_eq!(renderer.state(), RendererState::Error);
        assert_eq!(renderer.last_error(), Some("no GPU context set"));

        // No automatic retry.
        let err = renderer.prepare(true).unwrap_err();
        assert!(matches!(err, RenderError::NotReady));
        assert_eq!(renderer.last_error(), Some("no GPU context set"));
    }

    #[test]
    fn structural_changes_return_to_graph_built() {
        let mut renderer = ShadertoyRenderer::new(RendererConfig::new().size(8, 8));
        renderer.set_document(document());
        let _ = renderer.prepare(false);
        assert_eq!(renderer.state(), RendererState::Error);

        renderer.set_resolution(8, 8);
        assert_eq!(renderer.state(), RendererState::Error);

        renderer.set_resolution(16, 8);
        assert_eq!(renderer.state(), RendererState::GraphBuilt);
        assert_eq!(renderer.resolution(), (16, 8));

        let _ = renderer.prepare(false);
        renderer.set_projection_mode(Projection::Fisheye);
        assert_eq!(renderer.state(), RendererState::GraphBuilt);

        let _ = renderer.prepare(false);
        let edited = renderer.edit_document(|doc| {
            doc.set_fragment_source(0, "void mainImage(out vec4 c, in vec2 f) {}")
        });
        assert!(edited);
        assert_eq!(renderer.state(), RendererState::GraphBuilt);
    }

    #[test]
    fn refused_edits_do_not_invalidate() {
        let mut renderer = ShadertoyRenderer::new(RendererConfig::new());
        assert!(!renderer.edit_document(|_| true));

        renderer.set_document(document());
        let _ = renderer.prepare(false);
        assert_eq!(renderer.state(), RendererState::Error);

        let edited = renderer.edit_document(|doc| doc.set_fragment_source(5, "void main() {}"));
        assert!(!edited);
        assert_eq!(renderer.state(), RendererState::Error);
        assert!(matches!(renderer.prepare(false), Err(RenderError::NotReady)));
    }

    #[test]
    fn new_document_clears_error() {
        let mut renderer = ShadertoyRenderer::new(RendererConfig::new());
        renderer.set_document(ShaderDocument::from_json(json!({})));
        assert!(renderer.last_error().is_some());
        renderer.set_document(document());
        assert_eq!(renderer.state(), RendererState::Parsed);
        assert_eq!(renderer.last_error(), None);
    }

    #[test]
    fn frame_inputs_follow_setters() {
        let mut renderer = ShadertoyRenderer::new(RendererConfig::new().eye_distance(0.2));
        renderer.set_mouse(Vec2::new(10.0, 20.0), true, false);
        renderer.set_global_time(1.5);
        renderer.set_frame_number(7);
        renderer.set_eye_rotation(0.3);
        renderer.set_date(ShaderDate {
            year: 2024,
            month: 2,
            day: 29,
            seconds: 60.0,
        });

        let frame = renderer.frame_inputs();
        assert_eq!(frame.mouse, [10.0, 20.0, 1.0, 0.0]);
        assert_eq!(frame.time, 1.5);
        assert_eq!(frame.frame, 7);
        assert_eq!(frame.eye_distance, 0.2);
        assert_eq!(frame.eye_rotation, 0.3);
        assert_eq!(frame.date.to_vec4(), [2024.0, 2.0, 29.0, 60.0]);
        assert_eq!(frame.sample_rate, 44_100.0);
    }

    #[test]
    fn sound_without_context() {
        let mut renderer = ShadertoyRenderer::new(RendererConfig::new());
        assert!(matches!(
            renderer.render_sound_samples(),
            Err(RenderError::NoContext)
        ));
    }

    struct Faces(Vec<String>);

    impl AssetResolver for Faces {
        fn resolve(&mut self, source: &str) -> Result<Resolved, AssetError> {
            self.0.push(source.to_string());
            if source.ends_with("_5.png") {
                return Err(AssetError::NotFound(source.to_string()));
            }
            Ok(Resolved::Ready(Arc::new(PixelData::new(1, 1, vec![255; 4]))))
        }
    }

    #[test]
    fn cubemap_requests_resolve_every_face() {
        let mut resolver = Faces(Vec::new());
        let mut pixels = HashMap::new();
        let requests = [AssetRequest {
            source: "/media/sky.png".into(),
            cubemap: true,
        }];
        request_assets(&mut resolver, &mut pixels, &requests);
        assert_eq!(resolver.0.len(), 6);
        assert_eq!(pixels.len(), 5);
        assert!(!pixels.contains_key("/media/sky_5.png"));

        // Resolved faces are not requested again.
        request_assets(&mut resolver, &mut pixels, &requests);
        assert_eq!(resolver.0.len(), 7);
    }

    #[test]
    fn texture_keys_follow_input_settings() {
        let doc = ShaderDocument::from_json(json!({
            "info": { "id": "k" },
            "renderpass": [{ "type": "image", "inputs": [
                { "channel": 0, "ctype": "texture", "src": "/a.png",
                  "sampler": { "filter": "mipmap", "vflip": "true" } }
            ] }]
        }));
        let key = TextureKey::new("/a.png", doc.render_pass(0).unwrap().input(0), false);
        assert!(key.vflip && key.mipmaps && !key.cube);
        let plain = TextureKey::new("/a.png", None, false);
        assert_ne!(key, plain);
    }

    struct Arrivals(Vec<AssetEvent>);

    impl AssetResolver for Arrivals {
        fn resolve(&mut self, _source: &str) -> Result<Resolved, AssetError> {
            Ok(Resolved::Pending)
        }

        fn poll(&mut self) -> Vec<AssetEvent> {
            std::mem::take(&mut self.0)
        }
    }

    #[test]
    fn arriving_asset_signals_content_changed() {
        let mut renderer = ShadertoyRenderer::new(RendererConfig::new());
        let events = renderer.events();
        renderer.set_asset_resolver(Arrivals(vec![AssetEvent::Ready {
            source: "/media/a.png".into(),
            pixels: Arc::new(PixelData::new(1, 1, vec![0; 4])),
        }]));

        renderer.poll_assets();
        assert_eq!(events.try_recv(), Ok(RendererEvent::ContentChanged));
        assert!(events.try_recv().is_err());
        assert!(renderer.pixels.contains_key("/media/a.png"));

        // Nothing new arrived.
        renderer.poll_assets();
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn failed_asset_is_silent() {
        let mut renderer = ShadertoyRenderer::new(RendererConfig::new());
        let events = renderer.events();
        renderer.set_asset_resolver(Arrivals(vec![AssetEvent::Failed {
            source: "/media/a.png".into(),
            error: "not found".into(),
        }]));

        renderer.poll_assets();
        assert!(events.try_recv().is_err());
        assert!(renderer.pixels.is_empty());
    }

    #[test]
    fn new_document_drops_unused_pixels() {
        let mut renderer = ShadertoyRenderer::new(RendererConfig::new());
        let pixel = Arc::new(PixelData::new(1, 1, vec![0; 4]));
        renderer.insert_asset("/media/old.png", pixel.clone());
        for face in cubemap_faces("/media/sky.png") {
            renderer.insert_asset(face, pixel.clone());
        }

        renderer.set_document(document());
        assert_eq!(renderer.pixels.len(), 6);
        assert!(!renderer.pixels.contains_key("/media/old.png"));

        renderer.set_document(ShaderDocument::from_json(json!({
            "info": { "id": "plain" },
            "renderpass": [{ "type": "image", "code": "" }]
        })));
        assert!(renderer.pixels.is_empty());
    }
}
