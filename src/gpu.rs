//! Core GPU context and device management.
//!
//! [`GpuContext`] holds the wgpu device and queue every renderer draws with,
//! plus the window surface when there is one. It is created either from a
//! winit [`Window`] or headless for offscreen rendering and tests.
//!
//! The context is shared by reference (usually an `Arc`) and is only ever
//! used from the render thread.
//!
//! # Example
//!
//! ```no_run
//! use toygraph::GpuContext;
//!
//! let gpu = GpuContext::headless(256, 256).expect("no GPU adapter");
//! println!("{}x{} {:?}", gpu.width(), gpu.height(), gpu.format());
//! ```
//!
//! [`Window`]: winit::window::Window

use std::sync::Arc;
use winit::window::Window;

use crate::error::{RenderError, RenderResult};

/// Core GPU context holding wgpu resources.
///
/// All fields are public to allow direct access to wgpu APIs when needed.
pub struct GpuContext {
    /// The surface for presenting rendered frames, `None` when headless.
    pub surface: Option<wgpu::Surface<'static>>,
    /// The logical GPU device for creating resources and pipelines.
    pub device: wgpu::Device,
    /// The command queue for submitting work to the GPU.
    pub queue: wgpu::Queue,
    /// Output format and size. Headless contexts keep it for the format of
    /// offscreen image targets; it is never applied to a surface.
    pub config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    /// Create a new GPU context presenting to a winit window.
    ///
    /// Prefers a non-sRGB surface format: shader output is written to the
    /// screen as-is, the way a plain GL framebuffer shows it.
    pub fn new(window: Arc<Window>) -> RenderResult<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| RenderError::Resource(format!("create surface: {e}")))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|e| RenderError::Resource(format!("no suitable GPU adapter: {e}")))?;

        let (device, queue) = request_device(&adapter)?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| RenderError::Resource("surface has no formats".into()))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        log::info!(
            "GPU context on '{}' ({:?}), surface {:?}",
            adapter.get_info().name,
            adapter.get_info().backend,
            surface_format
        );

        Ok(Self {
            surface: Some(surface),
            device,
            queue,
            config,
        })
    }

    /// Create a context without a window. Image passes render to
    /// `Rgba8Unorm` targets of `width` x `height`.
    pub fn headless(width: u32, height: u32) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        Self::headless_on(&instance, width, height)
    }

    /// Like [`headless`](Self::headless), on an adapter of `instance`.
    pub fn headless_on(instance: &wgpu::Instance, width: u32, height: u32) -> RenderResult<Self> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| RenderError::Resource(format!("no suitable GPU adapter: {e}")))?;

        let (device, queue) = request_device(&adapter)?;
        log::info!("headless GPU context on '{}'", adapter.get_info().name);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: wgpu::TextureFormat::Rgba8Unorm,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        Ok(Self {
            surface: None,
            device,
            queue,
            config,
        })
    }

    /// Reconfigure the surface for a new window size.
    ///
    /// Takes `&self` so a context shared with renderers can follow window
    /// resizes; `width()`/`height()` keep reporting the creation size.
    /// Ignores zero-sized dimensions to avoid wgpu validation errors (which
    /// can occur during window minimize).
    pub fn resize_surface(&self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let Some(surface) = &self.surface {
            let config = wgpu::SurfaceConfiguration {
                width,
                height,
                ..self.config.clone()
            };
            surface.configure(&self.device, &config);
        }
    }

    /// Output width in pixels at creation.
    pub fn width(&self) -> u32 {
        self.config.width
    }

    /// Output height in pixels at creation.
    pub fn height(&self) -> u32 {
        self.config.height
    }

    /// Color format image passes render in.
    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Fails when a `width` x `height` 2D texture cannot be created on this
    /// device.
    pub fn check_texture_size(&self, width: u32, height: u32, what: &str) -> RenderResult<()> {
        let max = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(RenderError::Resource(format!(
                "{what}: {width}x{height} exceeds the device texture limit of {max}"
            )));
        }
        Ok(())
    }

    /// Acquires the next surface frame.
    pub fn current_frame(&self) -> RenderResult<wgpu::SurfaceTexture> {
        let surface = self
            .surface
            .as_ref()
            .ok_or_else(|| RenderError::Resource("headless context has no surface".into()))?;
        Ok(surface.get_current_texture()?)
    }
}

fn request_device(adapter: &wgpu::Adapter) -> RenderResult<(wgpu::Device, wgpu::Queue)> {
    pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("toygraph Device"),
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits::default(),
        memory_hints: Default::default(),
        trace: Default::default(),
        experimental_features: Default::default(),
    }))
    .map_err(|e| RenderError::Resource(format!("failed to create device: {e}")))
}
