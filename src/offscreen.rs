//! Single-shot rendering into an owned target, downloaded as an image.

use std::sync::Arc;

use image::RgbaImage;

use crate::error::{RenderError, RenderResult};
use crate::gpu::GpuContext;
use crate::render_target::RenderTarget;
use crate::renderer::{RendererConfig, ShadertoyRenderer};

/// A [`ShadertoyRenderer`] drawing into its own texture instead of a window.
///
/// ```no_run
/// use std::sync::Arc;
/// use toygraph::{GpuContext, OffscreenRenderer, RendererConfig, ShaderDocument};
///
/// let gpu = Arc::new(GpuContext::headless(320, 180).unwrap());
/// let mut offscreen = OffscreenRenderer::new(gpu, RendererConfig::new());
/// offscreen
///     .renderer_mut()
///     .set_document(ShaderDocument::from_path("shader.json").unwrap());
/// offscreen.render_to_image(320, 180).unwrap().save("shot.png").unwrap();
/// ```
pub struct OffscreenRenderer {
    gpu: Arc<GpuContext>,
    renderer: ShadertoyRenderer,
    target: Option<RenderTarget>,
}

impl OffscreenRenderer {
    pub fn new(gpu: Arc<GpuContext>, config: RendererConfig) -> Self {
        let mut renderer = ShadertoyRenderer::new(config);
        renderer.set_context(gpu.clone());
        Self {
            gpu,
            renderer,
            target: None,
        }
    }

    pub fn renderer(&self) -> &ShadertoyRenderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut ShadertoyRenderer {
        &mut self.renderer
    }

    /// Renders one single-shot frame at `width` x `height` and downloads it.
    /// Row 0 of the image is the top of the picture. Sizes past the device
    /// limits fail with [`RenderError::Resource`].
    pub fn render_to_image(&mut self, width: u32, height: u32) -> RenderResult<RgbaImage> {
        self.renderer.set_resolution(width, height);
        let stale = self
            .target
            .as_ref()
            .is_none_or(|t| t.width() != width.max(1) || t.height() != height.max(1));
        if stale {
            self.target = Some(RenderTarget::new(
                &self.gpu,
                width,
                height,
                self.gpu.format(),
                "Offscreen Target",
            )?);
        }
        let Some(target) = &self.target else {
            return Err(RenderError::NotReady);
        };

        self.renderer.render(&target.view, false)?;
        let mut bytes = target.read_pixels(&self.gpu)?;
        match target.format() {
            wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => {}
            wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => {
                for texel in bytes.chunks_exact_mut(4) {
                    texel.swap(0, 2);
                }
            }
            other => {
                return Err(RenderError::Readback(format!(
                    "cannot convert {other:?} to RGBA8"
                )));
            }
        }
        RgbaImage::from_raw(target.width(), target.height(), bytes)
            .ok_or_else(|| RenderError::Readback("pixel buffer size mismatch".into()))
    }
}
