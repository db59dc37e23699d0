//! Render targets and the double-buffered ring behind buffer passes.

use crate::error::{RenderError, RenderResult};
use crate::gpu::GpuContext;

/// Format of buffer-pass ring targets. Filterable, with float precision for
/// feedback simulations.
pub const BUFFER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Format of sound-pass targets; two float channels per sample are read back.
pub const SOUND_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// An off-screen render target.
///
/// Render targets can be both rendered to (as a color attachment) and
/// sampled from (as a texture binding), and copied out for readback.
pub struct RenderTarget {
    /// The underlying GPU texture that stores pixel data.
    pub texture: wgpu::Texture,
    /// A view into the texture, used for render pass attachments and shader sampling.
    pub view: wgpu::TextureView,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
}

impl RenderTarget {
    /// Creates a `width` x `height` target of `format`. Zero sizes are
    /// raised to one; sizes past the device limit are an error.
    pub fn new(
        gpu: &GpuContext,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        label: &str,
    ) -> RenderResult<Self> {
        let (width, height) = (width.max(1), height.max(1));
        gpu.check_texture_size(width, height, label)?;
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Self {
            texture,
            view,
            width,
            height,
            format,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Copies the target back to the CPU as tightly packed rows, row 0
    /// first. Blocks until the copy has completed.
    pub fn read_pixels(&self, gpu: &GpuContext) -> RenderResult<Vec<u8>> {
        let texel_size = self.format.block_copy_size(None).ok_or_else(|| {
            RenderError::Readback(format!("{:?} cannot be copied", self.format))
        })?;
        let row_bytes = self.width * texel_size;
        let padded_row = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let size = u64::from(padded_row) * u64::from(self.height);
        let max = gpu.device.limits().max_buffer_size;
        if size > max {
            return Err(RenderError::Readback(format!(
                "{}x{} {:?} needs {size} bytes, over the device buffer limit of {max}",
                self.width, self.height, self.format
            )));
        }
        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = flume::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let mapped = loop {
            gpu.device
                .poll(wgpu::PollType::Poll)
                .map_err(|e| RenderError::Readback(e.to_string()))?;
            match rx.try_recv() {
                Ok(result) => break result,
                Err(flume::TryRecvError::Empty) => std::thread::yield_now(),
                Err(flume::TryRecvError::Disconnected) => {
                    return Err(RenderError::Readback("map callback dropped".into()));
                }
            }
        };
        mapped.map_err(|e| RenderError::Readback(e.to_string()))?;

        let mut pixels = Vec::with_capacity((row_bytes * self.height) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks_exact(padded_row as usize) {
                pixels.extend_from_slice(&row[..row_bytes as usize]);
            }
        }
        buffer.unmap();
        Ok(pixels)
    }
}

/// Two slots with a toggled write index.
///
/// Callers only ever see "the writable one" and "the readable one"; which
/// physical slot is which is private. After [`swap`](Self::swap) the slot
/// just written becomes readable.
#[derive(Debug)]
pub struct Ring<T> {
    slots: [T; 2],
    write: usize,
}

impl<T> Ring<T> {
    pub fn new(a: T, b: T) -> Self {
        Self {
            slots: [a, b],
            write: 0,
        }
    }

    /// Slot the next draw renders into.
    pub fn write(&self) -> &T {
        &self.slots[self.write]
    }

    /// Slot holding the last completed draw.
    pub fn read(&self) -> &T {
        &self.slots[1 - self.write]
    }

    /// Exchanges roles; call after a draw into [`write`](Self::write).
    pub fn swap(&mut self) {
        self.write = 1 - self.write;
    }
}

/// Double-buffered render target of one buffer pass.
pub struct FramebufferRing {
    ring: Ring<RenderTarget>,
    label: String,
}

impl FramebufferRing {
    /// Allocates both targets at `width` x `height`, cleared to zero.
    pub fn new(gpu: &GpuContext, width: u32, height: u32, label: &str) -> RenderResult<Self> {
        let ring = Ring::new(
            RenderTarget::new(gpu, width, height, BUFFER_FORMAT, &format!("{label} [0]"))?,
            RenderTarget::new(gpu, width, height, BUFFER_FORMAT, &format!("{label} [1]"))?,
        );
        Ok(Self {
            ring,
            label: label.to_string(),
        })
    }

    /// Target the pass draws into this frame.
    pub fn writable(&self) -> &RenderTarget {
        self.ring.write()
    }

    /// Target holding the previous completed draw.
    pub fn readable(&self) -> &RenderTarget {
        self.ring.read()
    }

    pub fn swap(&mut self) {
        self.ring.swap();
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}
