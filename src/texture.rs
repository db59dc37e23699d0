use crate::assets::PixelData;
use crate::document::{FilterMode, WrapMode};
use crate::error::{RenderError, RenderResult};
use crate::gpu::GpuContext;
use crate::keyboard::{KEYBOARD_HEIGHT, KEYBOARD_WIDTH};

/// A sampled input texture: an image, a cubemap, the keyboard bitmap or a
/// camera frame.
#[derive(Debug)]
pub struct ChannelTexture {
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    pub cube: bool,
}

impl ChannelTexture {
    /// Uploads decoded pixels, optionally flipped and with a mip chain.
    /// Images larger than the device allows are an error.
    pub fn from_pixels(
        gpu: &GpuContext,
        pixels: &PixelData,
        vflip: bool,
        mipmaps: bool,
        label: &str,
    ) -> RenderResult<Self> {
        gpu.check_texture_size(pixels.width, pixels.height, label)?;
        Ok(Self::upload(gpu, pixels, vflip, mipmaps, label))
    }

    fn upload(
        gpu: &GpuContext,
        pixels: &PixelData,
        vflip: bool,
        mipmaps: bool,
        label: &str,
    ) -> Self {
        let base = if vflip {
            pixels.flipped_vertically()
        } else {
            pixels.clone()
        };
        let levels = if mipmaps {
            base.mip_chain()
        } else {
            vec![base]
        };
        let texture = create_texture(
            gpu,
            label,
            pixels.width,
            pixels.height,
            1,
            levels.len() as u32,
            wgpu::TextureFormat::Rgba8Unorm,
        );
        for (level, data) in levels.iter().enumerate() {
            write_level(gpu, &texture, level as u32, 0, data);
        }
        log::debug!(
            "texture '{label}' {}x{} ({} levels)",
            pixels.width,
            pixels.height,
            levels.len()
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width: pixels.width,
            height: pixels.height,
            cube: false,
        }
    }

    /// Builds a cube texture from six square faces of equal size.
    pub fn cube_from_faces(
        gpu: &GpuContext,
        faces: &[&PixelData; 6],
        vflip: bool,
        mipmaps: bool,
        label: &str,
    ) -> RenderResult<Self> {
        let size = faces[0].width;
        if faces.iter().any(|f| f.width != size || f.height != size) {
            return Err(RenderError::Resource(format!(
                "cubemap '{label}' faces must be square and equally sized"
            )));
        }
        gpu.check_texture_size(size, size, label)?;
        let chains: Vec<Vec<PixelData>> = faces
            .iter()
            .map(|face| {
                let base = if vflip {
                    face.flipped_vertically()
                } else {
                    (*face).clone()
                };
                if mipmaps { base.mip_chain() } else { vec![base] }
            })
            .collect();
        let mip_count = chains[0].len() as u32;
        let texture = create_texture(
            gpu,
            label,
            size,
            size,
            6,
            mip_count,
            wgpu::TextureFormat::Rgba8Unorm,
        );
        for (layer, chain) in chains.iter().enumerate() {
            for (level, data) in chain.iter().enumerate() {
                write_level(gpu, &texture, level as u32, layer as u32, data);
            }
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        Ok(Self {
            texture,
            view,
            width: size,
            height: size,
            cube: true,
        })
    }

    /// 1x1 transparent black, bound to channels with nothing to sample.
    pub fn placeholder(gpu: &GpuContext, cube: bool) -> Self {
        let pixel = PixelData::new(1, 1, vec![0; 4]);
        if cube {
            let texture = create_texture(
                gpu,
                "Placeholder Cube",
                1,
                1,
                6,
                1,
                wgpu::TextureFormat::Rgba8Unorm,
            );
            for layer in 0..6 {
                write_level(gpu, &texture, 0, layer, &pixel);
            }
            let view = texture.create_view(&wgpu::TextureViewDescriptor {
                dimension: Some(wgpu::TextureViewDimension::Cube),
                ..Default::default()
            });
            Self {
                texture,
                view,
                width: 1,
                height: 1,
                cube: true,
            }
        } else {
            Self::upload(gpu, &pixel, false, false, "Placeholder")
        }
    }

    /// The 256x3 keyboard bitmap, single channel.
    pub fn keyboard(gpu: &GpuContext) -> Self {
        let texture = create_texture(
            gpu,
            "Keyboard",
            KEYBOARD_WIDTH,
            KEYBOARD_HEIGHT,
            1,
            1,
            wgpu::TextureFormat::R8Unorm,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width: KEYBOARD_WIDTH,
            height: KEYBOARD_HEIGHT,
            cube: false,
        }
    }

    pub fn write_keyboard(&self, gpu: &GpuContext, bytes: &[u8]) {
        gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(KEYBOARD_WIDTH),
                rows_per_image: Some(KEYBOARD_HEIGHT),
            },
            wgpu::Extent3d {
                width: KEYBOARD_WIDTH,
                height: KEYBOARD_HEIGHT,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Overwrites level 0 in place when `pixels` matches the texture size.
    /// Returns `false` when the sizes differ and the texture must be recreated.
    pub fn update(&self, gpu: &GpuContext, pixels: &PixelData) -> bool {
        if self.cube || pixels.width != self.width || pixels.height != self.height {
            return false;
        }
        write_level(gpu, &self.texture, 0, 0, pixels);
        true
    }
}

fn create_texture(
    gpu: &GpuContext,
    label: &str,
    width: u32,
    height: u32,
    layers: u32,
    mip_level_count: u32,
    format: wgpu::TextureFormat,
) -> wgpu::Texture {
    gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: layers,
        },
        mip_level_count,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

fn write_level(gpu: &GpuContext, texture: &wgpu::Texture, level: u32, layer: u32, data: &PixelData) {
    gpu.queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: level,
            origin: wgpu::Origin3d {
                x: 0,
                y: 0,
                z: layer,
            },
            aspect: wgpu::TextureAspect::All,
        },
        &data.rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * data.width),
            rows_per_image: Some(data.height),
        },
        wgpu::Extent3d {
            width: data.width,
            height: data.height,
            depth_or_array_layers: 1,
        },
    );
}

/// One sampler per filter and wrap combination, created up front.
pub struct SamplerSet {
    samplers: Vec<wgpu::Sampler>,
}

const FILTERS: [FilterMode; 3] = [FilterMode::Nearest, FilterMode::Linear, FilterMode::Mipmap];
const WRAPS: [WrapMode; 2] = [WrapMode::Clamp, WrapMode::Repeat];

impl SamplerSet {
    pub fn new(gpu: &GpuContext) -> Self {
        let samplers = FILTERS
            .iter()
            .flat_map(|&filter| WRAPS.iter().map(move |&wrap| (filter, wrap)))
            .map(|(filter, wrap)| create_sampler(gpu, filter, wrap))
            .collect();
        Self { samplers }
    }

    pub fn get(&self, filter: FilterMode, wrap: WrapMode) -> &wgpu::Sampler {
        &self.samplers[sampler_index(filter, wrap)]
    }
}

fn sampler_index(filter: FilterMode, wrap: WrapMode) -> usize {
    let f = match filter {
        FilterMode::Nearest => 0,
        FilterMode::Linear => 1,
        FilterMode::Mipmap => 2,
    };
    let w = match wrap {
        WrapMode::Clamp => 0,
        WrapMode::Repeat => 1,
    };
    f * WRAPS.len() + w
}

fn create_sampler(gpu: &GpuContext, filter: FilterMode, wrap: WrapMode) -> wgpu::Sampler {
    let address = match wrap {
        WrapMode::Clamp => wgpu::AddressMode::ClampToEdge,
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
    };
    let (mag, min, mip) = match filter {
        FilterMode::Nearest => (
            wgpu::FilterMode::Nearest,
            wgpu::FilterMode::Nearest,
            wgpu::FilterMode::Nearest,
        ),
        FilterMode::Linear => (
            wgpu::FilterMode::Linear,
            wgpu::FilterMode::Linear,
            wgpu::FilterMode::Nearest,
        ),
        FilterMode::Mipmap => (
            wgpu::FilterMode::Linear,
            wgpu::FilterMode::Linear,
            wgpu::FilterMode::Linear,
        ),
    };
    gpu.device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(&format!("Channel Sampler {}/{}", filter.name(), wrap.name())),
        address_mode_u: address,
        address_mode_v: address,
        address_mode_w: address,
        mag_filter: mag,
        min_filter: min,
        mipmap_filter: mip,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampler_indices_follow_creation_order() {
        let mut expected = 0;
        for filter in FILTERS {
            for wrap in WRAPS {
                assert_eq!(sampler_index(filter, wrap), expected);
                expected += 1;
            }
        }
    }
}
