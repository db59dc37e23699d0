//! Per-pass GPU programs compiled from a document.
//!
//! [`ShaderProgramCache::build`] turns every pass of a document into a
//! [`PassProgram`]: a render pipeline combining the shared quad vertex
//! program with the pass' generated fragment program, a uniform buffer and
//! the bind group layout its channels are bound through.
//!
//! Compilation is all-or-nothing. The first vertex, fragment or pipeline
//! error aborts the build and everything created so far is dropped.
//!
//! # Bindings
//!
//! | Set | Binding     | Content                                   |
//! |-----|-------------|-------------------------------------------|
//! | 0   | 0           | [`ShadertoyUniforms`]                     |
//! | 1   | 2j          | `iChannelj` texture (2D or cube)          |
//! | 1   | 2j + 1      | `iChannelj` sampler                       |

use wgpu::util::DeviceExt;

use crate::document::{CHANNEL_COUNT, PassKind, ShaderDocument};
use crate::error::{RenderError, RenderResult};
use crate::gpu::GpuContext;
use crate::graph::PassGraph;
use crate::render_target::{BUFFER_FORMAT, SOUND_FORMAT};
use crate::shader_gen::{self, Projection};
use crate::uniforms::ShadertoyUniforms;

const QUAD_VERTICES: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];
const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// Full-screen quad drawn by every pass.
pub struct QuadGeometry {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
}

impl QuadGeometry {
    pub fn new(gpu: &GpuContext) -> Self {
        let vertex_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Quad Vertices"),
                contents: bytemuck::cast_slice(&QUAD_VERTICES),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Quad Indices"),
                contents: bytemuck::cast_slice(&QUAD_INDICES),
                usage: wgpu::BufferUsages::INDEX,
            });
        Self {
            vertex_buffer,
            index_buffer,
        }
    }

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

/// The compiled program of one pass.
pub struct PassProgram {
    /// Index of the pass in the document.
    pub pass: usize,
    pub kind: PassKind,
    pub name: String,
    /// Format of the color target the pipeline writes.
    pub target_format: wgpu::TextureFormat,
    /// Which channels were declared as cube samplers.
    pub cube_channels: [bool; CHANNEL_COUNT],
    pipeline: wgpu::RenderPipeline,
    channel_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
}

impl PassProgram {
    /// Layout of the set-1 bind group this pass' channels are bound through.
    pub fn channel_layout(&self) -> &wgpu::BindGroupLayout {
        &self.channel_layout
    }

    /// Uploads this pass' uniforms. Each pass owns its buffer, so writes for
    /// several passes can be recorded before a single submit.
    pub fn write_uniforms(&self, gpu: &GpuContext, uniforms: &ShadertoyUniforms) {
        gpu.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
    }

    /// Draws the full-screen quad.
    pub fn draw(
        &self,
        render_pass: &mut wgpu::RenderPass,
        quad: &QuadGeometry,
        channels: &wgpu::BindGroup,
    ) {
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        render_pass.set_bind_group(1, channels, &[]);
        render_pass.set_vertex_buffer(0, quad.vertex_buffer.slice(..));
        render_pass.set_index_buffer(quad.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        render_pass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..1);
    }
}

/// All programs of one document, indexed by document pass index.
pub struct ShaderProgramCache {
    quad: QuadGeometry,
    programs: Vec<PassProgram>,
    projection: Projection,
    image_format: wgpu::TextureFormat,
}

impl ShaderProgramCache {
    /// Compiles every pass of `doc`.
    ///
    /// Image passes target `image_format`, buffer passes the ring format and
    /// sound passes the float sound format.
    pub fn build(
        gpu: &GpuContext,
        doc: &ShaderDocument,
        graph: &PassGraph,
        projection: Projection,
        image_format: wgpu::TextureFormat,
    ) -> RenderResult<Self> {
        if !doc.is_valid() {
            return Err(RenderError::InvalidDocument(
                doc.error().unwrap_or("no render passes").to_string(),
            ));
        }
        let device = &gpu.device;

        let first_name = graph
            .order()
            .first()
            .and_then(|&i| doc.render_pass(i))
            .map(|p| p.name().to_string())
            .unwrap_or_default();

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Quad Vertex Shader"),
            source: wgpu::ShaderSource::Wgsl(shader_gen::VERTEX_WGSL.into()),
        });
        if let Some(e) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::VertexCompile {
                pass: first_name,
                log: e.to_string(),
            });
        }

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Shadertoy Uniforms Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(ShadertoyUniforms::SIZE),
                },
                count: None,
            }],
        });

        let mut programs = Vec::with_capacity(graph.nodes().len());
        for &index in graph.order() {
            let (Some(pass), Some(node)) = (doc.render_pass(index), graph.node(index)) else {
                continue;
            };
            let cube_channels: [bool; CHANNEL_COUNT] =
                std::array::from_fn(|c| node.channels[c].is_cubemap());
            let target_format = match pass.kind() {
                PassKind::Buffer => BUFFER_FORMAT,
                PassKind::Image => image_format,
                PassKind::Sound => SOUND_FORMAT,
            };
            let source = shader_gen::fragment_program(
                pass.kind(),
                pass.fragment_source(),
                cube_channels,
                projection,
            );

            device.push_error_scope(wgpu::ErrorFilter::Validation);
            let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(pass.name()),
                source: wgpu::ShaderSource::Glsl {
                    shader: source.into(),
                    stage: wgpu::naga::ShaderStage::Fragment,
                    defines: &[],
                },
            });
            if let Some(e) = pollster::block_on(device.pop_error_scope()) {
                let log = shader_gen::map_source_lines(&e.to_string(), &["glsl", pass.name()]);
                log::error!("compile failed (pass: {}): {log}", pass.name());
                return Err(RenderError::FragmentCompile {
                    pass: pass.name().to_string(),
                    log,
                });
            }

            let channel_layout = channel_layout(device, pass.name(), cube_channels);

            device.push_error_scope(wgpu::ErrorFilter::Validation);
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(pass.name()),
                bind_group_layouts: &[&uniform_layout, &channel_layout],
                push_constant_ranges: &[],
            });
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(pass.name()),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex,
                    entry_point: Some("vs"),
                    buffers: &[QuadGeometry::layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment,
                    entry_point: Some("main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: target_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
            if let Some(e) = pollster::block_on(device.pop_error_scope()) {
                log::error!("link failed (pass: {}): {e}", pass.name());
                return Err(RenderError::Link {
                    pass: pass.name().to_string(),
                    log: e.to_string(),
                });
            }

            let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("{} Uniforms", pass.name())),
                size: ShadertoyUniforms::SIZE,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("{} Uniform Bind Group", pass.name())),
                layout: &uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                }],
            });

            log::debug!("compiled pass '{}' ({:?})", pass.name(), pass.kind());
            programs.push(PassProgram {
                pass: index,
                kind: pass.kind(),
                name: pass.name().to_string(),
                target_format,
                cube_channels,
                pipeline,
                channel_layout,
                uniform_buffer,
                uniform_bind_group,
            });
        }

        // Stored in document order for direct lookup.
        programs.sort_by_key(|p| p.pass);
        log::info!("compiled {} pass programs", programs.len());

        Ok(Self {
            quad: QuadGeometry::new(gpu),
            programs,
            projection,
            image_format,
        })
    }

    /// Program of the pass at document index `pass`.
    pub fn program(&self, pass: usize) -> Option<&PassProgram> {
        self.programs
            .binary_search_by_key(&pass, |p| p.pass)
            .ok()
            .map(|i| &self.programs[i])
    }

    pub fn programs(&self) -> &[PassProgram] {
        &self.programs
    }

    pub fn quad(&self) -> &QuadGeometry {
        &self.quad
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn image_format(&self) -> wgpu::TextureFormat {
        self.image_format
    }
}

fn channel_layout(
    device: &wgpu::Device,
    pass_name: &str,
    cube_channels: [bool; CHANNEL_COUNT],
) -> wgpu::BindGroupLayout {
    let mut entries = Vec::with_capacity(CHANNEL_COUNT * 2);
    for (channel, cube) in cube_channels.into_iter().enumerate() {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: (channel as u32) * 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: if cube {
                    wgpu::TextureViewDimension::Cube
                } else {
                    wgpu::TextureViewDimension::D2
                },
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: (channel as u32) * 2 + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&format!("{pass_name} Channels Layout")),
        entries: &entries,
    })
}
