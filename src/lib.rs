//! # toygraph
//!
//! **Multi-pass Shadertoy-style GLSL shaders on wgpu.**
//!
//! A shader document is a JSON description of up to a handful of render
//! passes: buffer passes that render into double-buffered targets, an image
//! pass that renders to the screen and an optional sound pass. Each pass
//! reads up to four channels, which may be images, cubemaps, the keyboard,
//! a camera or the output of another buffer pass (including its own
//! previous frame).
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use toygraph::*;
//!
//! let gpu = Arc::new(GpuContext::headless(400, 300).unwrap());
//! let mut offscreen = OffscreenRenderer::new(gpu, RendererConfig::new());
//!
//! let renderer = offscreen.renderer_mut();
//! renderer.set_asset_resolver(DirectoryResolver::new("assets"));
//! renderer.set_document(ShaderDocument::from_path("shader.json").unwrap());
//! renderer.set_global_time(2.5);
//!
//! offscreen.render_to_image(400, 300).unwrap().save("frame.png").unwrap();
//! ```
//!
//! ## Pipeline
//!
//! - [`ShaderDocument`] parses and edits the JSON description.
//! - [`PassGraph`] resolves every channel to a pass, an asset or a host input.
//! - [`ShaderProgramCache`] wraps each pass' source into a complete GLSL
//!   program and compiles it, all passes or none.
//! - [`ShadertoyRenderer`] owns the GPU resources and draws frames.
//!
//! Failures never panic: operations return [`RenderResult`] and the
//! renderer keeps the last message in [`ShadertoyRenderer::last_error`].

mod assets;
mod document;
mod error;
mod gpu;
mod graph;
mod hot_document;
mod input;
mod keyboard;
mod offscreen;
mod program;
mod render_target;
mod renderer;
mod shader_gen;
mod texture;
mod uniforms;

pub use assets::{
    AssetEvent, AssetResolver, BackgroundResolver, DirectoryResolver, PixelData, Resolved,
    cubemap_faces,
};
pub use document::{
    CHANNEL_COUNT, FilterMode, InputKind, PassKind, RenderPass, ShaderDocument, ShaderInfo,
    ShaderInput, UsageFlags, WrapMode,
};
pub use error::{AssetError, DocumentError, RenderError, RenderResult};
pub use gpu::GpuContext;
pub use graph::{AssetRequest, ChannelBinding, PassGraph, PassNode, VirtualInput};
pub use hot_document::HotDocument;
pub use input::Input;
pub use keyboard::{KEYBOARD_HEIGHT, KEYBOARD_WIDTH, KeyboardState, js_key_code};
pub use offscreen::OffscreenRenderer;
pub use program::{PassProgram, QuadGeometry, ShaderProgramCache};
pub use render_target::{BUFFER_FORMAT, FramebufferRing, RenderTarget, SOUND_FORMAT};
pub use renderer::{RendererConfig, RendererEvent, RendererState, ShadertoyRenderer};
pub use shader_gen::{Projection, fragment_program, map_source_lines, source_line_offset};
pub use texture::ChannelTexture;
pub use uniforms::{FrameInputs, ShaderDate, ShadertoyUniforms};

// Re-export glam math types for convenience
pub use glam::Vec2;

// Re-export commonly used winit types for convenience
pub use winit::event::MouseButton;
pub use winit::keyboard::KeyCode;
