//! Error types for document parsing, asset resolution and rendering.
//!
//! Every fallible operation in the crate returns one of these. The renderer
//! additionally keeps the text of its most recent failure around so a UI can
//! show it next to a fallback image (see
//! [`ShadertoyRenderer::last_error`](crate::ShadertoyRenderer::last_error)).

use thiserror::Error;

/// Failure while turning a JSON description into a [`ShaderDocument`](crate::ShaderDocument).
#[derive(Error, Debug)]
pub enum DocumentError {
    /// The top-level `"info"` object is absent or empty.
    #[error("missing info in json")]
    MissingInfo,

    /// The `"renderpass"` array is absent or empty.
    #[error("missing renderpass in json")]
    MissingRenderPasses,

    /// A `"renderpass"` entry is not a JSON object.
    #[error("invalid renderpass in json (entry {0})")]
    InvalidRenderPass(usize),

    /// A render pass declares a type tag other than buffer/image/sound.
    #[error("invalid renderpass type '{type_name}' (entry {index})")]
    InvalidPassType {
        /// Position of the pass in the `"renderpass"` array.
        index: usize,
        /// The offending tag.
        type_name: String,
    },

    /// The text is not valid JSON, or not an object.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure while resolving an input source to pixel data.
#[derive(Error, Debug)]
pub enum AssetError {
    /// No file or entry exists for the source id.
    #[error("asset not found: {0}")]
    NotFound(String),

    /// The asset file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The asset bytes are not a decodable image.
    #[error("image decode error: {0}")]
    Decode(#[from] image::ImageError),

    /// The background worker has shut down.
    #[error("asset worker disconnected")]
    Disconnected,
}

/// Failure while compiling or drawing a document.
#[derive(Error, Debug)]
pub enum RenderError {
    /// No GPU context has been attached to the renderer.
    #[error("no GPU context set")]
    NoContext,

    /// The renderer has no compiled programs (a previous build failed).
    #[error("renderer is not ready")]
    NotReady,

    /// The document presented to the renderer is not valid.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// The shared vertex program failed to compile.
    #[error("vertex compile failed (pass: {pass}):\n{log}")]
    VertexCompile {
        /// Display name of the pass being built.
        pass: String,
        /// Compiler diagnostics.
        log: String,
    },

    /// A pass' fragment program failed to compile.
    #[error("compile failed (pass: {pass}):\n{log}")]
    FragmentCompile {
        /// Display name of the failing pass.
        pass: String,
        /// Compiler diagnostics.
        log: String,
    },

    /// Vertex and fragment stage could not be combined into a pipeline.
    #[error("link failed (pass: {pass}):\n{log}")]
    Link {
        /// Display name of the failing pass.
        pass: String,
        /// Validation diagnostics.
        log: String,
    },

    /// A GPU buffer, texture or context could not be created.
    #[error("resource error: {0}")]
    Resource(String),

    /// The window surface could not provide a frame.
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    /// Reading rendered pixels back from the GPU failed.
    #[error("readback failed: {0}")]
    Readback(String),

    /// `render_sound` was called on a document without a sound pass.
    #[error("document has no sound pass")]
    NoSoundPass,
}

/// Convenience alias for render results.
pub type RenderResult<T> = std::result::Result<T, RenderError>;
