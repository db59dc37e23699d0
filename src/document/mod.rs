//! Typed view over a Shadertoy-style JSON shader description.
//!
//! A [`ShaderDocument`] is built from the JSON tree the remote API serves:
//!
//! ```text
//! {
//!   "info":       { "id", "name", "username", "description", "date", "viewed", "likes", "tags", ... },
//!   "renderpass": [ { "type", "name", "code", "outputs": [{ "id" }], "inputs": [ ... ] }, ... ]
//! }
//! ```
//!
//! Parsing never fails loudly. A malformed description produces a document
//! whose [`is_valid`](ShaderDocument::is_valid) is `false` and whose
//! [`error`](ShaderDocument::error) explains why. Edits go through the
//! document so the JSON tree and the typed passes never disagree.
//!
//! # Example
//!
//! ```
//! use toygraph::ShaderDocument;
//!
//! let doc = ShaderDocument::from_json_str(r#"{
//!     "info": { "id": "abc", "name": "Red" },
//!     "renderpass": [{ "type": "image", "code": "void mainImage(out vec4 c, in vec2 f) { c = vec4(1,0,0,1); }" }]
//! }"#);
//! assert!(doc.is_valid());
//! assert_eq!(doc.render_passes().len(), 1);
//! ```

mod input;
mod pass;

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::DocumentError;

pub use input::{CHANNEL_COUNT, FilterMode, InputKind, ShaderInput, WrapMode};
pub use pass::{PassKind, RenderPass};

/// Which input kinds appear anywhere in a document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UsageFlags {
    /// Texture or cubemap inputs (buffers are not counted here).
    pub textures: bool,
    pub buffers: bool,
    /// Music or music stream inputs.
    pub music: bool,
    pub video: bool,
    pub camera: bool,
    pub microphone: bool,
    pub keyboard: bool,
}

impl UsageFlags {
    fn record(&mut self, kind: InputKind) {
        match kind {
            InputKind::Keyboard => self.keyboard = true,
            InputKind::Music | InputKind::MusicStream => self.music = true,
            InputKind::Microphone => self.microphone = true,
            InputKind::Camera => self.camera = true,
            InputKind::Buffer => self.buffers = true,
            InputKind::Video => self.video = true,
            InputKind::Texture | InputKind::Cubemap => self.textures = true,
            InputKind::None => {}
        }
    }
}

/// Metadata from the `"info"` object plus a summary of all passes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShaderInfo {
    pub id: String,
    pub name: String,
    pub username: String,
    pub description: String,
    /// Creation date in unix seconds.
    pub date: u64,
    pub views: i64,
    pub likes: i64,
    pub published: i64,
    pub flags: i64,
    pub has_liked: i64,
    pub tags: Vec<String>,
    /// Total characters of all pass sources.
    pub num_chars: usize,
    pub usage: UsageFlags,
}

impl ShaderInfo {
    /// Public page of the shader.
    pub fn url(&self) -> String {
        format!("https://shadertoy.com/view/{}", self.id)
    }

    fn from_json(info: &Map<String, Value>) -> Self {
        let string = |key: &str| {
            info.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let int = |key: &str| info.get(key).and_then(as_lenient_i64).unwrap_or(0);

        Self {
            id: string("id"),
            name: string("name"),
            username: string("username"),
            description: string("description"),
            date: info
                .get("date")
                .and_then(as_lenient_i64)
                .and_then(|d| u64::try_from(d).ok())
                .unwrap_or(0),
            views: int("viewed"),
            likes: int("likes"),
            published: int("published"),
            flags: int("flags"),
            has_liked: int("hasliked"),
            tags: info
                .get("tags")
                .and_then(Value::as_array)
                .map(|tags| {
                    tags.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            num_chars: 0,
            usage: UsageFlags::default(),
        }
    }

    /// Re-derives the character count and usage flags from `passes`.
    fn summarize(&mut self, passes: &[RenderPass]) {
        self.num_chars = 0;
        self.usage = UsageFlags::default();
        for pass in passes {
            self.num_chars += pass.fragment_source().chars().count();
            for input in pass.inputs() {
                self.usage.record(input.kind());
            }
        }
    }
}

/// A whole multi-pass shader program.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShaderDocument {
    json: Map<String, Value>,
    passes: Vec<RenderPass>,
    info: ShaderInfo,
    error: Option<String>,
}

impl ShaderDocument {
    /// Builds a document from a JSON value. Never fails; check [`is_valid`](Self::is_valid).
    pub fn from_json(value: Value) -> Self {
        let Value::Object(json) = value else {
            return Self::invalid(Map::new(), "json root is not an object");
        };
        let mut doc = Self {
            json,
            ..Default::default()
        };
        if let Err(e) = doc.parse() {
            log::warn!("shader document rejected: {e}");
            doc.passes.clear();
            doc.error = Some(e.to_string());
        }
        doc
    }

    /// Builds a document from JSON text.
    pub fn from_json_str(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Self::from_json(value),
            Err(e) => Self::invalid(Map::new(), DocumentError::from(e).to_string()),
        }
    }

    /// Reads and parses a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let text = std::fs::read_to_string(path)?;
        let value = serde_json::from_str(&text)?;
        Ok(Self::from_json(value))
    }

    fn invalid(json: Map<String, Value>, error: impl Into<String>) -> Self {
        Self {
            json,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    fn parse(&mut self) -> Result<(), DocumentError> {
        let info = match self.json.get("info").and_then(Value::as_object) {
            Some(info) if !info.is_empty() => info,
            _ => return Err(DocumentError::MissingInfo),
        };
        self.info = ShaderInfo::from_json(info);

        let entries = match self.json.get("renderpass").and_then(Value::as_array) {
            Some(entries) if !entries.is_empty() => entries,
            _ => return Err(DocumentError::MissingRenderPasses),
        };

        let mut passes = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let Some(object) = entry.as_object() else {
                return Err(DocumentError::InvalidRenderPass(index));
            };
            let pass = RenderPass::from_json(object.clone())
                .map_err(|type_name| DocumentError::InvalidPassType { index, type_name })?;
            passes.push(pass);
        }

        self.info.summarize(&passes);
        self.passes = passes;
        Ok(())
    }

    /// `true` when parsing succeeded and at least one pass exists.
    pub fn is_valid(&self) -> bool {
        self.error.is_none() && !self.passes.is_empty()
    }

    /// Why the document is invalid, if it is.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn info(&self) -> &ShaderInfo {
        &self.info
    }

    /// The underlying JSON tree, including every edit made through this document.
    pub fn json(&self) -> &Map<String, Value> {
        &self.json
    }

    /// Serializes the JSON tree.
    pub fn to_json_string(&self) -> String {
        Value::Object(self.json.clone()).to_string()
    }

    /// Passes in declaration order.
    pub fn render_passes(&self) -> &[RenderPass] {
        &self.passes
    }

    pub fn render_pass(&self, index: usize) -> Option<&RenderPass> {
        self.passes.get(index)
    }

    /// Indices of all passes in execution order.
    ///
    /// Sorted by kind (buffer, image, sound) then by name; the sort is stable
    /// so passes with equal kind and name keep their declaration order.
    pub fn execution_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.passes.len()).collect();
        order.sort_by(|&a, &b| {
            let (a, b) = (&self.passes[a], &self.passes[b]);
            a.kind().cmp(&b.kind()).then_with(|| a.name().cmp(b.name()))
        });
        order
    }

    /// Passes in execution order.
    pub fn sorted_render_passes(&self) -> Vec<&RenderPass> {
        self.execution_order()
            .into_iter()
            .map(|i| &self.passes[i])
            .collect()
    }

    /// Case-insensitive search over name, author, description, tags and
    /// sources; the id must match case-sensitively.
    pub fn contains_text(&self, needle: &str) -> bool {
        let lowered = needle.to_lowercase();
        let has = |haystack: &str| haystack.to_lowercase().contains(&lowered);

        has(&self.info.description)
            || has(&self.info.name)
            || has(&self.info.username)
            || self.info.id.contains(needle)
            || self.info.tags.iter().any(|t| has(t))
            || self.passes.iter().any(|p| has(p.fragment_source()))
    }

    /// Replaces the source of pass `index`. Out-of-range indices are refused.
    pub fn set_fragment_source(&mut self, index: usize, source: impl Into<String>) -> bool {
        let Some(pass) = self.passes.get(index) else {
            log::warn!("set_fragment_source({index}) out of range, ignored");
            return false;
        };
        let mut pass = pass.clone();
        pass.set_fragment_source(source);
        self.store_pass(index, pass);
        true
    }

    /// Replaces one input of pass `index`. Out-of-range passes or channels are refused.
    pub fn set_input(&mut self, index: usize, channel: usize, input: ShaderInput) -> bool {
        let Some(pass) = self.passes.get(index) else {
            log::warn!("set_input(pass {index}) out of range, ignored");
            return false;
        };
        let mut pass = pass.clone();
        if !pass.set_input(channel, input) {
            return false;
        }
        self.store_pass(index, pass);
        true
    }

    /// Replaces a whole pass. Out-of-range indices are refused, never appended.
    pub fn set_render_pass(&mut self, index: usize, pass: RenderPass) -> bool {
        if index >= self.passes.len() {
            log::warn!("set_render_pass({index}) out of range, ignored");
            return false;
        }
        self.store_pass(index, pass);
        true
    }

    fn store_pass(&mut self, index: usize, pass: RenderPass) {
        if let Some(Value::Array(entries)) = self.json.get_mut("renderpass") {
            if let Some(entry) = entries.get_mut(index) {
                *entry = Value::Object(pass.json().clone());
            }
        }
        self.passes[index] = pass;
        self.info.summarize(&self.passes);
    }
}

fn as_lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
