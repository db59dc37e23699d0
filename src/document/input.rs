//! One input channel of a render pass.

use std::fmt;

use serde_json::{Map, Value};

/// Number of input channels every pass exposes (`iChannel0..3`).
pub const CHANNEL_COUNT: usize = 4;

/// What feeds a channel.
///
/// The set is closed; every consumer (graph resolution, texture binding,
/// sampler declaration) matches on it exhaustively.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum InputKind {
    /// Unused slot, or an unrecognized type tag.
    #[default]
    None,
    Texture,
    Cubemap,
    Video,
    Camera,
    /// Output of another pass (or of the same pass, for feedback).
    Buffer,
    Keyboard,
    Microphone,
    Music,
    MusicStream,
}

impl InputKind {
    /// Parses a `"ctype"` tag. Matching is exact and case-sensitive.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "texture" => Self::Texture,
            "cubemap" => Self::Cubemap,
            "video" => Self::Video,
            "webcam" => Self::Camera,
            "buffer" => Self::Buffer,
            "keyboard" => Self::Keyboard,
            "microphone" => Self::Microphone,
            "music" => Self::Music,
            "musicstream" => Self::MusicStream,
            _ => Self::None,
        }
    }

    /// The `"ctype"` tag written back to JSON, `None` for [`InputKind::None`].
    pub fn tag(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Texture => Some("texture"),
            Self::Cubemap => Some("cubemap"),
            Self::Video => Some("video"),
            Self::Camera => Some("webcam"),
            Self::Buffer => Some("buffer"),
            Self::Keyboard => Some("keyboard"),
            Self::Microphone => Some("microphone"),
            Self::Music => Some("music"),
            Self::MusicStream => Some("musicstream"),
        }
    }
}

/// Texture minification/magnification mode of a channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
    /// Linear filtering across a generated mip chain.
    Mipmap,
}

impl FilterMode {
    /// Unknown or missing names read as `Nearest`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "linear" => Self::Linear,
            "mipmap" => Self::Mipmap,
            _ => Self::Nearest,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Linear => "linear",
            Self::Mipmap => "mipmap",
        }
    }
}

/// Texture addressing mode of a channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WrapMode {
    #[default]
    Clamp,
    Repeat,
}

impl WrapMode {
    /// Anything but `"repeat"` reads as `Clamp`.
    pub fn from_name(name: &str) -> Self {
        if name == "repeat" {
            Self::Repeat
        } else {
            Self::Clamp
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Clamp => "clamp",
            Self::Repeat => "repeat",
        }
    }
}

/// A single channel binding of a render pass.
///
/// Keeps the JSON object it was read from next to the typed fields; every
/// setter updates both so the document can be written back unchanged apart
/// from the edit.
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderInput {
    json: Map<String, Value>,
    channel: usize,
    id: i64,
    kind: InputKind,
    source: String,
    filter: FilterMode,
    wrap: WrapMode,
    vflip: bool,
}

impl ShaderInput {
    /// An unused slot for `channel`.
    pub fn empty(channel: usize) -> Self {
        Self {
            json: Map::new(),
            channel,
            id: -1,
            kind: InputKind::None,
            source: String::new(),
            filter: FilterMode::default(),
            wrap: WrapMode::default(),
            vflip: false,
        }
    }

    /// Reads an input from its JSON object.
    ///
    /// `fallback_channel` is used when the object carries no `"channel"`.
    pub fn from_json(json: Map<String, Value>, fallback_channel: usize) -> Self {
        let channel = json
            .get("channel")
            .and_then(Value::as_u64)
            .map(|c| c as usize)
            .unwrap_or(fallback_channel);
        let id = json.get("id").map(read_id).unwrap_or(-1);
        let type_name = json.get("ctype").and_then(Value::as_str).unwrap_or("");
        let kind = InputKind::from_tag(type_name);
        if kind == InputKind::None && !type_name.is_empty() {
            log::warn!("unknown input type '{type_name}' on channel {channel}, treated as none");
        }
        let source = json
            .get("src")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let sampler = json.get("sampler").and_then(Value::as_object);
        let sampler_str = |key: &str| {
            sampler
                .and_then(|s| s.get(key))
                .and_then(Value::as_str)
                .unwrap_or("")
        };
        let filter = FilterMode::from_name(sampler_str("filter"));
        let wrap = WrapMode::from_name(sampler_str("wrap"));
        let vflip = match sampler.and_then(|s| s.get("vflip")) {
            Some(Value::String(s)) => s == "true",
            Some(Value::Bool(b)) => *b,
            _ => false,
        };

        Self {
            json,
            channel,
            id,
            kind,
            source,
            filter,
            wrap,
            vflip,
        }
    }

    /// The JSON object backing this input.
    pub fn json(&self) -> &Map<String, Value> {
        &self.json
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Integer id; for buffer inputs this is the output id of the source pass.
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }

    /// Asset path for texture/video/cubemap inputs.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn filter(&self) -> FilterMode {
        self.filter
    }

    pub fn wrap(&self) -> WrapMode {
        self.wrap
    }

    pub fn vflip(&self) -> bool {
        self.vflip
    }

    pub fn is_valid(&self) -> bool {
        self.kind != InputKind::None
    }

    pub fn has_filter_setting(&self) -> bool {
        matches!(
            self.kind,
            InputKind::Texture | InputKind::Video | InputKind::Cubemap | InputKind::Buffer
        )
    }

    pub fn has_wrap_setting(&self) -> bool {
        matches!(self.kind, InputKind::Texture | InputKind::Video)
    }

    pub fn has_vflip_setting(&self) -> bool {
        matches!(
            self.kind,
            InputKind::Texture | InputKind::Video | InputKind::Cubemap
        )
    }

    pub fn set_channel(&mut self, channel: usize) {
        self.channel = channel;
        self.json.insert("channel".into(), Value::from(channel as u64));
    }

    pub fn set_id(&mut self, id: i64) {
        self.id = id;
        self.json.insert("id".into(), Value::from(id));
    }

    /// Setting [`InputKind::None`] leaves the stored tag untouched.
    pub fn set_kind(&mut self, kind: InputKind) {
        let Some(tag) = kind.tag() else {
            return;
        };
        self.kind = kind;
        self.json.insert("ctype".into(), Value::from(tag));
    }

    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
        self.json
            .insert("src".into(), Value::from(self.source.clone()));
    }

    pub fn set_filter(&mut self, filter: FilterMode) {
        self.filter = filter;
        self.sampler_mut()
            .insert("filter".into(), Value::from(filter.name()));
    }

    pub fn set_wrap(&mut self, wrap: WrapMode) {
        self.wrap = wrap;
        self.sampler_mut()
            .insert("wrap".into(), Value::from(wrap.name()));
    }

    /// Stored as the string `"true"`/`"false"`, matching the wire format.
    pub fn set_vflip(&mut self, vflip: bool) {
        self.vflip = vflip;
        self.sampler_mut().insert(
            "vflip".into(),
            Value::from(if vflip { "true" } else { "false" }),
        );
    }

    fn sampler_mut(&mut self) -> &mut Map<String, Value> {
        let entry = self
            .json
            .entry("sampler")
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        match entry {
            Value::Object(map) => map,
            _ => unreachable!("sampler entry was just made an object"),
        }
    }
}

impl fmt::Display for ShaderInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, src={}, chan={}, id={}, wrap={}, filter={}, vflip={}",
            self.kind.tag().unwrap_or("none"),
            self.source,
            self.channel,
            self.id,
            self.wrap.name(),
            self.filter.name(),
            if self.vflip { "yes" } else { "no" }
        )
    }
}

/// Reads an integer id that may be stored as a number or a numeric string.
pub(crate) fn read_id(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().unwrap_or(-1),
        Value::String(s) => s.trim().parse().unwrap_or(-1),
        _ => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn parses_sampler_strings() {
        let input = ShaderInput::from_json(
            object(json!({
                "channel": 2, "id": 17, "src": "/media/a/noise.png", "ctype": "texture",
                "sampler": { "filter": "mipmap", "wrap": "repeat", "vflip": "true" }
            })),
            0,
        );

        assert_eq!(input.channel(), 2);
        assert_eq!(input.id(), 17);
        assert_eq!(input.kind(), InputKind::Texture);
        assert_eq!(input.filter(), FilterMode::Mipmap);
        assert_eq!(input.wrap(), WrapMode::Repeat);
        assert!(input.vflip());
    }

    #[test]
    fn webcam_tag_is_camera() {
        assert_eq!(InputKind::from_tag("webcam"), InputKind::Camera);
        assert_eq!(InputKind::Camera.tag(), Some("webcam"));
    }

    #[test]
    fn tags_are_case_sensitive() {
        assert_eq!(InputKind::from_tag("Texture"), InputKind::None);
        assert_eq!(InputKind::from_tag("BUFFER"), InputKind::None);
        assert_eq!(InputKind::from_tag(""), InputKind::None);
    }

    #[test]
    fn missing_sampler_uses_defaults() {
        let input = ShaderInput::from_json(object(json!({ "ctype": "buffer", "id": 257 })), 3);
        assert_eq!(input.channel(), 3);
        assert_eq!(input.filter(), FilterMode::Nearest);
        assert_eq!(input.wrap(), WrapMode::Clamp);
        assert!(!input.vflip());
    }

    #[test]
    fn setters_write_back_to_json() {
        let mut input = ShaderInput::empty(1);
        input.set_kind(InputKind::Cubemap);
        input.set_source("/media/a/cube.png");
        input.set_vflip(true);
        input.set_filter(FilterMode::Linear);
        input.set_wrap(WrapMode::Repeat);

        let json = Value::Object(input.json().clone());
        assert_eq!(json["ctype"], "cubemap");
        assert_eq!(json["src"], "/media/a/cube.png");
        assert_eq!(json["sampler"]["vflip"], "true");
        assert_eq!(json["sampler"]["filter"], "linear");
        assert_eq!(json["sampler"]["wrap"], "repeat");

        let reread = ShaderInput::from_json(input.json().clone(), 0);
        assert_eq!(reread.kind(), InputKind::Cubemap);
        assert!(reread.vflip());
    }

    #[test]
    fn setting_none_kind_keeps_tag() {
        let mut input = ShaderInput::from_json(object(json!({ "ctype": "keyboard" })), 0);
        input.set_kind(InputKind::None);
        assert_eq!(input.kind(), InputKind::Keyboard);
    }

    #[test]
    fn setting_capabilities() {
        let mut input = ShaderInput::empty(0);
        input.set_kind(InputKind::Buffer);
        assert!(input.has_filter_setting());
        assert!(!input.has_wrap_setting());
        assert!(!input.has_vflip_setting());

        input.set_kind(InputKind::Video);
        assert!(input.has_filter_setting() && input.has_wrap_setting() && input.has_vflip_setting());
    }

    #[test]
    fn numeric_string_ids_are_read() {
        assert_eq!(read_id(&json!("257")), 257);
        assert_eq!(read_id(&json!("XsXGRn")), -1);
        assert_eq!(read_id(&json!(null)), -1);
    }
}
