//! One shader stage of a document.

use serde_json::{Map, Value};

use super::input::{CHANNEL_COUNT, ShaderInput, read_id};

/// Stage kind of a render pass.
///
/// The declaration order is the execution order: every buffer pass runs
/// before every image pass, and sound passes come last.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PassKind {
    Buffer,
    #[default]
    Image,
    Sound,
}

impl PassKind {
    /// Parses a `"type"` tag. A missing or empty tag means image.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "buffer" => Some(Self::Buffer),
            "image" | "" => Some(Self::Image),
            "sound" => Some(Self::Sound),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::Buffer => "buffer",
            Self::Image => "image",
            Self::Sound => "sound",
        }
    }
}

/// A render pass: fragment source, stage kind, output id and four channels.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderPass {
    json: Map<String, Value>,
    kind: PassKind,
    name: String,
    output_id: i64,
    source: String,
    inputs: [ShaderInput; CHANNEL_COUNT],
}

impl RenderPass {
    /// A pass of `kind` with the given source and no inputs.
    pub fn new(kind: PassKind, name: impl Into<String>, source: impl Into<String>) -> Self {
        let name = name.into();
        let source = source.into();
        let mut json = Map::new();
        json.insert("type".into(), Value::from(kind.tag()));
        json.insert("name".into(), Value::from(name.clone()));
        json.insert("code".into(), Value::from(source.clone()));
        json.insert("inputs".into(), Value::Array(Vec::new()));
        json.insert("outputs".into(), Value::Array(Vec::new()));
        Self {
            json,
            name: if name.is_empty() {
                kind.tag().to_string()
            } else {
                name
            },
            kind,
            output_id: -1,
            source,
            inputs: std::array::from_fn(ShaderInput::empty),
        }
    }

    /// Reads a pass from its JSON object.
    ///
    /// Returns the unrecognized tag as the error when `"type"` is not one of
    /// buffer, image or sound. Inputs addressing a channel outside `0..4` are
    /// dropped.
    pub fn from_json(json: Map<String, Value>) -> Result<Self, String> {
        let type_name = json.get("type").and_then(Value::as_str).unwrap_or("");
        let kind = PassKind::from_tag(type_name).ok_or_else(|| type_name.to_string())?;

        let name = match json.get("name").and_then(Value::as_str) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => kind.tag().to_string(),
        };

        // Only the first output is used; multiple render targets are not supported.
        let output_id = json
            .get("outputs")
            .and_then(Value::as_array)
            .and_then(|outputs| outputs.first())
            .and_then(|first| first.get("id"))
            .map(read_id)
            .unwrap_or(-1);

        let source = json
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut inputs: [ShaderInput; CHANNEL_COUNT] = std::array::from_fn(ShaderInput::empty);
        if let Some(list) = json.get("inputs").and_then(Value::as_array) {
            for (position, value) in list.iter().enumerate() {
                let Some(object) = value.as_object() else {
                    log::warn!("pass '{name}': input {position} is not an object, skipped");
                    continue;
                };
                let input = ShaderInput::from_json(object.clone(), position);
                if input.channel() >= CHANNEL_COUNT {
                    log::warn!(
                        "pass '{name}': input for channel {} dropped, only {CHANNEL_COUNT} channels exist",
                        input.channel()
                    );
                    continue;
                }
                let channel = input.channel();
                inputs[channel] = input;
            }
        }

        Ok(Self {
            json,
            kind,
            name,
            output_id,
            source,
            inputs,
        })
    }

    /// The JSON object backing this pass.
    pub fn json(&self) -> &Map<String, Value> {
        &self.json
    }

    pub fn kind(&self) -> PassKind {
        self.kind
    }

    /// Display name; falls back to the type tag when the JSON name is empty.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id other passes use to reference this pass' output, `-1` if none.
    pub fn output_id(&self) -> i64 {
        self.output_id
    }

    pub fn fragment_source(&self) -> &str {
        &self.source
    }

    pub fn inputs(&self) -> &[ShaderInput; CHANNEL_COUNT] {
        &self.inputs
    }

    /// Input in `channel`; unused channels are [`InputKind::None`](super::InputKind::None).
    pub fn input(&self, channel: usize) -> Option<&ShaderInput> {
        self.inputs.get(channel)
    }

    pub fn set_fragment_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
        self.json
            .insert("code".into(), Value::from(self.source.clone()));
    }

    /// Sets the output id, writing a single-entry `"outputs"` array.
    pub fn set_output_id(&mut self, id: i64) {
        self.output_id = id;
        let mut output = Map::new();
        output.insert("id".into(), Value::from(id));
        output.insert("channel".into(), Value::from(0));
        self.json
            .insert("outputs".into(), Value::Array(vec![Value::Object(output)]));
    }

    /// Replaces the input in `channel`.
    ///
    /// Only channels that already have an entry in the JSON `"inputs"` array
    /// can be replaced; anything else is refused with a warning and `false`.
    pub fn set_input(&mut self, channel: usize, input: ShaderInput) -> bool {
        let position = self.json_input_position(channel);
        let (Some(position), true) = (position, channel < CHANNEL_COUNT) else {
            log::warn!(
                "pass '{}': set_input({channel}) out of range, ignored",
                self.name
            );
            return false;
        };

        let mut input = input;
        input.set_channel(channel);
        if let Some(Value::Array(list)) = self.json.get_mut("inputs") {
            list[position] = Value::Object(input.json().clone());
        }
        self.inputs[channel] = input;
        true
    }

    /// Index into the JSON `"inputs"` array of the entry addressing `channel`.
    fn json_input_position(&self, channel: usize) -> Option<usize> {
        let list = self.json.get("inputs")?.as_array()?;
        list.iter().enumerate().position(|(position, value)| {
            let declared = value
                .get("channel")
                .and_then(Value::as_u64)
                .map(|c| c as usize)
                .unwrap_or(position);
            declared == channel
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::input::InputKind;
    use serde_json::json;

    fn pass(value: Value) -> RenderPass {
        RenderPass::from_json(value.as_object().cloned().unwrap()).unwrap()
    }

    #[test]
    fn kind_order_is_buffer_image_sound() {
        assert!(PassKind::Buffer < PassKind::Image);
        assert!(PassKind::Image < PassKind::Sound);
    }

    #[test]
    fn missing_type_defaults_to_image() {
        let p = pass(json!({ "code": "void mainImage(out vec4 c, in vec2 f) {}" }));
        assert_eq!(p.kind(), PassKind::Image);
        assert_eq!(p.name(), "image");
        assert_eq!(p.output_id(), -1);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let json = json!({ "type": "cubemap" }).as_object().cloned().unwrap();
        assert_eq!(RenderPass::from_json(json).unwrap_err(), "cubemap");
    }

    #[test]
    fn reads_first_output_id() {
        let p = pass(json!({
            "type": "buffer", "name": "Buf A",
            "outputs": [{ "id": 257, "channel": 0 }, { "id": 300, "channel": 1 }]
        }));
        assert_eq!(p.output_id(), 257);
        assert_eq!(p.name(), "Buf A");
    }

    #[test]
    fn inputs_land_in_their_channel_and_excess_is_dropped() {
        let p = pass(json!({
            "type": "image",
            "inputs": [
                { "channel": 3, "ctype": "keyboard" },
                { "channel": 0, "ctype": "buffer", "id": 257 },
                { "channel": 7, "ctype": "texture", "src": "x.png" },
                { "channel": 5, "ctype": "texture", "src": "y.png" }
            ]
        }));
        assert_eq!(p.inputs()[0].kind(), InputKind::Buffer);
        assert_eq!(p.inputs()[1].kind(), InputKind::None);
        assert_eq!(p.inputs()[2].kind(), InputKind::None);
        assert_eq!(p.inputs()[3].kind(), InputKind::Keyboard);
    }

    #[test]
    fn set_input_refuses_undeclared_channel() {
        let mut p = pass(json!({
            "type": "image",
            "inputs": [{ "channel": 0, "ctype": "texture", "src": "a.png" }]
        }));
        let before = p.clone();

        let mut replacement = ShaderInput::empty(2);
        replacement.set_kind(InputKind::Keyboard);
        assert!(!p.set_input(2, replacement.clone()));
        assert!(!p.set_input(9, replacement));
        assert_eq!(p, before);
    }

    #[test]
    fn set_input_replaces_declared_channel() {
        let mut p = pass(json!({
            "type": "image",
            "inputs": [{ "channel": 0, "ctype": "texture", "src": "a.png" }]
        }));
        let mut replacement = ShaderInput::empty(5);
        replacement.set_kind(InputKind::Keyboard);

        assert!(p.set_input(0, replacement));
        assert_eq!(p.inputs()[0].kind(), InputKind::Keyboard);
        assert_eq!(p.inputs()[0].channel(), 0);
        assert_eq!(p.json()["inputs"][0]["ctype"], "keyboard");
        assert_eq!(p.json()["inputs"][0]["channel"], 0);
    }

    #[test]
    fn fragment_source_round_trips() {
        let mut p = RenderPass::new(PassKind::Image, "", "old");
        p.set_fragment_source("new source");
        assert_eq!(p.fragment_source(), "new source");
        assert_eq!(p.json()["code"], "new source");
        assert_eq!(p.name(), "image");
    }
}
