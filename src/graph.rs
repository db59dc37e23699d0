//! Channel-to-source resolution for a document's passes.
//!
//! A [`PassGraph`] is rebuilt from scratch whenever the renderer rebuilds;
//! pass references are indices into the document's pass list, so nothing in
//! the graph can outlive a replaced pass.

use std::collections::HashSet;

use crate::document::{CHANNEL_COUNT, InputKind, PassKind, RenderPass, ShaderDocument};

/// Inputs that are produced by the host rather than fetched or rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VirtualInput {
    Keyboard,
    Camera,
    Microphone,
    Music,
    MusicStream,
}

/// What a channel samples from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ChannelBinding {
    /// Nothing; the shader sees zero.
    #[default]
    Unbound,
    /// External image data identified by its source id.
    Asset { source: String, cubemap: bool },
    /// Host-generated texture.
    Virtual(VirtualInput),
    /// Readable ring target of the pass at this index.
    Pass(usize),
}

impl ChannelBinding {
    /// Cubemap samplers are only declared for cubemap assets.
    pub fn is_cubemap(&self) -> bool {
        matches!(self, Self::Asset { cubemap: true, .. })
    }
}

/// Resolved bindings of one pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassNode {
    /// Index of the pass in the document.
    pub pass: usize,
    pub kind: PassKind,
    pub channels: [ChannelBinding; CHANNEL_COUNT],
}

/// Execution order and channel bindings of every pass in a document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassGraph {
    nodes: Vec<PassNode>,
    order: Vec<usize>,
    asset_requests: Vec<AssetRequest>,
}

/// An external source the graph needs pixels for.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AssetRequest {
    pub source: String,
    pub cubemap: bool,
}

impl PassGraph {
    /// Resolves every channel of every pass in `doc`.
    pub fn build(doc: &ShaderDocument) -> Self {
        let passes = doc.render_passes();
        let mut seen = HashSet::new();
        let mut asset_requests = Vec::new();

        let nodes = passes
            .iter()
            .enumerate()
            .map(|(index, pass)| {
                let channels = std::array::from_fn(|channel| {
                    let binding = resolve_channel(passes, pass, channel);
                    if let ChannelBinding::Asset { source, cubemap } = &binding {
                        let request = AssetRequest {
                            source: source.clone(),
                            cubemap: *cubemap,
                        };
                        if seen.insert(request.clone()) {
                            asset_requests.push(request);
                        }
                    }
                    binding
                });
                PassNode {
                    pass: index,
                    kind: pass.kind(),
                    channels,
                }
            })
            .collect();

        let graph = Self {
            nodes,
            order: doc.execution_order(),
            asset_requests,
        };
        log::debug!(
            "pass graph: {} passes, {} asset requests, order {:?}",
            graph.nodes.len(),
            graph.asset_requests.len(),
            graph.order
        );
        graph
    }

    /// Node of the pass at document index `pass`.
    pub fn node(&self, pass: usize) -> Option<&PassNode> {
        self.nodes.get(pass)
    }

    /// Nodes in document order.
    pub fn nodes(&self) -> &[PassNode] {
        &self.nodes
    }

    /// Document indices in execution order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Nodes in execution order, restricted to `kinds`.
    pub fn ordered<'a>(&'a self, kinds: &'a [PassKind]) -> impl Iterator<Item = &'a PassNode> + 'a {
        self.order
            .iter()
            .map(|&i| &self.nodes[i])
            .filter(move |node| kinds.contains(&node.kind))
    }

    /// Distinct external sources, in first-seen order.
    pub fn asset_requests(&self) -> &[AssetRequest] {
        &self.asset_requests
    }

    pub fn uses_virtual(&self, input: VirtualInput) -> bool {
        self.nodes
            .iter()
            .flat_map(|n| n.channels.iter())
            .any(|c| *c == ChannelBinding::Virtual(input))
    }

    /// First sound pass in execution order.
    pub fn sound_pass(&self) -> Option<usize> {
        self.ordered(&[PassKind::Sound]).next().map(|n| n.pass)
    }
}

fn resolve_channel(passes: &[RenderPass], pass: &RenderPass, channel: usize) -> ChannelBinding {
    let Some(input) = pass.input(channel) else {
        return ChannelBinding::Unbound;
    };
    match input.kind() {
        InputKind::None => ChannelBinding::Unbound,
        InputKind::Buffer => {
            let target = passes
                .iter()
                .position(|p| p.output_id() >= 0 && p.output_id() == input.id());
            match target {
                Some(index) => ChannelBinding::Pass(index),
                None => {
                    log::debug!(
                        "pass '{}' channel {channel}: no pass outputs id {}, left unbound",
                        pass.name(),
                        input.id()
                    );
                    ChannelBinding::Unbound
                }
            }
        }
        InputKind::Texture | InputKind::Video | InputKind::Cubemap => {
            if input.source().is_empty() {
                ChannelBinding::Unbound
            } else {
                ChannelBinding::Asset {
                    source: input.source().to_string(),
                    cubemap: input.kind() == InputKind::Cubemap,
                }
            }
        }
        InputKind::Keyboard => ChannelBinding::Virtual(VirtualInput::Keyboard),
        InputKind::Camera => ChannelBinding::Virtual(VirtualInput::Camera),
        InputKind::Microphone => ChannelBinding::Virtual(VirtualInput::Microphone),
        InputKind::Music => ChannelBinding::Virtual(VirtualInput::Music),
        InputKind::MusicStream => ChannelBinding::Virtual(VirtualInput::MusicStream),
    }
}
