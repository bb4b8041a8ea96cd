use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a node inside one snapshot (upstream form, e.g. `"12:34"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Upstream ids are short, printable and never contain path separators.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 256
            && self
                .0
                .chars()
                .all(|ch| !ch.is_control() && ch != '/' && ch != '\\')
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Closed set of node kinds. Anything the upstream adds later lands in `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Document,
    Canvas,
    Frame,
    Group,
    Section,
    Component,
    ComponentSet,
    Instance,
    Text,
    Vector,
    BooleanOperation,
    Rectangle,
    Ellipse,
    Line,
    Star,
    RegularPolygon,
    Slice,
    #[serde(other)]
    Unknown,
}

impl NodeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Document => "DOCUMENT",
            Self::Canvas => "CANVAS",
            Self::Frame => "FRAME",
            Self::Group => "GROUP",
            Self::Section => "SECTION",
            Self::Component => "COMPONENT",
            Self::ComponentSet => "COMPONENT_SET",
            Self::Instance => "INSTANCE",
            Self::Text => "TEXT",
            Self::Vector => "VECTOR",
            Self::BooleanOperation => "BOOLEAN_OPERATION",
            Self::Rectangle => "RECTANGLE",
            Self::Ellipse => "ELLIPSE",
            Self::Line => "LINE",
            Self::Star => "STAR",
            Self::RegularPolygon => "REGULAR_POLYGON",
            Self::Slice => "SLICE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Kinds that may own children upstream.
    #[must_use]
    pub const fn is_container(self) -> bool {
        matches!(
            self,
            Self::Document
                | Self::Canvas
                | Self::Frame
                | Self::Group
                | Self::Section
                | Self::Component
                | Self::ComponentSet
                | Self::Instance
                | Self::BooleanOperation
                | Self::Unknown
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    #[serde(default = "default_alpha")]
    pub a: f32,
}

fn default_alpha() -> f32 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaintKind {
    Solid,
    GradientLinear,
    GradientRadial,
    Image,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Paint {
    #[serde(rename = "type")]
    pub kind: PaintKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TextContent {
    pub characters: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LayoutMode {
    None,
    Horizontal,
    Vertical,
}

/// Typed attribute slots of a node. Every slot is optional; empty slots are omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NodeAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextContent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fills: Vec<Paint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corner_radius: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_mode: Option<LayoutMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
}

impl NodeAttributes {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Characters of text carried by this node (0 for non-text nodes).
    #[must_use]
    pub fn text_len(&self) -> usize {
        self.text
            .as_ref()
            .map_or(0, |text| text.characters.chars().count())
    }
}

/// A node of the design tree with its ordered children.
///
/// `Clone` and `Drop` walk the subtree with a heap stack, so arbitrarily deep trees are safe to
/// copy and free. Serialization still recurses; bound the depth with [`DesignNode::height`]
/// before serializing untrusted trees.
#[derive(Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DesignNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(flatten)]
    pub attributes: NodeAttributes,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DesignNode>,
}

impl DesignNode {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: NodeId(id.into()),
            kind,
            attributes: NodeAttributes::default(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: NodeAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<DesignNode>) -> Self {
        self.children = children;
        self
    }

    /// The node without its children.
    #[must_use]
    pub fn payload(&self) -> NodePayload {
        NodePayload {
            id: self.id.clone(),
            kind: self.kind,
            attributes: self.attributes.clone(),
        }
    }

    /// Copy of this subtree cut `levels` below this node (0 keeps only this node).
    #[must_use]
    pub fn pruned(&self, levels: usize) -> DesignNode {
        let mut stack: Vec<(&DesignNode, Vec<DesignNode>)> =
            vec![(self, Vec::with_capacity(self.children.len()))];
        loop {
            let top = stack.len() - 1;
            let (source, copied) = (stack[top].0, stack[top].1.len());
            if top < levels {
                if let Some(child) = source.children.get(copied) {
                    stack.push((child, Vec::with_capacity(child.children.len())));
                    continue;
                }
            }

            let (source, children) = stack.swap_remove(top);
            let node = DesignNode {
                id: source.id.clone(),
                kind: source.kind,
                attributes: source.attributes.clone(),
                children,
            };
            match stack.last_mut() {
                Some((_, siblings)) => siblings.push(node),
                None => return node,
            }
        }
    }

    /// Levels below this node on the longest path (0 for a leaf), measured without recursion.
    #[must_use]
    pub fn height(&self) -> usize {
        let mut height = 0usize;
        let mut stack: Vec<(&DesignNode, usize)> = vec![(self, 0)];
        while let Some((node, depth)) = stack.pop() {
            height = height.max(depth);
            stack.extend(node.children.iter().map(|child| (child, depth + 1)));
        }
        height
    }

    /// Number of nodes in this subtree, counted without recursion.
    #[must_use]
    pub fn subtree_len(&self) -> usize {
        let mut count = 0usize;
        let mut stack: Vec<&DesignNode> = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }
}

impl Clone for DesignNode {
    fn clone(&self) -> Self {
        self.pruned(usize::MAX)
    }
}

impl Drop for DesignNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// A node with its `children` field stripped. This is what streams and chunks carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NodePayload {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(flatten)]
    pub attributes: NodeAttributes,
}

/// One immutable fetch of a design tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Snapshot {
    pub tree_id: String,
    pub root: DesignNode,
    pub fetched_at_unix_ms: u64,
}

impl Snapshot {
    pub fn new(tree_id: impl Into<String>, root: DesignNode, fetched_at_unix_ms: u64) -> Self {
        Self {
            tree_id: tree_id.into(),
            root,
            fetched_at_unix_ms,
        }
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.root.subtree_len()
    }
}
