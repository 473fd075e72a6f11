//! Renderer abstraction.
//!
//! The runtime never touches a concrete node tree. Every node is created,
//! attached and mutated through a [`Renderer`], and is referred to by an
//! opaque [`NodeHandle`].
//!
//! [`MemoryRenderer`] keeps an in-memory tree. It is used by the test suite
//! and by headless consumers that only need the structure.

use std::collections::HashMap;
use std::fmt::Write as FmtWrite;
use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{Key, KeyData, SlotMap};

use crate::binding::BindingValue;

slotmap::new_key_type! {
    /// Opaque handle to a node owned by a [`Renderer`].
    pub struct NodeHandle;
}

impl NodeHandle {
    /// Returns the raw handle value, for renderers that keep their own tables.
    pub fn as_raw(&self) -> u64 {
        self.data().as_ffi()
    }

    /// Creates a handle from a raw value produced by [`as_raw`](Self::as_raw).
    pub fn from_raw(raw: u64) -> Self {
        KeyData::from_ffi(raw).into()
    }
}

/// Element namespaces the runtime can switch into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Scalable vector graphics.
    Svg,
    /// Mathematical markup.
    MathMl,
}

impl Namespace {
    /// Namespace URI passed to the renderer.
    pub fn uri(self) -> &'static str {
        match self {
            Self::Svg => "http://www.w3.org/2000/svg",
            Self::MathMl => "http://www.w3.org/1998/Math/MathML",
        }
    }
}

/// Node creation and mutation backend.
///
/// All methods take `&self`; implementations use interior mutability so that
/// a renderer can be shared between runtimes.
pub trait Renderer: Send + Sync {
    /// Create an element, optionally in a namespace.
    fn create_element(&self, name: &str, namespace: Option<Namespace>) -> NodeHandle;

    /// Create a comment node. Comments anchor containers.
    fn create_comment(&self, value: &str) -> NodeHandle;

    /// Create a text node.
    fn create_text(&self, value: &str) -> NodeHandle;

    /// Set an attribute.
    fn set_attribute(&self, node: NodeHandle, name: &str, value: &str, namespace: Option<&str>);

    /// Remove an attribute.
    fn remove_attribute(&self, node: NodeHandle, name: &str, namespace: Option<&str>);

    /// Set a property.
    fn set_property(&self, node: NodeHandle, name: &str, value: &BindingValue);

    /// Replace the content of a text or comment node.
    fn set_value(&self, node: NodeHandle, value: &str);

    /// Insert `node` into `parent` before `anchor`, or at the end when there is
    /// no anchor. `is_move` is set when the node is already attached elsewhere.
    fn insert_before(
        &self,
        parent: NodeHandle,
        node: NodeHandle,
        anchor: Option<NodeHandle>,
        is_move: bool,
    );

    /// Append `node` as the last child of `parent`.
    fn append_child(&self, parent: NodeHandle, node: NodeHandle) {
        self.insert_before(parent, node, None, false);
    }

    /// Detach `node` from its parent. `parent` is a hint and may be `None`.
    fn remove_child(&self, parent: Option<NodeHandle>, node: NodeHandle);

    /// The current parent of `node`.
    fn parent_node(&self, node: NodeHandle) -> Option<NodeHandle>;
}

/// Kind of a node kept by the [`MemoryRenderer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryNodeKind {
    /// Element with its tag name and namespace.
    Element {
        name: String,
        namespace: Option<Namespace>,
    },
    /// Text node.
    Text,
    /// Comment node.
    Comment,
}

#[derive(Debug)]
struct MemoryNode {
    kind: MemoryNodeKind,
    value: String,
    attributes: Vec<(String, String)>,
    properties: HashMap<String, BindingValue>,
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
}

impl MemoryNode {
    fn new(kind: MemoryNodeKind, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
            attributes: Vec::new(),
            properties: HashMap::new(),
            parent: None,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryTree {
    nodes: SlotMap<NodeHandle, MemoryNode>,
}

impl MemoryTree {
    fn detach(&mut self, node: NodeHandle) {
        let Some(parent) = self.nodes.get_mut(node).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(parent) {
            parent.children.retain(|&child| child != node);
        }
    }
}

/// In-memory [`Renderer`].
///
/// Cloning yields another handle to the same tree.
#[derive(Debug, Clone, Default)]
pub struct MemoryRenderer {
    tree: Arc<Mutex<MemoryTree>>,
}

impl MemoryRenderer {
    /// Create an empty renderer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.tree.lock().nodes.len()
    }

    /// Kind of the node.
    pub fn kind(&self, node: NodeHandle) -> Option<MemoryNodeKind> {
        self.tree.lock().nodes.get(node).map(|n| n.kind.clone())
    }

    /// Tag name of an element.
    pub fn tag_name(&self, node: NodeHandle) -> Option<String> {
        match self.kind(node)? {
            MemoryNodeKind::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Value of a text or comment node.
    pub fn value(&self, node: NodeHandle) -> Option<String> {
        self.tree.lock().nodes.get(node).map(|n| n.value.clone())
    }

    /// Children of a node, in order.
    pub fn children(&self, node: NodeHandle) -> Vec<NodeHandle> {
        self.tree
            .lock()
            .nodes
            .get(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Attribute value of an element.
    pub fn attribute(&self, node: NodeHandle, name: &str) -> Option<String> {
        let tree = self.tree.lock();
        let node = tree.nodes.get(node)?;
        node.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    /// Property value of an element.
    pub fn property(&self, node: NodeHandle, name: &str) -> Option<BindingValue> {
        self.tree
            .lock()
            .nodes
            .get(node)
            .and_then(|n| n.properties.get(name).cloned())
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, node: NodeHandle) -> String {
        let tree = self.tree.lock();
        let mut out = String::new();
        collect_text(&tree, node, &mut out);
        out
    }

    /// Serialize a subtree as markup. Comments are written as `<!--value-->`.
    pub fn serialize(&self, node: NodeHandle) -> String {
        let tree = self.tree.lock();
        let mut out = String::new();
        serialize_into(&tree, node, &mut out);
        out
    }
}

fn collect_text(tree: &MemoryTree, node: NodeHandle, out: &mut String) {
    let Some(n) = tree.nodes.get(node) else {
        return;
    };
    if n.kind == MemoryNodeKind::Text {
        out.push_str(&n.value);
    }
    for &child in &n.children {
        collect_text(tree, child, out);
    }
}

fn serialize_into(tree: &MemoryTree, node: NodeHandle, out: &mut String) {
    let Some(n) = tree.nodes.get(node) else {
        return;
    };
    match &n.kind {
        MemoryNodeKind::Text => out.push_str(&n.value),
        MemoryNodeKind::Comment => {
            let _ = write!(out, "<!--{}-->", n.value);
        }
        MemoryNodeKind::Element { name, .. } => {
            out.push('<');
            out.push_str(name);
            for (attr, value) in &n.attributes {
                let _ = write!(out, " {attr}=\"{value}\"");
            }
            out.push('>');
            for &child in &n.children {
                serialize_into(tree, child, out);
            }
            let _ = write!(out, "</{name}>");
        }
    }
}

impl Renderer for MemoryRenderer {
    fn create_element(&self, name: &str, namespace: Option<Namespace>) -> NodeHandle {
        let kind = MemoryNodeKind::Element {
            name: name.to_string(),
            namespace,
        };
        self.tree.lock().nodes.insert(MemoryNode::new(kind, ""))
    }

    fn create_comment(&self, value: &str) -> NodeHandle {
        self.tree
            .lock()
            .nodes
            .insert(MemoryNode::new(MemoryNodeKind::Comment, value))
    }

    fn create_text(&self, value: &str) -> NodeHandle {
        self.tree
            .lock()
            .nodes
            .insert(MemoryNode::new(MemoryNodeKind::Text, value))
    }

    fn set_attribute(&self, node: NodeHandle, name: &str, value: &str, _namespace: Option<&str>) {
        let mut tree = self.tree.lock();
        let Some(node) = tree.nodes.get_mut(node) else {
            return;
        };
        match node.attributes.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => node.attributes.push((name.to_string(), value.to_string())),
        }
    }

    fn remove_attribute(&self, node: NodeHandle, name: &str, _namespace: Option<&str>) {
        if let Some(node) = self.tree.lock().nodes.get_mut(node) {
            node.attributes.retain(|(n, _)| n != name);
        }
    }

    fn set_property(&self, node: NodeHandle, name: &str, value: &BindingValue) {
        if let Some(node) = self.tree.lock().nodes.get_mut(node) {
            node.properties.insert(name.to_string(), value.clone());
        }
    }

    fn set_value(&self, node: NodeHandle, value: &str) {
        if let Some(node) = self.tree.lock().nodes.get_mut(node) {
            node.value = value.to_string();
        }
    }

    fn insert_before(
        &self,
        parent: NodeHandle,
        node: NodeHandle,
        anchor: Option<NodeHandle>,
        _is_move: bool,
    ) {
        let mut tree = self.tree.lock();
        if !tree.nodes.contains_key(parent) || !tree.nodes.contains_key(node) {
            return;
        }
        tree.detach(node);
        if let Some(n) = tree.nodes.get_mut(node) {
            n.parent = Some(parent);
        }
        if let Some(p) = tree.nodes.get_mut(parent) {
            let position = anchor
                .and_then(|a| p.children.iter().position(|&c| c == a))
                .unwrap_or(p.children.len());
            p.children.insert(position, node);
        }
    }

    fn remove_child(&self, _parent: Option<NodeHandle>, node: NodeHandle) {
        self.tree.lock().detach(node);
    }

    fn parent_node(&self, node: NodeHandle) -> Option<NodeHandle> {
        self.tree.lock().nodes.get(node).and_then(|n| n.parent)
    }
}

static_assertions::assert_impl_all!(MemoryRenderer: Send, Sync, Renderer);
