//! Template nodes and their static attributes.
//!
//! A [`TemplateNode`] is the shared, per-template description of one node
//! slot. It is created during the first creation pass of its template and
//! then reused by every view instance of that template.

use crate::selector::CssSelector;
use crate::template::ViewTemplate;

/// What a template node renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Text node.
    Text,
    /// Regular element.
    Element,
    /// Anchor for a view container, usually carrying a nested template.
    Container,
    /// Grouping node that renders no element of its own.
    ElementContainer,
    /// Anchor for a translated ICU expression.
    Icu,
}

impl NodeKind {
    /// Element or element container: a boundary for capability lookup.
    pub fn is_element_like(self) -> bool {
        matches!(self, Self::Element | Self::ElementContainer)
    }
}

/// Section markers inside a node's static attribute list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeMarker {
    /// Followed by `namespace uri, name, value`.
    NamespaceUri,
    /// Followed by class names.
    Classes,
    /// Followed by style `name, value` pairs.
    Styles,
    /// Followed by names of bound attributes and properties.
    Bindings,
    /// Followed by names of attributes on an inline template.
    Template,
    /// Followed by the selector the node is projected as.
    ProjectAs,
    /// Followed by names of translated attributes.
    I18n,
}

impl AttributeMarker {
    /// Markers whose section lists names only, without values.
    pub fn is_name_only(self) -> bool {
        matches!(self, Self::Bindings | Self::Template | Self::I18n)
    }
}

/// One entry of a static attribute list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrToken {
    /// Section marker.
    Marker(AttributeMarker),
    /// Name or value.
    Str(String),
    /// Selector following [`AttributeMarker::ProjectAs`].
    Selector(CssSelector),
}

impl AttrToken {
    /// The string payload, if this is a string token.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The marker, if this is a marker token.
    pub fn as_marker(&self) -> Option<AttributeMarker> {
        match self {
            Self::Marker(m) => Some(*m),
            _ => None,
        }
    }
}

/// Static attributes of a node, in template order.
///
/// Plain `name, value` pairs come first, then marker-introduced sections:
///
/// ```ignore
/// let attrs = NodeAttrs::new()
///     .attr("type", "text")
///     .classes(["primary", "wide"])
///     .bindings(["value"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeAttrs {
    tokens: Vec<AttrToken>,
}

impl NodeAttrs {
    /// Create an empty attribute list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from raw tokens.
    pub fn from_tokens(tokens: Vec<AttrToken>) -> Self {
        Self { tokens }
    }

    /// All tokens.
    pub fn tokens(&self) -> &[AttrToken] {
        &self.tokens
    }

    /// Number of tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether there are no tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Token at `index`.
    pub fn get(&self, index: usize) -> Option<&AttrToken> {
        self.tokens.get(index)
    }

    /// Position of the first occurrence of `marker` at or after `from`.
    pub fn marker_index(&self, marker: AttributeMarker, from: usize) -> Option<usize> {
        self.tokens
            .iter()
            .skip(from)
            .position(|t| t.as_marker() == Some(marker))
            .map(|p| p + from)
    }

    /// Append a plain `name="value"` attribute.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tokens.push(AttrToken::Str(name.into()));
        self.tokens.push(AttrToken::Str(value.into()));
        self
    }

    /// Append a namespaced attribute.
    pub fn ns_attr(
        mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.tokens.push(AttrToken::Marker(AttributeMarker::NamespaceUri));
        self.tokens.push(AttrToken::Str(namespace.into()));
        self.tokens.push(AttrToken::Str(name.into()));
        self.tokens.push(AttrToken::Str(value.into()));
        self
    }

    fn section<I, S>(mut self, marker: AttributeMarker, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens.push(AttrToken::Marker(marker));
        self.tokens
            .extend(items.into_iter().map(|s| AttrToken::Str(s.into())));
        self
    }

    /// Append a class section.
    pub fn classes<I, S>(self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.section(AttributeMarker::Classes, classes)
    }

    /// Append a style section of `name, value` entries.
    pub fn styles<I, S>(self, styles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.section(AttributeMarker::Styles, styles)
    }

    /// Append a bindings section.
    pub fn bindings<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.section(AttributeMarker::Bindings, names)
    }

    /// Append an inline-template attribute section.
    pub fn template_attrs<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.section(AttributeMarker::Template, names)
    }

    /// Append a translated-attribute section.
    pub fn i18n<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.section(AttributeMarker::I18n, names)
    }

    /// Append the selector this node is projected as.
    pub fn project_as(mut self, selector: CssSelector) -> Self {
        self.tokens.push(AttrToken::Marker(AttributeMarker::ProjectAs));
        self.tokens.push(AttrToken::Selector(selector));
        self
    }

    /// Index of the first name-only marker, or the length when there is none.
    pub fn name_only_marker_index(&self) -> usize {
        self.tokens
            .iter()
            .position(|t| t.as_marker().is_some_and(AttributeMarker::is_name_only))
            .unwrap_or(self.tokens.len())
    }

    /// Visit attributes that are written to the rendered element: plain pairs,
    /// namespaced attributes and the class list. Stops at the first name-only
    /// section.
    pub(crate) fn for_each_static(&self, mut f: impl FnMut(Option<&str>, &str, &str)) {
        let mut classes: Vec<&str> = Vec::new();
        let mut i = 0;
        while i < self.tokens.len() {
            match &self.tokens[i] {
                AttrToken::Str(name) => {
                    let value = self.tokens.get(i + 1).and_then(AttrToken::as_str);
                    f(None, name, value.unwrap_or(""));
                    i += 2;
                }
                AttrToken::Marker(AttributeMarker::NamespaceUri) => {
                    let ns = self.tokens.get(i + 1).and_then(AttrToken::as_str);
                    let name = self.tokens.get(i + 2).and_then(AttrToken::as_str);
                    let value = self.tokens.get(i + 3).and_then(AttrToken::as_str);
                    if let (Some(name), Some(value)) = (name, value) {
                        f(ns, name, value);
                    }
                    i += 4;
                }
                AttrToken::Marker(AttributeMarker::Classes) => {
                    i += 1;
                    while let Some(class) = self.tokens.get(i).and_then(AttrToken::as_str) {
                        classes.push(class);
                        i += 1;
                    }
                }
                AttrToken::Marker(AttributeMarker::Styles) => {
                    i += 1;
                    while self.tokens.get(i).and_then(AttrToken::as_str).is_some() {
                        i += 1;
                    }
                }
                AttrToken::Marker(AttributeMarker::ProjectAs) => i += 2,
                AttrToken::Marker(_) | AttrToken::Selector(_) => break,
            }
        }
        if !classes.is_empty() {
            f(None, "class", &classes.join(" "));
        }
    }
}

/// Shared description of one node slot in a template.
#[derive(Debug, Clone)]
pub struct TemplateNode {
    /// Slot index in the view.
    pub index: usize,
    /// Node kind.
    pub kind: NodeKind,
    /// Tag name for elements, captured tag for containers, `None` otherwise.
    pub value: Option<String>,
    /// Static attributes.
    pub attrs: Option<NodeAttrs>,
    /// Parent node index within the same template.
    pub parent: Option<usize>,
    /// First child node index.
    pub child: Option<usize>,
    /// Next sibling node index.
    pub next: Option<usize>,
    /// First directive slot of this node.
    pub directive_start: usize,
    /// One past the last directive slot of this node.
    pub directive_end: usize,
    /// Offset of the component definition within the directive range.
    pub component_offset: Option<usize>,
    /// Local reference names. `None` refers to the node itself, `Some(slot)` to
    /// a directive instance.
    pub local_names: Vec<(String, Option<usize>)>,
    /// Nested template of a container node.
    pub embedded: Option<ViewTemplate>,
    /// Whether a directive on this node declares content queries.
    pub has_content_query: bool,
}

impl TemplateNode {
    /// Create a node with no links and no directives.
    pub fn new(index: usize, kind: NodeKind, value: Option<String>, attrs: Option<NodeAttrs>) -> Self {
        Self {
            index,
            kind,
            value,
            attrs,
            parent: None,
            child: None,
            next: None,
            directive_start: 0,
            directive_end: 0,
            component_offset: None,
            local_names: Vec::new(),
            embedded: None,
            has_content_query: false,
        }
    }

    /// Whether directives matched this node.
    pub fn is_directive_host(&self) -> bool {
        self.directive_end > self.directive_start
    }

    /// Whether a component matched this node.
    pub fn is_component_host(&self) -> bool {
        self.component_offset.is_some()
    }

    /// Slot of the component instance, if any.
    pub fn component_slot(&self) -> Option<usize> {
        self.component_offset.map(|offset| self.directive_start + offset)
    }

    /// A container whose captured tag is not the placeholder tag, created by
    /// structural-directive sugar on a regular element.
    pub fn is_inline_template(&self) -> bool {
        self.kind == NodeKind::Container && self.value.as_deref() != Some(NG_TEMPLATE_TAG)
    }

    /// Tag name used in error messages and schema checks.
    pub fn tag_name(&self) -> &str {
        match (self.kind, self.value.as_deref()) {
            (NodeKind::Container, None) => NG_TEMPLATE_TAG,
            (_, Some(tag)) => tag,
            (_, None) => "",
        }
    }
}

/// Tag a container node is matched against outside of projection.
pub const NG_TEMPLATE_TAG: &str = "ng-template";
