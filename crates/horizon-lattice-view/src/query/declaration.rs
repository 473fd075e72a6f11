//! Query descriptors and first-pass matching.

use std::sync::Arc;

use crate::directive::{CapabilityLocator, CapabilityToken};
use crate::node::{NodeKind, TemplateNode};
use crate::template::TemplateData;

bitflags::bitflags! {
    /// Options of a query.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct QueryFlags: u8 {
        /// Match every descendant, not only direct children of the host.
        const DESCENDANTS                 = 1 << 0;
        /// Resolve once, during creation, instead of on every refresh.
        const IS_STATIC                   = 1 << 1;
        /// Notify subscribers only when the result list changed.
        const EMIT_DISTINCT_CHANGES_ONLY  = 1 << 2;
    }
}

/// What a query looks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPredicate {
    /// Local reference names, each also tried as a directive name.
    Names(Vec<String>),
    /// A single capability.
    Token(CapabilityToken),
}

impl QueryPredicate {
    /// Predicate on one or more local reference names.
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Names(names.into_iter().map(Into::into).collect())
    }
}

/// Static description of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMetadata {
    /// What to match.
    pub predicate: QueryPredicate,
    /// Query options.
    pub flags: QueryFlags,
    /// What to read from matched nodes instead of the default result.
    pub read: Option<CapabilityToken>,
}

impl QueryMetadata {
    /// Create metadata without a read option.
    pub fn new(predicate: QueryPredicate, flags: QueryFlags) -> Self {
        Self {
            predicate,
            flags,
            read: None,
        }
    }

    /// Read `token` from matched nodes.
    pub fn with_read(mut self, token: CapabilityToken) -> Self {
        self.read = Some(token);
        self
    }

    /// Whether the query resolves during creation only.
    pub fn is_static(&self) -> bool {
        self.flags.contains(QueryFlags::IS_STATIC)
    }

    /// Token to read for [`MatchKind::SpecialToken`] matches.
    pub(crate) fn special_token(&self) -> Option<&CapabilityToken> {
        self.read.as_ref().or(match &self.predicate {
            QueryPredicate::Token(token) => Some(token),
            QueryPredicate::Names(_) => None,
        })
    }
}

/// How the result of a node match is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    /// Element reference or template reference, depending on the node kind.
    ByNodeType,
    /// One of the built-in capability tokens.
    SpecialToken,
    /// The directive instance in this slot.
    Capability(usize),
}

/// One entry of a query's match list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryMatch {
    /// A matched node.
    Node { node: usize, kind: MatchKind },
    /// Results of views instantiated from the nested template at `node`,
    /// found through query `child_query` of that template.
    Boundary { node: usize, child_query: usize },
}

/// A query as seen by one template.
#[derive(Debug, Clone)]
pub struct TemplateQuery {
    /// Shared description.
    pub metadata: Arc<QueryMetadata>,
    /// Matches found in the first creation pass. `None` when nothing matched.
    pub matches: Option<Vec<QueryMatch>>,
    /// Index of the query this one was cloned from, in the declaring template.
    pub index_in_declaration_view: Option<usize>,
    /// Some match is a nested template boundary.
    pub crosses_boundary: bool,
    applies_to_next_node: bool,
    declaration_node: Option<usize>,
}

impl TemplateQuery {
    /// Create a query declared on `declaration_node` (content queries) or on
    /// the template itself (view queries).
    pub fn new(metadata: Arc<QueryMetadata>, declaration_node: Option<usize>) -> Self {
        Self {
            metadata,
            matches: None,
            index_in_declaration_view: None,
            crosses_boundary: false,
            applies_to_next_node: true,
            declaration_node,
        }
    }

    /// Node the query was declared on.
    pub fn declaration_node(&self) -> Option<usize> {
        self.declaration_node
    }

    /// Match a starting element or element container.
    pub fn element_start(
        &mut self,
        data: &TemplateData,
        node: &TemplateNode,
        locator: &dyn CapabilityLocator,
    ) {
        if self.is_applying_to_node(data, node) {
            self.match_node(data, node, locator);
        }
    }

    /// Stop applying to later nodes once the declaring node ends.
    pub fn element_end(&mut self, node: usize) {
        if self.declaration_node == Some(node) {
            self.applies_to_next_node = false;
        }
    }

    /// Match a container node.
    pub fn template(&mut self, data: &TemplateData, node: &TemplateNode, locator: &dyn CapabilityLocator) {
        self.element_start(data, node, locator);
    }

    /// Record a boundary at the nested template `node` and return the query
    /// its views should run.
    pub fn embedded_template(
        &mut self,
        data: &TemplateData,
        node: &TemplateNode,
        child_query: usize,
    ) -> Option<TemplateQuery> {
        if !self.is_applying_to_node(data, node) {
            return None;
        }
        self.crosses_boundary = true;
        self.add_match(QueryMatch::Boundary {
            node: node.index,
            child_query,
        });
        Some(TemplateQuery::new(self.metadata.clone(), None))
    }

    fn is_applying_to_node(&self, data: &TemplateData, node: &TemplateNode) -> bool {
        if !self.applies_to_next_node || self.metadata.flags.contains(QueryFlags::DESCENDANTS) {
            return self.applies_to_next_node;
        }
        // Direct children only: element containers are transparent, up to
        // the declaring node.
        let mut parent = node.parent;
        while let Some(index) = parent {
            match data.node(index) {
                Some(p) if p.kind == NodeKind::ElementContainer && Some(index) != self.declaration_node => {
                    parent = p.parent;
                }
                _ => break,
            }
        }
        self.declaration_node == parent
    }

    fn match_node(&mut self, data: &TemplateData, node: &TemplateNode, locator: &dyn CapabilityLocator) {
        let predicate = self.metadata.predicate.clone();
        match predicate {
            QueryPredicate::Names(names) => {
                for name in &names {
                    let local = node
                        .local_names
                        .iter()
                        .find(|(local, _)| local == name)
                        .map(|(_, slot)| match slot {
                            Some(slot) => MatchKind::Capability(*slot),
                            None => MatchKind::ByNodeType,
                        });
                    self.match_with_read_option(data, node, locator, local);
                    let located = locator
                        .locate(data, node, &CapabilityToken::named(name.as_str()))
                        .map(MatchKind::Capability);
                    self.match_with_read_option(data, node, locator, located);
                }
            }
            QueryPredicate::Token(CapabilityToken::TemplateHandle) => {
                if node.kind == NodeKind::Container {
                    self.match_with_read_option(data, node, locator, Some(MatchKind::ByNodeType));
                }
            }
            QueryPredicate::Token(CapabilityToken::NodeHandle) => {
                if node.kind.is_element_like() || node.kind == NodeKind::Text {
                    self.match_with_read_option(data, node, locator, Some(MatchKind::ByNodeType));
                }
            }
            QueryPredicate::Token(CapabilityToken::ContainerHandle) => {
                if node.kind == NodeKind::Container {
                    self.match_with_read_option(data, node, locator, Some(MatchKind::SpecialToken));
                }
            }
            QueryPredicate::Token(token @ CapabilityToken::Named(_)) => {
                let located = locator.locate(data, node, &token).map(MatchKind::Capability);
                self.match_with_read_option(data, node, locator, located);
            }
        }
    }

    fn match_with_read_option(
        &mut self,
        data: &TemplateData,
        node: &TemplateNode,
        locator: &dyn CapabilityLocator,
        kind: Option<MatchKind>,
    ) {
        let Some(kind) = kind else {
            return;
        };
        let kind = match &self.metadata.read {
            None => Some(kind),
            Some(CapabilityToken::NodeHandle | CapabilityToken::ContainerHandle) => Some(MatchKind::SpecialToken),
            Some(CapabilityToken::TemplateHandle) if node.kind == NodeKind::Container => {
                Some(MatchKind::SpecialToken)
            }
            Some(read) => locator.locate(data, node, read).map(MatchKind::Capability),
        };
        if let Some(kind) = kind {
            self.add_match(QueryMatch::Node {
                node: node.index,
                kind,
            });
        }
    }

    fn add_match(&mut self, entry: QueryMatch) {
        self.matches.get_or_insert_with(Vec::new).push(entry);
    }
}

/// The queries of one template, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct TemplateQueries {
    queries: Vec<TemplateQuery>,
}

impl TemplateQueries {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queries.
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Whether there are no queries.
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Query at `index`.
    pub fn get(&self, index: usize) -> Option<&TemplateQuery> {
        self.queries.get(index)
    }

    /// Iterate over the queries.
    pub fn iter(&self) -> impl Iterator<Item = &TemplateQuery> {
        self.queries.iter()
    }

    /// Append a query.
    pub fn track(&mut self, query: TemplateQuery) {
        self.queries.push(query);
    }

    /// Run [`TemplateQuery::element_start`] on every query.
    pub fn element_start(&mut self, data: &TemplateData, node: &TemplateNode, locator: &dyn CapabilityLocator) {
        for query in &mut self.queries {
            query.element_start(data, node, locator);
        }
    }

    /// Run [`TemplateQuery::element_end`] on every query.
    pub fn element_end(&mut self, node: usize) {
        for query in &mut self.queries {
            query.element_end(node);
        }
    }

    /// Run [`TemplateQuery::template`] on every query.
    pub fn template(&mut self, data: &TemplateData, node: &TemplateNode, locator: &dyn CapabilityLocator) {
        for query in &mut self.queries {
            query.template(data, node, locator);
        }
    }

    /// Build the queries inherited by the nested template at `node`.
    pub fn embedded_template(&mut self, data: &TemplateData, node: &TemplateNode) -> Option<TemplateQueries> {
        let mut inherited = Vec::new();
        for (i, query) in self.queries.iter_mut().enumerate() {
            if let Some(mut clone) = query.embedded_template(data, node, inherited.len()) {
                clone.index_in_declaration_view = Some(i);
                inherited.push(clone);
            }
        }
        (!inherited.is_empty()).then_some(TemplateQueries { queries: inherited })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::{Directive, DirectiveDef, DirectiveLocator};
    use crate::template::{TemplateKind, TemplateSlot, ViewTemplate};

    struct Noop;
    impl Directive for Noop {}

    fn element(index: usize, parent: Option<usize>) -> TemplateNode {
        let mut node = TemplateNode::new(index, NodeKind::Element, Some("div".into()), None);
        node.parent = parent;
        node
    }

    fn data_with(nodes: Vec<TemplateNode>) -> ViewTemplate {
        let tpl = ViewTemplate::builder("Queries", TemplateKind::Root)
            .decls(nodes.len())
            .build();
        {
            let mut data = tpl.write();
            for node in nodes {
                let index = node.index;
                data.slots[index] = TemplateSlot::Node(node);
            }
        }
        tpl
    }

    fn names(name: &str, flags: QueryFlags) -> Arc<QueryMetadata> {
        Arc::new(QueryMetadata::new(QueryPredicate::names([name]), flags))
    }

    #[test]
    fn test_local_name_match() {
        let mut node = element(0, None);
        node.local_names.push(("target".into(), None));
        let tpl = data_with(vec![node.clone()]);
        let data = tpl.read();

        let mut query = TemplateQuery::new(names("target", QueryFlags::DESCENDANTS), None);
        query.element_start(&data, &node, &DirectiveLocator);
        assert_eq!(
            query.matches,
            Some(vec![QueryMatch::Node { node: 0, kind: MatchKind::ByNodeType }])
        );
    }

    #[test]
    fn test_direct_children_only() {
        let host = element(0, None);
        let child = element(1, Some(0));
        let mut container = TemplateNode::new(2, NodeKind::ElementContainer, None, None);
        container.parent = Some(0);
        let nested = element(3, Some(2));
        let deep = element(4, Some(1));
        let tpl = data_with(vec![host, child.clone(), container, nested.clone(), deep.clone()]);
        let data = tpl.read();

        let metadata = Arc::new(QueryMetadata::new(
            QueryPredicate::Token(CapabilityToken::NodeHandle),
            QueryFlags::empty(),
        ));
        let mut query = TemplateQuery::new(metadata, Some(0));
        query.element_start(&data, &child, &DirectiveLocator);
        query.element_start(&data, &nested, &DirectiveLocator);
        query.element_start(&data, &deep, &DirectiveLocator);
        let matched: Vec<usize> = query
            .matches
            .iter()
            .flatten()
            .map(|m| match m {
                QueryMatch::Node { node, .. } => *node,
                QueryMatch::Boundary { node, .. } => *node,
            })
            .collect();
        assert_eq!(matched, vec![1, 3]);
    }

    #[test]
    fn test_stops_after_declaration_node_ends() {
        let host = element(0, None);
        let sibling = element(1, None);
        let tpl = data_with(vec![host, sibling.clone()]);
        let data = tpl.read();
        let metadata = Arc::new(QueryMetadata::new(
            QueryPredicate::Token(CapabilityToken::NodeHandle),
            QueryFlags::DESCENDANTS,
        ));
        let mut query = TemplateQuery::new(metadata, Some(0));
        query.element_end(0);
        query.element_start(&data, &sibling, &DirectiveLocator);
        assert!(query.matches.is_none());
    }

    #[test]
    fn test_named_predicate_uses_locator_and_read() {
        let mut node = element(0, None);
        node.directive_start = 1;
        node.directive_end = 2;
        let tpl = data_with(vec![node.clone()]);
        tpl.write()
            .slots
            .push(TemplateSlot::Directive(DirectiveDef::builder("Item", || Arc::new(Noop)).build()));
        let data = tpl.read();

        let metadata = Arc::new(QueryMetadata::new(
            QueryPredicate::Token(CapabilityToken::named("Item")),
            QueryFlags::DESCENDANTS,
        ));
        let mut query = TemplateQuery::new(metadata.clone(), None);
        query.element_start(&data, &node, &DirectiveLocator);
        assert_eq!(
            query.matches,
            Some(vec![QueryMatch::Node { node: 0, kind: MatchKind::Capability(1) }])
        );

        let read = Arc::new((*metadata).clone().with_read(CapabilityToken::NodeHandle));
        let mut query = TemplateQuery::new(read, None);
        query.element_start(&data, &node, &DirectiveLocator);
        assert_eq!(
            query.matches,
            Some(vec![QueryMatch::Node { node: 0, kind: MatchKind::SpecialToken }])
        );
    }

    #[test]
    fn test_embedded_template_adds_boundary() {
        let container = TemplateNode::new(0, NodeKind::Container, None, None);
        let tpl = data_with(vec![container.clone()]);
        let data = tpl.read();

        let mut queries = TemplateQueries::new();
        queries.track(TemplateQuery::new(names("x", QueryFlags::DESCENDANTS), None));
        queries.track(TemplateQuery::new(names("y", QueryFlags::DESCENDANTS), None));
        let inherited = queries.embedded_template(&data, &container).unwrap();

        assert_eq!(inherited.len(), 2);
        assert_eq!(inherited.get(1).unwrap().index_in_declaration_view, Some(1));
        let outer = queries.get(1).unwrap();
        assert!(outer.crosses_boundary);
        assert_eq!(
            outer.matches,
            Some(vec![QueryMatch::Boundary { node: 0, child_query: 1 }])
        );
    }
}
