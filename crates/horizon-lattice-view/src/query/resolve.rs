//! Query results and the query instructions.

use std::sync::Arc;

use super::declaration::{MatchKind, QueryMatch, QueryMetadata, TemplateQueries, TemplateQuery};
use super::list::QueryList;
use super::live::{ViewQueries, ViewQuery};
use crate::directive::{same_instance, CapabilityToken, DirectiveInstance};
use crate::error::{ViewError, ViewResult};
use crate::logging::targets;
use crate::node::NodeKind;
use crate::renderer::NodeHandle;
use crate::runtime::Runtime;
use crate::template::ViewTemplate;
use crate::view::{ContainerLocation, ViewId};

/// Reference to a rendered node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementRef {
    /// View holding the node.
    pub view: ViewId,
    /// Node slot.
    pub node: usize,
    /// Rendered node, if the slot holds one.
    pub native: Option<NodeHandle>,
}

/// Reference to a nested template, from which embedded views are created.
#[derive(Debug, Clone)]
pub struct TemplateRef {
    /// View the template is declared in.
    pub declaration_view: ViewId,
    /// Container node of the declaration.
    pub node: usize,
    /// The nested template.
    pub template: ViewTemplate,
}

impl TemplateRef {
    /// Container the template's views belong to by declaration.
    pub fn declaration_container(&self) -> ContainerLocation {
        ContainerLocation::new(self.declaration_view, self.node)
    }
}

impl PartialEq for TemplateRef {
    fn eq(&self, other: &Self) -> bool {
        self.declaration_view == other.declaration_view && self.node == other.node
    }
}

impl Eq for TemplateRef {}

/// Reference to a view container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerRef {
    /// Location of the container.
    pub location: ContainerLocation,
}

/// One query result.
///
/// Equality is identity: the same node, the same template declaration, the
/// same container, or the same directive instance.
#[derive(Clone)]
pub enum QueryResult {
    Element(ElementRef),
    Template(TemplateRef),
    Container(ContainerRef),
    Instance(DirectiveInstance),
}

impl QueryResult {
    /// The directive instance, for instance results.
    pub fn instance(&self) -> Option<&DirectiveInstance> {
        match self {
            Self::Instance(instance) => Some(instance),
            _ => None,
        }
    }

    /// The element reference, for element results.
    pub fn element(&self) -> Option<&ElementRef> {
        match self {
            Self::Element(element) => Some(element),
            _ => None,
        }
    }

    /// The template reference, for template results.
    pub fn template(&self) -> Option<&TemplateRef> {
        match self {
            Self::Template(template) => Some(template),
            _ => None,
        }
    }
}

impl PartialEq for QueryResult {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Element(a), Self::Element(b)) => a == b,
            (Self::Template(a), Self::Template(b)) => a == b,
            (Self::Container(a), Self::Container(b)) => a == b,
            (Self::Instance(a), Self::Instance(b)) => same_instance(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Element(e) => f.debug_tuple("Element").field(e).finish(),
            Self::Template(t) => f.debug_tuple("Template").field(&t.node).finish(),
            Self::Container(c) => f.debug_tuple("Container").field(&c.location).finish(),
            Self::Instance(_) => f.write_str("Instance"),
        }
    }
}

impl Runtime {
    /// Declare a view query on the current template and bind it to the
    /// current view.
    ///
    /// Called from a view query function in the creation pass.
    pub fn view_query(&mut self, metadata: QueryMetadata) -> ViewResult<Arc<QueryList>> {
        let (view, template) = self.active_view()?;
        if template.first_create_pass() {
            let is_static = metadata.is_static();
            let mut data = template.write();
            data.queries
                .get_or_insert_with(TemplateQueries::new)
                .track(TemplateQuery::new(Arc::new(metadata.clone()), None));
            if is_static {
                data.static_view_queries = true;
            }
        }
        self.create_live_query(view, &metadata)
    }

    /// Declare a content query of the directive in slot `directive` on the
    /// current node and bind it to the current view.
    ///
    /// Called from a directive's content query function in the creation pass.
    pub fn content_query(&mut self, directive: usize, metadata: QueryMetadata) -> ViewResult<Arc<QueryList>> {
        let (view, template) = self.active_view()?;
        if template.first_create_pass() {
            let node = self.frames.current_node();
            let is_static = metadata.is_static();
            let mut data = template.write();
            let queries = data.queries.get_or_insert_with(TemplateQueries::new);
            queries.track(TemplateQuery::new(Arc::new(metadata.clone()), node));
            let query_index = queries.len() - 1;
            if data.content_queries.last().is_none_or(|(_, d)| *d != directive) {
                data.content_queries.push((query_index, directive));
            }
            if let Some(node) = node.and_then(|n| data.node_mut(n)) {
                node.has_content_query = true;
            }
            if is_static {
                data.static_content_queries = true;
            }
        }
        self.create_live_query(view, &metadata)
    }

    fn create_live_query(&mut self, view: ViewId, metadata: &QueryMetadata) -> ViewResult<Arc<QueryList>> {
        let list = Arc::new(QueryList::new(
            metadata
                .flags
                .contains(super::QueryFlags::EMIT_DISTINCT_CHANGES_ONLY),
        ));
        let instance = self.views.get_mut(view)?;
        instance.cleanup.push(list.clone());
        instance
            .queries
            .get_or_insert_with(ViewQueries::default)
            .push(ViewQuery::new(list.clone()));
        Ok(list)
    }

    /// The list of the query at the current query index.
    pub fn load_query(&self) -> ViewResult<Arc<QueryList>> {
        let (view, template) = self.active_view()?;
        let index = self.frames.current_query_index();
        self.views
            .get(view)?
            .queries
            .as_ref()
            .and_then(|q| q.get(index))
            .map(|q| q.list.clone())
            .ok_or_else(|| ViewError::query_not_found(index, template.name()))
    }

    /// Refresh the query at the current query index into `list` and advance
    /// the index.
    ///
    /// Returns `true` when the list was dirty and recomputed, or when a
    /// static query resolved during creation.
    pub fn query_refresh(&mut self, list: &QueryList) -> ViewResult<bool> {
        let (view, template) = self.active_view()?;
        let index = self.frames.current_query_index();
        self.frames.set_current_query_index(index + 1);

        let (is_static, has_matches, crosses_boundary) = {
            let data = template.read();
            let query = data
                .queries
                .as_ref()
                .and_then(|q| q.get(index))
                .ok_or_else(|| ViewError::query_not_found(index, template.name()))?;
            (
                query.metadata.is_static(),
                query.matches.is_some(),
                query.crosses_boundary,
            )
        };
        let creation = self.views.get(view)?.is_creation_mode();
        if !list.is_dirty() || creation != is_static {
            return Ok(false);
        }

        if !has_matches {
            list.reset(Vec::new());
        } else {
            let results = if crosses_boundary {
                let mut results = Vec::new();
                self.collect_query_results(view, index, &mut results)?;
                results
            } else {
                self.materialize_view_results(view, index)?
                    .into_iter()
                    .flatten()
                    .collect()
            };
            let changed = list.reset(results);
            tracing::debug!(
                target: targets::QUERY,
                template = template.name(),
                query = index,
                len = list.len(),
                changed,
                "query refreshed"
            );
            list.notify_on_changes();
        }
        Ok(true)
    }

    /// Append the results of query `query` of `view`, and of every view
    /// instantiated from nested templates it crosses, to `out`.
    ///
    /// Views of a nested template are visited in container order, then the
    /// views declared there but moved to another container. Matches that read
    /// nothing, such as an ICU placeholder, contribute no entry.
    pub fn collect_query_results(
        &mut self,
        view: ViewId,
        query: usize,
        out: &mut Vec<QueryResult>,
    ) -> ViewResult<()> {
        let template = self.views.get(view)?.template.clone();
        let Some(matches) = template
            .read()
            .queries
            .as_ref()
            .and_then(|q| q.get(query))
            .and_then(|q| q.matches.clone())
        else {
            return Ok(());
        };
        let results = self.materialize_view_results(view, query)?;

        for (entry, result) in matches.iter().zip(results) {
            match *entry {
                QueryMatch::Node { .. } => out.extend(result),
                QueryMatch::Boundary { node, child_query } => {
                    let location = ContainerLocation::new(view, node);
                    let container = self
                        .views
                        .get(view)?
                        .container(node)
                        .ok_or_else(|| ViewError::container_expected(node, template.name()))?;
                    let inserted = container.views.clone();
                    let moved = container.moved_views.clone();

                    for embedded in inserted {
                        if self.views.get(embedded)?.declaration_container == Some(location) {
                            self.collect_query_results(embedded, child_query, out)?;
                        }
                    }
                    for embedded in moved {
                        self.collect_query_results(embedded, child_query, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn materialize_view_results(&mut self, view: ViewId, query: usize) -> ViewResult<Vec<Option<QueryResult>>> {
        let instance = self.views.get(view)?;
        if let Some(matches) = instance
            .queries
            .as_ref()
            .and_then(|q| q.get(query))
            .and_then(|q| q.matches.clone())
        {
            return Ok(matches);
        }

        let template = instance.template.clone();
        let (metadata, matches) = {
            let data = template.read();
            let declared = data
                .queries
                .as_ref()
                .and_then(|q| q.get(query))
                .ok_or_else(|| ViewError::query_not_found(query, template.name()))?;
            (declared.metadata.clone(), declared.matches.clone().unwrap_or_default())
        };

        let mut results = Vec::with_capacity(matches.len());
        for entry in matches {
            results.push(match entry {
                QueryMatch::Boundary { .. } => None,
                QueryMatch::Node { node, kind } => self.create_result_for_node(view, &template, node, kind, &metadata)?,
            });
        }

        let instance = self.views.get_mut(view)?;
        if let Some(binding) = instance.queries.as_mut().and_then(|q| q.queries.get_mut(query)) {
            binding.matches = Some(results.clone());
        }
        Ok(results)
    }

    fn create_result_for_node(
        &self,
        view: ViewId,
        template: &ViewTemplate,
        node: usize,
        kind: MatchKind,
        metadata: &QueryMetadata,
    ) -> ViewResult<Option<QueryResult>> {
        let instance = self.views.get(view)?;
        let node_kind = template
            .read()
            .node(node)
            .map(|n| n.kind)
            .ok_or_else(|| ViewError::node_not_found(node, template.name()))?;

        match kind {
            MatchKind::ByNodeType => Ok(match node_kind {
                NodeKind::Element | NodeKind::ElementContainer | NodeKind::Text => {
                    Some(self.element_ref(view, node)?)
                }
                NodeKind::Container => Some(self.template_ref(view, node)?),
                NodeKind::Icu => None,
            }),
            MatchKind::SpecialToken => match metadata.special_token() {
                Some(CapabilityToken::NodeHandle) => Ok(Some(self.element_ref(view, node)?)),
                Some(CapabilityToken::TemplateHandle) => Ok(Some(self.template_ref(view, node)?)),
                Some(CapabilityToken::ContainerHandle) => {
                    if instance.container(node).is_none() {
                        return Err(ViewError::container_expected(node, template.name()));
                    }
                    Ok(Some(QueryResult::Container(ContainerRef {
                        location: ContainerLocation::new(view, node),
                    })))
                }
                Some(other) => Err(ViewError::unsupported_read_token(other.to_string())),
                None => Err(ViewError::unsupported_read_token("<none>")),
            },
            MatchKind::Capability(slot) => Ok(instance
                .slot(slot)
                .and_then(|s| s.directive())
                .cloned()
                .map(QueryResult::Instance)),
        }
    }

    pub(crate) fn element_ref(&self, view: ViewId, node: usize) -> ViewResult<QueryResult> {
        let native = self.views.get(view)?.slot(node).and_then(|s| s.native());
        Ok(QueryResult::Element(ElementRef { view, node, native }))
    }

    /// Reference to the nested template declared at `node` of `view`.
    pub fn template_ref(&self, view: ViewId, node: usize) -> ViewResult<QueryResult> {
        let template = self.views.get(view)?.template.clone();
        let embedded = template
            .read()
            .node(node)
            .and_then(|n| n.embedded.clone())
            .ok_or_else(|| ViewError::container_expected(node, template.name()))?;
        Ok(QueryResult::Template(TemplateRef {
            declaration_view: view,
            node,
            template: embedded,
        }))
    }
}
