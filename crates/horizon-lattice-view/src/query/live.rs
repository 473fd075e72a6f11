//! Per-view query bindings.

use std::sync::Arc;

use super::list::QueryList;
use super::resolve::QueryResult;
use crate::template::TemplateData;

/// A query bound to one view instance.
#[derive(Debug, Clone)]
pub struct ViewQuery {
    /// Published results, shared with inherited bindings.
    pub list: Arc<QueryList>,
    /// Results of this view's own matches, computed once per instance.
    /// Boundary entries hold `None`.
    pub(crate) matches: Option<Vec<Option<QueryResult>>>,
}

impl ViewQuery {
    /// Bind a new list.
    pub fn new(list: Arc<QueryList>) -> Self {
        Self { list, matches: None }
    }

    /// Binding for a view created from a nested template: same list, fresh
    /// results.
    pub fn inherit(&self) -> Self {
        Self::new(self.list.clone())
    }

    /// Mark the list dirty.
    pub fn set_dirty(&self) {
        self.list.set_dirty();
    }
}

/// The query bindings of one view instance.
#[derive(Debug, Clone, Default)]
pub struct ViewQueries {
    pub(crate) queries: Vec<ViewQuery>,
}

impl ViewQueries {
    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Whether there are no bindings.
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Binding at `index`.
    pub fn get(&self, index: usize) -> Option<&ViewQuery> {
        self.queries.get(index)
    }

    /// Append a binding.
    pub fn push(&mut self, query: ViewQuery) {
        self.queries.push(query);
    }

    /// Bindings for a view of the nested template described by `embedded`.
    ///
    /// Only queries propagated from this view are created here; they come
    /// first in the nested template's query list, before its own content
    /// queries.
    pub fn create_embedded_view(&self, embedded: &TemplateData) -> Option<ViewQueries> {
        let queries = embedded.queries.as_ref()?;
        let inherited = embedded
            .content_queries
            .first()
            .map_or(queries.len(), |(first, _)| *first);

        let mut result = Vec::with_capacity(inherited);
        for query in queries.iter().take(inherited) {
            let parent = query
                .index_in_declaration_view
                .and_then(|i| self.queries.get(i));
            if let Some(parent) = parent {
                result.push(parent.inherit());
            }
        }
        Some(ViewQueries { queries: result })
    }

    /// A view of `template` was inserted into a container.
    pub fn insert_view(&self, template: &TemplateData) {
        self.dirty_queries_with_matches(template);
    }

    /// A view of `template` was detached from a container.
    pub fn detach_view(&self, template: &TemplateData) {
        self.dirty_queries_with_matches(template);
    }

    fn dirty_queries_with_matches(&self, template: &TemplateData) {
        let Some(declared) = template.queries.as_ref() else {
            return;
        };
        for (binding, query) in self.queries.iter().zip(declared.iter()) {
            if query.matches.is_some() {
                binding.set_dirty();
            }
        }
    }
}
