//! View templates: the shared, per-template half of the data model.
//!
//! A [`ViewTemplate`] is a cheap handle shared by every view instance of the
//! template. The immutable parts (name, kind, slot counts, the template and
//! view-query functions) live directly in the handle. Everything the first
//! creation pass discovers lives in a lock-protected [`TemplateData`] block:
//! nodes, matched directive definitions, hook lists, query descriptors and
//! bookkeeping lists. After the first pass the block is only read.
//!
//! The lock is never held while user code runs; callers copy what they need
//! out of the guard first.

use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::directive::DirectiveDef;
use crate::error::ViewResult;
use crate::hooks::HookEntry;
use crate::i18n::{I18nBlock, IcuExpression};
use crate::node::TemplateNode;
use crate::query::TemplateQueries;
use crate::runtime::Runtime;
use crate::schema::ElementSchema;

bitflags::bitflags! {
    /// Which pass a template or query function is asked to perform.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct RenderFlags: u8 {
        /// Create nodes and declare queries.
        const CREATE = 0b01;
        /// Update bindings and refresh queries.
        const UPDATE = 0b10;
    }
}

/// Kind of template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    /// Top-level template rendered into a host node.
    Root,
    /// Template of a component, rendered inside its host element.
    Component,
    /// Nested template instantiated into view containers.
    Embedded,
}

/// Template function: issues instructions for one pass.
pub type TemplateFn = Arc<dyn Fn(&mut Runtime, RenderFlags) -> ViewResult<()> + Send + Sync>;

/// View query function: declares (create) or refreshes (update) view queries.
pub type ViewQueryFn = Arc<dyn Fn(&mut Runtime, RenderFlags) -> ViewResult<()> + Send + Sync>;

/// Content of one template slot.
#[derive(Debug, Clone)]
pub enum TemplateSlot {
    /// Declared but not yet created, or unused.
    Empty,
    /// A node.
    Node(TemplateNode),
    /// Binding slot.
    Binding,
    /// Directive definition matched to a node.
    Directive(Arc<DirectiveDef>),
    /// Host binding slot of a directive.
    HostVar,
    /// Translated content block.
    I18n(Arc<I18nBlock>),
    /// ICU expression.
    Icu(Arc<IcuExpression>),
}

/// Host binding function registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostBindingEntry {
    /// Host element slot.
    pub element: usize,
    /// First host binding slot of the directive.
    pub binding_root: usize,
    /// Directive slot.
    pub directive: usize,
}

/// First-pass data of a template.
#[derive(Debug)]
pub struct TemplateData {
    /// Slot layout: nodes, bindings, then directives and host bindings.
    pub slots: Vec<TemplateSlot>,
    /// First node of the template.
    pub first_child: Option<usize>,
    /// Set until the first creation pass has completed.
    pub first_create_pass: bool,
    /// Set until the first update pass has completed.
    pub first_update_pass: bool,
    /// Node of the declaring template this nested template belongs to.
    pub declaration_node: Option<usize>,
    /// Directives available for matching.
    pub registry: Vec<Arc<DirectiveDef>>,
    /// Element schema.
    pub schema: ElementSchema,
    pub pre_order_hooks: Vec<HookEntry>,
    pub pre_order_check_hooks: Vec<HookEntry>,
    pub content_hooks: Vec<HookEntry>,
    pub content_check_hooks: Vec<HookEntry>,
    pub view_hooks: Vec<HookEntry>,
    pub view_check_hooks: Vec<HookEntry>,
    pub destroy_hooks: Vec<HookEntry>,
    /// Query descriptors, including those inherited by nested templates.
    pub queries: Option<TemplateQueries>,
    /// `(first query index, directive slot)` for each directive declaring
    /// content queries.
    pub content_queries: Vec<(usize, usize)>,
    /// Some view query is static.
    pub static_view_queries: bool,
    /// Some content query is static.
    pub static_content_queries: bool,
    /// Component host node indices.
    pub components: Vec<usize>,
    /// Container node indices.
    pub containers: Vec<usize>,
    /// Host binding functions to run on refresh.
    pub host_bindings: Vec<HostBindingEntry>,
    /// Translated nodes created at the root of the template.
    pub i18n_roots: Vec<usize>,
}

impl TemplateData {
    fn new(decls: usize, vars: usize) -> Self {
        let mut slots = vec![TemplateSlot::Empty; decls];
        slots.extend(std::iter::repeat_n(TemplateSlot::Binding, vars));
        Self {
            slots,
            first_child: None,
            first_create_pass: true,
            first_update_pass: true,
            declaration_node: None,
            registry: Vec::new(),
            schema: ElementSchema::default(),
            pre_order_hooks: Vec::new(),
            pre_order_check_hooks: Vec::new(),
            content_hooks: Vec::new(),
            content_check_hooks: Vec::new(),
            view_hooks: Vec::new(),
            view_check_hooks: Vec::new(),
            destroy_hooks: Vec::new(),
            queries: None,
            content_queries: Vec::new(),
            static_view_queries: false,
            static_content_queries: false,
            components: Vec::new(),
            containers: Vec::new(),
            host_bindings: Vec::new(),
            i18n_roots: Vec::new(),
        }
    }

    /// Node at `index`.
    pub fn node(&self, index: usize) -> Option<&TemplateNode> {
        match self.slots.get(index) {
            Some(TemplateSlot::Node(node)) => Some(node),
            _ => None,
        }
    }

    /// Mutable node at `index`.
    pub fn node_mut(&mut self, index: usize) -> Option<&mut TemplateNode> {
        match self.slots.get_mut(index) {
            Some(TemplateSlot::Node(node)) => Some(node),
            _ => None,
        }
    }

    /// Directive definition at `slot`.
    pub fn directive(&self, slot: usize) -> Option<&Arc<DirectiveDef>> {
        match self.slots.get(slot) {
            Some(TemplateSlot::Directive(def)) => Some(def),
            _ => None,
        }
    }

    /// Append slots at the end of the layout and return the first index.
    pub(crate) fn alloc_expando(&mut self, slot: TemplateSlot, count: usize) -> usize {
        let start = self.slots.len();
        self.slots
            .extend(std::iter::repeat_n(slot, count));
        start
    }
}

struct TemplateInner {
    name: String,
    kind: TemplateKind,
    decls: usize,
    vars: usize,
    template_fn: Option<TemplateFn>,
    view_query: Option<ViewQueryFn>,
    data: RwLock<TemplateData>,
}

/// Shared handle to a template. Cloning is cheap.
#[derive(Clone)]
pub struct ViewTemplate {
    inner: Arc<TemplateInner>,
}

impl fmt::Debug for ViewTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewTemplate")
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .field("decls", &self.inner.decls)
            .field("vars", &self.inner.vars)
            .finish_non_exhaustive()
    }
}

impl ViewTemplate {
    /// Start building a template.
    pub fn builder(name: impl Into<String>, kind: TemplateKind) -> ViewTemplateBuilder {
        ViewTemplateBuilder {
            name: name.into(),
            kind,
            decls: 0,
            vars: 0,
            template_fn: None,
            view_query: None,
            registry: Vec::new(),
            schema: ElementSchema::default(),
        }
    }

    /// Template name, used in diagnostics.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Template kind.
    pub fn kind(&self) -> TemplateKind {
        self.inner.kind
    }

    /// Number of declared node slots.
    pub fn decls(&self) -> usize {
        self.inner.decls
    }

    /// Number of binding slots.
    pub fn vars(&self) -> usize {
        self.inner.vars
    }

    /// First binding slot.
    pub fn binding_start(&self) -> usize {
        self.inner.decls
    }

    /// Template function.
    pub fn template_fn(&self) -> Option<TemplateFn> {
        self.inner.template_fn.clone()
    }

    /// View query function.
    pub fn view_query_fn(&self) -> Option<ViewQueryFn> {
        self.inner.view_query.clone()
    }

    /// Read the first-pass data.
    pub fn read(&self) -> RwLockReadGuard<'_, TemplateData> {
        self.inner.data.read()
    }

    /// Write the first-pass data.
    pub fn write(&self) -> RwLockWriteGuard<'_, TemplateData> {
        self.inner.data.write()
    }

    /// Whether the first creation pass is still pending.
    pub fn first_create_pass(&self) -> bool {
        self.inner.data.read().first_create_pass
    }

    /// Copy of the node at `index`.
    pub fn node(&self, index: usize) -> Option<TemplateNode> {
        self.inner.data.read().node(index).cloned()
    }

    /// Whether both handles refer to the same template.
    pub fn ptr_eq(&self, other: &ViewTemplate) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Builder for [`ViewTemplate`].
pub struct ViewTemplateBuilder {
    name: String,
    kind: TemplateKind,
    decls: usize,
    vars: usize,
    template_fn: Option<TemplateFn>,
    view_query: Option<ViewQueryFn>,
    registry: Vec<Arc<DirectiveDef>>,
    schema: ElementSchema,
}

impl ViewTemplateBuilder {
    /// Number of node slots the template declares.
    pub fn decls(mut self, decls: usize) -> Self {
        self.decls = decls;
        self
    }

    /// Number of binding slots the template uses.
    pub fn vars(mut self, vars: usize) -> Self {
        self.vars = vars;
        self
    }

    /// Template function.
    pub fn template(
        mut self,
        f: impl Fn(&mut Runtime, RenderFlags) -> ViewResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.template_fn = Some(Arc::new(f));
        self
    }

    /// View query function.
    pub fn view_query(
        mut self,
        f: impl Fn(&mut Runtime, RenderFlags) -> ViewResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.view_query = Some(Arc::new(f));
        self
    }

    /// Directive available for matching. Nested templates inherit the
    /// registry of their declaring template when they have none.
    pub fn directive(mut self, def: Arc<DirectiveDef>) -> Self {
        self.registry.push(def);
        self
    }

    /// Element schema for validation.
    pub fn schema(mut self, schema: ElementSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Finish the template.
    pub fn build(self) -> ViewTemplate {
        let mut data = TemplateData::new(self.decls, self.vars);
        data.registry = self.registry;
        data.schema = self.schema;
        ViewTemplate {
            inner: Arc::new(TemplateInner {
                name: self.name,
                kind: self.kind,
                decls: self.decls,
                vars: self.vars,
                template_fn: self.template_fn,
                view_query: self.view_query,
                data: RwLock::new(data),
            }),
        }
    }
}

static_assertions::assert_impl_all!(ViewTemplate: Send, Sync, Clone);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blueprint_layout() {
        let tpl = ViewTemplate::builder("Layout", TemplateKind::Root)
            .decls(2)
            .vars(3)
            .build();
        let data = tpl.read();
        assert_eq!(data.slots.len(), 5);
        assert!(matches!(data.slots[1], TemplateSlot::Empty));
        assert!(matches!(data.slots[2], TemplateSlot::Binding));
        assert!(data.first_create_pass);
        assert_eq!(tpl.binding_start(), 2);
    }

    #[test]
    fn test_alloc_expando() {
        let tpl = ViewTemplate::builder("Expando", TemplateKind::Root)
            .decls(1)
            .build();
        let start = tpl.write().alloc_expando(TemplateSlot::HostVar, 2);
        assert_eq!(start, 1);
        assert_eq!(tpl.read().slots.len(), 3);
    }

    #[test]
    fn test_handles_share_data() {
        let tpl = ViewTemplate::builder("Shared", TemplateKind::Embedded).build();
        let other = tpl.clone();
        tpl.write().first_create_pass = false;
        assert!(!other.first_create_pass());
        assert!(tpl.ptr_eq(&other));
    }
}
