//! The runtime: owner of every view and driver of their lifecycle.
//!
//! A [`Runtime`] holds the view arena, the frame stack, the context index,
//! the i18n change mask and the renderer. There are no globals: two runtimes
//! never share state.
//!
//! # Refresh order
//!
//! [`Runtime::refresh_view`] processes a view in a fixed order:
//!
//! 1. the template update function, which runs pre-order hooks node by node
//!    as it advances,
//! 2. the remaining pre-order hooks,
//! 3. embedded views of the view's containers,
//! 4. content queries, then content hooks,
//! 5. host bindings,
//! 6. child component views,
//! 7. view queries, then view hooks.
//!
//! No hook runs during the check-no-changes pass.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use horizon_lattice_view::{MemoryRenderer, Runtime, TemplateKind, ViewTemplate};
//!
//! let renderer = Arc::new(MemoryRenderer::new());
//! let mut rt = Runtime::new(renderer.clone());
//! let template = ViewTemplate::builder("App", TemplateKind::Root)
//!     .decls(1)
//!     .template(|rt, flags| {
//!         if flags.contains(RenderFlags::CREATE) {
//!             rt.text(0, "hello")?;
//!         }
//!         Ok(())
//!     })
//!     .build();
//! let root = rt.create_root_view(&template, Some(renderer.create_element("app", None)), None)?;
//! rt.detect_changes(root)?;
//! ```

use std::fmt;
use std::sync::Arc;

use crate::config::RuntimeConfig;
use crate::context::ContextIndex;
use crate::directive::{CapabilityLocator, CapabilityToken, DirectiveInstance, DirectiveLocator};
use crate::error::{ViewError, ViewResult};
use crate::hooks::{HookBoundary, HookEntry, HookList};
use crate::i18n::I18nState;
use crate::logging::targets;
use crate::node::NodeKind;
use crate::query::{ContainerRef, QueryResult, TemplateRef};
use crate::renderer::{NodeHandle, Renderer};
use crate::state::FrameStack;
use crate::template::{RenderFlags, TemplateFn, TemplateKind, ViewQueryFn, ViewTemplate};
use crate::view::{
    ContainerLocation, InitPhase, Slot, ViewArena, ViewContext, ViewFlags, ViewId, ViewInstance,
    ViewParent,
};

/// Identifier of a reactive consumer registered by the embedding framework.
///
/// The runtime only stores it; hooks always run with no active consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerId(pub u64);

/// View runtime.
pub struct Runtime {
    pub(crate) views: ViewArena,
    pub(crate) frames: FrameStack,
    pub(crate) renderer: Arc<dyn Renderer>,
    pub(crate) config: RuntimeConfig,
    pub(crate) contexts: ContextIndex,
    pub(crate) i18n: I18nState,
    pub(crate) locator: Arc<dyn CapabilityLocator>,
    active_consumer: Option<ConsumerId>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("views", &self.views.len())
            .field("depth", &self.frames.depth())
            .field("contexts", &self.contexts.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self::with_config(renderer, RuntimeConfig::default())
    }

    /// Create a runtime with `config`.
    pub fn with_config(renderer: Arc<dyn Renderer>, config: RuntimeConfig) -> Self {
        Self {
            views: ViewArena::new(),
            frames: FrameStack::new(),
            renderer,
            config,
            contexts: ContextIndex::new(),
            i18n: I18nState::default(),
            locator: Arc::new(DirectiveLocator),
            active_consumer: None,
        }
    }

    /// Replace the capability locator used by queries and
    /// [`resolve_capability`](Self::resolve_capability).
    pub fn set_locator(&mut self, locator: Arc<dyn CapabilityLocator>) {
        self.locator = locator;
    }

    /// Configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Renderer.
    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.renderer
    }

    /// View arena.
    pub fn views(&self) -> &ViewArena {
        &self.views
    }

    /// Look up a view.
    pub fn view(&self, view: ViewId) -> ViewResult<&ViewInstance> {
        self.views.get(view)
    }

    /// Frame stack.
    pub fn frames(&self) -> &FrameStack {
        &self.frames
    }

    /// Context-discovery index.
    pub fn contexts(&self) -> &ContextIndex {
        &self.contexts
    }

    /// Active reactive consumer.
    pub fn active_consumer(&self) -> Option<ConsumerId> {
        self.active_consumer
    }

    /// Set the active reactive consumer, returning the previous one.
    pub fn set_active_consumer(&mut self, consumer: Option<ConsumerId>) -> Option<ConsumerId> {
        std::mem::replace(&mut self.active_consumer, consumer)
    }

    /// View and template of the current frame.
    pub(crate) fn active_view(&self) -> ViewResult<(ViewId, ViewTemplate)> {
        match (self.frames.view(), self.frames.template()) {
            (Some(view), Some(template)) => Ok((view, template.clone())),
            _ => Err(ViewError::NoActiveView),
        }
    }

    /// View being processed.
    pub fn current_view(&self) -> Option<ViewId> {
        self.frames.view()
    }

    /// Context object of the current context view.
    pub fn context(&self) -> Option<ViewContext> {
        let view = self.frames.context_view()?;
        self.views.get(view).ok()?.context.clone()
    }

    /// Move the context view `level` declaration views up and return its
    /// context object.
    pub fn next_context(&mut self, level: usize) -> Option<ViewContext> {
        let view = self.frames.next_context(&self.views, level)?;
        self.views.get(view).ok()?.context.clone()
    }

    /// Make `view` the context view again, typically from a listener.
    pub fn restore_view(&mut self, view: ViewId) {
        self.frames.set_context_view(view);
    }

    /// Component instance rendered by a component view.
    pub fn component_instance(&self, view: ViewId) -> ViewResult<Option<DirectiveInstance>> {
        let instance = self.views.get(view)?;
        if instance.template.kind() != TemplateKind::Component {
            return Ok(None);
        }
        match (instance.declaration_view, instance.declaration_node) {
            (Some(host_view), Some(host_node)) => self.component_at_node(host_view, host_node),
            _ => Ok(None),
        }
    }

    pub(crate) fn enter_view(&mut self, view: ViewId, template: &ViewTemplate) {
        self.frames.enter(view, template);
    }

    pub(crate) fn leave_view(&mut self) {
        self.frames.leave();
        if self.frames.depth() == 0 {
            self.i18n.reset();
            self.frames.set_last_node_created(true);
        }
    }

    /// Create a root view of `template` rendered into `host` and run its
    /// creation pass.
    pub fn create_root_view(
        &mut self,
        template: &ViewTemplate,
        host: Option<NodeHandle>,
        context: Option<ViewContext>,
    ) -> ViewResult<ViewId> {
        let mut instance = ViewInstance::new(template.clone(), context);
        instance.host = host;
        let view = self.views.insert(instance);
        tracing::debug!(target: targets::VIEW, template = template.name(), ?view, "root view created");
        self.render_view(view)?;
        Ok(view)
    }

    /// Run the creation pass of `view`.
    #[tracing::instrument(skip(self), target = "horizon_lattice_view::view", level = "trace")]
    pub fn render_view(&mut self, view: ViewId) -> ViewResult<()> {
        let template = self.views.get(view)?.template.clone();
        self.enter_view(view, &template);
        let result = self.render_view_in_frame(view, &template);
        if let Ok(instance) = self.views.get_mut(view) {
            instance.flags.remove(ViewFlags::CREATION_MODE);
        }
        self.leave_view();
        result
    }

    fn render_view_in_frame(&mut self, view: ViewId, template: &ViewTemplate) -> ViewResult<()> {
        if let Some(view_query) = template.view_query_fn() {
            self.execute_view_query(&view_query, RenderFlags::CREATE)?;
        }
        if let Some(template_fn) = template.template_fn() {
            self.execute_template(view, &template_fn, RenderFlags::CREATE)?;
        }
        if template.first_create_pass() {
            template.write().first_create_pass = false;
        }

        let (static_content, static_view, components) = {
            let data = template.read();
            (
                data.static_content_queries,
                data.static_view_queries,
                data.components.clone(),
            )
        };
        if static_content {
            self.refresh_content_queries(view, template)?;
        }
        if static_view {
            if let Some(view_query) = template.view_query_fn() {
                self.execute_view_query(&view_query, RenderFlags::UPDATE)?;
            }
        }
        for host in components {
            if let Some(child) = self.component_view_at(view, host)? {
                self.render_view(child)?;
            }
        }
        Ok(())
    }

    /// Run the update pass of `view` and of every attached descendant.
    #[tracing::instrument(skip(self), target = "horizon_lattice_view::view", level = "trace")]
    pub fn refresh_view(&mut self, view: ViewId) -> ViewResult<()> {
        let instance = self.views.get(view)?;
        if instance.flags.contains(ViewFlags::DESTROYED) {
            return Ok(());
        }
        let template = instance.template.clone();
        self.enter_view(view, &template);
        let result = self.refresh_view_in_frame(view, &template);
        self.leave_view();
        result
    }

    fn refresh_view_in_frame(&mut self, view: ViewId, template: &ViewTemplate) -> ViewResult<()> {
        let check_no_changes = self.frames.is_check_no_changes();
        if !check_no_changes {
            self.reset_pre_order_progress(view)?;
        }
        // Read once: hooks run below may complete the init phase through a
        // nested refresh of this view.
        let hooks_completed = self.views.get(view)?.init_phase == InitPhase::Completed;

        if let Some(template_fn) = template.template_fn() {
            self.execute_template(view, &template_fn, RenderFlags::UPDATE)?;
        }

        if !check_no_changes {
            if hooks_completed {
                self.execute_check_hooks(view, HookList::PreOrderCheck, HookBoundary::Remaining)?;
            } else {
                self.execute_init_and_check_hooks(
                    view,
                    HookList::PreOrder,
                    InitPhase::PreOrderPending,
                    HookBoundary::Remaining,
                )?;
                self.increment_init_phase(view, InitPhase::PreOrderPending)?;
            }
        }

        self.refresh_embedded_views(view, template)?;

        let has_content_queries = !template.read().content_queries.is_empty();
        if has_content_queries {
            self.refresh_content_queries(view, template)?;
        }

        if !check_no_changes {
            if hooks_completed {
                self.execute_check_hooks(view, HookList::ContentCheck, HookBoundary::All)?;
            } else {
                self.execute_init_and_check_hooks(
                    view,
                    HookList::Content,
                    InitPhase::PostOrderPending,
                    HookBoundary::All,
                )?;
            }
        }

        self.process_host_bindings(view, template)?;

        let components = template.read().components.clone();
        for host in components {
            self.refresh_component(view, host)?;
        }

        if let Some(view_query) = template.view_query_fn() {
            self.execute_view_query(&view_query, RenderFlags::UPDATE)?;
        }

        if !check_no_changes {
            if hooks_completed {
                self.execute_check_hooks(view, HookList::ViewCheck, HookBoundary::All)?;
            } else {
                self.execute_init_and_check_hooks(
                    view,
                    HookList::View,
                    InitPhase::PostOrderPending,
                    HookBoundary::All,
                )?;
                self.increment_init_phase(view, InitPhase::PostOrderPending)?;
            }

            if template.read().first_update_pass {
                template.write().first_update_pass = false;
            }
            self.views.get_mut(view)?.flags.remove(ViewFlags::FIRST_PASS);
        }
        Ok(())
    }

    /// Refresh `view`, then in dev mode verify that a second pass changes
    /// no binding.
    pub fn detect_changes(&mut self, view: ViewId) -> ViewResult<()> {
        self.refresh_view(view)?;
        if self.config.dev_mode {
            self.check_no_changes(view)?;
        }
        Ok(())
    }

    /// Run an update pass that fails with
    /// [`ViewError::ExpressionChanged`] if any binding changed.
    pub fn check_no_changes(&mut self, view: ViewId) -> ViewResult<()> {
        self.frames.set_check_no_changes(true);
        let result = self.refresh_view(view);
        self.frames.set_check_no_changes(false);
        result
    }

    /// Mark `view` and its ancestors for refresh.
    pub fn mark_dirty(&mut self, view: ViewId) -> ViewResult<()> {
        let mut current = Some(view);
        while let Some(id) = current {
            let instance = self.views.get_mut(id)?;
            instance.flags.insert(ViewFlags::DIRTY);
            current = match instance.parent {
                Some(ViewParent::View(parent)) => Some(parent),
                Some(ViewParent::Container(location)) => Some(location.view),
                None => None,
            };
        }
        Ok(())
    }

    /// Choose whether a component view is refreshed with every refresh of
    /// its parent, or only after [`mark_dirty`](Self::mark_dirty).
    pub fn set_check_always(&mut self, view: ViewId, check_always: bool) -> ViewResult<()> {
        self.views
            .get_mut(view)?
            .flags
            .set(ViewFlags::CHECK_ALWAYS, check_always);
        Ok(())
    }

    /// Run a template function for one pass, restoring the selected index.
    pub(crate) fn execute_template(
        &mut self,
        view: ViewId,
        template_fn: &TemplateFn,
        flags: RenderFlags,
    ) -> ViewResult<()> {
        let previous = self.frames.selected_index();
        let len = self.views.get(view)?.len();
        self.frames.set_selected_index(None, len);
        let mut result = Ok(());
        if flags.contains(RenderFlags::UPDATE) && len > 0 {
            // Runs the pre-order hooks of nodes before the first one.
            result = self.select_index_internal(view, 0);
        }
        if result.is_ok() {
            result = template_fn(self, flags);
        }
        let len = self.views.get(view).map_or(len, ViewInstance::len);
        self.frames.set_selected_index(previous.filter(|i| *i < len), len);
        result
    }

    fn execute_view_query(&mut self, view_query: &ViewQueryFn, flags: RenderFlags) -> ViewResult<()> {
        self.frames.set_current_query_index(0);
        view_query(self, flags)
    }

    fn refresh_embedded_views(&mut self, view: ViewId, template: &ViewTemplate) -> ViewResult<()> {
        let containers = template.read().containers.clone();
        for node in containers {
            let children = self
                .views
                .get(view)?
                .container(node)
                .map(|c| c.views.clone())
                .unwrap_or_default();
            for child in children {
                let attached = self
                    .views
                    .get(child)
                    .is_ok_and(|c| c.flags.contains(ViewFlags::ATTACHED));
                if attached {
                    self.refresh_view(child)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn refresh_content_queries(&mut self, view: ViewId, template: &ViewTemplate) -> ViewResult<()> {
        let pairs = template.read().content_queries.clone();
        for (query_start, directive) in pairs {
            let Some(content_queries) = template
                .read()
                .directive(directive)
                .and_then(|def| def.content_queries().cloned())
            else {
                continue;
            };
            let Some(instance) = self
                .views
                .get(view)?
                .slot(directive)
                .and_then(Slot::directive)
                .cloned()
            else {
                continue;
            };
            self.frames.set_current_query_index(query_start);
            content_queries(self, RenderFlags::UPDATE, &instance, directive)?;
        }
        Ok(())
    }

    fn process_host_bindings(&mut self, view: ViewId, template: &ViewTemplate) -> ViewResult<()> {
        let entries = template.read().host_bindings.clone();
        if entries.is_empty() {
            return Ok(());
        }
        let len = self.views.get(view)?.len();
        let mut result = Ok(());
        for entry in entries {
            let Some(host_bindings) = template
                .read()
                .directive(entry.directive)
                .and_then(|def| def.host_bindings().cloned())
            else {
                continue;
            };
            let Some(instance) = self
                .views
                .get(view)?
                .slot(entry.directive)
                .and_then(Slot::directive)
                .cloned()
            else {
                continue;
            };
            self.frames.set_selected_index(Some(entry.element), len);
            self.frames
                .set_binding_root_for_host_bindings(entry.binding_root, entry.directive);
            result = host_bindings(self, RenderFlags::UPDATE, &instance);
            if result.is_err() {
                break;
            }
        }
        self.frames.set_selected_index(None, len);
        self.frames.set_current_directive_index(None);
        result
    }

    fn component_view_at(&self, view: ViewId, host: usize) -> ViewResult<Option<ViewId>> {
        Ok(match self.views.get(view)?.slot(host) {
            Some(Slot::Component { view: child, .. }) => Some(*child),
            _ => None,
        })
    }

    fn refresh_component(&mut self, view: ViewId, host: usize) -> ViewResult<()> {
        let Some(child) = self.component_view_at(view, host)? else {
            return Ok(());
        };
        let flags = self.views.get(child)?.flags;
        if !flags.contains(ViewFlags::ATTACHED)
            || !flags.intersects(ViewFlags::CHECK_ALWAYS | ViewFlags::DIRTY)
        {
            return Ok(());
        }
        self.refresh_view(child)?;
        if !self.frames.is_check_no_changes() {
            self.views.get_mut(child)?.flags.remove(ViewFlags::DIRTY);
        }
        Ok(())
    }

    /// Create and render an embedded view of the template behind
    /// `template_ref`. The view is not inserted anywhere.
    pub fn create_embedded_view(
        &mut self,
        template_ref: &TemplateRef,
        context: Option<ViewContext>,
    ) -> ViewResult<ViewId> {
        let queries = self
            .views
            .get(template_ref.declaration_view)?
            .queries
            .as_ref()
            .and_then(|q| q.create_embedded_view(&template_ref.template.read()));
        let mut instance = ViewInstance::new(template_ref.template.clone(), context);
        instance.declaration_view = Some(template_ref.declaration_view);
        instance.declaration_node = Some(template_ref.node);
        instance.declaration_container = Some(template_ref.declaration_container());
        instance.queries = queries;
        let view = self.views.insert(instance);
        tracing::debug!(
            target: targets::VIEW,
            template = template_ref.template.name(),
            ?view,
            "embedded view created"
        );
        self.render_view(view)?;
        Ok(view)
    }

    /// Insert a detached view into `container` at `index`, or at the end.
    ///
    /// Returns the index the view was inserted at.
    pub fn insert_view(
        &mut self,
        container: ContainerLocation,
        view: ViewId,
        index: Option<usize>,
    ) -> ViewResult<usize> {
        debug_assert!(
            self.views.get(view).is_ok_and(|v| v.parent.is_none()),
            "only a detached view can be inserted"
        );
        let template = self.views.get(view)?.template.clone();
        let (index, next, anchor) = {
            let host = self.views.get_mut(container.view)?;
            let name = host.template.name().to_string();
            let slot = host
                .container_mut(container.node)
                .ok_or_else(|| ViewError::container_expected(container.node, name))?;
            let index = index.map_or(slot.views.len(), |i| i.min(slot.views.len()));
            slot.views.insert(index, view);
            (index, slot.views.get(index + 1).copied(), slot.anchor)
        };

        {
            let instance = self.views.get_mut(view)?;
            instance.parent = Some(ViewParent::Container(container));
            instance.flags.insert(ViewFlags::ATTACHED);
        }
        let declaration = self.views.get(view)?.declaration_container;
        if let Some(declaration) = declaration.filter(|d| *d != container) {
            self.track_moved_view(declaration, view);
        }
        if let Some(queries) = self.views.get(view)?.queries.as_ref() {
            queries.insert_view(&template.read());
        }

        let before = match next {
            Some(next) => self.collect_native_nodes(next)?.first().copied().unwrap_or(anchor),
            None => anchor,
        };
        if let Some(parent) = self.renderer.parent_node(anchor) {
            for native in self.collect_native_nodes(view)? {
                self.renderer.insert_before(parent, native, Some(before), true);
            }
        }
        tracing::debug!(target: targets::VIEW, ?view, ?container, index, "view inserted");
        Ok(index)
    }

    /// Detach the view at `index` of `container` without destroying it.
    pub fn detach_view(&mut self, container: ContainerLocation, index: usize) -> ViewResult<Option<ViewId>> {
        let view = {
            let host = self.views.get_mut(container.view)?;
            let name = host.template.name().to_string();
            let slot = host
                .container_mut(container.node)
                .ok_or_else(|| ViewError::container_expected(container.node, name))?;
            if index >= slot.views.len() {
                return Ok(None);
            }
            slot.views.remove(index)
        };

        let declaration = self.views.get(view)?.declaration_container;
        if let Some(declaration) = declaration.filter(|d| *d != container) {
            self.detach_moved_view(declaration, view);
        }
        for native in self.collect_native_nodes(view)? {
            let parent = self.renderer.parent_node(native);
            self.renderer.remove_child(parent, native);
        }
        let template = self.views.get(view)?.template.clone();
        if let Some(queries) = self.views.get(view)?.queries.as_ref() {
            queries.detach_view(&template.read());
        }
        let instance = self.views.get_mut(view)?;
        instance.parent = None;
        instance.flags.remove(ViewFlags::ATTACHED);
        tracing::debug!(target: targets::VIEW, ?view, ?container, index, "view detached");
        Ok(Some(view))
    }

    /// Move `view` to `index` of `container`, detaching it from wherever it
    /// is attached first.
    pub fn move_view(
        &mut self,
        view: ViewId,
        container: ContainerLocation,
        index: Option<usize>,
    ) -> ViewResult<usize> {
        if let Some(ViewParent::Container(current)) = self.views.get(view)?.parent {
            if let Some(position) = self.container_views(current)?.iter().position(|v| *v == view) {
                self.detach_view(current, position)?;
            }
        }
        self.insert_view(container, view, index)
    }

    /// Detach and destroy the view at `index` of `container`.
    pub fn remove_view(&mut self, container: ContainerLocation, index: usize) -> ViewResult<()> {
        if let Some(view) = self.detach_view(container, index)? {
            self.destroy_view(view)?;
        }
        Ok(())
    }

    /// Views currently inserted in `container`.
    pub fn container_views(&self, container: ContainerLocation) -> ViewResult<Vec<ViewId>> {
        let host = self.views.get(container.view)?;
        host.container(container.node)
            .map(|c| c.views.clone())
            .ok_or_else(|| ViewError::container_expected(container.node, host.template.name()))
    }

    fn track_moved_view(&mut self, declaration: ContainerLocation, view: ViewId) {
        let Some(slot) = self
            .views
            .get_mut(declaration.view)
            .ok()
            .and_then(|v| v.container_mut(declaration.node))
        else {
            return;
        };
        if !slot.moved_views.contains(&view) {
            slot.moved_views.push(view);
        }
    }

    fn detach_moved_view(&mut self, declaration: ContainerLocation, view: ViewId) {
        if let Some(slot) = self
            .views
            .get_mut(declaration.view)
            .ok()
            .and_then(|v| v.container_mut(declaration.node))
        {
            slot.moved_views.retain(|v| *v != view);
        }
    }

    /// Destroy `view` and everything below it.
    ///
    /// Children are destroyed before their parents. Every `on_destroy` hook
    /// runs even when an earlier one fails; the first failure is returned.
    #[tracing::instrument(skip(self), target = "horizon_lattice_view::view", level = "debug")]
    pub fn destroy_view(&mut self, view: ViewId) -> ViewResult<()> {
        match self.views.get(view)?.parent {
            Some(ViewParent::Container(container)) => {
                if let Some(index) = self.container_views(container)?.iter().position(|v| *v == view) {
                    self.detach_view(container, index)?;
                }
            }
            Some(ViewParent::View(_)) => {}
            None => {
                for native in self.collect_native_nodes(view)? {
                    let parent = self.renderer.parent_node(native);
                    self.renderer.remove_child(parent, native);
                }
            }
        }
        let mut first_error = None;
        self.destroy_view_tree(view, &mut first_error);
        first_error.map_or(Ok(()), Err)
    }

    fn destroy_view_tree(&mut self, view: ViewId, first_error: &mut Option<ViewError>) {
        let Ok(instance) = self.views.get(view) else {
            return;
        };
        let template = instance.template.clone();
        let (containers, components) = {
            let data = template.read();
            (data.containers.clone(), data.components.clone())
        };
        let mut children = Vec::new();
        for node in containers {
            if let Some(container) = instance.container(node) {
                children.extend(container.views.iter().copied());
            }
        }
        for host in components {
            if let Some(Slot::Component { view: child, .. }) = instance.slot(host) {
                children.push(*child);
            }
        }
        for child in children {
            self.destroy_view_tree(child, first_error);
        }
        self.clean_up_view(view, first_error);
    }

    fn clean_up_view(&mut self, view: ViewId, first_error: &mut Option<ViewError>) {
        let Ok(instance) = self.views.get_mut(view) else {
            return;
        };
        if instance.flags.contains(ViewFlags::DESTROYED) {
            return;
        }
        instance.flags.insert(ViewFlags::DESTROYED);
        instance.flags.remove(ViewFlags::ATTACHED);
        let template = instance.template.clone();

        let hooks = template.read().destroy_hooks.clone();
        for entry in hooks {
            if let HookEntry::Hook { directive, hook } = entry {
                if let Err(err) = self.invoke_hook(view, directive, hook) {
                    tracing::warn!(target: targets::HOOKS, ?view, error = %err, "destroy hook failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        let Ok(instance) = self.views.get_mut(view) else {
            return;
        };
        for list in std::mem::take(&mut instance.cleanup) {
            list.destroy();
        }
        if let Some(declaration) = instance.declaration_container {
            self.detach_moved_view(declaration, view);
        }
        self.contexts.forget_view(view);
        self.views.remove(view);
        tracing::debug!(target: targets::VIEW, ?view, template = template.name(), "view destroyed");
    }

    /// Resolve a node-level capability at `node` of `view`, or at its
    /// closest element ancestor with `skip_self`.
    ///
    /// Named tokens go through the configured [`CapabilityLocator`].
    pub fn resolve_capability(
        &mut self,
        view: ViewId,
        node: Option<usize>,
        token: &CapabilityToken,
        skip_self: bool,
    ) -> ViewResult<Option<QueryResult>> {
        if !self.frames.enter_light(&self.views, view, node, skip_self) {
            return Ok(None);
        }
        let result = self.resolve_capability_in_frame(token);
        self.frames.leave_light();
        result
    }

    fn resolve_capability_in_frame(&self, token: &CapabilityToken) -> ViewResult<Option<QueryResult>> {
        let (Some(view), Some(node)) = (self.frames.view(), self.frames.current_node()) else {
            return Ok(None);
        };
        let instance = self.views.get(view)?;
        let template = instance.template.clone();
        let Some(tnode) = template.node(node) else {
            return Ok(None);
        };
        match token {
            CapabilityToken::NodeHandle => self.element_ref(view, node).map(Some),
            CapabilityToken::TemplateHandle => {
                if tnode.kind == NodeKind::Container {
                    self.template_ref(view, node).map(Some)
                } else {
                    Ok(None)
                }
            }
            CapabilityToken::ContainerHandle => Ok(instance.container(node).map(|_| {
                QueryResult::Container(ContainerRef {
                    location: ContainerLocation::new(view, node),
                })
            })),
            CapabilityToken::Named(_) => {
                let slot = self.locator.locate(&template.read(), &tnode, token);
                Ok(slot
                    .and_then(|s| instance.slot(s))
                    .and_then(Slot::directive)
                    .cloned()
                    .map(QueryResult::Instance))
            }
        }
    }

    /// Parent node and insertion anchor for a node created under the
    /// template node `parent` of `view`.
    pub(crate) fn render_location(
        &self,
        view: ViewId,
        parent: Option<usize>,
    ) -> ViewResult<(Option<NodeHandle>, Option<NodeHandle>)> {
        let instance = self.views.get(view)?;
        let template = &instance.template;
        if let Some(index) = parent {
            let (kind, is_component_host) = template
                .read()
                .node(index)
                .map(|n| (n.kind, n.is_component_host()))
                .ok_or_else(|| ViewError::node_not_found(index, template.name()))?;
            // The component view owns the host's children; content nodes
            // are created but not attached.
            if is_component_host {
                return Ok((None, None));
            }
            let native = instance.slot(index).and_then(Slot::native);
            return Ok(match (kind, native) {
                // Children of an element container go in front of its comment.
                (NodeKind::ElementContainer, Some(comment)) => {
                    (self.renderer.parent_node(comment), Some(comment))
                }
                (NodeKind::ElementContainer, None) => (None, None),
                (_, native) => (native, None),
            });
        }
        Ok(match template.kind() {
            // Root nodes of an embedded view are placed when it is inserted.
            TemplateKind::Embedded => (None, None),
            TemplateKind::Root | TemplateKind::Component => (instance.host, None),
        })
    }

    /// Rendered root nodes of `view` in document order, descending into
    /// element containers and view containers.
    pub(crate) fn collect_native_nodes(&self, view: ViewId) -> ViewResult<Vec<NodeHandle>> {
        let mut out = Vec::new();
        let first = self.views.get(view)?.template.read().first_child;
        self.collect_sibling_natives(view, first, &mut out)?;
        self.collect_i18n_natives(view, &mut out)?;
        Ok(out)
    }

    fn collect_sibling_natives(
        &self,
        view: ViewId,
        first: Option<usize>,
        out: &mut Vec<NodeHandle>,
    ) -> ViewResult<()> {
        let instance = self.views.get(view)?;
        let mut current = first;
        while let Some(index) = current {
            let (kind, child, next) = instance
                .template
                .read()
                .node(index)
                .map(|n| (n.kind, n.child, n.next))
                .ok_or_else(|| ViewError::node_not_found(index, instance.template.name()))?;
            match kind {
                NodeKind::ElementContainer => self.collect_sibling_natives(view, child, out)?,
                NodeKind::Container => {
                    for embedded in instance.container(index).map(|c| c.views.clone()).unwrap_or_default() {
                        out.extend(self.collect_native_nodes(embedded)?);
                    }
                }
                _ => {}
            }
            out.extend(instance.slot(index).and_then(Slot::native));
            current = next;
        }
        Ok(())
    }
}

static_assertions::assert_impl_all!(Runtime: Send);
