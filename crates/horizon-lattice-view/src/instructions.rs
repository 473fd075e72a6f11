//! Template instructions.
//!
//! Template functions drive the runtime through these methods. In the
//! creation pass they declare nodes; the first creation pass of a template
//! also links the node tree, matches directives, allocates directive and
//! host binding slots, registers hooks and feeds the query matchers. In the
//! update pass they select nodes and write bindings.
//!
//! ```ignore
//! |rt: &mut Runtime, flags: RenderFlags| {
//!     if flags.contains(RenderFlags::CREATE) {
//!         rt.element_start(0, "div", None, &[])?;
//!         rt.text(1, "")?;
//!         rt.element_end()?;
//!     }
//!     if flags.contains(RenderFlags::UPDATE) {
//!         rt.property("title", "hello")?;
//!         rt.advance(1)?;
//!         rt.text_interpolate(42)?;
//!     }
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use crate::binding::BindingValue;
use crate::context::{PatchTarget, PatchedData};
use crate::directive::{DirectiveDef, SimpleChange};
use crate::error::{ViewError, ViewResult};
use crate::hooks::{register_post_order_hooks, register_pre_order_hooks, HookBoundary, HookList};
use crate::logging::targets;
use crate::node::{NodeAttrs, NodeKind, TemplateNode, NG_TEMPLATE_TAG};
use crate::renderer::NodeHandle;
use crate::runtime::Runtime;
use crate::schema::{validate_element, validate_property};
use crate::selector::SelectorMatcher;
use crate::template::{HostBindingEntry, RenderFlags, TemplateData, TemplateSlot, ViewTemplate};
use crate::view::{ContainerSlot, InitPhase, Slot, ViewId, ViewInstance, ViewParent};

const ELEMENT_CONTAINER_TAG: &str = "ng-container";

impl Runtime {
    /// Start an element at slot `index`.
    ///
    /// `local_refs` pairs a reference name with an export name; an empty
    /// export refers to the component on the node, or to the node itself.
    pub fn element_start(
        &mut self,
        index: usize,
        tag: &str,
        attrs: Option<NodeAttrs>,
        local_refs: &[(&str, &str)],
    ) -> ViewResult<()> {
        let (view, template) = self.active_view()?;
        if template.first_create_pass() {
            self.register_node(&template, index, NodeKind::Element, Some(tag.to_string()), attrs, local_refs, None)?;
        }
        let node = template
            .node(index)
            .ok_or_else(|| ViewError::node_not_found(index, template.name()))?;

        let native = self.renderer.create_element(tag, self.frames.namespace());
        if let Some(attrs) = &node.attrs {
            let renderer = self.renderer.clone();
            attrs.for_each_static(|ns, name, value| renderer.set_attribute(native, name, value, ns));
        }
        self.place_node(view, &node, Slot::Native(native))?;
        self.frames.set_current_node(Some(index), true);
        self.frames.increase_element_depth();

        if node.is_directive_host() {
            self.create_directives_instances(view, &template, &node)?;
            self.execute_content_queries(view, &template, &node)?;
        }
        Ok(())
    }

    /// End the current element.
    pub fn element_end(&mut self) -> ViewResult<()> {
        self.end_node()?;
        self.frames.decrease_element_depth();
        Ok(())
    }

    /// An element with no children.
    pub fn element(
        &mut self,
        index: usize,
        tag: &str,
        attrs: Option<NodeAttrs>,
        local_refs: &[(&str, &str)],
    ) -> ViewResult<()> {
        self.element_start(index, tag, attrs, local_refs)?;
        self.element_end()
    }

    /// Start a grouping node that renders only an anchor comment.
    pub fn element_container_start(
        &mut self,
        index: usize,
        attrs: Option<NodeAttrs>,
        local_refs: &[(&str, &str)],
    ) -> ViewResult<()> {
        let (view, template) = self.active_view()?;
        if template.first_create_pass() {
            self.register_node(
                &template,
                index,
                NodeKind::ElementContainer,
                Some(ELEMENT_CONTAINER_TAG.to_string()),
                attrs,
                local_refs,
                None,
            )?;
        }
        let node = template
            .node(index)
            .ok_or_else(|| ViewError::node_not_found(index, template.name()))?;
        let comment = self.renderer.create_comment(ELEMENT_CONTAINER_TAG);
        self.place_node(view, &node, Slot::Native(comment))?;
        self.frames.set_current_node(Some(index), true);

        if node.is_directive_host() {
            self.create_directives_instances(view, &template, &node)?;
            self.execute_content_queries(view, &template, &node)?;
        }
        Ok(())
    }

    /// End the current element container.
    pub fn element_container_end(&mut self) -> ViewResult<()> {
        self.end_node()
    }

    /// A text node at slot `index`.
    pub fn text(&mut self, index: usize, value: &str) -> ViewResult<()> {
        let (view, template) = self.active_view()?;
        if template.first_create_pass() {
            self.register_node(&template, index, NodeKind::Text, None, None, &[], None)?;
        }
        let node = template
            .node(index)
            .ok_or_else(|| ViewError::node_not_found(index, template.name()))?;
        let native = self.renderer.create_text(value);
        self.place_node(view, &node, Slot::Native(native))?;
        self.frames.set_current_node(Some(index), false);
        Ok(())
    }

    /// Declare the nested template `embedded` at slot `index`, with a view
    /// container anchored there.
    ///
    /// `tag` is the element a structural directive was written on, if any.
    pub fn template(
        &mut self,
        index: usize,
        embedded: &ViewTemplate,
        tag: Option<&str>,
        attrs: Option<NodeAttrs>,
        local_refs: &[(&str, &str)],
    ) -> ViewResult<()> {
        let (view, template) = self.active_view()?;
        if template.first_create_pass() {
            if embedded.first_create_pass() {
                let (registry, schema) = {
                    let data = template.read();
                    (data.registry.clone(), data.schema.clone())
                };
                let mut data = embedded.write();
                if data.registry.is_empty() {
                    data.registry = registry;
                }
                data.schema = schema;
                data.declaration_node = Some(index);
            }
            self.register_node(
                &template,
                index,
                NodeKind::Container,
                Some(tag.unwrap_or(NG_TEMPLATE_TAG).to_string()),
                attrs,
                local_refs,
                Some(embedded.clone()),
            )?;
            let mut data = template.write();
            data.containers.push(index);
            register_post_order_hooks(&mut data, index);
        }
        let node = template
            .node(index)
            .ok_or_else(|| ViewError::node_not_found(index, template.name()))?;

        let anchor = self.renderer.create_comment("container");
        let slot = Slot::Container(ContainerSlot {
            anchor,
            views: Vec::new(),
            moved_views: Vec::new(),
        });
        self.place_node(view, &node, slot)?;
        self.frames.set_current_node(Some(index), false);

        if node.is_directive_host() {
            self.create_directives_instances(view, &template, &node)?;
            self.execute_content_queries(view, &template, &node)?;
        }
        Ok(())
    }

    /// Select the node `delta` slots further, running the pre-order hooks
    /// of every node passed over.
    pub fn advance(&mut self, delta: usize) -> ViewResult<()> {
        debug_assert!(delta > 0, "can only advance forward");
        let (view, _) = self.active_view()?;
        let target = self.frames.selected_index().unwrap_or(0) + delta;
        self.select_index_internal(view, target)
    }

    pub(crate) fn select_index_internal(&mut self, view: ViewId, index: usize) -> ViewResult<()> {
        if !self.frames.is_check_no_changes() {
            if self.views.get(view)?.init_phase == InitPhase::Completed {
                self.execute_check_hooks(view, HookList::PreOrderCheck, HookBoundary::Before(index))?;
            } else {
                self.execute_init_and_check_hooks(
                    view,
                    HookList::PreOrder,
                    InitPhase::PreOrderPending,
                    HookBoundary::Before(index),
                )?;
            }
        }
        let len = self.views.get(view)?.len();
        self.frames.set_selected_index(Some(index), len);
        Ok(())
    }

    /// Bind a property of the selected node.
    ///
    /// Directive inputs of that name receive the value; otherwise it is set
    /// on the rendered element. Inside host bindings the value always goes
    /// to the host element.
    pub fn property(&mut self, name: &str, value: impl Into<BindingValue>) -> ViewResult<()> {
        let (view, _) = self.active_view()?;
        let index = self.frames.next_binding_index();
        let value = value.into();
        if !self.binding_updated(view, index, value.clone())? {
            return Ok(());
        }
        let Some(node) = self.frames.selected_index() else {
            debug_assert!(false, "property binding with no selected node");
            return Ok(());
        };
        if self.frames.current_directive_index().is_some() {
            return self.native_property(view, node, name, &value);
        }
        self.element_property(view, node, name, value)
    }

    /// Bind the text of the selected text node.
    pub fn text_interpolate(&mut self, value: impl Into<BindingValue>) -> ViewResult<()> {
        let (view, template) = self.active_view()?;
        let index = self.frames.next_binding_index();
        let value = value.into();
        if !self.binding_updated(view, index, value.clone())? {
            return Ok(());
        }
        let node = self.frames.selected_index().unwrap_or(0);
        let native = self
            .views
            .get(view)?
            .slot(node)
            .and_then(Slot::native)
            .ok_or_else(|| ViewError::node_not_found(node, template.name()))?;
        self.renderer.set_value(native, &value.render_text());
        Ok(())
    }

    /// Bind an attribute of the selected element. `Null` removes it.
    pub fn attribute(&mut self, name: &str, value: impl Into<BindingValue>) -> ViewResult<()> {
        let (view, template) = self.active_view()?;
        let index = self.frames.next_binding_index();
        let value = value.into();
        if !self.binding_updated(view, index, value.clone())? {
            return Ok(());
        }
        let node = self.frames.selected_index().unwrap_or(0);
        let native = self
            .views
            .get(view)?
            .slot(node)
            .and_then(Slot::native)
            .ok_or_else(|| ViewError::node_not_found(node, template.name()))?;
        match value {
            BindingValue::Unset | BindingValue::Null => self.renderer.remove_attribute(native, name, None),
            value => self.renderer.set_attribute(native, name, &value.render_text(), None),
        }
        Ok(())
    }

    /// Give input `name` of the directive in slot `directive` of `view` a
    /// new value and queue the change for its `on_changes` hook.
    pub fn set_input(
        &mut self,
        view: ViewId,
        directive: usize,
        name: &str,
        value: impl Into<BindingValue>,
    ) -> ViewResult<()> {
        let value = value.into();
        let instance = self.views.get_mut(view)?;
        let target = instance
            .slot(directive)
            .and_then(Slot::directive)
            .cloned()
            .ok_or(ViewError::DirectiveNotFound(view))?;
        let previous = instance
            .input_values
            .insert((directive, name.to_string()), value.clone());
        let changes = instance.pending_changes.entry(directive).or_default();
        match changes.get_mut(name) {
            // Not consumed yet: keep the original previous value.
            Some(change) => change.current = value.clone(),
            None => {
                changes.insert(
                    name.to_string(),
                    SimpleChange {
                        first_change: previous.is_none(),
                        previous: previous.unwrap_or_default(),
                        current: value.clone(),
                    },
                );
            }
        }
        target.set_input(name, &value);
        tracing::trace!(target: targets::VIEW, ?view, directive, input = name, %value, "input set");
        Ok(())
    }

    /// Write a property of node `node`: to matching directive inputs, or to
    /// the rendered element when no input matches.
    pub(crate) fn element_property(
        &mut self,
        view: ViewId,
        node: usize,
        name: &str,
        value: BindingValue,
    ) -> ViewResult<()> {
        let template = self.views.get(view)?.template.clone();
        let inputs: Vec<usize> = {
            let data = template.read();
            let tnode = data
                .node(node)
                .ok_or_else(|| ViewError::node_not_found(node, template.name()))?;
            (tnode.directive_start..tnode.directive_end)
                .filter(|slot| data.directive(*slot).is_some_and(|def| def.has_input(name)))
                .collect()
        };
        if inputs.is_empty() {
            return self.native_property(view, node, name, &value);
        }
        for slot in inputs {
            self.set_input(view, slot, name, value.clone())?;
        }
        Ok(())
    }

    fn native_property(&mut self, view: ViewId, node: usize, name: &str, value: &BindingValue) -> ViewResult<()> {
        let instance = self.views.get(view)?;
        let template = instance.template.clone();
        let (kind, tag) = template
            .read()
            .node(node)
            .map(|n| (n.kind, n.value.clone()))
            .ok_or_else(|| ViewError::node_not_found(node, template.name()))?;
        if self.config.dev_mode {
            let tag = match kind {
                NodeKind::Container => None,
                _ => tag.as_deref(),
            };
            let schema = template.read().schema.clone();
            validate_property(
                &schema,
                tag,
                name,
                template.name(),
                self.config.strict_unknown_properties,
            )?;
        }
        if kind == NodeKind::Element {
            if let Some(native) = instance.slot(node).and_then(Slot::native) {
                self.renderer.set_property(native, name, value);
            }
        }
        Ok(())
    }

    /// Compare `value` with binding slot `index` of `view` and store it.
    ///
    /// Returns whether the value changed. In the check-no-changes pass
    /// nothing is stored and a change is an error.
    pub(crate) fn binding_updated(&mut self, view: ViewId, index: usize, value: BindingValue) -> ViewResult<bool> {
        let check_no_changes = self.frames.is_check_no_changes();
        let instance = self.views.get_mut(view)?;
        if index >= instance.slots.len() {
            return Err(ViewError::node_not_found(index, instance.template.name()));
        }
        let previous = match &instance.slots[index] {
            Slot::Binding(previous) => previous.clone(),
            _ => BindingValue::Unset,
        };
        if previous == value {
            return Ok(false);
        }
        if check_no_changes {
            return Err(ViewError::ExpressionChanged {
                template: instance.template.name().to_string(),
                index,
                previous: previous.to_string(),
                current: value.to_string(),
            });
        }
        instance.slots[index] = Slot::Binding(value);
        Ok(true)
    }

    /// Node the next created node becomes a child of.
    pub(crate) fn current_parent_node(&self) -> Option<usize> {
        let node = self.frames.current_node()?;
        if self.frames.is_current_node_parent() {
            // A fresh frame points at the first child before it is created.
            let created = self
                .frames
                .view()
                .and_then(|view| self.views.get(view).ok())
                .and_then(|view| view.slot(node))
                .is_some_and(|slot| !matches!(slot, Slot::Empty));
            return created.then_some(node);
        }
        let parent = self.frames.template()?.read().node(node)?.parent;
        parent
    }

    /// Create following elements in the SVG namespace.
    pub fn namespace_svg(&mut self) {
        self.frames.namespace_svg();
    }

    /// Create following elements in the MathML namespace.
    pub fn namespace_math_ml(&mut self) {
        self.frames.namespace_math_ml();
    }

    /// Create following elements without a namespace.
    pub fn namespace_html(&mut self) {
        self.frames.namespace_html();
    }

    /// Stop matching directives on the following nodes.
    pub fn disable_bindings(&mut self) {
        self.frames.disable_bindings();
    }

    /// Match directives again.
    pub fn enable_bindings(&mut self) {
        self.frames.enable_bindings();
    }

    fn end_node(&mut self) -> ViewResult<()> {
        let (_, template) = self.active_view()?;
        let mut current = self.frames.current_node().ok_or(ViewError::NoActiveView)?;
        if self.frames.is_current_node_parent() {
            self.frames.set_current_node_as_not_parent();
        } else {
            current = template
                .read()
                .node(current)
                .and_then(|n| n.parent)
                .ok_or_else(|| ViewError::node_not_found(current, template.name()))?;
            self.frames.set_current_node(Some(current), false);
        }
        debug_assert!(
            template.read().node(current).is_some_and(|n| n.kind.is_element_like()),
            "end instruction does not close an element"
        );

        if template.first_create_pass() {
            let mut data = template.write();
            register_post_order_hooks(&mut data, current);
            if let Some(queries) = data.queries.as_mut() {
                queries.element_end(current);
            }
        }
        Ok(())
    }

    /// Store the created node in its slot and attach it to the rendered tree.
    fn place_node(&mut self, view: ViewId, node: &TemplateNode, slot: Slot) -> ViewResult<()> {
        let Some(native) = slot.native() else {
            return Ok(());
        };
        let (parent, anchor) = self.render_location(view, node.parent)?;
        if let Some(parent) = parent {
            self.renderer.insert_before(parent, native, anchor, false);
        }
        tracing::trace!(target: targets::RENDER, ?view, index = node.index, attached = parent.is_some(), "node created");
        self.contexts.attach(PatchTarget::Node(native), PatchedData::View(view));

        let instance = self.views.get_mut(view)?;
        instance.sync_layout();
        *instance
            .slots
            .get_mut(node.index)
            .ok_or_else(|| ViewError::node_not_found(node.index, instance.template.name()))? = slot;
        Ok(())
    }

    /// First creation pass bookkeeping for a new node.
    #[allow(clippy::too_many_arguments)]
    fn register_node(
        &self,
        template: &ViewTemplate,
        index: usize,
        kind: NodeKind,
        value: Option<String>,
        attrs: Option<NodeAttrs>,
        local_refs: &[(&str, &str)],
        embedded: Option<ViewTemplate>,
    ) -> ViewResult<()> {
        if index >= template.decls() {
            return Err(ViewError::node_not_found(index, template.name()));
        }
        let previous = self.frames.current_node();
        let is_parent = self.frames.is_current_node_parent();
        let mut data = template.write();

        let mut node = TemplateNode::new(index, kind, value, attrs);
        node.parent = if is_parent {
            previous
        } else {
            previous.and_then(|p| data.node(p)).and_then(|p| p.parent)
        };
        node.embedded = embedded;

        let matched = if kind != NodeKind::Text && self.frames.bindings_enabled() {
            self.resolve_directives(&mut data, &mut node, template.name(), local_refs)?
        } else {
            Vec::new()
        };
        if kind == NodeKind::Element && matched.is_empty() && self.config.dev_mode {
            validate_element(
                &data.schema,
                node.tag_name(),
                template.name(),
                self.config.strict_unknown_elements,
            )?;
        }

        match previous {
            Some(previous) if is_parent => {
                if let Some(parent) = data.node_mut(previous) {
                    parent.child.get_or_insert(index);
                }
            }
            Some(previous) => {
                if let Some(sibling) = data.node_mut(previous) {
                    sibling.next = Some(index);
                }
            }
            None => {}
        }
        if data.first_child.is_none() {
            data.first_child = Some(index);
        }
        data.slots[index] = TemplateSlot::Node(node.clone());

        if let Some(mut queries) = data.queries.take() {
            match kind {
                NodeKind::Element | NodeKind::ElementContainer => {
                    queries.element_start(&data, &node, self.locator.as_ref());
                }
                NodeKind::Container => {
                    queries.template(&data, &node, self.locator.as_ref());
                    if let Some(embedded) = &node.embedded {
                        embedded.write().queries = queries.embedded_template(&data, &node);
                    }
                }
                NodeKind::Text | NodeKind::Icu => {}
            }
            data.queries = Some(queries);
        }
        tracing::trace!(
            target: targets::VIEW,
            template = template.name(),
            index,
            ?kind,
            directives = matched.len(),
            "node registered"
        );
        Ok(())
    }

    /// Match the registry against `node`, allocate the directive slots and
    /// register their hooks, host bindings and local names.
    fn resolve_directives(
        &self,
        data: &mut TemplateData,
        node: &mut TemplateNode,
        template_name: &str,
        local_refs: &[(&str, &str)],
    ) -> ViewResult<Vec<Arc<DirectiveDef>>> {
        let mut matched: Vec<Arc<DirectiveDef>> = Vec::new();
        for def in &data.registry {
            if !SelectorMatcher::matches_any(node, def.selectors(), false) {
                continue;
            }
            if def.is_component() {
                if node.kind != NodeKind::Element {
                    continue;
                }
                if matched.first().is_some_and(|first| first.is_component()) {
                    tracing::warn!(
                        target: targets::VIEW,
                        template = template_name,
                        tag = node.tag_name(),
                        component = def.name(),
                        "more than one component matches the element; keeping the first"
                    );
                    continue;
                }
                matched.insert(0, def.clone());
            } else {
                matched.push(def.clone());
            }
        }

        if !matched.is_empty() {
            node.directive_start = data.slots.len();
            for def in &matched {
                data.alloc_expando(TemplateSlot::Directive(def.clone()), 1);
            }
            node.directive_end = data.slots.len();
            if matched[0].is_component() {
                node.component_offset = Some(0);
                data.components.push(node.index);
            }
            for (slot, def) in (node.directive_start..).zip(&matched) {
                register_pre_order_hooks(data, node.index, slot, def.hooks());
                if def.content_queries().is_some() {
                    node.has_content_query = true;
                }
                if def.host_bindings().is_some() {
                    let binding_root = data.alloc_expando(TemplateSlot::HostVar, def.host_vars());
                    data.host_bindings.push(HostBindingEntry {
                        element: node.index,
                        binding_root,
                        directive: slot,
                    });
                }
            }
        }

        for (name, export) in local_refs {
            let target = if export.is_empty() {
                node.component_slot()
            } else {
                let slot = (node.directive_start..)
                    .zip(&matched)
                    .find(|(_, def)| def.export_as().iter().any(|e| e == export))
                    .map(|(slot, _)| slot)
                    .ok_or_else(|| ViewError::export_not_found(*export, node.tag_name(), template_name))?;
                Some(slot)
            };
            node.local_names.push((name.to_string(), target));
        }
        Ok(matched)
    }

    /// Instantiate the directives of `node`, create the component view,
    /// apply static attribute inputs and run the creation pass of host
    /// bindings.
    fn create_directives_instances(
        &mut self,
        view: ViewId,
        template: &ViewTemplate,
        node: &TemplateNode,
    ) -> ViewResult<()> {
        let defs: Vec<(usize, Arc<DirectiveDef>)> = {
            let data = template.read();
            (node.directive_start..node.directive_end)
                .filter_map(|slot| data.directive(slot).map(|def| (slot, def.clone())))
                .collect()
        };
        let host = self.views.get(view)?.slot(node.index).and_then(Slot::native);

        for (slot, def) in &defs {
            let instance = def.create();
            self.contexts
                .attach(PatchTarget::instance(&instance), PatchedData::View(view));
            *self.slot_mut(view, *slot)? = Slot::Directive(instance);

            if node.component_slot() == Some(*slot) {
                if let (Some(component), Some(host)) = (def.component(), host) {
                    let mut child = ViewInstance::new(component.clone(), None);
                    child.host = Some(host);
                    child.parent = Some(ViewParent::View(view));
                    child.declaration_view = Some(view);
                    child.declaration_node = Some(node.index);
                    let child = self.views.insert(child);
                    *self.slot_mut(view, node.index)? = Slot::Component { host, view: child };
                    tracing::debug!(target: targets::VIEW, component = def.name(), ?child, "component view created");
                }
            }
        }

        if let Some(attrs) = &node.attrs {
            let mut initial = Vec::new();
            attrs.for_each_static(|ns, name, value| {
                if ns.is_none() {
                    initial.push((name.to_string(), value.to_string()));
                }
            });
            for (slot, def) in &defs {
                for (name, value) in &initial {
                    if def.has_input(name) {
                        self.set_input(view, *slot, name, value.as_str())?;
                    }
                }
            }
        }

        let entries: Vec<HostBindingEntry> = template
            .read()
            .host_bindings
            .iter()
            .filter(|entry| entry.element == node.index)
            .copied()
            .collect();
        for entry in entries {
            let Some(host_bindings) = defs
                .iter()
                .find(|(slot, _)| *slot == entry.directive)
                .and_then(|(_, def)| def.host_bindings().cloned())
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
            let len = self.views.get(view)?.len();
            let selected = self.frames.selected_index();
            self.frames.set_selected_index(Some(node.index), len);
            self.frames
                .set_binding_root_for_host_bindings(entry.binding_root, entry.directive);
            let result = host_bindings(self, RenderFlags::CREATE, &instance);
            self.frames.set_selected_index(selected, len);
            self.frames.set_current_directive_index(None);
            result?;
        }
        Ok(())
    }

    /// Creation pass of the content queries declared by directives on `node`.
    fn execute_content_queries(
        &mut self,
        view: ViewId,
        template: &ViewTemplate,
        node: &TemplateNode,
    ) -> ViewResult<()> {
        if !node.has_content_query {
            return Ok(());
        }
        for slot in node.directive_start..node.directive_end {
            let Some(content_queries) = template
                .read()
                .directive(slot)
                .and_then(|def| def.content_queries().cloned())
            else {
                continue;
            };
            let Some(instance) = self
                .views
                .get(view)?
                .slot(slot)
                .and_then(Slot::directive)
                .cloned()
            else {
                continue;
            };
            content_queries(self, RenderFlags::CREATE, &instance, slot)?;
        }
        Ok(())
    }

    fn slot_mut(&mut self, view: ViewId, index: usize) -> ViewResult<&mut Slot> {
        let instance = self.views.get_mut(view)?;
        instance.sync_layout();
        let name = instance.template.name().to_string();
        instance
            .slots
            .get_mut(index)
            .ok_or_else(|| ViewError::node_not_found(index, name))
    }

    /// Rendered node at slot `index` of the current view.
    pub fn native_node(&self, index: usize) -> ViewResult<Option<NodeHandle>> {
        let (view, _) = self.active_view()?;
        Ok(self.views.get(view)?.slot(index).and_then(Slot::native))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::{Directive, LifecycleHooks};
    use crate::renderer::{MemoryRenderer, Renderer};
    use crate::selector::CssSelector;
    use crate::template::TemplateKind;

    struct Plain;
    impl Directive for Plain {}

    fn setup() -> (Arc<MemoryRenderer>, Runtime) {
        let renderer = Arc::new(MemoryRenderer::new());
        let rt = Runtime::new(renderer.clone());
        (renderer, rt)
    }

    #[test]
    fn test_nodes_are_linked_in_the_first_pass() {
        let (renderer, mut rt) = setup();
        let template = ViewTemplate::builder("Tree", TemplateKind::Root)
            .decls(3)
            .template(|rt, flags| {
                if flags.contains(RenderFlags::CREATE) {
                    rt.element_start(0, "div", None, &[])?;
                    rt.text(1, "a")?;
                    rt.element_end()?;
                    rt.element(2, "span", None, &[])?;
                }
                Ok(())
            })
            .build();
        let host = renderer.create_element("host", None);
        rt.create_root_view(&template, Some(host), None).unwrap();

        let data = template.read();
        assert_eq!(data.first_child, Some(0));
        let div = data.node(0).unwrap();
        assert_eq!(div.child, Some(1));
        assert_eq!(div.next, Some(2));
        assert_eq!(data.node(1).unwrap().parent, Some(0));
        assert_eq!(data.node(2).unwrap().parent, None);
        assert_eq!(renderer.serialize(host), "<host><div>a</div><span></span></host>");
    }

    #[test]
    fn test_second_instance_reuses_first_pass_data() {
        let (renderer, mut rt) = setup();
        let template = ViewTemplate::builder("Twice", TemplateKind::Root)
            .decls(2)
            .template(|rt, flags| {
                if flags.contains(RenderFlags::CREATE) {
                    rt.element_start(0, "p", None, &[])?;
                    rt.text(1, "x")?;
                    rt.element_end()?;
                }
                Ok(())
            })
            .build();
        let a = renderer.create_element("a", None);
        let b = renderer.create_element("b", None);
        rt.create_root_view(&template, Some(a), None).unwrap();
        rt.create_root_view(&template, Some(b), None).unwrap();
        assert_eq!(renderer.serialize(b), "<b><p>x</p></b>");
        assert_eq!(template.read().node(0).unwrap().child, Some(1));
    }

    #[test]
    fn test_directives_matched_and_local_refs_resolved() {
        let (_, mut rt) = setup();
        let dir = DirectiveDef::builder("Tooltip", || Arc::new(Plain))
            .selector(CssSelector::any().attr("tooltip", ""))
            .export_as("tip")
            .hooks(LifecycleHooks::ON_INIT)
            .build();
        let template = ViewTemplate::builder("Refs", TemplateKind::Root)
            .decls(1)
            .directive(dir)
            .template(|rt, flags| {
                if flags.contains(RenderFlags::CREATE) {
                    let attrs = NodeAttrs::new().attr("tooltip", "");
                    rt.element(0, "button", Some(attrs), &[("t", "tip"), ("el", "")])?;
                }
                Ok(())
            })
            .build();
        let view = rt.create_root_view(&template, None, None).unwrap();

        let node = template.node(0).unwrap();
        assert!(node.is_directive_host());
        assert_eq!(node.local_names[0], ("t".to_string(), Some(node.directive_start)));
        assert_eq!(node.local_names[1], ("el".to_string(), None));
        assert_eq!(template.read().pre_order_hooks.len(), 2);
        assert!(rt.view(view).unwrap().slot(node.directive_start).unwrap().directive().is_some());
    }

    #[test]
    fn test_unknown_export_is_an_error() {
        let (_, mut rt) = setup();
        let template = ViewTemplate::builder("BadRef", TemplateKind::Root)
            .decls(1)
            .template(|rt, flags| {
                if flags.contains(RenderFlags::CREATE) {
                    rt.element(0, "div", None, &[("f", "ngForm")])?;
                }
                Ok(())
            })
            .build();
        let err = rt.create_root_view(&template, None, None).unwrap_err();
        assert!(matches!(err, ViewError::ExportNotFound { .. }));
        assert_eq!(rt.frames().depth(), 0);
    }

    #[test]
    fn test_property_binding_and_check_no_changes() {
        let (renderer, mut rt) = setup();
        let value = Arc::new(parking_lot::Mutex::new(1i64));
        let bound = value.clone();
        let template = ViewTemplate::builder("Bind", TemplateKind::Root)
            .decls(1)
            .vars(1)
            .template(move |rt, flags| {
                if flags.contains(RenderFlags::CREATE) {
                    rt.element(0, "input", None, &[])?;
                }
                if flags.contains(RenderFlags::UPDATE) {
                    let current = *bound.lock();
                    rt.property("value", current)?;
                }
                Ok(())
            })
            .build();
        let host = renderer.create_element("host", None);
        let view = rt.create_root_view(&template, Some(host), None).unwrap();
        rt.refresh_view(view).unwrap();
        rt.check_no_changes(view).unwrap();

        let input = renderer.children(host)[0];
        assert_eq!(renderer.property(input, "value"), Some(BindingValue::Int(1)));

        *value.lock() = 2;
        let err = rt.check_no_changes(view).unwrap_err();
        assert!(matches!(err, ViewError::ExpressionChanged { .. }));
        assert!(!rt.frames().is_check_no_changes());
        assert_eq!(rt.frames().depth(), 0);
    }

    #[test]
    fn test_text_interpolation() {
        let (renderer, mut rt) = setup();
        let template = ViewTemplate::builder("Text", TemplateKind::Root)
            .decls(2)
            .vars(1)
            .template(|rt, flags| {
                if flags.contains(RenderFlags::CREATE) {
                    rt.element_start(0, "p", None, &[])?;
                    rt.text(1, "")?;
                    rt.element_end()?;
                }
                if flags.contains(RenderFlags::UPDATE) {
                    rt.advance(1)?;
                    rt.text_interpolate("hi")?;
                }
                Ok(())
            })
            .build();
        let host = renderer.create_element("host", None);
        let view = rt.create_root_view(&template, Some(host), None).unwrap();
        rt.refresh_view(view).unwrap();
        assert_eq!(renderer.serialize(host), "<host><p>hi</p></host>");
    }

    #[test]
    fn test_element_container_children_precede_its_comment() {
        let (renderer, mut rt) = setup();
        let template = ViewTemplate::builder("Group", TemplateKind::Root)
            .decls(3)
            .template(|rt, flags| {
                if flags.contains(RenderFlags::CREATE) {
                    rt.element_container_start(0, None, &[])?;
                    rt.text(1, "a")?;
                    rt.text(2, "b")?;
                    rt.element_container_end()?;
                }
                Ok(())
            })
            .build();
        let host = renderer.create_element("host", None);
        rt.create_root_view(&template, Some(host), None).unwrap();
        let children = renderer.children(host);
        assert_eq!(children.len(), 3);
        assert_eq!(renderer.value(children[0]).as_deref(), Some("a"));
        assert_eq!(renderer.value(children[2]).as_deref(), Some(ELEMENT_CONTAINER_TAG));
    }
}
