//! Reverse lookup from rendered nodes and directive instances to the view
//! slot they belong to.
//!
//! Creating a node or a directive instance records a patch: the id of the
//! view that created it. Patches never keep views alive; a patch to a
//! destroyed view is simply not found. The first successful lookup replaces
//! the view patch by a [`NodeContext`] that is shared by the node and every
//! directive on it, so later lookups are a single map access.
//!
//! Lookups are meant for debugging tools and event plumbing, not for the
//! render path.

use std::collections::HashMap;

use slotmap::{new_key_type, SlotMap};

use crate::directive::{instance_address, same_instance, DirectiveInstance};
use crate::error::{ViewError, ViewResult};
use crate::logging::targets;
use crate::query::{ElementRef, QueryResult};
use crate::renderer::NodeHandle;
use crate::runtime::Runtime;
use crate::template::TemplateData;
use crate::view::{Slot, ViewId};

new_key_type! {
    /// Identifier of a memoized [`NodeContext`].
    pub struct ContextId;
}

/// Something the runtime created and can be looked up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchTarget {
    /// A rendered node.
    Node(NodeHandle),
    /// A directive or component instance, by address.
    Instance(usize),
}

impl PatchTarget {
    /// Target for a directive instance.
    pub fn instance(instance: &DirectiveInstance) -> Self {
        Self::Instance(instance_address(instance))
    }
}

/// What a patch points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchedData {
    /// The view that created the target; the slot is not known yet.
    View(ViewId),
    /// A resolved context.
    Context(ContextId),
}

/// Resolved location of a node and the instances attached to it.
#[derive(Clone)]
pub struct NodeContext {
    /// View holding the node.
    pub view: ViewId,
    /// Node slot.
    pub node_index: usize,
    /// Rendered node.
    pub native: Option<NodeHandle>,
    /// Component instance hosted by the node, once looked up.
    pub component: Option<DirectiveInstance>,
    /// Directive instances on the node, once looked up.
    pub directives: Option<Vec<DirectiveInstance>>,
}

impl std::fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext")
            .field("view", &self.view)
            .field("node_index", &self.node_index)
            .field("native", &self.native)
            .field("component", &self.component.is_some())
            .field("directives", &self.directives.as_ref().map(Vec::len))
            .finish()
    }
}

/// What to look up.
#[derive(Clone, Copy)]
pub enum DiscoveryTarget<'a> {
    /// A rendered node.
    Node(NodeHandle),
    /// A component instance.
    Component(&'a DirectiveInstance),
    /// A directive instance that is not a component.
    Directive(&'a DirectiveInstance),
}

impl DiscoveryTarget<'_> {
    fn key(&self) -> PatchTarget {
        match self {
            Self::Node(node) => PatchTarget::Node(*node),
            Self::Component(instance) | Self::Directive(instance) => PatchTarget::instance(instance),
        }
    }
}

/// Patch table and memoized contexts of one runtime.
#[derive(Debug, Default)]
pub struct ContextIndex {
    patches: HashMap<PatchTarget, PatchedData>,
    contexts: SlotMap<ContextId, NodeContext>,
}

impl ContextIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record what `target` points at, replacing any previous patch.
    pub fn attach(&mut self, target: PatchTarget, data: PatchedData) {
        self.patches.insert(target, data);
    }

    /// The patch recorded for `target`.
    pub fn read(&self, target: &PatchTarget) -> Option<PatchedData> {
        self.patches.get(target).copied()
    }

    /// A memoized context.
    pub fn context(&self, id: ContextId) -> Option<&NodeContext> {
        self.contexts.get(id)
    }

    /// Number of patched targets.
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Whether nothing is patched.
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    fn insert_context(&mut self, context: NodeContext) -> ContextId {
        self.contexts.insert(context)
    }

    fn context_mut(&mut self, id: ContextId) -> Option<&mut NodeContext> {
        self.contexts.get_mut(id)
    }

    fn view_of(&self, data: PatchedData) -> Option<ViewId> {
        match data {
            PatchedData::View(view) => Some(view),
            PatchedData::Context(id) => self.contexts.get(id).map(|c| c.view),
        }
    }

    /// Drop every patch and context belonging to `view`.
    pub fn forget_view(&mut self, view: ViewId) {
        self.contexts.retain(|_, context| context.view != view);
        let contexts = &self.contexts;
        self.patches.retain(|_, data| match data {
            PatchedData::View(v) => *v != view,
            PatchedData::Context(id) => contexts.contains_key(*id),
        });
    }
}

/// Next node in a depth-first walk of the template's node tree.
fn traverse_next_element(data: &TemplateData, node: usize) -> Option<usize> {
    let current = data.node(node)?;
    if let Some(child) = current.child {
        return Some(child);
    }
    if let Some(next) = current.next {
        return Some(next);
    }
    let mut parent = current.parent;
    while let Some(index) = parent {
        let ancestor = data.node(index)?;
        if let Some(next) = ancestor.next {
            return Some(next);
        }
        parent = ancestor.parent;
    }
    None
}

impl Runtime {
    /// Find the view and node slot `target` belongs to.
    ///
    /// Returns `Ok(None)` when the target is unknown or its view has been
    /// destroyed. A component or directive instance that is patched but
    /// cannot be found in its view is an error.
    pub fn resolve_context(&mut self, target: DiscoveryTarget<'_>) -> ViewResult<Option<NodeContext>> {
        let key = target.key();
        match self.contexts.read(&key) {
            Some(PatchedData::Context(id)) => Ok(self.contexts.context(id).cloned()),
            Some(PatchedData::View(view)) => {
                if !self.views.contains(view) {
                    return Ok(None);
                }
                let node_index = match target {
                    DiscoveryTarget::Component(instance) => self
                        .find_via_component(view, instance)?
                        .ok_or(ViewError::ComponentNotFound(view))?,
                    DiscoveryTarget::Directive(instance) => self
                        .find_via_directive(view, instance)?
                        .ok_or(ViewError::DirectiveNotFound(view))?,
                    DiscoveryTarget::Node(native) => match self.find_via_native(view, native)? {
                        Some(index) => index,
                        None => return Ok(None),
                    },
                };
                let id = self.memoize_context(view, node_index)?;
                match target {
                    DiscoveryTarget::Component(instance) => {
                        if let Some(context) = self.contexts.context_mut(id) {
                            context.component = Some(instance.clone());
                        }
                        self.contexts.attach(key, PatchedData::Context(id));
                    }
                    DiscoveryTarget::Directive(_) => {
                        let directives = self.directives_at_node(view, node_index)?;
                        for directive in &directives {
                            self.contexts
                                .attach(PatchTarget::instance(directive), PatchedData::Context(id));
                        }
                        if let Some(context) = self.contexts.context_mut(id) {
                            context.directives = Some(directives);
                        }
                    }
                    DiscoveryTarget::Node(_) => {}
                }
                Ok(self.contexts.context(id).cloned())
            }
            None => {
                let DiscoveryTarget::Node(native) = target else {
                    return Ok(None);
                };
                self.resolve_via_ancestors(native)
            }
        }
    }

    /// The node was never patched, e.g. it was created by a renderer
    /// directly. Walk up the rendered tree until a patched ancestor reveals
    /// the view, then search that view.
    fn resolve_via_ancestors(&mut self, native: NodeHandle) -> ViewResult<Option<NodeContext>> {
        let mut parent = self.renderer.parent_node(native);
        while let Some(ancestor) = parent {
            if let Some(data) = self.contexts.read(&PatchTarget::Node(ancestor)) {
                let Some(view) = self.contexts.view_of(data).filter(|v| self.views.contains(*v)) else {
                    return Ok(None);
                };
                if let Some(index) = self.find_via_native(view, native)? {
                    let id = self.memoize_context(view, index)?;
                    return Ok(self.contexts.context(id).cloned());
                }
            }
            parent = self.renderer.parent_node(ancestor);
        }
        tracing::trace!(target: targets::CONTEXT, ?native, "node has no patched ancestor");
        Ok(None)
    }

    fn memoize_context(&mut self, view: ViewId, node_index: usize) -> ViewResult<ContextId> {
        let native = self.views.get(view)?.slot(node_index).and_then(Slot::native);
        let existing = native
            .and_then(|n| self.contexts.read(&PatchTarget::Node(n)))
            .and_then(|data| match data {
                PatchedData::Context(id) => Some(id),
                PatchedData::View(_) => None,
            });
        let id = match existing {
            Some(id) => id,
            None => self.contexts.insert_context(NodeContext {
                view,
                node_index,
                native,
                component: None,
                directives: None,
            }),
        };
        if let Some(native) = native {
            self.contexts.attach(PatchTarget::Node(native), PatchedData::Context(id));
        }
        tracing::trace!(target: targets::CONTEXT, ?view, node_index, "context resolved");
        Ok(id)
    }

    fn find_via_component(&self, view: ViewId, instance: &DirectiveInstance) -> ViewResult<Option<usize>> {
        let template = self.views.get(view)?.template.clone();
        let data = template.read();
        let mut hosts = data.components.clone();
        if hosts.is_empty() {
            hosts.extend(data.first_child);
        }
        for host in hosts {
            if self.component_at_node(view, host)?.is_some_and(|c| same_instance(&c, instance)) {
                return Ok(Some(host));
            }
        }
        Ok(None)
    }

    fn find_via_directive(&self, view: ViewId, instance: &DirectiveInstance) -> ViewResult<Option<usize>> {
        let target = self.views.get(view)?;
        let data = target.template.read();
        let mut node = data.first_child;
        while let Some(index) = node {
            if let Some(current) = data.node(index) {
                let found = (current.directive_start..current.directive_end).any(|slot| {
                    target
                        .slot(slot)
                        .and_then(Slot::directive)
                        .is_some_and(|d| same_instance(d, instance))
                });
                if found {
                    return Ok(Some(index));
                }
            }
            node = traverse_next_element(&data, index);
        }
        Ok(None)
    }

    fn find_via_native(&self, view: ViewId, native: NodeHandle) -> ViewResult<Option<usize>> {
        let target = self.views.get(view)?;
        let decls = target.template.binding_start();
        Ok((0..decls).find(|&i| target.slot(i).and_then(Slot::native) == Some(native)))
    }

    /// The component hosted by node `index` of `view`.
    pub fn component_at_node(&self, view: ViewId, index: usize) -> ViewResult<Option<DirectiveInstance>> {
        let target = self.views.get(view)?;
        let slot = target.template.read().node(index).and_then(|n| n.component_slot());
        Ok(slot
            .and_then(|slot| target.slot(slot))
            .and_then(Slot::directive)
            .cloned())
    }

    /// Directive instances on node `index` of `view`, excluding the
    /// component.
    pub fn directives_at_node(&self, view: ViewId, index: usize) -> ViewResult<Vec<DirectiveInstance>> {
        let target = self.views.get(view)?;
        let data = target.template.read();
        let Some(node) = data.node(index) else {
            return Ok(Vec::new());
        };
        let component = node.component_slot();
        Ok((node.directive_start..node.directive_end)
            .filter(|slot| Some(*slot) != component)
            .filter_map(|slot| target.slot(slot).and_then(Slot::directive).cloned())
            .collect())
    }

    /// Local references declared on node `index` of `view`.
    pub fn local_refs(&self, view: ViewId, index: usize) -> ViewResult<Vec<(String, QueryResult)>> {
        let target = self.views.get(view)?;
        let names = target
            .template
            .read()
            .node(index)
            .map(|n| n.local_names.clone())
            .unwrap_or_default();
        let mut refs = Vec::with_capacity(names.len());
        for (name, slot) in names {
            let value = match slot {
                None if target.container(index).is_some() => self.template_ref(view, index)?,
                None => QueryResult::Element(ElementRef {
                    view,
                    node: index,
                    native: target.slot(index).and_then(Slot::native),
                }),
                Some(slot) => match target.slot(slot).and_then(Slot::directive) {
                    Some(instance) => QueryResult::Instance(instance.clone()),
                    None => continue,
                },
            };
            refs.push((name, value));
        }
        Ok(refs)
    }

    /// The component view of a component instance.
    pub fn component_view_by_instance(&mut self, instance: &DirectiveInstance) -> ViewResult<Option<ViewId>> {
        let Some(context) = self.resolve_context(DiscoveryTarget::Component(instance))? else {
            return Ok(None);
        };
        Ok(match self.views.get(context.view)?.slot(context.node_index) {
            Some(Slot::Component { view, .. }) => Some(*view),
            _ => None,
        })
    }

    /// The component hosted by a rendered node.
    pub fn get_component(&mut self, node: NodeHandle) -> ViewResult<Option<DirectiveInstance>> {
        let Some(context) = self.resolve_context(DiscoveryTarget::Node(node))? else {
            return Ok(None);
        };
        if let Some(component) = context.component {
            return Ok(Some(component));
        }
        let component = self.component_at_node(context.view, context.node_index)?;
        if let (Some(found), Some(native)) = (&component, context.native) {
            if let Some(PatchedData::Context(id)) = self.contexts.read(&PatchTarget::Node(native)) {
                if let Some(ctx) = self.contexts.context_mut(id) {
                    ctx.component = Some(found.clone());
                }
                self.contexts.attach(PatchTarget::instance(found), PatchedData::Context(id));
            }
        }
        Ok(component)
    }

    /// The non-component directives on a rendered node.
    pub fn get_directives(&mut self, node: NodeHandle) -> ViewResult<Vec<DirectiveInstance>> {
        let Some(context) = self.resolve_context(DiscoveryTarget::Node(node))? else {
            return Ok(Vec::new());
        };
        if let Some(directives) = context.directives {
            return Ok(directives);
        }
        let directives = self.directives_at_node(context.view, context.node_index)?;
        if let Some(native) = context.native {
            if let Some(PatchedData::Context(id)) = self.contexts.read(&PatchTarget::Node(native)) {
                if let Some(ctx) = self.contexts.context_mut(id) {
                    ctx.directives = Some(directives.clone());
                }
            }
        }
        Ok(directives)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeKind, TemplateNode};
    use crate::template::{TemplateKind, TemplateSlot, ViewTemplate};

    #[test]
    fn test_attach_and_forget() {
        let mut index = ContextIndex::new();
        let mut views: SlotMap<ViewId, ()> = SlotMap::with_key();
        let a = views.insert(());
        let b = views.insert(());
        let node = NodeHandle::from_raw(1 | (1 << 32));
        index.attach(PatchTarget::Node(node), PatchedData::View(a));
        index.attach(PatchTarget::Instance(42), PatchedData::View(b));
        assert_eq!(index.read(&PatchTarget::Node(node)), Some(PatchedData::View(a)));

        index.forget_view(a);
        assert_eq!(index.read(&PatchTarget::Node(node)), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_forget_drops_context_patches() {
        let mut index = ContextIndex::new();
        let mut views: SlotMap<ViewId, ()> = SlotMap::with_key();
        let view = views.insert(());
        let id = index.insert_context(NodeContext {
            view,
            node_index: 0,
            native: None,
            component: None,
            directives: None,
        });
        index.attach(PatchTarget::Instance(7), PatchedData::Context(id));
        assert_eq!(index.view_of(PatchedData::Context(id)), Some(view));
        index.forget_view(view);
        assert!(index.is_empty());
        assert!(index.context(id).is_none());
    }

    #[test]
    fn test_traverse_next_element_is_depth_first() {
        // 0 -> (1 -> 2), 3
        let tpl = ViewTemplate::builder("Walk", TemplateKind::Root).decls(4).build();
        {
            let mut data = tpl.write();
            let mut nodes: Vec<TemplateNode> = (0..4)
                .map(|i| TemplateNode::new(i, NodeKind::Element, Some("div".into()), None))
                .collect();
            nodes[0].child = Some(1);
            nodes[0].next = Some(3);
            nodes[1].parent = Some(0);
            nodes[1].child = Some(2);
            nodes[2].parent = Some(1);
            for (i, node) in nodes.into_iter().enumerate() {
                data.slots[i] = TemplateSlot::Node(node);
            }
            data.first_child = Some(0);
        }
        let data = tpl.read();
        let mut order = vec![0];
        let mut node = Some(0);
        while let Some(next) = node.and_then(|n| traverse_next_element(&data, n)) {
            order.push(next);
            node = Some(next);
        }
        assert_eq!(order, vec![0, 1, 2, 3]);
    }
}
