//! View instances and the arena that owns them.
//!
//! Every instantiated template is a [`ViewInstance`] stored in a
//! [`ViewArena`] and referred to by [`ViewId`]. Views point at each other
//! only through ids, so a destroyed view is simply a stale key: lookups
//! through it fail instead of keeping the view alive.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use slotmap::{Key, KeyData, SlotMap};

use crate::binding::BindingValue;
use crate::directive::{DirectiveInstance, SimpleChanges};
use crate::error::{ViewError, ViewResult};
use crate::query::{QueryList, ViewQueries};
use crate::renderer::NodeHandle;
use crate::template::{TemplateSlot, ViewTemplate};

slotmap::new_key_type! {
    /// Identifier of a view instance.
    pub struct ViewId;
}

impl ViewId {
    /// Raw numeric value, for storing outside the runtime.
    #[inline]
    pub fn as_raw(self) -> u64 {
        self.data().as_ffi()
    }

    /// Rebuild an id from [`as_raw`](Self::as_raw). The view may no longer exist.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        KeyData::from_ffi(raw).into()
    }
}

/// Arbitrary context object a view's template reads from.
pub type ViewContext = Arc<dyn Any + Send + Sync>;

/// Init phase of a view: which run-once hooks are still pending.
///
/// Moves forward only, one step at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum InitPhase {
    /// `on_init` hooks have not all run.
    #[default]
    PreOrderPending,
    /// `after_content_init` and `after_view_init` hooks have not all run.
    PostOrderPending,
    /// Every run-once hook has run.
    Completed,
}

impl InitPhase {
    /// The following phase.
    pub fn next(self) -> Self {
        match self {
            Self::PreOrderPending => Self::PostOrderPending,
            Self::PostOrderPending | Self::Completed => Self::Completed,
        }
    }
}

/// Progress through the pre-order hook list of the current refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreOrderProgress {
    /// Next hook list entry to look at.
    pub next_index: usize,
    /// Run-once entries seen so far in this refresh.
    pub init_hooks_seen: usize,
}

bitflags::bitflags! {
    /// State flags of a view instance.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ViewFlags: u16 {
        /// The creation pass has not finished.
        const CREATION_MODE = 1 << 0;
        /// The view has not been refreshed yet.
        const FIRST_PASS    = 1 << 1;
        /// The view takes part in refreshes.
        const ATTACHED      = 1 << 2;
        /// The view has been destroyed.
        const DESTROYED     = 1 << 3;
        /// Refreshed every time its parent is.
        const CHECK_ALWAYS  = 1 << 4;
        /// Marked for refresh even without `CHECK_ALWAYS`.
        const DIRTY         = 1 << 5;
    }
}

/// Position of a view container: the view and the container node slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerLocation {
    /// View holding the container.
    pub view: ViewId,
    /// Node slot of the container anchor.
    pub node: usize,
}

impl ContainerLocation {
    /// Create a location.
    pub fn new(view: ViewId, node: usize) -> Self {
        Self { view, node }
    }
}

/// Where a view is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewParent {
    /// Component view inside its host view, or a detached view.
    View(ViewId),
    /// Embedded view inserted into a container.
    Container(ContainerLocation),
}

/// Views attached to a container anchor.
#[derive(Debug, Clone)]
pub struct ContainerSlot {
    /// Comment node the views are inserted before.
    pub anchor: NodeHandle,
    /// Views inserted here, in order.
    pub views: Vec<ViewId>,
    /// Views declared here but inserted into another container.
    pub moved_views: Vec<ViewId>,
}

/// State of an ICU expression in a view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IcuCaseState {
    /// Active case.
    pub case: Option<usize>,
    /// The case was just created and has not been updated yet.
    pub fresh: bool,
}

/// Content of one view slot.
#[derive(Clone, Default)]
pub enum Slot {
    /// Nothing created yet.
    #[default]
    Empty,
    /// Rendered node.
    Native(NodeHandle),
    /// Component host element and its component view.
    Component { host: NodeHandle, view: ViewId },
    /// View container.
    Container(ContainerSlot),
    /// Directive or component instance.
    Directive(DirectiveInstance),
    /// Binding value.
    Binding(BindingValue),
    /// ICU expression state.
    IcuCase(IcuCaseState),
}

impl Slot {
    /// Rendered node stored in the slot.
    pub fn native(&self) -> Option<NodeHandle> {
        match self {
            Self::Native(node) => Some(*node),
            Self::Component { host, .. } => Some(*host),
            Self::Container(container) => Some(container.anchor),
            _ => None,
        }
    }

    /// Directive instance stored in the slot.
    pub fn directive(&self) -> Option<&DirectiveInstance> {
        match self {
            Self::Directive(instance) => Some(instance),
            _ => None,
        }
    }

    fn blueprint(slot: &TemplateSlot) -> Self {
        match slot {
            TemplateSlot::Binding | TemplateSlot::HostVar => Self::Binding(BindingValue::Unset),
            _ => Self::Empty,
        }
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Native(node) => write!(f, "Native({node:?})"),
            Self::Component { host, view } => write!(f, "Component({host:?}, {view:?})"),
            Self::Container(c) => write!(f, "Container({} views)", c.views.len()),
            Self::Directive(_) => f.write_str("Directive"),
            Self::Binding(value) => write!(f, "Binding({value})"),
            Self::IcuCase(state) => write!(f, "IcuCase({:?})", state.case),
        }
    }
}

/// One instantiation of a [`ViewTemplate`].
pub struct ViewInstance {
    pub(crate) template: ViewTemplate,
    pub(crate) flags: ViewFlags,
    pub(crate) init_phase: InitPhase,
    pub(crate) index_within_phase: usize,
    pub(crate) pre_order: PreOrderProgress,
    pub(crate) slots: Vec<Slot>,
    pub(crate) parent: Option<ViewParent>,
    pub(crate) declaration_view: Option<ViewId>,
    pub(crate) declaration_node: Option<usize>,
    pub(crate) declaration_container: Option<ContainerLocation>,
    pub(crate) host: Option<NodeHandle>,
    pub(crate) context: Option<ViewContext>,
    pub(crate) queries: Option<ViewQueries>,
    pub(crate) cleanup: Vec<Arc<QueryList>>,
    pub(crate) pending_changes: HashMap<usize, SimpleChanges>,
    pub(crate) input_values: HashMap<(usize, String), BindingValue>,
}

impl ViewInstance {
    /// Create an instance with the template's current slot layout.
    pub(crate) fn new(template: ViewTemplate, context: Option<ViewContext>) -> Self {
        let slots = template.read().slots.iter().map(Slot::blueprint).collect();
        Self {
            template,
            flags: ViewFlags::CREATION_MODE
                | ViewFlags::FIRST_PASS
                | ViewFlags::ATTACHED
                | ViewFlags::CHECK_ALWAYS
                | ViewFlags::DIRTY,
            init_phase: InitPhase::default(),
            index_within_phase: 0,
            pre_order: PreOrderProgress::default(),
            slots,
            parent: None,
            declaration_view: None,
            declaration_node: None,
            declaration_container: None,
            host: None,
            context,
            queries: None,
            cleanup: Vec::new(),
            pending_changes: HashMap::new(),
            input_values: HashMap::new(),
        }
    }

    /// Template of the view.
    pub fn template(&self) -> &ViewTemplate {
        &self.template
    }

    /// State flags.
    pub fn flags(&self) -> ViewFlags {
        self.flags
    }

    /// Whether the creation pass is still running.
    pub fn is_creation_mode(&self) -> bool {
        self.flags.contains(ViewFlags::CREATION_MODE)
    }

    /// Current init phase.
    pub fn init_phase(&self) -> InitPhase {
        self.init_phase
    }

    /// Pre-order hook progress.
    pub fn pre_order_progress(&self) -> PreOrderProgress {
        self.pre_order
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the view has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot at `index`.
    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    /// Where the view is attached.
    pub fn parent(&self) -> Option<ViewParent> {
        self.parent
    }

    /// View the template was declared in.
    pub fn declaration_view(&self) -> Option<ViewId> {
        self.declaration_view
    }

    /// Container the view was created for.
    pub fn declaration_container(&self) -> Option<ContainerLocation> {
        self.declaration_container
    }

    /// Host element of a component or root view.
    pub fn host(&self) -> Option<NodeHandle> {
        self.host
    }

    /// Context object.
    pub fn context(&self) -> Option<&ViewContext> {
        self.context.as_ref()
    }

    /// Container at the node slot.
    pub fn container(&self, node: usize) -> Option<&ContainerSlot> {
        match self.slots.get(node) {
            Some(Slot::Container(container)) => Some(container),
            _ => None,
        }
    }

    pub(crate) fn container_mut(&mut self, node: usize) -> Option<&mut ContainerSlot> {
        match self.slots.get_mut(node) {
            Some(Slot::Container(container)) => Some(container),
            _ => None,
        }
    }

    /// Grow the slot vector to the template's layout after expando slots
    /// were allocated during the first creation pass.
    pub(crate) fn sync_layout(&mut self) {
        let data = self.template.read();
        let len = self.slots.len();
        if data.slots.len() > len {
            self.slots
                .extend(data.slots[len..].iter().map(Slot::blueprint));
        }
    }
}

impl fmt::Debug for ViewInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewInstance")
            .field("template", &self.template.name())
            .field("flags", &self.flags)
            .field("init_phase", &self.init_phase)
            .field("slots", &self.slots)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

/// Arena of view instances.
#[derive(Debug, Default)]
pub struct ViewArena {
    views: SlotMap<ViewId, ViewInstance>,
}

impl ViewArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a view.
    pub fn insert(&mut self, view: ViewInstance) -> ViewId {
        self.views.insert(view)
    }

    /// Remove a view.
    pub fn remove(&mut self, id: ViewId) -> Option<ViewInstance> {
        self.views.remove(id)
    }

    /// Whether the view exists.
    pub fn contains(&self, id: ViewId) -> bool {
        self.views.contains_key(id)
    }

    /// Number of live views.
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Whether the arena holds no views.
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Look up a view.
    pub fn get(&self, id: ViewId) -> ViewResult<&ViewInstance> {
        self.views.get(id).ok_or(ViewError::InvalidView(id))
    }

    /// Look up a view for mutation.
    pub fn get_mut(&mut self, id: ViewId) -> ViewResult<&mut ViewInstance> {
        self.views.get_mut(id).ok_or(ViewError::InvalidView(id))
    }

    /// Ids of views with no parent.
    pub fn roots(&self) -> Vec<ViewId> {
        self.views
            .iter()
            .filter(|(_, v)| v.parent.is_none())
            .map(|(id, _)| id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateKind;

    fn template() -> ViewTemplate {
        ViewTemplate::builder("Test", TemplateKind::Root)
            .decls(1)
            .vars(2)
            .build()
    }

    #[test]
    fn test_new_view_follows_blueprint() {
        let view = ViewInstance::new(template(), None);
        assert_eq!(view.len(), 3);
        assert!(matches!(view.slot(0), Some(Slot::Empty)));
        assert!(matches!(view.slot(1), Some(Slot::Binding(BindingValue::Unset))));
        assert!(view.is_creation_mode());
        assert_eq!(view.init_phase(), InitPhase::PreOrderPending);
    }

    #[test]
    fn test_init_phase_moves_forward() {
        assert_eq!(InitPhase::PreOrderPending.next(), InitPhase::PostOrderPending);
        assert_eq!(InitPhase::PostOrderPending.next(), InitPhase::Completed);
        assert_eq!(InitPhase::Completed.next(), InitPhase::Completed);
        assert!(InitPhase::PreOrderPending < InitPhase::Completed);
    }

    #[test]
    fn test_stale_id_is_an_error() {
        let mut arena = ViewArena::new();
        let id = arena.insert(ViewInstance::new(template(), None));
        assert!(arena.get(id).is_ok());
        arena.remove(id);
        assert!(matches!(arena.get(id), Err(ViewError::InvalidView(_))));
        assert_eq!(ViewId::from_raw(id.as_raw()), id);
    }

    #[test]
    fn test_sync_layout() {
        let tpl = template();
        let mut view = ViewInstance::new(tpl.clone(), None);
        tpl.write().alloc_expando(TemplateSlot::HostVar, 1);
        view.sync_layout();
        assert_eq!(view.len(), 4);
        assert!(matches!(view.slot(3), Some(Slot::Binding(_))));
    }
}
