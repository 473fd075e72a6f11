//! Traversal frame stack.
//!
//! Instructions do not receive the view they operate on. They read it from
//! the top [`Frame`] of the [`FrameStack`]: the view, its template, the node
//! cursor, the binding cursor and the other per-view scratch values.
//!
//! Frames are pooled. The stack is a chain of frames linked by index through
//! `parent`/`child`; entering a view reuses the current top's `child` when
//! one was allocated by an earlier traversal, so steady-state rendering does
//! not allocate. Leaving a view resets every field of the popped frame before
//! it goes back to the pool. The bottom frame is a sentinel that is never
//! bound to a view.
//!
//! Entering a view while another is active is normal: a lifecycle hook may
//! render another view synchronously. All accessors read the current top.

use crate::renderer::Namespace;
use crate::template::ViewTemplate;
use crate::view::{ViewArena, ViewId};

/// Per-view traversal state.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    view: Option<ViewId>,
    template: Option<ViewTemplate>,
    current_node: Option<usize>,
    is_parent: bool,
    selected_index: Option<usize>,
    context_view: Option<ViewId>,
    element_depth: usize,
    namespace: Option<Namespace>,
    current_directive_index: Option<usize>,
    binding_root_index: Option<usize>,
    binding_index: usize,
    current_query_index: usize,
    in_i18n: bool,
    parent: Option<usize>,
    child: Option<usize>,
}

impl Frame {
    fn new(parent: Option<usize>) -> Self {
        Self {
            is_parent: true,
            parent,
            ..Default::default()
        }
    }

    /// Whether every traversal field holds its default value.
    fn is_clean(&self) -> bool {
        self.view.is_none()
            && self.template.is_none()
            && self.current_node.is_none()
            && self.selected_index.is_none()
            && self.context_view.is_none()
            && self.element_depth == 0
            && self.namespace.is_none()
            && self.current_directive_index.is_none()
            && self.binding_root_index.is_none()
            && self.binding_index == 0
            && self.current_query_index == 0
            && !self.in_i18n
    }

    fn reset(&mut self) {
        self.view = None;
        self.template = None;
        self.current_node = None;
        self.is_parent = true;
        self.selected_index = None;
        self.context_view = None;
        self.element_depth = 0;
        self.namespace = None;
        self.current_directive_index = None;
        self.binding_root_index = None;
        self.binding_index = 0;
        self.current_query_index = 0;
        self.in_i18n = false;
    }
}

/// Pooled stack of traversal frames plus the instruction-wide flags.
#[derive(Debug)]
pub struct FrameStack {
    frames: Vec<Frame>,
    top: usize,
    bindings_enabled: bool,
    check_no_changes: bool,
    last_node_created: bool,
}

impl Default for FrameStack {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameStack {
    /// Create a stack holding only the sentinel frame.
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::new(None)],
            top: 0,
            bindings_enabled: true,
            check_no_changes: false,
            last_node_created: true,
        }
    }

    /// Number of frames above the sentinel.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.top;
        while let Some(parent) = self.frames[current].parent {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// Number of frames ever allocated, sentinel included.
    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    fn alloc(&mut self) -> usize {
        if let Some(child) = self.frames[self.top].child {
            debug_assert!(
                self.frames[child].is_clean(),
                "reused traversal frame holds state from a previous traversal"
            );
            return child;
        }
        let index = self.frames.len();
        self.frames.push(Frame::new(Some(self.top)));
        self.frames[self.top].child = Some(index);
        index
    }

    fn top(&self) -> &Frame {
        &self.frames[self.top]
    }

    fn top_mut(&mut self) -> &mut Frame {
        &mut self.frames[self.top]
    }

    /// Push a frame bound to `view`.
    pub fn enter(&mut self, view: ViewId, template: &ViewTemplate) {
        let index = self.alloc();
        let first_child = template.read().first_child;
        let frame = &mut self.frames[index];
        frame.current_node = first_child;
        frame.is_parent = true;
        frame.binding_index = template.binding_start();
        frame.view = Some(view);
        frame.template = Some(template.clone());
        frame.context_view = Some(view);
        self.top = index;
    }

    /// Pop the current frame, resetting all of its fields.
    pub fn leave(&mut self) {
        let Some(parent) = self.top().parent else {
            debug_assert!(false, "leave() called without a matching enter()");
            return;
        };
        self.top_mut().reset();
        self.top = parent;
    }

    /// Push a reduced frame positioned at `node` of `view`, for capability
    /// lookup.
    ///
    /// With `skip_self` the frame is positioned at the node's parent instead.
    /// When the parent chain of the template is exhausted, the lookup
    /// continues from the node the view was declared at (the container of an
    /// embedded view, the host of a component view) in the declaring view,
    /// until an element or element container is reached. Returns `false`
    /// without pushing when there is no such ancestor.
    pub fn enter_light(
        &mut self,
        views: &ViewArena,
        view: ViewId,
        node: Option<usize>,
        skip_self: bool,
    ) -> bool {
        let mut target_view = view;
        let mut target_node = node;
        if skip_self {
            loop {
                let Ok(instance) = views.get(target_view) else {
                    return false;
                };
                let parent = target_node
                    .and_then(|n| instance.template.read().node(n).and_then(|n| n.parent));
                if parent.is_some() {
                    target_node = parent;
                    break;
                }
                let (Some(declaration_node), Some(declaration_view)) =
                    (instance.declaration_node, instance.declaration_view)
                else {
                    target_node = None;
                    break;
                };
                target_node = Some(declaration_node);
                target_view = declaration_view;
                let element_like = views
                    .get(declaration_view)
                    .ok()
                    .and_then(|v| v.template.read().node(declaration_node).map(|n| n.kind))
                    .is_some_and(|kind| kind.is_element_like());
                if element_like {
                    break;
                }
            }
            if target_node.is_none() {
                return false;
            }
        }

        let Ok(instance) = views.get(target_view) else {
            return false;
        };
        let template = instance.template.clone();
        let index = self.alloc();
        let frame = &mut self.frames[index];
        frame.current_node = target_node;
        frame.view = Some(target_view);
        frame.template = Some(template);
        self.top = index;
        true
    }

    /// Pop a frame pushed by [`enter_light`](Self::enter_light), clearing only
    /// the cursor and the view.
    pub fn leave_light(&mut self) {
        let Some(parent) = self.top().parent else {
            debug_assert!(false, "leave_light() called without a matching enter_light()");
            return;
        };
        let frame = self.top_mut();
        frame.current_node = None;
        frame.view = None;
        frame.template = None;
        self.top = parent;
    }

    /// View of the current frame.
    pub fn view(&self) -> Option<ViewId> {
        self.top().view
    }

    /// Template of the current frame.
    pub fn template(&self) -> Option<&ViewTemplate> {
        self.top().template.as_ref()
    }

    /// View that context lookups start from.
    pub fn context_view(&self) -> Option<ViewId> {
        self.top().context_view
    }

    /// Set the context view.
    pub fn set_context_view(&mut self, view: ViewId) {
        self.top_mut().context_view = Some(view);
    }

    /// Move the context view `level` declaration views up and return it.
    ///
    /// Leaves the context view unchanged and returns `None` when the chain
    /// is shorter than `level`.
    pub fn next_context(&mut self, views: &ViewArena, level: usize) -> Option<ViewId> {
        let mut view = self.top().context_view?;
        for _ in 0..level {
            view = views.get(view).ok()?.declaration_view?;
        }
        self.top_mut().context_view = Some(view);
        Some(view)
    }

    /// Node cursor.
    pub fn current_node(&self) -> Option<usize> {
        self.top().current_node
    }

    /// Whether the cursor node is the parent of the next node, as opposed to
    /// its previous sibling.
    pub fn is_current_node_parent(&self) -> bool {
        self.top().is_parent
    }

    /// Move the cursor.
    pub fn set_current_node(&mut self, node: Option<usize>, is_parent: bool) {
        let frame = self.top_mut();
        frame.current_node = node;
        frame.is_parent = is_parent;
    }

    /// Mark the cursor node as a previous sibling.
    pub fn set_current_node_as_not_parent(&mut self) {
        self.top_mut().is_parent = false;
    }

    /// Binding cursor.
    pub fn binding_index(&self) -> usize {
        self.top().binding_index
    }

    /// Set the binding cursor.
    pub fn set_binding_index(&mut self, index: usize) -> usize {
        self.top_mut().binding_index = index;
        index
    }

    /// Return the binding cursor and advance it by one.
    pub fn next_binding_index(&mut self) -> usize {
        let frame = self.top_mut();
        let index = frame.binding_index;
        frame.binding_index += 1;
        index
    }

    /// Return the binding cursor and advance it by `count`.
    pub fn increment_binding_index(&mut self, count: usize) -> usize {
        let frame = self.top_mut();
        let index = frame.binding_index;
        frame.binding_index += count;
        index
    }

    /// First binding slot of the bindings being processed. Defaults to the
    /// template's binding start.
    pub fn binding_root(&mut self) -> usize {
        let frame = self.top_mut();
        if let Some(root) = frame.binding_root_index {
            return root;
        }
        let root = frame.template.as_ref().map_or(0, ViewTemplate::binding_start);
        frame.binding_root_index = Some(root);
        root
    }

    /// Point the binding cursor at a directive's host bindings.
    pub fn set_binding_root_for_host_bindings(&mut self, root: usize, directive: usize) {
        let frame = self.top_mut();
        frame.binding_index = root;
        frame.binding_root_index = Some(root);
        frame.current_directive_index = Some(directive);
    }

    /// Selected node, the target of property instructions.
    pub fn selected_index(&self) -> Option<usize> {
        self.top().selected_index
    }

    /// Select a node. The index must lie inside the view.
    pub fn set_selected_index(&mut self, index: Option<usize>, view_len: usize) {
        debug_assert!(
            index.is_none_or(|i| i < view_len),
            "selected index {index:?} is out of bounds for a view of length {view_len}"
        );
        self.top_mut().selected_index = index;
    }

    /// Directive whose host bindings are executing.
    pub fn current_directive_index(&self) -> Option<usize> {
        self.top().current_directive_index
    }

    /// Set the active directive.
    pub fn set_current_directive_index(&mut self, index: Option<usize>) {
        self.top_mut().current_directive_index = index;
    }

    /// Query cursor.
    pub fn current_query_index(&self) -> usize {
        self.top().current_query_index
    }

    /// Set the query cursor.
    pub fn set_current_query_index(&mut self, index: usize) {
        self.top_mut().current_query_index = index;
    }

    /// Element nesting depth of the creation pass.
    pub fn element_depth(&self) -> usize {
        self.top().element_depth
    }

    /// Enter an element.
    pub fn increase_element_depth(&mut self) {
        self.top_mut().element_depth += 1;
    }

    /// Leave an element.
    pub fn decrease_element_depth(&mut self) {
        let frame = self.top_mut();
        debug_assert!(frame.element_depth > 0, "element depth underflow");
        frame.element_depth = frame.element_depth.saturating_sub(1);
    }

    /// Namespace for created elements.
    pub fn namespace(&self) -> Option<Namespace> {
        self.top().namespace
    }

    /// Create SVG elements from now on.
    pub fn namespace_svg(&mut self) {
        self.top_mut().namespace = Some(Namespace::Svg);
    }

    /// Create MathML elements from now on.
    pub fn namespace_math_ml(&mut self) {
        self.top_mut().namespace = Some(Namespace::MathMl);
    }

    /// Create plain elements from now on.
    pub fn namespace_html(&mut self) {
        self.top_mut().namespace = None;
    }

    /// Whether translated content is being created.
    pub fn in_i18n(&self) -> bool {
        self.top().in_i18n
    }

    /// Set the translated-content flag.
    pub fn set_in_i18n(&mut self, in_i18n: bool) {
        self.top_mut().in_i18n = in_i18n;
    }

    /// Whether binding instructions take effect.
    pub fn bindings_enabled(&self) -> bool {
        self.bindings_enabled
    }

    /// Enable binding instructions.
    pub fn enable_bindings(&mut self) {
        self.bindings_enabled = true;
    }

    /// Disable binding instructions, for subtrees marked as not bindable.
    pub fn disable_bindings(&mut self) {
        self.bindings_enabled = false;
    }

    /// Whether the check-no-changes verification pass is running.
    pub fn is_check_no_changes(&self) -> bool {
        self.check_no_changes
    }

    /// Enter or leave the check-no-changes pass.
    pub fn set_check_no_changes(&mut self, mode: bool) {
        self.check_no_changes = mode;
    }

    /// Whether the last node instruction created a node instead of reusing one.
    pub fn was_last_node_created(&self) -> bool {
        self.last_node_created
    }

    /// Record whether the last node instruction created a node.
    pub fn set_last_node_created(&mut self, created: bool) {
        self.last_node_created = created;
    }
}
