//! Lifecycle hook registration and scheduling.
//!
//! Hooks are registered once per template, during its first creation pass,
//! into seven flat lists kept in [`TemplateData`]:
//!
//! | List | Contents |
//! |------|----------|
//! | pre-order | `on_changes`, `on_init` (once), `do_check` |
//! | pre-order check | `on_changes`, `do_check` |
//! | content | `after_content_init` (once), `after_content_checked` |
//! | content check | `after_content_checked` |
//! | view | `after_view_init` (once), `after_view_checked` |
//! | view check | `after_view_checked` |
//! | destroy | `on_destroy` |
//!
//! Pre-order lists interleave [`HookEntry::Node`] markers so that a refresh
//! can run the hooks of nodes before `k` while the template is positioned at
//! node `k`, then resume later from the saved cursor. Post-order lists are
//! filled when a node ends, so the hooks of nested content always precede the
//! hooks of its host.
//!
//! Run-once hooks are guarded by the view's [`InitPhase`] and two counters:
//! the number of run-once entries seen during this refresh and the number
//! already fired in the current phase. A hook may synchronously refresh the
//! same view again; the counters make sure neither pass fires a run-once
//! hook that the other already fired.

use crate::directive::{LifecycleHook, LifecycleHooks};
use crate::error::{ViewError, ViewResult};
use crate::logging::{span_names, targets};
use crate::runtime::Runtime;
use crate::template::TemplateData;
use crate::view::{InitPhase, PreOrderProgress, ViewId};

/// One entry of a hook list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEntry {
    /// The following entries belong to this node.
    Node(usize),
    /// Call `hook` on the directive in slot `directive`.
    Hook {
        directive: usize,
        hook: LifecycleHook,
    },
}

/// Selects one of a template's hook lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookList {
    PreOrder,
    PreOrderCheck,
    Content,
    ContentCheck,
    View,
    ViewCheck,
    Destroy,
}

impl HookList {
    /// The entries of this list in `data`.
    pub fn entries(self, data: &TemplateData) -> &[HookEntry] {
        match self {
            Self::PreOrder => &data.pre_order_hooks,
            Self::PreOrderCheck => &data.pre_order_check_hooks,
            Self::Content => &data.content_hooks,
            Self::ContentCheck => &data.content_check_hooks,
            Self::View => &data.view_hooks,
            Self::ViewCheck => &data.view_check_hooks,
            Self::Destroy => &data.destroy_hooks,
        }
    }
}

/// How much of a hook list to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookBoundary {
    /// The whole list from the start.
    All,
    /// From the saved cursor to the end.
    Remaining,
    /// From the saved cursor up to, excluding, the hooks of node `k`.
    Before(usize),
}

fn last_node_marker(list: &[HookEntry]) -> Option<usize> {
    list.iter().rev().find_map(|entry| match entry {
        HookEntry::Node(index) => Some(*index),
        HookEntry::Hook { .. } => None,
    })
}

/// Register the pre-order hooks of the directive in slot `directive` of
/// node `node`.
pub fn register_pre_order_hooks(
    data: &mut TemplateData,
    node: usize,
    directive: usize,
    hooks: LifecycleHooks,
) {
    debug_assert!(data.first_create_pass, "hooks registered after the first creation pass");

    if hooks.intersects(LifecycleHooks::PRE_ORDER)
        && last_node_marker(&data.pre_order_hooks) != Some(node)
    {
        data.pre_order_hooks.push(HookEntry::Node(node));
    }
    if hooks.intersects(LifecycleHooks::PRE_ORDER_CHECK)
        && last_node_marker(&data.pre_order_check_hooks) != Some(node)
    {
        data.pre_order_check_hooks.push(HookEntry::Node(node));
    }

    if hooks.contains(LifecycleHooks::ON_CHANGES) {
        let entry = HookEntry::Hook {
            directive,
            hook: LifecycleHook::OnChanges,
        };
        data.pre_order_hooks.push(entry);
        data.pre_order_check_hooks.push(entry);
    }
    if hooks.contains(LifecycleHooks::ON_INIT) {
        data.pre_order_hooks.push(HookEntry::Hook {
            directive,
            hook: LifecycleHook::OnInit,
        });
    }
    if hooks.contains(LifecycleHooks::DO_CHECK) {
        let entry = HookEntry::Hook {
            directive,
            hook: LifecycleHook::DoCheck,
        };
        data.pre_order_hooks.push(entry);
        data.pre_order_check_hooks.push(entry);
    }
}

/// Register the post-order hooks of every directive on node `node`, in
/// directive order. Must run when the node ends, after its children.
pub fn register_post_order_hooks(data: &mut TemplateData, node: usize) {
    debug_assert!(data.first_create_pass, "hooks registered after the first creation pass");

    let Some(range) = data.node(node).map(|n| n.directive_start..n.directive_end) else {
        return;
    };
    for directive in range {
        let Some(hooks) = data.directive(directive).map(|def| def.hooks()) else {
            continue;
        };
        let entry = |hook| HookEntry::Hook { directive, hook };

        if hooks.contains(LifecycleHooks::AFTER_CONTENT_INIT) {
            data.content_hooks.push(entry(LifecycleHook::AfterContentInit));
        }
        if hooks.contains(LifecycleHooks::AFTER_CONTENT_CHECKED) {
            data.content_hooks.push(entry(LifecycleHook::AfterContentChecked));
            data.content_check_hooks.push(entry(LifecycleHook::AfterContentChecked));
        }
        if hooks.contains(LifecycleHooks::AFTER_VIEW_INIT) {
            data.view_hooks.push(entry(LifecycleHook::AfterViewInit));
        }
        if hooks.contains(LifecycleHooks::AFTER_VIEW_CHECKED) {
            data.view_hooks.push(entry(LifecycleHook::AfterViewChecked));
            data.view_check_hooks.push(entry(LifecycleHook::AfterViewChecked));
        }
        if hooks.contains(LifecycleHooks::ON_DESTROY) {
            data.destroy_hooks.push(entry(LifecycleHook::OnDestroy));
        }
    }
}

impl Runtime {
    /// Run check hooks, assuming every run-once hook has already fired.
    pub fn execute_check_hooks(
        &mut self,
        view: ViewId,
        list: HookList,
        boundary: HookBoundary,
    ) -> ViewResult<()> {
        self.call_hooks(view, list, InitPhase::Completed, boundary)
    }

    /// Run init and check hooks if the view is in `phase`; otherwise do
    /// nothing.
    pub fn execute_init_and_check_hooks(
        &mut self,
        view: ViewId,
        list: HookList,
        phase: InitPhase,
        boundary: HookBoundary,
    ) -> ViewResult<()> {
        debug_assert!(
            phase != InitPhase::Completed,
            "init hooks can't run once the init phase has completed"
        );
        if self.views.get(view)?.init_phase == phase {
            self.call_hooks(view, list, phase, boundary)?;
        }
        Ok(())
    }

    /// Move the view out of `phase` if it is still in it.
    pub fn increment_init_phase(&mut self, view: ViewId, phase: InitPhase) -> ViewResult<()> {
        debug_assert!(
            phase != InitPhase::Completed,
            "the init phase can't advance past completed"
        );
        let instance = self.views.get_mut(view)?;
        if instance.init_phase == phase {
            instance.index_within_phase = 0;
            instance.init_phase = phase.next();
            tracing::trace!(
                target: targets::HOOKS,
                ?view,
                phase = ?instance.init_phase,
                "init phase advanced"
            );
        }
        Ok(())
    }

    /// Reset the pre-order cursor at the start of a refresh.
    pub(crate) fn reset_pre_order_progress(&mut self, view: ViewId) -> ViewResult<()> {
        self.views.get_mut(view)?.pre_order = PreOrderProgress::default();
        Ok(())
    }

    fn call_hooks(
        &mut self,
        view: ViewId,
        list: HookList,
        phase: InitPhase,
        boundary: HookBoundary,
    ) -> ViewResult<()> {
        debug_assert!(
            !self.frames.is_check_no_changes(),
            "lifecycle hooks must not run during the check-no-changes pass"
        );
        let template = self.views.get(view)?.template.clone();
        let (start, limit) = match boundary {
            HookBoundary::All => (0, None),
            HookBoundary::Remaining => (self.views.get(view)?.pre_order.next_index, None),
            HookBoundary::Before(node) => (self.views.get(view)?.pre_order.next_index, Some(node)),
        };

        let mut last_node = 0;
        let mut i = start;
        loop {
            let Some(entry) = list.entries(&template.read()).get(i).copied() else {
                break;
            };
            match entry {
                HookEntry::Node(node) => {
                    last_node = node;
                    if limit.is_some_and(|limit| node >= limit) {
                        break;
                    }
                }
                HookEntry::Hook { directive, hook } => {
                    let instance = self.views.get_mut(view)?;
                    if hook.is_init() {
                        instance.pre_order.init_hooks_seen += 1;
                    }
                    if limit.is_none_or(|limit| last_node < limit) {
                        // Saved before the call: a failing hook is not retried.
                        instance.pre_order.next_index = i + 1;
                        self.call_hook(view, phase, directive, hook)?;
                    }
                }
            }
            i += 1;
        }
        Ok(())
    }

    fn call_hook(
        &mut self,
        view: ViewId,
        phase: InitPhase,
        directive: usize,
        hook: LifecycleHook,
    ) -> ViewResult<()> {
        if hook.is_init() {
            let instance = self.views.get_mut(view)?;
            // The phase is re-read for every entry: an earlier hook may have
            // refreshed this view and completed the phase.
            if instance.index_within_phase >= instance.pre_order.init_hooks_seen
                || instance.init_phase != phase
            {
                return Ok(());
            }
            instance.index_within_phase += 1;
        }
        self.invoke_hook(view, directive, hook)
    }

    /// Call one hook with no active reactive consumer.
    pub(crate) fn invoke_hook(
        &mut self,
        view: ViewId,
        directive: usize,
        hook: LifecycleHook,
    ) -> ViewResult<()> {
        let instance = self.views.get(view)?;
        let Some(target) = instance.slot(directive).and_then(|s| s.directive()).cloned() else {
            return Ok(());
        };
        let name = instance
            .template
            .read()
            .directive(directive)
            .map(|def| def.name().to_string())
            .unwrap_or_default();

        let changes = if hook == LifecycleHook::OnChanges {
            match self.views.get_mut(view)?.pending_changes.remove(&directive) {
                Some(changes) => Some(changes),
                None => return Ok(()),
            }
        } else {
            None
        };

        let span = tracing::trace_span!(
            target: targets::HOOKS,
            span_names::HOOK,
            directive = %name,
            %hook,
        );
        let _entered = span.enter();

        let previous = self.set_active_consumer(None);
        let result = match hook {
            LifecycleHook::OnChanges => {
                let changes = changes.unwrap_or_default();
                target.on_changes(self, &changes)
            }
            LifecycleHook::OnInit => target.on_init(self),
            LifecycleHook::DoCheck => target.do_check(self),
            LifecycleHook::AfterContentInit => target.after_content_init(self),
            LifecycleHook::AfterContentChecked => target.after_content_checked(self),
            LifecycleHook::AfterViewInit => target.after_view_init(self),
            LifecycleHook::AfterViewChecked => target.after_view_checked(self),
            LifecycleHook::OnDestroy => target.on_destroy(self),
        };
        self.set_active_consumer(previous);

        result.map_err(|source| {
            tracing::debug!(target: targets::HOOKS, directive = %name, %hook, "lifecycle hook failed");
            ViewError::hook(name, hook, source)
        })
    }
}
