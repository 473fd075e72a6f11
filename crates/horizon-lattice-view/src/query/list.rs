//! Live query result lists.

use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

use super::resolve::QueryResult;
use crate::logging::targets;

new_key_type! {
    /// Identifier of a change subscription on a [`QueryList`].
    ///
    /// Pass it to [`QueryList::unsubscribe`] to stop receiving notifications.
    pub struct SubscriptionId;
}

type ChangeCallback = Arc<dyn Fn(&QueryList) + Send + Sync>;

struct ListState {
    results: Arc<[QueryResult]>,
    dirty: bool,
    changes_detected: bool,
    destroyed: bool,
}

/// The published results of one query in one view.
///
/// Shared between the view that owns the query and the views that inherit
/// it from a nested template. Results are replaced only when a refresh
/// produces a different list, so an unchanged refresh leaves
/// [`results`](Self::results) pointing at the same allocation.
///
/// Results hold readable values only: a matched node with nothing to read
/// is left out, so positions follow document order rather than the match
/// list.
pub struct QueryList {
    state: Mutex<ListState>,
    subscribers: Mutex<SlotMap<SubscriptionId, ChangeCallback>>,
    emit_distinct_changes_only: bool,
}

impl std::fmt::Debug for QueryList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("QueryList")
            .field("len", &state.results.len())
            .field("dirty", &state.dirty)
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

impl Default for QueryList {
    fn default() -> Self {
        Self::new(false)
    }
}

impl QueryList {
    /// Create an empty, dirty list.
    ///
    /// With `emit_distinct_changes_only`, subscribers are only notified when
    /// a refresh changed the results; otherwise on every recompute.
    pub fn new(emit_distinct_changes_only: bool) -> Self {
        Self {
            state: Mutex::new(ListState {
                results: Arc::from(Vec::new()),
                dirty: true,
                changes_detected: false,
                destroyed: false,
            }),
            subscribers: Mutex::new(SlotMap::with_key()),
            emit_distinct_changes_only,
        }
    }

    /// Whether the next refresh has to recompute the results.
    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// Request a recompute on the next refresh.
    pub fn set_dirty(&self) {
        self.state.lock().dirty = true;
    }

    /// Replace the results if they differ from the current ones, comparing by
    /// identity. Clears the dirty flag. Returns whether the results changed.
    pub fn reset(&self, results: Vec<QueryResult>) -> bool {
        self.reset_by(results, |a, b| a == b)
    }

    /// Like [`reset`](Self::reset) with a custom equality.
    pub fn reset_by(
        &self,
        results: Vec<QueryResult>,
        same: impl Fn(&QueryResult, &QueryResult) -> bool,
    ) -> bool {
        let mut state = self.state.lock();
        state.dirty = false;
        let changed = state.results.len() != results.len()
            || state.results.iter().zip(&results).any(|(a, b)| !same(a, b));
        state.changes_detected = changed;
        if changed {
            state.results = Arc::from(results);
        }
        changed
    }

    /// Notify subscribers of the last reset.
    pub fn notify_on_changes(&self) {
        let changed = {
            let state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.changes_detected
        };
        if !changed && self.emit_distinct_changes_only {
            return;
        }
        // Callbacks run without the lock held so they may subscribe or read.
        let callbacks: Vec<ChangeCallback> = self.subscribers.lock().values().cloned().collect();
        tracing::trace!(
            target: targets::QUERY,
            subscribers = callbacks.len(),
            changed,
            "notifying query subscribers"
        );
        for callback in callbacks {
            callback(self);
        }
    }

    /// Call `f` after every refresh that publishes results.
    pub fn subscribe<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&QueryList) + Send + Sync + 'static,
    {
        self.subscribers.lock().insert(Arc::new(f))
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.lock().remove(id).is_some()
    }

    /// Number of subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Drop every subscription. Called when the owning view is destroyed.
    pub fn destroy(&self) {
        self.state.lock().destroyed = true;
        self.subscribers.lock().clear();
    }

    /// Whether the owning view has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    /// Current results. Unchanged refreshes return the same allocation.
    pub fn results(&self) -> Arc<[QueryResult]> {
        self.state.lock().results.clone()
    }

    /// Number of results.
    pub fn len(&self) -> usize {
        self.state.lock().results.len()
    }

    /// Whether there are no results.
    pub fn is_empty(&self) -> bool {
        self.state.lock().results.is_empty()
    }

    /// Result at `index`.
    pub fn get(&self, index: usize) -> Option<QueryResult> {
        self.state.lock().results.get(index).cloned()
    }

    /// First result.
    pub fn first(&self) -> Option<QueryResult> {
        self.state.lock().results.first().cloned()
    }

    /// Last result.
    pub fn last(&self) -> Option<QueryResult> {
        self.state.lock().results.last().cloned()
    }

    /// Copy of the results.
    pub fn to_vec(&self) -> Vec<QueryResult> {
        self.state.lock().results.to_vec()
    }
}

static_assertions::assert_impl_all!(QueryList: Send, Sync);
