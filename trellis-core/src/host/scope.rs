//! Render Scope and Hooks
//!
//! A `Scope` is the view a component gets of the runtime while its render
//! function executes. It exposes the primitives the store engine is built on:
//!
//! - `use_slot`: a value created once per mount and pinned for the
//!   instance's lifetime (identity-stable across re-renders).
//! - `read_context` / `provide_context`: subtree-scoped value propagation.
//! - `use_effect`: work deferred until after the render pass commits, with
//!   cleanup before the next run and at teardown.
//! - `use_external_store`: the subscribe/read bridge that turns push-based
//!   notifications from outside the tree into scheduled re-renders.
//!
//! # Hook Ordering
//!
//! Slot hooks are positional: a component must call them in the same order on
//! every render. This is the same discipline the host runtimes this models
//! impose, and it is what makes a slot addressable without a name.

use std::sync::Arc;

use tracing::warn;

use super::context::{value_identity, ChannelId, ContextChannel, ContextEnv};
use super::element::SharedAny;
use super::runtime::{InstanceId, RuntimeShared};

/// Callback handed to an external store's subscribe function; invoking it
/// schedules a re-render of the subscribing instance.
pub type OnChange = Arc<dyn Fn() + Send + Sync>;

/// Teardown work captured by an effect or a subscription.
pub type Cleanup = Box<dyn FnOnce() + Send>;

pub(crate) type PendingEffect = Box<dyn FnOnce() -> Option<Cleanup> + Send>;

/// A handle that tears down a subscription when disposed or dropped.
///
/// Disposal is idempotent; dropping an already-disposed handle is a no-op.
pub struct Disposer(Option<Cleanup>);

impl Disposer {
    pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(teardown)))
    }

    /// Tear down the subscription now.
    pub fn dispose(mut self) {
        if let Some(teardown) = self.0.take() {
            teardown();
        }
    }
}

impl Drop for Disposer {
    fn drop(&mut self) {
        if let Some(teardown) = self.0.take() {
            teardown();
        }
    }
}

impl std::fmt::Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer")
            .field("armed", &self.0.is_some())
            .finish()
    }
}

/// The per-render hook surface for one instance.
pub struct Scope<'a> {
    pub(crate) instance: InstanceId,
    pub(crate) slots: &'a mut Vec<SharedAny>,
    pub(crate) cursor: usize,
    pub(crate) env: &'a ContextEnv,
    pub(crate) reads: &'a mut Vec<(ChannelId, usize)>,
    pub(crate) provided: &'a mut ContextEnv,
    pub(crate) effects: &'a mut Vec<PendingEffect>,
    pub(crate) shared: Arc<RuntimeShared>,
}

impl Scope<'_> {
    /// The id of the instance currently rendering.
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// A value created on first render and pinned for the mount's lifetime.
    ///
    /// Subsequent renders return the same allocation; `init` runs at most
    /// once per mount. Interior mutability belongs to the stored value.
    pub fn use_slot<V, F>(&mut self, init: F) -> Arc<V>
    where
        V: Send + Sync + 'static,
        F: FnOnce() -> V,
    {
        let index = self.cursor;
        self.cursor += 1;
        if index < self.slots.len() {
            return Arc::clone(&self.slots[index])
                .downcast::<V>()
                .expect("slot type changed between renders; hook order must be stable");
        }
        let value = Arc::new(init());
        self.slots.push(Arc::clone(&value) as SharedAny);
        value
    }

    /// Read the nearest provided value on `channel`, registering this
    /// instance as a reader so identity changes reach it even through
    /// memo-skipped subtrees. Returns `None` when no ancestor provides the
    /// channel.
    pub fn read_context<V: Send + Sync + 'static>(
        &mut self,
        channel: &ContextChannel<V>,
    ) -> Option<Arc<V>> {
        match self.env.get(&channel.id()) {
            Some(value) => {
                self.reads.push((channel.id(), value_identity(value)));
                let extracted = channel.extract(value);
                if extracted.is_none() {
                    warn!(channel = channel.name(), "context value has unexpected type");
                }
                extracted
            }
            None => {
                // Recorded with a null identity so a provider appearing above
                // this position is observed as a change.
                self.reads.push((channel.id(), 0));
                None
            }
        }
    }

    /// Publish a value on `channel` for the subtree below this instance.
    /// Replaces any value provided higher up for the duration of the subtree.
    pub fn provide_context<V: Send + Sync + 'static>(
        &mut self,
        channel: &ContextChannel<V>,
        value: Arc<V>,
    ) {
        self.provided.insert(channel.id(), value as SharedAny);
    }

    /// Defer `effect` until after this render pass commits.
    ///
    /// The effect runs exactly once per commit, regardless of how many render
    /// attempts preceded it. A returned cleanup runs before the instance's
    /// next commit and at unmount.
    pub fn use_effect<F>(&mut self, effect: F)
    where
        F: FnOnce() -> Option<Cleanup> + Send + 'static,
    {
        self.effects.push(Box::new(effect));
    }

    /// Bridge an external push-based store into this instance's render cycle.
    ///
    /// `get_snapshot` is pulled during render and its value returned;
    /// `subscribe` is invoked post-commit with a callback that schedules a
    /// re-render of this instance, and is re-established each commit with the
    /// previous subscription disposed first. Because the runtime is
    /// single-threaded and notifications only run post-commit, no
    /// notification can slip between disposal and re-subscription.
    pub fn use_external_store<S, Sub, Get>(&mut self, subscribe: Sub, get_snapshot: Get) -> S
    where
        S: Clone + Send + Sync + 'static,
        Sub: FnOnce(OnChange) -> Disposer + Send + 'static,
        Get: Fn() -> S,
    {
        let snapshot = get_snapshot();
        let shared = Arc::clone(&self.shared);
        let instance = self.instance;
        self.use_effect(move || {
            let on_change: OnChange = Arc::new(move || shared.schedule_update(instance));
            let disposer = subscribe(on_change);
            Some(Box::new(move || disposer.dispose()) as Cleanup)
        });
        snapshot
    }

    /// Handle for scheduling re-renders of this instance from outside a
    /// render pass.
    pub fn update_handle(&self) -> UpdateHandle {
        UpdateHandle {
            shared: Arc::clone(&self.shared),
            instance: self.instance,
        }
    }
}

/// Schedules re-renders of one instance; safe to invoke from subscriber
/// callbacks. The scheduled work runs on the next flush.
#[derive(Clone)]
pub struct UpdateHandle {
    shared: Arc<RuntimeShared>,
    instance: InstanceId,
}

impl UpdateHandle {
    pub fn schedule(&self) {
        self.shared.schedule_update(self.instance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn disposer_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let disposer = Disposer::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        disposer.dispose();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disposer_runs_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        {
            let _disposer = Disposer::new(move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
