//! Selective Subscription Bridge
//!
//! The bridge adapts a container's push-based notifications into the
//! pull/subscribe contract the host runtime's external-store hook expects:
//!
//! - `read` returns the container's current value directly, never a separate
//!   cache;
//! - `subscribe` registers a derived callback that forwards a notification
//!   only when the consumer's dependency snapshot actually changed.
//!
//! The selector lives in shared state that every render refreshes *without*
//! resetting the stored snapshot, so swapping which fields a consumer watches
//! takes effect from the next notification rather than retroactively. The
//! snapshot state also survives the host's commit-time resubscription cycle,
//! which tears the raw container callback down and re-registers it.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::host::{Disposer, OnChange};
use crate::store::container::Container;
use crate::store::deps::{DepsFn, DepsSnapshot};

/// Per-consumer subscription state: the current selector and the previous
/// snapshot. Held in a mount slot so it survives re-renders and
/// resubscriptions.
pub struct BridgeState<T> {
    deps_fn: RwLock<Option<DepsFn<T>>>,
    previous: RwLock<Option<DepsSnapshot>>,
}

impl<T> BridgeState<T> {
    pub fn new() -> Self {
        Self {
            deps_fn: RwLock::new(None),
            previous: RwLock::new(None),
        }
    }

    /// Install the selector for the upcoming notifications. Runs on every
    /// render; the stored snapshot is left untouched, except on the very
    /// first render, where it is seeded from the current data so the first
    /// notification compares instead of firing unconditionally.
    pub fn refresh(&self, deps_fn: Option<DepsFn<T>>, current: Option<&T>) {
        let seed = match (&deps_fn, current) {
            (Some(f), Some(data)) => Some(f(data)),
            _ => None,
        };
        *self.deps_fn.write() = deps_fn;
        let mut previous = self.previous.write();
        if previous.is_none() {
            *previous = seed;
        }
    }

    fn deps_fn(&self) -> Option<DepsFn<T>> {
        self.deps_fn.read().clone()
    }

    /// Compare `next` against the stored snapshot, store it unconditionally,
    /// and report whether the consumer should be woken.
    fn advance(&self, next: DepsSnapshot) -> bool {
        let mut previous = self.previous.write();
        let fire = match previous.as_ref() {
            Some(prev) => next.changed_from(prev),
            None => true,
        };
        *previous = Some(next);
        fire
    }
}

impl<T> Default for BridgeState<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A container paired with one consumer's subscription state.
pub struct StoreBridge<T, P> {
    container: Arc<Container<T, P>>,
    state: Arc<BridgeState<T>>,
}

impl<T, P> StoreBridge<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: 'static,
{
    pub fn new(container: Arc<Container<T, P>>, state: Arc<BridgeState<T>>) -> Self {
        Self { container, state }
    }

    /// The latest committed value, straight from the container.
    pub fn read(&self) -> Option<T> {
        self.container.read()
    }

    /// Register the derived callback on the container. Without a selector,
    /// every notification wakes the consumer; with one, only snapshot
    /// changes do. The snapshot is advanced unconditionally either way.
    pub fn subscribe(&self, on_change: OnChange) -> Disposer {
        let state = Arc::clone(&self.state);
        self.container.subscribe(move |data: &T| {
            match state.deps_fn() {
                None => on_change(),
                Some(deps_fn) => {
                    if state.advance(deps_fn(data)) {
                        on_change();
                    }
                }
            }
        })
    }
}

impl<T, P> Clone for StoreBridge<T, P> {
    fn clone(&self) -> Self {
        Self {
            container: Arc::clone(&self.container),
            state: Arc::clone(&self.state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::deps::Dep;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Debug, PartialEq)]
    struct State {
        value: i32,
        label: &'static str,
    }

    fn setup() -> (Arc<Container<State, i32>>, Arc<BridgeState<State>>) {
        let container = Arc::new(Container::new(Arc::new(|props: &i32| State {
            value: *props,
            label: "state",
        })));
        (container, Arc::new(BridgeState::new()))
    }

    fn wake_counter() -> (OnChange, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let probe = count.clone();
        let on_change: OnChange = Arc::new(move || {
            probe.fetch_add(1, Ordering::SeqCst);
        });
        (on_change, count)
    }

    #[test]
    fn without_selector_every_notification_wakes() {
        let (container, state) = setup();
        container.publish(State { value: 1, label: "state" });
        state.refresh(None, container.read().as_ref());

        let bridge = StoreBridge::new(container.clone(), state);
        let (on_change, wakes) = wake_counter();
        let _sub = bridge.subscribe(on_change);

        container.notify();
        container.notify();
        assert_eq!(wakes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn selector_swallows_unchanged_snapshots() {
        let (container, state) = setup();
        let deps: DepsFn<State> =
            Arc::new(|state: &State| DepsSnapshot::of([Dep::of(state.value)]));
        container.publish(State { value: 5, label: "state" });
        state.refresh(Some(deps), container.read().as_ref());

        let bridge = StoreBridge::new(container.clone(), state);
        let (on_change, wakes) = wake_counter();
        let _sub = bridge.subscribe(on_change);

        // Fresh data object, same selected value.
        container.publish(State { value: 5, label: "state" });
        container.notify();
        assert_eq!(wakes.load(Ordering::SeqCst), 0);

        container.publish(State { value: 6, label: "state" });
        container.notify();
        assert_eq!(wakes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn read_is_always_the_latest_committed_value() {
        let (container, state) = setup();
        let bridge = StoreBridge::new(container.clone(), state);
        assert_eq!(bridge.read(), None);
        container.publish(State { value: 3, label: "state" });
        assert_eq!(bridge.read().map(|s| s.value), Some(3));
    }

    #[test]
    fn selector_swap_keeps_the_old_snapshot_until_next_notification() {
        let (container, state) = setup();
        let on_value: DepsFn<State> =
            Arc::new(|state: &State| DepsSnapshot::of([Dep::of(state.value)]));
        container.publish(State { value: 1, label: "a" });
        state.refresh(Some(on_value), container.read().as_ref());

        let bridge = StoreBridge::new(container.clone(), state.clone());
        let (on_change, wakes) = wake_counter();
        let _sub = bridge.subscribe(on_change);

        // A later render swaps the selector to watch the label instead. The
        // stored snapshot still holds [1]; the next notification compares the
        // new selector's output against it.
        let on_label: DepsFn<State> =
            Arc::new(|state: &State| DepsSnapshot::of([Dep::of(state.label)]));
        state.refresh(Some(on_label), container.read().as_ref());

        container.publish(State { value: 2, label: "a" });
        container.notify();
        // ["a"] vs [1]: positional mismatch, so the swap itself wakes once…
        assert_eq!(wakes.load(Ordering::SeqCst), 1);

        container.publish(State { value: 3, label: "a" });
        container.notify();
        // …after which only label changes matter; value churn is swallowed.
        assert_eq!(wakes.load(Ordering::SeqCst), 1);

        container.publish(State { value: 3, label: "b" });
        container.notify();
        assert_eq!(wakes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn resubscription_preserves_snapshot_state() {
        let (container, state) = setup();
        let deps: DepsFn<State> =
            Arc::new(|state: &State| DepsSnapshot::of([Dep::of(state.value)]));
        container.publish(State { value: 5, label: "state" });
        state.refresh(Some(deps.clone()), container.read().as_ref());

        let bridge = StoreBridge::new(container.clone(), state.clone());
        let (on_change, wakes) = wake_counter();
        let sub = bridge.subscribe(on_change.clone());

        // The host tears the raw callback down and re-registers it each
        // commit; the snapshot must carry across.
        sub.dispose();
        state.refresh(Some(deps), container.read().as_ref());
        let _sub = bridge.subscribe(on_change);

        container.publish(State { value: 5, label: "state" });
        container.notify();
        assert_eq!(wakes.load(Ordering::SeqCst), 0);
    }
}
