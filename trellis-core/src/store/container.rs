//! Container Implementation
//!
//! A Container owns one store instance's current value and its subscriber
//! set. It is the unit of notification: the executor layer publishes a fresh
//! value into it on every render and calls [`Container::notify`] once per
//! commit; every subscriber then sees the committed value.
//!
//! # Ownership
//!
//! Exactly one executor publishes into a container; every other holder is an
//! observer. The container does not enforce this, the store assembly does by
//! never handing out a publishing handle.
//!
//! # Notification Semantics
//!
//! `notify` snapshots both the subscriber list and the current value before
//! invoking anything. This pins down the semantics the subscriber set would
//! otherwise leave incidental:
//!
//! - a callback subscribed during a notify pass is not invoked by that pass;
//! - a callback disposed during a notify pass is still invoked by it;
//! - a re-entrant `notify` takes a fresh snapshot and is well-defined.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::host::Disposer;

/// Counter for generating unique subscriber ids.
static SUBSCRIBER_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_subscriber_id() -> u64 {
    SUBSCRIBER_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// The function that computes a store's value from provider props.
/// Supplied once at store-definition time and never reassigned.
pub type ComputeFn<T, P> = Arc<dyn Fn(&P) -> T + Send + Sync>;

type SubscriberFn<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// One store instance's value and subscriber set.
///
/// Created once when a provider mounts (identity stable across its
/// re-renders) and dropped when it unmounts.
pub struct Container<T, P> {
    compute: ComputeFn<T, P>,
    /// `None` until the first render publishes; the engine never reads the
    /// value before that first assignment.
    data: RwLock<Option<T>>,
    subscribers: Arc<Mutex<Vec<(u64, SubscriberFn<T>)>>>,
}

impl<T, P> Container<T, P>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a container around the store's compute function.
    pub fn new(compute: ComputeFn<T, P>) -> Self {
        Self {
            compute,
            data: RwLock::new(None),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Run the compute function against the current props.
    pub fn compute(&self, props: &P) -> T {
        (self.compute)(props)
    }

    /// Replace the current value. Does not notify; notification is deferred
    /// to the post-commit effect so subscribers only ever observe committed
    /// data.
    pub fn publish(&self, value: T) {
        *self.data.write() = Some(value);
    }

    /// The most recently published value, or `None` before the first publish.
    pub fn read(&self) -> Option<T> {
        self.data.read().clone()
    }

    /// Register a callback invoked with the current value on each
    /// notification. The returned disposer removes it.
    pub fn subscribe<F>(&self, callback: F) -> Disposer
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = next_subscriber_id();
        self.subscribers.lock().push((id, Arc::new(callback)));
        let subscribers = Arc::clone(&self.subscribers);
        Disposer::new(move || {
            subscribers.lock().retain(|(entry, _)| *entry != id);
        })
    }

    /// Invoke every currently-registered subscriber with the current value.
    ///
    /// A no-op before the first publish.
    pub fn notify(&self) {
        let Some(data) = self.read() else {
            return;
        };
        let snapshot: Vec<SubscriberFn<T>> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in snapshot {
            callback(&data);
        }
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl<T, P> std::fmt::Debug for Container<T, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("published", &self.data.read().is_some())
            .field("subscriber_count", &self.subscribers.lock().len())
            .finish()
    }
}
