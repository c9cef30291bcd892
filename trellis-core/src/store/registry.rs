//! Global Executor Registry
//!
//! Stores defined for app-wide use have no natural provider location, so
//! their executor elements are registered into a process-wide list instead.
//! A single root component renders every registered executor above the
//! application's own tree, which puts each global store's container in scope
//! for every consumer below the root.
//!
//! The executor list is copy-on-write: readers hold an `Arc` snapshot, and
//! registration swaps in a new list rather than mutating the old one. That
//! makes the list itself a valid external-store snapshot for the root's
//! subscription, and keeps iteration safe against registrations made from
//! inside a render.
//!
//! Registration listeners run synchronously inside [`ExecutorRegistry::
//! register`], before it returns. A registration made during a render is
//! therefore observed by the root before the next flush completes, while the
//! new store's own first notification still waits for its commit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::host::{ComponentDef, Disposer, Element, OnChange, Scope};

static LISTENER_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Props for the registry's root component: the application tree to render
/// below the registered executors.
#[derive(Clone)]
pub struct RootProps {
    pub children: Vec<Element>,
}

/// A process-wide (or test-local) list of executor elements plus the
/// listeners watching it.
pub struct ExecutorRegistry {
    executors: RwLock<Arc<Vec<Element>>>,
    listeners: Arc<Mutex<Vec<(u64, OnChange)>>>,
    root_def: OnceLock<Arc<ComponentDef>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: RwLock::new(Arc::new(Vec::new())),
            listeners: Arc::new(Mutex::new(Vec::new())),
            root_def: OnceLock::new(),
        }
    }

    /// Append an executor element and invoke every listener before returning.
    ///
    /// The previous list is left untouched; snapshots taken before this call
    /// keep their contents.
    pub fn register(&self, executor: Element) {
        debug!(component = executor.def().name(), "register global executor");
        {
            let mut executors = self.executors.write();
            let mut next = Vec::with_capacity(executors.len() + 1);
            next.extend(executors.iter().cloned());
            next.push(executor);
            *executors = Arc::new(next);
        }
        self.notify_listeners();
    }

    /// Snapshot of the current executor list, in registration order.
    pub fn executors(&self) -> Arc<Vec<Element>> {
        Arc::clone(&self.executors.read())
    }

    /// Number of registered executors.
    pub fn len(&self) -> usize {
        self.executors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.read().is_empty()
    }

    /// Watch for registrations. The listener runs synchronously inside each
    /// `register` call until the returned disposer removes it.
    pub fn subscribe(&self, listener: OnChange) -> Disposer {
        let id = LISTENER_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, listener));
        let listeners = Arc::clone(&self.listeners);
        Disposer::new(move || {
            listeners.lock().retain(|(entry, _)| *entry != id);
        })
    }

    /// Drop every registered executor. Listeners stay subscribed and are
    /// notified, so a mounted root empties itself on its next flush. Intended
    /// for tests that share the global registry.
    pub fn reset(&self) {
        *self.executors.write() = Arc::new(Vec::new());
        self.notify_listeners();
    }

    /// The root component: renders every registered executor, in order,
    /// followed by the caller's children. Re-renders when the list changes.
    ///
    /// Built once per registry; repeated calls return the same definition so
    /// remounting the root reconciles instead of replacing.
    pub fn root(self: &Arc<Self>) -> Arc<ComponentDef> {
        let registry = Arc::clone(self);
        Arc::clone(self.root_def.get_or_init(move || {
            ComponentDef::new::<RootProps, _>("StoreRoot", move |scope: &mut Scope<'_>, props| {
                let watch = Arc::clone(&registry);
                let read = Arc::clone(&registry);
                let executors = scope.use_external_store(
                    move |on_change| watch.subscribe(on_change),
                    move || read.executors(),
                );
                let mut out: Vec<Element> = executors.iter().cloned().collect();
                out.extend(props.children.iter().cloned());
                out
            })
        }))
    }

    fn notify_listeners(&self) {
        let snapshot: Vec<OnChange> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener();
        }
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("executors", &self.len())
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}

/// The process-wide registry used by [`register_global_executor`].
pub fn global_registry() -> Arc<ExecutorRegistry> {
    static GLOBAL: OnceLock<Arc<ExecutorRegistry>> = OnceLock::new();
    Arc::clone(GLOBAL.get_or_init(|| Arc::new(ExecutorRegistry::new())))
}

/// Register an executor element on the process-wide registry.
pub fn register_global_executor(executor: Element) {
    global_registry().register(executor);
}
