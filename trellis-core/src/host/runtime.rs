//! Instance Tree and Scheduler
//!
//! The runtime owns the mounted component tree and drives it through
//! render/commit cycles. The store engine never schedules anything itself; it
//! only publishes values during renders and defers notification into the
//! commit phase this module runs.
//!
//! # The Cycle
//!
//! 1. *Render*: an instance's render function runs, producing child elements.
//!    Children are reconciled positionally against the existing instances.
//!    A child whose element is identical to the previous one, or whose
//!    definition's render-stability predicate reports "unchanged", is not
//!    re-rendered. Context changes still propagate into the skipped subtree
//!    by identity comparison against each instance's recorded reads.
//!
//! 2. *Commit*: effects queued during the render pass run post-order
//!    (children before parents), each preceded by the cleanup of its previous
//!    run. Subscriptions established by children are therefore live before a
//!    parent's notification effect fires.
//!
//! 3. *Flush*: commits may schedule further renders (a notified subscriber
//!    asking its instance to re-render). `flush` alternates render and commit
//!    passes until the tree is quiescent, with a capped pass count so a
//!    notify-render feedback loop cannot hang the process.
//!
//! # Concurrency
//!
//! The tree is single-threaded and cooperative. The only cross-cutting state
//! is the update queue, which subscriber callbacks push into from within the
//! commit phase; it is drained by the same thread in the next pass.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{trace, warn};

use super::context::{value_identity, ChannelId, ContextEnv};
use super::element::{Element, SharedAny};
use super::scope::{Cleanup, PendingEffect, Scope};

/// Renders per flush before the runtime gives up on reaching quiescence.
const MAX_FLUSH_PASSES: usize = 64;

/// Unique identifier for a mounted instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// State shared between the runtime and callbacks that outlive a render pass.
pub struct RuntimeShared {
    dirty: Mutex<Vec<InstanceId>>,
}

impl RuntimeShared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            dirty: Mutex::new(Vec::new()),
        })
    }

    /// Queue an instance for re-render on the next flush pass. Duplicate
    /// requests collapse at drain time.
    pub fn schedule_update(&self, instance: InstanceId) {
        self.dirty.lock().push(instance);
    }

    fn drain(&self) -> Vec<InstanceId> {
        let mut queued = std::mem::take(&mut *self.dirty.lock());
        let mut seen = HashSet::with_capacity(queued.len());
        queued.retain(|id| seen.insert(*id));
        queued
    }
}

/// One mounted component.
struct Instance {
    def: Arc<crate::host::ComponentDef>,
    props: SharedAny,
    key: Option<u64>,
    depth: usize,
    children: Vec<InstanceId>,
    slots: Vec<SharedAny>,
    /// Environment handed down by the parent, refreshed on every parent pass
    /// (including skipped ones) so a scheduled re-render never sees stale
    /// context.
    env: ContextEnv,
    /// Values this instance provided on its last render.
    provided: ContextEnv,
    /// (channel, value identity) pairs read on the last render.
    context_reads: Vec<(ChannelId, usize)>,
    pending_effects: Vec<PendingEffect>,
    cleanups: Vec<Cleanup>,
    needs_commit: bool,
}

/// The mounted tree plus its update queue.
pub struct Runtime {
    shared: Arc<RuntimeShared>,
    instances: indexmap::IndexMap<InstanceId, Instance>,
    roots: Vec<InstanceId>,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            shared: RuntimeShared::new(),
            instances: indexmap::IndexMap::new(),
            roots: Vec::new(),
        }
    }

    /// Mount `element` as a root, render its subtree, and flush to
    /// quiescence. Returns the root's instance id.
    pub fn mount(&mut self, element: Element) -> InstanceId {
        let id = self.mount_element(0, element, ContextEnv::new());
        self.roots.push(id);
        self.flush();
        id
    }

    /// Re-render a root with a new element and flush.
    ///
    /// The element must carry the same definition the root was mounted with;
    /// a mismatched definition is ignored with a warning.
    pub fn update(&mut self, root: InstanceId, element: Element) {
        let matches = self
            .instances
            .get(&root)
            .map(|instance| Arc::ptr_eq(&instance.def, element.def()))
            .unwrap_or(false);
        if !matches {
            warn!(?root, "update ignored: definition does not match mounted root");
            return;
        }
        self.update_instance(root, &element, ContextEnv::new());
        self.flush();
    }

    /// Unmount a root, running every cleanup in its subtree (children first).
    pub fn unmount(&mut self, root: InstanceId) {
        self.roots.retain(|id| *id != root);
        self.unmount_instance(root);
        self.flush();
    }

    /// Drive queued work until the tree settles.
    pub fn flush(&mut self) {
        for _ in 0..MAX_FLUSH_PASSES {
            self.commit_pass();
            let dirty = self.shared.drain();
            if dirty.is_empty() {
                return;
            }
            // Parents first: a parent render may satisfy a child's request.
            let mut ordered: Vec<(usize, InstanceId)> = dirty
                .into_iter()
                .filter_map(|id| self.instances.get(&id).map(|i| (i.depth, id)))
                .collect();
            ordered.sort_by_key(|(depth, _)| *depth);
            for (_, id) in ordered {
                if let Some(env) = self.instances.get(&id).map(|i| i.env.clone()) {
                    self.render_instance(id, env);
                }
            }
        }
        warn!(
            passes = MAX_FLUSH_PASSES,
            "flush did not reach quiescence; a notification loop is re-rendering every pass"
        );
    }

    /// Number of live instances; useful for leak checks.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Handle for scheduling updates from outside a render pass.
    pub fn shared(&self) -> Arc<RuntimeShared> {
        Arc::clone(&self.shared)
    }

    fn mount_element(&mut self, depth: usize, element: Element, env: ContextEnv) -> InstanceId {
        let id = InstanceId::next();
        trace!(component = element.def().name(), ?id, depth, "mount");
        let instance = Instance {
            def: Arc::clone(element.def()),
            props: element.props().clone(),
            key: element.key(),
            depth,
            children: Vec::new(),
            slots: Vec::new(),
            env: env.clone(),
            provided: ContextEnv::new(),
            context_reads: Vec::new(),
            pending_effects: Vec::new(),
            cleanups: Vec::new(),
            needs_commit: false,
        };
        self.instances.insert(id, instance);
        self.render_instance(id, env);
        id
    }

    fn render_instance(&mut self, id: InstanceId, env: ContextEnv) {
        let Some(mut instance) = self.instances.shift_remove(&id) else {
            return;
        };
        trace!(component = instance.def.name(), ?id, "render");
        instance.env = env.clone();
        let mut slots = std::mem::take(&mut instance.slots);
        let mut reads = Vec::new();
        let mut provided = ContextEnv::new();
        let mut effects = Vec::new();
        let def = Arc::clone(&instance.def);
        let props = instance.props.clone();

        let child_elements = {
            let mut scope = Scope {
                instance: id,
                slots: &mut slots,
                cursor: 0,
                env: &env,
                reads: &mut reads,
                provided: &mut provided,
                effects: &mut effects,
                shared: Arc::clone(&self.shared),
            };
            def.render(&mut scope, &props)
        };

        instance.slots = slots;
        instance.context_reads = reads;
        instance.provided = provided;
        instance.pending_effects = effects;
        instance.needs_commit = true;

        let mut child_env = env;
        for (channel, value) in instance.provided.clone() {
            child_env.insert(channel, value);
        }
        let depth = instance.depth;
        let old_children = std::mem::take(&mut instance.children);
        self.instances.insert(id, instance);

        let new_children = self.reconcile_children(depth + 1, old_children, child_elements, child_env);
        if let Some(instance) = self.instances.get_mut(&id) {
            instance.children = new_children;
        }
    }

    fn reconcile_children(
        &mut self,
        depth: usize,
        old: Vec<InstanceId>,
        elements: Vec<Element>,
        env: ContextEnv,
    ) -> Vec<InstanceId> {
        let mut children = Vec::with_capacity(elements.len());
        let element_count = elements.len();
        for (position, element) in elements.into_iter().enumerate() {
            let existing = old.get(position).copied().filter(|id| {
                self.instances
                    .get(id)
                    .map(|instance| {
                        Arc::ptr_eq(&instance.def, element.def()) && instance.key == element.key()
                    })
                    .unwrap_or(false)
            });
            match existing {
                Some(id) => {
                    self.update_instance(id, &element, env.clone());
                    children.push(id);
                }
                None => {
                    if let Some(&stale) = old.get(position) {
                        self.unmount_instance(stale);
                    }
                    children.push(self.mount_element(depth, element, env.clone()));
                }
            }
        }
        for &stale in old.iter().skip(element_count) {
            self.unmount_instance(stale);
        }
        children
    }

    /// Apply a new element to an existing instance: render it, or skip and
    /// propagate context when the element is identical or the definition's
    /// predicate reports the props unchanged.
    fn update_instance(&mut self, id: InstanceId, element: &Element, env: ContextEnv) {
        let Some(instance) = self.instances.get_mut(&id) else {
            return;
        };
        let old_props = std::mem::replace(&mut instance.props, element.props().clone());
        let identical = Arc::ptr_eq(&old_props, element.props());
        let unchanged =
            identical || element.def().props_unchanged(&old_props, element.props());
        if unchanged {
            self.propagate_context(id, env);
        } else {
            self.render_instance(id, env);
        }
    }

    /// Walk a subtree whose re-render was skipped, refreshing stored
    /// environments and re-rendering any instance whose recorded context
    /// reads changed identity.
    fn propagate_context(&mut self, id: InstanceId, env: ContextEnv) {
        let decision = {
            let Some(instance) = self.instances.get_mut(&id) else {
                return;
            };
            let changed = instance.context_reads.iter().any(|(channel, seen)| {
                env.get(channel).map(value_identity).unwrap_or(0) != *seen
            });
            if changed {
                None
            } else {
                instance.env = env.clone();
                let mut child_env = env.clone();
                for (channel, value) in instance.provided.clone() {
                    child_env.insert(channel, value);
                }
                Some((instance.children.clone(), child_env))
            }
        };
        match decision {
            None => self.render_instance(id, env),
            Some((children, child_env)) => {
                for child in children {
                    self.propagate_context(child, child_env.clone());
                }
            }
        }
    }

    fn unmount_instance(&mut self, id: InstanceId) {
        let Some(instance) = self.instances.shift_remove(&id) else {
            return;
        };
        trace!(component = instance.def.name(), ?id, "unmount");
        for child in instance.children {
            self.unmount_instance(child);
        }
        for cleanup in instance.cleanups {
            cleanup();
        }
    }

    fn commit_pass(&mut self) {
        let roots = self.roots.clone();
        for root in roots {
            self.commit_instance(root);
        }
    }

    /// Run effects post-order: children commit before their parents.
    fn commit_instance(&mut self, id: InstanceId) {
        let Some(children) = self.instances.get(&id).map(|i| i.children.clone()) else {
            return;
        };
        for child in children {
            self.commit_instance(child);
        }
        let work = self.instances.get_mut(&id).and_then(|instance| {
            if !instance.needs_commit {
                return None;
            }
            instance.needs_commit = false;
            Some((
                std::mem::take(&mut instance.cleanups),
                std::mem::take(&mut instance.pending_effects),
            ))
        });
        if let Some((cleanups, effects)) = work {
            for cleanup in cleanups {
                cleanup();
            }
            let mut kept = Vec::new();
            for effect in effects {
                if let Some(cleanup) = effect() {
                    kept.push(cleanup);
                }
            }
            if let Some(instance) = self.instances.get_mut(&id) {
                instance.cleanups = kept;
            }
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ComponentDef, ContextChannel};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[test]
    fn mount_renders_the_tree_once() {
        let renders = counter();
        let renders_probe = renders.clone();
        let leaf = ComponentDef::new::<(), _>("leaf", move |_, _| {
            renders_probe.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        });
        let leaf_def = leaf.clone();
        let parent = ComponentDef::new::<(), _>("parent", move |_, _| {
            vec![Element::new(&leaf_def, ())]
        });

        let mut runtime = Runtime::new();
        runtime.mount(Element::new(&parent, ()));
        assert_eq!(renders.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.instance_count(), 2);
    }

    #[test]
    fn slots_survive_re_renders() {
        let observed = Arc::new(Mutex::new(Vec::new()));
        let observed_probe = observed.clone();
        let def = ComponentDef::new::<u32, _>("slotted", move |scope, _| {
            let slot = scope.use_slot(|| 7u32);
            observed_probe.lock().push(Arc::as_ptr(&slot) as usize);
            Vec::new()
        });

        let mut runtime = Runtime::new();
        let root = runtime.mount(Element::new(&def, 0u32));
        runtime.update(root, Element::new(&def, 1u32));
        runtime.update(root, Element::new(&def, 2u32));

        let seen = observed.lock();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|ptr| *ptr == seen[0]));
    }

    #[test]
    fn memo_predicate_skips_unchanged_props() {
        let renders = counter();
        let renders_probe = renders.clone();
        let child = ComponentDef::with_compare::<u32, _, _>(
            "memo-child",
            move |_, _| {
                renders_probe.fetch_add(1, Ordering::SeqCst);
                Vec::new()
            },
            |old, new| old == new,
        );
        let child_def = child.clone();
        let parent = ComponentDef::new::<u32, _>("parent", move |_, props| {
            vec![Element::new(&child_def, *props)]
        });

        let mut runtime = Runtime::new();
        let root = runtime.mount(Element::new(&parent, 5u32));
        assert_eq!(renders.load(Ordering::SeqCst), 1);

        runtime.update(root, Element::new(&parent, 5u32));
        assert_eq!(renders.load(Ordering::SeqCst), 1);

        runtime.update(root, Element::new(&parent, 6u32));
        assert_eq!(renders.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn identical_elements_bail_out() {
        let renders = counter();
        let renders_probe = renders.clone();
        let child = ComponentDef::new::<(), _>("plain-child", move |_, _| {
            renders_probe.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        });
        // The parent re-renders but always hands down the same child element.
        let stable = Element::new(&child, ());
        let stable_clone = stable.clone();
        let parent = ComponentDef::new::<u32, _>("parent", move |_, _| {
            vec![stable_clone.clone()]
        });

        let mut runtime = Runtime::new();
        let root = runtime.mount(Element::new(&parent, 0u32));
        runtime.update(root, Element::new(&parent, 1u32));
        runtime.update(root, Element::new(&parent, 2u32));
        assert_eq!(renders.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn context_changes_punch_through_memo_skips() {
        let channel = Arc::new(ContextChannel::<u32>::new("count"));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_probe = seen.clone();
        let reader_channel = channel.clone();
        let reader = ComponentDef::new::<(), _>("reader", move |scope, _| {
            if let Some(value) = scope.read_context(&reader_channel) {
                seen_probe.lock().push(*value);
            }
            Vec::new()
        });

        // A never-re-render wall between provider and reader.
        let reader_def = reader.clone();
        let wall = ComponentDef::with_compare::<(), _, _>(
            "wall",
            move |_, _| vec![Element::new(&reader_def, ())],
            |_, _| true,
        );

        let wall_def = wall.clone();
        let provider_channel = channel.clone();
        let provider = ComponentDef::new::<u32, _>("provider", move |scope, props| {
            scope.provide_context(&provider_channel, Arc::new(*props));
            vec![Element::new(&wall_def, ())]
        });

        let mut runtime = Runtime::new();
        let root = runtime.mount(Element::new(&provider, 1u32));
        runtime.update(root, Element::new(&provider, 2u32));
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn effects_commit_once_and_clean_up_on_unmount() {
        let effect_runs = counter();
        let cleanup_runs = counter();
        let effect_probe = effect_runs.clone();
        let cleanup_probe = cleanup_runs.clone();
        let def = ComponentDef::new::<u32, _>("effectful", move |scope, _| {
            let effect_probe = effect_probe.clone();
            let cleanup_probe = cleanup_probe.clone();
            scope.use_effect(move || {
                effect_probe.fetch_add(1, Ordering::SeqCst);
                Some(Box::new(move || {
                    cleanup_probe.fetch_add(1, Ordering::SeqCst);
                }) as Cleanup)
            });
            Vec::new()
        });

        let mut runtime = Runtime::new();
        let root = runtime.mount(Element::new(&def, 0u32));
        assert_eq!(effect_runs.load(Ordering::SeqCst), 1);
        assert_eq!(cleanup_runs.load(Ordering::SeqCst), 0);

        runtime.update(root, Element::new(&def, 1u32));
        assert_eq!(effect_runs.load(Ordering::SeqCst), 2);
        assert_eq!(cleanup_runs.load(Ordering::SeqCst), 1);

        runtime.unmount(root);
        assert_eq!(cleanup_runs.load(Ordering::SeqCst), 2);
        assert_eq!(runtime.instance_count(), 0);
    }

    #[test]
    fn scheduled_updates_re_render_on_flush() {
        let renders = counter();
        let renders_probe = renders.clone();
        let handle_out = Arc::new(Mutex::new(None));
        let handle_probe = handle_out.clone();
        let def = ComponentDef::new::<(), _>("self-updating", move |scope, _| {
            renders_probe.fetch_add(1, Ordering::SeqCst);
            *handle_probe.lock() = Some(scope.update_handle());
            Vec::new()
        });

        let mut runtime = Runtime::new();
        runtime.mount(Element::new(&def, ()));
        assert_eq!(renders.load(Ordering::SeqCst), 1);

        let handle = handle_out.lock().clone().expect("handle captured");
        handle.schedule();
        runtime.flush();
        assert_eq!(renders.load(Ordering::SeqCst), 2);
    }
}
