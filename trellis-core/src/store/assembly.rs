//! Store Assembly
//!
//! [`create_store`] turns one state-computing function into a pair of
//! artifacts: a provider component and a consumer accessor. The provider is a
//! three-layer composition:
//!
//! 1. *Outer capture layer* (`StoreProvider`): captures the caller's child
//!    elements on every render and republishes them through a side context
//!    channel whose value identity changes every render. Optionally wrapped
//!    in a render-stability predicate (`memo`, default on) that
//!    short-circuits the whole pass on unchanged props.
//!
//! 2. *Executor layer* (`StoreExecutor`): owns one [`Container`] per mount
//!    (created once, never replaced), recomputes and publishes the value on
//!    every render, defers `notify` to a post-commit effect so it runs once
//!    per commit, provides the container on the main channel, and renders a
//!    fixed leaf rather than the caller's children.
//!
//! 3. *Inner passthrough layer* (`StoreIsolator`): its render-stability
//!    predicate is pinned to "never changed", so executor re-renders skip it
//!    entirely; it reaches the children only through the side channel's
//!    identity change, i.e. only when the outer layer actually re-captured
//!    them. This is what keeps passed-through content from being re-rendered
//!    or remounted merely because the store's state changed.
//!
//! The consumer accessor reads the container off the main channel and hands
//! it to the selective subscription bridge; a missing provider is reported as
//! an explicit error instead of a sentinel value.

use std::sync::Arc;

use tracing::error;

use crate::host::{ComponentDef, ContextChannel, Element, Scope};
use crate::store::bridge::{BridgeState, StoreBridge};
use crate::store::container::{ComputeFn, Container};
use crate::store::deps::DepsFn;
use crate::store::error::StoreError;

/// Options for [`create_store_with`].
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Skip the provider's whole render pass when its props are unchanged
    /// (value-equal props, identical children). Default `true`.
    pub memo: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { memo: true }
    }
}

/// Props accepted by a store's provider: the compute function's input plus
/// the child elements to isolate.
#[derive(Clone)]
pub struct ProviderProps<P> {
    pub props: P,
    pub children: Vec<Element>,
}

/// The side channel's payload: the captured children, boxed fresh each
/// provider render so the passthrough layer sees an identity change.
struct ChildSlot {
    node: Vec<Element>,
}

/// A store definition: hands out provider elements and consumer reads.
///
/// Cheap to clone; clones address the same definition, and every *mount* of
/// the provider still gets its own container.
pub struct Store<T, P> {
    container_channel: ContextChannel<Container<T, P>>,
    provider_def: Arc<ComponentDef>,
}

/// Define a store with default options.
pub fn create_store<T, P>(compute: impl Fn(&P) -> T + Send + Sync + 'static) -> Store<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Clone + PartialEq + Send + Sync + 'static,
{
    create_store_with(compute, StoreOptions::default())
}

/// Define a store from one state-computing function.
pub fn create_store_with<T, P>(
    compute: impl Fn(&P) -> T + Send + Sync + 'static,
    options: StoreOptions,
) -> Store<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Clone + PartialEq + Send + Sync + 'static,
{
    let compute: ComputeFn<T, P> = Arc::new(compute);
    let container_channel = ContextChannel::<Container<T, P>>::new("store.container");
    let child_channel = ContextChannel::<ChildSlot>::new("store.children");

    // Layer 3: renders whatever the side channel carries, and nothing else
    // can make it re-render.
    let read_channel = child_channel.clone();
    let isolator_def = ComponentDef::with_compare::<(), _, _>(
        "StoreIsolator",
        move |scope, _| match scope.read_context(&read_channel) {
            Some(slot) => slot.node.clone(),
            None => Vec::new(),
        },
        |_, _| true,
    );

    // Layer 2: container owner. The container is created on first render and
    // pinned in a mount slot for the provider's lifetime.
    let executor_compute = compute;
    let main_channel = container_channel.clone();
    let leaf = isolator_def;
    let executor_def = ComponentDef::new::<ProviderProps<P>, _>(
        "StoreExecutor",
        move |scope, props| {
            let compute = Arc::clone(&executor_compute);
            let container = scope.use_slot(move || Container::new(compute));
            container.publish(container.compute(&props.props));
            scope.provide_context(&main_channel, Arc::clone(&container));
            let notifier = Arc::clone(&container);
            scope.use_effect(move || {
                notifier.notify();
                None
            });
            vec![Element::new(&leaf, ())]
        },
    );

    // Layer 1: child capture. The executor gets the full props; the children
    // travel around it through the side channel.
    let side_channel = child_channel;
    let executor = executor_def;
    let render = move |scope: &mut Scope<'_>, props: &ProviderProps<P>| {
        scope.provide_context(
            &side_channel,
            Arc::new(ChildSlot {
                node: props.children.clone(),
            }),
        );
        vec![Element::new(&executor, props.clone())]
    };
    let provider_def = if options.memo {
        ComponentDef::with_compare("StoreProvider", render, provider_props_unchanged::<P>)
    } else {
        ComponentDef::new("StoreProvider", render)
    };

    Store {
        container_channel,
        provider_def,
    }
}

/// Shallow prop equality for the memo guard: value-equal props plus
/// identical child elements.
fn provider_props_unchanged<P: PartialEq>(old: &ProviderProps<P>, new: &ProviderProps<P>) -> bool {
    old.props == new.props
        && old.children.len() == new.children.len()
        && old
            .children
            .iter()
            .zip(&new.children)
            .all(|(a, b)| a.identical(b))
}

impl<T, P> Store<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Clone + PartialEq + Send + Sync + 'static,
{
    /// Build a provider element wrapping `children`. Each mount of the
    /// returned element owns an independent container.
    pub fn provider(&self, props: P, children: Vec<Element>) -> Element {
        Element::new(&self.provider_def, ProviderProps { props, children })
    }

    /// Read the store from a consuming component's render.
    ///
    /// With no selector the consumer re-renders on every notification of its
    /// container; with one, only when the extracted snapshot changes. A
    /// missing provider ancestor logs a diagnostic and returns an error
    /// instead of panicking.
    pub fn use_store(
        &self,
        scope: &mut Scope<'_>,
        deps_fn: Option<DepsFn<T>>,
    ) -> Result<T, StoreError> {
        let Some(container) = scope.read_context(&self.container_channel) else {
            error!(
                channel = self.container_channel.name(),
                "use_store called with no StoreProvider above this consumer"
            );
            return Err(StoreError::UninitializedAccess);
        };

        let state = scope.use_slot(BridgeState::<T>::new);
        state.refresh(deps_fn, container.read().as_ref());

        let bridge = StoreBridge::new(Arc::clone(&container), Arc::clone(&state));
        let reader = bridge.clone();
        let value = scope.use_external_store(
            move |on_change| bridge.subscribe(on_change),
            move || reader.read(),
        );
        value.ok_or(StoreError::UninitializedAccess)
    }
}

impl<T, P> Clone for Store<T, P> {
    fn clone(&self) -> Self {
        Self {
            container_channel: self.container_channel.clone(),
            provider_def: Arc::clone(&self.provider_def),
        }
    }
}

impl<T, P> std::fmt::Debug for Store<T, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("provider", &self.provider_def.name())
            .finish()
    }
}
