//! Trellis Core
//!
//! This crate provides the shared-state store engine for the Trellis
//! component runtime. It implements:
//!
//! - Per-mount state containers with explicit publish/notify phases
//! - Selective subscriptions via dependency snapshots
//! - A three-layer provider that isolates passed-through children from
//!   store-driven re-renders
//! - A registry for app-wide stores rendered by a single root
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `host`: the component-tree runtime contract the engine is built against
//!   (context, mount slots, effects, external-store subscriptions)
//! - `store`: the store engine itself
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::host::{Element, Runtime};
//! use trellis_core::store::create_store;
//!
//! // Define a store computed from provider props.
//! let counter = create_store(|start: &i32| *start);
//!
//! // Somewhere in a consuming component's render:
//! //     let value = counter.use_store(scope, None)?;
//!
//! // Mount a provider around the consuming subtree.
//! let mut runtime = Runtime::new();
//! runtime.mount(counter.provider(0, vec![/* consumers */]));
//! ```

pub mod host;
pub mod store;

pub use host::{
    Cleanup, ComponentDef, ContextChannel, Disposer, Element, InstanceId, OnChange, Runtime,
    Scope, UpdateHandle,
};
pub use store::{
    create_store, create_store_with, global_registry, register_global_executor, Container, Dep,
    DepsFn, DepsSnapshot, ExecutorRegistry, ProviderProps, RootProps, Store, StoreError,
    StoreOptions,
};
