//! Shared-State Store Engine
//!
//! The store engine turns one state-computing function into shareable state:
//! a provider component owns the state and recomputes it from its props;
//! consumer components anywhere below read it and re-render when it changes,
//! optionally narrowed to the fields they extract.
//!
//! Module map:
//!
//! - [`container`]: the per-mount value cell and subscriber set.
//! - [`deps`]: dependency snapshots and their comparison semantics.
//! - [`bridge`]: adapts container notifications to the host's
//!   external-store hook, filtering through the consumer's selector.
//! - [`assembly`]: `create_store` and the three-layer provider.
//! - [`registry`]: app-wide stores with no provider location of their own.
//! - [`error`]: the engine's observable failure mode.

pub mod assembly;
pub mod bridge;
pub mod container;
pub mod deps;
pub mod error;
pub mod registry;

pub use assembly::{create_store, create_store_with, ProviderProps, Store, StoreOptions};
pub use bridge::{BridgeState, StoreBridge};
pub use container::{ComputeFn, Container};
pub use deps::{Dep, DepsFn, DepsSnapshot};
pub use error::StoreError;
pub use registry::{
    global_registry, register_global_executor, ExecutorRegistry, RootProps,
};
