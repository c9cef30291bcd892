//! Host Runtime Contract
//!
//! The store engine in [`crate::store`] is written against a small set of
//! primitives a component-tree runtime supplies: subtree-scoped context
//! propagation, mount-lifetime state slots, a render-stability predicate, a
//! post-commit effect queue with guaranteed cleanup, and an external-store
//! subscribe/read hook. This module provides those primitives as a minimal,
//! deterministic, single-threaded runtime.
//!
//! Nothing in here knows about stores; the dependency points strictly the
//! other way. Applications embedding the engine in a full UI framework would
//! supply these same primitives from that framework instead.

mod context;
mod element;
mod runtime;
mod scope;

pub use context::{ChannelId, ContextChannel, ContextEnv};
pub use element::{ComponentDef, ComponentId, Element, SharedAny};
pub use runtime::{InstanceId, Runtime, RuntimeShared};
pub use scope::{Cleanup, Disposer, OnChange, Scope, UpdateHandle};
