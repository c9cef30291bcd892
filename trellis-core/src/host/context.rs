//! Context Channels
//!
//! A context channel propagates a value from a providing instance to every
//! descendant that reads it, without threading the value through props.
//!
//! # How Propagation Works
//!
//! 1. A provider publishes a value on a channel during its render; the value
//!    becomes part of the environment handed to its subtree.
//!
//! 2. A reader pulls the value out of its environment. The runtime records
//!    which channels an instance read and the identity of each value seen.
//!
//! 3. When a subtree re-render is skipped (identical element or a
//!    render-stability predicate), the runtime still walks the skipped
//!    instances and re-renders any whose recorded reads no longer match the
//!    incoming environment by identity. Context changes therefore punch
//!    through memoization, exactly like the host runtimes this models.
//!
//! Channels are typed at the edges and type-erased in the environment; a
//! reader that downcasts to the wrong type sees no value.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use super::element::SharedAny;

/// Unique identifier for a context channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// The set of context values visible at a tree position, keyed by channel.
///
/// Insertion order is preserved so traversal stays deterministic.
pub type ContextEnv = IndexMap<ChannelId, SharedAny>;

/// Identity of a shared value: the address of its allocation.
///
/// Two reads observe "the same value" iff the provider handed down the same
/// `Arc`, regardless of the pointee's contents.
pub(crate) fn value_identity(value: &SharedAny) -> usize {
    Arc::as_ptr(value) as *const u8 as usize
}

/// A typed handle to one propagation channel.
///
/// The handle is cheap to clone; all clones address the same channel.
pub struct ContextChannel<V> {
    id: ChannelId,
    name: &'static str,
    _marker: PhantomData<fn() -> V>,
}

impl<V: Send + Sync + 'static> ContextChannel<V> {
    /// Create a fresh channel. Each call creates a distinct channel even for
    /// the same value type.
    pub fn new(name: &'static str) -> Self {
        Self {
            id: ChannelId::next(),
            name,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Downcast an environment entry back to the channel's value type.
    pub(crate) fn extract(&self, value: &SharedAny) -> Option<Arc<V>> {
        let value: Arc<dyn Any + Send + Sync> = Arc::clone(value);
        value.downcast::<V>().ok()
    }
}

impl<V> Clone for ContextChannel<V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name,
            _marker: PhantomData,
        }
    }
}

impl<V> std::fmt::Debug for ContextChannel<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextChannel")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}
