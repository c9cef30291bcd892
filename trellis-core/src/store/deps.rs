//! Dependency Snapshots
//!
//! A consumer can narrow its subscription by supplying a selector that
//! extracts an ordered list of comparison values from the store's current
//! data. Each notification recomputes the list and compares it positionally
//! against the previous one; only a difference re-renders the consumer.
//!
//! # Comparison Semantics
//!
//! A length change always counts as a change. Elements compare positionally:
//! [`Dep::of`] captures a `PartialEq` value and compares by value (two
//! entries of different types are never equal), [`Dep::identity`] compares by
//! allocation so shared structures can participate without an equality impl.

use std::any::Any;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::host::SharedAny;

/// Selector supplied by a consumer: extracts the comparison values it cares
/// about from the store's current data.
pub type DepsFn<T> = Arc<dyn Fn(&T) -> DepsSnapshot + Send + Sync>;

type DepEq = fn(&(dyn Any + Send + Sync), &(dyn Any + Send + Sync)) -> bool;

fn value_eq<V: PartialEq + 'static>(
    a: &(dyn Any + Send + Sync),
    b: &(dyn Any + Send + Sync),
) -> bool {
    match (a.downcast_ref::<V>(), b.downcast_ref::<V>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn identity_eq(a: &(dyn Any + Send + Sync), b: &(dyn Any + Send + Sync)) -> bool {
    let a = a as *const (dyn Any + Send + Sync) as *const u8;
    let b = b as *const (dyn Any + Send + Sync) as *const u8;
    std::ptr::eq(a, b)
}

/// One comparison unit in a snapshot.
#[derive(Clone)]
pub struct Dep {
    value: SharedAny,
    eq: DepEq,
}

impl Dep {
    /// Capture a value compared by `PartialEq` against the same position in
    /// the previous snapshot.
    pub fn of<V: PartialEq + Send + Sync + 'static>(value: V) -> Self {
        Self {
            value: Arc::new(value),
            eq: value_eq::<V>,
        }
    }

    /// Capture a shared value compared by allocation identity.
    pub fn identity(value: SharedAny) -> Self {
        Self {
            value,
            eq: identity_eq,
        }
    }

    fn same(&self, other: &Dep) -> bool {
        (self.eq)(&*self.value, &*other.value)
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Dep")
    }
}

/// An ordered sequence of comparison values extracted by a selector.
#[derive(Clone, Debug, Default)]
pub struct DepsSnapshot(SmallVec<[Dep; 4]>);

impl DepsSnapshot {
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    /// Build a snapshot from comparison units, in order.
    pub fn of<I: IntoIterator<Item = Dep>>(deps: I) -> Self {
        Self(deps.into_iter().collect())
    }

    pub fn push(&mut self, dep: Dep) {
        self.0.push(dep);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this snapshot differs from `previous`: a length change or any
    /// positional element differing.
    pub fn changed_from(&self, previous: &DepsSnapshot) -> bool {
        if self.0.len() != previous.0.len() {
            return true;
        }
        self.0
            .iter()
            .zip(previous.0.iter())
            .any(|(next, prev)| !next.same(prev))
    }
}

impl FromIterator<Dep> for DepsSnapshot {
    fn from_iter<I: IntoIterator<Item = Dep>>(iter: I) -> Self {
        Self::of(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_values_are_unchanged() {
        let a = DepsSnapshot::of([Dep::of(5i32), Dep::of("name".to_string())]);
        let b = DepsSnapshot::of([Dep::of(5i32), Dep::of("name".to_string())]);
        assert!(!a.changed_from(&b));
    }

    #[test]
    fn differing_element_is_a_change() {
        let a = DepsSnapshot::of([Dep::of(5i32)]);
        let b = DepsSnapshot::of([Dep::of(6i32)]);
        assert!(b.changed_from(&a));
    }

    #[test]
    fn length_change_is_always_a_change() {
        let a = DepsSnapshot::of([Dep::of(5i32)]);
        let b = DepsSnapshot::of([Dep::of(5i32), Dep::of(5i32)]);
        assert!(b.changed_from(&a));
        assert!(a.changed_from(&b));
        assert!(DepsSnapshot::new().changed_from(&a));
    }

    #[test]
    fn type_mismatch_at_a_position_is_a_change() {
        let a = DepsSnapshot::of([Dep::of(5i32)]);
        let b = DepsSnapshot::of([Dep::of(5i64)]);
        assert!(b.changed_from(&a));
    }

    #[test]
    fn identity_deps_compare_by_allocation() {
        let shared: SharedAny = Arc::new(vec![1, 2, 3]);
        let a = DepsSnapshot::of([Dep::identity(shared.clone())]);
        let b = DepsSnapshot::of([Dep::identity(shared)]);
        assert!(!b.changed_from(&a));

        let rebuilt: SharedAny = Arc::new(vec![1, 2, 3]);
        let c = DepsSnapshot::of([Dep::identity(rebuilt)]);
        assert!(c.changed_from(&a));
    }
}
