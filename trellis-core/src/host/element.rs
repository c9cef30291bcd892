//! Component Definitions and Elements
//!
//! A `ComponentDef` is the identity of a component: a render function plus an
//! optional render-stability predicate. An `Element` is one request to mount
//! or update that component at a position in the tree, carrying type-erased
//! props.
//!
//! # Identity
//!
//! Reconciliation matches elements to existing instances by definition id and
//! key. Two elements are *identical* when they share the definition, the same
//! props allocation, and the same key; an identical element lets the runtime
//! skip re-rendering the instance entirely (context changes still propagate).

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::scope::Scope;

/// Type-erased shared value. Props, context values, and state slots all
/// travel through the tree in this form.
pub type SharedAny = Arc<dyn Any + Send + Sync>;

type RenderFn = Box<dyn Fn(&mut Scope<'_>, &SharedAny) -> Vec<Element> + Send + Sync>;
type CompareFn = Box<dyn Fn(&SharedAny, &SharedAny) -> bool + Send + Sync>;

/// Unique identifier for a component definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(u64);

impl ComponentId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A component definition: the behavior shared by every instance of a
/// component.
///
/// Definitions are created once (at store-definition or module-init time) and
/// held behind `Arc`; their allocation identity is what reconciliation keys
/// on, so a definition must not be rebuilt per render.
pub struct ComponentDef {
    id: ComponentId,
    name: &'static str,
    props_type: TypeId,
    render: RenderFn,
    compare: Option<CompareFn>,
}

impl ComponentDef {
    /// Create a definition with no render-stability predicate: the instance
    /// re-renders whenever its parent hands it a non-identical element.
    pub fn new<P, F>(name: &'static str, render: F) -> Arc<Self>
    where
        P: Send + Sync + 'static,
        F: Fn(&mut Scope<'_>, &P) -> Vec<Element> + Send + Sync + 'static,
    {
        Arc::new(Self {
            id: ComponentId::next(),
            name,
            props_type: TypeId::of::<P>(),
            render: Self::erase_render(render),
            compare: None,
        })
    }

    /// Create a definition with a render-stability predicate.
    ///
    /// `compare(old, new)` returning `true` means the props are unchanged and
    /// the subtree re-render may be skipped.
    pub fn with_compare<P, F, C>(name: &'static str, render: F, compare: C) -> Arc<Self>
    where
        P: Send + Sync + 'static,
        F: Fn(&mut Scope<'_>, &P) -> Vec<Element> + Send + Sync + 'static,
        C: Fn(&P, &P) -> bool + Send + Sync + 'static,
    {
        Arc::new(Self {
            id: ComponentId::next(),
            name,
            props_type: TypeId::of::<P>(),
            render: Self::erase_render(render),
            compare: Some(Box::new(move |old, new| {
                match (old.downcast_ref::<P>(), new.downcast_ref::<P>()) {
                    (Some(old), Some(new)) => compare(old, new),
                    // A type mismatch is a reconciliation bug; force a render.
                    _ => false,
                }
            })),
        })
    }

    fn erase_render<P, F>(render: F) -> RenderFn
    where
        P: Send + Sync + 'static,
        F: Fn(&mut Scope<'_>, &P) -> Vec<Element> + Send + Sync + 'static,
    {
        Box::new(move |scope, props| {
            let props = props
                .downcast_ref::<P>()
                .expect("element props type does not match component definition");
            render(scope, props)
        })
    }

    /// The definition's unique id.
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// The debug name given at construction.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn render(&self, scope: &mut Scope<'_>, props: &SharedAny) -> Vec<Element> {
        (self.render)(scope, props)
    }

    /// Whether this definition's predicate reports the props unchanged.
    /// Definitions without a predicate always report "changed".
    pub(crate) fn props_unchanged(&self, old: &SharedAny, new: &SharedAny) -> bool {
        match &self.compare {
            Some(compare) => compare(old, new),
            None => false,
        }
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDef")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("memo", &self.compare.is_some())
            .finish()
    }
}

/// One request to render a component with the given props at a tree position.
#[derive(Clone)]
pub struct Element {
    def: Arc<ComponentDef>,
    props: SharedAny,
    key: Option<u64>,
}

impl Element {
    /// Build an element for `def` with typed props.
    pub fn new<P: Send + Sync + 'static>(def: &Arc<ComponentDef>, props: P) -> Self {
        debug_assert_eq!(
            TypeId::of::<P>(),
            def.props_type,
            "props type mismatch for component `{}`",
            def.name
        );
        Self {
            def: Arc::clone(def),
            props: Arc::new(props),
            key: None,
        }
    }

    /// Build a keyed element. Keys disambiguate siblings of the same
    /// definition across list reorders.
    pub fn keyed<P: Send + Sync + 'static>(def: &Arc<ComponentDef>, props: P, key: u64) -> Self {
        let mut element = Self::new(def, props);
        element.key = Some(key);
        element
    }

    pub fn def(&self) -> &Arc<ComponentDef> {
        &self.def
    }

    pub fn key(&self) -> Option<u64> {
        self.key
    }

    pub(crate) fn props(&self) -> &SharedAny {
        &self.props
    }

    /// Whether two elements are the same request: same definition, same props
    /// allocation, same key.
    pub fn identical(&self, other: &Element) -> bool {
        Arc::ptr_eq(&self.def, &other.def)
            && Arc::ptr_eq(&self.props, &other.props)
            && self.key == other.key
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("component", &self.def.name)
            .field("key", &self.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &'static str) -> Arc<ComponentDef> {
        ComponentDef::new::<(), _>(name, |_, _| Vec::new())
    }

    #[test]
    fn definition_ids_are_unique() {
        let a = leaf("a");
        let b = leaf("b");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn identical_elements_share_props_allocation() {
        let def = leaf("leaf");
        let element = Element::new(&def, ());
        let clone = element.clone();
        assert!(element.identical(&clone));

        // Fresh props allocation, even with an equal value, is not identical.
        let rebuilt = Element::new(&def, ());
        assert!(!element.identical(&rebuilt));
    }

    #[test]
    fn keys_distinguish_elements() {
        let def = leaf("leaf");
        let a = Element::keyed(&def, (), 0);
        let b = a.clone();
        assert!(a.identical(&b));
        assert_eq!(a.key(), Some(0));
    }

    #[test]
    fn compare_predicate_reports_unchanged() {
        let def = ComponentDef::with_compare::<i32, _, _>(
            "memoized",
            |_, _| Vec::new(),
            |old, new| old == new,
        );
        let old: SharedAny = Arc::new(1i32);
        let new: SharedAny = Arc::new(1i32);
        let changed: SharedAny = Arc::new(2i32);
        assert!(def.props_unchanged(&old, &new));
        assert!(!def.props_unchanged(&old, &changed));
    }
}
