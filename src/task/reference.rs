//! Task references - the identity a dependency points at
//!
//! A reference names an output slot, not an implementation: several task
//! implementations may serve the same reference and the resolver picks one.
//! `TaskRef<T>` is the typed face used by builders and result lookups;
//! `UntypedRef` is what dependency lists and indexes store.

use std::marker::PhantomData;
use std::sync::Arc;

/// Reference string without an output type. Interned as `Arc<str>` so clones
/// across sets, graphs and metadata are O(1).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UntypedRef {
    name: Arc<str>,
}

impl UntypedRef {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }
}

impl std::fmt::Display for UntypedRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl std::fmt::Debug for UntypedRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UntypedRef({})", self.name)
    }
}

impl From<&str> for UntypedRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Typed task reference: the reference string plus the expected output type.
pub struct TaskRef<T> {
    inner: UntypedRef,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TaskRef<T> {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            inner: UntypedRef::new(name),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Drop the output type for storage in dependency lists.
    pub fn untyped(&self) -> UntypedRef {
        self.inner.clone()
    }
}

impl<T> Clone for TaskRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for TaskRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TaskRef({})", self.inner.name())
    }
}

/// One entry of a task's dependency list.
///
/// Required dependencies fail resolution when no candidate exists; optional
/// dependencies are dropped silently instead. Optional dependencies carry the
/// aggregation patterns (inventory over discovery tasks, serializer over
/// selected features) where the dependency set is legitimately data-driven.
#[derive(Clone, Debug)]
pub struct Dependency {
    reference: UntypedRef,
    optional: bool,
}

impl Dependency {
    pub fn required(reference: impl Into<UntypedRef>) -> Self {
        Self {
            reference: reference.into(),
            optional: false,
        }
    }

    pub fn optional(reference: impl Into<UntypedRef>) -> Self {
        Self {
            reference: reference.into(),
            optional: true,
        }
    }

    pub fn reference(&self) -> &UntypedRef {
        &self.reference
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }
}

impl From<UntypedRef> for Dependency {
    fn from(reference: UntypedRef) -> Self {
        Self::required(reference)
    }
}

impl<T> From<&TaskRef<T>> for Dependency {
    fn from(reference: &TaskRef<T>) -> Self {
        Self::required(reference.untyped())
    }
}

impl From<&str> for Dependency {
    fn from(name: &str) -> Self {
        Self::required(UntypedRef::new(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untyped_projection_preserves_name() {
        let typed = TaskRef::<Vec<String>>::new("logs-input");
        assert_eq!(typed.untyped().name(), "logs-input");
    }

    #[test]
    fn dependency_from_typed_ref_is_required() {
        let typed = TaskRef::<u32>::new("count");
        let dep: Dependency = (&typed).into();
        assert!(!dep.is_optional());
        assert_eq!(dep.reference().name(), "count");
    }

    #[test]
    fn refs_intern_cheaply() {
        let a = UntypedRef::new("x");
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(a.name_arc().as_ptr(), b.name_arc().as_ptr());
    }
}
