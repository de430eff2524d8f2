//! Task implementation identity
//!
//! A `TaskId<T>` is a `TaskRef<T>` plus an optional implementation tag and a
//! selection priority. Two implementations of the same reference must differ
//! in tag; the resolver picks the highest priority (ties broken by
//! lexicographic tag order).

use std::marker::PhantomData;
use std::sync::Arc;

use super::reference::{TaskRef, UntypedRef};

/// Untyped implementation identity, the form stored on a [`crate::task::Task`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct UntypedId {
    reference: UntypedRef,
    tag: Option<Arc<str>>,
    priority: i32,
}

impl UntypedId {
    pub fn reference(&self) -> &UntypedRef {
        &self.reference
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Uniqueness key within a `TaskSet`.
    pub fn key(&self) -> (Arc<str>, Option<Arc<str>>) {
        (self.reference.name_arc(), self.tag.clone())
    }
}

impl std::fmt::Display for UntypedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}#{}", self.reference, tag),
            None => write!(f, "{}", self.reference),
        }
    }
}

impl std::fmt::Debug for UntypedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UntypedId({self})")
    }
}

/// Typed implementation identity used when declaring tasks.
pub struct TaskId<T> {
    raw: UntypedId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TaskId<T> {
    /// Untagged implementation with default priority.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            raw: UntypedId {
                reference: UntypedRef::new(name),
                tag: None,
                priority: 0,
            },
            _marker: PhantomData,
        }
    }

    /// Tagged implementation of a shared reference.
    pub fn tagged(name: impl Into<Arc<str>>, tag: impl Into<Arc<str>>) -> Self {
        Self {
            raw: UntypedId {
                reference: UntypedRef::new(name),
                tag: Some(tag.into()),
                priority: 0,
            },
            _marker: PhantomData,
        }
    }

    /// Selection priority; larger wins when several implementations compete.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.raw.priority = priority;
        self
    }

    /// Project to the reference this implementation serves.
    pub fn reference(&self) -> TaskRef<T> {
        TaskRef::new(self.raw.reference.name_arc())
    }

    pub fn untyped(&self) -> UntypedId {
        self.raw.clone()
    }
}

impl<T> Clone for TaskId<T> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for TaskId<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TaskId({})", self.raw)
    }
}
