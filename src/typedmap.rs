//! Typed heterogeneous maps
//!
//! Two variants share one key type:
//! - `TypedMap`: single-owner map used for task labels (immutable after build)
//! - `SharedTypedMap`: lock-free concurrent map used for the session store,
//!   the process store and metadata storage
//!
//! A `TypedKey<T>` carries its value type, so `get`/`set` never cast: a value
//! stored under a key can only come back as that key's type.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;
use rustc_hash::FxHashMap;

/// Map key carrying its value type at compile time.
///
/// Keys with the same name but different types address different values
/// as far as the type system is concerned; at runtime the later `set` wins,
/// and a mismatched `get` returns `None`.
pub struct TypedKey<T> {
    name: Arc<str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedKey<T> {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Clone for TypedKey<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for TypedKey<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TypedKey({})", self.name)
    }
}

type Stored = Arc<dyn Any + Send + Sync>;

// ═══════════════════════════════════════════════════════════════
// TYPED MAP (single owner)
// ═══════════════════════════════════════════════════════════════

/// Heterogeneous map with typed access. Not synchronized; wrap in a lock or
/// use [`SharedTypedMap`] when shared across tasks.
#[derive(Default, Clone)]
pub struct TypedMap {
    entries: FxHashMap<Arc<str>, Stored>,
}

impl TypedMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Send + Sync + 'static>(&mut self, key: &TypedKey<T>, value: T) {
        self.entries
            .insert(Arc::clone(&key.name), Arc::new(value) as Stored);
    }

    /// Typed retrieval; `None` when absent or stored under a different type.
    pub fn get<T: Send + Sync + 'static>(&self, key: &TypedKey<T>) -> Option<Arc<T>> {
        self.entries
            .get(key.name.as_ref())
            .and_then(|v| Arc::clone(v).downcast::<T>().ok())
    }

    /// Cloning retrieval for `Copy`-ish label values.
    pub fn get_cloned<T: Clone + Send + Sync + 'static>(&self, key: &TypedKey<T>) -> Option<T> {
        self.get(key).map(|v| (*v).clone())
    }

    pub fn contains<T>(&self, key: &TypedKey<T>) -> bool {
        self.entries.contains_key(key.name.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Immutable point-in-time copy. Entries are shared, not deep-copied.
    pub fn snapshot(&self) -> TypedMapSnapshot {
        TypedMapSnapshot {
            entries: self.entries.clone(),
        }
    }
}

/// Read-only view produced by [`TypedMap::snapshot`].
#[derive(Clone)]
pub struct TypedMapSnapshot {
    entries: FxHashMap<Arc<str>, Stored>,
}

impl TypedMapSnapshot {
    pub fn get<T: Send + Sync + 'static>(&self, key: &TypedKey<T>) -> Option<Arc<T>> {
        self.entries
            .get(key.name.as_ref())
            .and_then(|v| Arc::clone(v).downcast::<T>().ok())
    }

    pub fn contains<T>(&self, key: &TypedKey<T>) -> bool {
        self.entries.contains_key(key.name.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for TypedMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedMap")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════
// SHARED TYPED MAP (concurrent)
// ═══════════════════════════════════════════════════════════════

/// Concurrency-safe typed map. Single-key reads and writes are atomic;
/// `snapshot` returns a consistent point-in-time copy for iteration.
///
/// Cloning is shallow: all clones address the same underlying map.
#[derive(Default, Clone)]
pub struct SharedTypedMap {
    entries: Arc<DashMap<Arc<str>, Stored>>,
}

impl SharedTypedMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Send + Sync + 'static>(&self, key: &TypedKey<T>, value: T) {
        self.entries
            .insert(Arc::clone(&key.name), Arc::new(value) as Stored);
    }

    /// Store an already shared value without re-wrapping.
    pub fn set_arc<T: Send + Sync + 'static>(&self, key: &TypedKey<T>, value: Arc<T>) {
        self.entries
            .insert(Arc::clone(&key.name), value as Stored);
    }

    pub fn get<T: Send + Sync + 'static>(&self, key: &TypedKey<T>) -> Option<Arc<T>> {
        self.entries
            .get(key.name.as_ref())
            .and_then(|v| Arc::clone(v.value()).downcast::<T>().ok())
    }

    /// Atomic get-or-insert via the DashMap entry API.
    pub fn get_or_insert_with<T: Send + Sync + 'static>(
        &self,
        key: &TypedKey<T>,
        init: impl FnOnce() -> T,
    ) -> Arc<T> {
        use dashmap::mapref::entry::Entry;

        match self.entries.entry(Arc::clone(&key.name)) {
            Entry::Occupied(mut e) => match Arc::clone(e.get()).downcast::<T>() {
                Ok(v) => v,
                Err(_) => {
                    // Same name stored under another type; replace it.
                    let value = Arc::new(init());
                    e.insert(Arc::clone(&value) as Stored);
                    value
                }
            },
            Entry::Vacant(e) => {
                let value = Arc::new(init());
                e.insert(Arc::clone(&value) as Stored);
                value
            }
        }
    }

    pub fn contains<T>(&self, key: &TypedKey<T>) -> bool {
        self.entries.contains_key(key.name.as_ref())
    }

    pub fn remove<T>(&self, key: &TypedKey<T>) {
        self.entries.remove(key.name.as_ref());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consistent point-in-time copy of the key set.
    pub fn snapshot_keys(&self) -> Vec<Arc<str>> {
        self.entries.iter().map(|e| Arc::clone(e.key())).collect()
    }
}

impl std::fmt::Debug for SharedTypedMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTypedMap")
            .field("len", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_roundtrip() {
        let key = TypedKey::<u32>::new("answer");
        let mut map = TypedMap::new();
        map.set(&key, 42u32);
        assert_eq!(map.get_cloned(&key), Some(42));
    }

    #[test]
    fn type_mismatch_returns_none() {
        let int_key = TypedKey::<u32>::new("value");
        let str_key = TypedKey::<String>::new("value");
        let mut map = TypedMap::new();
        map.set(&int_key, 1u32);
        assert!(map.get(&str_key).is_none());
        // The untyped slot is still occupied.
        assert!(map.contains(&str_key));
    }

    #[test]
    fn snapshot_does_not_see_later_writes() {
        let key_a = TypedKey::<u8>::new("a");
        let key_b = TypedKey::<u8>::new("b");
        let mut map = TypedMap::new();
        map.set(&key_a, 1);
        let snap = map.snapshot();
        map.set(&key_b, 2);
        assert_eq!(snap.get(&key_a).map(|v| *v), Some(1));
        assert!(!snap.contains(&key_b));
        assert_eq!(snap.len(), 1);
    }

    #[test]
    fn shared_map_clone_is_shallow() {
        let key = TypedKey::<String>::new("shared");
        let map = SharedTypedMap::new();
        let clone = map.clone();
        map.set(&key, "hello".to_string());
        assert_eq!(clone.get(&key).as_deref(), Some(&"hello".to_string()));
    }

    #[test]
    fn get_or_insert_with_is_atomic_per_key() {
        let key = TypedKey::<Vec<i64>>::new("slice");
        let map = SharedTypedMap::new();
        let first = map.get_or_insert_with(&key, || vec![1]);
        let second = map.get_or_insert_with(&key, || vec![2]);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*second, vec![1]);
    }

    #[test]
    fn concurrent_writes_all_stored() {
        use std::thread;

        let map = SharedTypedMap::new();
        let handles: Vec<_> = (0..64)
            .map(|i| {
                let map = map.clone();
                thread::spawn(move || {
                    let key = TypedKey::<usize>::new(format!("k{i}"));
                    map.set(&key, i);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(map.len(), 64);
        for i in 0..64 {
            let key = TypedKey::<usize>::new(format!("k{i}"));
            assert_eq!(map.get(&key).map(|v| *v), Some(i));
        }
    }

    #[test]
    fn snapshot_keys_is_point_in_time() {
        let map = SharedTypedMap::new();
        map.set(&TypedKey::<u8>::new("a"), 1);
        map.set(&TypedKey::<u8>::new("b"), 2);
        let snap = map.snapshot_keys();
        map.set(&TypedKey::<u8>::new("c"), 3);
        assert_eq!(snap.len(), 2);
    }
}
