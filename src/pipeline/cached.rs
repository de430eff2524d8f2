//! Cached tasks
//!
//! A cached task's body receives its previous result (value + digest) from
//! the process shared map. When the freshly computed digest matches, the body
//! returns the previous result object untouched and skips the expensive
//! recomputation; either way the returned result becomes the next run's
//! previous value. This is what keeps repeated dry-run cycles cheap.

use std::sync::Arc;

use xxhash_rust::xxh3::xxh3_64;

use crate::error::Result;
use crate::runtime::TaskContext;
use crate::task::{Dependency, LabelSet, Task, TaskId};
use crate::typedmap::TypedKey;

/// Value plus the digest of the inputs that produced it.
#[derive(Debug)]
pub struct CachedResult<T> {
    pub value: Arc<T>,
    pub digest: Arc<str>,
}

impl<T> CachedResult<T> {
    pub fn new(value: T, digest: impl Into<Arc<str>>) -> Self {
        Self {
            value: Arc::new(value),
            digest: digest.into(),
        }
    }

    /// True when `digest` matches the given input digest.
    pub fn is_fresh(&self, digest: &str) -> bool {
        &*self.digest == digest
    }
}

impl<T> Clone for CachedResult<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            digest: Arc::clone(&self.digest),
        }
    }
}

/// Cheap input digest for cache freshness checks.
pub fn digest_of(bytes: impl AsRef<[u8]>) -> Arc<str> {
    Arc::from(format!("{:016x}", xxh3_64(bytes.as_ref())))
}

fn cache_key<T: Send + Sync + 'static>(reference: &str) -> TypedKey<CachedResult<T>> {
    TypedKey::new(format!("khronicle.cache.{reference}"))
}

/// Declare a cached task.
///
/// The body gets `Some(previous)` when an earlier execution of this task id
/// stored a result in the process shared map, `None` on the first run.
pub fn cached_task<T, F, Fut>(
    id: TaskId<CachedResult<T>>,
    dependencies: Vec<Dependency>,
    labels: LabelSet,
    body: F,
) -> Arc<Task>
where
    T: Send + Sync + 'static,
    F: Fn(TaskContext, Option<CachedResult<T>>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<CachedResult<T>>> + Send + 'static,
{
    let reference = id.reference().name().to_string();
    Task::typed(id, dependencies, labels, move |ctx| {
        let key = cache_key::<T>(&reference);
        let previous = ctx
            .process_store()
            .get(&key)
            .map(|cached| (*cached).clone());
        let fut = body(ctx.clone(), previous);
        async move {
            let result = fut.await?;
            ctx.process_store().set(&key, result.clone());
            Ok(result)
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::task::TaskRef;

    fn counting_task(counter: Arc<AtomicUsize>, digest: &'static str) -> Arc<Task> {
        cached_task(
            TaskId::<CachedResult<String>>::new("expensive"),
            vec![],
            LabelSet::default(),
            move |_ctx, previous: Option<CachedResult<String>>| {
                let counter = Arc::clone(&counter);
                async move {
                    if let Some(prev) = previous {
                        if prev.is_fresh(digest) {
                            return Ok(prev);
                        }
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(CachedResult::new("computed".to_string(), digest))
                }
            },
        )
    }

    #[tokio::test]
    async fn equal_digest_returns_identical_result_object() {
        let counter = Arc::new(AtomicUsize::new(0));
        let ctx = TaskContext::detached();
        let task = counting_task(Arc::clone(&counter), "d");

        let first = task.invoke(ctx.clone()).await.unwrap();
        let first = first.downcast::<CachedResult<String>>().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let second = task.invoke(ctx.clone()).await.unwrap();
        let second = second.downcast::<CachedResult<String>>().unwrap();
        // No recomputation, and the value is the same shared object.
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first.value, &second.value));
    }

    #[tokio::test]
    async fn changed_digest_recomputes() {
        let counter = Arc::new(AtomicUsize::new(0));
        let ctx = TaskContext::detached();

        let first = counting_task(Arc::clone(&counter), "d");
        first.invoke(ctx.clone()).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // Same reference, new digest: the stored previous value is stale.
        let second = counting_task(Arc::clone(&counter), "d2");
        second.invoke(ctx.clone()).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cache_is_scoped_per_process_store() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = counting_task(Arc::clone(&counter), "d");

        task.invoke(TaskContext::detached()).await.unwrap();
        task.invoke(TaskContext::detached()).await.unwrap();
        // Separate process stores: no shared previous value.
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn digest_is_stable_hex() {
        let a = digest_of("input");
        let b = digest_of("input");
        let c = digest_of("other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn typed_result_lookup_works_via_task_ref() {
        // Compile-time check: a cached task's reference is a TaskRef over
        // CachedResult<T>.
        let _: TaskRef<CachedResult<String>> =
            TaskId::<CachedResult<String>>::new("expensive").reference();
    }
}
