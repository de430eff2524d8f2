//! Task model: identity, labels, descriptor and sets
//!
//! A [`Task`] is immutable after construction and held by `Arc` in one or
//! more [`TaskSet`]s. Its output travels untyped through the runtime
//! (`Arc<dyn Any>`); the typed builders and [`crate::runtime::TaskContext`]
//! keep user code fully typed at both ends.

mod id;
mod label;
mod reference;
mod set;

use std::any::Any;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

pub use id::{TaskId, UntypedId};
pub use label::{FormLabel, LabelSet, LabelSetBuilder};
pub use reference::{Dependency, TaskRef, UntypedRef};
pub use set::{RunnableTaskSet, TaskSet};

use crate::error::Result;
use crate::runtime::TaskContext;

/// Untyped task output, shared between the result store and dependents.
pub type TaskValue = Arc<dyn Any + Send + Sync>;

/// Boxed future produced by a task body.
pub type TaskFuture = BoxFuture<'static, Result<TaskValue>>;

type RunFn = Arc<dyn Fn(TaskContext) -> TaskFuture + Send + Sync>;

/// One node of the dependency graph.
pub struct Task {
    id: UntypedId,
    dependencies: Vec<Dependency>,
    labels: LabelSet,
    run: RunFn,
}

impl Task {
    /// Declare a task with a typed output.
    ///
    /// The body receives the run context and produces `T`; the wrapper erases
    /// the type for the result store.
    pub fn typed<T, F, Fut>(
        id: TaskId<T>,
        dependencies: Vec<Dependency>,
        labels: LabelSet,
        body: F,
    ) -> Arc<Task>
    where
        T: Send + Sync + 'static,
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<T>> + Send + 'static,
    {
        Arc::new(Task {
            id: id.untyped(),
            dependencies,
            labels,
            run: Arc::new(move |ctx| {
                let fut = body(ctx);
                async move { fut.await.map(|value| Arc::new(value) as TaskValue) }.boxed()
            }),
        })
    }

    pub fn id(&self) -> &UntypedId {
        &self.id
    }

    pub fn reference(&self) -> &UntypedRef {
        self.id.reference()
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Start the task body. The runner is the only caller.
    pub(crate) fn invoke(&self, ctx: TaskContext) -> TaskFuture {
        (self.run)(ctx)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field(
                "dependencies",
                &self
                    .dependencies
                    .iter()
                    .map(|d| d.reference().name().to_string())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn typed_task_erases_and_recovers_output() {
        let task = Task::typed(
            TaskId::<u32>::new("answer"),
            vec![],
            LabelSet::default(),
            |_ctx| async { Ok(42u32) },
        );
        assert_eq!(task.reference().name(), "answer");
        assert!(task.dependencies().is_empty());

        let ctx = crate::runtime::TaskContext::detached();
        let value = task.invoke(ctx).await.unwrap();
        assert_eq!(*value.downcast::<u32>().unwrap(), 42);
    }
}
