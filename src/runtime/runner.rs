//! Local task-graph execution
//!
//! One spawned future per task; each future awaits the completion signals of
//! its dependencies, so a task starts the moment its last dependency
//! succeeds. There is no wave barrier: tasks with disjoint dependency
//! closures overlap freely.
//!
//! Failure policy: a failed dependency skips its dependents (they never run),
//! in-flight tasks finish, and `result` reports the first failure recorded.
//! Cancellation flips not-yet-started tasks to skipped and aborts in-flight
//! bodies through their context token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{KhronicleError, Result};
use crate::metadata::TaskProgress;
use crate::runtime::context::{ResultStore, TaskContext};
use crate::task::{RunnableTaskSet, Task};

/// Terminal state of one task within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Pending,
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone)]
struct FailureRecord {
    cancelled: bool,
    task_id: String,
    message: String,
}

#[derive(Debug)]
struct RunnerShared {
    first_failure: Mutex<Option<FailureRecord>>,
    done_tx: watch::Sender<bool>,
}

impl RunnerShared {
    fn record_failure(&self, record: FailureRecord) {
        let mut slot = self.first_failure.lock();
        if slot.is_none() {
            *slot = Some(record);
        }
    }
}

/// Executes a resolved graph in-process.
pub struct LocalRunner {
    graph: Arc<RunnableTaskSet>,
    started: AtomicBool,
    results: Arc<ResultStore>,
    shared: Arc<RunnerShared>,
    done_rx: watch::Receiver<bool>,
}

impl LocalRunner {
    pub fn new(graph: Arc<RunnableTaskSet>) -> Self {
        let (done_tx, done_rx) = watch::channel(false);
        Self {
            graph,
            started: AtomicBool::new(false),
            results: Arc::new(ResultStore::new()),
            shared: Arc::new(RunnerShared {
                first_failure: Mutex::new(None),
                done_tx,
            }),
            done_rx,
        }
    }

    /// Graph members, for external inspection (log pre-registration).
    pub fn tasks(&self) -> &RunnableTaskSet {
        &self.graph
    }

    /// Start the graph asynchronously. Fails only on pre-flight problems;
    /// a second call is an error.
    pub fn run(&self, ctx: &TaskContext) -> Result<()> {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(KhronicleError::AlreadyStarted);
        }

        let exec_ctx = ctx.for_execution(Arc::clone(&self.results));
        debug!(run_id = exec_ctx.run_id(), tasks = self.graph.len(), "starting graph");

        // One state channel per member; dependency edges subscribe.
        let mut senders: FxHashMap<Arc<str>, watch::Sender<TaskState>> = FxHashMap::default();
        let mut receivers: FxHashMap<Arc<str>, watch::Receiver<TaskState>> = FxHashMap::default();
        for task in self.graph.tasks() {
            let (tx, rx) = watch::channel(TaskState::Pending);
            senders.insert(task.reference().name_arc(), tx);
            receivers.insert(task.reference().name_arc(), rx);
        }

        let mut join_set = tokio::task::JoinSet::new();
        for task in self.graph.tasks() {
            let deps: Vec<watch::Receiver<TaskState>> = task
                .dependencies()
                .iter()
                .filter_map(|d| receivers.get(d.reference().name()).cloned())
                .collect();
            let tx = senders
                .remove(&task.reference().name_arc())
                .expect("one sender per graph member");
            join_set.spawn(Self::drive_task(
                Arc::clone(task),
                deps,
                tx,
                exec_ctx.clone(),
                Arc::clone(&self.results),
                Arc::clone(&self.shared),
            ));
        }

        let shared = Arc::clone(&self.shared);
        let cancel = exec_ctx.cancellation();
        tokio::spawn(async move {
            while join_set.join_next().await.is_some() {}
            if cancel.is_cancelled() {
                shared.record_failure(FailureRecord {
                    cancelled: true,
                    task_id: String::new(),
                    message: String::new(),
                });
            }
            let _ = shared.done_tx.send(true);
        });

        Ok(())
    }

    async fn drive_task(
        task: Arc<Task>,
        deps: Vec<watch::Receiver<TaskState>>,
        tx: watch::Sender<TaskState>,
        exec_ctx: TaskContext,
        results: Arc<ResultStore>,
        shared: Arc<RunnerShared>,
    ) {
        // Wait for every dependency to reach a terminal state.
        let mut runnable = true;
        for mut rx in deps {
            let state = loop {
                let current = *rx.borrow();
                if current != TaskState::Pending {
                    break current;
                }
                if rx.changed().await.is_err() {
                    break *rx.borrow();
                }
            };
            if state != TaskState::Succeeded {
                runnable = false;
            }
        }

        let cancel = exec_ctx.cancellation();
        if !runnable || cancel.is_cancelled() {
            let _ = tx.send(TaskState::Skipped);
            return;
        }

        let reference = task.reference().name_arc();
        let task_ctx = exec_ctx.for_task(Arc::clone(&task));
        let reportable = task.labels().progress_reportable();
        if reportable {
            let label = task
                .labels()
                .feature_title()
                .map(|t| t.as_str().to_string())
                .unwrap_or_else(|| reference.to_string());
            task_ctx
                .metadata()
                .progress()
                .update_task(TaskProgress::new(reference.to_string(), label).indeterminate());
        }

        debug!(task = %task.id(), "task started");
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(KhronicleError::Cancelled),
            result = task.invoke(task_ctx.clone()) => result,
        };

        match outcome {
            Ok(value) => {
                results.insert(Arc::clone(&reference), value);
                if reportable {
                    task_ctx.metadata().progress().resolve_task(&reference);
                }
                debug!(task = %task.id(), "task finished");
                let _ = tx.send(TaskState::Succeeded);
            }
            Err(err) => {
                let cancelled = err.is_cancellation();
                if !cancelled {
                    task_ctx
                        .metadata()
                        .errors()
                        .push(err.to_string(), Some(task.id().to_string()));
                    task_ctx.logger().error(err.to_string());
                }
                shared.record_failure(FailureRecord {
                    cancelled,
                    task_id: task.id().to_string(),
                    message: err.to_string(),
                });
                let _ = tx.send(TaskState::Failed);
            }
        }
    }

    /// Completion signal; resolves when every member reached a terminal state.
    pub async fn wait(&self) {
        let mut rx = self.done_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn is_done(&self) -> bool {
        *self.done_rx.borrow()
    }

    /// Per-task results after completion, or the first failure observed.
    pub fn result(&self) -> Result<Arc<ResultStore>> {
        if !self.is_done() {
            return Err(KhronicleError::NotFinished);
        }
        match &*self.shared.first_failure.lock() {
            None => Ok(Arc::clone(&self.results)),
            Some(record) if record.cancelled => Err(KhronicleError::Cancelled),
            Some(record) => Err(KhronicleError::TaskFailure {
                task_id: record.task_id.clone(),
                reason: record.message.clone(),
            }),
        }
    }
}
