//! Run context
//!
//! Every task body receives a `TaskContext`: the run/inspection identity,
//! the execution mode, the user's form inputs, the session and process shared
//! maps, the I/O folders, the metadata bus, the cancellation token and the
//! dependency results. Contexts are cheap clones of a shared core.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::logging::TaskLogger;
use crate::metadata::MetadataBus;
use crate::task::{Task, TaskRef, TaskValue};
use crate::typedmap::SharedTypedMap;

/// Dry-run computes metadata only; run produces the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    DryRun,
    Run,
}

impl ExecutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::DryRun => "dryrun",
            ExecutionMode::Run => "run",
        }
    }

    pub fn is_run(self) -> bool {
        self == ExecutionMode::Run
    }
}

/// Folders the runtime reads and writes.
#[derive(Debug, Clone)]
pub struct IoConfig {
    pub temp_dir: PathBuf,
    pub data_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub app_root: PathBuf,
}

impl Default for IoConfig {
    fn default() -> Self {
        let temp = std::env::temp_dir();
        Self {
            temp_dir: temp.clone(),
            data_dir: temp.clone(),
            upload_dir: temp.clone(),
            app_root: temp,
        }
    }
}

/// Per-run dependency results, keyed by task reference.
#[derive(Default)]
pub struct ResultStore {
    values: DashMap<Arc<str>, TaskValue>,
}

impl std::fmt::Debug for ResultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStore")
            .field("len", &self.values.len())
            .finish()
    }
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, reference: Arc<str>, value: TaskValue) {
        self.values.insert(reference, value);
    }

    /// Typed result lookup.
    pub fn get<T: Send + Sync + 'static>(&self, reference: &TaskRef<T>) -> Option<Arc<T>> {
        self.values
            .get(reference.name())
            .and_then(|v| Arc::clone(v.value()).downcast::<T>().ok())
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.values.contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

#[derive(Debug)]
struct ContextCore {
    run_id: Arc<str>,
    inspection_id: Arc<str>,
    mode: ExecutionMode,
    inputs: Arc<serde_json::Map<String, Value>>,
    session_store: SharedTypedMap,
    process_store: SharedTypedMap,
    io: Arc<IoConfig>,
    metadata: MetadataBus,
    cancel: CancellationToken,
    results: Arc<ResultStore>,
}

/// Context handed to task bodies and interceptors.
#[derive(Clone, Debug)]
pub struct TaskContext {
    core: Arc<ContextCore>,
    task: Option<Arc<Task>>,
    logger: TaskLogger,
}

impl TaskContext {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Minimal detached context: fresh stores, no graph, no inputs.
    pub fn detached() -> Self {
        Self::builder().build()
    }

    pub fn run_id(&self) -> &str {
        &self.core.run_id
    }

    pub fn inspection_id(&self) -> &str {
        &self.core.inspection_id
    }

    pub fn mode(&self) -> ExecutionMode {
        self.core.mode
    }

    /// User-supplied form value for a reference, if any.
    pub fn input(&self, reference: &str) -> Option<&Value> {
        self.core.inputs.get(reference)
    }

    /// Session-scoped shared map (one per inspection).
    pub fn session_store(&self) -> &SharedTypedMap {
        &self.core.session_store
    }

    /// Process-wide shared map (previous form values, cached task results).
    pub fn process_store(&self) -> &SharedTypedMap {
        &self.core.process_store
    }

    pub fn io(&self) -> &IoConfig {
        &self.core.io
    }

    pub fn metadata(&self) -> &MetadataBus {
        &self.core.metadata
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.core.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.core.cancel.is_cancelled()
    }

    pub fn logger(&self) -> &TaskLogger {
        &self.logger
    }

    /// The task this context was narrowed to, when inside a task body.
    pub fn current_task(&self) -> Option<&Arc<Task>> {
        self.task.as_ref()
    }

    /// Dependency result lookup.
    ///
    /// # Panics
    ///
    /// Panics when the reference was not executed in this run or its output
    /// type differs. Both are dependency-set inconsistencies the resolver
    /// rules out; hitting this is a bug in task registration.
    pub fn task_result<T: Send + Sync + 'static>(&self, reference: &TaskRef<T>) -> Arc<T> {
        match self.core.results.get(reference) {
            Some(value) => value,
            None => panic!(
                "task result '{}' missing or mistyped; dependency list of '{}' is inconsistent",
                reference.name(),
                self.task
                    .as_ref()
                    .map(|t| t.id().to_string())
                    .unwrap_or_else(|| "<no task>".into()),
            ),
        }
    }

    /// Result lookup that tolerates absence; for optional dependencies.
    pub fn optional_task_result<T: Send + Sync + 'static>(
        &self,
        reference: &TaskRef<T>,
    ) -> Option<Arc<T>> {
        self.core.results.get(reference)
    }

    /// Clone the context with a fresh result store and run id for one
    /// execution. The session and process stores are shared, not copied.
    pub(crate) fn for_execution(&self, results: Arc<ResultStore>) -> Self {
        let mut core = self.clone_core();
        core.results = results;
        core.run_id = Arc::from(Uuid::new_v4().to_string());
        Self {
            core: Arc::new(core),
            task: None,
            logger: self.logger.clone(),
        }
    }

    /// Narrow the context to one task: binds the task's capture buffer.
    pub(crate) fn for_task(&self, task: Arc<Task>) -> Self {
        let reference = task.reference().name_arc();
        let buffer = self
            .core
            .metadata
            .task_logs()
            .register(Arc::clone(&reference));
        Self {
            core: Arc::clone(&self.core),
            logger: TaskLogger::new(reference, buffer),
            task: Some(task),
        }
    }

    fn clone_core(&self) -> ContextCore {
        ContextCore {
            run_id: Arc::clone(&self.core.run_id),
            inspection_id: Arc::clone(&self.core.inspection_id),
            mode: self.core.mode,
            inputs: Arc::clone(&self.core.inputs),
            session_store: self.core.session_store.clone(),
            process_store: self.core.process_store.clone(),
            io: Arc::clone(&self.core.io),
            metadata: self.core.metadata.clone(),
            cancel: self.core.cancel.clone(),
            results: Arc::clone(&self.core.results),
        }
    }
}

/// Assembles a [`TaskContext`]; used by the inspection runner and tests.
pub struct ContextBuilder {
    inspection_id: Option<Arc<str>>,
    mode: ExecutionMode,
    inputs: serde_json::Map<String, Value>,
    session_store: SharedTypedMap,
    process_store: SharedTypedMap,
    io: Arc<IoConfig>,
    metadata: MetadataBus,
    cancel: CancellationToken,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            inspection_id: None,
            mode: ExecutionMode::Run,
            inputs: serde_json::Map::new(),
            session_store: SharedTypedMap::new(),
            process_store: SharedTypedMap::new(),
            io: Arc::new(IoConfig::default()),
            metadata: MetadataBus::detached(),
            cancel: CancellationToken::new(),
        }
    }
}

impl ContextBuilder {
    pub fn inspection_id(mut self, id: impl Into<Arc<str>>) -> Self {
        self.inspection_id = Some(id.into());
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn inputs(mut self, inputs: serde_json::Map<String, Value>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn session_store(mut self, store: SharedTypedMap) -> Self {
        self.session_store = store;
        self
    }

    pub fn process_store(mut self, store: SharedTypedMap) -> Self {
        self.process_store = store;
        self
    }

    pub fn io(mut self, io: IoConfig) -> Self {
        self.io = Arc::new(io);
        self
    }

    pub fn metadata(mut self, metadata: MetadataBus) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> TaskContext {
        TaskContext {
            core: Arc::new(ContextCore {
                run_id: Arc::from(Uuid::new_v4().to_string()),
                inspection_id: self
                    .inspection_id
                    .unwrap_or_else(|| Arc::from(Uuid::new_v4().to_string())),
                mode: self.mode,
                inputs: Arc::new(self.inputs),
                session_store: self.session_store,
                process_store: self.process_store,
                io: self.io,
                metadata: self.metadata,
                cancel: self.cancel,
                results: Arc::new(ResultStore::new()),
            }),
            task: None,
            logger: TaskLogger::detached(),
        }
    }
}
