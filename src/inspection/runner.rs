//! Inspection session runner
//!
//! One session end to end: pick an inspection type, toggle features, iterate
//! dry-runs while the user fills the form, then a single run that produces
//! the artifact. The session owns its metadata bus, its shared map, its
//! cancellation token and, once started, the resolved graph.
//!
//! Lifecycle: `Created -> TypeSelected -> FeaturesSelected (revisitable)
//! -> Started -> Done | Error | Cancelled`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{KhronicleError, Result};
use crate::history::serializer::{serialize_ref, serializer_task, ArtifactRef, SERIALIZE_REFERENCE};
use crate::metadata::{MetadataBus, MetadataScope};
use crate::runtime::{
    apply_all, ExecutionMode, IoConfig, LocalRunner, RunContextOption, TaskContext,
};
use crate::task::{Dependency, RunnableTaskSet, TaskSet};
use crate::typedmap::SharedTypedMap;

use super::interceptor::{compose, Interceptor, Next};
use super::types::InspectionType;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPhase {
    Created,
    TypeSelected,
    FeaturesSelected,
    Started,
    Done,
    Error,
    Cancelled,
}

/// One row of the feature list shown to the user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub enabled: bool,
}

/// Output of a finished run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub artifact: ArtifactRef,
    pub metadata: Value,
}

#[derive(Debug)]
enum Outcome {
    Done(ArtifactRef),
    Failed { task_id: String, message: String },
    Cancelled,
}

#[derive(Debug)]
struct SessionState {
    phase: SessionPhase,
    inspection_type: Option<InspectionType>,
    available: TaskSet,
    enabled_features: Vec<String>,
}

/// One inspection session. Created and owned by the inspection server.
pub struct InspectionRunner {
    id: Arc<str>,
    created_at: DateTime<Utc>,
    universe: TaskSet,
    interceptors: Vec<Interceptor>,
    options: Vec<RunContextOption>,
    io: IoConfig,
    process_store: SharedTypedMap,
    session_store: SharedTypedMap,
    cancel: CancellationToken,
    started: AtomicBool,
    state: Mutex<SessionState>,
    latest_metadata: Mutex<Option<MetadataBus>>,
    outcome: Mutex<Option<Outcome>>,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

impl InspectionRunner {
    pub(crate) fn new(
        id: impl Into<Arc<str>>,
        universe: TaskSet,
        interceptors: Vec<Interceptor>,
        options: Vec<RunContextOption>,
        io: IoConfig,
        process_store: SharedTypedMap,
    ) -> Self {
        let (done_tx, done_rx) = watch::channel(false);
        Self {
            id: id.into(),
            created_at: Utc::now(),
            universe,
            interceptors,
            options,
            io,
            process_store,
            session_store: SharedTypedMap::new(),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            state: Mutex::new(SessionState {
                phase: SessionPhase::Created,
                inspection_type: None,
                available: TaskSet::new(),
                enabled_features: Vec::new(),
            }),
            latest_metadata: Mutex::new(None),
            outcome: Mutex::new(None),
            done_tx,
            done_rx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase
    }

    pub fn inspection_type(&self) -> Option<InspectionType> {
        self.state.lock().inspection_type.clone()
    }

    // ═══════════════════════════════════════════════════════════
    // CONFIGURATION
    // ═══════════════════════════════════════════════════════════

    /// Select the inspection type: scopes the task universe and seeds the
    /// default feature set. Allowed until the run starts.
    pub fn set_inspection_type(&self, inspection_type: InspectionType) -> Result<()> {
        inspection_type.validate()?;
        let mut state = self.state.lock();
        if state.phase >= SessionPhase::Started {
            return Err(KhronicleError::AlreadyStarted);
        }
        let type_id = inspection_type.id.clone();
        state.available = self
            .universe
            .subset(|t| t.labels().usable_for(&type_id));
        state.enabled_features = state
            .available
            .iter()
            .filter(|t| t.labels().is_feature() && t.labels().is_default_feature())
            .map(|t| t.reference().name().to_string())
            .collect();
        state.inspection_type = Some(inspection_type);
        state.phase = SessionPhase::TypeSelected;
        Ok(())
    }

    /// Feature tasks of the selected type, annotated with enabled state and
    /// sorted by feature order (unordered features last, then by id).
    pub fn feature_list(&self) -> Result<Vec<FeatureInfo>> {
        let state = self.state.lock();
        if state.inspection_type.is_none() {
            return Err(KhronicleError::NoTypeSelected);
        }
        let mut features: Vec<_> = state
            .available
            .iter()
            .filter(|t| t.labels().is_feature())
            .collect();
        features.sort_by(|a, b| {
            a.labels()
                .feature_order()
                .cmp(&b.labels().feature_order())
                .then_with(|| a.reference().name().cmp(b.reference().name()))
        });
        Ok(features
            .into_iter()
            .map(|t| {
                let id = t.reference().name().to_string();
                FeatureInfo {
                    enabled: state.enabled_features.contains(&id),
                    title: t
                        .labels()
                        .feature_title()
                        .map(|s| s.as_str().to_string())
                        .unwrap_or_else(|| id.clone()),
                    description: t
                        .labels()
                        .feature_description()
                        .map(|s| s.as_str().to_string())
                        .unwrap_or_default(),
                    id,
                }
            })
            .collect())
    }

    /// Replace the feature selection.
    pub fn set_feature_list(&self, ids: Vec<String>) -> Result<()> {
        let mut state = self.state.lock();
        if state.phase >= SessionPhase::Started {
            return Err(KhronicleError::AlreadyStarted);
        }
        for id in &ids {
            Self::check_feature(&state, id)?;
        }
        state.enabled_features = ids;
        state.phase = SessionPhase::FeaturesSelected;
        Ok(())
    }

    /// Enable or disable features incrementally.
    pub fn update_feature_map(&self, changes: HashMap<String, bool>) -> Result<()> {
        let mut state = self.state.lock();
        if state.phase >= SessionPhase::Started {
            return Err(KhronicleError::AlreadyStarted);
        }
        for id in changes.keys() {
            Self::check_feature(&state, id)?;
        }
        for (id, enabled) in changes {
            let present = state.enabled_features.contains(&id);
            if enabled && !present {
                state.enabled_features.push(id);
            } else if !enabled && present {
                state.enabled_features.retain(|f| f != &id);
            }
        }
        state.phase = SessionPhase::FeaturesSelected;
        Ok(())
    }

    fn check_feature(state: &SessionState, id: &str) -> Result<()> {
        if state.inspection_type.is_none() {
            return Err(KhronicleError::NoTypeSelected);
        }
        let candidates = state.available.candidates(id);
        if candidates.is_empty() {
            return Err(KhronicleError::TaskNotFound { id: id.to_string() });
        }
        if !candidates.iter().any(|t| t.labels().is_feature()) {
            return Err(KhronicleError::NotAFeature { id: id.to_string() });
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════
    // EXECUTION
    // ═══════════════════════════════════════════════════════════

    /// Resolve the current selection into a runnable graph with the
    /// serializer as its terminal node.
    fn build_graph(&self) -> Result<Arc<RunnableTaskSet>> {
        let state = self.state.lock();
        if state.inspection_type.is_none() {
            return Err(KhronicleError::NoTypeSelected);
        }

        let mut seed = TaskSet::new();
        let mut terminal_deps: Vec<Dependency> = Vec::new();
        for id in &state.enabled_features {
            if seed.get(id).is_none() {
                for task in state.available.candidates(id) {
                    seed.add(task)?;
                }
                terminal_deps.push(Dependency::optional(id.as_str()));
            }
        }
        for task in state
            .available
            .iter()
            .filter(|t| t.labels().is_required() && t.reference().name() != SERIALIZE_REFERENCE)
        {
            if seed.get(task.reference().name()).is_none() {
                seed.add(Arc::clone(task))?;
            }
            terminal_deps.push(Dependency::optional(task.reference().name()));
        }
        // Session-local serializer instance: same reference as the intrinsic
        // one, but depending on everything selected, so it runs last.
        seed.add(serializer_task(terminal_deps))?;

        Ok(Arc::new(crate::dag::resolve(&seed, &state.available)?))
    }

    fn build_context(
        &self,
        graph: &RunnableTaskSet,
        mode: ExecutionMode,
        inputs: serde_json::Map<String, Value>,
        extra_options: &[RunContextOption],
    ) -> Result<(TaskContext, MetadataBus)> {
        let metadata = MetadataBus::for_graph(graph);
        if let Some(ty) = self.inspection_type() {
            metadata
                .header()
                .set_inspection_type(ty.id.clone(), ty.name.clone(), ty.icon.clone());
        }
        let ctx = TaskContext::builder()
            .inspection_id(Arc::clone(&self.id))
            .mode(mode)
            .inputs(inputs)
            .session_store(self.session_store.clone())
            .process_store(self.process_store.clone())
            .io(self.io.clone())
            .metadata(metadata.clone())
            .cancellation(self.cancel.child_token())
            .build();
        apply_all(&self.options, &ctx, mode)?;
        apply_all(extra_options, &ctx, mode)?;
        Ok((ctx, metadata))
    }

    /// Execute the graph once in dry-run mode and return the form-facing
    /// metadata. Repeatable until the run starts; never persists side
    /// effects beyond the metadata bus and the session store.
    pub async fn dry_run(&self, inputs: serde_json::Map<String, Value>) -> Result<Value> {
        self.dry_run_with_options(inputs, &[]).await
    }

    pub async fn dry_run_with_options(
        &self,
        inputs: serde_json::Map<String, Value>,
        extra_options: &[RunContextOption],
    ) -> Result<Value> {
        if self.started.load(Ordering::SeqCst) {
            return Err(KhronicleError::AlreadyStarted);
        }
        let graph = self.build_graph()?;
        let (ctx, metadata) =
            self.build_context(&graph, ExecutionMode::DryRun, inputs, extra_options)?;
        *self.latest_metadata.lock() = Some(metadata.clone());

        let runner = LocalRunner::new(graph);
        runner.run(&ctx)?;
        runner.wait().await;
        // Failures surface through the error-message set; the form metadata
        // is still what the caller needs to render.
        if let Err(err) = runner.result() {
            if !err.is_cancellation() {
                metadata.errors().push(err.to_string(), None);
            }
        }
        Ok(metadata.serialize(MetadataScope::DryRunResult))
    }

    /// Start the run. Returns immediately after pre-flight; completion is
    /// observed through [`wait`](Self::wait) and [`result`](Self::result).
    /// One-shot: a second call fails.
    pub fn run(self: &Arc<Self>, inputs: serde_json::Map<String, Value>) -> Result<()> {
        self.run_with_options(inputs, &[])
    }

    pub fn run_with_options(
        self: &Arc<Self>,
        inputs: serde_json::Map<String, Value>,
        extra_options: &[RunContextOption],
    ) -> Result<()> {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(KhronicleError::AlreadyStarted);
        }

        // Pre-flight failure consumes the shot but must still terminalize
        // the session, or wait() would never resolve.
        let prepared = self.build_graph().and_then(|graph| {
            let (ctx, metadata) =
                self.build_context(&graph, ExecutionMode::Run, inputs, extra_options)?;
            Ok((graph, ctx, metadata))
        });
        let (graph, ctx, metadata) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                *self.outcome.lock() = Some(Outcome::Failed {
                    task_id: String::new(),
                    message: err.to_string(),
                });
                self.state.lock().phase = SessionPhase::Error;
                let _ = self.done_tx.send(true);
                return Err(err);
            }
        };
        *self.latest_metadata.lock() = Some(metadata.clone());
        self.state.lock().phase = SessionPhase::Started;
        info!(inspection = %self.id, tasks = graph.len(), "inspection run started");

        let runner = Arc::new(LocalRunner::new(graph));
        let innermost: Next = {
            let runner = Arc::clone(&runner);
            Box::new(move |ctx| {
                async move {
                    runner.run(&ctx)?;
                    runner.wait().await;
                    runner.result().map(|_| ())
                }
                .boxed()
            })
        };
        let chain = compose(&self.interceptors, innermost);

        let session = Arc::clone(self);
        tokio::spawn(async move {
            let chain_result = chain(ctx).await;
            session.finish(chain_result, &runner, &metadata);
        });
        Ok(())
    }

    fn finish(
        &self,
        chain_result: Result<()>,
        runner: &LocalRunner,
        metadata: &MetadataBus,
    ) {
        let outcome = match chain_result {
            Ok(()) => {
                let artifact = runner
                    .result()
                    .ok()
                    .and_then(|results| results.get(&serialize_ref()))
                    .map(|a| (*a).clone());
                match artifact {
                    Some(artifact) => Outcome::Done(artifact),
                    None => Outcome::Failed {
                        task_id: SERIALIZE_REFERENCE.to_string(),
                        message: "serializer produced no artifact".to_string(),
                    },
                }
            }
            Err(err) if err.is_cancellation() => Outcome::Cancelled,
            Err(err) => {
                metadata.errors().push(err.to_string(), None);
                let task_id = match &err {
                    KhronicleError::TaskFailure { task_id, .. } => task_id.clone(),
                    _ => String::new(),
                };
                Outcome::Failed {
                    task_id,
                    message: err.to_string(),
                }
            }
        };

        let phase = match &outcome {
            Outcome::Done(_) => {
                metadata.progress().mark_done();
                SessionPhase::Done
            }
            Outcome::Cancelled => {
                metadata.progress().mark_cancelled();
                SessionPhase::Cancelled
            }
            Outcome::Failed { message, .. } => {
                warn!(inspection = %self.id, "inspection run failed: {message}");
                metadata.progress().mark_error();
                SessionPhase::Error
            }
        };
        info!(inspection = %self.id, ?phase, "inspection run finished");

        *self.outcome.lock() = Some(outcome);
        self.state.lock().phase = phase;
        let _ = self.done_tx.send(true);
    }

    /// Cancel the session. Idempotent, never blocks, no-op after a terminal
    /// phase (the token is already spent then).
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Completion signal for the run.
    pub async fn wait(&self) {
        let mut rx = self.done_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Artifact plus result metadata. Only valid after completion.
    pub fn result(&self) -> Result<RunResult> {
        match &*self.outcome.lock() {
            None => Err(KhronicleError::NotFinished),
            Some(Outcome::Done(artifact)) => Ok(RunResult {
                artifact: artifact.clone(),
                metadata: self
                    .latest_metadata
                    .lock()
                    .as_ref()
                    .map(|bus| bus.serialize(MetadataScope::RunResult))
                    .unwrap_or(Value::Null),
            }),
            Some(Outcome::Cancelled) => Err(KhronicleError::Cancelled),
            Some(Outcome::Failed { task_id, message }) => Err(KhronicleError::TaskFailure {
                task_id: task_id.clone(),
                reason: message.clone(),
            }),
        }
    }

    /// Read-only snapshot of the current metadata; safe mid-execution.
    pub fn current_metadata(&self) -> Option<Value> {
        self.latest_metadata
            .lock()
            .as_ref()
            .map(|bus| bus.serialize(MetadataScope::Current))
    }

    /// The artifact path once the run finished successfully.
    pub fn artifact(&self) -> Option<ArtifactRef> {
        match &*self.outcome.lock() {
            Some(Outcome::Done(artifact)) => Some(artifact.clone()),
            _ => None,
        }
    }
}

impl std::fmt::Debug for InspectionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InspectionRunner")
            .field("id", &self.id)
            .field("phase", &self.phase())
            .finish()
    }
}
