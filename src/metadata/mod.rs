//! Metadata bus
//!
//! Run-scoped side channel between tasks and the frontend. One bus per run
//! (or dry-run); tasks write through the context, the HTTP layer reads
//! snapshots while the run is in flight, and a serialized subset lands in the
//! final result.
//!
//! Every key is initialized before tasks run, so a missing key is a bug, not
//! a race.

mod form;
mod log;
mod progress;

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

pub use form::{FormField, FormFieldSet, FormFieldType, FormOption, HintType};
pub use log::{TaskLogBuffer, TaskLogSet, MAX_CAPTURED_LINES};
pub use progress::{Phase, Progress, TaskProgress};

use crate::task::RunnableTaskSet;

// ═══════════════════════════════════════════════════════════════
// SMALL ITEMS
// ═══════════════════════════════════════════════════════════════

/// Artifact header: what the frontend shows in the download card.
#[derive(Debug, Default)]
pub struct Header {
    inner: Mutex<HeaderInner>,
}

#[derive(Debug, Default, Clone)]
struct HeaderInner {
    inspection_type: String,
    inspection_type_name: String,
    suggested_filename: String,
    icon: String,
    file_size: Option<u64>,
}

impl Header {
    pub fn set_inspection_type(&self, id: impl Into<String>, name: impl Into<String>, icon: impl Into<String>) {
        let mut inner = self.inner.lock();
        inner.inspection_type = id.into();
        inner.inspection_type_name = name.into();
        inner.icon = icon.into();
    }

    pub fn set_suggested_filename(&self, filename: impl Into<String>) {
        self.inner.lock().suggested_filename = filename.into();
    }

    pub fn set_file_size(&self, size: u64) {
        self.inner.lock().file_size = Some(size);
    }

    pub fn to_value(&self) -> Value {
        let inner = self.inner.lock();
        json!({
            "inspectionType": inner.inspection_type,
            "inspectionTypeName": inner.inspection_type_name,
            "suggestedFilename": inner.suggested_filename,
            "icon": inner.icon,
            "fileSize": inner.file_size,
        })
    }
}

/// One log query issued (or that would be issued) against a log backend.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryEntry {
    pub id: String,
    pub query: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Ordered list of published queries.
#[derive(Debug, Default)]
pub struct QuerySet {
    entries: Mutex<Vec<QueryEntry>>,
}

impl QuerySet {
    pub fn publish(&self, entry: QueryEntry) {
        let mut entries = self.entries.lock();
        match entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(&*self.entries.lock()).unwrap_or(Value::Null)
    }
}

/// User-facing error strings accumulated during a run.
#[derive(Debug, Default)]
pub struct ErrorMessageSet {
    messages: Mutex<Vec<ErrorMessage>>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl ErrorMessageSet {
    pub fn push(&self, message: impl Into<String>, task_id: Option<String>) {
        self.messages.lock().push(ErrorMessage {
            message: message.into(),
            task_id,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(&*self.messages.lock()).unwrap_or(Value::Null)
    }
}

/// Human-readable dump of the resolved graph, set once before tasks run.
#[derive(Debug, Default)]
pub struct InspectionPlan {
    dump: Mutex<String>,
}

impl InspectionPlan {
    pub fn set(&self, dump: String) {
        *self.dump.lock() = dump;
    }

    pub fn to_value(&self) -> Value {
        Value::String(self.dump.lock().clone())
    }
}

// ═══════════════════════════════════════════════════════════════
// BUS
// ═══════════════════════════════════════════════════════════════

/// Which serialization a metadata read is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataScope {
    /// Response of a dry-run: what the form needs.
    DryRunResult,
    /// Serialized alongside the finished artifact.
    RunResult,
    /// Mid-flight poll from the frontend.
    Current,
}

/// The bus itself: every item pre-initialized, shared by `Arc` clones.
#[derive(Clone, Debug, Default)]
pub struct MetadataBus {
    inner: Arc<BusInner>,
}

#[derive(Debug, Default)]
struct BusInner {
    header: Header,
    progress: Progress,
    form_fields: FormFieldSet,
    queries: QuerySet,
    task_logs: TaskLogSet,
    errors: ErrorMessageSet,
    plan: InspectionPlan,
}

impl MetadataBus {
    /// Bus for a resolved graph: progress totals count the progress-reportable
    /// members, the plan dump is taken, and a log buffer exists per task.
    pub fn for_graph(graph: &RunnableTaskSet) -> Self {
        let reportable = graph
            .tasks()
            .iter()
            .filter(|t| t.labels().progress_reportable())
            .count();
        let bus = MetadataBus {
            inner: Arc::new(BusInner {
                progress: Progress::new(reportable),
                ..Default::default()
            }),
        };
        bus.inner.plan.set(graph.plan_dump());
        for task in graph.tasks() {
            bus.inner.task_logs.register(task.reference().name_arc());
        }
        bus
    }

    /// Empty bus for contexts that run no graph (tests, option evaluation).
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn header(&self) -> &Header {
        &self.inner.header
    }

    pub fn progress(&self) -> &Progress {
        &self.inner.progress
    }

    pub fn form_fields(&self) -> &FormFieldSet {
        &self.inner.form_fields
    }

    pub fn queries(&self) -> &QuerySet {
        &self.inner.queries
    }

    pub fn task_logs(&self) -> &TaskLogSet {
        &self.inner.task_logs
    }

    pub fn errors(&self) -> &ErrorMessageSet {
        &self.inner.errors
    }

    pub fn plan(&self) -> &InspectionPlan {
        &self.inner.plan
    }

    /// Serialize the scope-visible subset. Each item snapshots internally, so
    /// the result is consistent per key (composite consistency is the
    /// reader's concern, per the bus contract).
    pub fn serialize(&self, scope: MetadataScope) -> Value {
        let mut out = serde_json::Map::new();
        out.insert("header".into(), self.inner.header.to_value());
        out.insert("errorMessages".into(), self.inner.errors.to_value());
        match scope {
            MetadataScope::DryRunResult => {
                out.insert("formFields".into(), self.inner.form_fields.to_value());
                out.insert("queries".into(), self.inner.queries.to_value());
            }
            MetadataScope::RunResult => {
                out.insert("progress".into(), self.inner.progress.to_value());
                out.insert("queries".into(), self.inner.queries.to_value());
                out.insert("logs".into(), self.inner.task_logs.to_value());
                out.insert("inspectionPlan".into(), self.inner.plan.to_value());
            }
            MetadataScope::Current => {
                out.insert("progress".into(), self.inner.progress.to_value());
                out.insert("logs".into(), self.inner.task_logs.to_value());
                out.insert("inspectionPlan".into(), self.inner.plan.to_value());
            }
        }
        Value::Object(out)
    }
}
