//! Shared timeline construction state
//!
//! One builder per run, shared by every ingestion and mapping task and
//! guarded by a single internal lock. `apply` commits a whole [`ChangeSet`]
//! under one lock acquisition, so readers never observe a half-applied log.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;

use super::changeset::{ChangeSet, ResourceEvent, ResourceRevision};
use crate::pipeline::log::{LogEntry, LogSeverity};

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceTimeline {
    revisions: Vec<ResourceRevision>,
    events: Vec<ResourceEvent>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestedLog {
    id: String,
    timestamp: DateTime<Utc>,
    severity: LogSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    body: Value,
}

#[derive(Debug, Default)]
struct HistoryInner {
    resources: BTreeMap<String, ResourceTimeline>,
    aliases: BTreeMap<String, String>,
    logs: BTreeMap<Arc<str>, IngestedLog>,
    /// Summary/severity from change sets whose log is ingested elsewhere;
    /// merged at serialization so ingestion order does not matter.
    annotations: FxHashMap<Arc<str>, (Option<String>, Option<LogSeverity>)>,
}

/// Counters for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryStats {
    pub resources: usize,
    pub revisions: usize,
    pub events: usize,
    pub logs: usize,
}

/// The run-shared mutable timeline state.
#[derive(Debug, Default)]
pub struct HistoryBuilder {
    inner: Mutex<HistoryInner>,
}

impl HistoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a log as part of the final artifact. Idempotent per log id.
    pub fn ingest(&self, log: &LogEntry) {
        let mut inner = self.inner.lock();
        inner
            .logs
            .entry(log.id_arc())
            .or_insert_with(|| IngestedLog {
                id: log.id().to_string(),
                timestamp: log.timestamp(),
                severity: log.severity(),
                summary: None,
                body: log.body().clone(),
            });
    }

    /// Commit one change set atomically.
    pub fn apply(&self, change_set: ChangeSet) {
        let mut inner = self.inner.lock();
        for revision in change_set.revisions.iter() {
            inner
                .resources
                .entry(revision.resource_path.clone())
                .or_default()
                .revisions
                .push(revision.clone());
        }
        for event in change_set.events.iter() {
            inner
                .resources
                .entry(event.resource_path.clone())
                .or_default()
                .events
                .push(event.clone());
        }
        for alias in change_set.aliases.iter() {
            inner
                .aliases
                .insert(alias.alias_path.clone(), alias.canonical_path.clone());
        }
        if change_set.log_summary.is_some() || change_set.log_severity.is_some() {
            let log_id = change_set.log_id_arc();
            let entry = inner.annotations.entry(log_id).or_insert((None, None));
            if change_set.log_summary.is_some() {
                entry.0 = change_set.log_summary.clone();
            }
            if change_set.log_severity.is_some() {
                entry.1 = change_set.log_severity;
            }
        }
    }

    pub fn stats(&self) -> HistoryStats {
        let inner = self.inner.lock();
        HistoryStats {
            resources: inner.resources.len(),
            revisions: inner.resources.values().map(|t| t.revisions.len()).sum(),
            events: inner.resources.values().map(|t| t.events.len()).sum(),
            logs: inner.logs.len(),
        }
    }

    /// Serialize the whole history; revisions and events are emitted in time
    /// order regardless of application order.
    pub fn to_artifact_value(&self) -> Value {
        let mut inner = self.inner.lock();

        let annotations = std::mem::take(&mut inner.annotations);
        for (log_id, (summary, severity)) in annotations {
            if let Some(log) = inner.logs.get_mut(&log_id) {
                if let Some(summary) = summary {
                    log.summary = Some(summary);
                }
                if let Some(severity) = severity {
                    log.severity = severity;
                }
            }
        }

        for timeline in inner.resources.values_mut() {
            timeline.revisions.sort_by_key(|r| r.change_time);
            timeline.events.sort_by_key(|e| e.time);
        }

        serde_json::json!({
            "resources": inner.resources,
            "aliases": inner.aliases,
            "logs": inner.logs.values().collect::<Vec<_>>(),
        })
    }
}
