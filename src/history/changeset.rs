//! Change sets - batched timeline mutations for one log

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pipeline::log::{LogEntry, LogSeverity};

/// What a revision did to its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionVerb {
    Create,
    Update,
    Patch,
    Delete,
    Unknown,
}

/// One observed state of a resource.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRevision {
    /// Path like `core/v1#pod#default#nginx`.
    pub resource_path: String,
    pub verb: RevisionVerb,
    pub change_time: DateTime<Utc>,
    /// Requesting principal, when the log carries one.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub requestor: String,
    /// Serialized resource body at this revision.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub body: String,
}

/// A point-in-time event attached to a resource timeline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEvent {
    pub resource_path: String,
    pub log_id: String,
    pub time: DateTime<Utc>,
}

/// Links one resource path to another identity of the same resource.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAlias {
    pub alias_path: String,
    pub canonical_path: String,
}

/// Batched mutation for a single log.
///
/// Built inside `process_log_by_group`, then applied atomically by the
/// timeline mapper. Nothing here touches shared state.
#[derive(Debug)]
pub struct ChangeSet {
    log_id: Arc<str>,
    log_time: DateTime<Utc>,
    pub(crate) events: Vec<ResourceEvent>,
    pub(crate) revisions: Vec<ResourceRevision>,
    pub(crate) aliases: Vec<ResourceAlias>,
    pub(crate) log_summary: Option<String>,
    pub(crate) log_severity: Option<LogSeverity>,
}

impl ChangeSet {
    pub fn new(log: &LogEntry) -> Self {
        Self {
            log_id: log.id_arc(),
            log_time: log.timestamp(),
            events: Vec::new(),
            revisions: Vec::new(),
            aliases: Vec::new(),
            log_summary: None,
            log_severity: None,
        }
    }

    pub fn log_id(&self) -> &str {
        &self.log_id
    }

    pub(crate) fn log_id_arc(&self) -> Arc<str> {
        Arc::clone(&self.log_id)
    }

    /// Record an event on the resource at the log's own timestamp.
    pub fn record_event(&mut self, resource_path: impl Into<String>) {
        self.events.push(ResourceEvent {
            resource_path: resource_path.into(),
            log_id: self.log_id.to_string(),
            time: self.log_time,
        });
    }

    pub fn record_revision(&mut self, revision: ResourceRevision) {
        self.revisions.push(revision);
    }

    pub fn record_alias(
        &mut self,
        alias_path: impl Into<String>,
        canonical_path: impl Into<String>,
    ) {
        self.aliases.push(ResourceAlias {
            alias_path: alias_path.into(),
            canonical_path: canonical_path.into(),
        });
    }

    /// One-line summary shown on the log timeline.
    pub fn set_summary(&mut self, summary: impl Into<String>) {
        self.log_summary = Some(summary.into());
    }

    pub fn set_severity(&mut self, severity: LogSeverity) {
        self.log_severity = Some(severity);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
            && self.revisions.is_empty()
            && self.aliases.is_empty()
            && self.log_summary.is_none()
            && self.log_severity.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn log() -> LogEntry {
        LogEntry::new(
            "log-1",
            Utc::now(),
            LogSeverity::Info,
            json!({"verb": "create"}),
        )
    }

    #[test]
    fn events_inherit_log_identity() {
        let log = log();
        let mut cs = ChangeSet::new(&log);
        cs.record_event("core/v1#pod#default#nginx");
        assert_eq!(cs.events.len(), 1);
        assert_eq!(cs.events[0].log_id, "log-1");
        assert_eq!(cs.events[0].time, log.timestamp());
    }

    #[test]
    fn fresh_changeset_is_empty() {
        let log = log();
        let cs = ChangeSet::new(&log);
        assert!(cs.is_empty());
    }
}
