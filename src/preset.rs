//! Built-in inspection presets
//!
//! The generic audit-log pipeline shipped with the binary: upload a JSON
//! Lines audit-log archive, window it by duration, and reconstruct resource
//! timelines from the audit records. Cloud-backend pipelines register their
//! own tasks against the same references through the embedding process.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{KhronicleError, Result};
use crate::form::{FileFormBuilder, TextFormBuilder, UploadedFile};
use crate::history::{ChangeSet, HistoryBuilder, ResourceRevision, RevisionVerb};
use crate::inspection::{InspectionServer, InspectionType};
use crate::pipeline::{
    field_set_read_task, log_grouper_task, log_ingester_task, log_to_timeline_task, FieldSet,
    FieldSetReader, LogEntry, LogList, LogSeverity,
};
use crate::runtime::TaskContext;
use crate::task::{Dependency, LabelSet, Task, TaskId, TaskRef};
use crate::util::parse_duration;

// ═══════════════════════════════════════════════════════════════
// REFERENCES
// ═══════════════════════════════════════════════════════════════

pub fn logs_file_ref() -> TaskRef<UploadedFile> {
    TaskRef::new("audit-logs-file")
}

pub fn duration_ref() -> TaskRef<Duration> {
    TaskRef::new("query-duration")
}

pub fn raw_logs_ref() -> TaskRef<LogList> {
    TaskRef::new("audit-logs")
}

pub fn parsed_logs_ref() -> TaskRef<LogList> {
    TaskRef::new("audit-logs-parsed")
}

pub fn windowed_logs_ref() -> TaskRef<LogList> {
    TaskRef::new("audit-logs-windowed")
}

pub fn grouped_logs_ref() -> TaskRef<crate::pipeline::LogGroups> {
    TaskRef::new("audit-logs-grouped")
}

/// Feature: reconstruct resource timelines from audit records.
pub const TIMELINE_FEATURE: &str = "k8s-audit-timeline";
/// Feature: include the raw audit records in the artifact.
pub const RECORDS_FEATURE: &str = "audit-log-records";

// ═══════════════════════════════════════════════════════════════
// AUDIT FIELD SET
// ═══════════════════════════════════════════════════════════════

/// Fields extracted from one Kubernetes audit record.
#[derive(Debug, Clone)]
pub struct AuditFields {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub verb: String,
    pub requestor: String,
}

impl AuditFields {
    /// Timeline path: `apiVersion#kind#namespace#name`.
    pub fn resource_path(&self) -> String {
        format!(
            "{}#{}#{}#{}",
            self.api_version, self.kind, self.namespace, self.name
        )
    }

    pub fn revision_verb(&self) -> RevisionVerb {
        match self.verb.as_str() {
            "create" => RevisionVerb::Create,
            "update" => RevisionVerb::Update,
            "patch" => RevisionVerb::Patch,
            "delete" => RevisionVerb::Delete,
            _ => RevisionVerb::Unknown,
        }
    }
}

impl FieldSet for AuditFields {
    const KIND: &'static str = "audit";
}

struct AuditFieldsReader;

impl FieldSetReader for AuditFieldsReader {
    fn kind(&self) -> &'static str {
        AuditFields::KIND
    }

    fn read(&self, log: &LogEntry) -> Result<()> {
        let object_ref = log.body_field("objectRef").ok_or_else(|| {
            KhronicleError::task_failure("audit-fields", "record has no objectRef")
        })?;
        let text = |value: &Value, key: &str| -> String {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        log.attach(AuditFields {
            api_version: text(object_ref, "apiVersion"),
            kind: text(object_ref, "resource"),
            namespace: text(object_ref, "namespace"),
            name: text(object_ref, "name"),
            verb: log
                .body_field("verb")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            requestor: log
                .body_field("user")
                .and_then(|u| u.get("username"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
// PARSING
// ═══════════════════════════════════════════════════════════════

/// Parse a JSON Lines audit archive into log entries. Malformed lines are
/// counted and skipped, never fatal.
pub fn parse_jsonl(content: &str) -> (LogList, usize) {
    let mut logs: LogList = Vec::new();
    let mut skipped = 0usize;
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(body) = serde_json::from_str::<Value>(line) else {
            skipped += 1;
            continue;
        };
        let Some(timestamp) = body
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
        else {
            skipped += 1;
            continue;
        };
        let id = body
            .get("insertId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("line-{index}"));
        let severity = body
            .get("severity")
            .and_then(Value::as_str)
            .map(LogSeverity::parse)
            .unwrap_or(LogSeverity::Unknown);
        logs.push(Arc::new(LogEntry::new(id, timestamp, severity, body)));
    }
    logs.sort_by_key(|l| l.timestamp());
    (logs, skipped)
}

fn parse_task() -> Arc<Task> {
    Task::typed(
        TaskId::<LogList>::new(raw_logs_ref().name()),
        vec![Dependency::from(&logs_file_ref())],
        LabelSet::default(),
        |ctx| async move {
            // The equivalent backend query; a cloud log source would execute
            // it, the file source surfaces it for transparency.
            ctx.metadata().queries().publish(crate::metadata::QueryEntry {
                id: "audit-logs".into(),
                query: r#"logName:"cloudaudit.googleapis.com" resource.type="k8s_cluster""#
                    .into(),
                tags: vec!["kubernetes".into(), "audit".into()],
            });

            let file = ctx.task_result(&logs_file_ref());
            let Some(path) = file.path.clone() else {
                // Dry-run without an upload: downstream sees an empty list.
                return Ok(LogList::new());
            };
            let content = tokio::fs::read_to_string(&path).await?;
            let (logs, skipped) = parse_jsonl(&content);
            ctx.logger()
                .info(format!("parsed {} audit records", logs.len()));
            if skipped > 0 {
                ctx.logger().warn(format!("{skipped} malformed lines skipped"));
            }
            Ok(logs)
        },
    )
}

/// Keep only logs within `duration` of the newest record. Reads two
/// dependencies, so it is a hand-wired task rather than a plain filter.
fn window_task() -> Arc<Task> {
    Task::typed(
        TaskId::<LogList>::new(windowed_logs_ref().name()),
        vec![
            Dependency::from(&parsed_logs_ref()),
            Dependency::from(&duration_ref()),
        ],
        LabelSet::default(),
        |ctx| async move {
            let logs = ctx.task_result(&parsed_logs_ref());
            let window = *ctx.task_result(&duration_ref());
            let Some(newest) = logs.iter().map(|l| l.timestamp()).max() else {
                return Ok(LogList::new());
            };
            let cutoff = newest - chrono::Duration::from_std(window).unwrap_or_default();
            Ok(logs
                .iter()
                .filter(|l| l.timestamp() >= cutoff)
                .cloned()
                .collect())
        },
    )
}

// ═══════════════════════════════════════════════════════════════
// TIMELINE MAPPING
// ═══════════════════════════════════════════════════════════════

fn map_audit_log(
    _ctx: &TaskContext,
    log: &Arc<LogEntry>,
    change_set: &mut ChangeSet,
    _builder: &HistoryBuilder,
    revision_count: usize,
) -> Result<usize> {
    let Some(fields) = log.field_set::<AuditFields>() else {
        return Ok(revision_count);
    };
    let path = fields.resource_path();
    change_set.record_event(&path);
    change_set.record_revision(ResourceRevision {
        resource_path: path,
        verb: fields.revision_verb(),
        change_time: log.timestamp(),
        requestor: fields.requestor.clone(),
        body: log
            .body_field("responseObject")
            .map(|v| v.to_string())
            .unwrap_or_default(),
    });
    change_set.set_summary(format!(
        "{} {} {} (revision #{})",
        fields.verb,
        fields.kind,
        fields.name,
        revision_count + 1
    ));
    change_set.set_severity(log.severity());
    Ok(revision_count + 1)
}

// ═══════════════════════════════════════════════════════════════
// REGISTRATION
// ═══════════════════════════════════════════════════════════════

/// Register the built-in inspection types and the audit pipeline.
pub fn register(server: &InspectionServer) -> Result<()> {
    server.add_inspection_type(
        InspectionType::new("gke", "Google Kubernetes Engine")
            .description("Reconstruct resource history of a GKE cluster")
            .icon("gke.svg")
            .priority(10),
    )?;
    server.add_inspection_type(
        InspectionType::new("oss-kubernetes", "OSS Kubernetes")
            .description("Reconstruct resource history from exported cluster logs")
            .icon("kubernetes.svg")
            .priority(5),
    )?;

    server.add_task(
        FileFormBuilder::new(
            TaskId::new(logs_file_ref().name()),
            "Audit log archive",
        )
        .description("JSON Lines export of the cluster audit logs")
        .build(),
    )?;
    server.add_task(
        TextFormBuilder::new(
            TaskId::new(duration_ref().name()),
            "Query duration",
            |s| parse_duration(s).ok_or_else(|| format!("invalid duration: {s}")),
        )
        .description("How far back from the newest record to reconstruct")
        .default_value("1h")
        .validator(|_, s| {
            parse_duration(s)
                .is_none()
                .then(|| format!("'{s}' is not a duration (try 30m, 1h, 3h30m)"))
        })
        .suggestions(["30m", "1h", "6h", "24h"])
        .build(),
    )?;
    server.add_task(parse_task())?;
    server.add_task(field_set_read_task(
        TaskId::new(parsed_logs_ref().name()),
        raw_logs_ref(),
        vec![Arc::new(AuditFieldsReader)],
        LabelSet::default(),
    ))?;
    server.add_task(window_task())?;
    server.add_task(log_grouper_task(
        TaskId::new(grouped_logs_ref().name()),
        windowed_logs_ref(),
        |log| log.field_set::<AuditFields>().map(|f| f.resource_path()),
        LabelSet::default(),
    ))?;
    server.add_task(log_to_timeline_task(
        TaskId::new(TIMELINE_FEATURE),
        grouped_logs_ref(),
        LabelSet::builder()
            .feature(
                "Resource timelines",
                "Reconstruct per-resource revisions and events from audit records",
            )
            .default_feature()
            .feature_order(10)
            .progress_reportable()
            .build(),
        map_audit_log,
    ))?;
    server.add_task(log_ingester_task(
        TaskId::new(RECORDS_FEATURE),
        windowed_logs_ref(),
        LabelSet::builder()
            .feature(
                "Audit log records",
                "Include the windowed audit records in the artifact",
            )
            .default_feature()
            .feature_order(20)
            .progress_reportable()
            .build(),
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
{"insertId":"a1","timestamp":"2026-07-01T10:00:00Z","severity":"INFO","verb":"create","objectRef":{"apiVersion":"v1","resource":"pods","namespace":"default","name":"nginx"},"user":{"username":"alice"}}
{"insertId":"a2","timestamp":"2026-07-01T10:05:00Z","severity":"WARNING","verb":"update","objectRef":{"apiVersion":"v1","resource":"pods","namespace":"default","name":"nginx"},"user":{"username":"bob"}}
not json
{"insertId":"a3","timestamp":"2026-07-01T09:00:00Z","severity":"INFO","verb":"delete","objectRef":{"apiVersion":"v1","resource":"pods","namespace":"default","name":"old"},"user":{"username":"gc"}}
"#;

    #[test]
    fn jsonl_parse_sorts_and_skips() {
        let (logs, skipped) = parse_jsonl(SAMPLE);
        assert_eq!(logs.len(), 3);
        assert_eq!(skipped, 1);
        // Sorted by timestamp: a3 first.
        assert_eq!(logs[0].id(), "a3");
        assert_eq!(logs[2].id(), "a2");
        assert_eq!(logs[2].severity(), LogSeverity::Warning);
    }

    #[test]
    fn audit_reader_extracts_fields() {
        let (logs, _) = parse_jsonl(SAMPLE);
        AuditFieldsReader.read(&logs[1]).unwrap();
        let fields = logs[1].field_set::<AuditFields>().unwrap();
        assert_eq!(fields.resource_path(), "v1#pods#default#nginx");
        assert_eq!(fields.verb, "create");
        assert_eq!(fields.requestor, "alice");
        assert_eq!(fields.revision_verb(), RevisionVerb::Create);
    }

    #[test]
    fn missing_object_ref_is_an_error() {
        let (logs, _) = parse_jsonl(
            r#"{"insertId":"x","timestamp":"2026-07-01T10:00:00Z","verb":"get"}"#,
        );
        assert!(AuditFieldsReader.read(&logs[0]).is_err());
    }

    #[test]
    fn register_populates_types_and_features() {
        let dir = std::env::temp_dir().join("khronicle-preset-tests");
        let server = InspectionServer::new(
            crate::runtime::IoConfig {
                data_dir: dir.clone(),
                temp_dir: dir.clone(),
                upload_dir: dir.clone(),
                app_root: dir,
            },
            1 << 20,
        );
        register(&server).unwrap();

        let types = server.all_inspection_types();
        assert_eq!(types[0].id, "gke");

        let session = server.create_inspection("gke").unwrap();
        let features = session.feature_list().unwrap();
        let ids: Vec<&str> = features.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec![TIMELINE_FEATURE, RECORDS_FEATURE]);
        assert!(features.iter().all(|f| f.enabled));
    }
}
