//! Log model and field sets
//!
//! A [`LogEntry`] is one parsed log line: identity, timestamp, severity and
//! the raw structured body. Pipelines attach typed projections of the body as
//! field sets, keyed by kind, so downstream stages read fields without
//! re-parsing. Attachment is per-log and internally locked, which is what
//! makes per-log parallel field-set reading safe.

use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Log severity as normalized from heterogeneous sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Unknown,
    Info,
    Warning,
    Error,
    Fatal,
}

impl LogSeverity {
    /// Lenient parse used by log sources; unrecognized strings are `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "DEFAULT" | "DEBUG" | "INFO" | "NOTICE" => LogSeverity::Info,
            "WARN" | "WARNING" => LogSeverity::Warning,
            "ERROR" => LogSeverity::Error,
            "CRITICAL" | "ALERT" | "EMERGENCY" | "FATAL" => LogSeverity::Fatal,
            _ => LogSeverity::Unknown,
        }
    }
}

/// A typed projection of log fields. One log may carry several field sets of
/// distinct kinds; a kind is attached at most once.
pub trait FieldSet: Send + Sync + 'static {
    /// Stable kind string; doubles as the attachment key.
    const KIND: &'static str;
}

/// Parses one kind of field set out of raw log bodies.
pub trait FieldSetReader: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Parse and attach this reader's field set to the log.
    fn read(&self, log: &LogEntry) -> Result<()>;
}

/// One ingested log line.
#[derive(Debug)]
pub struct LogEntry {
    id: Arc<str>,
    timestamp: DateTime<Utc>,
    severity: LogSeverity,
    body: Value,
    field_sets: RwLock<FxHashMap<&'static str, Arc<dyn Any + Send + Sync>>>,
}

impl LogEntry {
    pub fn new(
        id: impl Into<Arc<str>>,
        timestamp: DateTime<Utc>,
        severity: LogSeverity,
        body: Value,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            severity,
            body,
            field_sets: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn id_arc(&self) -> Arc<str> {
        Arc::clone(&self.id)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn severity(&self) -> LogSeverity {
        self.severity
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Body field by dot-free key; convenience for readers and filters.
    pub fn body_field(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    pub fn attach<F: FieldSet>(&self, field_set: F) {
        self.field_sets
            .write()
            .insert(F::KIND, Arc::new(field_set));
    }

    pub fn field_set<F: FieldSet>(&self) -> Option<Arc<F>> {
        self.field_sets
            .read()
            .get(F::KIND)
            .and_then(|v| Arc::clone(v).downcast::<F>().ok())
    }

    pub fn has_field_set(&self, kind: &str) -> bool {
        self.field_sets.read().contains_key(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct AuditFields {
        verb: String,
    }

    impl FieldSet for AuditFields {
        const KIND: &'static str = "audit";
    }

    #[test]
    fn attach_and_read_back_typed() {
        let log = LogEntry::new("l1", Utc::now(), LogSeverity::Info, json!({}));
        log.attach(AuditFields {
            verb: "create".into(),
        });
        let fields = log.field_set::<AuditFields>().unwrap();
        assert_eq!(fields.verb, "create");
        assert!(log.has_field_set("audit"));
    }

    #[test]
    fn missing_kind_is_none() {
        let log = LogEntry::new("l1", Utc::now(), LogSeverity::Info, json!({}));
        assert!(log.field_set::<AuditFields>().is_none());
    }

    #[test]
    fn severity_parse_is_lenient() {
        assert_eq!(LogSeverity::parse("WARNING"), LogSeverity::Warning);
        assert_eq!(LogSeverity::parse("notice"), LogSeverity::Info);
        assert_eq!(LogSeverity::parse("CRITICAL"), LogSeverity::Fatal);
        assert_eq!(LogSeverity::parse("???"), LogSeverity::Unknown);
    }

    #[test]
    fn severity_orders_by_weight() {
        assert!(LogSeverity::Fatal > LogSeverity::Warning);
        assert!(LogSeverity::Info > LogSeverity::Unknown);
    }
}
