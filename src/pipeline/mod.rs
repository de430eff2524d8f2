//! Log-pipeline task builders
//!
//! The higher-level task shapes every inspection pipeline is assembled from:
//! field-set extraction, filtering, grouping, ingestion, timeline mapping,
//! inventory aggregation and cached computation. Each builder returns a
//! plain [`crate::task::Task`]; composition happens through references, so
//! pipelines resolve and schedule like any other graph.

mod cached;
mod ingest;
mod inventory;
pub mod log;
mod timeline;
mod transform;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use cached::{cached_task, digest_of, CachedResult};
pub use ingest::log_ingester_task;
pub use inventory::{Inventory, InventoryBuilder, MergeStrategy};
pub use log::{FieldSet, FieldSetReader, LogEntry, LogSeverity};
pub use timeline::{log_to_timeline_task, GroupMapper};
pub use transform::{field_set_read_task, log_filter_task, log_grouper_task};

/// A list of shared log entries; the currency between pipeline stages.
pub type LogList = Vec<Arc<LogEntry>>;

/// Logs grouped by key, iteration-stable for deterministic scheduling.
pub type LogGroups = BTreeMap<String, Vec<Arc<LogEntry>>>;
