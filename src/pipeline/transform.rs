//! Log list transformations: field-set reading, filtering, grouping

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::error::Result;
use crate::task::{Dependency, LabelSet, Task, TaskId, TaskRef};

use super::log::{FieldSetReader, LogEntry};
use super::{LogGroups, LogList};

/// How many logs a single field-set reading unit chews through.
const READ_CHUNK: usize = 4096;

/// Apply an ordered list of field-set readers to every log of the source.
///
/// Logs are processed in parallel chunks; attachment is per-log, so no two
/// units touch the same state. A reader failure on one log is captured to the
/// task log and skipped; one malformed line must not sink the ingestion.
pub fn field_set_read_task(
    id: TaskId<LogList>,
    source: TaskRef<LogList>,
    readers: Vec<Arc<dyn FieldSetReader>>,
    labels: LabelSet,
) -> Arc<Task> {
    let readers = Arc::new(readers);
    Task::typed(
        id,
        vec![Dependency::from(&source)],
        labels,
        move |ctx| {
            let source = source.clone();
            let readers = Arc::clone(&readers);
            async move {
                let logs = ctx.task_result(&source);
                let mut join_set = JoinSet::new();
                for chunk in logs.chunks(READ_CHUNK) {
                    let chunk: Vec<Arc<LogEntry>> = chunk.to_vec();
                    let readers = Arc::clone(&readers);
                    let logger = ctx.logger().clone();
                    join_set.spawn(async move {
                        let mut failures = 0usize;
                        for log in &chunk {
                            for reader in readers.iter() {
                                if let Err(err) = reader.read(log) {
                                    failures += 1;
                                    logger.warn(format!(
                                        "field set '{}' unreadable for log {}: {err}",
                                        reader.kind(),
                                        log.id()
                                    ));
                                }
                            }
                        }
                        failures
                    });
                }
                let mut failures = 0usize;
                while let Some(result) = join_set.join_next().await {
                    failures += result.unwrap_or(0);
                }
                if failures > 0 {
                    ctx.logger()
                        .warn(format!("{failures} field-set reads failed"));
                }
                Ok((*logs).clone())
            }
        },
    )
}

/// Keep only the logs matching the predicate.
pub fn log_filter_task(
    id: TaskId<LogList>,
    source: TaskRef<LogList>,
    predicate: impl Fn(&LogEntry) -> bool + Send + Sync + 'static,
    labels: LabelSet,
) -> Arc<Task> {
    Task::typed(
        id,
        vec![Dependency::from(&source)],
        labels,
        move |ctx| {
            let source = source.clone();
            let keep: LogList = ctx
                .task_result(&source)
                .iter()
                .filter(|log| predicate(log))
                .cloned()
                .collect();
            async move { Ok(keep) }
        },
    )
}

/// Group logs by a key function; logs with no key are dropped. Within each
/// group the source order is preserved, which the timeline mapper relies on.
pub fn log_grouper_task(
    id: TaskId<LogGroups>,
    source: TaskRef<LogList>,
    key_fn: impl Fn(&LogEntry) -> Option<String> + Send + Sync + 'static,
    labels: LabelSet,
) -> Arc<Task> {
    Task::typed(
        id,
        vec![Dependency::from(&source)],
        labels,
        move |ctx| {
            let source = source.clone();
            let mut groups = LogGroups::new();
            for log in ctx.task_result(&source).iter() {
                if let Some(key) = key_fn(log) {
                    groups.entry(key).or_default().push(Arc::clone(log));
                }
            }
            async move { Ok(groups) }
        },
    )
}
