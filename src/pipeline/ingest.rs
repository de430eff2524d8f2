//! Log ingestion into the artifact

use std::sync::Arc;

use crate::error::Result;
use crate::history::HistoryBuilder;
use crate::task::{Dependency, LabelSet, Task, TaskId, TaskRef};

use super::LogList;

/// Declare the source logs as part of the final serialized artifact.
///
/// The serializer emits exactly the logs ingested through the history
/// builder; filtered-out or merely inspected logs never reach the output.
/// Returns the ingested count.
pub fn log_ingester_task(
    id: TaskId<usize>,
    source: TaskRef<LogList>,
    labels: LabelSet,
) -> Arc<Task> {
    Task::typed(
        id,
        vec![Dependency::from(&source)],
        labels,
        move |ctx| {
            let source = source.clone();
            async move {
                let builder = HistoryBuilder::from_context(&ctx)?;
                let logs = ctx.task_result(&source);
                for log in logs.iter() {
                    builder.ingest(log);
                }
                ctx.logger()
                    .info(format!("ingested {} logs", logs.len()));
                Ok(logs.len())
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::builder_key;
    use crate::pipeline::log::{LogEntry, LogSeverity};
    use crate::runtime::TaskContext;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn ingester_pushes_source_logs_into_builder() {
        let ctx = TaskContext::detached();
        let builder = Arc::new(HistoryBuilder::new());
        ctx.session_store()
            .set_arc(&builder_key(), Arc::clone(&builder));

        let logs: LogList = vec![
            Arc::new(LogEntry::new("a", Utc::now(), LogSeverity::Info, json!({}))),
            Arc::new(LogEntry::new("b", Utc::now(), LogSeverity::Info, json!({}))),
        ];
        let source = Task::typed(
            TaskId::<LogList>::new("source"),
            vec![],
            LabelSet::default(),
            move |_| {
                let logs = logs.clone();
                async move { Ok(logs) }
            },
        );
        let ingest = log_ingester_task(
            TaskId::new("ingest"),
            TaskRef::new("source"),
            LabelSet::default(),
        );

        let universe = crate::task::TaskSet::with_tasks([source, ingest]).unwrap();
        let graph = Arc::new(crate::dag::resolve(&universe, &universe).unwrap());
        let runner = crate::runtime::LocalRunner::new(Arc::clone(&graph));
        runner.run(&ctx).unwrap();
        runner.wait().await;
        let results = runner.result().unwrap();

        assert_eq!(*results.get(&TaskRef::<usize>::new("ingest")).unwrap(), 2);
        assert_eq!(builder.stats().logs, 2);
    }
}
