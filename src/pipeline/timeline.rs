//! Grouped log to timeline mapping
//!
//! Groups run in parallel; inside one group logs are processed strictly
//! sequentially in input order, threading a caller-defined state value from
//! log to log. Each log's change set is applied to the shared history
//! builder atomically right after its mapper call returns.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::error::Result;
use crate::history::{ChangeSet, HistoryBuilder};
use crate::runtime::TaskContext;
use crate::task::{Dependency, LabelSet, Task, TaskId, TaskRef};

use super::log::LogEntry;
use super::LogGroups;

/// Per-group mapping callback.
///
/// Receives the previous group state (or `S::default()` for the first log)
/// and returns the state handed to the next log of the same group. No
/// ordering exists across groups.
pub trait GroupMapper<S>: Send + Sync + 'static {
    fn process_log_by_group(
        &self,
        ctx: &TaskContext,
        log: &Arc<LogEntry>,
        change_set: &mut ChangeSet,
        builder: &HistoryBuilder,
        prev: S,
    ) -> Result<S>;
}

impl<S, F> GroupMapper<S> for F
where
    F: Fn(&TaskContext, &Arc<LogEntry>, &mut ChangeSet, &HistoryBuilder, S) -> Result<S>
        + Send
        + Sync
        + 'static,
{
    fn process_log_by_group(
        &self,
        ctx: &TaskContext,
        log: &Arc<LogEntry>,
        change_set: &mut ChangeSet,
        builder: &HistoryBuilder,
        prev: S,
    ) -> Result<S> {
        self(ctx, log, change_set, builder, prev)
    }
}

/// Map grouped logs onto the timeline. Returns the number of groups mapped.
pub fn log_to_timeline_task<S, M>(
    id: TaskId<usize>,
    groups: TaskRef<LogGroups>,
    labels: LabelSet,
    mapper: M,
) -> Arc<Task>
where
    S: Default + Send + 'static,
    M: GroupMapper<S>,
{
    let mapper = Arc::new(mapper);
    Task::typed(
        id,
        vec![Dependency::from(&groups)],
        labels,
        move |ctx| {
            let groups_ref = groups.clone();
            let mapper = Arc::clone(&mapper);
            async move {
                let builder = HistoryBuilder::from_context(&ctx)?;
                let groups = ctx.task_result(&groups_ref);

                let mut join_set = JoinSet::new();
                for (key, logs) in groups.iter() {
                    let key = key.clone();
                    let logs: Vec<Arc<LogEntry>> = logs.clone();
                    let mapper = Arc::clone(&mapper);
                    let builder = Arc::clone(&builder);
                    let group_ctx = ctx.clone();
                    join_set.spawn(async move {
                        let mut state = S::default();
                        for log in &logs {
                            if group_ctx.is_cancelled() {
                                return Err(crate::error::KhronicleError::Cancelled);
                            }
                            let mut change_set = ChangeSet::new(log);
                            state = mapper.process_log_by_group(
                                &group_ctx,
                                log,
                                &mut change_set,
                                &builder,
                                state,
                            )?;
                            builder.apply(change_set);
                        }
                        Ok(key)
                    });
                }

                let mut mapped = 0usize;
                let mut first_error = None;
                while let Some(joined) = join_set.join_next().await {
                    match joined {
                        Ok(Ok(_key)) => mapped += 1,
                        Ok(Err(err)) => {
                            if first_error.is_none() {
                                first_error = Some(err);
                            }
                        }
                        Err(join_err) => {
                            if first_error.is_none() {
                                first_error = Some(crate::error::KhronicleError::task_failure(
                                    groups_ref.name(),
                                    join_err,
                                ));
                            }
                        }
                    }
                }
                match first_error {
                    Some(err) => Err(err),
                    None => {
                        ctx.logger().info(format!("mapped {mapped} groups"));
                        Ok(mapped)
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::builder_key;
    use crate::pipeline::log::LogSeverity;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use serde_json::json;

    fn log_at(id: &str, secs: i64) -> Arc<LogEntry> {
        Arc::new(LogEntry::new(
            id,
            Utc.timestamp_opt(secs, 0).unwrap(),
            LogSeverity::Info,
            json!({}),
        ))
    }

    async fn run_mapper(
        groups: LogGroups,
        mapper: impl GroupMapper<usize>,
    ) -> (Arc<HistoryBuilder>, usize) {
        let ctx = TaskContext::detached();
        let builder = Arc::new(HistoryBuilder::new());
        ctx.session_store()
            .set_arc(&builder_key(), Arc::clone(&builder));

        let source = Task::typed(
            TaskId::<LogGroups>::new("groups"),
            vec![],
            LabelSet::default(),
            move |_| {
                let groups = groups.clone();
                async move { Ok(groups) }
            },
        );
        let map = log_to_timeline_task(
            TaskId::new("map"),
            TaskRef::new("groups"),
            LabelSet::default(),
            mapper,
        );

        let universe = crate::task::TaskSet::with_tasks([source, map]).unwrap();
        let graph = Arc::new(crate::dag::resolve(&universe, &universe).unwrap());
        let runner = crate::runtime::LocalRunner::new(Arc::clone(&graph));
        runner.run(&ctx).unwrap();
        runner.wait().await;
        let results = runner.result().unwrap();
        let mapped = *results.get(&TaskRef::<usize>::new("map")).unwrap();
        (builder, mapped)
    }

    #[tokio::test]
    async fn per_group_order_and_state_accumulation() {
        let observed: Arc<Mutex<Vec<(String, usize)>>> = Arc::new(Mutex::new(Vec::new()));
        let observed_in_mapper = Arc::clone(&observed);

        let mut groups = LogGroups::new();
        groups.insert("g".into(), vec![log_at("a", 1), log_at("b", 2), log_at("c", 3)]);

        let (_builder, mapped) = run_mapper(
            groups,
            move |_ctx: &TaskContext,
                  log: &Arc<LogEntry>,
                  _cs: &mut ChangeSet,
                  _builder: &HistoryBuilder,
                  prev: usize|
                  -> Result<usize> {
                observed_in_mapper
                    .lock()
                    .push((log.id().to_string(), prev));
                Ok(prev + 1)
            },
        )
        .await;

        assert_eq!(mapped, 1);
        // Input order, with the threaded state counting up.
        assert_eq!(
            *observed.lock(),
            vec![("a".to_string(), 0), ("b".to_string(), 1), ("c".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn change_sets_land_in_builder() {
        let mut groups = LogGroups::new();
        groups.insert("pod-x".into(), vec![log_at("a", 1), log_at("b", 2)]);
        groups.insert("pod-y".into(), vec![log_at("c", 3)]);

        let (builder, mapped) = run_mapper(
            groups,
            |_ctx: &TaskContext,
             _log: &Arc<LogEntry>,
             cs: &mut ChangeSet,
             _builder: &HistoryBuilder,
             prev: usize|
             -> Result<usize> {
                cs.record_event("core/v1#pod#ns#p");
                Ok(prev)
            },
        )
        .await;

        assert_eq!(mapped, 2);
        assert_eq!(builder.stats().events, 3);
    }
}
