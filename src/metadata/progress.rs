//! Run progress
//!
//! One `Progress` per run: an overall phase plus per-task progress entries.
//! The overall percentage is resolved-count over total-count; a zero total
//! reports 0, never NaN. Terminal phases are sticky: once `mark_done`,
//! `mark_error` or `mark_cancelled` succeeds, later transitions are rejected.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;

/// Overall run phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Running,
    Done,
    Error,
    Cancelled,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        self != Phase::Running
    }
}

/// Progress of a single task, updated by the task body or the runner.
#[derive(Debug, Clone, Serialize)]
pub struct TaskProgress {
    pub id: String,
    pub label: String,
    pub message: String,
    /// In [0, 1]; meaningless when `indeterminate`.
    pub percentage: f32,
    pub indeterminate: bool,
}

impl TaskProgress {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            message: String::new(),
            percentage: 0.0,
            indeterminate: false,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_percentage(mut self, percentage: f32) -> Self {
        self.percentage = percentage.clamp(0.0, 1.0);
        self
    }

    pub fn indeterminate(mut self) -> Self {
        self.indeterminate = true;
        self
    }
}

#[derive(Debug)]
struct ProgressInner {
    phase: Phase,
    total: usize,
    resolved: usize,
    order: Vec<Arc<str>>,
    tasks: FxHashMap<Arc<str>, TaskProgress>,
}

/// Shared, internally locked progress record.
#[derive(Debug)]
pub struct Progress {
    inner: Mutex<ProgressInner>,
}

#[derive(Serialize)]
struct ProgressSnapshot {
    phase: Phase,
    percentage: f32,
    total: usize,
    resolved: usize,
    tasks: Vec<TaskProgress>,
}

impl Default for Progress {
    fn default() -> Self {
        Progress::new(0)
    }
}

impl Progress {
    /// `total` is the number of progress-reportable tasks in the graph.
    pub fn new(total: usize) -> Self {
        Self {
            inner: Mutex::new(ProgressInner {
                phase: Phase::Running,
                total,
                resolved: 0,
                order: Vec::new(),
                tasks: FxHashMap::default(),
            }),
        }
    }

    pub fn phase(&self) -> Phase {
        self.inner.lock().phase
    }

    /// resolved / total, with a zero total defined as 0.
    pub fn percentage(&self) -> f32 {
        let inner = self.inner.lock();
        percentage_of(inner.resolved, inner.total)
    }

    /// Publish or update one task's progress. Ignored after a terminal phase.
    pub fn update_task(&self, progress: TaskProgress) {
        let mut inner = self.inner.lock();
        if inner.phase.is_terminal() {
            return;
        }
        let key: Arc<str> = Arc::from(progress.id.as_str());
        if !inner.tasks.contains_key(&key) {
            inner.order.push(Arc::clone(&key));
        }
        inner.tasks.insert(key, progress);
    }

    /// Count one reportable task as finished and pin its bar at 100%.
    pub fn resolve_task(&self, id: &str) {
        let mut inner = self.inner.lock();
        if inner.phase.is_terminal() {
            return;
        }
        inner.resolved = (inner.resolved + 1).min(inner.total);
        if let Some(task) = inner.tasks.get_mut(id) {
            task.percentage = 1.0;
            task.indeterminate = false;
        }
    }

    pub fn mark_done(&self) -> bool {
        self.transition(Phase::Done)
    }

    pub fn mark_error(&self) -> bool {
        self.transition(Phase::Error)
    }

    pub fn mark_cancelled(&self) -> bool {
        self.transition(Phase::Cancelled)
    }

    fn transition(&self, to: Phase) -> bool {
        let mut inner = self.inner.lock();
        if inner.phase.is_terminal() {
            return false;
        }
        inner.phase = to;
        true
    }

    pub fn to_value(&self) -> serde_json::Value {
        let inner = self.inner.lock();
        let snapshot = ProgressSnapshot {
            phase: inner.phase,
            percentage: percentage_of(inner.resolved, inner.total),
            total: inner.total,
            resolved: inner.resolved,
            tasks: inner
                .order
                .iter()
                .filter_map(|id| inner.tasks.get(id).cloned())
                .collect(),
        };
        serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null)
    }
}

fn percentage_of(resolved: usize, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        resolved as f32 / total as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_total_is_zero_percent() {
        let progress = Progress::new(0);
        assert_eq!(progress.percentage(), 0.0);
    }

    #[test]
    fn resolving_all_tasks_reaches_one() {
        let progress = Progress::new(2);
        progress.resolve_task("a");
        assert!((progress.percentage() - 0.5).abs() < f32::EPSILON);
        progress.resolve_task("b");
        assert_eq!(progress.percentage(), 1.0);
    }

    #[test]
    fn terminal_phase_is_sticky() {
        let progress = Progress::new(1);
        assert!(progress.mark_done());
        assert!(!progress.mark_error());
        assert!(!progress.mark_cancelled());
        assert_eq!(progress.phase(), Phase::Done);
    }

    #[test]
    fn updates_after_terminal_are_rejected() {
        let progress = Progress::new(1);
        progress.mark_cancelled();
        progress.update_task(TaskProgress::new("t", "T"));
        progress.resolve_task("t");
        assert_eq!(progress.percentage(), 0.0);
        let value = progress.to_value();
        assert_eq!(value["tasks"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn resolve_pins_task_bar() {
        let progress = Progress::new(1);
        progress.update_task(TaskProgress::new("t", "T").indeterminate());
        progress.resolve_task("t");
        let value = progress.to_value();
        assert_eq!(value["tasks"][0]["percentage"], 1.0);
        assert_eq!(value["tasks"][0]["indeterminate"], false);
    }
}
