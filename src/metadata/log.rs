//! Per-task captured log buffers
//!
//! Each task in the resolved graph gets a throttled buffer; the frontend
//! shows the captured lines per feature task. Capture never blocks and never
//! fails the run: past the line cap, lines are counted as dropped instead of
//! stored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Default per-task line cap.
pub const MAX_CAPTURED_LINES: usize = 1000;

/// Append-only, capped line buffer for one task.
#[derive(Debug)]
pub struct TaskLogBuffer {
    lines: Mutex<Vec<String>>,
    dropped: AtomicU64,
    max_lines: usize,
}

impl TaskLogBuffer {
    fn new(max_lines: usize) -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
            dropped: AtomicU64::new(0),
            max_lines,
        }
    }

    pub fn append(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock();
        if lines.len() >= self.max_lines {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        lines.push(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn to_value(&self) -> Value {
        let lines = self.lines.lock();
        json!({
            "content": lines.join("\n"),
            "droppedLines": self.dropped.load(Ordering::Relaxed),
        })
    }
}

/// Buffers for every task of a run, keyed by task reference.
#[derive(Debug, Default)]
pub struct TaskLogSet {
    buffers: DashMap<Arc<str>, Arc<TaskLogBuffer>>,
}

impl TaskLogSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register a buffer; called for every graph member before tasks run
    /// so readers never observe a missing key.
    pub fn register(&self, task_ref: Arc<str>) -> Arc<TaskLogBuffer> {
        Arc::clone(
            self.buffers
                .entry(task_ref)
                .or_insert_with(|| Arc::new(TaskLogBuffer::new(MAX_CAPTURED_LINES)))
                .value(),
        )
    }

    pub fn get(&self, task_ref: &str) -> Option<Arc<TaskLogBuffer>> {
        self.buffers.get(task_ref).map(|b| Arc::clone(b.value()))
    }

    pub fn to_value(&self) -> Value {
        let mut entries: Vec<(String, Value)> = self
            .buffers
            .iter()
            .map(|e| (e.key().to_string(), e.value().to_value()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Value::Object(entries.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        let set = TaskLogSet::new();
        let a = set.register(Arc::from("task"));
        let b = set.register(Arc::from("task"));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn buffer_caps_and_counts_drops() {
        let buffer = TaskLogBuffer::new(2);
        buffer.append("one");
        buffer.append("two");
        buffer.append("three");
        assert_eq!(buffer.lines().len(), 2);
        assert_eq!(buffer.dropped(), 1);
    }

    #[test]
    fn to_value_joins_lines() {
        let set = TaskLogSet::new();
        let buffer = set.register(Arc::from("parse"));
        buffer.append("a");
        buffer.append("b");
        let value = set.to_value();
        assert_eq!(value["parse"]["content"], "a\nb");
        assert_eq!(value["parse"]["droppedLines"], 0);
    }
}
