//! Task collections
//!
//! `TaskSet` is the mutable registration-time collection (the server's task
//! universe, feature selections). `RunnableTaskSet` is the immutable,
//! topologically ordered output of [`crate::dag::resolve`] that the runner
//! executes. Nothing mutates a runnable set after resolution.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::{Task, UntypedId};
use crate::error::{KhronicleError, Result};

/// Ordered collection of task implementations with a reference index.
#[derive(Default, Clone)]
pub struct TaskSet {
    tasks: Vec<Arc<Task>>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: impl IntoIterator<Item = Arc<Task>>) -> Result<Self> {
        let mut set = Self::new();
        for task in tasks {
            set.add(task)?;
        }
        Ok(set)
    }

    /// Add an implementation. Two implementations may share a reference only
    /// when their tags differ.
    pub fn add(&mut self, task: Arc<Task>) -> Result<()> {
        if self.tasks.iter().any(|t| t.id().key() == task.id().key()) {
            return Err(KhronicleError::DuplicateImplementation {
                reference: task.reference().name().to_string(),
                tag: task.id().tag().map(str::to_string),
            });
        }
        self.tasks.push(task);
        Ok(())
    }

    pub fn remove(&mut self, id: &UntypedId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id().key() != id.key());
        before != self.tasks.len()
    }

    /// All implementations registered for a reference.
    pub fn candidates(&self, reference: &str) -> Vec<Arc<Task>> {
        self.tasks
            .iter()
            .filter(|t| t.reference().name() == reference)
            .cloned()
            .collect()
    }

    /// First implementation for a reference, if any.
    pub fn get(&self, reference: &str) -> Option<Arc<Task>> {
        self.tasks
            .iter()
            .find(|t| t.reference().name() == reference)
            .cloned()
    }

    /// New set holding the tasks matching the filter.
    pub fn subset(&self, mut filter: impl FnMut(&Task) -> bool) -> TaskSet {
        TaskSet {
            tasks: self
                .tasks
                .iter()
                .filter(|t| filter(t))
                .cloned()
                .collect(),
        }
    }

    /// Resolve this set as the seed against a universe of candidates.
    /// Convenience for [`crate::dag::resolve`].
    pub fn resolve(&self, universe: &TaskSet) -> Result<RunnableTaskSet> {
        crate::dag::resolve(self, universe)
    }

    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl std::fmt::Debug for TaskSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.tasks.iter().map(|t| t.id().to_string()))
            .finish()
    }
}

/// Resolved, topologically ordered, reference-closed task graph.
///
/// Invariants established by the resolver:
/// - every required dependency of every member resolves to exactly one member
/// - the member list is a valid topological order
/// - at most one implementation per reference
pub struct RunnableTaskSet {
    tasks: Vec<Arc<Task>>,
    by_reference: FxHashMap<Arc<str>, usize>,
}

impl RunnableTaskSet {
    /// Only the resolver constructs runnable sets.
    pub(crate) fn from_resolved(tasks: Vec<Arc<Task>>) -> Self {
        let by_reference = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.reference().name_arc(), i))
            .collect();
        Self {
            tasks,
            by_reference,
        }
    }

    /// Tasks in topological order.
    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    pub fn get(&self, reference: &str) -> Option<&Arc<Task>> {
        self.by_reference.get(reference).map(|&i| &self.tasks[i])
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.by_reference.contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Human-readable adjacency dump for the inspection-plan metadata.
    pub fn plan_dump(&self) -> String {
        let mut out = String::new();
        for task in &self.tasks {
            out.push_str(task.id().to_string().as_str());
            let deps: Vec<&str> = task
                .dependencies()
                .iter()
                .filter(|d| self.contains(d.reference().name()))
                .map(|d| d.reference().name())
                .collect();
            if deps.is_empty() {
                out.push_str(" (no deps)");
            } else {
                out.push_str(" <- ");
                out.push_str(&deps.join(", "));
            }
            out.push('\n');
        }
        out
    }
}

impl std::fmt::Debug for RunnableTaskSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.tasks.iter().map(|t| t.id().to_string()))
            .finish()
    }
}
