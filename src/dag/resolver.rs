//! Seed + universe resolution with cycle detection

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::{KhronicleError, Result};
use crate::task::{RunnableTaskSet, Task, TaskSet};

/// Resolve the seed set against the universe into a runnable graph.
///
/// See the module docs for the contract. Determinism: candidate ranking is a
/// total order (priority desc, then tag asc), and traversal follows seed
/// insertion order, so identical inputs produce identical graphs.
pub fn resolve(seed: &TaskSet, universe: &TaskSet) -> Result<RunnableTaskSet> {
    let mut chosen: FxHashMap<Arc<str>, Arc<Task>> = FxHashMap::default();
    let mut queue: Vec<Arc<Task>> = Vec::new();

    // Seed tasks are pre-chosen; competing seeds for one reference are ranked
    // exactly like universe candidates.
    for task in seed.iter() {
        let name = task.reference().name_arc();
        match chosen.get(&name) {
            Some(existing) if rank(existing) >= rank(task) => {}
            _ => {
                chosen.insert(Arc::clone(&name), Arc::clone(task));
            }
        }
    }
    for task in chosen.values() {
        queue.push(Arc::clone(task));
    }
    // Seed order, not hash order.
    queue.sort_by_key(|t| {
        seed.iter()
            .position(|s| s.id().key() == t.id().key())
            .unwrap_or(usize::MAX)
    });

    while let Some(task) = queue.pop() {
        for dep in task.dependencies() {
            let name = dep.reference().name();
            if chosen.contains_key(name) {
                continue;
            }
            match select_candidate(universe, name)? {
                Some(candidate) => {
                    chosen.insert(candidate.reference().name_arc(), Arc::clone(&candidate));
                    queue.push(candidate);
                }
                None if dep.is_optional() => {}
                None => {
                    return Err(KhronicleError::UnresolvableDependency {
                        task_id: task.id().to_string(),
                        reference: name.to_string(),
                    });
                }
            }
        }
    }

    topological_order(chosen).map(RunnableTaskSet::from_resolved)
}

/// Ranking key: higher priority wins; ties prefer the lexicographically
/// smallest tag (an untagged implementation sorts before tagged ones).
fn rank(task: &Task) -> (i32, std::cmp::Reverse<Option<String>>) {
    (
        task.id().priority(),
        std::cmp::Reverse(task.id().tag().map(str::to_string)),
    )
}

fn select_candidate(universe: &TaskSet, reference: &str) -> Result<Option<Arc<Task>>> {
    let mut candidates = universe.candidates(reference);
    if candidates.is_empty() {
        return Ok(None);
    }
    candidates.sort_by(|a, b| rank(b).cmp(&rank(a)));
    if candidates.len() > 1 && rank(&candidates[0]) == rank(&candidates[1]) {
        // Unreachable while TaskSet enforces unique (reference, tag) pairs;
        // kept so a future relaxation fails loudly instead of silently.
        return Err(KhronicleError::AmbiguousDependency {
            reference: reference.to_string(),
        });
    }
    Ok(Some(Arc::clone(&candidates[0])))
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Depth-first post-order over the chosen graph; emits dependencies before
/// dependents and reports the offending path on a back edge.
fn topological_order(chosen: FxHashMap<Arc<str>, Arc<Task>>) -> Result<Vec<Arc<Task>>> {
    let mut roots: Vec<Arc<str>> = chosen.keys().cloned().collect();
    roots.sort();

    let mut marks: FxHashMap<Arc<str>, Mark> = chosen
        .keys()
        .map(|k| (Arc::clone(k), Mark::Unvisited))
        .collect();
    let mut order: Vec<Arc<Task>> = Vec::with_capacity(chosen.len());
    let mut path: Vec<Arc<str>> = Vec::new();

    for root in roots {
        if marks[&root] == Mark::Done {
            continue;
        }
        visit(&root, &chosen, &mut marks, &mut order, &mut path)?;
    }
    Ok(order)
}

fn visit(
    name: &Arc<str>,
    chosen: &FxHashMap<Arc<str>, Arc<Task>>,
    marks: &mut FxHashMap<Arc<str>, Mark>,
    order: &mut Vec<Arc<Task>>,
    path: &mut Vec<Arc<str>>,
) -> Result<()> {
    match marks[name] {
        Mark::Done => return Ok(()),
        Mark::InProgress => {
            let start = path.iter().position(|p| p == name).unwrap_or(0);
            let mut cycle: Vec<String> =
                path[start..].iter().map(|p| p.to_string()).collect();
            cycle.push(name.to_string());
            return Err(KhronicleError::CycleDetected { cycle });
        }
        Mark::Unvisited => {}
    }

    marks.insert(Arc::clone(name), Mark::InProgress);
    path.push(Arc::clone(name));

    let task = &chosen[name];
    for dep in task.dependencies() {
        let dep_name = dep.reference().name_arc();
        if chosen.contains_key(&dep_name) {
            visit(&dep_name, chosen, marks, order, path)?;
        }
    }

    path.pop();
    marks.insert(Arc::clone(name), Mark::Done);
    order.push(Arc::clone(task));
    Ok(())
}
