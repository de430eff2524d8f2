//! Inventory aggregation over discovery tasks
//!
//! A builder owns a merged-inventory reference. Feature pipelines register
//! discovery tasks that each contribute a partial map; the inventory task
//! depends on every registered discovery as an optional dependency and merges
//! whatever actually ran. With no discovery selected, the inventory is empty
//! rather than an error.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::task::{Dependency, LabelSet, Task, TaskId, TaskRef};

/// Merged inventory map.
pub type Inventory<K, V> = BTreeMap<K, V>;

/// Combines a partial map into the accumulator.
pub type MergeStrategy<K, V> = Arc<dyn Fn(&mut Inventory<K, V>, &Inventory<K, V>) + Send + Sync>;

pub struct InventoryBuilder<K, V> {
    reference: TaskRef<Inventory<K, V>>,
    discovery_refs: Mutex<Vec<TaskRef<Inventory<K, V>>>>,
    merge: MergeStrategy<K, V>,
}

impl<K, V> InventoryBuilder<K, V>
where
    K: Ord + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Builder with last-writer-wins merging.
    pub fn new(reference: TaskRef<Inventory<K, V>>) -> Self {
        Self::with_merge(
            reference,
            Arc::new(|acc: &mut Inventory<K, V>, partial: &Inventory<K, V>| {
                for (key, value) in partial {
                    acc.insert(key.clone(), value.clone());
                }
            }),
        )
    }

    pub fn with_merge(reference: TaskRef<Inventory<K, V>>, merge: MergeStrategy<K, V>) -> Self {
        Self {
            reference,
            discovery_refs: Mutex::new(Vec::new()),
            merge,
        }
    }

    pub fn reference(&self) -> TaskRef<Inventory<K, V>> {
        self.reference.clone()
    }

    /// Declare a discovery task contributing a partial map. Its dependencies
    /// are the feature tasks supplying the data being summarized.
    pub fn discovery_task<F, Fut>(
        &self,
        id: TaskId<Inventory<K, V>>,
        dependencies: Vec<Dependency>,
        labels: LabelSet,
        body: F,
    ) -> Arc<Task>
    where
        F: Fn(crate::runtime::TaskContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Inventory<K, V>>> + Send + 'static,
    {
        self.discovery_refs.lock().push(id.reference());
        Task::typed(id, dependencies, labels, body)
    }

    /// The merging task. Call after every discovery task is registered: the
    /// dependency list is frozen at construction.
    pub fn inventory_task(&self, labels: LabelSet) -> Arc<Task> {
        let discovery_refs = self.discovery_refs.lock().clone();
        let dependencies = discovery_refs
            .iter()
            .map(|r| Dependency::optional(r.untyped()))
            .collect();
        let merge = Arc::clone(&self.merge);
        Task::typed(
            TaskId::<Inventory<K, V>>::new(self.reference.untyped().name_arc()),
            dependencies,
            labels,
            move |ctx| {
                let discovery_refs = discovery_refs.clone();
                let merge = Arc::clone(&merge);
                async move {
                    let mut merged = Inventory::new();
                    for discovery in &discovery_refs {
                        if let Some(partial) = ctx.optional_task_result(discovery) {
                            merge(&mut merged, &partial);
                        }
                    }
                    Ok(merged)
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::resolve;
    use crate::runtime::{LocalRunner, TaskContext};
    use crate::task::TaskSet;

    fn builder() -> InventoryBuilder<String, String> {
        InventoryBuilder::new(TaskRef::new("node-inventory"))
    }

    async fn run(universe: TaskSet, seed: TaskSet) -> Arc<crate::runtime::ResultStore> {
        let graph = Arc::new(resolve(&seed, &universe).unwrap());
        let runner = LocalRunner::new(Arc::clone(&graph));
        let ctx = TaskContext::detached();
        runner.run(&ctx).unwrap();
        runner.wait().await;
        runner.result().unwrap()
    }

    #[tokio::test]
    async fn merges_partial_maps_from_all_discoveries() {
        let inv = builder();
        let d1 = inv.discovery_task(
            TaskId::new("discover-nodes"),
            vec![],
            LabelSet::default(),
            |_| async {
                Ok(Inventory::from([(
                    "node-a".to_string(),
                    "e2-medium".to_string(),
                )]))
            },
        );
        let d2 = inv.discovery_task(
            TaskId::new("discover-pools"),
            vec![],
            LabelSet::default(),
            |_| async {
                Ok(Inventory::from([(
                    "node-b".to_string(),
                    "e2-small".to_string(),
                )]))
            },
        );
        let merged = inv.inventory_task(LabelSet::default());

        let universe = TaskSet::with_tasks([d1, d2, Arc::clone(&merged)]).unwrap();
        let seed = TaskSet::with_tasks([merged]).unwrap();
        let results = run(universe, seed).await;

        let map = results.get(&builder().reference()).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["node-a"], "e2-medium");
        assert_eq!(map["node-b"], "e2-small");
    }

    #[tokio::test]
    async fn unselected_discovery_yields_empty_inventory() {
        let inv = builder();
        // Discovery registered with the builder but never added to the
        // universe - its feature was not selected.
        let _unregistered = inv.discovery_task(
            TaskId::new("discover-nodes"),
            vec![],
            LabelSet::default(),
            |_| async { Ok(Inventory::from([("x".to_string(), "y".to_string())])) },
        );
        let merged = inv.inventory_task(LabelSet::default());

        let universe = TaskSet::with_tasks([Arc::clone(&merged)]).unwrap();
        let seed = TaskSet::with_tasks([merged]).unwrap();
        let results = run(universe, seed).await;

        let map = results.get(&builder().reference()).unwrap();
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn custom_merge_strategy_is_applied() {
        let inv: InventoryBuilder<String, String> = InventoryBuilder::with_merge(
            TaskRef::new("node-inventory"),
            Arc::new(|acc, partial| {
                for (k, v) in partial {
                    acc.entry(k.clone())
                        .and_modify(|existing| *existing = format!("{existing}+{v}"))
                        .or_insert_with(|| v.clone());
                }
            }),
        );
        let d1 = inv.discovery_task(
            TaskId::new("d1"),
            vec![],
            LabelSet::default(),
            |_| async { Ok(Inventory::from([("k".to_string(), "a".to_string())])) },
        );
        let d2 = inv.discovery_task(
            TaskId::new("d2"),
            vec![],
            LabelSet::default(),
            |_| async { Ok(Inventory::from([("k".to_string(), "b".to_string())])) },
        );
        let merged = inv.inventory_task(LabelSet::default());

        let universe = TaskSet::with_tasks([d1, d2, Arc::clone(&merged)]).unwrap();
        let seed = TaskSet::with_tasks([merged]).unwrap();
        let results = run(universe, seed).await;

        let map = results
            .get(&TaskRef::<Inventory<String, String>>::new("node-inventory"))
            .unwrap();
        assert_eq!(map["k"], "a+b");
    }
}
