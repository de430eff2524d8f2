//! Runner behavior: scheduling, ordering, parallelism, cancellation

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use khronicle::dag::resolve;
use khronicle::metadata::{MetadataBus, Phase};
use khronicle::runtime::{LocalRunner, TaskContext};
use khronicle::task::{Dependency, LabelSet, Task, TaskId, TaskRef, TaskSet};
use khronicle::KhronicleError;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

fn runnable(tasks: Vec<Arc<Task>>, seed_refs: &[&str]) -> Arc<khronicle::task::RunnableTaskSet> {
    let universe = TaskSet::with_tasks(tasks).unwrap();
    let seed = TaskSet::with_tasks(
        seed_refs
            .iter()
            .map(|r| universe.get(r).expect("seed task registered")),
    )
    .unwrap();
    Arc::new(resolve(&seed, &universe).unwrap())
}

async fn run_to_completion(
    graph: Arc<khronicle::task::RunnableTaskSet>,
) -> (LocalRunner, TaskContext) {
    let runner = LocalRunner::new(Arc::clone(&graph));
    let ctx = TaskContext::builder()
        .metadata(MetadataBus::for_graph(&graph))
        .build();
    runner.run(&ctx).unwrap();
    runner.wait().await;
    (runner, ctx)
}

// Scenario: A -> 1, B = A*2, C = B+3; running {C} yields A=1, B=2, C=5.
#[tokio::test]
async fn arithmetic_chain_resolves_and_computes() {
    let a = Task::typed(TaskId::<i64>::new("a"), vec![], LabelSet::default(), |_| {
        async { Ok(1i64) }
    });
    let b = Task::typed(
        TaskId::<i64>::new("b"),
        vec![Dependency::from("a")],
        LabelSet::default(),
        |ctx| async move { Ok(*ctx.task_result(&TaskRef::<i64>::new("a")) * 2) },
    );
    let c = Task::typed(
        TaskId::<i64>::new("c"),
        vec![Dependency::from("b")],
        LabelSet::default(),
        |ctx| async move { Ok(*ctx.task_result(&TaskRef::<i64>::new("b")) + 3) },
    );

    let graph = runnable(vec![a, b, c], &["c"]);
    let (runner, _ctx) = run_to_completion(graph).await;
    let results = runner.result().unwrap();

    assert_eq!(*results.get(&TaskRef::<i64>::new("a")).unwrap(), 1);
    assert_eq!(*results.get(&TaskRef::<i64>::new("b")).unwrap(), 2);
    assert_eq!(*results.get(&TaskRef::<i64>::new("c")).unwrap(), 5);
}

#[tokio::test]
async fn dependency_completes_before_dependent_starts() {
    let events: Arc<Mutex<Vec<(String, Instant)>>> = Arc::new(Mutex::new(Vec::new()));

    let make = |name: &'static str, deps: Vec<Dependency>, log: Arc<Mutex<Vec<(String, Instant)>>>| {
        Task::typed(TaskId::<u8>::new(name), deps, LabelSet::default(), move |_| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push((format!("{name}-start"), Instant::now()));
                tokio::time::sleep(Duration::from_millis(20)).await;
                log.lock().push((format!("{name}-end"), Instant::now()));
                Ok(0u8)
            }
        })
    };

    let upstream = make("upstream", vec![], Arc::clone(&events));
    let downstream = make("downstream", vec![Dependency::from("upstream")], Arc::clone(&events));

    let graph = runnable(vec![upstream, downstream], &["downstream"]);
    let (runner, _) = run_to_completion(graph).await;
    runner.result().unwrap();

    let log = events.lock();
    let at = |label: &str| log.iter().find(|(l, _)| l == label).unwrap().1;
    assert!(at("upstream-end") <= at("downstream-start"));
}

#[tokio::test]
async fn disjoint_closures_overlap_in_time() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let make = |name: &'static str, active: Arc<AtomicUsize>, peak: Arc<AtomicUsize>| {
        Task::typed(TaskId::<u8>::new(name), vec![], LabelSet::default(), move |_| {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(60)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(0u8)
            }
        })
    };

    let graph = runnable(
        vec![
            make("left", Arc::clone(&active), Arc::clone(&peak)),
            make("right", Arc::clone(&active), Arc::clone(&peak)),
        ],
        &["left", "right"],
    );
    let (runner, _) = run_to_completion(graph).await;
    runner.result().unwrap();

    assert!(peak.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn start_happens_as_soon_as_last_dependency_finishes() {
    // fast finishes long before slow; their joint dependent must not wait
    // for anything else, and mid (depending only on fast) must start while
    // slow is still running.
    let started_mid = Arc::new(Mutex::new(None::<Instant>));
    let slow_done = Arc::new(Mutex::new(None::<Instant>));

    let fast = Task::typed(TaskId::<u8>::new("fast"), vec![], LabelSet::default(), |_| {
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(0u8)
        }
    });
    let slow_done_w = Arc::clone(&slow_done);
    let slow = Task::typed(TaskId::<u8>::new("slow"), vec![], LabelSet::default(), move |_| {
        let slow_done = Arc::clone(&slow_done_w);
        async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            *slow_done.lock() = Some(Instant::now());
            Ok(0u8)
        }
    });
    let started_mid_w = Arc::clone(&started_mid);
    let mid = Task::typed(
        TaskId::<u8>::new("mid"),
        vec![Dependency::from("fast")],
        LabelSet::default(),
        move |_| {
            let started_mid = Arc::clone(&started_mid_w);
            async move {
                *started_mid.lock() = Some(Instant::now());
                Ok(0u8)
            }
        },
    );

    let graph = runnable(vec![fast, slow, mid], &["mid", "slow"]);
    let (runner, _) = run_to_completion(graph).await;
    runner.result().unwrap();

    let mid_start = started_mid.lock().unwrap();
    let slow_end = slow_done.lock().unwrap();
    assert!(
        mid_start < slow_end,
        "mid should start while slow is still running (no wave barrier)"
    );
}

#[tokio::test]
async fn cancellation_closes_wait_and_reports_cancelled() {
    let cancel = CancellationToken::new();
    let blocked = Task::typed(
        TaskId::<u8>::new("blocked"),
        vec![],
        LabelSet::default(),
        |_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(0u8)
        },
    );
    let never = Task::typed(
        TaskId::<u8>::new("never"),
        vec![Dependency::from("blocked")],
        LabelSet::default(),
        |_| async { panic!("must not launch after cancellation") },
    );

    let graph = runnable(vec![blocked, never], &["never"]);
    let runner = LocalRunner::new(Arc::clone(&graph));
    let ctx = TaskContext::builder()
        .metadata(MetadataBus::for_graph(&graph))
        .cancellation(cancel.clone())
        .build();
    runner.run(&ctx).unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    cancel.cancel();

    // wait() must close promptly after cancellation.
    tokio::time::timeout(Duration::from_secs(5), runner.wait())
        .await
        .expect("wait() should close after cancel");
    assert!(matches!(
        runner.result().unwrap_err(),
        KhronicleError::Cancelled
    ));
}

#[tokio::test]
async fn concurrent_runs_allow_exactly_one() {
    let graph = runnable(
        vec![Task::typed(
            TaskId::<u8>::new("only"),
            vec![],
            LabelSet::default(),
            |_| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(0u8)
            },
        )],
        &["only"],
    );
    let runner = Arc::new(LocalRunner::new(Arc::clone(&graph)));
    let ctx = TaskContext::builder()
        .metadata(MetadataBus::for_graph(&graph))
        .build();

    let mut outcomes = Vec::new();
    let mut handles = Vec::new();
    for _ in 0..2 {
        let runner = Arc::clone(&runner);
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move { runner.run(&ctx).is_ok() }));
    }
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }
    runner.wait().await;

    let successes = outcomes.iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1, "exactly one run call may win");
}

#[tokio::test]
async fn progress_reaches_one_and_phase_is_terminal_once() {
    let reportable = |name: &'static str, deps: Vec<Dependency>| {
        Task::typed(
            TaskId::<u8>::new(name),
            deps,
            LabelSet::builder().progress_reportable().build(),
            |_| async { Ok(0u8) },
        )
    };
    let graph = runnable(
        vec![
            reportable("one", vec![]),
            reportable("two", vec![Dependency::from("one")]),
        ],
        &["two"],
    );
    let bus = MetadataBus::for_graph(&graph);
    let runner = LocalRunner::new(Arc::clone(&graph));
    let ctx = TaskContext::builder().metadata(bus.clone()).build();

    assert_eq!(bus.progress().phase(), Phase::Running);
    runner.run(&ctx).unwrap();
    runner.wait().await;
    runner.result().unwrap();

    assert_eq!(bus.progress().percentage(), 1.0);
    assert!(bus.progress().mark_done());
    // Terminal is sticky: no way back to RUNNING or any other phase.
    assert!(!bus.progress().mark_error());
    assert_eq!(bus.progress().phase(), Phase::Done);
}
