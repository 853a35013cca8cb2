//! End-to-end scheduling scenarios against the orchestrator surface.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskwave_core::step::{StepBlueprint, StepStatus};
use taskwave_core::workflow::WorkflowStatus;
use taskwave_core::EventKind;
use taskwave_engine::{
    ExecutionOutput, ExecutorRegistry, FnExecutor, Orchestrator, OrchestratorConfig,
    OrchestratorError, RetryPolicy, StepExecutor,
};

/// Executor that records per-target call counts.
struct CountingExecutor {
    calls: Mutex<Vec<String>>,
}

impl CountingExecutor {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    fn count_for(&self, step_arg: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == step_arg)
            .count()
    }
}

#[async_trait]
impl StepExecutor for CountingExecutor {
    async fn execute(&self, _target: &str, args: &Map<String, Value>) -> anyhow::Result<ExecutionOutput> {
        let name = args
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("?")
            .to_string();
        self.calls.lock().unwrap().push(name);
        Ok(ExecutionOutput::ok_empty())
    }
}

/// Executor that fails a fixed number of times, then succeeds.
struct FlakyExecutor {
    failures: u32,
    calls: AtomicU32,
}

#[async_trait]
impl StepExecutor for FlakyExecutor {
    async fn execute(&self, _target: &str, _args: &Map<String, Value>) -> anyhow::Result<ExecutionOutput> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Ok(ExecutionOutput::err(format!("transient failure {call}")))
        } else {
            Ok(ExecutionOutput::ok(json!("recovered")))
        }
    }
}

/// Executor that hangs on its first call and succeeds afterwards.
struct HangOnceExecutor {
    calls: AtomicU32,
}

#[async_trait]
impl StepExecutor for HangOnceExecutor {
    async fn execute(&self, _target: &str, _args: &Map<String, Value>) -> anyhow::Result<ExecutionOutput> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            std::future::pending::<()>().await;
        }
        Ok(ExecutionOutput::ok_empty())
    }
}

fn orchestrator_with(target: &str, executor: Arc<dyn StepExecutor>) -> Orchestrator {
    let mut registry = ExecutorRegistry::new();
    registry.register(target, executor);
    Orchestrator::new(Arc::new(registry), OrchestratorConfig::default())
}

fn diamond_steps() -> Vec<StepBlueprint> {
    vec![
        StepBlueprint::new("1", "Root", "noop"),
        StepBlueprint::new("2", "Left", "noop").depends_on("1"),
        StepBlueprint::new("3", "Right", "noop").depends_on("1"),
        StepBlueprint::new("4", "Join", "noop").depends_on("2").depends_on("3"),
    ]
}

// Scenario A: diamond with an always-succeeding executor completes
// with progress 100 and the expected wave structure.
#[tokio::test]
async fn scenario_a_diamond_completes() {
    use std::collections::HashSet;
    use taskwave_core::StepId;
    use taskwave_engine::{group_levels, parallelism_factor};

    // Wave structure, checked directly
    let steps: Vec<_> = diamond_steps()
        .into_iter()
        .map(taskwave_core::Step::from_blueprint)
        .collect();
    let levels = group_levels(&steps, &HashSet::new()).unwrap();
    assert_eq!(
        levels,
        vec![
            vec![StepId::new("1")],
            vec![StepId::new("2"), StepId::new("3")],
            vec![StepId::new("4")],
        ]
    );
    assert!((parallelism_factor(4, levels.len()) - 4.0 / 3.0).abs() < 1e-9);

    // Full execution
    let orch = orchestrator_with("noop", Arc::new(FnExecutor::ok()));
    let wf = orch.create_workflow("diamond", "", diamond_steps());
    let done = orch.execute_workflow(&wf.id).await.unwrap();

    assert_eq!(done.status, WorkflowStatus::Completed);
    assert_eq!(done.progress, 100);
    assert!(done.steps.iter().all(|s| s.status == StepStatus::Completed));
}

// Scenario B: a cyclic workflow is rejected before any step starts and
// never produces a completed history entry.
#[tokio::test]
async fn scenario_b_cycle_rejected() {
    let orch = orchestrator_with("noop", Arc::new(FnExecutor::ok()));
    let wf = orch.create_workflow(
        "cyclic",
        "",
        vec![
            StepBlueprint::new("1", "A", "noop").depends_on("2"),
            StepBlueprint::new("2", "B", "noop").depends_on("1"),
        ],
    );

    let err = orch.execute_workflow(&wf.id).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Graph(taskwave_engine::GraphError::CycleDetected(_))
    ));

    // No step was ever marked in progress
    let rejected = orch.workflow(&wf.id).unwrap();
    assert!(rejected
        .steps
        .iter()
        .all(|s| s.status == StepStatus::Pending));
    assert_eq!(rejected.status, WorkflowStatus::Failed);

    // History reflects the rejection, never a completion
    assert!(orch
        .history()
        .iter()
        .all(|e| e.outcome != taskwave_core::Outcome::Completed));
}

// Scenario C: an executor that fails twice then succeeds leaves the
// step completed with retry_count 2 and the workflow completed.
#[tokio::test(start_paused = true)]
async fn scenario_c_flaky_step_recovers() {
    let orch = orchestrator_with(
        "flaky",
        Arc::new(FlakyExecutor {
            failures: 2,
            calls: AtomicU32::new(0),
        }),
    );
    let wf = orch.create_workflow("flaky", "", vec![StepBlueprint::new("only", "Flaky", "flaky")]);
    let done = orch.execute_workflow(&wf.id).await.unwrap();

    assert_eq!(done.status, WorkflowStatus::Completed);
    assert_eq!(done.steps[0].retry_count, 2);
    assert_eq!(done.steps[0].status, StepStatus::Completed);
    assert_eq!(done.steps[0].result, Some(json!("recovered")));
}

// Scenario D: pause mid-execution aborts the in-flight step, and
// resume re-executes only steps not yet completed.
#[tokio::test(start_paused = true)]
async fn scenario_d_pause_and_resume() {
    let counting = CountingExecutor::new();
    let hanging = Arc::new(HangOnceExecutor {
        calls: AtomicU32::new(0),
    });

    let mut registry = ExecutorRegistry::new();
    registry.register("quick", Arc::clone(&counting) as Arc<dyn StepExecutor>);
    registry.register("slow", Arc::clone(&hanging) as Arc<dyn StepExecutor>);
    let orch = Orchestrator::new(Arc::new(registry), OrchestratorConfig::default());

    let wf = orch.create_workflow(
        "pausable",
        "",
        vec![
            StepBlueprint::new("a", "Quick step", "quick").with_arg("name", json!("a")),
            StepBlueprint::new("b", "Slow step", "slow").depends_on("a"),
        ],
    );
    let id = wf.id.clone();

    let exec = tokio::spawn({
        let orch = orch.clone();
        let id = id.clone();
        async move { orch.execute_workflow(&id).await }
    });

    // Let step a complete and step b hang, then pause
    tokio::time::sleep(Duration::from_millis(100)).await;
    orch.pause_workflow(&id).unwrap();

    let paused = exec.await.unwrap().unwrap();
    assert_eq!(paused.status, WorkflowStatus::Paused);

    let a = paused.steps.iter().find(|s| s.id.as_str() == "a").unwrap();
    let b = paused.steps.iter().find(|s| s.id.as_str() == "b").unwrap();
    assert_eq!(a.status, StepStatus::Completed);
    // The in-flight step resolved to an aborted failure
    assert_eq!(b.status, StepStatus::Failed);
    assert_eq!(b.retry_count, 0);

    // Resume: only b re-executes (its second call succeeds)
    let done = orch.resume_workflow(&id).await.unwrap();
    assert_eq!(done.status, WorkflowStatus::Completed);
    assert_eq!(done.progress, 100);
    assert_eq!(counting.count_for("a"), 1);
    assert_eq!(hanging.calls.load(Ordering::SeqCst), 2);
}

// Retry bound: an always-failing executor is attempted exactly
// max_retries + 1 times before the workflow fails.
#[tokio::test(start_paused = true)]
async fn retry_bound_exhausts_then_fails() {
    let executor = Arc::new(FlakyExecutor {
        failures: u32::MAX,
        calls: AtomicU32::new(0),
    });
    let orch = orchestrator_with("flaky", Arc::clone(&executor) as Arc<dyn StepExecutor>);
    let wf = orch.create_workflow("doomed", "", vec![StepBlueprint::new("x", "Doomed", "flaky")]);

    let err = orch.execute_workflow(&wf.id).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::WorkflowFailed { .. }));
    assert_eq!(executor.calls.load(Ordering::SeqCst), 4);

    let failed = orch.workflow(&wf.id).unwrap();
    assert_eq!(failed.status, WorkflowStatus::Failed);
    assert_eq!(failed.steps[0].retry_count, 4);

    // History reflects the failure
    let history = orch.history();
    assert_eq!(history.last().unwrap().outcome, taskwave_core::Outcome::Failed);
}

// Progress is non-decreasing over one execution and hits 100 only at
// completion.
#[tokio::test]
async fn progress_is_monotonic() {
    let orch = orchestrator_with("noop", Arc::new(FnExecutor::ok()));
    let wf = orch.create_workflow(
        "chain",
        "",
        vec![
            StepBlueprint::new("a", "A", "noop"),
            StepBlueprint::new("b", "B", "noop").depends_on("a"),
            StepBlueprint::new("c", "C", "noop").depends_on("b"),
        ],
    );

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sub = {
        let seen = Arc::clone(&seen);
        let orch = orch.clone();
        let id = wf.id.clone();
        orch.clone().subscribe(Some(EventKind::StepStarted), move |_| {
            if let Some(w) = orch.workflow(&id) {
                seen.lock().unwrap().push(w.progress);
            }
        })
    };

    let done = orch.execute_workflow(&wf.id).await.unwrap();
    sub.unsubscribe();

    let samples = seen.lock().unwrap().clone();
    assert!(samples.windows(2).all(|w| w[0] <= w[1]), "progress regressed: {samples:?}");
    assert!(samples.iter().all(|&p| p < 100));
    assert_eq!(done.progress, 100);
    assert_eq!(done.status, WorkflowStatus::Completed);
}

// A missing executor target fails the step without retries and fails
// the workflow.
#[tokio::test]
async fn missing_executor_is_not_retried() {
    let orch = orchestrator_with("real", Arc::new(FnExecutor::ok()));
    let wf = orch.create_workflow(
        "misconfigured",
        "",
        vec![StepBlueprint::new("x", "Ghost target", "ghost")],
    );

    let err = orch.execute_workflow(&wf.id).await.unwrap_err();
    let OrchestratorError::WorkflowFailed { error, .. } = err else {
        panic!("expected WorkflowFailed");
    };
    assert!(error.contains("no executor registered"));

    let failed = orch.workflow(&wf.id).unwrap();
    assert_eq!(failed.steps[0].retry_count, 0);
}

// A failing step prevents later waves from starting.
#[tokio::test(start_paused = true)]
async fn failure_stops_later_waves() {
    let counting = CountingExecutor::new();
    let mut registry = ExecutorRegistry::new();
    registry.register("count", Arc::clone(&counting) as Arc<dyn StepExecutor>);
    registry.register(
        "fail",
        Arc::new(FlakyExecutor {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        }) as Arc<dyn StepExecutor>,
    );
    let orch = Orchestrator::new(
        Arc::new(registry),
        OrchestratorConfig {
            retry: RetryPolicy {
                max_retries: 0,
                delay: Duration::from_millis(1),
            },
            ..OrchestratorConfig::default()
        },
    );

    let wf = orch.create_workflow(
        "halts",
        "",
        vec![
            StepBlueprint::new("bad", "Fails", "fail"),
            StepBlueprint::new("after", "Never runs", "count")
                .with_arg("name", json!("after"))
                .depends_on("bad"),
        ],
    );

    assert!(orch.execute_workflow(&wf.id).await.is_err());
    assert_eq!(counting.count_for("after"), 0);

    let failed = orch.workflow(&wf.id).unwrap();
    let after = failed.steps.iter().find(|s| s.id.as_str() == "after").unwrap();
    assert_eq!(after.status, StepStatus::Pending);
}
