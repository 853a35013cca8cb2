//! Single-step execution with bounded retry and cooperative cancellation.

use crate::cancellation::CancellationToken;
use crate::executor::ExecutorResolver;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use taskwave_core::event::{EventBus, EventKind, LifecycleEvent};
use taskwave_core::step::{Step, StepStatus};
use taskwave_core::StepId;

/// Bounded retry policy for executor failures.
///
/// The delay is fixed, not exponential: the baseline contract is
/// `max_retries + 1` total attempts with a constant pause between them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum retries after the first attempt
    pub max_retries: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    /// 3 retries with a 2 second delay.
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_millis(2000),
        }
    }
}

/// Terminal outcome of running one step.
#[derive(Clone, Debug)]
pub struct StepOutcome {
    /// Step this outcome belongs to
    pub id: StepId,
    /// Completed or Failed
    pub status: StepStatus,
    /// Result payload on success
    pub result: Option<Value>,
    /// Error message on failure
    pub error: Option<String>,
    /// When the first attempt started
    pub started_at: DateTime<Utc>,
    /// When the outcome was reached
    pub finished_at: DateTime<Utc>,
    /// Retry counter after this run (failures increment it; an abort
    /// does not)
    pub retry_count: u32,
    /// True when the failure was caused by cancellation, not the
    /// executor
    pub aborted: bool,
}

impl StepOutcome {
    /// Folds this outcome back into a step's runtime fields.
    pub fn apply_to(&self, step: &mut Step) {
        step.status = self.status;
        step.result = self.result.clone();
        step.error = self.error.clone();
        step.started_at = Some(self.started_at);
        step.finished_at = Some(self.finished_at);
        step.duration_ms = Some((self.finished_at - self.started_at).num_milliseconds());
        step.retry_count = self.retry_count;
    }
}

/// What one executor attempt produced.
enum Attempt {
    Succeeded(Option<Value>),
    Failed(String),
    Aborted,
}

/// Runs single steps against the injected executor catalog.
///
/// Cheap to clone; each in-wave step task gets its own clone.
#[derive(Clone)]
pub struct StepRunner {
    workflow_id: String,
    resolver: Arc<dyn ExecutorResolver>,
    policy: RetryPolicy,
    bus: EventBus,
}

impl StepRunner {
    /// Creates a runner for one workflow execution.
    pub fn new(
        workflow_id: impl Into<String>,
        resolver: Arc<dyn ExecutorResolver>,
        policy: RetryPolicy,
        bus: EventBus,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            resolver,
            policy,
            bus,
        }
    }

    /// Executes one step to a terminal outcome.
    ///
    /// Marks the step in progress, invokes the named executor with the
    /// step's arguments, and races the call against `token`. Executor
    /// failures are retried up to the policy bound with the fixed
    /// delay; a missing executor fails immediately without retries;
    /// cancellation fails the step immediately with an aborted outcome
    /// that consumes no retry.
    ///
    /// The executor call runs on its own spawned task. If cancellation
    /// wins the race the call is abandoned: the task keeps running
    /// detached and its eventual result is discarded, never awaited.
    pub async fn run(&self, step: &Step, token: CancellationToken) -> StepOutcome {
        let started_at = Utc::now();
        self.bus.emit(&LifecycleEvent::step(
            EventKind::StepStarted,
            self.workflow_id.clone(),
            step.id.as_str(),
            None,
        ));

        let executor = match self.resolver.resolve(&step.target) {
            Some(executor) => executor,
            None => {
                // Retrying cannot make a missing capability appear
                return self.failed(
                    step,
                    started_at,
                    step.retry_count,
                    format!("no executor registered for target '{}'", step.target),
                    false,
                );
            }
        };

        let mut retry_count = step.retry_count;
        loop {
            if token.is_cancelled() {
                return self.failed(
                    step,
                    started_at,
                    retry_count,
                    "aborted: cancellation requested".to_string(),
                    true,
                );
            }

            match self.attempt(step, Arc::clone(&executor), &token).await {
                Attempt::Succeeded(result) => {
                    let finished_at = Utc::now();
                    self.bus.emit(&LifecycleEvent::step(
                        EventKind::StepCompleted,
                        self.workflow_id.clone(),
                        step.id.as_str(),
                        result.clone(),
                    ));
                    return StepOutcome {
                        id: step.id.clone(),
                        status: StepStatus::Completed,
                        result,
                        error: None,
                        started_at,
                        finished_at,
                        retry_count,
                        aborted: false,
                    };
                }
                Attempt::Aborted => {
                    return self.failed(
                        step,
                        started_at,
                        retry_count,
                        "aborted: cancellation requested".to_string(),
                        true,
                    );
                }
                Attempt::Failed(error) => {
                    retry_count += 1;
                    if retry_count > self.policy.max_retries {
                        return self.failed(step, started_at, retry_count, error, false);
                    }

                    tracing::debug!(
                        step_id = %step.id,
                        retry = retry_count,
                        max = self.policy.max_retries,
                        error = %error,
                        "step failed; retrying after fixed delay"
                    );

                    // The delay itself is raced against cancellation so a
                    // pause or cancel never has to wait it out
                    tokio::select! {
                        _ = token.wait_cancelled() => {
                            return self.failed(
                                step,
                                started_at,
                                retry_count,
                                "aborted: cancellation requested".to_string(),
                                true,
                            );
                        }
                        _ = tokio::time::sleep(self.policy.delay) => {}
                    }
                }
            }
        }
    }

    /// Runs one executor attempt, racing it against cancellation.
    async fn attempt(
        &self,
        step: &Step,
        executor: Arc<dyn crate::executor::StepExecutor>,
        token: &CancellationToken,
    ) -> Attempt {
        let target = step.target.clone();
        let args = step.args.clone();
        let mut handle = tokio::spawn(async move { executor.execute(&target, &args).await });

        tokio::select! {
            _ = token.wait_cancelled() => {
                // Abandon the call: drop the handle, let the task run
                // out detached, discard whatever it produces
                drop(handle);
                Attempt::Aborted
            }
            joined = &mut handle => match joined {
                Ok(Ok(output)) if output.success => Attempt::Succeeded(output.output),
                Ok(Ok(output)) => Attempt::Failed(
                    output.error.unwrap_or_else(|| "executor reported failure".to_string()),
                ),
                Ok(Err(e)) => Attempt::Failed(e.to_string()),
                Err(join_err) => Attempt::Failed(format!("executor panicked: {join_err}")),
            },
        }
    }

    fn failed(
        &self,
        step: &Step,
        started_at: DateTime<Utc>,
        retry_count: u32,
        error: String,
        aborted: bool,
    ) -> StepOutcome {
        let finished_at = Utc::now();
        self.bus.emit(&LifecycleEvent::step(
            EventKind::StepFailed,
            self.workflow_id.clone(),
            step.id.as_str(),
            Some(json!({ "error": error, "aborted": aborted })),
        ));
        StepOutcome {
            id: step.id.clone(),
            status: StepStatus::Failed,
            result: None,
            error: Some(error),
            started_at,
            finished_at,
            retry_count,
            aborted,
        }
    }
}
