//! Top-level workflow state machine and public surface.
//!
//! The orchestrator owns the process-wide mutable structures: the
//! active-workflow table, the template set, and the history log. All
//! mutation goes through one internal lock which is never held across
//! an await; step execution itself happens on spawned tasks that only
//! take the lock to publish status changes.
//!
//! Workflow lifecycle: pending -> in_progress -> {completed | failed |
//! paused}; paused -> in_progress (resume) or removed (cancel).
//! Completed and cancelled workflows are folded into history and
//! removed from the active set; failed workflows are folded into
//! history and kept for inspection.

use crate::cancellation::{CancellationSource, CancellationToken};
use crate::definition::WorkflowDefinition;
use crate::executor::ExecutorResolver;
use crate::graph::{DepGraph, GraphError};
use crate::levels::group_levels;
use crate::runner::{RetryPolicy, StepOutcome, StepRunner};
use chrono::Utc;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use taskwave_core::event::{EventBus, EventKind, LifecycleEvent, Subscription};
use taskwave_core::history::{HistoryEntry, HistoryLog, Outcome};
use taskwave_core::step::{StepBlueprint, StepId, StepStatus};
use taskwave_core::store::BlobStore;
use taskwave_core::workflow::{Template, Workflow, WorkflowStatus};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Blob-store keys used for persistence.
const TEMPLATES_KEY: &str = "templates";
const HISTORY_KEY: &str = "history";

/// Error types for orchestrator operations.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Unknown workflow id
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Unknown template id
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// Dependency structure is not executable (cycle, unresolved
    /// dependency, or deadlock)
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Operation not legal in the workflow's current state
    #[error("Workflow {id} is {status:?}; {operation} requires {expected}")]
    InvalidState {
        id: String,
        status: WorkflowStatus,
        operation: &'static str,
        expected: &'static str,
    },

    /// A second execute call raced an in-flight one for the same id
    #[error("Workflow {0} is already executing")]
    AlreadyExecuting(String),

    /// A step exhausted its retries
    #[error("Workflow {id} failed at step {step_id}: {error}")]
    WorkflowFailed {
        id: String,
        step_id: String,
        error: String,
    },

    /// The workflow was cancelled while executing
    #[error("Workflow {0} was cancelled")]
    Cancelled(String),

    /// Persistence failure while loading stored state
    #[error(transparent)]
    Store(#[from] taskwave_core::CoreError),
}

/// Tuning knobs for one orchestrator instance.
#[derive(Clone, Copy, Debug)]
pub struct OrchestratorConfig {
    /// Maximum steps of one workflow running concurrently, independent
    /// of wave size; larger waves queue for a free slot
    pub max_parallel: usize,
    /// Retry policy applied to every step
    pub retry: RetryPolicy,
    /// History log capacity
    pub history_capacity: usize,
}

impl Default for OrchestratorConfig {
    /// 3 concurrent steps, 3 retries at 2 s, 50 history entries.
    fn default() -> Self {
        Self {
            max_parallel: 3,
            retry: RetryPolicy::default(),
            history_capacity: taskwave_core::history::DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Why the shared cancellation signal was fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Intent {
    /// Normal execution
    Run,
    /// pause_workflow fired the scope; keep the workflow resumable
    Pause,
    /// cancel_workflow fired the scope; the workflow is being removed
    Cancel,
}

/// Per-execution cancellation scope plus the intent behind a fire.
struct ExecScope {
    source: CancellationSource,
    intent: Mutex<Intent>,
}

impl ExecScope {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            source: CancellationSource::new(),
            intent: Mutex::new(Intent::Run),
        })
    }

    fn fire(&self, intent: Intent) {
        *self.intent.lock().unwrap() = intent;
        self.source.cancel();
    }

    fn intent(&self) -> Intent {
        *self.intent.lock().unwrap()
    }
}

/// Everything behind the orchestrator's lock.
struct State {
    workflows: HashMap<String, Workflow>,
    templates: HashMap<String, Template>,
    history: HistoryLog,
    /// Single-writer guard: ids with an execute call in flight
    executing: HashSet<String>,
    /// Cancellation scopes of in-flight executions
    scopes: HashMap<String, Arc<ExecScope>>,
}

struct Inner {
    config: OrchestratorConfig,
    resolver: Arc<dyn ExecutorResolver>,
    store: Option<Arc<dyn BlobStore>>,
    bus: EventBus,
    state: Mutex<State>,
}

/// The workflow orchestration engine.
///
/// Cheap to clone; clones share the same active set, templates,
/// history, and event bus. Multiple independent workflows may execute
/// concurrently; two execute calls for the same id are rejected.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Creates an orchestrator with no persistence.
    ///
    /// The executor resolver is injected here; the engine never
    /// consults ambient global state to find capabilities.
    pub fn new(resolver: Arc<dyn ExecutorResolver>, config: OrchestratorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                resolver,
                bus: EventBus::new(),
                state: Mutex::new(State {
                    workflows: HashMap::new(),
                    templates: HashMap::new(),
                    history: HistoryLog::with_capacity(config.history_capacity),
                    executing: HashSet::new(),
                    scopes: HashMap::new(),
                }),
                store: None,
                config,
            }),
        }
    }

    /// Creates an orchestrator backed by a blob store.
    ///
    /// Templates and history are loaded from the store immediately and
    /// saved back after every mutation.
    pub fn with_store(
        resolver: Arc<dyn ExecutorResolver>,
        config: OrchestratorConfig,
        store: Arc<dyn BlobStore>,
    ) -> Result<Self, OrchestratorError> {
        let templates: HashMap<String, Template> = match store.load(TEMPLATES_KEY)? {
            Some(bytes) => serde_json::from_slice::<Vec<Template>>(&bytes)
                .map_err(taskwave_core::CoreError::from)?
                .into_iter()
                .map(|t| (t.id.clone(), t))
                .collect(),
            None => HashMap::new(),
        };
        let history = match store.load(HISTORY_KEY)? {
            Some(bytes) => {
                serde_json::from_slice(&bytes).map_err(taskwave_core::CoreError::from)?
            }
            None => HistoryLog::with_capacity(config.history_capacity),
        };

        Ok(Self {
            inner: Arc::new(Inner {
                resolver,
                bus: EventBus::new(),
                state: Mutex::new(State {
                    workflows: HashMap::new(),
                    templates,
                    history,
                    executing: HashSet::new(),
                    scopes: HashMap::new(),
                }),
                store: Some(store),
                config,
            }),
        })
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Creates a pending workflow from declared steps.
    ///
    /// Does not start execution; dependency validation happens in
    /// [`execute_workflow`](Self::execute_workflow).
    pub fn create_workflow(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        blueprints: Vec<StepBlueprint>,
    ) -> Workflow {
        let workflow = Workflow::new(name, description, blueprints);
        let snapshot = workflow.clone();
        self.inner
            .state
            .lock()
            .unwrap()
            .workflows
            .insert(workflow.id.clone(), workflow);
        snapshot
    }

    /// Instantiates a pending workflow from a stored template.
    pub fn create_from_template(&self, template_id: &str) -> Result<Workflow, OrchestratorError> {
        let mut state = self.inner.state.lock().unwrap();
        let template = state
            .templates
            .get(template_id)
            .ok_or_else(|| OrchestratorError::TemplateNotFound(template_id.to_string()))?;
        let workflow = template.instantiate();
        let snapshot = workflow.clone();
        state.workflows.insert(workflow.id.clone(), workflow);
        Ok(snapshot)
    }

    /// Creates a pending workflow from a validated declarative definition.
    pub fn create_from_definition(
        &self,
        definition: &WorkflowDefinition,
    ) -> Result<Workflow, crate::definition::DefinitionError> {
        definition.validate()?;
        Ok(self.create_workflow(
            definition.name.clone(),
            definition.description.clone(),
            definition.to_blueprints(),
        ))
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Executes a pending workflow to a terminal or paused state.
    ///
    /// Resolves `Ok` with the final snapshot on completion or pause;
    /// rejects with an error on step failure, cancellation, or a
    /// configuration error (cycle, deadlock). Failure and cancellation
    /// errors are returned only after the history entry was written.
    pub async fn execute_workflow(&self, id: &str) -> Result<Workflow, OrchestratorError> {
        self.run_workflow(id, false).await
    }

    /// Pauses an in-progress workflow.
    ///
    /// Fires the execution's cancellation scope; steps in flight
    /// resolve to aborted failures rather than being killed. The
    /// workflow stays in the active set and can be resumed.
    pub fn pause_workflow(&self, id: &str) -> Result<(), OrchestratorError> {
        let scope = {
            let mut state = self.inner.state.lock().unwrap();
            let workflow = state
                .workflows
                .get_mut(id)
                .ok_or_else(|| OrchestratorError::WorkflowNotFound(id.to_string()))?;
            if workflow.status != WorkflowStatus::InProgress {
                return Err(OrchestratorError::InvalidState {
                    id: id.to_string(),
                    status: workflow.status,
                    operation: "pause",
                    expected: "in_progress",
                });
            }
            workflow.status = WorkflowStatus::Paused;
            workflow.updated_at = Utc::now();
            state.scopes.get(id).cloned()
        };

        if let Some(scope) = scope {
            scope.fire(Intent::Pause);
        }

        self.inner
            .bus
            .emit(&LifecycleEvent::workflow(EventKind::WorkflowPaused, id, None));
        tracing::debug!(workflow_id = %id, "workflow paused");
        Ok(())
    }

    /// Resumes a paused workflow and drives it like
    /// [`execute_workflow`](Self::execute_workflow).
    ///
    /// Steps already completed are skipped; steps that aborted under
    /// the pause get fresh runtime state (their retry counters carry
    /// over, because an abort consumes no retry).
    pub async fn resume_workflow(&self, id: &str) -> Result<Workflow, OrchestratorError> {
        {
            let mut state = self.inner.state.lock().unwrap();
            let workflow = state
                .workflows
                .get_mut(id)
                .ok_or_else(|| OrchestratorError::WorkflowNotFound(id.to_string()))?;
            if workflow.status != WorkflowStatus::Paused {
                return Err(OrchestratorError::InvalidState {
                    id: id.to_string(),
                    status: workflow.status,
                    operation: "resume",
                    expected: "paused",
                });
            }
            for step in &mut workflow.steps {
                if step.status != StepStatus::Completed {
                    step.reset_runtime();
                }
            }
            workflow.status = WorkflowStatus::InProgress;
            workflow.updated_at = Utc::now();
        }

        self.inner.bus.emit(&LifecycleEvent::workflow(
            EventKind::WorkflowResumed,
            id,
            None,
        ));
        self.run_workflow(id, true).await
    }

    /// Cancels a workflow from any non-terminal state.
    ///
    /// Fires the cancellation scope if an execution is in flight,
    /// force-marks unfinished steps as failed, appends a cancelled
    /// history entry, and removes the workflow from the active set.
    pub fn cancel_workflow(&self, id: &str) -> Result<(), OrchestratorError> {
        let scope = {
            let mut state = self.inner.state.lock().unwrap();
            let workflow = state
                .workflows
                .get_mut(id)
                .ok_or_else(|| OrchestratorError::WorkflowNotFound(id.to_string()))?;
            if workflow.status.is_terminal() {
                return Err(OrchestratorError::InvalidState {
                    id: id.to_string(),
                    status: workflow.status,
                    operation: "cancel",
                    expected: "a non-terminal state",
                });
            }

            let started_at = workflow.steps.iter().filter_map(|s| s.started_at).min();
            for step in &mut workflow.steps {
                if !step.status.is_terminal() && step.status != StepStatus::Pending {
                    step.status = StepStatus::Failed;
                    step.error = Some("cancelled".to_string());
                    step.finished_at = Some(Utc::now());
                }
            }
            workflow.updated_at = Utc::now();

            let snapshot = workflow.clone();
            let summary = format!("{} cancelled by request", snapshot.name);
            state.history.append(HistoryEntry::new(
                snapshot,
                Outcome::Cancelled,
                started_at,
                summary,
            ));
            state.workflows.remove(id);
            state.scopes.get(id).cloned()
        };

        if let Some(scope) = scope {
            scope.fire(Intent::Cancel);
        }
        self.persist_history();

        self.inner.bus.emit(&LifecycleEvent::workflow(
            EventKind::WorkflowCancelled,
            id,
            None,
        ));
        tracing::debug!(workflow_id = %id, "workflow cancelled");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Templates, history, events
    // ------------------------------------------------------------------

    /// Saves a workflow's declared shape as a reusable template.
    ///
    /// The workflow may be active or already folded into history.
    pub fn save_as_template(
        &self,
        workflow_id: &str,
        name: impl Into<String>,
        description: impl Into<String>,
        tags: Vec<String>,
    ) -> Result<Template, OrchestratorError> {
        let template = {
            let mut state = self.inner.state.lock().unwrap();
            let blueprints: Vec<StepBlueprint> = match state.workflows.get(workflow_id) {
                Some(workflow) => workflow.steps.iter().map(|s| s.to_blueprint()).collect(),
                None => state
                    .history
                    .entries()
                    .iter()
                    .rev()
                    .find(|e| e.workflow.id == workflow_id)
                    .map(|e| e.workflow.steps.iter().map(|s| s.to_blueprint()).collect())
                    .ok_or_else(|| {
                        OrchestratorError::WorkflowNotFound(workflow_id.to_string())
                    })?,
            };

            let template = Template::new(name, description, tags, blueprints);
            state.templates.insert(template.id.clone(), template.clone());
            template
        };

        self.persist_templates();
        Ok(template)
    }

    /// All stored templates.
    pub fn templates(&self) -> Vec<Template> {
        self.inner
            .state
            .lock()
            .unwrap()
            .templates
            .values()
            .cloned()
            .collect()
    }

    /// History entries, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.inner.state.lock().unwrap().history.entries()
    }

    /// Subscribes a listener to lifecycle events.
    ///
    /// `kind` of `None` receives every event kind.
    pub fn subscribe(
        &self,
        kind: Option<EventKind>,
        listener: impl Fn(&LifecycleEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.bus.subscribe(kind, listener)
    }

    /// Snapshot of an active workflow.
    pub fn workflow(&self, id: &str) -> Option<Workflow> {
        self.inner.state.lock().unwrap().workflows.get(id).cloned()
    }

    /// Ids of workflows currently in the active set.
    pub fn active_workflow_ids(&self) -> Vec<String> {
        self.inner.state.lock().unwrap().workflows.keys().cloned().collect()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Drives one execution run (fresh or resumed) to completion,
    /// failure, pause, or cancellation.
    async fn run_workflow(&self, id: &str, resumed: bool) -> Result<Workflow, OrchestratorError> {
        let run_started = Utc::now();

        // Admission: status check, structure validation, scope setup.
        // The lock is dropped before any await.
        let (scope, levels, total_steps) = {
            let mut state = self.inner.state.lock().unwrap();
            let workflow = state
                .workflows
                .get(id)
                .ok_or_else(|| OrchestratorError::WorkflowNotFound(id.to_string()))?;

            if state.executing.contains(id) {
                return Err(OrchestratorError::AlreadyExecuting(id.to_string()));
            }
            match workflow.status {
                WorkflowStatus::Pending | WorkflowStatus::InProgress => {}
                status => {
                    return Err(OrchestratorError::InvalidState {
                        id: id.to_string(),
                        status,
                        operation: "execute",
                        expected: "pending (or paused, via resume)",
                    });
                }
            }

            // Cyclic structure is a fatal configuration error; nothing
            // is marked in progress and the run is recorded as failed
            let graph = DepGraph::build(&workflow.steps);
            if graph.has_cycle() {
                let error = GraphError::CycleDetected(graph.cycle_nodes());
                let workflow = state.workflows.get_mut(id).unwrap();
                workflow.status = WorkflowStatus::Failed;
                workflow.updated_at = Utc::now();
                let snapshot = workflow.clone();
                let summary = format!("{} rejected: {error}", snapshot.name);
                state
                    .history
                    .append(HistoryEntry::new(snapshot, Outcome::Failed, None, summary));
                drop(state);
                self.persist_history();
                self.inner.bus.emit(&LifecycleEvent::workflow(
                    EventKind::WorkflowFailed,
                    id,
                    Some(json!({ "error": error.to_string() })),
                ));
                return Err(error.into());
            }
            // Defensive double-check alongside the DFS
            graph.topo_order()?;

            let completed: HashSet<StepId> = workflow
                .steps
                .iter()
                .filter(|s| s.status == StepStatus::Completed)
                .map(|s| s.id.clone())
                .collect();
            let levels = group_levels(&workflow.steps, &completed)?;
            let total_steps = workflow.steps.len();

            let workflow = state.workflows.get_mut(id).unwrap();
            workflow.status = WorkflowStatus::InProgress;
            workflow.updated_at = Utc::now();

            let scope = ExecScope::new();
            state.executing.insert(id.to_string());
            state.scopes.insert(id.to_string(), Arc::clone(&scope));
            (scope, levels, total_steps)
        };

        if !resumed {
            self.inner.bus.emit(&LifecycleEvent::workflow(
                EventKind::WorkflowStarted,
                id,
                Some(json!({ "steps": total_steps })),
            ));
        }

        let runner = StepRunner::new(
            id,
            Arc::clone(&self.inner.resolver),
            self.inner.config.retry,
            self.inner.bus.clone(),
        );
        let semaphore = Arc::new(Semaphore::new(self.inner.config.max_parallel.max(1)));
        let token = scope.source.token();

        for (wave_index, wave) in levels.iter().enumerate() {
            if token.is_cancelled() {
                break;
            }

            tracing::debug!(
                workflow_id = %id,
                wave = wave_index,
                steps = wave.len(),
                "starting wave"
            );

            let outcomes = self
                .run_wave(id, wave, &runner, &semaphore, &token)
                .await;

            // Publish outcomes and progress under one lock
            let wave_failed = {
                let mut state = self.inner.state.lock().unwrap();
                let Some(workflow) = state.workflows.get_mut(id) else {
                    // Removed mid-run: cancellation won
                    break;
                };
                let mut failed: Option<StepOutcome> = None;
                for outcome in outcomes {
                    if let Some(step) = workflow.step_mut(&outcome.id) {
                        outcome.apply_to(step);
                    }
                    if outcome.status == StepStatus::Failed && !outcome.aborted {
                        failed.get_or_insert(outcome);
                    }
                }
                workflow.recompute_progress();
                failed
            };

            match scope.intent() {
                Intent::Cancel => break,
                Intent::Pause => {
                    let snapshot = self.finish_run(id, |_| {});
                    tracing::debug!(workflow_id = %id, "run suspended by pause");
                    return snapshot.ok_or_else(|| OrchestratorError::Cancelled(id.to_string()));
                }
                Intent::Run => {}
            }

            if let Some(outcome) = wave_failed {
                // A step exhausted retries: the workflow fails and
                // later waves never start
                let error = outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| "step failed".to_string());
                let snapshot = self.finish_run(id, |workflow| {
                    workflow.status = WorkflowStatus::Failed;
                    workflow.elapsed_ms = Some((Utc::now() - run_started).num_milliseconds());
                });
                if let Some(snapshot) = snapshot {
                    self.record_history(snapshot, Outcome::Failed, Some(run_started));
                }
                self.inner.bus.emit(&LifecycleEvent::workflow(
                    EventKind::WorkflowFailed,
                    id,
                    Some(json!({ "step_id": outcome.id.as_str(), "error": error })),
                ));
                return Err(OrchestratorError::WorkflowFailed {
                    id: id.to_string(),
                    step_id: outcome.id.to_string(),
                    error,
                });
            }
        }

        // Cancellation observed mid-run
        if token.is_cancelled() {
            match scope.intent() {
                Intent::Pause => {
                    let snapshot = self.finish_run(id, |_| {});
                    return snapshot.ok_or_else(|| OrchestratorError::Cancelled(id.to_string()));
                }
                _ => {
                    // cancel_workflow already wrote history and removed
                    // the workflow; just release the guard
                    self.finish_run(id, |_| {});
                    return Err(OrchestratorError::Cancelled(id.to_string()));
                }
            }
        }

        // All waves resolved without failure: the workflow is complete
        let snapshot = self.finish_run(id, |workflow| {
            workflow.status = WorkflowStatus::Completed;
            workflow.recompute_progress();
            workflow.elapsed_ms = Some((Utc::now() - run_started).num_milliseconds());
        });
        let Some(snapshot) = snapshot else {
            return Err(OrchestratorError::Cancelled(id.to_string()));
        };

        debug_assert!(snapshot.all_steps_completed() || snapshot.steps.is_empty());
        self.record_history(snapshot.clone(), Outcome::Completed, Some(run_started));
        // Normal completion destroys the active entry after folding
        // it into history
        self.inner.state.lock().unwrap().workflows.remove(id);
        self.inner.bus.emit(&LifecycleEvent::workflow(
            EventKind::WorkflowCompleted,
            id,
            Some(json!({ "progress": snapshot.progress })),
        ));
        Ok(snapshot)
    }

    /// Runs one wave's steps concurrently, bounded by the semaphore.
    async fn run_wave(
        &self,
        id: &str,
        wave: &[StepId],
        runner: &StepRunner,
        semaphore: &Arc<Semaphore>,
        token: &CancellationToken,
    ) -> Vec<StepOutcome> {
        let steps: Vec<_> = {
            let mut state = self.inner.state.lock().unwrap();
            let Some(workflow) = state.workflows.get_mut(id) else {
                return Vec::new();
            };
            wave.iter()
                .filter_map(|step_id| {
                    workflow.step_mut(step_id).map(|step| {
                        step.status = StepStatus::Waiting;
                        step.clone()
                    })
                })
                .collect()
        };

        let mut join_set = JoinSet::new();
        for step in steps {
            let runner = runner.clone();
            let token = token.clone();
            let semaphore = Arc::clone(semaphore);
            let orchestrator = self.clone();
            let workflow_id = id.to_string();
            join_set.spawn(async move {
                // Steps beyond the parallelism cap queue here for a
                // free slot
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                orchestrator.mark_in_progress(&workflow_id, &step.id);
                runner.run(&step, token).await
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::warn!(workflow_id = %id, "step task panicked: {e}"),
            }
        }
        outcomes
    }

    fn mark_in_progress(&self, workflow_id: &str, step_id: &StepId) {
        let mut state = self.inner.state.lock().unwrap();
        if let Some(step) = state
            .workflows
            .get_mut(workflow_id)
            .and_then(|w| w.step_mut(step_id))
        {
            step.status = StepStatus::InProgress;
            step.started_at = Some(Utc::now());
        }
    }

    /// Releases the execution guard and scope, applies `finalize` to
    /// the live workflow, and returns its snapshot (None if cancel
    /// removed it).
    fn finish_run(
        &self,
        id: &str,
        finalize: impl FnOnce(&mut Workflow),
    ) -> Option<Workflow> {
        let mut state = self.inner.state.lock().unwrap();
        state.executing.remove(id);
        state.scopes.remove(id);
        let workflow = state.workflows.get_mut(id)?;
        finalize(workflow);
        workflow.updated_at = Utc::now();
        Some(workflow.clone())
    }

    fn record_history(
        &self,
        snapshot: Workflow,
        outcome: Outcome,
        started_at: Option<chrono::DateTime<Utc>>,
    ) {
        let summary = match outcome {
            Outcome::Completed => format!(
                "{} completed ({} steps)",
                snapshot.name,
                snapshot.steps.len()
            ),
            Outcome::Failed => format!("{} failed at {}%", snapshot.name, snapshot.progress),
            Outcome::Cancelled => format!("{} cancelled", snapshot.name),
        };
        self.inner
            .state
            .lock()
            .unwrap()
            .history
            .append(HistoryEntry::new(snapshot, outcome, started_at, summary));
        self.persist_history();
    }

    /// Best-effort persistence; a store failure is logged, never
    /// allowed to fail orchestration.
    fn persist_templates(&self) {
        let Some(store) = &self.inner.store else { return };
        let templates: Vec<Template> = {
            let state = self.inner.state.lock().unwrap();
            state.templates.values().cloned().collect()
        };
        match serde_json::to_vec(&templates) {
            Ok(bytes) => {
                if let Err(e) = store.save(TEMPLATES_KEY, &bytes) {
                    tracing::warn!("failed to persist templates: {e}");
                }
            }
            Err(e) => tracing::warn!("failed to serialize templates: {e}"),
        }
    }

    fn persist_history(&self) {
        let Some(store) = &self.inner.store else { return };
        let bytes = {
            let state = self.inner.state.lock().unwrap();
            serde_json::to_vec(&state.history)
        };
        match bytes {
            Ok(bytes) => {
                if let Err(e) = store.save(HISTORY_KEY, &bytes) {
                    tracing::warn!("failed to persist history: {e}");
                }
            }
            Err(e) => tracing::warn!("failed to serialize history: {e}"),
        }
    }
}
