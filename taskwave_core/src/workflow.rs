//! Workflow aggregate and reusable templates.

use crate::step::{Step, StepBlueprint, StepStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall status of a workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Created but never executed
    Pending,
    /// Currently executing
    InProgress,
    /// Every step completed
    Completed,
    /// A step exhausted its retries, or configuration was invalid
    Failed,
    /// Execution suspended; resumable
    Paused,
}

impl WorkflowStatus {
    /// Returns true for Completed and Failed.
    ///
    /// Paused is not terminal: a paused workflow stays in the active
    /// set and can be resumed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed)
    }
}

/// An instantiated, ordered collection of steps executed together.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow identifier (UUID v4)
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Steps in declaration order
    pub steps: Vec<Step>,
    /// Overall status
    pub status: WorkflowStatus,
    /// Completion percentage, 0-100; 100 only when Completed
    pub progress: u8,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
    /// Total elapsed execution time once terminal, in milliseconds
    pub elapsed_ms: Option<i64>,
}

impl Workflow {
    /// Creates a pending workflow from declared step blueprints.
    ///
    /// Does not start execution and performs no graph validation; the
    /// engine validates the dependency structure when asked to execute.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        blueprints: Vec<StepBlueprint>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            steps: blueprints.into_iter().map(Step::from_blueprint).collect(),
            status: WorkflowStatus::Pending,
            progress: 0,
            created_at: now,
            updated_at: now,
            elapsed_ms: None,
        }
    }

    /// Returns the step with the given id, if present.
    pub fn step(&self, id: &crate::step::StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == id)
    }

    /// Returns a mutable reference to the step with the given id.
    pub fn step_mut(&mut self, id: &crate::step::StepId) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| &s.id == id)
    }

    /// Number of steps currently Completed.
    pub fn completed_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }

    /// Recomputes progress from per-step status.
    ///
    /// Progress is completed/total scaled to 0-100 and truncated, so it
    /// reaches exactly 100 only when every step is Completed. A
    /// workflow with no steps is vacuously fully progressed.
    pub fn recompute_progress(&mut self) {
        let total = self.steps.len();
        self.progress = if total == 0 {
            100
        } else {
            (self.completed_count() * 100 / total) as u8
        };
        self.updated_at = Utc::now();
    }

    /// True when every step has reached Completed.
    pub fn all_steps_completed(&self) -> bool {
        !self.steps.is_empty() && self.completed_count() == self.steps.len()
    }
}

/// A reusable, parameter-free blueprint for a workflow.
///
/// Templates carry declared steps only (no runtime status) and are
/// immutable once stored. Instantiating a template clones the steps and
/// attaches fresh runtime fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Unique template identifier (UUID v4)
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Free-form tags for lookup and grouping
    pub tags: Vec<String>,
    /// Declared steps in order
    pub steps: Vec<StepBlueprint>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Template {
    /// Creates a new template from declared steps.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        tags: Vec<String>,
        steps: Vec<StepBlueprint>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            tags,
            steps,
            created_at: Utc::now(),
        }
    }

    /// Instantiates a fresh pending workflow from this template.
    pub fn instantiate(&self) -> Workflow {
        Workflow::new(self.name.clone(), self.description.clone(), self.steps.clone())
    }
}
