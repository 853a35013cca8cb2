//! Step data model: identifiers, declared blueprints, and runtime state.
//!
//! A [`StepBlueprint`] is the declared form of a unit of work (what the
//! caller hands the orchestrator); a [`Step`] is a blueprint plus the
//! mutable runtime fields the engine maintains while executing it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Unique identifier for a step within one workflow.
///
/// StepId wraps a string identifier and implements the traits needed
/// for use as a HashMap key and graph node identifier. Integer ids from
/// callers are carried as their decimal string form.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct StepId(String);

impl StepId {
    /// Creates a new StepId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the StepId and returns the underlying string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for StepId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StepId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<u64> for StepId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

/// Runtime status of a single step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step has not been scheduled yet
    Pending,
    /// Step is queued behind unsatisfied dependencies or a free slot
    Waiting,
    /// Step is currently executing
    InProgress,
    /// Step completed successfully
    Completed,
    /// Step failed (executor error, missing executor, or abort)
    Failed,
}

impl StepStatus {
    /// Returns true for Completed and Failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

/// Declared form of a step: what the caller provides, with no runtime
/// state attached. Templates store these.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepBlueprint {
    /// Identifier, unique within the workflow
    pub id: StepId,
    /// Human-readable description
    pub description: String,
    /// Name of the executor capability that performs this step
    pub target: String,
    /// Opaque argument bag passed to the executor
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Identifiers of steps that must complete before this one starts
    #[serde(default)]
    pub dependencies: Vec<StepId>,
}

impl StepBlueprint {
    /// Creates a blueprint with no args and no dependencies.
    pub fn new(id: impl Into<StepId>, description: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            target: target.into(),
            args: Map::new(),
            dependencies: Vec::new(),
        }
    }

    /// Adds a dependency on another step (builder pattern).
    pub fn depends_on(mut self, dep: impl Into<StepId>) -> Self {
        self.dependencies.push(dep.into());
        self
    }

    /// Sets one argument value (builder pattern).
    pub fn with_arg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.args.insert(key.into(), value);
        self
    }
}

/// A step with live runtime state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Identifier, unique within the workflow
    pub id: StepId,
    /// Human-readable description
    pub description: String,
    /// Name of the executor capability that performs this step
    pub target: String,
    /// Opaque argument bag passed to the executor
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Identifiers of steps that must complete before this one starts
    #[serde(default)]
    pub dependencies: Vec<StepId>,
    /// Current status
    pub status: StepStatus,
    /// Result payload from the executor on success
    pub result: Option<Value>,
    /// Error message from the last failed attempt
    pub error: Option<String>,
    /// When execution of this step started
    pub started_at: Option<DateTime<Utc>>,
    /// When execution of this step finished (success or failure)
    pub finished_at: Option<DateTime<Utc>>,
    /// Wall-clock duration of the last attempt chain, in milliseconds
    pub duration_ms: Option<i64>,
    /// Number of retries consumed (0 on first-attempt success)
    pub retry_count: u32,
}

impl Step {
    /// Creates a pending step from its declared blueprint.
    pub fn from_blueprint(blueprint: StepBlueprint) -> Self {
        Self {
            id: blueprint.id,
            description: blueprint.description,
            target: blueprint.target,
            args: blueprint.args,
            dependencies: blueprint.dependencies,
            status: StepStatus::Pending,
            result: None,
            error: None,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            retry_count: 0,
        }
    }

    /// Returns the declared (status-free) form of this step.
    ///
    /// Used when saving a workflow back as a reusable template.
    pub fn to_blueprint(&self) -> StepBlueprint {
        StepBlueprint {
            id: self.id.clone(),
            description: self.description.clone(),
            target: self.target.clone(),
            args: self.args.clone(),
            dependencies: self.dependencies.clone(),
        }
    }

    /// Clears runtime fields back to a fresh pending state.
    ///
    /// The retry counter is preserved: an aborted attempt does not
    /// consume a retry, and a resumed run continues from the recorded
    /// count rather than silently granting a new budget.
    pub fn reset_runtime(&mut self) {
        self.status = StepStatus::Pending;
        self.result = None;
        self.error = None;
        self.started_at = None;
        self.finished_at = None;
        self.duration_ms = None;
    }
}

impl From<StepBlueprint> for Step {
    fn from(blueprint: StepBlueprint) -> Self {
        Step::from_blueprint(blueprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_id_equality_and_hash() {
        use std::collections::HashSet;

        assert_eq!(StepId::new("a"), StepId::new("a"));
        assert_ne!(StepId::new("a"), StepId::new("b"));

        let mut set = HashSet::new();
        set.insert(StepId::new("a"));
        set.insert(StepId::new("a"));
        set.insert(StepId::new("b"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_step_id_from_integer() {
        let id: StepId = 42u64.into();
        assert_eq!(id.as_str(), "42");
        assert_eq!(id, StepId::new("42"));
    }

    #[test]
    fn test_blueprint_builder() {
        let bp = StepBlueprint::new("fetch", "Fetch the feed", "http")
            .with_arg("url", json!("https://example.com"))
            .depends_on("auth");

        assert_eq!(bp.id, StepId::new("fetch"));
        assert_eq!(bp.dependencies, vec![StepId::new("auth")]);
        assert_eq!(bp.args.get("url"), Some(&json!("https://example.com")));
    }

    #[test]
    fn test_step_from_blueprint_is_pending() {
        let step = Step::from_blueprint(StepBlueprint::new("a", "A", "noop"));
        assert_eq!(step.status, StepStatus::Pending);
        assert!(step.result.is_none());
        assert!(step.started_at.is_none());
        assert_eq!(step.retry_count, 0);
    }

    #[test]
    fn test_reset_runtime_preserves_retry_count() {
        let mut step = Step::from_blueprint(StepBlueprint::new("a", "A", "noop"));
        step.status = StepStatus::Failed;
        step.error = Some("boom".to_string());
        step.started_at = Some(Utc::now());
        step.retry_count = 2;

        step.reset_runtime();

        assert_eq!(step.status, StepStatus::Pending);
        assert!(step.error.is_none());
        assert!(step.started_at.is_none());
        assert_eq!(step.retry_count, 2);
    }

    #[test]
    fn test_blueprint_round_trip() {
        let bp = StepBlueprint::new("a", "A", "noop").depends_on("b");
        let step = Step::from_blueprint(bp.clone());
        assert_eq!(step.to_blueprint(), bp);
    }

    #[test]
    fn test_status_terminal() {
        assert!(StepStatus::Completed.is_terminal());
        assert!(StepStatus::Failed.is_terminal());
        assert!(!StepStatus::Pending.is_terminal());
        assert!(!StepStatus::Waiting.is_terminal());
        assert!(!StepStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_status_serde_snake_case() {
        let s = serde_json::to_string(&StepStatus::InProgress).unwrap();
        assert_eq!(s, "\"in_progress\"");
    }
}
