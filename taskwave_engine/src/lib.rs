//! Taskwave engine - DAG-based workflow orchestration.
//!
//! Takes a declarative set of named steps with inter-step dependencies,
//! validates that the dependency structure is executable, schedules
//! steps in parallel waves, runs each step through a pluggable executor
//! with bounded retry and cooperative cancellation, and tracks the
//! per-step and per-workflow state machines through completion,
//! failure, pause, or cancellation.
//!
//! # Architecture
//!
//! - [`graph`]: dependency graph construction, cycle detection, and
//!   stable topological ordering
//! - [`levels`]: partitioning of the order into concurrent waves
//! - [`runner`]: single-step execution with retry and cancellation
//! - [`orchestrator`]: the top-level state machine and public surface
//! - [`executor`]: the pluggable step-executor capability seam
//! - [`definition`]: declarative YAML workflow definitions
//!
//! # Example
//!
//! ```ignore
//! use taskwave_engine::{Orchestrator, OrchestratorConfig, ExecutorRegistry, FnExecutor};
//! use taskwave_core::StepBlueprint;
//! use std::sync::Arc;
//!
//! let mut registry = ExecutorRegistry::new();
//! registry.register("noop", Arc::new(FnExecutor::ok()));
//!
//! let orch = Orchestrator::new(Arc::new(registry), OrchestratorConfig::default());
//! let wf = orch.create_workflow("demo", "", vec![
//!     StepBlueprint::new("a", "First", "noop"),
//!     StepBlueprint::new("b", "Second", "noop").depends_on("a"),
//! ]);
//! let done = orch.execute_workflow(&wf.id).await?;
//! ```

pub mod cancellation;
pub mod definition;
pub mod executor;
pub mod graph;
pub mod levels;
pub mod orchestrator;
pub mod runner;

pub use cancellation::{CancellationSource, CancellationToken};
pub use definition::{StepDefinition, WorkflowDefinition};
pub use executor::{ExecutionOutput, ExecutorRegistry, ExecutorResolver, FnExecutor, StepExecutor};
pub use graph::{DepGraph, GraphError};
pub use levels::{group_levels, parallelism_factor};
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorError};
pub use runner::{RetryPolicy, StepOutcome, StepRunner};
