//! Pluggable step-executor capability.
//!
//! The engine never performs a step's work itself; it resolves the
//! step's declared target name to a [`StepExecutor`] and invokes it
//! with the step's argument bag. The resolver is injected into the
//! orchestrator so tests can supply fakes and hosts can wire in their
//! own capability catalogs.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome reported by an executor.
///
/// `success = false` counts as a retryable failure exactly like a
/// returned error; the orchestrator treats both identically.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionOutput {
    /// Whether the call succeeded
    pub success: bool,
    /// Result payload on success
    pub output: Option<Value>,
    /// Error message on failure
    pub error: Option<String>,
}

impl ExecutionOutput {
    /// Successful output with a payload.
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
        }
    }

    /// Successful output with no payload.
    pub fn ok_empty() -> Self {
        Self {
            success: true,
            output: None,
            error: None,
        }
    }

    /// Failed output with an error message.
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// External capability that performs a step's work.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Executes the named target with the step's arguments.
    ///
    /// Returning `Err` and returning `Ok` with `success = false` are
    /// treated identically by the engine (both retryable).
    async fn execute(&self, target: &str, args: &Map<String, Value>)
        -> anyhow::Result<ExecutionOutput>;
}

/// Resolves a step's target name to an executor.
///
/// Resolution failure is a non-retryable step failure: retrying cannot
/// make a missing capability appear.
pub trait ExecutorResolver: Send + Sync {
    /// Returns the executor registered under `target`, if any.
    fn resolve(&self, target: &str) -> Option<Arc<dyn StepExecutor>>;
}

/// HashMap-backed executor catalog.
///
/// The orchestrator takes this (or any other [`ExecutorResolver`]) by
/// constructor injection; there is no process-wide registry.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn StepExecutor>>,
}

impl ExecutorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an executor under a target name, replacing any
    /// previous registration.
    pub fn register(&mut self, target: impl Into<String>, executor: Arc<dyn StepExecutor>) {
        self.executors.insert(target.into(), executor);
    }

    /// Registered target names.
    pub fn targets(&self) -> Vec<String> {
        self.executors.keys().cloned().collect()
    }
}

impl ExecutorResolver for ExecutorRegistry {
    fn resolve(&self, target: &str) -> Option<Arc<dyn StepExecutor>> {
        self.executors.get(target).cloned()
    }
}

type ExecutorFn = dyn Fn(&str, &Map<String, Value>) -> anyhow::Result<ExecutionOutput> + Send + Sync;

/// Adapter wrapping a synchronous closure as a [`StepExecutor`].
///
/// Handy for tests and for hosts whose capabilities are plain
/// functions.
pub struct FnExecutor {
    f: Box<ExecutorFn>,
}

impl FnExecutor {
    /// Wraps a closure.
    pub fn new(
        f: impl Fn(&str, &Map<String, Value>) -> anyhow::Result<ExecutionOutput> + Send + Sync + 'static,
    ) -> Self {
        Self { f: Box::new(f) }
    }

    /// Executor that always succeeds with no payload.
    pub fn ok() -> Self {
        Self::new(|_, _| Ok(ExecutionOutput::ok_empty()))
    }

    /// Executor that always fails with the given message.
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(move |_, _| Ok(ExecutionOutput::err(message.clone())))
    }
}

#[async_trait]
impl StepExecutor for FnExecutor {
    async fn execute(
        &self,
        target: &str,
        args: &Map<String, Value>,
    ) -> anyhow::Result<ExecutionOutput> {
        (self.f)(target, args)
    }
}
