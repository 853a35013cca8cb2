//! In-process lifecycle event bus.
//!
//! The orchestrator emits typed lifecycle events as steps and workflows
//! move through their state machines; UI sinks and tests subscribe to
//! them. Delivery is synchronous and best-effort: a panicking listener
//! is isolated and logged, never allowed to disturb orchestration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Kind of lifecycle event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A step began executing
    StepStarted,
    /// A step completed successfully
    StepCompleted,
    /// A step failed permanently (retries exhausted, missing executor, or abort)
    StepFailed,
    /// A workflow began executing
    WorkflowStarted,
    /// A workflow completed successfully
    WorkflowCompleted,
    /// A workflow failed
    WorkflowFailed,
    /// A workflow was paused
    WorkflowPaused,
    /// A paused workflow resumed execution
    WorkflowResumed,
    /// A workflow was cancelled and removed
    WorkflowCancelled,
}

/// A typed, timestamped lifecycle record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// What happened
    pub kind: EventKind,
    /// Workflow this event belongs to
    pub workflow_id: String,
    /// Step this event belongs to, for step-level kinds
    pub step_id: Option<String>,
    /// Optional payload (result value, error message, progress)
    pub payload: Option<Value>,
    /// When the event was emitted
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    /// Creates a workflow-level event.
    pub fn workflow(kind: EventKind, workflow_id: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            kind,
            workflow_id: workflow_id.into(),
            step_id: None,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Creates a step-level event.
    pub fn step(
        kind: EventKind,
        workflow_id: impl Into<String>,
        step_id: impl Into<String>,
        payload: Option<Value>,
    ) -> Self {
        Self {
            kind,
            workflow_id: workflow_id.into(),
            step_id: Some(step_id.into()),
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Listener callback invoked for each delivered event.
pub type Listener = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

struct Subscriber {
    /// None subscribes to every kind
    filter: Option<EventKind>,
    listener: Listener,
}

#[derive(Default)]
struct BusInner {
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
}

/// Handle returned by [`EventBus::subscribe`]; detaches the listener
/// when `unsubscribe` is called. Dropping the handle without calling
/// `unsubscribe` leaves the listener attached for the life of the bus.
pub struct Subscription {
    bus: Arc<BusInner>,
    id: u64,
}

impl Subscription {
    /// Removes the associated listener from the bus.
    pub fn unsubscribe(self) {
        self.bus.subscribers.lock().unwrap().remove(&self.id);
    }
}

/// Synchronous publish/subscribe channel for lifecycle events.
///
/// Cloning the bus produces another handle onto the same subscriber
/// set, so the orchestrator and its spawned step tasks share one bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Creates a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for one event kind, or all kinds when
    /// `filter` is `None`.
    pub fn subscribe(
        &self,
        filter: Option<EventKind>,
        listener: impl Fn(&LifecycleEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().unwrap().insert(
            id,
            Subscriber {
                filter,
                listener: Arc::new(listener),
            },
        );
        Subscription {
            bus: Arc::clone(&self.inner),
            id,
        }
    }

    /// Delivers an event to every matching subscriber.
    ///
    /// Listeners run synchronously on the caller's thread. A panicking
    /// listener is caught and logged; remaining listeners still run.
    pub fn emit(&self, event: &LifecycleEvent) {
        let listeners: Vec<Listener> = {
            let subs = self.inner.subscribers.lock().unwrap();
            subs.values()
                .filter(|s| s.filter.is_none() || s.filter == Some(event.kind))
                .map(|s| Arc::clone(&s.listener))
                .collect()
        };

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::warn!(
                    kind = ?event.kind,
                    workflow_id = %event.workflow_id,
                    "event listener panicked; continuing"
                );
            }
        }
    }

    /// Number of attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().unwrap().len()
    }
}
