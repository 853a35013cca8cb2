//! Taskwave core - data model for declarative step workflows.
//!
//! This crate holds everything the orchestration engine and its callers
//! share: the step/workflow/template data model, the execution history
//! log, the lifecycle event bus, and the blob-store persistence seam.
//!
//! The scheduling and execution machinery lives in `taskwave-engine`;
//! this crate deliberately contains no async code so the types can be
//! used from any context (CLI tools, UI adapters, tests).

pub mod error;
pub mod event;
pub mod history;
pub mod step;
pub mod store;
pub mod workflow;

pub use error::CoreError;
pub use event::{EventBus, EventKind, LifecycleEvent, Subscription};
pub use history::{HistoryEntry, HistoryLog, Outcome};
pub use step::{Step, StepBlueprint, StepId, StepStatus};
pub use store::{BlobStore, FileStore, MemoryStore};
pub use workflow::{Template, Workflow, WorkflowStatus};
