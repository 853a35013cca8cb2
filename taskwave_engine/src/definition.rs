//! Declarative workflow definitions loaded from YAML.
//!
//! A definition is the file-format twin of a raw blueprint list:
//!
//! ```yaml
//! name: morning-brief
//! description: Assemble the morning briefing
//! steps:
//!   - id: fetch-weather
//!     description: Fetch the weather report
//!     target: weather
//!   - id: compose
//!     description: Compose the briefing
//!     target: composer
//!     depends_on: [fetch-weather]
//! ```
//!
//! Definitions are validated for duplicate ids and dangling
//! `depends_on` references before they become workflows; graph-level
//! validation (cycles) still happens at execution time.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use taskwave_core::step::{StepBlueprint, StepId};
use thiserror::Error;

/// Error types for definition parsing and validation.
#[derive(Error, Debug)]
pub enum DefinitionError {
    /// YAML syntax or shape error
    #[error("Failed to parse workflow definition: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A definition must declare at least one step
    #[error("Workflow definition '{0}' has no steps")]
    NoSteps(String),

    /// Two steps share an id
    #[error("Duplicate step id '{0}' in workflow definition")]
    DuplicateStep(String),

    /// depends_on references a step that is not declared
    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },
}

/// One declared step in a definition file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Identifier, unique within the definition
    pub id: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Executor target name
    pub target: String,
    /// Argument bag handed to the executor
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Ids of steps that must complete first
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// A declarative workflow definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow name
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Declared steps in order
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    /// Parses a definition from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self, DefinitionError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Checks structural validity: at least one step, unique ids, and
    /// every `depends_on` resolving to a declared step.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.steps.is_empty() {
            return Err(DefinitionError::NoSteps(self.name.clone()));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(DefinitionError::DuplicateStep(step.id.clone()));
            }
        }

        for step in &self.steps {
            for dep in &step.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(DefinitionError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Converts the declared steps into blueprints.
    pub fn to_blueprints(&self) -> Vec<StepBlueprint> {
        self.steps
            .iter()
            .map(|s| StepBlueprint {
                id: StepId::new(s.id.as_str()),
                description: s.description.clone(),
                target: s.target.clone(),
                args: s.args.clone(),
                dependencies: s.depends_on.iter().map(|d| StepId::new(d.as_str())).collect(),
            })
            .collect()
    }
}
