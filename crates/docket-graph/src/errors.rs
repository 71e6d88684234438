use crate::Diagnostic;
use docket_store::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
#[error("validation failed with {errors_count} error(s)")]
pub struct ValidationError {
    pub diagnostics: Vec<Diagnostic>,
    pub errors_count: usize,
}

impl ValidationError {
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        let errors_count = diagnostics.iter().filter(|d| d.is_error()).count();
        Self {
            diagnostics,
            errors_count,
        }
    }
}

#[derive(Debug, Error)]
pub enum GraphBuildError {
    #[error("graph '{graph}' already has a step named '{step}'")]
    DuplicateStep { graph: String, step: String },
    #[error("graph '{graph}' has no step named '{step}'")]
    UndefinedStep { graph: String, step: String },
    #[error("step '{step}' in graph '{graph}' already has an outgoing transition")]
    DuplicateTransition { graph: String, step: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("field '{field}' holds a non-sequence value and cannot be appended to")]
    NotASequence { field: String },
    #[error("history in field '{field}' was rewritten instead of extended")]
    Diverged { field: String },
    #[error("field '{field}' could not be decoded: {message}")]
    Decode { field: String, message: String },
    #[error("field '{field}' could not be encoded: {message}")]
    Encode { field: String, message: String },
}

/// Raised by [`crate::StepContext::interrupt`] when no resume value is
/// available for the call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interrupt {
    pub prompt: Option<Value>,
    /// Zero-based position of the interrupt call within the step run.
    pub index: usize,
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error("step suspended at interrupt {}", .0.index)]
    Interrupted(Interrupt),
    #[error("dependency '{dependency}' failed: {message}")]
    Dependency { dependency: String, message: String },
    #[error("dependency '{dependency}' timed out")]
    Timeout { dependency: String },
    #[error("invalid step output: {0}")]
    InvalidOutput(String),
    #[error(transparent)]
    State(#[from] StateError),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("step '{step}' in graph '{graph}' failed: {source}")]
    Step {
        graph: String,
        step: String,
        #[source]
        source: StepError,
    },
    #[error("step '{step}' in graph '{graph}' routed to unknown label '{label}'")]
    Routing {
        graph: String,
        step: String,
        label: String,
    },
    #[error("invocation exceeded the limit of {limit} steps")]
    StepLimitExceeded { limit: usize },
    #[error("engine invariant violated: {0}")]
    Invariant(String),
    #[error(transparent)]
    State(#[from] StateError),
}

impl EngineError {
    /// `true` when retrying the same input cannot succeed.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Step { .. })
    }
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("checkpoint encoding failed: {0}")]
    Encode(String),
    #[error("checkpoint for '{conversation_id}' could not be decoded: {message}")]
    Decode {
        conversation_id: String,
        message: String,
    },
    #[error("checkpoint schema version {found} is not supported")]
    UnsupportedSchema { found: u32 },
    #[error("checkpoint invariant violated: {0}")]
    Invariant(String),
    #[error(transparent)]
    State(#[from] StateError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_fatal_step_failure_expected_retryable() {
        let error = EngineError::Step {
            graph: "g".to_string(),
            step: "s".to_string(),
            source: StepError::Timeout {
                dependency: "law_search".to_string(),
            },
        };
        assert!(!error.is_fatal());
    }

    #[test]
    fn is_fatal_routing_and_invariant_expected_fatal() {
        let routing = EngineError::Routing {
            graph: "g".to_string(),
            step: "s".to_string(),
            label: "maybe".to_string(),
        };
        assert!(routing.is_fatal());
        assert!(EngineError::Invariant("empty frame stack".to_string()).is_fatal());
        assert!(EngineError::StepLimitExceeded { limit: 3 }.is_fatal());
    }

    #[test]
    fn validation_error_counts_only_errors() {
        let error = ValidationError::new(vec![
            Diagnostic::new("entry_defined", crate::Severity::Error, "missing"),
            Diagnostic::new("reachability", crate::Severity::Warning, "orphan"),
        ]);
        assert_eq!(error.errors_count, 1);
    }
}
