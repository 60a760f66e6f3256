use serde::{Deserialize, Serialize};
use std::error::Error;
use thiserror::Error;

use crate::engine::WorkflowState;

/// Error type used by the storage and queue backends.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Reasons a request is turned away before it reaches the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("Rate limit exceeded")]
    RateLimited,
}

/// Synchronous failures of the engine's intake and query surface.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("workflow engine unavailable: {0}")]
    Unavailable(String),
    #[error("unknown workflow kind '{0}'")]
    UnknownWorkflow(String),
    #[error("workflow instance '{0}' not found")]
    NotFound(String),
    #[error("workflow instance '{workflow_id}' is already {state}")]
    AlreadyTerminal {
        workflow_id: String,
        state: WorkflowState,
    },
}

/// Failure of a single activity call.
///
/// Per-attempt failures (`Timeout`, `ActivityFailed`, `NotRegistered`) are
/// recorded in the instance history. `RetriesExhausted` is what the
/// orchestration sees once the retry policy gives up.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityError {
    #[error("activity timed out")]
    Timeout,
    #[error("activity failed on attempt {attempt}: {cause}")]
    ActivityFailed { attempt: u32, cause: String },
    #[error("activity '{activity}' is not registered")]
    NotRegistered { activity: String },
    #[error("retries exhausted after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ActivityError>,
    },
    #[error("activity cancelled")]
    Cancelled,
}

/// Terminal failure of an orchestration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Activity(#[from] ActivityError),
    #[error(
        "nondeterministic replay at step {sequence}: history recorded {recorded}, workflow requested {requested}"
    )]
    NonDeterminism {
        sequence: u32,
        recorded: String,
        requested: String,
    },
    #[error("workflow cancelled")]
    Cancelled,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("{0}")]
    Failed(String),
}
