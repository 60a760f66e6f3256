use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::state::WorkflowState;
use crate::error::ActivityError;
use crate::queue::ActivityTask;

/// Outcome of one activity attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ActivityOutcome {
    Pending,
    Succeeded(String),
    Failed(ActivityError),
}

impl ActivityOutcome {
    pub fn status_str(&self) -> &'static str {
        match self {
            ActivityOutcome::Pending => "pending",
            ActivityOutcome::Succeeded(_) => "succeeded",
            ActivityOutcome::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActivityOutcome::Pending)
    }
}

/// One recorded attempt of one activity call.
///
/// `sequence` is the position of the call inside the orchestration and
/// `attempt` is 1-based. Each retry is a new record; a record goes from
/// `Pending` to a terminal outcome once and is never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityInvocation {
    pub workflow_id: String,
    pub sequence: u32,
    pub attempt: u32,
    pub activity: String,
    pub input: String,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub outcome: ActivityOutcome,
}

impl ActivityInvocation {
    /// The pending record for the attempt a task is about to carry out.
    pub fn scheduled(task: &ActivityTask) -> Self {
        Self {
            workflow_id: task.workflow_id.clone(),
            sequence: task.sequence,
            attempt: task.attempt,
            activity: task.activity.clone(),
            input: task.input.clone(),
            timeout: task.timeout,
            max_attempts: task.retry_policy.effective_max_attempts(),
            outcome: ActivityOutcome::Pending,
        }
    }

    pub fn with_outcome(mut self, outcome: ActivityOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            outcome: ActivityOutcome::Pending,
            ..self.clone()
        }
    }
}

/// Settles an activity call from its recorded attempts, if they settle it.
///
/// A call is settled once any attempt succeeded, or once the last allowed
/// attempt failed.
pub fn resolve_call(attempts: &[ActivityInvocation]) -> Option<Result<String, ActivityError>> {
    if let Some(value) = attempts.iter().find_map(|a| match &a.outcome {
        ActivityOutcome::Succeeded(value) => Some(value.clone()),
        _ => None,
    }) {
        return Some(Ok(value));
    }

    let last = attempts.iter().max_by_key(|a| a.attempt)?;
    match &last.outcome {
        ActivityOutcome::Failed(err) if last.attempt >= last.max_attempts.max(1) => {
            Some(Err(ActivityError::RetriesExhausted {
                attempts: last.attempt,
                last: Box::new(err.clone()),
            }))
        }
        _ => None,
    }
}

/// A workflow instance together with its activity history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub workflow_id: String,
    pub run_id: String,
    pub kind: String,
    pub input: String,
    pub state: WorkflowState,
    pub output: Option<String>,
    pub error: Option<String>,
    pub history: Vec<ActivityInvocation>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl WorkflowInstance {
    pub fn scheduled(
        workflow_id: impl Into<String>,
        run_id: impl Into<String>,
        kind: impl Into<String>,
        input: impl Into<String>,
        now_ms: u64,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
            kind: kind.into(),
            input: input.into(),
            state: WorkflowState::Scheduled,
            output: None,
            error: None,
            history: Vec::new(),
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    /// Recorded attempts of the call at `sequence`, in attempt order.
    pub fn attempts(&self, sequence: u32) -> Vec<ActivityInvocation> {
        let mut attempts: Vec<_> = self
            .history
            .iter()
            .filter(|a| a.sequence == sequence)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.attempt);
        attempts
    }
}
