use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a workflow instance.
///
/// `Scheduled -> Running -> {Completed | Failed | Cancelled}`. An instance
/// may also fail or be cancelled before it starts running. Terminal states
/// are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Scheduled,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Scheduled => "scheduled",
            WorkflowState::Running => "running",
            WorkflowState::Completed => "completed",
            WorkflowState::Failed => "failed",
            WorkflowState::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(WorkflowState::Scheduled),
            "running" => Some(WorkflowState::Running),
            "completed" => Some(WorkflowState::Completed),
            "failed" => Some(WorkflowState::Failed),
            "cancelled" => Some(WorkflowState::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Completed | WorkflowState::Failed | WorkflowState::Cancelled
        )
    }

    /// States an instance may be in immediately before entering `next`.
    pub fn predecessors(next: WorkflowState) -> &'static [WorkflowState] {
        match next {
            WorkflowState::Scheduled => &[],
            WorkflowState::Running => &[WorkflowState::Scheduled],
            WorkflowState::Completed => &[WorkflowState::Running],
            WorkflowState::Failed | WorkflowState::Cancelled => {
                &[WorkflowState::Scheduled, WorkflowState::Running]
            }
        }
    }

    pub fn can_transition_to(&self, next: WorkflowState) -> bool {
        Self::predecessors(next).contains(self)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests;
