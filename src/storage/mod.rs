use std::time::{SystemTime, UNIX_EPOCH};

pub mod implementations;
pub use implementations::*;

use crate::engine::{ActivityInvocation, WorkflowInstance, WorkflowState};
use crate::error::BoxError;

/// Durable home of workflow instances and their activity history.
#[async_trait::async_trait]
pub trait WorkflowStorage: Send + Sync {
    async fn init(&self) -> Result<(), BoxError>;

    /// Fails if an instance with the same id exists.
    async fn create_instance(&self, instance: &WorkflowInstance) -> Result<(), BoxError>;

    /// The instance with its full history, ordered by sequence then attempt.
    async fn get_instance(&self, workflow_id: &str) -> Result<Option<WorkflowInstance>, BoxError>;

    /// Applies the transition only if the current state allows it. Returns
    /// whether it was applied.
    async fn update_state(
        &self,
        workflow_id: &str,
        state: WorkflowState,
        output: Option<&str>,
        error: Option<&str>,
    ) -> Result<bool, BoxError>;

    /// Instances in `Scheduled` or `Running`, oldest first.
    async fn list_unfinished(&self) -> Result<Vec<WorkflowInstance>, BoxError>;

    /// Inserts a pending attempt; ignored if that attempt is already recorded.
    async fn record_scheduled(&self, invocation: &ActivityInvocation) -> Result<(), BoxError>;

    /// Sets the outcome of an attempt that is pending or not yet recorded.
    /// Returns false if the attempt already had a terminal outcome.
    async fn record_outcome(&self, invocation: &ActivityInvocation) -> Result<bool, BoxError>;

    /// Recorded attempts of one call, in attempt order.
    async fn call_history(
        &self,
        workflow_id: &str,
        sequence: u32,
    ) -> Result<Vec<ActivityInvocation>, BoxError>;
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
