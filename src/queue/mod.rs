use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::activity::RetryPolicy;
use crate::engine::ActivityOptions;
use crate::error::BoxError;

pub mod memory;
pub use memory::MemoryTaskQueue;

/// A queued request to run one attempt of one activity call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityTask {
    pub task_id: String,
    pub queue: String,
    pub workflow_id: String,
    pub sequence: u32,
    /// 1-based; bumped by `nack`, unchanged by visibility-timeout redelivery
    pub attempt: u32,
    pub activity: String,
    pub input: String,
    pub timeout: Duration,
    pub retry_policy: RetryPolicy,
    /// How many times the task has been handed to a worker
    pub deliveries: u32,
}

/// Task id of the activity call at `sequence`. Every attempt of the call
/// reuses it, so scheduling the same call again is absorbed by the queue.
pub fn call_task_id(workflow_id: &str, sequence: u32) -> String {
    format!("{}:{}", workflow_id, sequence)
}

impl ActivityTask {
    pub fn new(
        queue: &str,
        workflow_id: &str,
        sequence: u32,
        activity: impl Into<String>,
        input: impl Into<String>,
        options: &ActivityOptions,
    ) -> Self {
        Self {
            task_id: call_task_id(workflow_id, sequence),
            queue: queue.to_string(),
            workflow_id: workflow_id.to_string(),
            sequence,
            attempt: 1,
            activity: activity.into(),
            input: input.into(),
            timeout: options.timeout,
            retry_policy: options.retry_policy.clone(),
            deliveries: 0,
        }
    }
}

/// At-least-once delivery channel between the engine and the workers.
///
/// A dequeued task is leased to one worker for `visibility_timeout`. If it
/// is not acknowledged in time it becomes visible again and another worker
/// may pick it up. A task is never leased to two workers at once.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn init(&self) -> Result<(), BoxError>;

    /// Enqueuing a task id that is already queued is a no-op.
    async fn enqueue(&self, task: ActivityTask) -> Result<(), BoxError>;

    async fn dequeue(
        &self,
        queue: &str,
        worker_id: &str,
        visibility_timeout: Duration,
    ) -> Result<Option<ActivityTask>, BoxError>;

    /// Removes the task for good.
    async fn ack(&self, task_id: &str) -> Result<(), BoxError>;

    /// Releases the lease and makes the task visible again after
    /// `retry_after`, as its next attempt.
    async fn nack(&self, task_id: &str, retry_after: Duration) -> Result<(), BoxError>;
}
