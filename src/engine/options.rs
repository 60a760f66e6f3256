use std::time::Duration;

use crate::activity::RetryPolicy;

pub const DEFAULT_TASK_QUEUE: &str = "BapeTaskQueue";

/// Timeout and retry settings for one activity call.
#[derive(Debug, Clone)]
pub struct ActivityOptions {
    /// Budget for a single attempt, measured from the moment a worker
    /// receives the task.
    pub timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl ActivityOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, value: Duration) -> Self {
        self.timeout = value;
        self
    }

    pub fn with_retry_policy(mut self, value: RetryPolicy) -> Self {
        self.retry_policy = value;
        self
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Queue that activity tasks are published to
    pub task_queue: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            task_queue: DEFAULT_TASK_QUEUE.to_string(),
        }
    }
}

impl EngineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task_queue(mut self, value: impl Into<String>) -> Self {
        self.task_queue = value.into();
        self
    }
}
