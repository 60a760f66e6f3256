use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::BoxError;

pub mod executor;
pub mod retry;

pub use executor::ActivityExecutor;
pub use retry::RetryPolicy;

/// A named, versioned unit of side-effecting work run by a worker.
///
/// Tasks are delivered at least once, so an activity can run more than once
/// for the same logical call (for example when a worker dies after executing
/// but before acknowledging). Implementations must be idempotent or safe to
/// retry.
#[async_trait]
pub trait Activity: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "1"
    }

    async fn execute(&self, ctx: &ActivityContext, input: String) -> Result<String, BoxError>;
}

/// Per-attempt information handed to an activity.
#[derive(Clone)]
pub struct ActivityContext {
    workflow_id: String,
    attempt: u32,
    deadline: Instant,
    cancelled: watch::Receiver<bool>,
}

impl ActivityContext {
    pub fn new(
        workflow_id: impl Into<String>,
        attempt: u32,
        deadline: Instant,
        cancelled: watch::Receiver<bool>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            attempt,
            deadline,
            cancelled,
        }
    }

    /// A context that is never cancelled, expiring `timeout` from now.
    pub fn detached(workflow_id: impl Into<String>, attempt: u32, timeout: Duration) -> Self {
        let (_tx, rx) = watch::channel(false);
        Self::new(workflow_id, attempt, Instant::now() + timeout, rx)
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Cooperative cancellation: long-running activities should poll this
    /// (or await [`ActivityContext::cancelled`]) and stop early.
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    pub async fn cancelled(&self) {
        let mut rx = self.cancelled.clone();
        loop {
            let cancelled = *rx.borrow_and_update();
            if cancelled {
                return;
            }
            if rx.changed().await.is_err() {
                // Nobody can cancel us any more.
                futures::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests;
