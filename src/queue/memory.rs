use async_trait::async_trait;
use log::debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{ActivityTask, TaskQueue};
use crate::error::BoxError;

struct QueuedTask {
    task: ActivityTask,
    visible_at: Instant,
    leased_by: Option<String>,
}

/// In-memory task queue. Not durable across restarts; useful for tests and
/// single-process deployments.
#[derive(Clone, Default)]
pub struct MemoryTaskQueue {
    tasks: Arc<Mutex<Vec<QueuedTask>>>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<QueuedTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of every task still owned by the queue, leased or not.
    pub fn pending_tasks(&self) -> Vec<ActivityTask> {
        self.tasks().iter().map(|q| q.task.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks().is_empty()
    }

    /// Worker currently holding the task's lease, if any.
    pub fn leased_by(&self, task_id: &str) -> Option<String> {
        self.tasks()
            .iter()
            .find(|q| q.task.task_id == task_id)
            .and_then(|q| q.leased_by.clone())
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn init(&self) -> Result<(), BoxError> {
        // Nothing to initialize for the in-memory queue
        Ok(())
    }

    async fn enqueue(&self, task: ActivityTask) -> Result<(), BoxError> {
        let mut tasks = self.tasks();
        if tasks.iter().any(|q| q.task.task_id == task.task_id) {
            return Ok(());
        }
        tasks.push(QueuedTask {
            task,
            visible_at: Instant::now(),
            leased_by: None,
        });
        Ok(())
    }

    async fn dequeue(
        &self,
        queue: &str,
        worker_id: &str,
        visibility_timeout: Duration,
    ) -> Result<Option<ActivityTask>, BoxError> {
        let now = Instant::now();
        let mut tasks = self.tasks();
        let claimed = tasks
            .iter_mut()
            .find(|q| q.task.queue == queue && q.visible_at <= now)
            .map(|q| {
                if let Some(previous) = q.leased_by.as_deref() {
                    debug!(
                        "Task {} lease of '{}' expired, redelivering to '{}'",
                        q.task.task_id, previous, worker_id
                    );
                }
                q.visible_at = now + visibility_timeout;
                q.leased_by = Some(worker_id.to_string());
                q.task.deliveries += 1;
                q.task.clone()
            });
        Ok(claimed)
    }

    async fn ack(&self, task_id: &str) -> Result<(), BoxError> {
        self.tasks().retain(|q| q.task.task_id != task_id);
        Ok(())
    }

    async fn nack(&self, task_id: &str, retry_after: Duration) -> Result<(), BoxError> {
        let mut tasks = self.tasks();
        match tasks.iter_mut().find(|q| q.task.task_id == task_id) {
            Some(q) => {
                q.task.attempt += 1;
                q.leased_by = None;
                q.visible_at = Instant::now() + retry_after;
            }
            None => debug!("Nack for unknown task {}", task_id),
        }
        Ok(())
    }
}
