use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use crate::activity::{ActivityContext, ActivityExecutor};
use crate::engine::{Disposition, WorkflowEngine, DEFAULT_TASK_QUEUE};
use crate::error::BoxError;
use crate::queue::{ActivityTask, TaskQueue};

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Number of concurrent polling workers
    pub worker_count: usize,
    /// How long a dequeued task stays hidden from other workers. Also caps
    /// the time an attempt may run.
    pub visibility_timeout: Duration,
    /// Pause between polls of an empty queue
    pub poll_interval: Duration,
    pub task_queue: String,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            worker_count: 4,
            visibility_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
            task_queue: DEFAULT_TASK_QUEUE.to_string(),
        }
    }
}

impl WorkerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worker_count(mut self, value: usize) -> Self {
        self.worker_count = value;
        self
    }

    pub fn with_visibility_timeout(mut self, value: Duration) -> Self {
        self.visibility_timeout = value;
        self
    }

    pub fn with_poll_interval(mut self, value: Duration) -> Self {
        self.poll_interval = value;
        self
    }

    pub fn with_task_queue(mut self, value: impl Into<String>) -> Self {
        self.task_queue = value.into();
        self
    }
}

/// Stateless workers pulling activity tasks from a queue, running them
/// through the executor and reporting the outcome to the engine.
#[derive(Clone)]
pub struct WorkerPool {
    queue: Arc<dyn TaskQueue>,
    executor: ActivityExecutor,
    engine: WorkflowEngine,
    options: WorkerOptions,
}

/// Running workers. Dropping the handle leaves them running; call
/// [`WorkerPoolHandle::shutdown`] to stop them.
pub struct WorkerPoolHandle {
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPoolHandle {
    /// Signals every worker and waits for them to finish the task in hand.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for result in futures::future::join_all(self.workers).await {
            if let Err(e) = result {
                error!("Worker exited abnormally: {}", e);
            }
        }
        info!("Worker pool stopped");
    }
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        executor: ActivityExecutor,
        engine: WorkflowEngine,
    ) -> Self {
        Self {
            queue,
            executor,
            engine,
            options: WorkerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: WorkerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    pub fn start(self) -> WorkerPoolHandle {
        let (shutdown, _) = watch::channel(false);
        let count = self.options.worker_count.max(1);
        info!(
            "Starting {} workers on queue '{}'",
            count, self.options.task_queue
        );

        let workers = (0..count)
            .map(|i| {
                let pool = self.clone();
                let worker_id = format!("worker-{}", i + 1);
                let stop = shutdown.subscribe();
                tokio::spawn(async move { pool.run(worker_id, stop).await })
            })
            .collect();

        WorkerPoolHandle { shutdown, workers }
    }

    async fn run(&self, worker_id: String, mut stop: watch::Receiver<bool>) {
        debug!("{} polling '{}'", worker_id, self.options.task_queue);
        while !*stop.borrow() {
            match self.poll_once(&worker_id).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => error!("{} failed to poll for tasks: {}", worker_id, e),
            }
            tokio::select! {
                _ = sleep(self.options.poll_interval) => {}
                _ = stop.changed() => {}
            }
        }
        debug!("{} stopped", worker_id);
    }

    /// Claims and processes at most one task. Returns whether a task was
    /// claimed.
    pub async fn poll_once(&self, worker_id: &str) -> Result<bool, BoxError> {
        let task = self
            .queue
            .dequeue(
                &self.options.task_queue,
                worker_id,
                self.options.visibility_timeout,
            )
            .await?;
        match task {
            Some(task) => {
                self.process(worker_id, task).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn process(&self, worker_id: &str, task: ActivityTask) {
        let claimed_at = Instant::now();

        match self.engine.is_active(&task.workflow_id).await {
            Ok(true) => {}
            Ok(false) => {
                info!(
                    "{} skipping task {} of inactive workflow '{}'",
                    worker_id, task.task_id, task.workflow_id
                );
                self.ack(&task).await;
                return;
            }
            Err(e) => {
                // The lease runs out and someone tries again.
                error!(
                    "{} could not check workflow '{}': {}",
                    worker_id, task.workflow_id, e
                );
                return;
            }
        }

        let budget = task.timeout.min(self.options.visibility_timeout);
        let ctx = ActivityContext::new(
            &task.workflow_id,
            task.attempt,
            claimed_at + budget,
            self.engine.cancellation_receiver(&task.workflow_id),
        );
        info!(
            "{} running '{}' for '{}' (step {}, attempt {}, delivery {})",
            worker_id,
            task.activity,
            task.workflow_id,
            task.sequence,
            task.attempt,
            task.deliveries
        );
        let result = self
            .executor
            .execute(&task.activity, task.input.clone(), &ctx)
            .await;
        if let Err(e) = &result {
            warn!(
                "{} attempt {} of '{}' for '{}' failed: {}",
                worker_id, task.attempt, task.activity, task.workflow_id, e
            );
        }

        match self.engine.report_attempt(&task, result).await {
            Ok(Disposition::Complete) | Ok(Disposition::Discard) => self.ack(&task).await,
            Ok(Disposition::Retry(delay)) => {
                if let Err(e) = self.queue.nack(&task.task_id, delay).await {
                    error!("Failed to nack task {}: {}", task.task_id, e);
                }
            }
            Err(e) => error!(
                "{} could not report task {} for '{}': {}",
                worker_id, task.task_id, task.workflow_id, e
            ),
        }
    }

    async fn ack(&self, task: &ActivityTask) {
        if let Err(e) = self.queue.ack(&task.task_id).await {
            error!("Failed to ack task {}: {}", task.task_id, e);
        }
    }
}

#[cfg(test)]
mod tests;
