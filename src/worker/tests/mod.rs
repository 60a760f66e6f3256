use crate::activity::{Activity, ActivityContext, ActivityExecutor, RetryPolicy};
use crate::engine::{
    ActivityOptions, ActivityOutcome, Workflow, WorkflowContext, WorkflowEngine, WorkflowState,
    DEFAULT_TASK_QUEUE,
};
use crate::error::{ActivityError, BoxError, WorkflowError};
use crate::greeting::{GreetingActivity, GreetingWorkflow};
use crate::queue::{ActivityTask, MemoryTaskQueue, TaskQueue};
use crate::storage::implementations::MemoryStorage;
use crate::worker::{WorkerOptions, WorkerPool};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Counting {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl Activity for Counting {
    fn name(&self) -> &str {
        "counting"
    }

    async fn execute(&self, _ctx: &ActivityContext, input: String) -> Result<String, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(input)
    }
}

struct Sleepy;

#[async_trait]
impl Activity for Sleepy {
    fn name(&self) -> &str {
        "sleepy"
    }

    async fn execute(&self, _ctx: &ActivityContext, input: String) -> Result<String, BoxError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(input)
    }
}

/// Calls one named activity and returns its result.
struct SingleStep {
    activity: &'static str,
    options: ActivityOptions,
}

#[async_trait]
impl Workflow for SingleStep {
    fn kind(&self) -> &str {
        "single-step"
    }

    async fn run(&self, ctx: &WorkflowContext, input: String) -> Result<String, WorkflowError> {
        ctx.execute_activity(self.activity, input, self.options.clone())
            .await
    }
}

fn setup(workflow: impl Workflow + 'static) -> (Arc<MemoryStorage>, MemoryTaskQueue, WorkflowEngine) {
    let storage = Arc::new(MemoryStorage::new());
    let queue = MemoryTaskQueue::new();
    let engine = WorkflowEngine::new(storage.clone(), Arc::new(queue.clone()))
        .register_workflow(workflow)
        .register_workflow(GreetingWorkflow::default());
    (storage, queue, engine)
}

async fn poll_until_claimed(pool: &WorkerPool) {
    for _ in 0..200 {
        if pool.poll_once("test-worker").await.unwrap() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("no task was ever enqueued");
}

#[tokio::test]
async fn test_worker_options_builder() {
    let options = WorkerOptions::new()
        .with_worker_count(2)
        .with_visibility_timeout(Duration::from_secs(3))
        .with_poll_interval(Duration::from_millis(5))
        .with_task_queue("q");

    assert_eq!(options.worker_count, 2);
    assert_eq!(options.visibility_timeout, Duration::from_secs(3));
    assert_eq!(options.poll_interval, Duration::from_millis(5));
    assert_eq!(options.task_queue, "q");
    assert_eq!(WorkerOptions::default().task_queue, "BapeTaskQueue");
}

#[tokio::test]
async fn test_poll_once_on_empty_queue() {
    let (_storage, queue, engine) = setup(GreetingWorkflow::default());
    let pool = WorkerPool::new(Arc::new(queue), ActivityExecutor::new(), engine);
    assert!(!pool.poll_once("w1").await.unwrap());
}

#[tokio::test]
async fn test_task_of_unknown_workflow_is_skipped_and_acked() {
    let (_storage, queue, engine) = setup(GreetingWorkflow::default());
    let calls = Arc::new(AtomicU32::new(0));
    let executor = ActivityExecutor::new().register(Counting {
        calls: calls.clone(),
    });
    queue
        .enqueue(ActivityTask::new(
            DEFAULT_TASK_QUEUE,
            "gone",
            0,
            "counting",
            "x",
            &ActivityOptions::new(),
        ))
        .await
        .unwrap();

    let pool = WorkerPool::new(Arc::new(queue.clone()), executor, engine);
    assert!(pool.poll_once("w1").await.unwrap());

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_attempt_deadline_capped_by_visibility_timeout() {
    let (storage, queue, engine) = setup(SingleStep {
        activity: "sleepy",
        options: ActivityOptions::new().with_timeout(Duration::from_secs(30)),
    });
    let pool = WorkerPool::new(
        Arc::new(queue.clone()),
        ActivityExecutor::new().register(Sleepy),
        engine.clone(),
    )
    .with_options(WorkerOptions::new().with_visibility_timeout(Duration::from_millis(30)));

    engine
        .start_workflow("wf-slow".to_string(), "single-step", "x".to_string())
        .await
        .unwrap();
    poll_until_claimed(&pool).await;

    let instance = engine
        .wait_for_completion("wf-slow", Duration::from_millis(5))
        .await
        .unwrap();
    assert_eq!(instance.state, WorkflowState::Failed);
    assert_eq!(
        storage.get_state("wf-slow"),
        Some(WorkflowState::Failed)
    );
    assert_eq!(instance.history.len(), 1);
    assert_eq!(
        instance.history[0].outcome,
        ActivityOutcome::Failed(ActivityError::Timeout)
    );
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_failed_attempt_is_nacked_for_retry() {
    let (_storage, queue, engine) = setup(SingleStep {
        activity: "missing",
        options: ActivityOptions::new().with_retry_policy(
            RetryPolicy::new(2, Duration::from_millis(10)),
        ),
    });
    let pool = WorkerPool::new(Arc::new(queue.clone()), ActivityExecutor::new(), engine.clone());

    engine
        .start_workflow("wf-retry".to_string(), "single-step", "x".to_string())
        .await
        .unwrap();
    poll_until_claimed(&pool).await;

    // first attempt failed, the task went back to the queue as attempt 2
    let pending = queue.pending_tasks();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempt, 2);
    assert_eq!(queue.leased_by(&pending[0].task_id), None);

    poll_until_claimed(&pool).await;
    let instance = engine
        .wait_for_completion("wf-retry", Duration::from_millis(5))
        .await
        .unwrap();
    assert_eq!(instance.state, WorkflowState::Failed);
    assert_eq!(instance.history.len(), 2);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_pool_runs_greeting_end_to_end() {
    let (_storage, queue, engine) = setup(GreetingWorkflow::default());
    let handle = WorkerPool::new(
        Arc::new(queue.clone()),
        ActivityExecutor::new().register(GreetingActivity),
        engine.clone(),
    )
    .with_options(
        WorkerOptions::new()
            .with_worker_count(2)
            .with_poll_interval(Duration::from_millis(5)),
    )
    .start();

    engine
        .start_workflow("wf-hello".to_string(), "greeting", "BAPE".to_string())
        .await
        .unwrap();
    let instance = tokio::time::timeout(
        Duration::from_secs(5),
        engine.wait_for_completion("wf-hello", Duration::from_millis(5)),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(instance.state, WorkflowState::Completed);
    assert_eq!(
        instance.output.as_deref(),
        Some("Workflow completed: Hello, BAPE!")
    );
    assert_eq!(instance.history.len(), 1);

    tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .unwrap();
    assert!(queue.is_empty());
}
