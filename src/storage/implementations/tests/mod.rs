use crate::activity::RetryPolicy;
use crate::engine::{
    ActivityInvocation, ActivityOptions, ActivityOutcome, WorkflowInstance, WorkflowState,
};
use crate::error::ActivityError;
use crate::queue::{ActivityTask, TaskQueue};
use crate::storage::implementations::{MemoryStorage, SqliteStorage};
use crate::storage::WorkflowStorage;
use std::time::Duration;

fn instance(workflow_id: &str) -> WorkflowInstance {
    WorkflowInstance::scheduled(workflow_id, "run-1", "greeting", "BAPE", 1)
}

fn options() -> ActivityOptions {
    ActivityOptions::new()
        .with_timeout(Duration::from_secs(5))
        .with_retry_policy(RetryPolicy::default().with_max_attempts(3))
}

fn pending(workflow_id: &str, sequence: u32) -> ActivityInvocation {
    let task = ActivityTask::new("q", workflow_id, sequence, "greeting", "BAPE", &options());
    ActivityInvocation::scheduled(&task)
}

async fn sqlite() -> SqliteStorage {
    let storage = SqliteStorage::in_memory().await.unwrap();
    WorkflowStorage::init(&storage).await.unwrap();
    storage
}

// Shared checks, run against both backends.

async fn check_transitions(storage: &dyn WorkflowStorage) {
    storage.create_instance(&instance("wf-1")).await.unwrap();

    assert!(!storage
        .update_state("wf-1", WorkflowState::Completed, Some("early"), None)
        .await
        .unwrap());
    assert!(storage
        .update_state("wf-1", WorkflowState::Running, None, None)
        .await
        .unwrap());
    assert!(storage
        .update_state("wf-1", WorkflowState::Completed, Some("done"), None)
        .await
        .unwrap());

    // terminal states are final
    assert!(!storage
        .update_state("wf-1", WorkflowState::Failed, None, Some("late"))
        .await
        .unwrap());
    assert!(!storage
        .update_state("wf-1", WorkflowState::Running, None, None)
        .await
        .unwrap());

    let stored = storage.get_instance("wf-1").await.unwrap().unwrap();
    assert_eq!(stored.state, WorkflowState::Completed);
    assert_eq!(stored.output.as_deref(), Some("done"));
    assert_eq!(stored.error, None);
}

async fn check_duplicate_create(storage: &dyn WorkflowStorage) {
    storage.create_instance(&instance("wf-1")).await.unwrap();
    assert!(storage.create_instance(&instance("wf-1")).await.is_err());
}

async fn check_outcome_recorded_once(storage: &dyn WorkflowStorage) {
    storage.create_instance(&instance("wf-1")).await.unwrap();
    let attempt = pending("wf-1", 0);
    storage.record_scheduled(&attempt).await.unwrap();
    // scheduling the same attempt again changes nothing
    storage.record_scheduled(&attempt).await.unwrap();

    let first = attempt
        .clone()
        .with_outcome(ActivityOutcome::Succeeded("Hello, BAPE!".into()));
    let second = attempt.clone().with_outcome(ActivityOutcome::Failed(
        ActivityError::ActivityFailed {
            attempt: 1,
            cause: "boom".into(),
        },
    ));
    assert!(storage.record_outcome(&first).await.unwrap());
    assert!(!storage.record_outcome(&second).await.unwrap());

    let history = storage.call_history("wf-1", 0).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(
        history[0].outcome,
        ActivityOutcome::Succeeded("Hello, BAPE!".into())
    );
}

async fn check_history_ordering(storage: &dyn WorkflowStorage) {
    storage.create_instance(&instance("wf-1")).await.unwrap();
    let first = pending("wf-1", 0);
    let retry = first.next_attempt();
    let second_call = pending("wf-1", 1);

    storage.record_scheduled(&second_call).await.unwrap();
    storage.record_scheduled(&retry).await.unwrap();
    storage.record_scheduled(&first).await.unwrap();

    let stored = storage.get_instance("wf-1").await.unwrap().unwrap();
    let order: Vec<_> = stored.history.iter().map(|a| (a.sequence, a.attempt)).collect();
    assert_eq!(order, vec![(0, 1), (0, 2), (1, 1)]);

    let calls = storage.call_history("wf-1", 0).await.unwrap();
    assert_eq!(calls.len(), 2);
    assert!(storage.call_history("wf-1", 7).await.unwrap().is_empty());
}

async fn check_list_unfinished(storage: &dyn WorkflowStorage) {
    storage.create_instance(&instance("wf-a")).await.unwrap();
    storage.create_instance(&instance("wf-b")).await.unwrap();
    storage
        .update_state("wf-b", WorkflowState::Cancelled, None, None)
        .await
        .unwrap();

    let unfinished = storage.list_unfinished().await.unwrap();
    let ids: Vec<_> = unfinished.iter().map(|i| i.workflow_id.as_str()).collect();
    assert_eq!(ids, vec!["wf-a"]);
}

#[tokio::test]
async fn test_memory_storage_transitions() {
    let storage = MemoryStorage::new();
    check_transitions(&storage).await;
    assert_eq!(
        storage.get_update_calls(),
        vec![
            ("wf-1".to_string(), WorkflowState::Running),
            ("wf-1".to_string(), WorkflowState::Completed),
        ]
    );
}

#[tokio::test]
async fn test_memory_storage_rejects_duplicate_instance() {
    check_duplicate_create(&MemoryStorage::new()).await;
}

#[tokio::test]
async fn test_memory_storage_outcome_recorded_once() {
    check_outcome_recorded_once(&MemoryStorage::new()).await;
}

#[tokio::test]
async fn test_memory_storage_history_ordering() {
    check_history_ordering(&MemoryStorage::new()).await;
}

#[tokio::test]
async fn test_memory_storage_list_unfinished() {
    check_list_unfinished(&MemoryStorage::new()).await;
}

#[tokio::test]
async fn test_sqlite_storage_transitions() {
    check_transitions(&sqlite().await).await;
}

#[tokio::test]
async fn test_sqlite_storage_rejects_duplicate_instance() {
    check_duplicate_create(&sqlite().await).await;
}

#[tokio::test]
async fn test_sqlite_storage_outcome_recorded_once() {
    check_outcome_recorded_once(&sqlite().await).await;
}

#[tokio::test]
async fn test_sqlite_storage_history_ordering() {
    check_history_ordering(&sqlite().await).await;
}

#[tokio::test]
async fn test_sqlite_storage_list_unfinished() {
    check_list_unfinished(&sqlite().await).await;
}

#[tokio::test]
async fn test_sqlite_storage_missing_instance() {
    let storage = sqlite().await;
    assert!(storage.get_instance("nope").await.unwrap().is_none());
    assert!(!storage
        .update_state("nope", WorkflowState::Running, None, None)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_sqlite_storage_failed_outcome_survives_reload() {
    let storage = sqlite().await;
    storage.create_instance(&instance("wf-1")).await.unwrap();
    let failed = pending("wf-1", 0).with_outcome(ActivityOutcome::Failed(ActivityError::Timeout));
    assert!(storage.record_outcome(&failed).await.unwrap());

    let history = storage.call_history("wf-1", 0).await.unwrap();
    assert_eq!(history, vec![failed]);
}

// SqliteStorage as a task queue

#[tokio::test]
async fn test_sqlite_queue_lease_hides_task() {
    let storage = sqlite().await;
    let task = ActivityTask::new("q", "wf-1", 0, "greeting", "BAPE", &options());
    storage.enqueue(task.clone()).await.unwrap();
    // idempotent on task id
    storage.enqueue(task.clone()).await.unwrap();

    let leased = storage
        .dequeue("q", "w1", Duration::from_secs(60))
        .await
        .unwrap()
        .expect("task is visible");
    assert_eq!(leased.task_id, task.task_id);
    assert_eq!(leased.deliveries, 1);
    assert_eq!(leased.retry_policy, task.retry_policy);
    assert_eq!(leased.timeout, Duration::from_secs(5));

    assert!(storage
        .dequeue("q", "w2", Duration::from_secs(60))
        .await
        .unwrap()
        .is_none());
    assert!(storage
        .dequeue("other", "w2", Duration::from_secs(60))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_sqlite_queue_redelivers_after_visibility_timeout() {
    let storage = sqlite().await;
    let task = ActivityTask::new("q", "wf-1", 0, "greeting", "BAPE", &options());
    storage.enqueue(task.clone()).await.unwrap();

    storage
        .dequeue("q", "w1", Duration::from_millis(20))
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    let again = storage
        .dequeue("q", "w2", Duration::from_secs(60))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.task_id, task.task_id);
    assert_eq!(again.attempt, 1);
    assert_eq!(again.deliveries, 2);
}

#[tokio::test]
async fn test_sqlite_queue_ack_and_nack() {
    let storage = sqlite().await;
    let task = ActivityTask::new("q", "wf-1", 0, "greeting", "BAPE", &options());
    storage.enqueue(task.clone()).await.unwrap();

    let leased = storage
        .dequeue("q", "w1", Duration::from_secs(60))
        .await
        .unwrap()
        .unwrap();
    storage
        .nack(&leased.task_id, Duration::from_millis(30))
        .await
        .unwrap();
    assert!(storage
        .dequeue("q", "w1", Duration::from_secs(60))
        .await
        .unwrap()
        .is_none());

    tokio::time::sleep(Duration::from_millis(60)).await;
    let retried = storage
        .dequeue("q", "w1", Duration::from_secs(60))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(retried.attempt, 2);

    storage.ack(&retried.task_id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(storage
        .dequeue("q", "w1", Duration::from_millis(1))
        .await
        .unwrap()
        .is_none());
}
