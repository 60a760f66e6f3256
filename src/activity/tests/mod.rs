use crate::activity::{Activity, ActivityContext, ActivityExecutor, RetryPolicy};
use crate::error::{ActivityError, BoxError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

// Test RetryPolicy
#[test]
fn test_retry_policy_default() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_attempts, 1);
    assert_eq!(policy.effective_max_attempts(), 1);
}

#[test]
fn test_retry_policy_builder() {
    let policy = RetryPolicy::default()
        .with_max_attempts(3)
        .with_initial_interval(Duration::from_millis(100))
        .with_backoff_coefficient(2.0)
        .with_maximum_interval(Duration::from_millis(300));

    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.effective_max_attempts(), 3);
    assert_eq!(policy.maximum_interval, Duration::from_millis(300));
}

#[test]
fn test_backoff_grows_and_caps() {
    let policy = RetryPolicy::new(10, Duration::from_millis(100))
        .with_maximum_interval(Duration::from_millis(300));

    assert_eq!(policy.delay_after(1), Duration::from_millis(100));
    assert_eq!(policy.delay_after(2), Duration::from_millis(200));
    assert_eq!(policy.delay_after(3), Duration::from_millis(300));
    assert_eq!(policy.delay_after(30), Duration::from_millis(300));
}

#[test]
fn test_zero_max_attempts_still_runs_once() {
    let policy = RetryPolicy::default().with_max_attempts(0);
    assert_eq!(policy.effective_max_attempts(), 1);
}

struct Echo;

#[async_trait::async_trait]
impl Activity for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    async fn execute(&self, _ctx: &ActivityContext, input: String) -> Result<String, BoxError> {
        Ok(input)
    }
}

struct Broken;

#[async_trait::async_trait]
impl Activity for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    async fn execute(&self, _ctx: &ActivityContext, _input: String) -> Result<String, BoxError> {
        Err("disk on fire".into())
    }
}

struct Sleepy(Duration);

#[async_trait::async_trait]
impl Activity for Sleepy {
    fn name(&self) -> &str {
        "sleepy"
    }

    async fn execute(&self, _ctx: &ActivityContext, input: String) -> Result<String, BoxError> {
        tokio::time::sleep(self.0).await;
        Ok(input)
    }
}

fn executor() -> ActivityExecutor {
    ActivityExecutor::new()
        .register(Echo)
        .register(Broken)
        .register(Sleepy(Duration::from_millis(200)))
}

#[tokio::test]
async fn test_execute_success() {
    let ctx = ActivityContext::detached("wf", 1, Duration::from_secs(1));
    let result = executor().execute("echo", "hi".into(), &ctx).await;
    assert_eq!(result, Ok("hi".to_string()));
}

#[tokio::test]
async fn test_execute_failure_carries_attempt() {
    let ctx = ActivityContext::detached("wf", 2, Duration::from_secs(1));
    let result = executor().execute("broken", String::new(), &ctx).await;
    assert_eq!(
        result,
        Err(ActivityError::ActivityFailed {
            attempt: 2,
            cause: "disk on fire".into()
        })
    );
}

#[tokio::test]
async fn test_execute_times_out_at_deadline() {
    let ctx = ActivityContext::detached("wf", 1, Duration::from_millis(20));
    let started = Instant::now();
    let result = executor().execute("sleepy", "x".into(), &ctx).await;
    assert_eq!(result, Err(ActivityError::Timeout));
    assert!(started.elapsed() < Duration::from_millis(200));
}

#[tokio::test]
async fn test_execute_unknown_activity() {
    let ctx = ActivityContext::detached("wf", 1, Duration::from_secs(1));
    let result = executor().execute("missing", String::new(), &ctx).await;
    assert_eq!(
        result,
        Err(ActivityError::NotRegistered {
            activity: "missing".into()
        })
    );
}

#[tokio::test]
async fn test_context_observes_cancellation() {
    let (tx, rx) = watch::channel(false);
    let ctx = ActivityContext::new("wf", 1, Instant::now() + Duration::from_secs(1), rx);
    assert!(!ctx.is_cancelled());

    tx.send_replace(true);
    assert!(ctx.is_cancelled());
    tokio::time::timeout(Duration::from_millis(100), ctx.cancelled())
        .await
        .expect("cancellation should resolve");
}
