use async_trait::async_trait;
use log::debug;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::watch;

use super::execution::{CallKey, EngineSharedState};
use super::history::{resolve_call, ActivityInvocation};
use super::options::ActivityOptions;
use crate::error::WorkflowError;
use crate::queue::ActivityTask;

/// A deterministic orchestration function.
///
/// `run` may be invoked several times for the same instance: on the first
/// run and again on every replay after a restart. It must depend only on its
/// input and on the results the context hands back. Anything that reads the
/// clock, draws random numbers or performs I/O belongs in an activity.
#[async_trait]
pub trait Workflow: Send + Sync {
    fn kind(&self) -> &str;

    async fn run(&self, ctx: &WorkflowContext, input: String) -> Result<String, WorkflowError>;
}

/// The only door an orchestration has to the outside world.
///
/// Each `execute_activity` call takes the next sequence number. If history
/// already settles that call, its recorded result is returned without
/// scheduling anything; otherwise the task is enqueued (once) and the call
/// suspends until a worker's outcome is recorded.
pub struct WorkflowContext {
    workflow_id: String,
    run_id: String,
    next_sequence: AtomicU32,
    shared: EngineSharedState,
    cancelled: watch::Receiver<bool>,
}

impl WorkflowContext {
    pub(crate) fn new(
        workflow_id: &str,
        run_id: &str,
        shared: EngineSharedState,
        cancelled: watch::Receiver<bool>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            run_id: run_id.to_string(),
            next_sequence: AtomicU32::new(0),
            shared,
            cancelled,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Schedules `activity` and resolves to its durably recorded result.
    ///
    /// The sequence number is taken when this is called, not when the
    /// returned future is first polled, so branches joined with
    /// `futures::join!` are numbered in call order.
    pub fn execute_activity(
        &self,
        activity: impl Into<String>,
        input: impl Into<String>,
        options: ActivityOptions,
    ) -> impl Future<Output = Result<String, WorkflowError>> + Send + '_ {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let activity = activity.into();
        let input = input.into();
        async move { self.call(sequence, activity, input, options).await }
    }

    async fn call(
        &self,
        sequence: u32,
        activity: String,
        input: String,
        options: ActivityOptions,
    ) -> Result<String, WorkflowError> {
        let key = CallKey::new(&self.workflow_id, sequence);
        // Register before reading history so an outcome recorded in between
        // still reaches us.
        let receiver = self.shared.register_waiter(key.clone());

        let recorded = match self
            .shared
            .storage
            .call_history(&self.workflow_id, sequence)
            .await
        {
            Ok(recorded) => recorded,
            Err(e) => {
                self.shared.remove_waiter(&key);
                return Err(WorkflowError::Storage(e.to_string()));
            }
        };

        if let Some(first) = recorded.first() {
            if first.activity != activity || first.input != input {
                self.shared.remove_waiter(&key);
                return Err(WorkflowError::NonDeterminism {
                    sequence,
                    recorded: format!("{}({})", first.activity, first.input),
                    requested: format!("{}({})", activity, input),
                });
            }
            if let Some(result) = resolve_call(&recorded) {
                self.shared.remove_waiter(&key);
                debug!(
                    "Workflow '{}' replayed step {} ('{}') from history",
                    self.workflow_id, sequence, activity
                );
                return result.map_err(WorkflowError::from);
            }
            debug!(
                "Workflow '{}' step {} ('{}') already in flight, waiting",
                self.workflow_id, sequence, activity
            );
        } else if let Err(e) = self.schedule(sequence, activity, input, &options).await {
            self.shared.remove_waiter(&key);
            return Err(e);
        }

        self.wait(key, receiver).await
    }

    async fn schedule(
        &self,
        sequence: u32,
        activity: String,
        input: String,
        options: &ActivityOptions,
    ) -> Result<(), WorkflowError> {
        let task = ActivityTask::new(
            &self.shared.options.task_queue,
            &self.workflow_id,
            sequence,
            activity,
            input,
            options,
        );
        debug!(
            "Workflow '{}' scheduling step {} ('{}') as task {}",
            self.workflow_id, sequence, task.activity, task.task_id
        );

        // Enqueue first: if we die before the history write, the worker's
        // outcome report creates the record itself.
        self.shared
            .queue
            .enqueue(task.clone())
            .await
            .map_err(|e| WorkflowError::Storage(e.to_string()))?;
        self.shared
            .storage
            .record_scheduled(&ActivityInvocation::scheduled(&task))
            .await
            .map_err(|e| WorkflowError::Storage(e.to_string()))
    }

    async fn wait(
        &self,
        key: CallKey,
        receiver: tokio::sync::oneshot::Receiver<super::execution::CallResult>,
    ) -> Result<String, WorkflowError> {
        let mut cancelled = self.cancelled.clone();
        tokio::select! {
            result = receiver => match result {
                Ok(result) => result.map_err(WorkflowError::from),
                Err(_) => Err(WorkflowError::Storage(
                    "outcome channel closed before the activity settled".to_string(),
                )),
            },
            _ = wait_for_cancel(&mut cancelled) => {
                self.shared.remove_waiter(&key);
                Err(WorkflowError::Cancelled)
            }
        }
    }
}

async fn wait_for_cancel(rx: &mut watch::Receiver<bool>) {
    loop {
        let cancelled = *rx.borrow_and_update();
        if cancelled {
            return;
        }
        if rx.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}
