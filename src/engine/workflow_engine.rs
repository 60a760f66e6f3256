use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

use super::context::{Workflow, WorkflowContext};
use super::execution::{CallKey, EngineSharedState};
use super::history::{resolve_call, ActivityInvocation, ActivityOutcome, WorkflowInstance};
use super::options::EngineOptions;
use super::state::WorkflowState;
use crate::error::{ActivityError, BoxError, EngineError, WorkflowError};
use crate::queue::{ActivityTask, TaskQueue};
use crate::storage::{unix_millis, WorkflowStorage};

/// What a worker should do with a task after reporting its attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The call is settled; acknowledge the task.
    Complete,
    /// Another attempt is allowed; nack the task with this backoff.
    Retry(Duration),
    /// The instance is gone or finished; acknowledge and drop the outcome.
    Discard,
}

/// Drives workflow instances and records the outcomes workers report.
#[derive(Clone)]
pub struct WorkflowEngine {
    shared: EngineSharedState,
    accepting: Arc<AtomicBool>,
}

fn unavailable(e: BoxError) -> EngineError {
    EngineError::Unavailable(e.to_string())
}

impl WorkflowEngine {
    pub fn new(storage: Arc<dyn WorkflowStorage>, queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            shared: EngineSharedState::new(storage, queue, EngineOptions::default()),
            accepting: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.shared.options = options;
        self
    }

    pub fn register_workflow<W: Workflow + 'static>(mut self, workflow: W) -> Self {
        let mut workflows = (*self.shared.workflows).clone();
        workflows.insert(workflow.kind().to_string(), Arc::new(workflow));
        self.shared.workflows = Arc::new(workflows);
        self
    }

    pub fn has_workflow(&self, kind: &str) -> bool {
        self.shared.workflows.contains_key(kind)
    }

    /// Persists a new instance in `Scheduled` and starts driving it in the
    /// background. Returns the run id without waiting for the run.
    pub async fn start_workflow(
        &self,
        workflow_id: String,
        kind: &str,
        input: String,
    ) -> Result<String, EngineError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(EngineError::Unavailable(
                "engine is shutting down".to_string(),
            ));
        }
        if !self.has_workflow(kind) {
            return Err(EngineError::UnknownWorkflow(kind.to_string()));
        }

        let run_id = Uuid::new_v4().to_string();
        let instance = WorkflowInstance::scheduled(workflow_id, &run_id, kind, input, unix_millis());
        self.shared
            .storage
            .create_instance(&instance)
            .await
            .map_err(unavailable)?;

        info!(
            "Workflow '{}' ({}) scheduled with run {}",
            instance.workflow_id, kind, run_id
        );
        self.spawn_driver(instance);
        Ok(run_id)
    }

    /// Re-drives every instance that had not finished when the process
    /// stopped. Completed steps replay from history; in-flight tasks are
    /// awaited, not re-enqueued. Instances this process is already driving
    /// are left alone. Returns how many drivers were started.
    pub async fn recover(&self) -> Result<usize, EngineError> {
        let unfinished = self
            .shared
            .storage
            .list_unfinished()
            .await
            .map_err(unavailable)?;
        let mut count = 0;
        for instance in unfinished {
            let (workflow_id, kind, state) = (
                instance.workflow_id.clone(),
                instance.kind.clone(),
                instance.state,
            );
            if self.spawn_driver(instance) {
                info!(
                    "Recovering workflow '{}' ({}) from state {}",
                    workflow_id, kind, state
                );
                count += 1;
            }
        }
        Ok(count)
    }

    pub async fn describe(&self, workflow_id: &str) -> Result<WorkflowInstance, EngineError> {
        self.shared
            .storage
            .get_instance(workflow_id)
            .await
            .map_err(unavailable)?
            .ok_or_else(|| EngineError::NotFound(workflow_id.to_string()))
    }

    /// Moves a non-terminal instance to `Cancelled`. The orchestration sees
    /// it at its next suspension point; late activity outcomes are dropped.
    pub async fn cancel(&self, workflow_id: &str) -> Result<WorkflowState, EngineError> {
        let instance = self.describe(workflow_id).await?;
        if instance.state.is_terminal() {
            return Err(EngineError::AlreadyTerminal {
                workflow_id: workflow_id.to_string(),
                state: instance.state,
            });
        }

        let applied = self
            .shared
            .storage
            .update_state(
                workflow_id,
                WorkflowState::Cancelled,
                None,
                Some("cancelled by request"),
            )
            .await
            .map_err(unavailable)?;
        if !applied {
            // Finished between our read and the update.
            let state = self.describe(workflow_id).await?.state;
            return Err(EngineError::AlreadyTerminal {
                workflow_id: workflow_id.to_string(),
                state,
            });
        }

        info!("Workflow '{}' cancelled", workflow_id);
        self.shared.signal_cancelled(workflow_id);
        Ok(WorkflowState::Cancelled)
    }

    /// Polls storage until the instance reaches a terminal state.
    pub async fn wait_for_completion(
        &self,
        workflow_id: &str,
        poll_interval: Duration,
    ) -> Result<WorkflowInstance, EngineError> {
        loop {
            let instance = self.describe(workflow_id).await?;
            if instance.state.is_terminal() {
                return Ok(instance);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Stops accepting new instances. Running orchestrations keep going.
    pub fn shutdown(&self) {
        info!("Workflow engine no longer accepting new workflows");
        self.accepting.store(false, Ordering::SeqCst);
    }

    /// Whether an instance still wants outcomes for its activities.
    pub async fn is_active(&self, workflow_id: &str) -> Result<bool, BoxError> {
        Ok(self
            .shared
            .storage
            .get_instance(workflow_id)
            .await?
            .map(|instance| !instance.state.is_terminal())
            .unwrap_or(false))
    }

    pub fn cancellation_receiver(&self, workflow_id: &str) -> watch::Receiver<bool> {
        self.shared.cancellation_receiver(workflow_id)
    }

    /// Records the outcome of one attempt and wakes the orchestration once
    /// the call is settled.
    ///
    /// Reporting the same attempt twice is harmless: the first terminal
    /// outcome wins and the disposition is derived from what is stored.
    pub async fn report_attempt(
        &self,
        task: &ActivityTask,
        result: Result<String, ActivityError>,
    ) -> Result<Disposition, BoxError> {
        if !self.is_active(&task.workflow_id).await? {
            info!(
                "Discarding outcome of task {} for inactive workflow '{}'",
                task.task_id, task.workflow_id
            );
            return Ok(Disposition::Discard);
        }

        let outcome = match &result {
            Ok(value) => ActivityOutcome::Succeeded(value.clone()),
            Err(e) => ActivityOutcome::Failed(e.clone()),
        };
        let invocation = ActivityInvocation::scheduled(task).with_outcome(outcome);
        if !self.shared.storage.record_outcome(&invocation).await? {
            debug!(
                "Attempt {} of step {} for '{}' was already recorded",
                task.attempt, task.sequence, task.workflow_id
            );
        }

        let attempts = self
            .shared
            .storage
            .call_history(&task.workflow_id, task.sequence)
            .await?;
        let key = CallKey::new(&task.workflow_id, task.sequence);

        match resolve_call(&attempts) {
            Some(settled) => {
                if let Err(e) = &settled {
                    warn!(
                        "Step {} ('{}') of '{}' gave up: {}",
                        task.sequence, task.activity, task.workflow_id, e
                    );
                }
                self.shared.notify_waiter(&key, settled);
                Ok(Disposition::Complete)
            }
            None => {
                let delay = task.retry_policy.delay_after(task.attempt);
                self.shared
                    .storage
                    .record_scheduled(&invocation.next_attempt())
                    .await?;
                info!(
                    "Step {} ('{}') of '{}' failed attempt {}/{}, retrying in {:?}",
                    task.sequence,
                    task.activity,
                    task.workflow_id,
                    task.attempt,
                    task.retry_policy.effective_max_attempts(),
                    delay
                );
                Ok(Disposition::Retry(delay))
            }
        }
    }

    /// Spawns the driver of `instance` unless one is already running here.
    fn spawn_driver(&self, instance: WorkflowInstance) -> bool {
        if !self.shared.claim_driver(&instance.workflow_id) {
            debug!("Workflow '{}' already has a driver", instance.workflow_id);
            return false;
        }
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let workflow_id = instance.workflow_id.clone();
            Self::drive(shared.clone(), instance).await;
            shared.release_driver(&workflow_id);
        });
        true
    }

    async fn drive(shared: EngineSharedState, instance: WorkflowInstance) {
        let workflow_id = instance.workflow_id.clone();
        // Subscribed before the state check so a concurrent cancel reaches us.
        let cancelled = shared.subscribe_cancellation(&workflow_id);

        let Some(workflow) = shared.workflows.get(&instance.kind).cloned() else {
            error!(
                "Workflow '{}' has unregistered kind '{}'",
                workflow_id, instance.kind
            );
            let message = format!("unknown workflow kind '{}'", instance.kind);
            Self::finish(&shared, &workflow_id, WorkflowState::Failed, None, Some(&message)).await;
            return;
        };

        if instance.state == WorkflowState::Scheduled {
            match shared
                .storage
                .update_state(&workflow_id, WorkflowState::Running, None, None)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    info!("Workflow '{}' is no longer runnable", workflow_id);
                    shared.forget_instance(&workflow_id);
                    return;
                }
                Err(e) => {
                    error!("Error marking workflow '{}' running: {}", workflow_id, e);
                    shared.forget_instance(&workflow_id);
                    return;
                }
            }
        } else {
            match shared.storage.get_instance(&workflow_id).await {
                Ok(Some(current)) if !current.state.is_terminal() => {}
                Ok(_) => {
                    info!("Workflow '{}' is no longer runnable", workflow_id);
                    shared.forget_instance(&workflow_id);
                    return;
                }
                Err(e) => {
                    error!("Error reading workflow '{}': {}", workflow_id, e);
                    shared.forget_instance(&workflow_id);
                    return;
                }
            }
        }

        debug!("Workflow '{}' running (run {})", workflow_id, instance.run_id);
        let ctx = WorkflowContext::new(&workflow_id, &instance.run_id, shared.clone(), cancelled);
        match workflow.run(&ctx, instance.input.clone()).await {
            Ok(output) => {
                Self::finish(&shared, &workflow_id, WorkflowState::Completed, Some(&output), None)
                    .await;
            }
            Err(WorkflowError::Cancelled) => {
                info!("Workflow '{}' stopped after cancellation", workflow_id);
                shared.forget_instance(&workflow_id);
            }
            Err(WorkflowError::Storage(e)) => {
                // Left non-terminal so the next recovery replays it.
                error!(
                    "Workflow '{}' suspended on storage error: {}",
                    workflow_id, e
                );
                shared.forget_instance(&workflow_id);
            }
            Err(e) => {
                let message = e.to_string();
                Self::finish(&shared, &workflow_id, WorkflowState::Failed, None, Some(&message))
                    .await;
            }
        }
    }

    async fn finish(
        shared: &EngineSharedState,
        workflow_id: &str,
        state: WorkflowState,
        output: Option<&str>,
        error: Option<&str>,
    ) {
        match shared
            .storage
            .update_state(workflow_id, state, output, error)
            .await
        {
            Ok(true) => match error {
                Some(e) => warn!("Workflow '{}' {}: {}", workflow_id, state, e),
                None => info!("Workflow '{}' {}", workflow_id, state),
            },
            Ok(false) => info!(
                "Workflow '{}' already terminal, dropping {} result",
                workflow_id, state
            ),
            Err(e) => error!(
                "Error recording {} for workflow '{}': {}",
                state, workflow_id, e
            ),
        }
        shared.forget_instance(workflow_id);
    }
}
