use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::engine::{ActivityInvocation, WorkflowInstance, WorkflowState};
use crate::error::BoxError;
use crate::storage::{unix_millis, WorkflowStorage};

/// In-memory implementation of WorkflowStorage for testing
#[derive(Clone, Default)]
pub struct MemoryStorage {
    instances: Arc<Mutex<HashMap<String, WorkflowInstance>>>,
    update_calls: Arc<Mutex<Vec<(String, WorkflowState)>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStorage {
    /// Create a new empty memory storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current state of an instance
    pub fn get_state(&self, workflow_id: &str) -> Option<WorkflowState> {
        lock(&self.instances).get(workflow_id).map(|i| i.state)
    }

    /// Every applied state transition, in order
    pub fn get_update_calls(&self) -> Vec<(String, WorkflowState)> {
        lock(&self.update_calls).clone()
    }

    /// Seed an instance as if an earlier process had written it
    pub fn insert_instance(&self, instance: WorkflowInstance) {
        lock(&self.instances).insert(instance.workflow_id.clone(), instance);
    }
}

#[async_trait]
impl WorkflowStorage for MemoryStorage {
    async fn init(&self) -> Result<(), BoxError> {
        // Nothing to initialize for in-memory storage
        Ok(())
    }

    async fn create_instance(&self, instance: &WorkflowInstance) -> Result<(), BoxError> {
        let mut instances = lock(&self.instances);
        if instances.contains_key(&instance.workflow_id) {
            return Err(format!("workflow instance '{}' already exists", instance.workflow_id).into());
        }
        instances.insert(instance.workflow_id.clone(), instance.clone());
        Ok(())
    }

    async fn get_instance(&self, workflow_id: &str) -> Result<Option<WorkflowInstance>, BoxError> {
        Ok(lock(&self.instances).get(workflow_id).cloned())
    }

    async fn update_state(
        &self,
        workflow_id: &str,
        state: WorkflowState,
        output: Option<&str>,
        error: Option<&str>,
    ) -> Result<bool, BoxError> {
        let mut instances = lock(&self.instances);
        let Some(instance) = instances.get_mut(workflow_id) else {
            return Ok(false);
        };
        if !instance.state.can_transition_to(state) {
            return Ok(false);
        }

        instance.state = state;
        if let Some(output) = output {
            instance.output = Some(output.to_string());
        }
        if let Some(error) = error {
            instance.error = Some(error.to_string());
        }
        instance.updated_at_ms = unix_millis();

        lock(&self.update_calls).push((workflow_id.to_string(), state));
        Ok(true)
    }

    async fn list_unfinished(&self) -> Result<Vec<WorkflowInstance>, BoxError> {
        let mut unfinished: Vec<_> = lock(&self.instances)
            .values()
            .filter(|i| !i.state.is_terminal())
            .cloned()
            .collect();
        unfinished.sort_by_key(|i| i.created_at_ms);
        Ok(unfinished)
    }

    async fn record_scheduled(&self, invocation: &ActivityInvocation) -> Result<(), BoxError> {
        let mut instances = lock(&self.instances);
        let instance = instances
            .get_mut(&invocation.workflow_id)
            .ok_or("workflow instance not found")?;
        let exists = instance
            .history
            .iter()
            .any(|a| a.sequence == invocation.sequence && a.attempt == invocation.attempt);
        if !exists {
            instance.history.push(invocation.clone());
            instance.history.sort_by_key(|a| (a.sequence, a.attempt));
        }
        Ok(())
    }

    async fn record_outcome(&self, invocation: &ActivityInvocation) -> Result<bool, BoxError> {
        let mut instances = lock(&self.instances);
        let instance = instances
            .get_mut(&invocation.workflow_id)
            .ok_or("workflow instance not found")?;

        match instance
            .history
            .iter_mut()
            .find(|a| a.sequence == invocation.sequence && a.attempt == invocation.attempt)
        {
            Some(existing) if existing.outcome.is_terminal() => Ok(false),
            Some(existing) => {
                existing.outcome = invocation.outcome.clone();
                Ok(true)
            }
            None => {
                instance.history.push(invocation.clone());
                instance.history.sort_by_key(|a| (a.sequence, a.attempt));
                Ok(true)
            }
        }
    }

    async fn call_history(
        &self,
        workflow_id: &str,
        sequence: u32,
    ) -> Result<Vec<ActivityInvocation>, BoxError> {
        Ok(lock(&self.instances)
            .get(workflow_id)
            .map(|i| i.attempts(sequence))
            .unwrap_or_default())
    }
}
