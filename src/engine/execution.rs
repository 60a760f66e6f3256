use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, watch};

use super::context::Workflow;
use super::options::EngineOptions;
use crate::error::ActivityError;
use crate::queue::TaskQueue;
use crate::storage::WorkflowStorage;

pub(crate) type CallResult = Result<String, ActivityError>;

/// Identifies one activity call of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CallKey {
    pub workflow_id: String,
    pub sequence: u32,
}

impl CallKey {
    pub fn new(workflow_id: &str, sequence: u32) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            sequence,
        }
    }
}

/// State shared by the engine, every running orchestration and the workers
/// reporting back into it.
#[derive(Clone)]
pub(crate) struct EngineSharedState {
    /// Registered workflow definitions by kind
    pub workflows: Arc<HashMap<String, Arc<dyn Workflow>>>,
    /// Durable instance and history store
    pub storage: Arc<dyn WorkflowStorage>,
    /// Queue activity tasks are published to
    pub queue: Arc<dyn TaskQueue>,
    pub options: EngineOptions,
    /// Orchestrations suspended on an activity outcome
    waiters: Arc<Mutex<HashMap<CallKey, oneshot::Sender<CallResult>>>>,
    /// Cancellation signals of instances driven by this process
    cancellations: Arc<Mutex<HashMap<String, watch::Sender<bool>>>>,
    /// Instances with a live driver in this process
    drivers: Arc<Mutex<HashSet<String>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EngineSharedState {
    pub fn new(
        storage: Arc<dyn WorkflowStorage>,
        queue: Arc<dyn TaskQueue>,
        options: EngineOptions,
    ) -> Self {
        Self {
            workflows: Arc::new(HashMap::new()),
            storage,
            queue,
            options,
            waiters: Arc::new(Mutex::new(HashMap::new())),
            cancellations: Arc::new(Mutex::new(HashMap::new())),
            drivers: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Claims the right to drive `workflow_id`. False when another driver
    /// in this process already holds it.
    pub fn claim_driver(&self, workflow_id: &str) -> bool {
        lock(&self.drivers).insert(workflow_id.to_string())
    }

    pub fn release_driver(&self, workflow_id: &str) {
        lock(&self.drivers).remove(workflow_id);
    }


    pub fn register_waiter(&self, key: CallKey) -> oneshot::Receiver<CallResult> {
        let (tx, rx) = oneshot::channel();
        lock(&self.waiters).insert(key, tx);
        rx
    }

    pub fn remove_waiter(&self, key: &CallKey) {
        lock(&self.waiters).remove(key);
    }

    /// Wakes the orchestration waiting on `key`. Returns false when nobody
    /// is waiting; the outcome is already durable, so a later replay picks
    /// it up from history.
    pub fn notify_waiter(&self, key: &CallKey, result: CallResult) -> bool {
        let waiter = lock(&self.waiters).remove(key);
        match waiter {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    /// Cancellation signal for the driver of `workflow_id`, created on first use.
    pub fn subscribe_cancellation(&self, workflow_id: &str) -> watch::Receiver<bool> {
        lock(&self.cancellations)
            .entry(workflow_id.to_string())
            .or_insert_with(|| watch::channel(false).0)
            .subscribe()
    }

    /// Cancellation signal of an instance driven here, if any. Instances
    /// not driven by this process get a receiver that never fires.
    pub fn cancellation_receiver(&self, workflow_id: &str) -> watch::Receiver<bool> {
        match lock(&self.cancellations).get(workflow_id) {
            Some(tx) => tx.subscribe(),
            None => watch::channel(false).1,
        }
    }

    pub fn signal_cancelled(&self, workflow_id: &str) {
        if let Some(tx) = lock(&self.cancellations).get(workflow_id) {
            tx.send_replace(true);
        }
    }

    #[cfg(test)]
    pub fn tracked_cancellations(&self) -> usize {
        lock(&self.cancellations).len()
    }

    pub fn forget_instance(&self, workflow_id: &str) {
        lock(&self.cancellations).remove(workflow_id);
        lock(&self.waiters).retain(|key, _| key.workflow_id != workflow_id);
    }
}
