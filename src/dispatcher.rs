//! Turns an admitted request into a running workflow instance.

use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::engine::WorkflowEngine;
use crate::error::EngineError;
use crate::greeting::GREETING_WORKFLOW;

/// Where the dispatcher hands new instances to.
#[async_trait]
pub trait WorkflowIntake: Send + Sync {
    /// Persists and starts an instance, returning its run id.
    async fn submit(
        &self,
        workflow_id: String,
        kind: &str,
        input: String,
    ) -> Result<String, EngineError>;
}

#[async_trait]
impl WorkflowIntake for WorkflowEngine {
    async fn submit(
        &self,
        workflow_id: String,
        kind: &str,
        input: String,
    ) -> Result<String, EngineError> {
        self.start_workflow(workflow_id, kind, input).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowHandle {
    pub workflow_id: String,
    pub run_id: String,
}

/// Allocates instance ids and submits instances without waiting for them.
#[derive(Clone)]
pub struct WorkflowDispatcher {
    intake: Arc<dyn WorkflowIntake>,
    id_prefix: String,
    default_kind: String,
}

impl WorkflowDispatcher {
    pub fn new(intake: Arc<dyn WorkflowIntake>, id_prefix: impl Into<String>) -> Self {
        Self {
            intake,
            id_prefix: id_prefix.into(),
            default_kind: GREETING_WORKFLOW.to_string(),
        }
    }

    pub fn with_default_kind(mut self, kind: impl Into<String>) -> Self {
        self.default_kind = kind.into();
        self
    }

    pub fn default_kind(&self) -> &str {
        &self.default_kind
    }

    pub fn next_workflow_id(&self) -> String {
        format!("{}_{}", self.id_prefix, Uuid::new_v4())
    }

    pub async fn dispatch(&self, kind: &str, input: String) -> Result<WorkflowHandle, EngineError> {
        let workflow_id = self.next_workflow_id();
        let run_id = self.intake.submit(workflow_id.clone(), kind, input).await?;
        info!("Dispatched '{}' as '{}'", kind, workflow_id);
        Ok(WorkflowHandle {
            workflow_id,
            run_id,
        })
    }
}
