//! The greeting workflow: one activity call that says hello.

use async_trait::async_trait;
use log::info;
use std::time::Duration;

use crate::activity::{Activity, ActivityContext, RetryPolicy};
use crate::engine::{ActivityOptions, Workflow, WorkflowContext};
use crate::error::{BoxError, WorkflowError};

pub const GREETING_WORKFLOW: &str = "greeting";
pub const GREETING_ACTIVITY: &str = "greeting";

pub struct GreetingActivity;

#[async_trait]
impl Activity for GreetingActivity {
    fn name(&self) -> &str {
        GREETING_ACTIVITY
    }

    async fn execute(&self, ctx: &ActivityContext, input: String) -> Result<String, BoxError> {
        info!(
            "Running greeting activity for '{}' with input: {}",
            ctx.workflow_id(),
            input
        );
        Ok(format!("Hello, {}!", input))
    }
}

pub struct GreetingWorkflow {
    options: ActivityOptions,
}

impl Default for GreetingWorkflow {
    fn default() -> Self {
        Self {
            options: ActivityOptions::new()
                .with_timeout(Duration::from_secs(5))
                .with_retry_policy(RetryPolicy::default().with_max_attempts(3)),
        }
    }
}

impl GreetingWorkflow {
    pub fn with_options(options: ActivityOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Workflow for GreetingWorkflow {
    fn kind(&self) -> &str {
        GREETING_WORKFLOW
    }

    async fn run(&self, ctx: &WorkflowContext, input: String) -> Result<String, WorkflowError> {
        let greeting = ctx
            .execute_activity(GREETING_ACTIVITY, input, self.options.clone())
            .await?;
        Ok(format!("Workflow completed: {}", greeting))
    }
}
