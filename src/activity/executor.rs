use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;

use super::{Activity, ActivityContext};
use crate::error::ActivityError;

/// Runs registered activities by name, bounded by the context deadline.
///
/// The executor knows nothing about workflows; it turns one call into a
/// value or a typed failure.
#[derive(Clone, Default)]
pub struct ActivityExecutor {
    activities: HashMap<String, Arc<dyn Activity>>,
}

impl ActivityExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<A: Activity + 'static>(mut self, activity: A) -> Self {
        self.activities
            .insert(activity.name().to_string(), Arc::new(activity));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.activities.contains_key(name)
    }

    pub async fn execute(
        &self,
        name: &str,
        input: String,
        ctx: &ActivityContext,
    ) -> Result<String, ActivityError> {
        let activity = self
            .activities
            .get(name)
            .ok_or_else(|| ActivityError::NotRegistered {
                activity: name.to_string(),
            })?;

        debug!(
            "Executing activity '{}' v{} for '{}' (attempt {}, {:?} left)",
            name,
            activity.version(),
            ctx.workflow_id(),
            ctx.attempt(),
            ctx.remaining()
        );

        match tokio::time::timeout_at(ctx.deadline(), activity.execute(ctx, input)).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(ActivityError::ActivityFailed {
                attempt: ctx.attempt(),
                cause: e.to_string(),
            }),
            Err(_) => {
                warn!(
                    "Activity '{}' for '{}' timed out on attempt {}",
                    name,
                    ctx.workflow_id(),
                    ctx.attempt()
                );
                Err(ActivityError::Timeout)
            }
        }
    }
}
