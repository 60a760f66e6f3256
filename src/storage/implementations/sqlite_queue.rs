use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::time::Duration;

use super::sqlite_storage::SqliteStorage;
use crate::activity::RetryPolicy;
use crate::error::BoxError;
use crate::queue::{ActivityTask, TaskQueue};
use crate::storage::{unix_millis, WorkflowStorage};

fn task_from_row(row: &SqliteRow) -> Result<ActivityTask, BoxError> {
    let sequence: i64 = row.try_get("sequence")?;
    let attempt: i64 = row.try_get("attempt")?;
    let timeout_ms: i64 = row.try_get("timeout_ms")?;
    let deliveries: i64 = row.try_get("deliveries")?;
    let retry_policy: String = row.try_get("retry_policy")?;
    Ok(ActivityTask {
        task_id: row.try_get("task_id")?,
        queue: row.try_get("queue")?,
        workflow_id: row.try_get("workflow_id")?,
        sequence: sequence as u32,
        attempt: attempt as u32,
        activity: row.try_get("activity")?,
        input: row.try_get("input")?,
        timeout: Duration::from_millis(timeout_ms as u64),
        retry_policy: serde_json::from_str::<RetryPolicy>(&retry_policy)?,
        deliveries: deliveries as u32,
    })
}

/// Durable queue living next to the history tables. A claim is a single
/// `UPDATE … RETURNING`, so two workers can never lease the same row.
#[async_trait]
impl TaskQueue for SqliteStorage {
    async fn init(&self) -> Result<(), BoxError> {
        WorkflowStorage::init(self).await
    }

    async fn enqueue(&self, task: ActivityTask) -> Result<(), BoxError> {
        let now = unix_millis() as i64;
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO activity_tasks
                (task_id, queue, workflow_id, sequence, attempt, activity, input, timeout_ms,
                 retry_policy, deliveries, visible_at, leased_by, enqueued_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?)
            "#,
        )
        .bind(&task.task_id)
        .bind(&task.queue)
        .bind(&task.workflow_id)
        .bind(task.sequence as i64)
        .bind(task.attempt as i64)
        .bind(&task.activity)
        .bind(&task.input)
        .bind(task.timeout.as_millis() as i64)
        .bind(serde_json::to_string(&task.retry_policy)?)
        .bind(task.deliveries as i64)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn dequeue(
        &self,
        queue: &str,
        worker_id: &str,
        visibility_timeout: Duration,
    ) -> Result<Option<ActivityTask>, BoxError> {
        let now = unix_millis() as i64;
        let row = sqlx::query(
            r#"
            UPDATE activity_tasks
            SET visible_at = ?, leased_by = ?, deliveries = deliveries + 1
            WHERE task_id = (
                SELECT task_id FROM activity_tasks
                WHERE queue = ? AND visible_at <= ?
                ORDER BY enqueued_at, rowid
                LIMIT 1
            )
            RETURNING task_id, queue, workflow_id, sequence, attempt, activity, input,
                      timeout_ms, retry_policy, deliveries
            "#,
        )
        .bind(now + visibility_timeout.as_millis() as i64)
        .bind(worker_id)
        .bind(queue)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(task_from_row).transpose()
    }

    async fn ack(&self, task_id: &str) -> Result<(), BoxError> {
        sqlx::query("DELETE FROM activity_tasks WHERE task_id = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn nack(&self, task_id: &str, retry_after: Duration) -> Result<(), BoxError> {
        sqlx::query(
            r#"
            UPDATE activity_tasks
            SET attempt = attempt + 1, leased_by = NULL, visible_at = ?
            WHERE task_id = ?
            "#,
        )
        .bind(unix_millis() as i64 + retry_after.as_millis() as i64)
        .bind(task_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
