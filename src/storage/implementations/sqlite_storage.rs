use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;

use crate::engine::{ActivityInvocation, ActivityOutcome, WorkflowInstance, WorkflowState};
use crate::error::BoxError;
use crate::storage::{unix_millis, WorkflowStorage};

/// SQLite-backed storage. Holds workflow instances, their activity history
/// and (see `sqlite_queue`) the durable activity task queue.
#[derive(Clone)]
pub struct SqliteStorage {
    pub pool: Pool<Sqlite>,
}

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS workflow_instances (
        workflow_id TEXT PRIMARY KEY,
        run_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        input TEXT NOT NULL,
        state TEXT NOT NULL,
        output TEXT,
        error TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS activity_invocations (
        workflow_id TEXT NOT NULL,
        sequence INTEGER NOT NULL,
        attempt INTEGER NOT NULL,
        activity TEXT NOT NULL,
        input TEXT NOT NULL,
        timeout_ms INTEGER NOT NULL,
        max_attempts INTEGER NOT NULL,
        status TEXT NOT NULL,
        outcome TEXT NOT NULL,
        recorded_at INTEGER NOT NULL,
        PRIMARY KEY (workflow_id, sequence, attempt)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS activity_tasks (
        task_id TEXT PRIMARY KEY,
        queue TEXT NOT NULL,
        workflow_id TEXT NOT NULL,
        sequence INTEGER NOT NULL,
        attempt INTEGER NOT NULL,
        activity TEXT NOT NULL,
        input TEXT NOT NULL,
        timeout_ms INTEGER NOT NULL,
        retry_policy TEXT NOT NULL,
        deliveries INTEGER NOT NULL DEFAULT 0,
        visible_at INTEGER NOT NULL,
        leased_by TEXT,
        enqueued_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_activity_tasks_visible
        ON activity_tasks (queue, visible_at)
    "#,
];

impl SqliteStorage {
    pub async fn new(database_url: &str) -> Result<Self, BoxError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// A private in-memory database. Pinned to a single connection that is
    /// never recycled, since every SQLite connection to `:memory:` is its
    /// own database.
    pub async fn in_memory() -> Result<Self, BoxError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    async fn load_history(&self, workflow_id: &str) -> Result<Vec<ActivityInvocation>, BoxError> {
        let rows = sqlx::query(
            r#"
            SELECT workflow_id, sequence, attempt, activity, input, timeout_ms, max_attempts, outcome
            FROM activity_invocations
            WHERE workflow_id = ?
            ORDER BY sequence, attempt
            "#,
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(invocation_from_row).collect()
    }
}

fn instance_from_row(row: &SqliteRow) -> Result<WorkflowInstance, BoxError> {
    let state: String = row.try_get("state")?;
    let state = WorkflowState::from_str(&state)
        .ok_or_else(|| format!("unknown workflow state '{}'", state))?;
    let created_at: i64 = row.try_get("created_at")?;
    let updated_at: i64 = row.try_get("updated_at")?;
    Ok(WorkflowInstance {
        workflow_id: row.try_get("workflow_id")?,
        run_id: row.try_get("run_id")?,
        kind: row.try_get("kind")?,
        input: row.try_get("input")?,
        state,
        output: row.try_get("output")?,
        error: row.try_get("error")?,
        history: Vec::new(),
        created_at_ms: created_at as u64,
        updated_at_ms: updated_at as u64,
    })
}

fn invocation_from_row(row: &SqliteRow) -> Result<ActivityInvocation, BoxError> {
    let sequence: i64 = row.try_get("sequence")?;
    let attempt: i64 = row.try_get("attempt")?;
    let timeout_ms: i64 = row.try_get("timeout_ms")?;
    let max_attempts: i64 = row.try_get("max_attempts")?;
    let outcome: String = row.try_get("outcome")?;
    Ok(ActivityInvocation {
        workflow_id: row.try_get("workflow_id")?,
        sequence: sequence as u32,
        attempt: attempt as u32,
        activity: row.try_get("activity")?,
        input: row.try_get("input")?,
        timeout: Duration::from_millis(timeout_ms as u64),
        max_attempts: max_attempts as u32,
        outcome: serde_json::from_str::<ActivityOutcome>(&outcome)?,
    })
}

#[async_trait]
impl WorkflowStorage for SqliteStorage {
    async fn init(&self) -> Result<(), BoxError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn create_instance(&self, instance: &WorkflowInstance) -> Result<(), BoxError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_instances
                (workflow_id, run_id, kind, input, state, output, error, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&instance.workflow_id)
        .bind(&instance.run_id)
        .bind(&instance.kind)
        .bind(&instance.input)
        .bind(instance.state.as_str())
        .bind(instance.output.as_deref())
        .bind(instance.error.as_deref())
        .bind(instance.created_at_ms as i64)
        .bind(instance.updated_at_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_instance(&self, workflow_id: &str) -> Result<Option<WorkflowInstance>, BoxError> {
        let row = sqlx::query("SELECT * FROM workflow_instances WHERE workflow_id = ?")
            .bind(workflow_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let mut instance = instance_from_row(&row)?;
                instance.history = self.load_history(workflow_id).await?;
                Ok(Some(instance))
            }
            None => Ok(None),
        }
    }

    async fn update_state(
        &self,
        workflow_id: &str,
        state: WorkflowState,
        output: Option<&str>,
        error: Option<&str>,
    ) -> Result<bool, BoxError> {
        let allowed = WorkflowState::predecessors(state);
        if allowed.is_empty() {
            return Ok(false);
        }
        let placeholders = vec!["?"; allowed.len()].join(", ");
        let sql = format!(
            r#"
            UPDATE workflow_instances
            SET state = ?, output = COALESCE(?, output), error = COALESCE(?, error), updated_at = ?
            WHERE workflow_id = ? AND state IN ({})
            "#,
            placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(state.as_str())
            .bind(output)
            .bind(error)
            .bind(unix_millis() as i64)
            .bind(workflow_id);
        for from in allowed {
            query = query.bind(from.as_str());
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_unfinished(&self) -> Result<Vec<WorkflowInstance>, BoxError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM workflow_instances
            WHERE state IN ('scheduled', 'running')
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut instances = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut instance = instance_from_row(row)?;
            instance.history = self.load_history(&instance.workflow_id).await?;
            instances.push(instance);
        }
        Ok(instances)
    }

    async fn record_scheduled(&self, invocation: &ActivityInvocation) -> Result<(), BoxError> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO activity_invocations
                (workflow_id, sequence, attempt, activity, input, timeout_ms, max_attempts,
                 status, outcome, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&invocation.workflow_id)
        .bind(invocation.sequence as i64)
        .bind(invocation.attempt as i64)
        .bind(&invocation.activity)
        .bind(&invocation.input)
        .bind(invocation.timeout.as_millis() as i64)
        .bind(invocation.max_attempts as i64)
        .bind(invocation.outcome.status_str())
        .bind(serde_json::to_string(&invocation.outcome)?)
        .bind(unix_millis() as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_outcome(&self, invocation: &ActivityInvocation) -> Result<bool, BoxError> {
        let result = sqlx::query(
            r#"
            INSERT INTO activity_invocations
                (workflow_id, sequence, attempt, activity, input, timeout_ms, max_attempts,
                 status, outcome, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (workflow_id, sequence, attempt) DO UPDATE
            SET status = excluded.status,
                outcome = excluded.outcome,
                recorded_at = excluded.recorded_at
            WHERE activity_invocations.status = 'pending'
            "#,
        )
        .bind(&invocation.workflow_id)
        .bind(invocation.sequence as i64)
        .bind(invocation.attempt as i64)
        .bind(&invocation.activity)
        .bind(&invocation.input)
        .bind(invocation.timeout.as_millis() as i64)
        .bind(invocation.max_attempts as i64)
        .bind(invocation.outcome.status_str())
        .bind(serde_json::to_string(&invocation.outcome)?)
        .bind(unix_millis() as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn call_history(
        &self,
        workflow_id: &str,
        sequence: u32,
    ) -> Result<Vec<ActivityInvocation>, BoxError> {
        let rows = sqlx::query(
            r#"
            SELECT workflow_id, sequence, attempt, activity, input, timeout_ms, max_attempts, outcome
            FROM activity_invocations
            WHERE workflow_id = ? AND sequence = ?
            ORDER BY attempt
            "#,
        )
        .bind(workflow_id)
        .bind(sequence as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(invocation_from_row).collect()
    }
}
