use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use taskly_core::{SchedulerError, SchedulerResult};
use taskly_domain::{Task, TaskId, TaskState, TaskStore};
use tracing::{debug, instrument, warn};

use crate::database::milestones::{milestone_update, TASK_COLUMNS};

/// `seq` 记录插入顺序，同一时刻到期的任务按它排序
pub async fn ensure_schema(pool: &PgPool) -> SchedulerResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            seq BIGSERIAL NOT NULL,
            command TEXT NOT NULL,
            scheduled_at TIMESTAMPTZ NOT NULL,
            picked_at TIMESTAMPTZ,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            failed_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks (scheduled_at, seq) WHERE picked_at IS NULL",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub struct PostgresTaskStore {
    pool: PgPool,
}

impl PostgresTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::postgres::PgRow) -> SchedulerResult<Task> {
        let task = Task {
            id: row.try_get("id")?,
            command: row.try_get("command")?,
            scheduled_at: row.try_get("scheduled_at")?,
            picked_at: row.try_get("picked_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            failed_at: row.try_get("failed_at")?,
        };
        task.check_invariants()?;
        Ok(task)
    }
}

#[async_trait]
impl TaskStore for PostgresTaskStore {
    #[instrument(skip(self, command))]
    async fn insert(&self, command: &str, scheduled_at: DateTime<Utc>) -> SchedulerResult<TaskId> {
        let row = sqlx::query("INSERT INTO tasks (command, scheduled_at) VALUES ($1, $2) RETURNING id")
            .bind(command)
            .bind(scheduled_at)
            .fetch_one(&self.pool)
            .await?;

        let id: TaskId = row.try_get("id")?;
        debug!(task_id = %id, "任务已写入");
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: TaskId) -> SchedulerResult<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    #[instrument(skip(self))]
    async fn due_tasks(&self, now: DateTime<Utc>, limit: u32) -> SchedulerResult<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE picked_at IS NULL AND scheduled_at <= $1 \
             ORDER BY scheduled_at, seq LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_task).collect()
    }

    #[instrument(skip(self))]
    async fn mark_picked(&self, id: TaskId, at: DateTime<Utc>) -> SchedulerResult<bool> {
        let result =
            sqlx::query("UPDATE tasks SET picked_at = $2 WHERE id = $1 AND picked_at IS NULL")
                .bind(id)
                .bind(at)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn record_transition(
        &self,
        id: TaskId,
        target: TaskState,
        at: DateTime<Utc>,
    ) -> SchedulerResult<Task> {
        let mut task = self
            .get(id)
            .await?
            .ok_or_else(|| SchedulerError::TaskNotFound { id: id.to_string() })?;
        task.apply(target, at)?;

        let update = milestone_update(target)?;
        let sql = format!(
            "UPDATE tasks SET {} = $2 WHERE id = $1 AND {}",
            update.column, update.guard
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            // 读取与写入之间被并发的上报抢先
            let current = self.get(id).await?.map(|t| t.state());
            warn!(task_id = %id, target = %target, ?current, "条件更新未命中");
            return Err(SchedulerError::StateViolation {
                task_id: id.to_string(),
                from: current.map(|s| s.to_string()).unwrap_or_default(),
                to: target.to_string(),
            });
        }

        Ok(task)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
