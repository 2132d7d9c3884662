//! 嵌入式SQLite任务存储，用于单机部署与测试
//!
//! 时间以固定宽度的RFC3339文本（微秒，`Z` 后缀）保存，保证按文本比较即按时间比较。
//! UUID由应用生成并以文本保存，同一时刻到期的任务按 `rowid` 排序。

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};
use taskly_core::{SchedulerError, SchedulerResult};
use taskly_domain::{Task, TaskId, TaskState, TaskStore};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::database::milestones::{milestone_update, TASK_COLUMNS};

pub async fn ensure_schema(pool: &SqlitePool) -> SchedulerResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY NOT NULL,
            command TEXT NOT NULL,
            scheduled_at TEXT NOT NULL,
            picked_at TEXT,
            started_at TEXT,
            completed_at TEXT,
            failed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks (picked_at, scheduled_at)")
        .execute(pool)
        .await?;

    Ok(())
}

fn encode_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(value: &str) -> SchedulerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SchedulerError::Serialization(format!("无效的时间值 {value}: {e}")))
}

fn decode_optional_time(value: Option<String>) -> SchedulerResult<Option<DateTime<Utc>>> {
    value.as_deref().map(decode_time).transpose()
}

pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<Task> {
        let id: String = row.try_get("id")?;
        let scheduled_at: String = row.try_get("scheduled_at")?;

        let task = Task {
            id: Uuid::parse_str(&id)
                .map_err(|e| SchedulerError::Serialization(format!("无效的任务ID {id}: {e}")))?,
            command: row.try_get("command")?,
            scheduled_at: decode_time(&scheduled_at)?,
            picked_at: decode_optional_time(row.try_get("picked_at")?)?,
            started_at: decode_optional_time(row.try_get("started_at")?)?,
            completed_at: decode_optional_time(row.try_get("completed_at")?)?,
            failed_at: decode_optional_time(row.try_get("failed_at")?)?,
        };
        task.check_invariants()?;
        Ok(task)
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    #[instrument(skip(self, command))]
    async fn insert(&self, command: &str, scheduled_at: DateTime<Utc>) -> SchedulerResult<TaskId> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO tasks (id, command, scheduled_at) VALUES (?, ?, ?)")
            .bind(id.to_string())
            .bind(command)
            .bind(encode_time(scheduled_at))
            .execute(&self.pool)
            .await?;

        debug!(task_id = %id, "任务已写入");
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: TaskId) -> SchedulerResult<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    #[instrument(skip(self))]
    async fn due_tasks(&self, now: DateTime<Utc>, limit: u32) -> SchedulerResult<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE picked_at IS NULL AND scheduled_at <= ? \
             ORDER BY scheduled_at, rowid LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(encode_time(now))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_task).collect()
    }

    #[instrument(skip(self))]
    async fn mark_picked(&self, id: TaskId, at: DateTime<Utc>) -> SchedulerResult<bool> {
        let result = sqlx::query("UPDATE tasks SET picked_at = ? WHERE id = ? AND picked_at IS NULL")
            .bind(encode_time(at))
            .bind(id.to_string())
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
            "UPDATE tasks SET {} = ? WHERE id = ? AND {}",
            update.column, update.guard
        );
        let result = sqlx::query(&sql)
            .bind(encode_time(at))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteTaskStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        ensure_schema(&pool).await.unwrap();
        SqliteTaskStore::new(pool)
    }

    #[test]
    fn test_encoded_times_sort_chronologically() {
        let base = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = base + Duration::milliseconds(500);
        assert!(encode_time(base) < encode_time(later));
        assert_eq!(decode_time(&encode_time(later)).unwrap(), later);
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = store().await;
        let at = Utc::now();
        let id = store.insert("echo hi", at).await.unwrap();

        let task = store.get(id).await.unwrap().unwrap();
        assert_eq!(task.command, "echo hi");
        assert_eq!(task.state(), TaskState::Scheduled);
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_due_tasks_ordering_and_filter() {
        let store = store().await;
        let now = Utc::now();
        let late = store.insert("late", now - Duration::seconds(10)).await.unwrap();
        let early = store.insert("early", now - Duration::seconds(60)).await.unwrap();
        let tie = store.insert("tie", now - Duration::seconds(10)).await.unwrap();
        store.insert("future", now + Duration::seconds(60)).await.unwrap();

        let due: Vec<TaskId> = store
            .due_tasks(now, 100)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(due, vec![early, late, tie]);

        let limited = store.due_tasks(now, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, early);
    }

    #[tokio::test]
    async fn test_mark_picked_only_once() {
        let store = store().await;
        let now = Utc::now();
        let id = store.insert("echo hi", now).await.unwrap();

        assert!(store.mark_picked(id, now).await.unwrap());
        assert!(!store.mark_picked(id, now).await.unwrap());
        assert!(store.due_tasks(now, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_transition_enforces_lifecycle() {
        let store = store().await;
        let now = Utc::now();
        let id = store.insert("echo hi", now).await.unwrap();

        let err = store
            .record_transition(id, TaskState::Started, now)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::StateViolation { .. }));

        store.mark_picked(id, now).await.unwrap();
        store
            .record_transition(id, TaskState::Started, now + Duration::seconds(1))
            .await
            .unwrap();
        let task = store
            .record_transition(id, TaskState::Completed, now + Duration::seconds(2))
            .await
            .unwrap();
        assert_eq!(task.state(), TaskState::Completed);

        let err = store
            .record_transition(id, TaskState::Failed, now + Duration::seconds(3))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::StateViolation { .. }));

        let stored = store.get(id).await.unwrap().unwrap();
        assert!(stored.failed_at.is_none());
        assert!(stored.check_invariants().is_ok());
    }

    #[tokio::test]
    async fn test_get_rejects_inconsistent_row() {
        let store = store().await;
        let now = Utc::now();
        let id = store.insert("echo hi", now).await.unwrap();
        sqlx::query("UPDATE tasks SET completed_at = ? WHERE id = ?")
            .bind(encode_time(now + Duration::seconds(1)))
            .bind(id.to_string())
            .execute(&store.pool)
            .await
            .unwrap();

        let err = store.get(id).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Internal(_)));
    }

    #[tokio::test]
    async fn test_record_transition_unknown_task() {
        let store = store().await;
        let err = store
            .record_transition(Uuid::new_v4(), TaskState::Started, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::TaskNotFound { .. }));
    }
}
