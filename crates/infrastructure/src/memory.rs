use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use taskly_core::{SchedulerError, SchedulerResult};
use taskly_domain::{Task, TaskId, TaskState, TaskStore};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// 内存任务存储
///
/// 不落盘，进程退出即丢失，适用于测试与单进程演示。
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    state: RwLock<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tasks: HashMap<TaskId, Task>,
    /// 插入顺序
    order: Vec<TaskId>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, command: &str, scheduled_at: DateTime<Utc>) -> SchedulerResult<TaskId> {
        let id = Uuid::new_v4();
        let mut state = self.state.write().await;
        state
            .tasks
            .insert(id, Task::new(id, command.to_string(), scheduled_at));
        state.order.push(id);

        debug!(task_id = %id, "任务已写入内存存储");
        Ok(id)
    }

    async fn get(&self, id: TaskId) -> SchedulerResult<Option<Task>> {
        Ok(self.state.read().await.tasks.get(&id).cloned())
    }

    async fn due_tasks(&self, now: DateTime<Utc>, limit: u32) -> SchedulerResult<Vec<Task>> {
        let state = self.state.read().await;
        let mut due: Vec<(usize, &Task)> = state
            .order
            .iter()
            .enumerate()
            .filter_map(|(position, id)| state.tasks.get(id).map(|task| (position, task)))
            .filter(|(_, task)| task.is_due(now))
            .collect();
        due.sort_by_key(|(position, task)| (task.scheduled_at, *position));

        Ok(due
            .into_iter()
            .take(limit as usize)
            .map(|(_, task)| task.clone())
            .collect())
    }

    async fn mark_picked(&self, id: TaskId, at: DateTime<Utc>) -> SchedulerResult<bool> {
        let mut state = self.state.write().await;
        match state.tasks.get_mut(&id) {
            Some(task) if task.picked_at.is_none() => {
                task.picked_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_transition(
        &self,
        id: TaskId,
        target: TaskState,
        at: DateTime<Utc>,
    ) -> SchedulerResult<Task> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get_mut(&id)
            .ok_or_else(|| SchedulerError::TaskNotFound { id: id.to_string() })?;

        task.apply(target, at)?;
        Ok(task.clone())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_due_tasks_in_schedule_then_insertion_order() {
        let store = InMemoryTaskStore::new();
        let now = Utc::now();
        let a = store.insert("a", now - Duration::seconds(5)).await.unwrap();
        let b = store.insert("b", now - Duration::seconds(30)).await.unwrap();
        let c = store.insert("c", now - Duration::seconds(5)).await.unwrap();
        store.insert("d", now + Duration::seconds(5)).await.unwrap();

        let due: Vec<TaskId> = store
            .due_tasks(now, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(due, vec![b, a, c]);
    }

    #[tokio::test]
    async fn test_mark_picked_is_conditional() {
        let store = InMemoryTaskStore::new();
        let now = Utc::now();
        let id = store.insert("echo hi", now).await.unwrap();

        assert!(store.mark_picked(id, now).await.unwrap());
        assert!(!store.mark_picked(id, now).await.unwrap());
        assert!(!store.mark_picked(Uuid::new_v4(), now).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejected_transition_is_not_persisted() {
        let store = InMemoryTaskStore::new();
        let now = Utc::now();
        let id = store.insert("echo hi", now).await.unwrap();

        assert!(store
            .record_transition(id, TaskState::Completed, now)
            .await
            .is_err());
        let task = store.get(id).await.unwrap().unwrap();
        assert_eq!(task.state(), TaskState::Scheduled);
    }
}
