//! 任务存储抽象
//!
//! 存储自身负责并发安全（连接池），调用方不需要额外加锁。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use taskly_core::SchedulerResult;

use crate::entities::{Task, TaskId};
use crate::lifecycle::TaskState;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// 插入新任务，返回存储生成的ID
    async fn insert(&self, command: &str, scheduled_at: DateTime<Utc>) -> SchedulerResult<TaskId>;

    async fn get(&self, id: TaskId) -> SchedulerResult<Option<Task>>;

    /// `scheduled_at <= now` 且 `picked_at` 为空的任务，按 `scheduled_at` 升序，
    /// 相同时间按插入顺序
    async fn due_tasks(&self, now: DateTime<Utc>, limit: u32) -> SchedulerResult<Vec<Task>>;

    /// 仅当 `picked_at` 为空时写入；返回 `false` 表示已被其他扫描取走
    async fn mark_picked(&self, id: TaskId, at: DateTime<Utc>) -> SchedulerResult<bool>;

    /// 经状态机校验后写入Worker上报的里程碑，非法转换返回 `StateViolation`
    async fn record_transition(
        &self,
        id: TaskId,
        target: TaskState,
        at: DateTime<Utc>,
    ) -> SchedulerResult<Task>;

    /// 等待进行中的写入完成并关闭连接
    async fn close(&self);
}
