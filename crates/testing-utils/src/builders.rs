//! 测试数据构造器

use chrono::{DateTime, Duration, Utc};
use taskly_domain::{Task, TaskId};
use uuid::Uuid;

/// 按生命周期逐步填充时间戳的 [`Task`] 构造器
///
/// 各里程碑默认在前一个时间点之后一秒，保证时间戳单调。
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            task: Task::new(Uuid::new_v4(), "echo hi".to_string(), Utc::now()),
        }
    }

    pub fn with_id(mut self, id: TaskId) -> Self {
        self.task.id = id;
        self
    }

    pub fn with_command(mut self, command: &str) -> Self {
        self.task.command = command.to_string();
        self
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.task.scheduled_at = at;
        self
    }

    pub fn picked(mut self) -> Self {
        self.task.picked_at = Some(self.task.latest_milestone() + Duration::seconds(1));
        self
    }

    pub fn started(mut self) -> Self {
        if self.task.picked_at.is_none() {
            self = self.picked();
        }
        self.task.started_at = Some(self.task.latest_milestone() + Duration::seconds(1));
        self
    }

    pub fn completed(mut self) -> Self {
        if self.task.started_at.is_none() {
            self = self.started();
        }
        self.task.completed_at = Some(self.task.latest_milestone() + Duration::seconds(1));
        self
    }

    pub fn failed(mut self) -> Self {
        if self.task.started_at.is_none() {
            self = self.started();
        }
        self.task.failed_at = Some(self.task.latest_milestone() + Duration::seconds(1));
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}
