//! 任务生命周期状态机
//!
//! 状态只能严格向前推进，不存在回退或循环：
//!
//! ```text
//! Scheduled ──▶ Picked ──▶ Started ──┬──▶ Completed
//!                                    └──▶ Failed
//! ```
//!
//! 每个状态对应任务表中的一个时间戳列，时间戳只写一次且单调不减。
//! `Scheduled → Picked` 由协调器的扫描器在RPC投递成功后写入，
//! 之后的状态由Worker上报。

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskly_core::{SchedulerError, SchedulerResult};

use crate::entities::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Scheduled,
    Picked,
    Started,
    Completed,
    Failed,
}

/// 状态转换的责任方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOwner {
    Dispatcher,
    Worker,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Scheduled => "scheduled",
            TaskState::Picked => "picked",
            TaskState::Started => "started",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    /// 只允许相邻的前向转换
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Scheduled, TaskState::Picked)
                | (TaskState::Picked, TaskState::Started)
                | (TaskState::Started, TaskState::Completed)
                | (TaskState::Started, TaskState::Failed)
        )
    }

    /// 进入该状态的转换由谁负责，`Scheduled` 是初始状态，没有责任方
    pub fn owner(&self) -> Option<TransitionOwner> {
        match self {
            TaskState::Scheduled => None,
            TaskState::Picked => Some(TransitionOwner::Dispatcher),
            TaskState::Started | TaskState::Completed | TaskState::Failed => {
                Some(TransitionOwner::Worker)
            }
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scheduled" => Ok(TaskState::Scheduled),
            "picked" => Ok(TaskState::Picked),
            "started" => Ok(TaskState::Started),
            "completed" => Ok(TaskState::Completed),
            "failed" => Ok(TaskState::Failed),
            other => Err(SchedulerError::Validation(format!("未知的任务状态: {other}"))),
        }
    }
}

/// 校验把 `task` 推进到 `target` 状态、并把时间戳记为 `at` 是否合法
///
/// 非法的转换或早于上一个里程碑的时间戳都返回 `StateViolation`，不做任何修正。
pub fn validate_transition(
    task: &Task,
    target: TaskState,
    at: DateTime<Utc>,
) -> SchedulerResult<()> {
    let current = task.state();
    let violation = || SchedulerError::StateViolation {
        task_id: task.id.to_string(),
        from: current.to_string(),
        to: target.to_string(),
    };

    if !current.can_transition_to(target) {
        return Err(violation());
    }

    if at < task.latest_milestone() {
        return Err(violation());
    }

    Ok(())
}
