//! 生命周期里程碑到 `tasks` 表列的映射

use taskly_core::{SchedulerError, SchedulerResult};
use taskly_domain::TaskState;

pub const TASK_COLUMNS: &str =
    "id, command, scheduled_at, picked_at, started_at, completed_at, failed_at";

/// 写入某个里程碑时使用的列，以及保证前置状态成立的条件
pub struct MilestoneUpdate {
    pub column: &'static str,
    pub guard: &'static str,
}

pub fn milestone_update(target: TaskState) -> SchedulerResult<MilestoneUpdate> {
    let update = match target {
        TaskState::Picked => MilestoneUpdate {
            column: "picked_at",
            guard: "picked_at IS NULL",
        },
        TaskState::Started => MilestoneUpdate {
            column: "started_at",
            guard: "picked_at IS NOT NULL AND started_at IS NULL",
        },
        TaskState::Completed => MilestoneUpdate {
            column: "completed_at",
            guard: "started_at IS NOT NULL AND completed_at IS NULL AND failed_at IS NULL",
        },
        TaskState::Failed => MilestoneUpdate {
            column: "failed_at",
            guard: "started_at IS NOT NULL AND completed_at IS NULL AND failed_at IS NULL",
        },
        TaskState::Scheduled => {
            return Err(SchedulerError::Validation(
                "scheduled 是初始状态，不能作为转换目标".to_string(),
            ))
        }
    };
    Ok(update)
}
