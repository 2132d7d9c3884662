use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskly_core::{SchedulerError, SchedulerResult};
use uuid::Uuid;

use crate::lifecycle::{validate_transition, TaskState};

/// 任务ID，由存储在插入时生成
pub type TaskId = Uuid;

/// Worker在协调器中的注册ID，注册期间保持不变
pub type WorkerId = u32;

/// 一次待执行的命令及其生命周期时间戳
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub command: String,
    pub scheduled_at: DateTime<Utc>,
    pub picked_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// 新提交的任务只有 `scheduled_at`
    pub fn new(id: TaskId, command: String, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            id,
            command,
            scheduled_at,
            picked_at: None,
            started_at: None,
            completed_at: None,
            failed_at: None,
        }
    }

    /// 由已写入的时间戳推导当前状态
    pub fn state(&self) -> TaskState {
        if self.completed_at.is_some() {
            TaskState::Completed
        } else if self.failed_at.is_some() {
            TaskState::Failed
        } else if self.started_at.is_some() {
            TaskState::Started
        } else if self.picked_at.is_some() {
            TaskState::Picked
        } else {
            TaskState::Scheduled
        }
    }

    /// 到期且尚未被取走
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.picked_at.is_none() && self.scheduled_at <= now
    }

    /// 最近一个已写入里程碑的时间
    pub fn latest_milestone(&self) -> DateTime<Utc> {
        self.completed_at
            .or(self.failed_at)
            .or(self.started_at)
            .or(self.picked_at)
            .unwrap_or(self.scheduled_at)
    }

    pub fn timestamp_of(&self, state: TaskState) -> Option<DateTime<Utc>> {
        match state {
            TaskState::Scheduled => Some(self.scheduled_at),
            TaskState::Picked => self.picked_at,
            TaskState::Started => self.started_at,
            TaskState::Completed => self.completed_at,
            TaskState::Failed => self.failed_at,
        }
    }

    /// 经状态机校验后写入目标状态的时间戳
    pub fn apply(&mut self, target: TaskState, at: DateTime<Utc>) -> SchedulerResult<()> {
        validate_transition(self, target, at)?;

        match target {
            TaskState::Picked => self.picked_at = Some(at),
            TaskState::Started => self.started_at = Some(at),
            TaskState::Completed => self.completed_at = Some(at),
            TaskState::Failed => self.failed_at = Some(at),
            TaskState::Scheduled => unreachable!("Scheduled没有入边"),
        }

        Ok(())
    }

    /// 检查时间戳单调且终态互斥，存储适配器读出每一行时调用
    pub fn check_invariants(&self) -> SchedulerResult<()> {
        let invalid = |message: &str| {
            Err(SchedulerError::Internal(format!(
                "任务 {} 的时间戳不一致: {message}",
                self.id
            )))
        };

        if self.completed_at.is_some() && self.failed_at.is_some() {
            return invalid("completed_at 与 failed_at 同时存在");
        }

        let chain = [
            Some(self.scheduled_at),
            self.picked_at,
            self.started_at,
            self.completed_at.or(self.failed_at),
        ];

        let mut previous = self.scheduled_at;
        let mut gap = false;
        for timestamp in chain.iter().skip(1) {
            match timestamp {
                Some(ts) if gap => {
                    return invalid(&format!("{ts} 之前存在缺失的里程碑"));
                }
                Some(ts) if *ts < previous => {
                    return invalid("时间戳非单调");
                }
                Some(ts) => previous = *ts,
                None => gap = true,
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn task_at(at: DateTime<Utc>) -> Task {
        Task::new(Uuid::new_v4(), "echo hi".to_string(), at)
    }

    #[test]
    fn test_new_task_is_scheduled() {
        let task = task_at(Utc::now());
        assert_eq!(task.state(), TaskState::Scheduled);
        assert!(task.check_invariants().is_ok());
    }

    #[test]
    fn test_full_successful_lifecycle() {
        let t0 = Utc::now();
        let mut task = task_at(t0);

        task.apply(TaskState::Picked, t0 + Duration::seconds(1)).unwrap();
        task.apply(TaskState::Started, t0 + Duration::seconds(2)).unwrap();
        task.apply(TaskState::Completed, t0 + Duration::seconds(3)).unwrap();

        assert_eq!(task.state(), TaskState::Completed);
        assert!(task.check_invariants().is_ok());
        assert!(task.failed_at.is_none());
    }

    #[test]
    fn test_terminal_state_is_final() {
        let t0 = Utc::now();
        let mut task = task_at(t0);
        task.apply(TaskState::Picked, t0).unwrap();
        task.apply(TaskState::Started, t0).unwrap();
        task.apply(TaskState::Failed, t0).unwrap();

        let err = task.apply(TaskState::Completed, t0).unwrap_err();
        assert!(matches!(err, SchedulerError::StateViolation { .. }));
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_rejected_transition_leaves_task_untouched() {
        let t0 = Utc::now();
        let mut task = task_at(t0);
        let before = task.clone();

        assert!(task.apply(TaskState::Completed, t0).is_err());
        assert_eq!(task, before);
    }

    #[test]
    fn test_due_check() {
        let now = Utc::now();
        let future = task_at(now + Duration::seconds(30));
        assert!(!future.is_due(now));

        let mut past = task_at(now - Duration::seconds(30));
        assert!(past.is_due(now));
        past.apply(TaskState::Picked, now).unwrap();
        assert!(!past.is_due(now));
    }

    #[test]
    fn test_invariants_detect_both_terminals() {
        let t0 = Utc::now();
        let mut task = task_at(t0);
        task.picked_at = Some(t0);
        task.started_at = Some(t0);
        task.completed_at = Some(t0);
        task.failed_at = Some(t0);
        assert!(task.check_invariants().is_err());
    }

    #[test]
    fn test_invariants_detect_gap_and_regression() {
        let t0 = Utc::now();
        let mut gap = task_at(t0);
        gap.started_at = Some(t0);
        assert!(gap.check_invariants().is_err());

        let mut regression = task_at(t0);
        regression.picked_at = Some(t0 - Duration::seconds(5));
        assert!(regression.check_invariants().is_err());
    }
}
