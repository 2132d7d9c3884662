use async_trait::async_trait;
use taskly_core::SchedulerResult;

use crate::entities::{TaskId, WorkerId};
use crate::messages::TaskStatusUpdate;

/// Worker一侧到协调器的RPC通道
#[async_trait]
pub trait CoordinatorClient: Send + Sync {
    /// 以 `address` 注册到协调器，返回分配的Worker ID
    async fn register(&self, address: &str) -> SchedulerResult<WorkerId>;

    async fn deregister(&self, worker_id: WorkerId) -> SchedulerResult<()>;

    /// 上报任务进度；`StateViolation` 与 `TaskNotFound` 不可重试
    async fn report_status(&self, task_id: TaskId, update: &TaskStatusUpdate)
        -> SchedulerResult<()>;
}
