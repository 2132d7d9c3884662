//! 协调器与Worker之间的RPC消息

use serde::{Deserialize, Serialize};

use crate::entities::{TaskId, WorkerId};
use crate::lifecycle::TaskState;

/// 协调器 → Worker：投递一个任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitTaskRequest {
    pub task_id: TaskId,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitTaskResponse {
    pub accepted: bool,
}

/// 协调器 → Worker：存活探测的应答
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub alive: bool,
    pub worker_id: Option<WorkerId>,
}

/// Worker → 协调器：注册
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterWorkerRequest {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterWorkerResponse {
    pub worker_id: WorkerId,
}

/// Worker → 协调器：任务执行进度
///
/// 里程碑时间由协调器在收到上报时按自身时钟记录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusUpdate {
    pub worker_id: Option<WorkerId>,
    pub status: TaskState,
}

/// Worker池快照中的一项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub worker_id: WorkerId,
    pub address: String,
    pub heartbeat_misses: u8,
}

/// HTTP接口统一的错误应答
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
