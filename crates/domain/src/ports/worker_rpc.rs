use std::sync::Arc;

use async_trait::async_trait;
use taskly_core::SchedulerResult;

use crate::messages::{HeartbeatResponse, SubmitTaskRequest, SubmitTaskResponse};

/// 到单个Worker的RPC通道
///
/// 实现需要自行限定每次调用的超时，超时返回 `RpcTimeout`，
/// 其它网络错误或非成功应答返回 `RpcFailure`。
#[async_trait]
pub trait WorkerClient: Send + Sync {
    fn address(&self) -> &str;

    async fn submit_task(&self, request: &SubmitTaskRequest) -> SchedulerResult<SubmitTaskResponse>;

    async fn heartbeat(&self) -> SchedulerResult<HeartbeatResponse>;
}

/// 按地址建立RPC通道，无法建立时返回 `Connection`
#[async_trait]
pub trait WorkerConnector: Send + Sync {
    async fn connect(&self, address: &str) -> SchedulerResult<Arc<dyn WorkerClient>>;
}
