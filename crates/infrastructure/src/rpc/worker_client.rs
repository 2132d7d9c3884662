use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use taskly_core::{SchedulerError, SchedulerResult};
use taskly_domain::{
    HeartbeatResponse, SubmitTaskRequest, SubmitTaskResponse, WorkerClient, WorkerConnector,
};
use tracing::{debug, instrument};
use url::Url;

use super::{base_url, http_client, join, map_transport_error};

/// 协调器到单个Worker的RPC通道
pub struct HttpWorkerClient {
    address: String,
    base: Url,
    http_client: reqwest::Client,
}

impl HttpWorkerClient {
    pub fn new(address: &str, timeout: Duration) -> SchedulerResult<Self> {
        Self::with_client(address, http_client(timeout)?)
    }

    fn with_client(address: &str, http_client: reqwest::Client) -> SchedulerResult<Self> {
        Ok(Self {
            address: address.to_string(),
            base: base_url(address)?,
            http_client,
        })
    }
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    fn address(&self) -> &str {
        &self.address
    }

    #[instrument(skip(self, request), fields(worker = %self.address, task_id = %request.task_id))]
    async fn submit_task(&self, request: &SubmitTaskRequest) -> SchedulerResult<SubmitTaskResponse> {
        let url = join(&self.base, "rpc/tasks")?;
        let response = self
            .http_client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| map_transport_error(&self.address, e))?;

        match response.status() {
            status if status.is_success() => {
                let body = response
                    .json::<SubmitTaskResponse>()
                    .await
                    .map_err(|e| map_transport_error(&self.address, e))?;
                debug!(accepted = body.accepted, "任务投递应答");
                Ok(body)
            }
            StatusCode::SERVICE_UNAVAILABLE => Err(SchedulerError::RpcFailure(format!(
                "Worker {} 的任务队列已满",
                self.address
            ))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(SchedulerError::RpcFailure(format!(
                    "Worker {} 拒绝任务: HTTP {status} - {body}",
                    self.address
                )))
            }
        }
    }

    async fn heartbeat(&self) -> SchedulerResult<HeartbeatResponse> {
        let url = join(&self.base, "rpc/heartbeat")?;
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| map_transport_error(&self.address, e))?;

        if !response.status().is_success() {
            return Err(SchedulerError::RpcFailure(format!(
                "Worker {} 心跳应答异常: HTTP {}",
                self.address,
                response.status()
            )));
        }

        response
            .json::<HeartbeatResponse>()
            .await
            .map_err(|e| map_transport_error(&self.address, e))
    }
}

/// 建立到Worker的RPC通道，并通过一次心跳确认其可达
pub struct HttpWorkerConnector {
    http_client: reqwest::Client,
}

impl HttpWorkerConnector {
    pub fn new(timeout: Duration) -> SchedulerResult<Self> {
        Ok(Self {
            http_client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl WorkerConnector for HttpWorkerConnector {
    async fn connect(&self, address: &str) -> SchedulerResult<Arc<dyn WorkerClient>> {
        let client = HttpWorkerClient::with_client(address, self.http_client.clone())?;

        match client.heartbeat().await {
            Ok(response) if response.alive => Ok(Arc::new(client)),
            Ok(_) => Err(SchedulerError::Connection(format!(
                "Worker {address} 报告自身不可用"
            ))),
            Err(e) => Err(SchedulerError::Connection(format!(
                "无法连接Worker {address}: {e}"
            ))),
        }
    }
}
