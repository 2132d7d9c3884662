use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use taskly_core::{SchedulerError, SchedulerResult};
use taskly_domain::{
    CoordinatorClient, RegisterWorkerRequest, RegisterWorkerResponse, TaskId, TaskStatusUpdate,
    WorkerId,
};
use tracing::{debug, info, instrument};
use url::Url;

use super::{base_url, http_client, join, map_transport_error};

/// Worker到协调器的RPC通道
pub struct HttpCoordinatorClient {
    coordinator: String,
    base: Url,
    http_client: reqwest::Client,
}

impl HttpCoordinatorClient {
    pub fn new(coordinator_url: &str, timeout: Duration) -> SchedulerResult<Self> {
        Ok(Self {
            coordinator: coordinator_url.to_string(),
            base: base_url(coordinator_url)?,
            http_client: http_client(timeout)?,
        })
    }

    async fn failure(&self, operation: &str, response: reqwest::Response) -> SchedulerError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        SchedulerError::RpcFailure(format!(
            "{operation} 失败 ({}): HTTP {status} - {body}",
            self.coordinator
        ))
    }
}

#[async_trait]
impl CoordinatorClient for HttpCoordinatorClient {
    #[instrument(skip(self))]
    async fn register(&self, address: &str) -> SchedulerResult<WorkerId> {
        let url = join(&self.base, "rpc/workers")?;
        let response = self
            .http_client
            .post(url)
            .json(&RegisterWorkerRequest {
                address: address.to_string(),
            })
            .send()
            .await
            .map_err(|e| map_transport_error(&self.coordinator, e))?;

        if !response.status().is_success() {
            return Err(self.failure("注册Worker", response).await);
        }

        let body = response
            .json::<RegisterWorkerResponse>()
            .await
            .map_err(|e| map_transport_error(&self.coordinator, e))?;
        info!(worker_id = body.worker_id, "已注册到协调器");
        Ok(body.worker_id)
    }

    #[instrument(skip(self))]
    async fn deregister(&self, worker_id: WorkerId) -> SchedulerResult<()> {
        let url = join(&self.base, &format!("rpc/workers/{worker_id}"))?;
        let response = self
            .http_client
            .delete(url)
            .send()
            .await
            .map_err(|e| map_transport_error(&self.coordinator, e))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            // 已被心跳剔除
            StatusCode::NOT_FOUND => {
                debug!(worker_id, "协调器中已无该Worker");
                Ok(())
            }
            _ => Err(self.failure("注销Worker", response).await),
        }
    }

    #[instrument(skip(self, update), fields(status = %update.status))]
    async fn report_status(
        &self,
        task_id: TaskId,
        update: &TaskStatusUpdate,
    ) -> SchedulerResult<()> {
        let url = join(&self.base, &format!("rpc/tasks/{task_id}/status"))?;
        let response = self
            .http_client
            .post(url)
            .json(update)
            .send()
            .await
            .map_err(|e| map_transport_error(&self.coordinator, e))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(SchedulerError::TaskNotFound {
                id: task_id.to_string(),
            }),
            // 远端当前状态未知，只能确定本次转换被拒绝
            StatusCode::CONFLICT => Err(SchedulerError::StateViolation {
                task_id: task_id.to_string(),
                from: "unknown".to_string(),
                to: update.status.to_string(),
            }),
            _ => Err(self.failure("上报任务状态", response).await),
        }
    }
}
