use std::sync::Arc;

use axum::Router;
use taskly_core::{ApiConfig, SchedulerError, SchedulerResult};
use taskly_domain::TaskStore;
use taskly_infrastructure::MetricsCollector;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

use crate::routes::{create_routes, AppState};

pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    pub fn new(config: &ApiConfig, store: Arc<dyn TaskStore>, metrics: MetricsCollector) -> Self {
        Self {
            state: AppState {
                store,
                metrics,
                request_timeout: config.request_timeout(),
            },
        }
    }

    pub fn router(&self) -> Router {
        create_routes(self.state.clone())
    }

    /// 提供服务直到收到关闭信号，进行中的请求会被处理完
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> SchedulerResult<()> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| SchedulerError::Internal(format!("读取监听地址失败: {e}")))?;
        info!(%local_addr, "任务提交服务已启动");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("任务提交服务停止接受新连接");
            })
            .await
            .map_err(|e| SchedulerError::Internal(format!("任务提交服务异常: {e}")))
    }
}
