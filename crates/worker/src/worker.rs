//! Worker进程组装与运行
//!
//! 启动顺序：先监听，再注册。关闭顺序：停止注册循环并注销，
//! 停止接受新连接，关闭任务队列，在宽限期内等待执行中的任务结束（超时则中止）。

use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::time::Duration;

use taskly_core::{SchedulerError, SchedulerResult, WorkerConfig};
use taskly_domain::CoordinatorClient;
use taskly_infrastructure::MetricsCollector;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::executor::TaskExecutor;
use crate::pool::ExecutorPool;
use crate::registration::RegistrationKeeper;
use crate::reporter::StatusReporter;
use crate::service::{worker_router, WorkerService};

const REPORT_BASE_DELAY: Duration = Duration::from_millis(200);
const REGISTER_RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct Worker {
    config: WorkerConfig,
    coordinator: Arc<dyn CoordinatorClient>,
    executor: Arc<dyn TaskExecutor>,
    metrics: MetricsCollector,
}

impl Worker {
    pub fn new(
        config: WorkerConfig,
        coordinator: Arc<dyn CoordinatorClient>,
        executor: Arc<dyn TaskExecutor>,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            config,
            coordinator,
            executor,
            metrics,
        }
    }

    /// 在 `listener` 上提供RPC服务，以 `advertise_address` 注册到协调器，直到收到关闭信号
    pub async fn serve(
        self,
        listener: TcpListener,
        advertise_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> SchedulerResult<()> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| SchedulerError::Internal(format!("读取监听地址失败: {e}")))?;

        let worker_id = Arc::new(AtomicU32::new(0));
        let (service, receiver) = WorkerService::new(
            self.config.queue_capacity,
            worker_id.clone(),
            self.metrics.clone(),
        );

        let reporter = Arc::new(StatusReporter::new(
            self.coordinator.clone(),
            worker_id.clone(),
            self.config.status_report_retries,
            REPORT_BASE_DELAY,
        ));
        let mut executors = ExecutorPool::new(
            receiver,
            self.executor.clone(),
            reporter,
            self.metrics.clone(),
        )
        .spawn(self.config.pool_size);

        let keeper = Arc::new(RegistrationKeeper::new(
            self.coordinator.clone(),
            service.clone(),
            worker_id,
            advertise_address.clone(),
            self.config.reregister_after(),
            REGISTER_RETRY_DELAY,
        ));
        let (keeper_tx, keeper_rx) = broadcast::channel::<()>(1);
        let keeper_handle = {
            let keeper = keeper.clone();
            tokio::spawn(async move { keeper.run(keeper_rx).await })
        };

        info!(
            %local_addr,
            %advertise_address,
            pool_size = self.config.pool_size,
            queue_capacity = self.config.queue_capacity,
            "Worker RPC服务已启动"
        );

        let served = axum::serve(listener, worker_router(service.clone()))
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Worker收到关闭信号");
                let _ = keeper_tx.send(());
                if let Err(e) = keeper_handle.await {
                    error!(error = %e, "注册循环异常退出");
                }
                keeper.deregister().await;
            })
            .await;

        service.close().await;
        let grace = self.config.shutdown_grace();
        let drained = tokio::time::timeout(grace, async {
            while let Some(result) = executors.join_next().await {
                if let Err(e) = result {
                    error!(error = %e, "执行协程异常退出");
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(grace_seconds = grace.as_secs(), "执行中的任务未在宽限期内结束，强制中止");
            executors.abort_all();
        }

        info!("Worker已关闭");
        served.map_err(|e| SchedulerError::Internal(format!("Worker RPC服务异常: {e}")))
    }
}

/// 协调器回连使用的地址：优先取配置，否则由主机名和实际监听端口推导
pub fn advertise_address(config: &WorkerConfig, port: u16) -> SchedulerResult<String> {
    if let Some(address) = &config.advertise_address {
        return Ok(address.clone());
    }

    let host = hostname::get()
        .map_err(|e| SchedulerError::Configuration(format!("读取主机名失败: {e}")))?
        .into_string()
        .map_err(|_| SchedulerError::Configuration("主机名不是合法的UTF-8".to_string()))?;
    Ok(format!("http://{host}:{port}"))
}
