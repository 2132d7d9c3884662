//! 协调器组装与运行
//!
//! 关闭顺序：收到信号后先通知心跳与扫描循环退出，不再产生新的投递；监听器随后
//! 停止接受新连接并等待进行中的请求。循环在宽限期内结束（超时则中止）后释放RPC通道。
//! 存储由调用方持有，协调器不负责关闭。

use std::sync::Arc;

use axum::Router;
use futures::future::join_all;
use taskly_core::{CoordinatorConfig, SchedulerError, SchedulerResult};
use taskly_domain::{TaskStore, WorkerConnector};
use taskly_infrastructure::MetricsCollector;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::heartbeat_monitor::HeartbeatMonitor;
use crate::registry::WorkerPool;
use crate::rpc_service::{rpc_router, RpcState};
use crate::task_scanner::TaskScanner;

pub struct Coordinator {
    config: CoordinatorConfig,
    pool: Arc<WorkerPool>,
    store: Arc<dyn TaskStore>,
    metrics: MetricsCollector,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        store: Arc<dyn TaskStore>,
        connector: Arc<dyn WorkerConnector>,
        metrics: MetricsCollector,
    ) -> Self {
        let pool = Arc::new(WorkerPool::new(
            connector,
            config.max_heartbeat_misses,
            metrics.clone(),
        ));

        Self {
            config,
            pool,
            store,
            metrics,
        }
    }

    pub fn pool(&self) -> Arc<WorkerPool> {
        self.pool.clone()
    }

    pub fn router(&self) -> Router {
        rpc_router(RpcState {
            pool: self.pool.clone(),
            store: self.store.clone(),
            metrics: self.metrics.clone(),
        })
    }

    pub fn heartbeat_monitor(&self) -> HeartbeatMonitor {
        HeartbeatMonitor::new(
            self.pool.clone(),
            self.config.heartbeat_interval(),
            self.config.rpc_timeout(),
        )
    }

    pub fn task_scanner(&self) -> TaskScanner {
        TaskScanner::new(
            self.store.clone(),
            self.pool.clone(),
            self.config.scan_interval(),
            self.config.rpc_timeout(),
            self.config.scan_batch_size,
            self.metrics.clone(),
        )
    }

    /// 在 `listener` 上提供RPC服务并运行后台循环，直到收到关闭信号
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> SchedulerResult<()> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| SchedulerError::Internal(format!("读取监听地址失败: {e}")))?;

        let (loops_tx, _) = broadcast::channel::<()>(1);
        let monitor = self.heartbeat_monitor();
        let scanner = self.task_scanner();
        let monitor_rx = loops_tx.subscribe();
        let scanner_rx = loops_tx.subscribe();
        let handles = vec![
            tokio::spawn(async move { monitor.run(monitor_rx).await }),
            tokio::spawn(async move { scanner.run(scanner_rx).await }),
        ];
        let abort_handles: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        info!(%local_addr, "协调器RPC服务已启动");
        let stop_loops = loops_tx.clone();
        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                let _ = stop_loops.send(());
                info!("协调器停止接受新连接");
            })
            .await;

        // 监听器异常退出时循环尚未收到信号
        let _ = loops_tx.send(());
        let grace = self.config.shutdown_grace();
        match tokio::time::timeout(grace, join_all(handles)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        error!(error = %e, "后台循环异常退出");
                    }
                }
            }
            Err(_) => {
                warn!(grace_seconds = grace.as_secs(), "后台循环未在宽限期内结束，强制中止");
                for handle in abort_handles {
                    handle.abort();
                }
            }
        }

        self.pool.clear().await;
        info!("协调器已关闭");

        served.map_err(|e| SchedulerError::Internal(format!("协调器RPC服务异常: {e}")))
    }
}
