//! 按运行模式组装协调器、任务提交服务与Worker

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use taskly_api::ApiServer;
use taskly_core::AppConfig;
use taskly_dispatcher::Coordinator;
use taskly_domain::TaskStore;
use taskly_infrastructure::{
    DatabasePool, HttpCoordinatorClient, HttpWorkerConnector, MetricsCollector,
};
use taskly_worker::{advertise_address, ShellExecutor, Worker};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// Worker池、心跳检测与任务投递
    Coordinator,
    /// 任务提交HTTP服务
    Scheduler,
    Worker,
    /// 单进程内运行全部组件
    All,
}

impl FromStr for AppMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "coordinator" => Ok(AppMode::Coordinator),
            "scheduler" => Ok(AppMode::Scheduler),
            "worker" => Ok(AppMode::Worker),
            "all" => Ok(AppMode::All),
            _ => Err(anyhow::anyhow!("不支持的运行模式: {s}")),
        }
    }
}

impl AppMode {
    fn needs_store(&self) -> bool {
        !matches!(self, AppMode::Worker)
    }
}

/// 命令行对配置的覆盖
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub coordinator_port: Option<u16>,
    pub scheduler_port: Option<u16>,
    pub worker_port: Option<u16>,
    pub coordinator: Option<String>,
}

impl CliOverrides {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(port) = self.coordinator_port {
            config.coordinator.bind_address = format!("0.0.0.0:{port}");
        }
        if let Some(port) = self.scheduler_port {
            config.api.bind_address = format!("0.0.0.0:{port}");
        }
        if let Some(port) = self.worker_port {
            config.worker.bind_address = format!("0.0.0.0:{port}");
        }
        if let Some(coordinator) = &self.coordinator {
            config.worker.coordinator_url = if coordinator.contains("://") {
                coordinator.clone()
            } else {
                format!("http://{coordinator}")
            };
        }
    }
}

/// 端口部分，供单进程模式下Worker回连本机协调器
fn port_of(bind_address: &str) -> Option<u16> {
    bind_address.rsplit(':').next()?.parse().ok()
}

pub struct Application {
    config: AppConfig,
    mode: AppMode,
    metrics: MetricsCollector,
}

impl Application {
    pub fn new(mut config: AppConfig, mode: AppMode) -> Result<Self> {
        if mode == AppMode::All {
            if config.worker.bind_address.is_empty() {
                config.worker.bind_address = "127.0.0.1:0".to_string();
            }
            if let Some(port) = port_of(&config.coordinator.bind_address) {
                config.worker.coordinator_url = format!("http://127.0.0.1:{port}");
            }
        }

        if mode == AppMode::Worker && config.worker.bind_address.is_empty() {
            return Err(anyhow::anyhow!(
                "worker模式需要监听地址，请设置 --worker-port 或 worker.bind_address"
            ));
        }

        Ok(Self {
            config,
            mode,
            metrics: MetricsCollector::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 运行到收到关闭信号，返回前关闭存储
    ///
    /// 单进程模式按依赖顺序关闭：先Worker，后协调器与任务提交服务
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!(mode = ?self.mode, "启动应用程序");

        let pool = if self.mode.needs_store() {
            let pool = DatabasePool::connect_with_retry(&self.config.database)
                .await
                .context("连接数据库失败")?;
            pool.ensure_schema().await.context("初始化数据库表结构失败")?;
            Some(pool)
        } else {
            None
        };
        let store = pool.as_ref().map(|pool| pool.task_store());

        let result = match (self.mode, store) {
            (AppMode::Coordinator, Some(store)) => self.run_coordinator(store, shutdown_rx).await,
            (AppMode::Scheduler, Some(store)) => self.run_scheduler(store, shutdown_rx).await,
            (AppMode::Worker, _) => self.run_worker(shutdown_rx).await,
            (AppMode::All, Some(store)) => {
                // Worker排空并上报完所有状态后，才停止协调器与任务提交服务
                let (upstream_tx, _) = broadcast::channel::<()>(1);
                let coordinator = self.run_coordinator(store.clone(), upstream_tx.subscribe());
                let scheduler = self.run_scheduler(store, upstream_tx.subscribe());
                let worker = async {
                    let result = self.run_worker(shutdown_rx).await;
                    info!("Worker已退出，继续关闭协调器与任务提交服务");
                    let _ = upstream_tx.send(());
                    result
                };
                tokio::try_join!(coordinator, scheduler, worker).map(|_| ())
            }
            (mode, None) => Err(anyhow::anyhow!("{mode:?} 模式缺少任务存储")),
        };

        if let Some(pool) = pool {
            pool.close().await;
        }
        result
    }

    async fn run_coordinator(
        &self,
        store: Arc<dyn TaskStore>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        let config = self.config.coordinator.clone();
        let listener = TcpListener::bind(&config.bind_address)
            .await
            .with_context(|| format!("协调器无法监听 {}", config.bind_address))?;
        let connector = Arc::new(HttpWorkerConnector::new(config.rpc_timeout())?);

        Coordinator::new(config, store, connector, self.metrics.clone())
            .serve(listener, shutdown_rx)
            .await
            .context("协调器运行失败")
    }

    async fn run_scheduler(
        &self,
        store: Arc<dyn TaskStore>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        let bind_address = &self.config.api.bind_address;
        let listener = TcpListener::bind(bind_address)
            .await
            .with_context(|| format!("任务提交服务无法监听 {bind_address}"))?;

        ApiServer::new(&self.config.api, store, self.metrics.clone())
            .serve(listener, shutdown_rx)
            .await
            .context("任务提交服务运行失败")
    }

    async fn run_worker(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let config = self.config.worker.clone();
        let listener = TcpListener::bind(&config.bind_address)
            .await
            .with_context(|| format!("Worker无法监听 {}", config.bind_address))?;
        let local_addr = listener.local_addr().context("读取Worker监听地址失败")?;

        let advertise = match (&config.advertise_address, self.mode) {
            (None, AppMode::All) => format!("http://127.0.0.1:{}", local_addr.port()),
            _ => advertise_address(&config, local_addr.port())?,
        };
        let coordinator = Arc::new(HttpCoordinatorClient::new(
            &config.coordinator_url,
            config.rpc_timeout(),
        )?);

        Worker::new(
            config,
            coordinator,
            Arc::new(ShellExecutor::new()),
            self.metrics.clone(),
        )
        .serve(listener, advertise, shutdown_rx)
        .await
        .context("Worker运行失败")
    }
}
