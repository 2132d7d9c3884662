//! 执行池：多个执行协程共享同一个有界任务队列

use std::sync::Arc;

use taskly_domain::{SubmitTaskRequest, TaskState};
use taskly_infrastructure::MetricsCollector;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::executor::TaskExecutor;
use crate::reporter::StatusReporter;

pub struct ExecutorPool {
    receiver: Arc<Mutex<mpsc::Receiver<SubmitTaskRequest>>>,
    executor: Arc<dyn TaskExecutor>,
    reporter: Arc<StatusReporter>,
    metrics: MetricsCollector,
}

impl ExecutorPool {
    pub fn new(
        receiver: mpsc::Receiver<SubmitTaskRequest>,
        executor: Arc<dyn TaskExecutor>,
        reporter: Arc<StatusReporter>,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            receiver: Arc::new(Mutex::new(receiver)),
            executor,
            reporter,
            metrics,
        }
    }

    /// 启动 `size` 个执行协程，队列关闭且取空后全部退出
    pub fn spawn(self, size: usize) -> JoinSet<()> {
        let mut set = JoinSet::new();
        for slot in 0..size {
            let receiver = self.receiver.clone();
            let executor = self.executor.clone();
            let reporter = self.reporter.clone();
            let metrics = self.metrics.clone();
            set.spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some(request) = next else {
                        break;
                    };
                    run_one(slot, request, executor.as_ref(), &reporter, &metrics).await;
                }
                info!(slot, "执行协程退出");
            });
        }
        set
    }
}

async fn run_one(
    slot: usize,
    request: SubmitTaskRequest,
    executor: &dyn TaskExecutor,
    reporter: &StatusReporter,
    metrics: &MetricsCollector,
) {
    let task_id = request.task_id;
    info!(slot, %task_id, command = %request.command, "开始执行任务");

    // 上报失败不影响执行，任务已经投递到本Worker
    if let Err(e) = reporter.report(task_id, TaskState::Started).await {
        warn!(%task_id, error = %e, "started状态上报失败");
    }

    let status = match executor.execute(&request.command).await {
        Ok(outcome) => {
            metrics.record_task_execution(outcome.success, outcome.duration.as_secs_f64());
            if outcome.success {
                TaskState::Completed
            } else {
                warn!(%task_id, exit_code = ?outcome.exit_code, "命令以非零状态退出");
                TaskState::Failed
            }
        }
        Err(e) => {
            error!(%task_id, error = %e, "命令无法执行");
            metrics.record_task_execution(false, 0.0);
            TaskState::Failed
        }
    };

    if let Err(e) = reporter.report(task_id, status).await {
        warn!(%task_id, %status, error = %e, "终态上报失败");
    }
}
