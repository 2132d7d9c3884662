//! 到期任务扫描与投递
//!
//! 每个周期从存储读取到期且未被取走的任务，按到期时间顺序逐个通过注册表
//! 选择Worker并发起RPC。投递成功后写入 `picked_at`，失败的任务保持未取走，
//! 下一周期自动重试，因此投递语义是至少一次。

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use taskly_core::{SchedulerError, SchedulerResult};
use taskly_domain::{SubmitTaskRequest, Task, TaskId, TaskStore};
use taskly_infrastructure::MetricsCollector;
use tokio::sync::broadcast;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::registry::WorkerPool;

/// 一轮扫描的结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub due: usize,
    pub dispatched: Vec<TaskId>,
    pub failed: Vec<TaskId>,
    /// 投递成功但 `picked_at` 已被并发扫描写入
    pub duplicates: Vec<TaskId>,
    /// Worker池为空，剩余任务留到下一轮
    pub deferred: bool,
}

pub struct TaskScanner {
    store: Arc<dyn TaskStore>,
    pool: Arc<WorkerPool>,
    interval: Duration,
    rpc_timeout: Duration,
    batch_size: u32,
    metrics: MetricsCollector,
}

impl TaskScanner {
    pub fn new(
        store: Arc<dyn TaskStore>,
        pool: Arc<WorkerPool>,
        interval: Duration,
        rpc_timeout: Duration,
        batch_size: u32,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            store,
            pool,
            interval,
            rpc_timeout,
            batch_size,
            metrics,
        }
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(interval_seconds = self.interval.as_secs(), "任务扫描已启动");

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.scan_once().await {
                        error!(error = %e, "任务扫描失败，等待下一周期");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("任务扫描收到关闭信号");
                    break;
                }
            }
        }
    }

    /// 按批次投递所有到期任务。某批取满且有进展时继续取下一批，
    /// 积压超过 `batch_size` 的任务不必再等一个周期
    pub async fn scan_once(&self) -> SchedulerResult<ScanReport> {
        let started = Instant::now();
        let mut report = ScanReport::default();

        loop {
            let due = self.store.due_tasks(Utc::now(), self.batch_size).await?;
            let full_batch = due.len() >= self.batch_size as usize;
            let dispatched_before = report.dispatched.len();
            report.due += due.len();

            self.dispatch_batch(&due, &mut report).await?;

            let progressed = report.dispatched.len() > dispatched_before;
            if !full_batch || !progressed || report.deferred {
                break;
            }
            debug!(batch_size = self.batch_size, "本批已取满，继续读取下一批");
        }

        self.metrics
            .record_scan_duration(started.elapsed().as_secs_f64());
        if report.due > 0 {
            info!(
                due = report.due,
                dispatched = report.dispatched.len(),
                failed = report.failed.len(),
                deferred = report.deferred,
                "扫描周期完成"
            );
        }
        Ok(report)
    }

    async fn dispatch_batch(&self, due: &[Task], report: &mut ScanReport) -> SchedulerResult<()> {
        for (index, task) in due.iter().enumerate() {
            let (worker_id, worker) = match self.pool.next_worker().await {
                Ok(selected) => selected,
                Err(SchedulerError::EmptyPool) => {
                    info!(remaining = due.len() - index, "Worker池为空，推迟到下一周期");
                    self.metrics.record_dispatch_deferred();
                    report.deferred = true;
                    break;
                }
                Err(e) => return Err(e),
            };

            // 先于RPC取时间，保证Worker随后上报的里程碑不早于 picked_at
            let dispatched_at = Utc::now();
            let request = SubmitTaskRequest {
                task_id: task.id,
                command: task.command.clone(),
            };

            let outcome = match timeout(self.rpc_timeout, worker.connection.submit_task(&request)).await {
                Ok(Ok(response)) if response.accepted => Ok(()),
                Ok(Ok(_)) => Err(SchedulerError::RpcFailure(format!(
                    "Worker {worker_id} 未接受任务"
                ))),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(SchedulerError::RpcTimeout(format!(
                    "向Worker {worker_id} 投递任务超时"
                ))),
            };

            if let Err(e) = outcome {
                warn!(task_id = %task.id, worker_id, error = %e, "任务投递失败，下一周期重试");
                self.metrics.record_dispatch_failure();
                report.failed.push(task.id);
                continue;
            }

            match self.store.mark_picked(task.id, dispatched_at).await {
                Ok(true) => {
                    debug!(task_id = %task.id, worker_id, "任务已投递");
                    self.metrics.record_task_dispatched(worker_id);
                    report.dispatched.push(task.id);
                }
                Ok(false) => {
                    warn!(task_id = %task.id, worker_id, "任务已被并发的扫描取走，发生重复投递");
                    report.duplicates.push(task.id);
                }
                Err(e) => {
                    error!(task_id = %task.id, worker_id, error = %e, "任务已投递但写入picked_at失败");
                    report.failed.push(task.id);
                }
            }
        }
        Ok(())
    }
}
