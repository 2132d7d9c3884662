//! Worker心跳检测
//!
//! 每个周期对当前全部Worker并行发起探测，单个探测失败不会中断循环。
//! 网络错误、超时和 `alive == false` 都计为一次丢失。

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use taskly_domain::WorkerId;
use tokio::sync::broadcast;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::registry::{HeartbeatOutcome, WorkerPool};

/// 一轮检测的统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub probed: usize,
    pub healthy: usize,
    pub missed: usize,
    pub evicted: Vec<WorkerId>,
}

pub struct HeartbeatMonitor {
    pool: Arc<WorkerPool>,
    interval: Duration,
    probe_timeout: Duration,
}

impl HeartbeatMonitor {
    pub fn new(pool: Arc<WorkerPool>, interval: Duration, probe_timeout: Duration) -> Self {
        Self {
            pool,
            interval,
            probe_timeout,
        }
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(interval_seconds = self.interval.as_secs(), "心跳检测已启动");

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 第一次tick立即完成，刚启动时池为空，跳过
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.check_once().await;
                    if !report.evicted.is_empty() {
                        info!(evicted = ?report.evicted, "本轮心跳剔除了Worker");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("心跳检测收到关闭信号");
                    break;
                }
            }
        }
    }

    /// 执行一轮探测并把结果写回注册表
    pub async fn check_once(&self) -> HeartbeatReport {
        let targets = self.pool.probe_targets().await;
        if targets.is_empty() {
            debug!("Worker池为空，跳过心跳检测");
            return HeartbeatReport::default();
        }

        let probe_timeout = self.probe_timeout;
        let probes = targets.into_iter().map(|(id, client)| async move {
            let alive = match timeout(probe_timeout, client.heartbeat()).await {
                Ok(Ok(response)) => response.alive,
                Ok(Err(e)) => {
                    debug!(worker_id = id, error = %e, "心跳探测失败");
                    false
                }
                Err(_) => {
                    debug!(worker_id = id, "心跳探测超时");
                    false
                }
            };
            (id, alive)
        });
        let results = join_all(probes).await;

        let mut report = HeartbeatReport {
            probed: results.len(),
            ..HeartbeatReport::default()
        };
        for (id, alive) in results {
            match self.pool.record_heartbeat_result(id, alive).await {
                HeartbeatOutcome::Healthy => report.healthy += 1,
                HeartbeatOutcome::Missed(_) => report.missed += 1,
                HeartbeatOutcome::Evicted => {
                    report.missed += 1;
                    report.evicted.push(id);
                }
                HeartbeatOutcome::Unknown => {
                    warn!(worker_id = id, "探测期间Worker已被移除");
                }
            }
        }

        debug!(
            probed = report.probed,
            healthy = report.healthy,
            missed = report.missed,
            "心跳检测完成"
        );
        report
    }
}
