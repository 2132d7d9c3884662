//! 调度系统的指标
//!
//! 未安装全局记录器时所有操作都是空操作，因此可以无条件创建。

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use taskly_domain::TaskState;
use tracing::debug;

#[derive(Clone)]
pub struct MetricsCollector {
    // 任务提交与投递
    tasks_submitted_total: Counter,
    tasks_dispatched_total: Counter,
    dispatch_failures_total: Counter,
    dispatch_deferred_total: Counter,
    scan_duration: Histogram,

    // Worker池
    registered_workers: Gauge,
    workers_evicted_total: Counter,

    // Worker进程
    worker_queue_depth: Gauge,
    task_execution_duration: Histogram,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            tasks_submitted_total: counter!("taskly_tasks_submitted_total"),
            tasks_dispatched_total: counter!("taskly_tasks_dispatched_total"),
            dispatch_failures_total: counter!("taskly_dispatch_failures_total"),
            dispatch_deferred_total: counter!("taskly_dispatch_deferred_total"),
            scan_duration: histogram!("taskly_scan_duration_seconds"),
            registered_workers: gauge!("taskly_registered_workers"),
            workers_evicted_total: counter!("taskly_workers_evicted_total"),
            worker_queue_depth: gauge!("taskly_worker_queue_depth"),
            task_execution_duration: histogram!("taskly_task_execution_duration_seconds"),
        }
    }

    pub fn record_task_submitted(&self) {
        self.tasks_submitted_total.increment(1);
    }

    pub fn record_task_dispatched(&self, worker_id: u32) {
        self.tasks_dispatched_total.increment(1);
        debug!(worker_id, "任务投递计数");
    }

    pub fn record_dispatch_failure(&self) {
        self.dispatch_failures_total.increment(1);
    }

    /// Worker池为空导致本轮扫描推迟
    pub fn record_dispatch_deferred(&self) {
        self.dispatch_deferred_total.increment(1);
    }

    pub fn record_scan_duration(&self, duration_seconds: f64) {
        self.scan_duration.record(duration_seconds);
    }

    /// 按目标状态统计Worker上报的生命周期转换
    pub fn record_transition(&self, state: TaskState) {
        counter!("taskly_task_transitions_total", "state" => state.as_str()).increment(1);
    }

    pub fn update_registered_workers(&self, count: usize) {
        self.registered_workers.set(count as f64);
    }

    pub fn record_worker_evicted(&self, worker_id: u32) {
        self.workers_evicted_total.increment(1);
        debug!(worker_id, "Worker剔除计数");
    }

    pub fn update_worker_queue_depth(&self, depth: usize) {
        self.worker_queue_depth.set(depth as f64);
    }

    pub fn record_task_execution(&self, succeeded: bool, duration_seconds: f64) {
        self.task_execution_duration.record(duration_seconds);
        let outcome = if succeeded { "completed" } else { "failed" };
        counter!("taskly_task_executions_total", "outcome" => outcome).increment(1);
    }
}
