//! 向协调器上报任务进度
//!
//! 瞬时错误按指数退避加随机抖动重试。`started` 收到状态冲突时同样重试，
//! 因为协调器可能还没来得及写入 `picked_at`。

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use taskly_core::{SchedulerError, SchedulerResult};
use taskly_domain::{CoordinatorClient, TaskId, TaskState, TaskStatusUpdate, WorkerId};
use tracing::{debug, warn};

pub struct StatusReporter {
    coordinator: Arc<dyn CoordinatorClient>,
    worker_id: Arc<AtomicU32>,
    max_retries: u32,
    base_delay: Duration,
}

impl StatusReporter {
    /// `worker_id` 为0表示尚未注册
    pub fn new(
        coordinator: Arc<dyn CoordinatorClient>,
        worker_id: Arc<AtomicU32>,
        max_retries: u32,
        base_delay: Duration,
    ) -> Self {
        Self {
            coordinator,
            worker_id,
            max_retries,
            base_delay,
        }
    }

    fn current_worker_id(&self) -> Option<WorkerId> {
        match self.worker_id.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }

    fn should_retry(error: &SchedulerError, status: TaskState) -> bool {
        error.is_transient()
            || (status == TaskState::Started
                && matches!(error, SchedulerError::StateViolation { .. }))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exponential = base_ms.saturating_mul(1 << attempt.min(10));
        let jitter = rand::rng().random_range(0..=base_ms);
        Duration::from_millis(exponential + jitter)
    }

    pub async fn report(&self, task_id: TaskId, status: TaskState) -> SchedulerResult<()> {
        let mut attempt = 0;
        loop {
            let update = TaskStatusUpdate {
                worker_id: self.current_worker_id(),
                status,
            };

            match self.coordinator.report_status(task_id, &update).await {
                Ok(()) => {
                    debug!(%task_id, %status, attempt, "状态已上报");
                    return Ok(());
                }
                Err(e) if attempt < self.max_retries && Self::should_retry(&e, status) => {
                    let delay = self.backoff(attempt);
                    debug!(%task_id, %status, attempt, error = %e, delay_ms = delay.as_millis() as u64, "状态上报失败，稍后重试");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(%task_id, %status, attempts = attempt + 1, error = %e, "状态上报失败，放弃");
                    return Err(e);
                }
            }
        }
    }
}
