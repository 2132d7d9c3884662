//! 向协调器注册，并在疑似被剔除时重新注册
//!
//! 协调器不会通知被剔除的Worker。Worker以"多久没有收到心跳探测"作为判断依据：
//! 超过 `reregister_after` 没有被探测，就认为自己已不在池中。

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taskly_domain::{CoordinatorClient, WorkerId};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::service::WorkerService;

const MAX_REGISTER_DELAY: Duration = Duration::from_secs(30);

pub struct RegistrationKeeper {
    coordinator: Arc<dyn CoordinatorClient>,
    service: Arc<WorkerService>,
    worker_id: Arc<AtomicU32>,
    advertise_address: String,
    reregister_after: Duration,
    retry_delay: Duration,
}

impl RegistrationKeeper {
    pub fn new(
        coordinator: Arc<dyn CoordinatorClient>,
        service: Arc<WorkerService>,
        worker_id: Arc<AtomicU32>,
        advertise_address: String,
        reregister_after: Duration,
        retry_delay: Duration,
    ) -> Self {
        Self {
            coordinator,
            service,
            worker_id,
            advertise_address,
            reregister_after,
            retry_delay,
        }
    }

    pub fn worker_id(&self) -> Option<WorkerId> {
        match self.worker_id.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }

    /// 注册一次，成功后刷新探测时间
    pub async fn register_once(&self) -> taskly_core::SchedulerResult<WorkerId> {
        let id = self.coordinator.register(&self.advertise_address).await?;
        self.worker_id.store(id, Ordering::SeqCst);
        self.service.touch();
        info!(worker_id = id, address = %self.advertise_address, "已注册到协调器");
        Ok(id)
    }

    /// 失败后按倍增间隔重试，收到关闭信号返回 `false`
    async fn register_until_success(&self, shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
        let mut delay = self.retry_delay;
        loop {
            match self.register_once().await {
                Ok(_) => return true,
                Err(e) => {
                    warn!(
                        address = %self.advertise_address,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "注册失败"
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.recv() => return false,
            }
            delay = (delay * 2).min(MAX_REGISTER_DELAY);
        }
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        if !self.register_until_success(&mut shutdown_rx).await {
            return;
        }

        let mut ticker = interval((self.reregister_after / 2).max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.service.last_probe().elapsed() < self.reregister_after {
                        continue;
                    }
                    warn!(
                        worker_id = ?self.worker_id(),
                        silent_seconds = self.service.last_probe().elapsed().as_secs(),
                        "长时间未收到心跳探测，重新注册"
                    );
                    if !self.register_until_success(&mut shutdown_rx).await {
                        return;
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    }

    /// 尽力注销，失败只记录日志
    pub async fn deregister(&self) {
        let Some(id) = self.worker_id() else {
            return;
        };
        match self.coordinator.deregister(id).await {
            Ok(()) => info!(worker_id = id, "已从协调器注销"),
            Err(e) => warn!(worker_id = id, error = %e, "注销失败"),
        }
        self.worker_id.store(0, Ordering::SeqCst);
    }
}
