//! Worker池注册表
//!
//! 成员表、轮询顺序和游标放在同一把锁里，读者永远不会看到只存在于其中一处的ID。

use std::collections::HashMap;
use std::sync::Arc;

use taskly_core::{SchedulerError, SchedulerResult};
use taskly_domain::{WorkerClient, WorkerConnector, WorkerId, WorkerSummary};
use taskly_infrastructure::MetricsCollector;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 已注册的Worker，独占其RPC通道
#[derive(Clone)]
pub struct WorkerInfo {
    pub id: WorkerId,
    pub address: String,
    pub connection: Arc<dyn WorkerClient>,
    pub heartbeat_misses: u8,
}

impl std::fmt::Debug for WorkerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerInfo")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("heartbeat_misses", &self.heartbeat_misses)
            .finish()
    }
}

/// 一次心跳结果对注册表的影响
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    Healthy,
    Missed(u8),
    Evicted,
    /// 探测期间Worker已被移除
    Unknown,
}

#[derive(Default)]
struct PoolState {
    workers: HashMap<WorkerId, WorkerInfo>,
    order: Vec<WorkerId>,
    cursor: usize,
    last_id: WorkerId,
}

impl PoolState {
    fn remove(&mut self, id: WorkerId) -> Option<WorkerInfo> {
        let info = self.workers.remove(&id)?;
        if let Some(position) = self.order.iter().position(|w| *w == id) {
            self.order.remove(position);
            // 保持游标指向原本的下一个Worker
            if position < self.cursor {
                self.cursor -= 1;
            }
        }
        if self.cursor >= self.order.len() {
            self.cursor = 0;
        }
        Some(info)
    }
}

pub struct WorkerPool {
    state: RwLock<PoolState>,
    connector: Arc<dyn WorkerConnector>,
    max_heartbeat_misses: u8,
    metrics: MetricsCollector,
}

impl WorkerPool {
    pub fn new(
        connector: Arc<dyn WorkerConnector>,
        max_heartbeat_misses: u8,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            state: RwLock::new(PoolState::default()),
            connector,
            max_heartbeat_misses,
            metrics,
        }
    }

    /// 建立到 `address` 的RPC通道并分配新ID
    ///
    /// 同一地址已注册时旧条目被替换，Worker重启后会以新ID重新加入。
    pub async fn register(&self, address: &str) -> SchedulerResult<WorkerId> {
        let address = address.trim();
        if address.is_empty() {
            return Err(SchedulerError::Validation("Worker地址不能为空".to_string()));
        }

        // 建连可能较慢，不持有锁
        let connection = self.connector.connect(address).await?;

        let mut state = self.state.write().await;
        let stale: Vec<WorkerId> = state
            .workers
            .values()
            .filter(|w| w.address == address)
            .map(|w| w.id)
            .collect();
        for id in stale {
            state.remove(id);
            info!(worker_id = id, address, "替换同地址的旧注册");
        }

        state.last_id += 1;
        let id = state.last_id;
        state.workers.insert(
            id,
            WorkerInfo {
                id,
                address: address.to_string(),
                connection,
                heartbeat_misses: 0,
            },
        );
        state.order.push(id);
        let size = state.order.len();
        drop(state);

        self.metrics.update_registered_workers(size);
        info!(worker_id = id, address, pool_size = size, "Worker已注册");
        Ok(id)
    }

    /// 移除Worker；ID不存在时为空操作，返回是否确实移除
    pub async fn deregister(&self, id: WorkerId) -> bool {
        let mut state = self.state.write().await;
        let removed = state.remove(id);
        let size = state.order.len();
        drop(state);

        match removed {
            Some(info) => {
                self.metrics.update_registered_workers(size);
                info!(worker_id = id, address = %info.address, pool_size = size, "Worker已移除");
                true
            }
            None => {
                debug!(worker_id = id, "Worker不在池中，忽略注销");
                false
            }
        }
    }

    /// 按轮询顺序选出下一个Worker
    pub async fn next_worker(&self) -> SchedulerResult<(WorkerId, WorkerInfo)> {
        if self.state.read().await.order.is_empty() {
            return Err(SchedulerError::EmptyPool);
        }

        let mut state = self.state.write().await;
        let len = state.order.len();
        // 两次加锁之间池可能被清空
        if len == 0 {
            return Err(SchedulerError::EmptyPool);
        }

        let position = state.cursor % len;
        state.cursor = (position + 1) % len;
        let id = state.order[position];
        let info = state
            .workers
            .get(&id)
            .cloned()
            .ok_or_else(|| SchedulerError::Internal(format!("Worker {id} 在轮询序列中但不在成员表中")))?;

        Ok((id, info))
    }

    /// 成功清零，失败累加；累计次数超过阈值时移除该Worker
    pub async fn record_heartbeat_result(&self, id: WorkerId, success: bool) -> HeartbeatOutcome {
        let mut state = self.state.write().await;
        let Some(worker) = state.workers.get_mut(&id) else {
            return HeartbeatOutcome::Unknown;
        };

        if success {
            worker.heartbeat_misses = 0;
            return HeartbeatOutcome::Healthy;
        }

        worker.heartbeat_misses = worker.heartbeat_misses.saturating_add(1);
        let misses = worker.heartbeat_misses;
        if misses <= self.max_heartbeat_misses {
            warn!(worker_id = id, misses, "Worker心跳丢失");
            return HeartbeatOutcome::Missed(misses);
        }

        let removed = state.remove(id);
        let size = state.order.len();
        drop(state);

        self.metrics.record_worker_evicted(id);
        self.metrics.update_registered_workers(size);
        warn!(
            worker_id = id,
            address = removed.as_ref().map(|w| w.address.as_str()).unwrap_or_default(),
            misses,
            pool_size = size,
            "Worker连续心跳丢失，已剔除"
        );
        HeartbeatOutcome::Evicted
    }

    /// 当前成员的ID与RPC通道，供心跳探测使用
    pub async fn probe_targets(&self) -> Vec<(WorkerId, Arc<dyn WorkerClient>)> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.workers.get(id).map(|w| (*id, w.connection.clone())))
            .collect()
    }

    pub async fn snapshot(&self) -> Vec<WorkerSummary> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.workers.get(id))
            .map(|w| WorkerSummary {
                worker_id: w.id,
                address: w.address.clone(),
                heartbeat_misses: w.heartbeat_misses,
            })
            .collect()
    }

    pub async fn contains(&self, id: WorkerId) -> bool {
        self.state.read().await.workers.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 清空池并释放所有RPC通道
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        let last_id = state.last_id;
        *state = PoolState {
            last_id,
            ..PoolState::default()
        };
        drop(state);
        self.metrics.update_registered_workers(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Counts;
    use taskly_testing_utils::MockWorkerConnector;

    fn pool(connector: MockWorkerConnector, max_misses: u8) -> WorkerPool {
        WorkerPool::new(Arc::new(connector), max_misses, MetricsCollector::new())
    }

    #[tokio::test]
    async fn test_register_assigns_fresh_ids() {
        let pool = pool(MockWorkerConnector::new(), 1);
        let a = pool.register("10.0.0.1:9000").await.unwrap();
        let b = pool.register("10.0.0.2:9000").await.unwrap();

        assert_ne!(a, b);
        assert_eq!(pool.len().await, 2);
    }

    #[tokio::test]
    async fn test_register_unreachable_worker_fails() {
        let connector = MockWorkerConnector::new();
        connector.refuse("10.0.0.9:9000").await;
        let pool = pool(connector, 1);

        let err = pool.register("10.0.0.9:9000").await.unwrap_err();
        assert!(matches!(err, SchedulerError::Connection(_)));
        assert!(pool.is_empty().await);
    }

    #[tokio::test]
    async fn test_reregistration_replaces_entry() {
        let pool = pool(MockWorkerConnector::new(), 1);
        let old = pool.register("10.0.0.1:9000").await.unwrap();
        let new = pool.register("10.0.0.1:9000").await.unwrap();

        assert_ne!(old, new);
        assert!(!pool.contains(old).await);
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn test_empty_pool() {
        let pool = pool(MockWorkerConnector::new(), 1);
        assert!(matches!(
            pool.next_worker().await.unwrap_err(),
            SchedulerError::EmptyPool
        ));
    }

    #[tokio::test]
    async fn test_round_robin_fairness() {
        let pool = pool(MockWorkerConnector::new(), 1);
        for i in 0..3 {
            pool.register(&format!("10.0.0.{i}:9000")).await.unwrap();
        }

        let picks = 10;
        let mut counts: Counts<WorkerId, usize> = Counts::new();
        for _ in 0..picks {
            let (id, _) = pool.next_worker().await.unwrap();
            *counts.entry(id).or_default() += 1;
        }

        assert_eq!(counts.len(), 3);
        for count in counts.values() {
            assert!(*count >= picks / 3 && *count <= picks.div_ceil(3));
        }
    }

    #[tokio::test]
    async fn test_deregister_keeps_cursor_valid() {
        let pool = pool(MockWorkerConnector::new(), 1);
        let a = pool.register("a:1").await.unwrap();
        let b = pool.register("b:1").await.unwrap();
        let c = pool.register("c:1").await.unwrap();

        assert_eq!(pool.next_worker().await.unwrap().0, a);
        assert_eq!(pool.next_worker().await.unwrap().0, b);
        // 游标指向c，移除c后回绕到a
        assert!(pool.deregister(c).await);
        assert_eq!(pool.next_worker().await.unwrap().0, a);
        assert_eq!(pool.next_worker().await.unwrap().0, b);

        // 重复注销是空操作
        assert!(!pool.deregister(c).await);
    }

    #[tokio::test]
    async fn test_removing_earlier_worker_does_not_skip() {
        let pool = pool(MockWorkerConnector::new(), 1);
        let a = pool.register("a:1").await.unwrap();
        let b = pool.register("b:1").await.unwrap();
        let c = pool.register("c:1").await.unwrap();

        assert_eq!(pool.next_worker().await.unwrap().0, a);
        assert_eq!(pool.next_worker().await.unwrap().0, b);
        pool.deregister(a).await;
        assert_eq!(pool.next_worker().await.unwrap().0, c);
        assert_eq!(pool.next_worker().await.unwrap().0, b);
    }

    #[tokio::test]
    async fn test_eviction_after_threshold_exceeded() {
        let pool = pool(MockWorkerConnector::new(), 1);
        let id = pool.register("a:1").await.unwrap();

        assert_eq!(
            pool.record_heartbeat_result(id, false).await,
            HeartbeatOutcome::Missed(1)
        );
        assert!(pool.contains(id).await);

        assert_eq!(
            pool.record_heartbeat_result(id, false).await,
            HeartbeatOutcome::Evicted
        );
        assert!(!pool.contains(id).await);
        assert!(matches!(
            pool.next_worker().await.unwrap_err(),
            SchedulerError::EmptyPool
        ));
        assert_eq!(
            pool.record_heartbeat_result(id, true).await,
            HeartbeatOutcome::Unknown
        );
    }

    #[tokio::test]
    async fn test_success_resets_misses() {
        let pool = pool(MockWorkerConnector::new(), 1);
        let id = pool.register("a:1").await.unwrap();

        pool.record_heartbeat_result(id, false).await;
        assert_eq!(
            pool.record_heartbeat_result(id, true).await,
            HeartbeatOutcome::Healthy
        );
        assert_eq!(pool.snapshot().await[0].heartbeat_misses, 0);
        assert_eq!(
            pool.record_heartbeat_result(id, false).await,
            HeartbeatOutcome::Missed(1)
        );
    }

    #[tokio::test]
    async fn test_zero_threshold_evicts_on_first_miss() {
        let pool = pool(MockWorkerConnector::new(), 0);
        let id = pool.register("a:1").await.unwrap();
        assert_eq!(
            pool.record_heartbeat_result(id, false).await,
            HeartbeatOutcome::Evicted
        );
    }
}
