//! RPC端口的内存Mock
//!
//! 失败与延迟通过开关注入，调用记录可在断言中读取。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use taskly_core::{SchedulerError, SchedulerResult};
use taskly_domain::{
    CoordinatorClient, HeartbeatResponse, SubmitTaskRequest, SubmitTaskResponse, TaskId,
    TaskState, TaskStatusUpdate, WorkerClient, WorkerConnector, WorkerId,
};
use tokio::sync::Mutex;

/// 记录投递、可配置失败的Worker客户端
#[derive(Debug, Default)]
pub struct MockWorkerClient {
    address: String,
    submissions: Mutex<Vec<SubmitTaskRequest>>,
    submit_failure: AtomicBool,
    heartbeat_failure: AtomicBool,
    submit_delay_ms: AtomicU64,
    heartbeat_delay_ms: AtomicU64,
    heartbeat_calls: AtomicUsize,
}

impl MockWorkerClient {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            ..Self::default()
        }
    }

    pub fn set_submit_failure(&self, fail: bool) {
        self.submit_failure.store(fail, Ordering::SeqCst);
    }

    pub fn set_heartbeat_failure(&self, fail: bool) {
        self.heartbeat_failure.store(fail, Ordering::SeqCst);
    }

    pub fn set_submit_delay(&self, delay: Duration) {
        self.submit_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_heartbeat_delay(&self, delay: Duration) {
        self.heartbeat_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub async fn submissions(&self) -> Vec<SubmitTaskRequest> {
        self.submissions.lock().await.clone()
    }

    pub fn heartbeat_calls(&self) -> usize {
        self.heartbeat_calls.load(Ordering::SeqCst)
    }

    async fn delay(millis: &AtomicU64) {
        let millis = millis.load(Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }
}

#[async_trait]
impl WorkerClient for MockWorkerClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn submit_task(&self, request: &SubmitTaskRequest) -> SchedulerResult<SubmitTaskResponse> {
        Self::delay(&self.submit_delay_ms).await;
        if self.submit_failure.load(Ordering::SeqCst) {
            return Err(SchedulerError::RpcFailure(format!(
                "mock worker {} rejected task",
                self.address
            )));
        }

        self.submissions.lock().await.push(request.clone());
        Ok(SubmitTaskResponse { accepted: true })
    }

    async fn heartbeat(&self) -> SchedulerResult<HeartbeatResponse> {
        self.heartbeat_calls.fetch_add(1, Ordering::SeqCst);
        Self::delay(&self.heartbeat_delay_ms).await;
        if self.heartbeat_failure.load(Ordering::SeqCst) {
            return Err(SchedulerError::RpcTimeout(format!(
                "mock worker {} did not answer",
                self.address
            )));
        }

        Ok(HeartbeatResponse {
            alive: true,
            worker_id: None,
        })
    }
}

/// 按地址复用 [`MockWorkerClient`]，可指定拒绝连接的地址
#[derive(Debug, Default)]
pub struct MockWorkerConnector {
    clients: Mutex<HashMap<String, Arc<MockWorkerClient>>>,
    refused: Mutex<HashSet<String>>,
}

impl MockWorkerConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn refuse(&self, address: &str) {
        self.refused.lock().await.insert(address.to_string());
    }

    pub async fn accept(&self, address: &str) {
        self.refused.lock().await.remove(address);
    }

    /// 已为 `address` 建立过的客户端
    pub async fn client(&self, address: &str) -> Option<Arc<MockWorkerClient>> {
        self.clients.lock().await.get(address).cloned()
    }
}

#[async_trait]
impl WorkerConnector for MockWorkerConnector {
    async fn connect(&self, address: &str) -> SchedulerResult<Arc<dyn WorkerClient>> {
        if self.refused.lock().await.contains(address) {
            return Err(SchedulerError::Connection(format!(
                "mock connector refused {address}"
            )));
        }

        let client = self
            .clients
            .lock()
            .await
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(MockWorkerClient::new(address)))
            .clone();
        Ok(client)
    }
}

/// 记录注册与状态上报的协调器客户端
#[derive(Debug, Default)]
pub struct MockCoordinatorClient {
    registrations: Mutex<Vec<String>>,
    deregistrations: Mutex<Vec<WorkerId>>,
    reports: Mutex<Vec<(TaskId, TaskStatusUpdate)>>,
    last_id: AtomicU32,
    /// 接下来若干次上报返回瞬时错误
    transient_report_failures: AtomicU32,
    /// 接下来若干次 `started` 上报返回状态冲突
    started_conflicts: AtomicU32,
    reject_terminal: AtomicBool,
    register_failure: AtomicBool,
}

impl MockCoordinatorClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_reports(&self, count: u32) {
        self.transient_report_failures.store(count, Ordering::SeqCst);
    }

    pub fn conflict_next_started(&self, count: u32) {
        self.started_conflicts.store(count, Ordering::SeqCst);
    }

    pub fn reject_terminal_reports(&self, reject: bool) {
        self.reject_terminal.store(reject, Ordering::SeqCst);
    }

    pub fn set_register_failure(&self, fail: bool) {
        self.register_failure.store(fail, Ordering::SeqCst);
    }

    pub async fn registrations(&self) -> Vec<String> {
        self.registrations.lock().await.clone()
    }

    pub async fn deregistrations(&self) -> Vec<WorkerId> {
        self.deregistrations.lock().await.clone()
    }

    pub async fn reports(&self) -> Vec<(TaskId, TaskStatusUpdate)> {
        self.reports.lock().await.clone()
    }

    /// 某任务按顺序收到的状态
    pub async fn statuses_for(&self, task_id: TaskId) -> Vec<TaskState> {
        self.reports
            .lock()
            .await
            .iter()
            .filter(|(id, _)| *id == task_id)
            .map(|(_, update)| update.status)
            .collect()
    }

    fn take_one(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl CoordinatorClient for MockCoordinatorClient {
    async fn register(&self, address: &str) -> SchedulerResult<WorkerId> {
        if self.register_failure.load(Ordering::SeqCst) {
            return Err(SchedulerError::RpcFailure("mock coordinator unavailable".to_string()));
        }
        self.registrations.lock().await.push(address.to_string());
        Ok(self.last_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn deregister(&self, worker_id: WorkerId) -> SchedulerResult<()> {
        self.deregistrations.lock().await.push(worker_id);
        Ok(())
    }

    async fn report_status(
        &self,
        task_id: TaskId,
        update: &TaskStatusUpdate,
    ) -> SchedulerResult<()> {
        if Self::take_one(&self.transient_report_failures) {
            return Err(SchedulerError::RpcFailure("mock coordinator unavailable".to_string()));
        }

        let violation = || SchedulerError::StateViolation {
            task_id: task_id.to_string(),
            from: "unknown".to_string(),
            to: update.status.to_string(),
        };
        if update.status == TaskState::Started && Self::take_one(&self.started_conflicts) {
            return Err(violation());
        }
        if update.status.is_terminal() && self.reject_terminal.load(Ordering::SeqCst) {
            return Err(violation());
        }

        self.reports.lock().await.push((task_id, update.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_connector_reuses_client_per_address() {
        let connector = MockWorkerConnector::new();
        let first = connector.connect("a:1").await.unwrap();
        first
            .submit_task(&SubmitTaskRequest {
                task_id: Uuid::new_v4(),
                command: "true".to_string(),
            })
            .await
            .unwrap();

        connector.connect("a:1").await.unwrap();
        let client = connector.client("a:1").await.unwrap();
        assert_eq!(client.submissions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_budget_is_consumed() {
        let coordinator = MockCoordinatorClient::new();
        coordinator.fail_next_reports(1);
        let update = TaskStatusUpdate {
            worker_id: Some(1),
            status: TaskState::Started,
        };
        let task_id = Uuid::new_v4();

        assert!(coordinator.report_status(task_id, &update).await.is_err());
        assert!(coordinator.report_status(task_id, &update).await.is_ok());
        assert_eq!(coordinator.statuses_for(task_id).await, vec![TaskState::Started]);
    }
}
