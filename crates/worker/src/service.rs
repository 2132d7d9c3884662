//! Worker的RPC服务：接收投递的任务并应答心跳

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use taskly_domain::{
    ErrorResponse, HeartbeatResponse, SubmitTaskRequest, SubmitTaskResponse, TaskId, WorkerId,
};
use taskly_infrastructure::MetricsCollector;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// 去重窗口大小
const RECENT_TASK_LIMIT: usize = 10_000;

/// 最近收到的任务ID，用于识别重复投递
#[derive(Debug, Default)]
struct RecentTasks {
    ids: HashSet<TaskId>,
    order: VecDeque<TaskId>,
}

impl RecentTasks {
    /// 新ID返回 `true`
    fn insert(&mut self, id: TaskId) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > RECENT_TASK_LIMIT {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }

    fn forget(&mut self, id: &TaskId) {
        if self.ids.remove(id) {
            self.order.retain(|queued| queued != id);
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SubmitError {
    QueueFull,
    ShuttingDown,
}

impl IntoResponse for SubmitError {
    fn into_response(self) -> Response {
        let message = match self {
            SubmitError::QueueFull => "任务队列已满",
            SubmitError::ShuttingDown => "Worker正在关闭",
        };
        let body = ErrorResponse {
            error: "WORKER_UNAVAILABLE".to_string(),
            message: message.to_string(),
        };
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}

/// RPC处理器与执行池共享的Worker状态
pub struct WorkerService {
    sender: Mutex<Option<mpsc::Sender<SubmitTaskRequest>>>,
    queue_capacity: usize,
    recent: Mutex<RecentTasks>,
    worker_id: Arc<AtomicU32>,
    last_probe: std::sync::Mutex<Instant>,
    metrics: MetricsCollector,
}

impl WorkerService {
    /// 返回服务与任务队列的接收端
    pub fn new(
        queue_capacity: usize,
        worker_id: Arc<AtomicU32>,
        metrics: MetricsCollector,
    ) -> (Arc<Self>, mpsc::Receiver<SubmitTaskRequest>) {
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let service = Arc::new(Self {
            sender: Mutex::new(Some(sender)),
            queue_capacity,
            recent: Mutex::new(RecentTasks::default()),
            worker_id,
            last_probe: std::sync::Mutex::new(Instant::now()),
            metrics,
        });
        (service, receiver)
    }

    pub fn worker_id(&self) -> Option<WorkerId> {
        match self.worker_id.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }

    /// 放入执行队列；重复的任务ID直接确认，不再执行
    pub async fn submit(&self, request: SubmitTaskRequest) -> Result<SubmitTaskResponse, SubmitError> {
        let sender_guard = self.sender.lock().await;
        let Some(sender) = sender_guard.as_ref() else {
            return Err(SubmitError::ShuttingDown);
        };

        let task_id = request.task_id;
        if !self.recent.lock().await.insert(task_id) {
            info!(%task_id, "重复投递的任务，忽略");
            return Ok(SubmitTaskResponse { accepted: true });
        }

        match sender.try_send(request) {
            Ok(()) => {
                self.metrics
                    .update_worker_queue_depth(self.queue_capacity - sender.capacity());
                debug!(%task_id, "任务已入队");
                Ok(SubmitTaskResponse { accepted: true })
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                // 没有入队，协调器下一轮会重投
                self.recent.lock().await.forget(&task_id);
                warn!(%task_id, capacity = self.queue_capacity, "任务队列已满，拒绝任务");
                Err(SubmitError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.recent.lock().await.forget(&task_id);
                Err(SubmitError::ShuttingDown)
            }
        }
    }

    /// 应答心跳并记录最近一次被探测的时间
    pub fn heartbeat(&self) -> HeartbeatResponse {
        if let Ok(mut last_probe) = self.last_probe.lock() {
            *last_probe = Instant::now();
        }
        HeartbeatResponse {
            alive: true,
            worker_id: self.worker_id(),
        }
    }

    pub fn last_probe(&self) -> Instant {
        self.last_probe
            .lock()
            .map(|instant| *instant)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }

    /// 重新注册后把探测时间视为刚刚发生
    pub fn touch(&self) {
        if let Ok(mut last_probe) = self.last_probe.lock() {
            *last_probe = Instant::now();
        }
    }

    /// 停止接受新任务，已入队的任务继续执行
    pub async fn close(&self) {
        self.sender.lock().await.take();
    }
}

pub fn worker_router(service: Arc<WorkerService>) -> Router {
    Router::new()
        .route("/rpc/tasks", post(submit_task))
        .route("/rpc/heartbeat", get(heartbeat))
        .with_state(service)
}

async fn submit_task(
    State(service): State<Arc<WorkerService>>,
    Json(request): Json<SubmitTaskRequest>,
) -> Result<Json<SubmitTaskResponse>, SubmitError> {
    service.submit(request).await.map(Json)
}

async fn heartbeat(State(service): State<Arc<WorkerService>>) -> Json<HeartbeatResponse> {
    Json(service.heartbeat())
}
