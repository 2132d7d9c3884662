//! 协调器对Worker暴露的RPC接口

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use taskly_core::SchedulerError;
use taskly_domain::{
    ErrorResponse, RegisterWorkerRequest, RegisterWorkerResponse, TaskStatusUpdate, TaskStore,
    TransitionOwner, WorkerId, WorkerSummary,
};
use taskly_infrastructure::MetricsCollector;
use tracing::{info, warn};
use uuid::Uuid;

use crate::registry::WorkerPool;

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct RpcError(#[from] SchedulerError);

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SchedulerError::Validation(_) => StatusCode::BAD_REQUEST,
            SchedulerError::TaskNotFound { .. } => StatusCode::NOT_FOUND,
            SchedulerError::StateViolation { .. } => StatusCode::CONFLICT,
            SchedulerError::EmptyPool => StatusCode::SERVICE_UNAVAILABLE,
            SchedulerError::Connection(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorResponse {
            error: self.0.code().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Clone)]
pub struct RpcState {
    pub pool: Arc<WorkerPool>,
    pub store: Arc<dyn TaskStore>,
    pub metrics: MetricsCollector,
}

pub fn rpc_router(state: RpcState) -> Router {
    Router::new()
        .route("/rpc/workers", post(register_worker).get(list_workers))
        .route("/rpc/workers/{id}", delete(deregister_worker))
        .route("/rpc/tasks/{task_id}/status", post(update_task_status))
        .with_state(state)
}

async fn register_worker(
    State(state): State<RpcState>,
    Json(request): Json<RegisterWorkerRequest>,
) -> Result<Json<RegisterWorkerResponse>, RpcError> {
    let worker_id = state.pool.register(&request.address).await?;
    Ok(Json(RegisterWorkerResponse { worker_id }))
}

async fn deregister_worker(State(state): State<RpcState>, Path(id): Path<WorkerId>) -> StatusCode {
    state.pool.deregister(id).await;
    StatusCode::OK
}

async fn list_workers(State(state): State<RpcState>) -> Json<Vec<WorkerSummary>> {
    Json(state.pool.snapshot().await)
}

/// 里程碑时间按协调器收到上报的时刻记录
async fn update_task_status(
    State(state): State<RpcState>,
    Path(task_id): Path<String>,
    Json(update): Json<TaskStatusUpdate>,
) -> Result<StatusCode, RpcError> {
    let task_id = Uuid::parse_str(&task_id)
        .map_err(|_| SchedulerError::Validation(format!("无效的任务ID: {task_id}")))?;

    if update.status.owner() != Some(TransitionOwner::Worker) {
        return Err(SchedulerError::Validation(format!(
            "Worker不能上报 {} 状态",
            update.status
        ))
        .into());
    }

    match state
        .store
        .record_transition(task_id, update.status, Utc::now())
        .await
    {
        Ok(_) => {
            state.metrics.record_transition(update.status);
            info!(%task_id, worker_id = ?update.worker_id, status = %update.status, "任务状态已更新");
            Ok(StatusCode::OK)
        }
        Err(e) => {
            warn!(%task_id, worker_id = ?update.worker_id, status = %update.status, error = %e, "拒绝任务状态上报");
            Err(e.into())
        }
    }
}
