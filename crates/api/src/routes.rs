use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use taskly_domain::TaskStore;
use taskly_infrastructure::MetricsCollector;

use crate::handlers::{
    health::health_check,
    tasks::{schedule_task, task_status},
};
use crate::middleware::{request_logging, request_timeout};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TaskStore>,
    pub metrics: MetricsCollector,
    pub request_timeout: Duration,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/schedule", post(schedule_task))
        .route("/status", get(task_status))
        .layer(middleware::from_fn_with_state(state.clone(), request_timeout))
        .layer(middleware::from_fn(request_logging))
        .with_state(state)
}
