use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use taskly_core::SchedulerError;
use taskly_domain::{Task, TaskId};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::routes::AppState;
use crate::validation::{parse_scheduled_at, parse_task_id, validate_command};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub command: String,
    /// RFC3339时间
    pub scheduled_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub command: String,
    /// Unix秒
    pub scheduled_at: i64,
    pub task_id: TaskId,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub task_id: Option<String>,
}

/// 时间戳以字符串返回，未设置的字段为空字符串
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub command: String,
    pub scheduled_at: String,
    pub picked_at: String,
    pub started_at: String,
    pub completed_at: String,
    pub failed_at: String,
}

fn render(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|ts| ts.to_rfc3339_opts(SecondsFormat::Micros, true))
        .unwrap_or_default()
}

impl From<Task> for TaskStatusResponse {
    fn from(task: Task) -> Self {
        Self {
            task_id: task.id.to_string(),
            scheduled_at: render(Some(task.scheduled_at)),
            picked_at: render(task.picked_at),
            started_at: render(task.started_at),
            completed_at: render(task.completed_at),
            failed_at: render(task.failed_at),
            command: task.command,
        }
    }
}

/// 提交任务
pub async fn schedule_task(
    State(state): State<AppState>,
    payload: Result<Json<ScheduleRequest>, JsonRejection>,
) -> ApiResult<Json<ScheduleResponse>> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    validate_command(&request.command)?;
    let scheduled_at = parse_scheduled_at(&request.scheduled_at)?;

    let task_id = state.store.insert(&request.command, scheduled_at).await?;
    state.metrics.record_task_submitted();
    info!(%task_id, %scheduled_at, "任务已提交");

    Ok(Json(ScheduleResponse {
        command: request.command,
        scheduled_at: scheduled_at.timestamp(),
        task_id,
    }))
}

/// 查询任务状态
pub async fn task_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<TaskStatusResponse>> {
    let task_id = parse_task_id(query.task_id.as_deref())?;

    let task = state
        .store
        .get(task_id)
        .await?
        .ok_or_else(|| SchedulerError::TaskNotFound {
            id: task_id.to_string(),
        })?;

    Ok(Json(task.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use taskly_testing_utils::TaskBuilder;

    #[test]
    fn test_unset_timestamps_render_empty() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let task = TaskBuilder::new().scheduled_at(at).picked().build();

        let response = TaskStatusResponse::from(task);
        assert_eq!(response.scheduled_at, "2026-01-02T03:04:05.000000Z");
        assert_eq!(response.picked_at, "2026-01-02T03:04:06.000000Z");
        assert_eq!(response.started_at, "");
        assert_eq!(response.completed_at, "");
        assert_eq!(response.failed_at, "");
    }
}
