use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use taskly_core::SchedulerError;
use taskly_domain::ErrorResponse;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("调度器错误: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("请求处理超时")]
    Timeout,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Scheduler(e) => {
                let status = match e {
                    SchedulerError::Validation(_) => StatusCode::BAD_REQUEST,
                    SchedulerError::TaskNotFound { .. } => StatusCode::NOT_FOUND,
                    SchedulerError::StateViolation { .. } => StatusCode::CONFLICT,
                    SchedulerError::EmptyPool => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.code())
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "REQUEST_TIMEOUT"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!(error = %self, "请求处理失败");
        }

        let message = match &self {
            ApiError::Scheduler(e) => e.to_string(),
            other => other.to_string(),
        };
        let body = ErrorResponse {
            error: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ApiError::Scheduler(SchedulerError::TaskNotFound { id: "x".into() }),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Scheduler(SchedulerError::Validation("bad".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Scheduler(SchedulerError::Connection("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::BadRequest("bad".into()), StatusCode::BAD_REQUEST),
            (ApiError::Timeout, StatusCode::GATEWAY_TIMEOUT),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
