use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("连接错误: {0}")]
    Connection(String),

    #[error("Worker池为空，没有可用的Worker")]
    EmptyPool,

    #[error("任务 {task_id} 的状态转换非法: {from} -> {to}")]
    StateViolation {
        task_id: String,
        from: String,
        to: String,
    },

    #[error("RPC调用超时: {0}")]
    RpcTimeout(String),

    #[error("RPC调用失败: {0}")]
    RpcFailure(String),

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("任务未找到: {id}")]
    TaskNotFound { id: String },

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// 是否为可通过重试恢复的瞬时错误
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SchedulerError::Database(_)
                | SchedulerError::Connection(_)
                | SchedulerError::RpcTimeout(_)
                | SchedulerError::RpcFailure(_)
        )
    }

    /// 稳定的错误码，用于HTTP响应体
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::Database(_) => "DATABASE_ERROR",
            SchedulerError::Connection(_) => "CONNECTION_ERROR",
            SchedulerError::EmptyPool => "EMPTY_POOL",
            SchedulerError::StateViolation { .. } => "STATE_VIOLATION",
            SchedulerError::RpcTimeout(_) => "RPC_TIMEOUT",
            SchedulerError::RpcFailure(_) => "RPC_FAILURE",
            SchedulerError::Validation(_) => "VALIDATION_ERROR",
            SchedulerError::TaskNotFound { .. } => "TASK_NOT_FOUND",
            SchedulerError::Serialization(_) => "SERIALIZATION_ERROR",
            SchedulerError::Configuration(_) => "CONFIGURATION_ERROR",
            SchedulerError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SchedulerError::Connection("refused".into()).is_transient());
        assert!(SchedulerError::RpcTimeout("submit".into()).is_transient());
        assert!(SchedulerError::RpcFailure("503".into()).is_transient());
        assert!(!SchedulerError::EmptyPool.is_transient());
        assert!(!SchedulerError::Validation("bad".into()).is_transient());
        assert!(!SchedulerError::StateViolation {
            task_id: "t".into(),
            from: "scheduled".into(),
            to: "started".into(),
        }
        .is_transient());
    }

    #[test]
    fn test_state_violation_message() {
        let err = SchedulerError::StateViolation {
            task_id: "abc".into(),
            from: "scheduled".into(),
            to: "completed".into(),
        };
        assert_eq!(err.code(), "STATE_VIOLATION");
        assert!(err.to_string().contains("scheduled -> completed"));
    }
}
