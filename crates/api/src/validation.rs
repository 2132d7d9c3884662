//! 提交请求的参数校验

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ApiError;

const MAX_COMMAND_LENGTH: usize = 4096;

/// 命令不能为空白，长度有上限
pub fn validate_command(command: &str) -> Result<(), ApiError> {
    if command.trim().is_empty() {
        return Err(ApiError::BadRequest("command不能为空".to_string()));
    }

    if command.len() > MAX_COMMAND_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "command长度不能超过{MAX_COMMAND_LENGTH}个字节"
        )));
    }

    Ok(())
}

/// 解析RFC3339时间，统一转换为UTC
pub fn parse_scheduled_at(value: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ApiError::BadRequest(format!("scheduled_at不是合法的RFC3339时间: {e}")))
}

pub fn parse_task_id(value: Option<&str>) -> Result<Uuid, ApiError> {
    let value = value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest("缺少task_id参数".to_string()))?;
    Uuid::parse_str(value)
        .map_err(|_| ApiError::BadRequest(format!("task_id格式无效: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_rules() {
        assert!(validate_command("echo hi").is_ok());
        assert!(validate_command("   ").is_err());
        assert!(validate_command(&"x".repeat(MAX_COMMAND_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_scheduled_at_offset_is_normalized() {
        let ts = parse_scheduled_at("2026-03-01T10:00:00+08:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-03-01T02:00:00+00:00");
        assert!(parse_scheduled_at("2026-03-01 10:00").is_err());
    }

    #[test]
    fn test_task_id_rules() {
        let id = Uuid::new_v4();
        assert_eq!(parse_task_id(Some(&id.to_string())).unwrap(), id);
        assert!(parse_task_id(None).is_err());
        assert!(parse_task_id(Some("")).is_err());
        assert!(parse_task_id(Some("42")).is_err());
    }
}
