//! 命令执行

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use taskly_core::{SchedulerError, SchedulerResult};
use tokio::process::Command;
use tracing::{debug, info};

/// 一次执行的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// 进程无法启动时返回错误；命令以非零状态退出不是错误
    async fn execute(&self, command: &str) -> SchedulerResult<ExecutionOutcome>;
}

/// 通过 `sh -c` 执行命令
pub struct ShellExecutor {
    shell: String,
}

const OUTPUT_LOG_LIMIT: usize = 2048;

impl ShellExecutor {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }

    pub fn with_shell(shell: &str) -> Self {
        Self {
            shell: shell.to_string(),
        }
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn truncated(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_end();
    match text.char_indices().nth(OUTPUT_LOG_LIMIT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[async_trait]
impl TaskExecutor for ShellExecutor {
    async fn execute(&self, command: &str) -> SchedulerResult<ExecutionOutcome> {
        let started = Instant::now();
        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SchedulerError::Internal(format!("启动命令失败: {e}")))?;

        let outcome = ExecutionOutcome {
            success: output.status.success(),
            exit_code: output.status.code(),
            duration: started.elapsed(),
        };

        debug!(
            stdout = %truncated(&output.stdout),
            stderr = %truncated(&output.stderr),
            "命令输出"
        );
        info!(
            command,
            success = outcome.success,
            exit_code = ?outcome.exit_code,
            duration_ms = outcome.duration.as_millis() as u64,
            "命令执行结束"
        );
        Ok(outcome)
    }
}
