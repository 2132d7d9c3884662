//! # Taskly API
//!
//! 任务提交HTTP服务：
//!
//! - `POST /schedule` 提交任务，`{command, scheduled_at}`，时间为RFC3339
//! - `GET /status?task_id=...` 查询任务各阶段时间戳
//! - `GET /health` 健康检查
//!
//! 只写入 `scheduled_at`，之后的生命周期由协调器和Worker推进。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod validation;

pub use error::{ApiError, ApiResult};
pub use handlers::tasks::{ScheduleRequest, ScheduleResponse, TaskStatusResponse};
pub use routes::{create_routes, AppState};
pub use server::ApiServer;
