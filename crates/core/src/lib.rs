pub mod config;
pub mod errors;
pub mod logging;

pub use config::{
    ApiConfig, AppConfig, CoordinatorConfig, DatabaseConfig, ObservabilityConfig, WorkerConfig,
};
pub use errors::*;
pub use logging::init_logging;

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
