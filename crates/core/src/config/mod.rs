//! 配置管理
//!
//! 配置按以下顺序合并，后者覆盖前者：
//!
//! 1. 代码内置默认值
//! 2. TOML 配置文件（`--config` 指定，或 `config/taskly.toml`、`taskly.toml`）
//! 3. `POSTGRES_USER` / `POSTGRES_PASSWORD` / `POSTGRES_DB` / `POSTGRES_HOST`
//! 4. `TASKLY__<SECTION>__<KEY>` 形式的环境变量
//!
//! ```rust,no_run
//! use taskly_core::config::AppConfig;
//!
//! let config = AppConfig::load(None).expect("加载配置失败");
//! println!("扫描间隔: {:?}", config.coordinator.scan_interval());
//! ```

pub mod models;

#[cfg(test)]
mod tests;

pub use models::{
    ApiConfig, AppConfig, CoordinatorConfig, DatabaseConfig, ObservabilityConfig, WorkerConfig,
};
