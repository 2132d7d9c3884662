//! 数据库连接与任务存储
//!
//! 按URL前缀自动选择PostgreSQL或SQLite，启动时带重试地建立连接，
//! 并保证 `tasks` 表存在。

pub mod milestones;
pub mod postgres;
pub mod sqlite;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use taskly_core::{DatabaseConfig, SchedulerError, SchedulerResult};
use taskly_domain::TaskStore;
use tracing::{debug, info, warn};

pub use postgres::PostgresTaskStore;
pub use sqlite::SqliteTaskStore;

#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseType {
    PostgreSQL,
    SQLite,
}

impl DatabaseType {
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            DatabaseType::PostgreSQL
        } else {
            DatabaseType::SQLite
        }
    }
}

pub enum DatabasePool {
    PostgreSQL(sqlx::PgPool),
    SQLite(sqlx::SqlitePool),
}

impl DatabasePool {
    /// 单次尝试建立连接池
    pub async fn connect(config: &DatabaseConfig) -> SchedulerResult<Self> {
        let acquire_timeout = Duration::from_secs(config.connection_timeout_seconds);

        match DatabaseType::from_url(&config.url) {
            DatabaseType::PostgreSQL => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .acquire_timeout(acquire_timeout)
                    .connect(&config.url)
                    .await?;
                Ok(DatabasePool::PostgreSQL(pool))
            }
            DatabaseType::SQLite => {
                let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
                // 每个 :memory: 连接都是独立的数据库
                let max_connections = if config.url.contains(":memory:") {
                    1
                } else {
                    config.max_connections
                };
                let pool = SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .acquire_timeout(acquire_timeout)
                    .connect_with(options)
                    .await?;
                Ok(DatabasePool::SQLite(pool))
            }
        }
    }

    /// 按配置的次数和间隔重试连接，全部失败时返回最后一次的错误
    pub async fn connect_with_retry(config: &DatabaseConfig) -> SchedulerResult<Self> {
        let attempts = config.connect_retries.max(1);
        let delay = Duration::from_secs(config.connect_retry_delay_seconds);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match Self::connect(config).await {
                Ok(pool) => {
                    info!(attempt, "数据库连接成功");
                    return Ok(pool);
                }
                Err(e) => {
                    warn!(attempt, max_attempts = attempts, error = %e, "数据库连接失败");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            SchedulerError::Connection("数据库连接重试次数耗尽".to_string())
        }))
    }

    /// 创建 `tasks` 表及扫描用索引（幂等）
    pub async fn ensure_schema(&self) -> SchedulerResult<()> {
        debug!("检查数据库表结构");
        match self {
            DatabasePool::PostgreSQL(pool) => postgres::ensure_schema(pool).await,
            DatabasePool::SQLite(pool) => sqlite::ensure_schema(pool).await,
        }
    }

    pub fn database_type(&self) -> DatabaseType {
        match self {
            DatabasePool::PostgreSQL(_) => DatabaseType::PostgreSQL,
            DatabasePool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    pub async fn health_check(&self) -> SchedulerResult<()> {
        match self {
            DatabasePool::PostgreSQL(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            DatabasePool::SQLite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
        }
        Ok(())
    }

    pub fn task_store(&self) -> Arc<dyn TaskStore> {
        match self {
            DatabasePool::PostgreSQL(pool) => Arc::new(PostgresTaskStore::new(pool.clone())),
            DatabasePool::SQLite(pool) => Arc::new(SqliteTaskStore::new(pool.clone())),
        }
    }

    pub async fn close(&self) {
        match self {
            DatabasePool::PostgreSQL(pool) => pool.close().await,
            DatabasePool::SQLite(pool) => pool.close().await,
        }
    }
}
