use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 协调器配置：Worker池管理、心跳检测与任务扫描
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub bind_address: String,
    pub heartbeat_interval_seconds: u64,
    /// 连续心跳失败次数超过该值时将Worker移出池
    pub max_heartbeat_misses: u8,
    pub scan_interval_seconds: u64,
    pub rpc_timeout_seconds: u64,
    pub scan_batch_size: u32,
    pub shutdown_grace_seconds: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            heartbeat_interval_seconds: 10,
            max_heartbeat_misses: 1,
            scan_interval_seconds: 10,
            rpc_timeout_seconds: 5,
            scan_batch_size: 1000,
            shutdown_grace_seconds: 5,
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_address.is_empty() {
            return Err(anyhow::anyhow!("协调器监听地址不能为空"));
        }

        if self.heartbeat_interval_seconds == 0 {
            return Err(anyhow::anyhow!("心跳间隔必须大于0"));
        }

        if self.scan_interval_seconds == 0 {
            return Err(anyhow::anyhow!("扫描间隔必须大于0"));
        }

        if self.rpc_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("RPC超时时间必须大于0"));
        }

        if self.scan_batch_size == 0 {
            return Err(anyhow::anyhow!("单次扫描任务数必须大于0"));
        }

        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_seconds)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// 本地监听地址，worker模式下必填
    pub bind_address: String,
    /// 协调器回连本Worker使用的地址，缺省时由主机名和端口推导
    pub advertise_address: Option<String>,
    pub coordinator_url: String,
    pub pool_size: usize,
    pub queue_capacity: usize,
    pub reregister_after_seconds: u64,
    pub status_report_retries: u32,
    pub rpc_timeout_seconds: u64,
    pub shutdown_grace_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bind_address: String::new(),
            advertise_address: None,
            coordinator_url: "http://127.0.0.1:8080".to_string(),
            pool_size: 5,
            queue_capacity: 100,
            reregister_after_seconds: 30,
            status_report_retries: 3,
            rpc_timeout_seconds: 5,
            shutdown_grace_seconds: 10,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.coordinator_url.is_empty() {
            return Err(anyhow::anyhow!("协调器地址不能为空"));
        }

        if !self.coordinator_url.starts_with("http://")
            && !self.coordinator_url.starts_with("https://")
        {
            return Err(anyhow::anyhow!(
                "协调器地址必须以http://或https://开头: {}",
                self.coordinator_url
            ));
        }

        if self.pool_size == 0 {
            return Err(anyhow::anyhow!("执行池大小必须大于0"));
        }

        if self.queue_capacity == 0 {
            return Err(anyhow::anyhow!("任务队列容量必须大于0"));
        }

        if self.reregister_after_seconds == 0 {
            return Err(anyhow::anyhow!("重新注册等待时间必须大于0"));
        }

        if self.rpc_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("RPC超时时间必须大于0"));
        }

        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_seconds)
    }

    pub fn reregister_after(&self) -> Duration {
        Duration::from_secs(self.reregister_after_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinator_default_cadence() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(10));
        assert_eq!(config.scan_interval(), Duration::from_secs(10));
        assert_eq!(config.max_heartbeat_misses, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_coordinator_rejects_zero_intervals() {
        let config = CoordinatorConfig {
            scan_interval_seconds: 0,
            ..CoordinatorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = CoordinatorConfig {
            heartbeat_interval_seconds: 0,
            ..CoordinatorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_worker_rejects_bad_coordinator_url() {
        let config = WorkerConfig {
            coordinator_url: "127.0.0.1:8080".to_string(),
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_worker_rejects_empty_pool() {
        let config = WorkerConfig {
            pool_size: 0,
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
