//! 指标采集与导出

pub mod metrics_collector;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

pub use metrics_collector::MetricsCollector;

/// 安装全局Prometheus记录器，并在 `bind_address` 上提供 `/metrics`
///
/// 必须在Tokio运行时内调用，每个进程只能安装一次。
pub fn init_prometheus_exporter(bind_address: &str) -> Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {bind_address}"))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("安装Prometheus导出器失败: {e}"))?;

    info!(%addr, "Prometheus指标导出已启动");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_bind_address() {
        assert!(init_prometheus_exporter("not-an-address").is_err());
    }
}
