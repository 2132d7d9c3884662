//! 协调器与Worker之间基于HTTP+JSON的RPC客户端

pub mod coordinator_client;
pub mod worker_client;

use std::time::Duration;

use taskly_core::{SchedulerError, SchedulerResult};
use url::Url;

pub use coordinator_client::HttpCoordinatorClient;
pub use worker_client::{HttpWorkerClient, HttpWorkerConnector};

/// 把 `host:port` 或完整URL规范化为以 `/` 结尾的基础URL
pub fn base_url(address: &str) -> SchedulerResult<Url> {
    let with_scheme = if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    };
    let normalized = if with_scheme.ends_with('/') {
        with_scheme
    } else {
        format!("{with_scheme}/")
    };

    let url = Url::parse(&normalized)
        .map_err(|e| SchedulerError::Validation(format!("无效的地址 {address}: {e}")))?;
    if url.host_str().is_none() {
        return Err(SchedulerError::Validation(format!("地址缺少主机: {address}")));
    }
    Ok(url)
}

pub(crate) fn join(base: &Url, path: &str) -> SchedulerResult<Url> {
    base.join(path)
        .map_err(|e| SchedulerError::Internal(format!("拼接RPC路径 {path} 失败: {e}")))
}

pub(crate) fn http_client(timeout: Duration) -> SchedulerResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SchedulerError::Internal(format!("创建HTTP客户端失败: {e}")))
}

/// 超时单独归类，其余网络错误都视为RPC失败
pub(crate) fn map_transport_error(target: &str, error: reqwest::Error) -> SchedulerError {
    if error.is_timeout() {
        SchedulerError::RpcTimeout(format!("{target}: {error}"))
    } else {
        SchedulerError::RpcFailure(format!("{target}: {error}"))
    }
}
