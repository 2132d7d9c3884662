//! 协调器：Worker池注册表、心跳检测、到期任务扫描以及面向Worker的RPC服务

pub mod coordinator;
pub mod heartbeat_monitor;
pub mod registry;
pub mod rpc_service;
pub mod task_scanner;

pub use coordinator::Coordinator;
pub use heartbeat_monitor::{HeartbeatMonitor, HeartbeatReport};
pub use registry::{HeartbeatOutcome, WorkerInfo, WorkerPool};
pub use rpc_service::{rpc_router, RpcError, RpcState};
pub use task_scanner::{ScanReport, TaskScanner};
