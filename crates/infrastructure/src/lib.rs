pub mod database;
pub mod memory;
pub mod observability;
pub mod rpc;

pub use database::{DatabasePool, DatabaseType, PostgresTaskStore, SqliteTaskStore};
pub use memory::InMemoryTaskStore;
pub use observability::{init_prometheus_exporter, MetricsCollector};
pub use rpc::{HttpCoordinatorClient, HttpWorkerClient, HttpWorkerConnector};
