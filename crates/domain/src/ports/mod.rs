pub mod coordinator_rpc;
pub mod worker_rpc;

pub use coordinator_rpc::CoordinatorClient;
pub use worker_rpc::{WorkerClient, WorkerConnector};
