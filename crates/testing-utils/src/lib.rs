//! 测试共用的手写Mock与数据构造器

pub mod builders;
pub mod mocks;

pub use builders::TaskBuilder;
pub use mocks::{MockCoordinatorClient, MockWorkerClient, MockWorkerConnector};
