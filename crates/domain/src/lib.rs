pub mod entities;
pub mod lifecycle;
pub mod messages;
pub mod ports;
pub mod repositories;

pub use entities::*;
pub use lifecycle::{validate_transition, TaskState, TransitionOwner};
pub use messages::*;
pub use ports::{CoordinatorClient, WorkerClient, WorkerConnector};
pub use repositories::TaskStore;
pub use taskly_core::{SchedulerError, SchedulerResult};
