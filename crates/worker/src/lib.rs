pub mod executor;
pub mod pool;
pub mod registration;
pub mod reporter;
pub mod service;
pub mod worker;

pub use executor::{ExecutionOutcome, ShellExecutor, TaskExecutor};
pub use pool::ExecutorPool;
pub use registration::RegistrationKeeper;
pub use reporter::StatusReporter;
pub use service::{worker_router, SubmitError, WorkerService};
pub use worker::{advertise_address, Worker};
