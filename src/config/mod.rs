//! Configuration models for worker pools, schedulers and the wiring model.

pub mod scheduler;
pub mod wiring;
pub mod worker_pool;

pub use scheduler::SchedulerConfig;
pub use wiring::WiringConfig;
pub use worker_pool::WorkerPoolConfig;
