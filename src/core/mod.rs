//! Core scheduling abstractions: counters, squelching, schedulers and the worker pool.

pub mod counter;
pub mod error;
pub mod handler;
pub mod scheduler;
pub mod squelch;
pub mod worker_pool;

pub use counter::{
    BackpressureObjectCounter, MultiObjectCounter, NoOpObjectCounter, ObjectCounter, SharedCounter,
    StandardObjectCounter, UNTRACKED_COUNT,
};
pub use error::{AppResult, WiringError};
pub use handler::{log_and_continue, HandlerFailure, UncaughtExceptionHandler};
pub use scheduler::{SchedulerStats, TaskScheduler, TaskSchedulerType};
pub use squelch::Squelcher;
pub use worker_pool::{managed_block, PoolError, PoolStats, WorkerPool};
