//! Worker pool running scheduler jobs on dedicated OS threads.
//!
//! SEQUENTIAL and CONCURRENT schedulers hand their work to a `WorkerPool`.
//! Jobs are boxed closures fed to named worker threads through a crossbeam
//! channel. A job that blocks on backpressure or a flush calls
//! [`managed_block`], which lets the pool start a compensating worker so a
//! chain of bounded schedulers keeps moving even when it is longer than the
//! pool is wide.
//!
//! # Example
//!
//! ```rust,ignore
//! use prometheus_wiring::config::WorkerPoolConfig;
//! use prometheus_wiring::core::WorkerPool;
//!
//! let pool = WorkerPool::new(WorkerPoolConfig::new().with_worker_count(2))?;
//! pool.submit(Box::new(|| println!("hello from a worker")))?;
//! pool.shutdown();
//! ```

mod native;

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Errors that can occur when using a `WorkerPool`.
#[derive(Debug)]
pub enum PoolError {
    /// The pool has been shut down.
    PoolShutdown,

    /// Configuration validation failed.
    InvalidConfig(String),

    /// Internal error (thread spawn failure, channel closed, etc.).
    Internal(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoolShutdown => write!(f, "pool has been shut down"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Configured parallelism.
    pub worker_count: usize,

    /// Worker threads currently alive, compensating workers included.
    pub live_workers: usize,

    /// Workers parked inside `managed_block`.
    pub blocked_workers: usize,

    /// Jobs currently executing.
    pub active_jobs: u64,

    /// Jobs waiting in the channel.
    pub queued_jobs: u64,

    /// Jobs finished, panicked ones included.
    pub completed_jobs: u64,

    /// Jobs that panicked.
    pub panicked_jobs: u64,

    /// Jobs submitted.
    pub submitted_jobs: u64,

    /// Compensating workers started by `managed_block`.
    pub compensations: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub live_workers: AtomicUsize,
    pub blocked_workers: AtomicUsize,
    pub active_jobs: AtomicU64,
    pub queued_jobs: AtomicU64,
    pub completed_jobs: AtomicU64,
    pub panicked_jobs: AtomicU64,
    pub submitted_jobs: AtomicU64,
    pub compensations: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, worker_count: usize) -> PoolStats {
        PoolStats {
            worker_count,
            live_workers: self.live_workers.load(Ordering::SeqCst),
            blocked_workers: self.blocked_workers.load(Ordering::SeqCst),
            active_jobs: self.active_jobs.load(Ordering::Relaxed),
            queued_jobs: self.queued_jobs.load(Ordering::Relaxed),
            completed_jobs: self.completed_jobs.load(Ordering::Relaxed),
            panicked_jobs: self.panicked_jobs.load(Ordering::Relaxed),
            submitted_jobs: self.submitted_jobs.load(Ordering::Relaxed),
            compensations: self.compensations.load(Ordering::Relaxed),
        }
    }
}

pub use native::{managed_block, WorkerPool};
