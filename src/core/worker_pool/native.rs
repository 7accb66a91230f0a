//! Native implementation of `WorkerPool` using OS threads.
//!
//! Workers block on a crossbeam channel and exit when the sender is dropped.
//! Each worker records its pool in a thread-local so [`managed_block`] can
//! find it without threading a handle through every counter.

use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::WorkerPoolConfig;
use crate::core::handler::{panic_message, Task};

use super::{PoolCounters, PoolError, PoolStats};

thread_local! {
    static CURRENT_POOL: RefCell<Option<Arc<PoolShared>>> = const { RefCell::new(None) };
}

/// State shared by the pool handle and every worker thread.
struct PoolShared {
    config: WorkerPoolConfig,
    task_rx: Receiver<Task>,
    counters: PoolCounters,
    shutdown: AtomicBool,
    next_worker_id: AtomicUsize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PoolShared {
    fn max_threads(&self) -> usize {
        self.config.worker_count + self.config.max_compensating_threads
    }

    /// Retire the calling worker if more workers are running than the pool's parallelism.
    fn try_retire(&self) -> bool {
        let mut live = self.counters.live_workers.load(Ordering::SeqCst);
        loop {
            let running = live.saturating_sub(self.counters.blocked_workers.load(Ordering::SeqCst));
            if running <= self.config.worker_count {
                return false;
            }
            match self.counters.live_workers.compare_exchange(
                live,
                live - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => live = actual,
            }
        }
    }
}

struct PoolHandle {
    /// Task sender (to workers). Option allows clean shutdown by dropping.
    task_tx: Mutex<Option<Sender<Task>>>,
    shared: Arc<PoolShared>,
}

impl Drop for PoolHandle {
    fn drop(&mut self) {
        // Signal shutdown but don't join; jobs still queued drain on their own.
        if !self.shared.shutdown.swap(true, Ordering::AcqRel) {
            self.task_tx.lock().take();
            debug!("WorkerPool dropped without explicit shutdown - workers will be detached");
        }
    }
}

/// Pool of worker threads with managed-blocking compensation.
///
/// Cloning is cheap; all clones feed the same workers. The pool shuts down
/// when [`WorkerPool::shutdown`] is called or the last clone is dropped.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolHandle>,
}

impl WorkerPool {
    /// Create a pool and start `config.worker_count` worker threads.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidConfig` if the configuration is invalid
    /// - `PoolError::Internal` if a worker thread cannot be spawned
    pub fn new(config: WorkerPoolConfig) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let (task_tx, task_rx) = unbounded::<Task>();
        let shared = Arc::new(PoolShared {
            config,
            task_rx,
            counters: PoolCounters::default(),
            shutdown: AtomicBool::new(false),
            next_worker_id: AtomicUsize::new(0),
            workers: Mutex::new(Vec::new()),
        });

        for _ in 0..shared.config.worker_count {
            spawn_worker(&shared)?;
        }

        info!(
            worker_count = shared.config.worker_count,
            max_compensating_threads = shared.config.max_compensating_threads,
            thread_name_prefix = %shared.config.thread_name_prefix,
            "WorkerPool started"
        );

        Ok(Self {
            inner: Arc::new(PoolHandle {
                task_tx: Mutex::new(Some(task_tx)),
                shared,
            }),
        })
    }

    /// Submit a job.
    ///
    /// # Errors
    ///
    /// `PoolError::PoolShutdown` if the pool has been shut down.
    pub fn submit(&self, job: Task) -> Result<(), PoolError> {
        self.submit_or_return(job).map_err(|_| PoolError::PoolShutdown)
    }

    /// Submit a job, handing it back if the pool no longer accepts work.
    pub(crate) fn submit_or_return(&self, job: Task) -> Result<(), Task> {
        let shared = &self.inner.shared;
        if shared.shutdown.load(Ordering::Acquire) {
            return Err(job);
        }
        let task_tx = self.inner.task_tx.lock();
        let Some(sender) = task_tx.as_ref() else {
            return Err(job);
        };
        shared.counters.queued_jobs.fetch_add(1, Ordering::Relaxed);
        match sender.send(job) {
            Ok(()) => {
                shared.counters.submitted_jobs.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(returned) => {
                shared.counters.queued_jobs.fetch_sub(1, Ordering::Relaxed);
                Err(returned.into_inner())
            }
        }
    }

    /// Configured parallelism.
    #[must_use]
    pub fn parallelism(&self) -> usize {
        self.inner.shared.config.worker_count
    }

    /// Whether `shutdown` was called or the pool was dropped.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shared.shutdown.load(Ordering::Acquire)
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.inner.shared.counters.snapshot(self.inner.shared.config.worker_count)
    }

    /// Shut down the pool gracefully with timeout.
    ///
    /// Queued jobs still run; workers exit once the channel is drained.
    /// Each worker gets two seconds to exit before it is detached. A worker
    /// calling this does not wait for itself.
    pub fn shutdown(&self) {
        let shared = &self.inner.shared;
        if shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        info!("Shutting down worker pool");
        self.inner.task_tx.lock().take();

        let workers: Vec<JoinHandle<()>> = shared.workers.lock().drain(..).collect();
        let worker_count = workers.len();
        let current = thread::current().id();

        for (idx, worker) in workers.into_iter().enumerate() {
            if worker.thread().id() == current {
                continue;
            }
            let (tx, rx) = std::sync::mpsc::channel();
            let join_thread = thread::spawn(move || {
                let result = worker.join();
                let _ = tx.send(result.is_ok());
            });

            match rx.recv_timeout(Duration::from_secs(2)) {
                Ok(true) => debug!(worker_id = idx, "Worker joined successfully"),
                Ok(false) => warn!(worker_id = idx, "Worker panicked"),
                Err(_) => warn!(worker_id = idx, "Worker did not exit within timeout - detaching"),
            }
            // Detach the join thread - worker will eventually exit
            drop(join_thread);
        }

        info!(worker_count = worker_count, "Worker pool shut down complete");
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.inner.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Run `blocker`, letting the current pool (if any) compensate for the blocked worker.
///
/// Outside a pool worker this simply calls `blocker`. Inside one, the worker
/// is counted as blocked and a compensating worker is started when fewer
/// than `worker_count` unblocked workers would remain, up to the configured
/// compensation limit.
pub fn managed_block<R>(blocker: impl FnOnce() -> R) -> R {
    let Some(shared) = CURRENT_POOL.with(|current| current.borrow().clone()) else {
        return blocker();
    };

    let blocked = shared.counters.blocked_workers.fetch_add(1, Ordering::SeqCst) + 1;
    let _guard = BlockedGuard(&shared.counters);

    let live = shared.counters.live_workers.load(Ordering::SeqCst);
    let running = live.saturating_sub(blocked);
    if running < shared.config.worker_count && !shared.shutdown.load(Ordering::Acquire) {
        if live < shared.max_threads() {
            shared.counters.compensations.fetch_add(1, Ordering::Relaxed);
            if let Err(err) = spawn_worker(&shared) {
                warn!(error = %err, "failed to start compensating worker");
            }
        } else {
            warn!(
                live_workers = live,
                blocked_workers = blocked,
                "compensation limit reached; blocking without a spare worker"
            );
        }
    }

    blocker()
}

struct BlockedGuard<'a>(&'a PoolCounters);

impl Drop for BlockedGuard<'_> {
    fn drop(&mut self) {
        self.0.blocked_workers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Spawn a worker thread.
fn spawn_worker(shared: &Arc<PoolShared>) -> Result<(), PoolError> {
    let worker_id = shared.next_worker_id.fetch_add(1, Ordering::Relaxed);
    shared.counters.live_workers.fetch_add(1, Ordering::SeqCst);

    let thread_shared = Arc::clone(shared);
    let spawned = thread::Builder::new()
        .name(format!("{}-{worker_id}", shared.config.thread_name_prefix))
        .stack_size(shared.config.thread_stack_size)
        .spawn(move || worker_loop(worker_id, thread_shared));

    match spawned {
        Ok(handle) => {
            let mut workers = shared.workers.lock();
            workers.retain(|worker| !worker.is_finished());
            workers.push(handle);
            Ok(())
        }
        Err(err) => {
            shared.counters.live_workers.fetch_sub(1, Ordering::SeqCst);
            Err(PoolError::Internal(format!("failed to spawn worker thread: {err}")))
        }
    }
}

fn worker_loop(worker_id: usize, shared: Arc<PoolShared>) {
    CURRENT_POOL.with(|current| *current.borrow_mut() = Some(Arc::clone(&shared)));
    debug!(worker_id = worker_id, "Worker thread started");

    loop {
        match shared.task_rx.recv_timeout(shared.config.keep_alive()) {
            Ok(job) => {
                shared.counters.queued_jobs.fetch_sub(1, Ordering::Relaxed);
                shared.counters.active_jobs.fetch_add(1, Ordering::Relaxed);

                if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
                    shared.counters.panicked_jobs.fetch_add(1, Ordering::Relaxed);
                    error!(
                        worker_id = worker_id,
                        panic = %panic_message(payload.as_ref()),
                        "job panicked on worker thread"
                    );
                }

                shared.counters.active_jobs.fetch_sub(1, Ordering::Relaxed);
                shared.counters.completed_jobs.fetch_add(1, Ordering::Relaxed);

                if shared.try_retire() {
                    debug!(worker_id = worker_id, "Surplus worker retiring");
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if shared.try_retire() {
                    debug!(worker_id = worker_id, "Idle surplus worker retiring");
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                shared.counters.live_workers.fetch_sub(1, Ordering::SeqCst);
                debug!(worker_id = worker_id, "Worker channel closed, exiting");
                break;
            }
        }
    }

    CURRENT_POOL.with(|current| current.borrow_mut().take());
}
