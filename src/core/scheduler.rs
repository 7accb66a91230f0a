//! Task schedulers: one processing stage with its counters, squelch flag and
//! execution discipline.
//!
//! Every admission goes through the same steps: refuse if the model is
//! stopped, ramp the on-ramp counter according to the admission kind
//! (`put` waits, `offer` tries once, `inject` forces), then hand the task to
//! the discipline. Whatever happens to the task afterwards, it is off-ramped
//! exactly once: after the handler runs, after a handler panic, or when it is
//! discarded.

mod dedicated;
mod sequential;

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::core::counter::SharedCounter;
use crate::core::handler::{panic_message, HandlerFailure, Task, UncaughtExceptionHandler};
use crate::core::squelch::Squelcher;
use crate::core::worker_pool::WorkerPool;
use crate::core::WiringError;
use crate::model::context::ModelContext;
use crate::util::{validate_name, MetricsSink};
use crate::wires::{InputWire, OutputWire};

pub(crate) use dedicated::DedicatedThread;
pub(crate) use sequential::SequentialQueue;

/// Execution discipline of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskSchedulerType {
    /// One task at a time on pool workers, strict FIFO.
    #[default]
    Sequential,
    /// One task at a time on a dedicated thread, strict FIFO.
    SequentialThread,
    /// Tasks run in parallel on the pool, unordered.
    Concurrent,
    /// Runs on the caller's thread.
    Direct,
    /// Runs on the caller's thread, one caller at a time.
    DirectThreadsafe,
    /// Discards every task after ramping the counters.
    NoOp,
}

impl TaskSchedulerType {
    /// Whether handlers run on the thread that admitted the task.
    #[must_use]
    pub const fn runs_on_caller(self) -> bool {
        matches!(self, Self::Direct | Self::DirectThreadsafe)
    }

    /// Whether the discipline needs a worker pool.
    #[must_use]
    pub const fn uses_pool(self) -> bool {
        matches!(self, Self::Sequential | Self::Concurrent)
    }

    /// Upper-case label used in logs and diagrams.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "SEQUENTIAL",
            Self::SequentialThread => "SEQUENTIAL_THREAD",
            Self::Concurrent => "CONCURRENT",
            Self::Direct => "DIRECT",
            Self::DirectThreadsafe => "DIRECT_THREADSAFE",
            Self::NoOp => "NO_OP",
        }
    }
}

impl fmt::Display for TaskSchedulerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of scheduler activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Tasks whose handler ran, panicked ones included.
    pub handled: u64,
    /// Tasks discarded by squelching or a NO_OP discipline.
    pub squelched: u64,
    /// Handler panics.
    pub failed: u64,
    /// Unprocessed task count at the time of the snapshot.
    pub unprocessed: i64,
}

#[derive(Debug, Default)]
struct StatCounters {
    handled: AtomicU64,
    squelched: AtomicU64,
    failed: AtomicU64,
}

/// Metrics sink plus the metric names this scheduler reports under.
pub(crate) struct SchedulerMetrics {
    sink: Arc<dyn MetricsSink>,
    handled: String,
    squelched: String,
    failed: String,
}

impl SchedulerMetrics {
    /// Register the unprocessed-count gauge and prepare counter names.
    pub(crate) fn register(sink: Arc<dyn MetricsSink>, scheduler: &str, on_ramp: &SharedCounter) -> Self {
        let observed = Arc::clone(on_ramp);
        sink.register_gauge(
            &format!("{scheduler}_unhandled_task_count"),
            Box::new(move || observed.count()),
        );
        Self {
            sink,
            handled: format!("{scheduler}_tasks_handled"),
            squelched: format!("{scheduler}_tasks_squelched"),
            failed: format!("{scheduler}_handler_failures"),
        }
    }
}

/// How admitted tasks reach their handler.
pub(crate) enum Execution {
    Direct,
    DirectThreadsafe(Mutex<()>),
    Sequential { queue: SequentialQueue, pool: WorkerPool },
    SequentialThread(DedicatedThread),
    Concurrent(WorkerPool),
    NoOp,
}

/// State shared by a scheduler, its input wires and its queued tasks.
pub(crate) struct SchedulerCore {
    pub(crate) name: String,
    pub(crate) scheduler_type: TaskSchedulerType,
    pub(crate) on_ramp: SharedCounter,
    pub(crate) off_ramp: SharedCounter,
    /// Counter `flush` waits on: the scheduler's own, never an external one.
    pub(crate) flush_counter: SharedCounter,
    pub(crate) squelcher: Squelcher,
    pub(crate) flushing_enabled: bool,
    pub(crate) exception_handler: UncaughtExceptionHandler,
    pub(crate) execution: Execution,
    pub(crate) context: Arc<ModelContext>,
    pub(crate) metrics: Option<SchedulerMetrics>,
    stats: StatCounters,
}

impl SchedulerCore {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        scheduler_type: TaskSchedulerType,
        on_ramp: SharedCounter,
        off_ramp: SharedCounter,
        flush_counter: SharedCounter,
        squelcher: Squelcher,
        flushing_enabled: bool,
        exception_handler: UncaughtExceptionHandler,
        execution: Execution,
        context: Arc<ModelContext>,
        metrics: Option<SchedulerMetrics>,
    ) -> Self {
        Self {
            name,
            scheduler_type,
            on_ramp,
            off_ramp,
            flush_counter,
            squelcher,
            flushing_enabled,
            exception_handler,
            execution,
            context,
            metrics,
            stats: StatCounters::default(),
        }
    }

    fn ensure_accepting(&self) -> Result<(), WiringError> {
        if self.context.is_stopped() {
            return Err(WiringError::Stopped(self.name.clone()));
        }
        Ok(())
    }

    /// Admit a task, waiting for capacity.
    pub(crate) fn put(self: &Arc<Self>, task: Task) -> Result<(), WiringError> {
        self.ensure_accepting()?;
        self.on_ramp.on_ramp();
        self.dispatch(task);
        Ok(())
    }

    /// Admit a task, waiting at most `timeout` for capacity.
    ///
    /// `Ok(false)` means the wait expired and the task was dropped.
    pub(crate) fn put_timeout(self: &Arc<Self>, task: Task, timeout: Duration) -> Result<bool, WiringError> {
        self.ensure_accepting()?;
        if !self.on_ramp.on_ramp_timeout(timeout) {
            trace!(scheduler = %self.name, ?timeout, "put timed out waiting for capacity");
            return Ok(false);
        }
        self.dispatch(task);
        Ok(true)
    }

    /// Admit a task only if capacity is available now.
    pub(crate) fn offer(self: &Arc<Self>, task: Task) -> Result<bool, WiringError> {
        self.ensure_accepting()?;
        if !self.on_ramp.attempt_on_ramp() {
            trace!(scheduler = %self.name, "offer refused: at capacity");
            return Ok(false);
        }
        self.dispatch(task);
        Ok(true)
    }

    /// Admit a task regardless of capacity.
    pub(crate) fn inject(self: &Arc<Self>, task: Task) -> Result<(), WiringError> {
        self.ensure_accepting()?;
        self.on_ramp.force_on_ramp();
        self.dispatch(task);
        Ok(())
    }

    fn dispatch(self: &Arc<Self>, task: Task) {
        match &self.execution {
            Execution::Direct => self.execute(task),
            Execution::DirectThreadsafe(lock) => {
                let _guard = lock.lock();
                self.execute(task);
            }
            Execution::Sequential { queue, pool } => {
                if queue.push(task) {
                    let core = Arc::clone(self);
                    if let Err(job) = pool.submit_or_return(Box::new(move || core.drain_sequential())) {
                        warn!(scheduler = %self.name, "worker pool unavailable; draining on caller thread");
                        job();
                    }
                }
            }
            Execution::SequentialThread(thread) => {
                if let Err(task) = thread.send(task) {
                    warn!(scheduler = %self.name, "dedicated thread stopped; running task on caller thread");
                    self.execute(task);
                }
            }
            Execution::Concurrent(pool) => {
                let core = Arc::clone(self);
                if let Err(job) = pool.submit_or_return(Box::new(move || core.execute(task))) {
                    warn!(scheduler = %self.name, "worker pool unavailable; running task on caller thread");
                    job();
                }
            }
            Execution::NoOp => self.discard(task),
        }
    }

    /// Run one queued task, then hand the rest of the queue to a fresh pool job.
    fn drain_sequential(self: Arc<Self>) {
        let Execution::Sequential { queue, pool } = &self.execution else {
            return;
        };
        loop {
            if let Some(task) = queue.pop() {
                self.execute(task);
            }
            if !queue.continue_draining() {
                return;
            }
            let core = Arc::clone(&self);
            match pool.submit_or_return(Box::new(move || core.drain_sequential())) {
                Ok(()) => return,
                Err(_) => {
                    warn!(scheduler = %self.name, "worker pool unavailable; draining on current thread");
                }
            }
        }
    }

    /// Run or discard one admitted task, then off-ramp it.
    pub(crate) fn execute(&self, task: Task) {
        if self.squelcher.should_squelch() {
            self.discard(task);
            return;
        }
        let outcome = catch_unwind(AssertUnwindSafe(task));
        self.stats.handled.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.sink.increment(&metrics.handled, 1);
        }
        if let Err(payload) = outcome {
            self.report_failure(panic_message(payload.as_ref()));
        }
        self.off_ramp.off_ramp();
    }

    fn discard(&self, task: Task) {
        drop(task);
        self.stats.squelched.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.sink.increment(&metrics.squelched, 1);
        }
        self.off_ramp.off_ramp();
    }

    fn report_failure(&self, message: String) {
        self.stats.failed.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.sink.increment(&metrics.failed, 1);
        }
        let failure = HandlerFailure {
            scheduler: self.name.clone(),
            message,
        };
        let handler = Arc::clone(&self.exception_handler);
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(&failure))) {
            warn!(
                scheduler = %self.name,
                panic = %panic_message(payload.as_ref()),
                "uncaught exception handler panicked"
            );
        }
    }

    pub(crate) fn start(self: &Arc<Self>) -> Result<(), WiringError> {
        if let Execution::SequentialThread(thread) = &self.execution {
            thread.start(self)?;
        }
        Ok(())
    }

    pub(crate) fn stop(&self) {
        if let Execution::SequentialThread(thread) = &self.execution {
            thread.stop();
        }
    }

    fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            handled: self.stats.handled.load(Ordering::Relaxed),
            squelched: self.stats.squelched.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            unprocessed: self.on_ramp.count(),
        }
    }

    fn queued(&self) -> Option<usize> {
        match &self.execution {
            Execution::Sequential { queue, .. } => Some(queue.len()),
            _ => None,
        }
    }
}

/// A processing stage producing values of type `OUT`.
///
/// Built by [`TaskSchedulerBuilder`](crate::builders::TaskSchedulerBuilder).
/// Cloning shares the same stage.
pub struct TaskScheduler<OUT> {
    core: Arc<SchedulerCore>,
    output: OutputWire<OUT>,
}

impl<OUT> Clone for TaskScheduler<OUT> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            output: self.output.clone(),
        }
    }
}

impl<OUT> fmt::Debug for TaskScheduler<OUT> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("name", &self.core.name)
            .field("type", &self.core.scheduler_type)
            .field("unprocessed", &self.core.on_ramp.count())
            .field("queued", &self.core.queued())
            .finish_non_exhaustive()
    }
}

impl<OUT: Clone + Send + Sync + 'static> TaskScheduler<OUT> {
    pub(crate) fn new(core: Arc<SchedulerCore>) -> Self {
        let output = OutputWire::new(core.name.clone(), Arc::clone(&core.context));
        Self { core, output }
    }

    /// Scheduler name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Execution discipline.
    #[must_use]
    pub fn scheduler_type(&self) -> TaskSchedulerType {
        self.core.scheduler_type
    }

    /// Create an input wire accepting `IN`. Bind a handler before sending data.
    ///
    /// # Errors
    ///
    /// Fails on an illegal or duplicate wire name, or once the model has started.
    pub fn build_input_wire<IN: Send + 'static>(&self, name: &str) -> Result<InputWire<IN, OUT>, WiringError> {
        validate_name(name)?;
        self.core.context.add_input(&self.core.name, name)?;
        debug!(scheduler = %self.core.name, wire = name, "input wire built");
        Ok(InputWire::new(name.to_string(), Arc::clone(&self.core), self.output.clone()))
    }

    /// Primary output wire carrying handler results.
    #[must_use]
    pub fn output_wire(&self) -> OutputWire<OUT> {
        self.output.clone()
    }

    /// Additional output wire a handler forwards into explicitly.
    #[must_use]
    pub fn build_secondary_output_wire<T: Clone + Send + Sync + 'static>(&self) -> OutputWire<T> {
        OutputWire::new(self.core.name.clone(), Arc::clone(&self.core.context))
    }

    /// Admitted tasks not yet finished, or `-1` when untracked.
    #[must_use]
    pub fn unprocessed_task_count(&self) -> i64 {
        self.core.on_ramp.count()
    }

    /// Block until every task admitted so far has been handled or discarded.
    ///
    /// Calling this from the scheduler's own handler never returns.
    ///
    /// # Errors
    ///
    /// [`WiringError::Unsupported`] unless flushing was enabled.
    pub fn flush(&self) -> Result<(), WiringError> {
        if !self.core.flushing_enabled {
            return Err(WiringError::Unsupported(format!(
                "flushing is not enabled for scheduler `{}`",
                self.core.name
            )));
        }
        trace!(scheduler = %self.core.name, "flushing");
        self.core.flush_counter.wait_until_empty();
        Ok(())
    }

    /// [`TaskScheduler::flush`] that gives up after `timeout`.
    ///
    /// Returns whether every admitted task finished in time.
    ///
    /// # Errors
    ///
    /// [`WiringError::Unsupported`] unless flushing was enabled.
    pub fn flush_timeout(&self, timeout: Duration) -> Result<bool, WiringError> {
        if !self.core.flushing_enabled {
            return Err(WiringError::Unsupported(format!(
                "flushing is not enabled for scheduler `{}`",
                self.core.name
            )));
        }
        trace!(scheduler = %self.core.name, ?timeout, "flushing with timeout");
        let flushed = self.core.flush_counter.wait_until_empty_timeout(timeout);
        if !flushed {
            debug!(scheduler = %self.core.name, ?timeout, "flush timed out");
        }
        Ok(flushed)
    }

    /// [`TaskScheduler::flush`] on tokio's blocking pool.
    ///
    /// # Errors
    ///
    /// Same as `flush`, plus a pool error if the blocking task fails.
    #[cfg(feature = "tokio-runtime")]
    pub async fn flush_async(&self) -> Result<(), WiringError> {
        let scheduler = self.clone();
        tokio::task::spawn_blocking(move || scheduler.flush())
            .await
            .map_err(|err| {
                WiringError::Pool(crate::core::worker_pool::PoolError::Internal(format!(
                    "flush task failed: {err}"
                )))
            })?
    }

    /// Start discarding queued and newly admitted tasks.
    ///
    /// # Errors
    ///
    /// [`WiringError::Unsupported`] unless squelching was enabled.
    pub fn start_squelching(&self) -> Result<(), WiringError> {
        self.core.squelcher.start_squelching()?;
        debug!(scheduler = %self.core.name, "squelching started");
        Ok(())
    }

    /// Resume handling tasks.
    ///
    /// # Errors
    ///
    /// [`WiringError::Unsupported`] unless squelching was enabled.
    pub fn stop_squelching(&self) -> Result<(), WiringError> {
        self.core.squelcher.stop_squelching()?;
        debug!(scheduler = %self.core.name, "squelching stopped");
        Ok(())
    }

    /// Whether tasks are currently being discarded.
    #[must_use]
    pub fn is_squelching(&self) -> bool {
        self.core.squelcher.should_squelch()
    }

    /// Whether `flush` is supported.
    #[must_use]
    pub fn is_flushing_enabled(&self) -> bool {
        self.core.flushing_enabled
    }

    /// Whether squelching can be toggled.
    #[must_use]
    pub fn is_squelching_enabled(&self) -> bool {
        self.core.squelcher.is_enabled()
    }

    /// Activity snapshot.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.core.stats()
    }
}
