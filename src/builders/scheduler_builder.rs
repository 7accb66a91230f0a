//! Builder for task schedulers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::SchedulerConfig;
use crate::core::counter::{
    BackpressureObjectCounter, MultiObjectCounter, NoOpObjectCounter, SharedCounter, StandardObjectCounter,
};
use crate::core::handler::{log_and_continue, HandlerFailure, UncaughtExceptionHandler};
use crate::core::scheduler::{
    DedicatedThread, Execution, SchedulerCore, SchedulerMetrics, SequentialQueue,
};
use crate::core::{Squelcher, TaskScheduler, TaskSchedulerType, WiringError, WorkerPool};
use crate::model::topology::Vertex;
use crate::model::WiringModel;
use crate::util::MetricsSink;

/// Configures and builds one [`TaskScheduler`].
///
/// Obtained from [`WiringModel::scheduler_builder`]. Defaults: SEQUENTIAL,
/// unbounded, no external counters, squelching and flushing disabled, the
/// model's default pool and sleep duration, failures logged and ignored.
#[must_use]
pub struct TaskSchedulerBuilder {
    model: WiringModel,
    name: String,
    scheduler_type: TaskSchedulerType,
    unhandled_task_capacity: Option<u64>,
    on_ramp: Option<SharedCounter>,
    off_ramp: Option<SharedCounter>,
    external_back_pressure: bool,
    sleep_duration: Duration,
    squelching_enabled: bool,
    flushing_enabled: bool,
    exception_handler: Option<UncaughtExceptionHandler>,
    pool: Option<WorkerPool>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl TaskSchedulerBuilder {
    pub(crate) fn new(model: WiringModel, name: String) -> Self {
        let sleep_duration = model.config().default_sleep_duration();
        Self {
            model,
            name,
            scheduler_type: TaskSchedulerType::default(),
            unhandled_task_capacity: None,
            on_ramp: None,
            off_ramp: None,
            external_back_pressure: false,
            sleep_duration,
            squelching_enabled: false,
            flushing_enabled: false,
            exception_handler: None,
            pool: None,
            metrics: None,
        }
    }

    /// Apply a declarative configuration entry. The entry's name is ignored.
    pub fn with_config(mut self, config: &SchedulerConfig) -> Self {
        self.scheduler_type = config.scheduler_type;
        self.unhandled_task_capacity = config.unhandled_task_capacity;
        self.external_back_pressure = config.external_back_pressure;
        if let Some(sleep) = config.sleep_duration() {
            self.sleep_duration = sleep;
        }
        self.squelching_enabled = config.squelching_enabled;
        self.flushing_enabled = config.flushing_enabled;
        self
    }

    /// Execution discipline.
    pub const fn with_type(mut self, scheduler_type: TaskSchedulerType) -> Self {
        self.scheduler_type = scheduler_type;
        self
    }

    /// Ceiling on unprocessed tasks; `put` waits while it is reached.
    pub const fn with_unhandled_task_capacity(mut self, capacity: u64) -> Self {
        self.unhandled_task_capacity = Some(capacity);
        self
    }

    /// Extra counter ramped when tasks are admitted, e.g. one shared across a pipeline.
    pub fn with_on_ramp(mut self, counter: SharedCounter) -> Self {
        self.on_ramp = Some(counter);
        self
    }

    /// Extra counter released when tasks finish.
    pub fn with_off_ramp(mut self, counter: SharedCounter) -> Self {
        self.off_ramp = Some(counter);
        self
    }

    /// Mark the scheduler as subject to backpressure from an external counter.
    ///
    /// Only affects cycle detection and diagrams.
    pub const fn with_external_back_pressure(mut self, external: bool) -> Self {
        self.external_back_pressure = external;
        self
    }

    /// Longest wait between capacity re-checks.
    pub const fn with_sleep_duration(mut self, sleep_duration: Duration) -> Self {
        self.sleep_duration = sleep_duration;
        self
    }

    /// Allow squelching to be toggled.
    pub const fn with_squelching_enabled(mut self, enabled: bool) -> Self {
        self.squelching_enabled = enabled;
        self
    }

    /// Allow `flush`.
    pub const fn with_flushing_enabled(mut self, enabled: bool) -> Self {
        self.flushing_enabled = enabled;
        self
    }

    /// Receive handler panics instead of logging them.
    pub fn with_uncaught_exception_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&HandlerFailure) + Send + Sync + 'static,
    {
        self.exception_handler = Some(Arc::new(handler));
        self
    }

    /// Run on `pool` instead of the model's default pool.
    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Report activity to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the scheduler and register it with the model.
    ///
    /// # Errors
    ///
    /// Fails on invalid settings, a duplicate name, a pool that cannot start,
    /// or once the model has started.
    pub fn build<OUT: Clone + Send + Sync + 'static>(self) -> Result<TaskScheduler<OUT>, WiringError> {
        let context = self.model.context();
        context.ensure_wiring()?;
        self.validate()?;

        let inner: SharedCounter = match self.unhandled_task_capacity {
            Some(capacity) => Arc::new(BackpressureObjectCounter::new(
                format!("{}_counter", self.name),
                capacity,
                self.sleep_duration,
            )),
            None if self.flushing_enabled || self.metrics.is_some() => {
                Arc::new(StandardObjectCounter::new(self.sleep_duration))
            }
            None => Arc::new(NoOpObjectCounter),
        };
        let on_ramp = compose(&inner, self.on_ramp.as_ref());
        let off_ramp = compose(&inner, self.off_ramp.as_ref());

        let squelcher = if self.squelching_enabled {
            Squelcher::toggleable()
        } else if self.scheduler_type == TaskSchedulerType::NoOp {
            Squelcher::Throwing
        } else {
            Squelcher::Disabled
        };

        let execution = match self.scheduler_type {
            TaskSchedulerType::Direct => Execution::Direct,
            TaskSchedulerType::DirectThreadsafe => Execution::DirectThreadsafe(Mutex::new(())),
            TaskSchedulerType::Sequential => Execution::Sequential {
                queue: SequentialQueue::default(),
                pool: self.resolve_pool()?,
            },
            TaskSchedulerType::SequentialThread => Execution::SequentialThread(DedicatedThread::new()),
            TaskSchedulerType::Concurrent => Execution::Concurrent(self.resolve_pool()?),
            TaskSchedulerType::NoOp => Execution::NoOp,
        };

        let metrics = self
            .metrics
            .map(|sink| SchedulerMetrics::register(sink, &self.name, &on_ramp));
        let applies_backpressure = on_ramp.is_bounded() || self.external_back_pressure;

        let core = Arc::new(SchedulerCore::new(
            self.name.clone(),
            self.scheduler_type,
            on_ramp,
            off_ramp,
            inner,
            squelcher,
            self.flushing_enabled,
            self.exception_handler.unwrap_or_else(log_and_continue),
            execution,
            Arc::clone(&context),
            metrics,
        ));
        self.model.register(
            Arc::clone(&core),
            Vertex::scheduler(self.name.clone(), self.scheduler_type, applies_backpressure),
        )?;

        debug!(
            model = %context.id(),
            scheduler = %self.name,
            scheduler_type = %self.scheduler_type,
            capacity = ?self.unhandled_task_capacity,
            squelching = self.squelching_enabled,
            flushing = self.flushing_enabled,
            "scheduler built"
        );
        Ok(TaskScheduler::new(core))
    }

    fn validate(&self) -> Result<(), WiringError> {
        if self.unhandled_task_capacity == Some(0) {
            return Err(WiringError::InvalidConfig(format!(
                "scheduler `{}`: unhandled task capacity must be greater than 0",
                self.name
            )));
        }
        if self.sleep_duration.is_zero() {
            return Err(WiringError::InvalidConfig(format!(
                "scheduler `{}`: sleep duration must be greater than 0",
                self.name
            )));
        }
        Ok(())
    }

    fn resolve_pool(&self) -> Result<WorkerPool, WiringError> {
        match &self.pool {
            Some(pool) => Ok(pool.clone()),
            None => self.model.default_pool(),
        }
    }
}

/// Combine the scheduler's own counter with an external one, own counter first.
fn compose(inner: &SharedCounter, external: Option<&SharedCounter>) -> SharedCounter {
    match external {
        None => Arc::clone(inner),
        Some(external) if !inner.is_tracking() => Arc::clone(external),
        Some(external) => Arc::new(MultiObjectCounter::new(vec![Arc::clone(inner), Arc::clone(external)])),
    }
}

impl fmt::Debug for TaskSchedulerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSchedulerBuilder")
            .field("name", &self.name)
            .field("type", &self.scheduler_type)
            .field("unhandled_task_capacity", &self.unhandled_task_capacity)
            .field("external_back_pressure", &self.external_back_pressure)
            .field("sleep_duration", &self.sleep_duration)
            .field("squelching_enabled", &self.squelching_enabled)
            .field("flushing_enabled", &self.flushing_enabled)
            .finish_non_exhaustive()
    }
}
