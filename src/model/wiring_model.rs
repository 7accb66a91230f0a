//! The wiring model: registry, lifecycle and heartbeats.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::builders::TaskSchedulerBuilder;
use crate::config::WiringConfig;
use crate::core::scheduler::SchedulerCore;
use crate::core::{WiringError, WorkerPool};
use crate::model::context::ModelContext;
use crate::model::diagram::render_mermaid;
use crate::model::heartbeat::HeartbeatScheduler;
use crate::model::topology::{Vertex, VertexKind, WiringTopology};
use crate::util::{validate_name, OsTime, Time};
use crate::wires::OutputWire;

struct ModelInner {
    context: Arc<ModelContext>,
    config: WiringConfig,
    time: Arc<dyn Time>,
    default_pool: Mutex<Option<WorkerPool>>,
    schedulers: Mutex<BTreeMap<String, Arc<SchedulerCore>>>,
    heartbeats: HeartbeatScheduler,
}

impl Drop for ModelInner {
    fn drop(&mut self) {
        self.heartbeats.signal_stop();
        for core in self.schedulers.get_mut().values() {
            core.stop();
        }
    }
}

/// Owner of a wiring graph.
///
/// Build schedulers and heartbeats, wire them together, then call
/// [`WiringModel::start`]. After start the graph is frozen; after
/// [`WiringModel::stop`] every admission is refused. Cloning shares the model.
///
/// ```rust,ignore
/// let model = WiringModel::new(WiringConfig::default())?;
/// let doubler = model
///     .scheduler_builder("doubler")?
///     .with_type(TaskSchedulerType::Sequential)
///     .with_unhandled_task_capacity(100)
///     .build::<u64>()?;
/// let input = doubler.build_input_wire::<u64>("numbers")?;
/// input.bind(|n| Some(n * 2))?;
/// doubler.output_wire().solder_to_consumer("print", |n| println!("{n}"))?;
/// model.start()?;
/// input.put(21)?;
/// ```
#[derive(Clone)]
pub struct WiringModel {
    inner: Arc<ModelInner>,
}

impl WiringModel {
    /// Model on the OS clock.
    ///
    /// # Errors
    ///
    /// [`WiringError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: WiringConfig) -> Result<Self, WiringError> {
        Self::with_time(config, Arc::new(OsTime))
    }

    /// Model on a caller-supplied clock.
    ///
    /// # Errors
    ///
    /// [`WiringError::InvalidConfig`] if `config` fails validation.
    pub fn with_time(config: WiringConfig, time: Arc<dyn Time>) -> Result<Self, WiringError> {
        config.validate().map_err(WiringError::InvalidConfig)?;
        let heartbeats = HeartbeatScheduler::new(Arc::clone(&time), config.heartbeat_poll());
        let context = Arc::new(ModelContext::new());
        info!(model = %context.id(), "wiring model created");
        Ok(Self {
            inner: Arc::new(ModelInner {
                context,
                config,
                time,
                default_pool: Mutex::new(None),
                schedulers: Mutex::new(BTreeMap::new()),
                heartbeats,
            }),
        })
    }

    /// Unique id, used in log fields.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.context.id()
    }

    /// Clock shared with heartbeats.
    #[must_use]
    pub fn time(&self) -> Arc<dyn Time> {
        Arc::clone(&self.inner.time)
    }

    /// Model configuration.
    #[must_use]
    pub fn config(&self) -> &WiringConfig {
        &self.inner.config
    }

    /// Start building a scheduler called `name`.
    ///
    /// A matching entry in [`WiringConfig::schedulers`] is applied first.
    ///
    /// # Errors
    ///
    /// Fails on an illegal or already registered name, or once the model has started.
    pub fn scheduler_builder(&self, name: &str) -> Result<TaskSchedulerBuilder, WiringError> {
        validate_name(name)?;
        self.inner.context.ensure_wiring()?;
        if self.inner.schedulers.lock().contains_key(name) {
            return Err(WiringError::DuplicateName(name.to_string()));
        }
        let builder = TaskSchedulerBuilder::new(self.clone(), name.to_string());
        Ok(match self.inner.config.scheduler(name) {
            Some(entry) => builder.with_config(entry),
            None => builder,
        })
    }

    /// Pool used by schedulers built without an explicit one; created on first use.
    ///
    /// # Errors
    ///
    /// Fails if the pool cannot be started.
    pub fn default_pool(&self) -> Result<WorkerPool, WiringError> {
        let mut slot = self.inner.default_pool.lock();
        if let Some(pool) = slot.as_ref() {
            return Ok(pool.clone());
        }
        let pool = WorkerPool::new(self.inner.config.pool.clone())?;
        *slot = Some(pool.clone());
        Ok(pool)
    }

    /// Heartbeat wire ticking once per `period`.
    ///
    /// # Errors
    ///
    /// [`WiringError::InvalidConfig`] for a zero period, [`WiringError::AlreadyStarted`] after start.
    pub fn build_heartbeat_wire(&self, period: Duration) -> Result<OutputWire<Instant>, WiringError> {
        if period.is_zero() {
            return Err(WiringError::InvalidConfig("heartbeat period must be greater than zero".into()));
        }
        let name = format!("heartbeat_{}", self.inner.heartbeats.len());
        self.inner
            .context
            .add_vertex(Vertex::unbounded(name.clone(), VertexKind::Heartbeat))?;
        let output = OutputWire::new(name, Arc::clone(&self.inner.context));
        self.inner.heartbeats.add(period, output.clone());
        Ok(output)
    }

    /// Heartbeat wire ticking `hz` times per second.
    ///
    /// # Errors
    ///
    /// [`WiringError::InvalidConfig`] unless `hz` is positive and finite.
    pub fn build_heartbeat_wire_with_frequency(&self, hz: f64) -> Result<OutputWire<Instant>, WiringError> {
        if !(hz.is_finite() && hz > 0.0) {
            return Err(WiringError::InvalidConfig(format!(
                "heartbeat frequency must be positive and finite, got {hz}"
            )));
        }
        let period = Duration::try_from_secs_f64(hz.recip())
            .map_err(|err| WiringError::InvalidConfig(format!("heartbeat frequency {hz}: {err}")))?;
        self.build_heartbeat_wire(period)
    }

    /// Freeze the wiring and start dedicated threads and heartbeats.
    ///
    /// Logs the result of the cyclical-backpressure and unbound-wire checks.
    ///
    /// # Errors
    ///
    /// [`WiringError::AlreadyStarted`] / [`WiringError::AlreadyStopped`], or a thread spawn failure.
    pub fn start(&self) -> Result<(), WiringError> {
        self.inner.context.start()?;
        self.check_for_cyclical_backpressure();
        self.check_for_unbound_input_wires();

        let schedulers: Vec<Arc<SchedulerCore>> = self.inner.schedulers.lock().values().cloned().collect();
        for core in &schedulers {
            core.start()?;
        }
        self.inner.heartbeats.start()?;
        info!(model = %self.id(), schedulers = schedulers.len(), "wiring model started");
        Ok(())
    }

    /// Refuse further admissions and stop heartbeats and dedicated threads.
    ///
    /// Tasks already admitted run to completion. The default pool keeps
    /// running until the model is dropped.
    ///
    /// # Errors
    ///
    /// [`WiringError::NotStarted`] / [`WiringError::AlreadyStopped`].
    pub fn stop(&self) -> Result<(), WiringError> {
        self.inner.context.stop()?;
        self.inner.heartbeats.stop();
        for core in self.inner.schedulers.lock().values() {
            core.stop();
        }
        info!(model = %self.id(), "wiring model stopped");
        Ok(())
    }

    /// Whether `start` has been called.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.inner.context.is_started()
    }

    /// Whether `stop` has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.context.is_stopped()
    }

    /// Registered scheduler names, sorted.
    #[must_use]
    pub fn scheduler_names(&self) -> Vec<String> {
        self.inner.schedulers.lock().keys().cloned().collect()
    }

    /// Snapshot of the wiring graph.
    #[must_use]
    pub fn topology(&self) -> WiringTopology {
        self.inner.context.topology().clone()
    }

    /// Whether any PUT-only cycle can block on its own backpressure. Each one is logged.
    pub fn check_for_cyclical_backpressure(&self) -> bool {
        let cycles = self.inner.context.topology().find_backpressure_cycles();
        for cycle in &cycles {
            error!(model = %self.id(), cycle = %cycle.join(" -> "), "cyclical backpressure detected");
        }
        !cycles.is_empty()
    }

    /// Whether any input wire lacks a handler. Each one is logged.
    pub fn check_for_unbound_input_wires(&self) -> bool {
        let unbound = self.inner.context.topology().unbound_input_wires();
        for (scheduler, wire) in &unbound {
            warn!(model = %self.id(), scheduler = %scheduler, wire = %wire, "input wire is not bound");
        }
        !unbound.is_empty()
    }

    /// Mermaid flowchart of the wiring graph.
    #[must_use]
    pub fn generate_wiring_diagram(&self) -> String {
        render_mermaid(&self.inner.context.topology())
    }

    pub(crate) fn context(&self) -> Arc<ModelContext> {
        Arc::clone(&self.inner.context)
    }

    /// Register a built scheduler and its vertex.
    pub(crate) fn register(&self, core: Arc<SchedulerCore>, vertex: Vertex) -> Result<(), WiringError> {
        let mut schedulers = self.inner.schedulers.lock();
        if schedulers.contains_key(&core.name) {
            return Err(WiringError::DuplicateName(core.name.clone()));
        }
        self.inner.context.add_vertex(vertex)?;
        schedulers.insert(core.name.clone(), core);
        Ok(())
    }
}

impl fmt::Debug for WiringModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WiringModel")
            .field("id", &self.id())
            .field("started", &self.is_started())
            .field("stopped", &self.is_stopped())
            .field("schedulers", &self.scheduler_names())
            .finish_non_exhaustive()
    }
}
