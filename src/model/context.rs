//! Lifecycle and topology shared by a model and everything it builds.

use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::core::WiringError;
use crate::model::topology::{Edge, Vertex, WiringTopology};

const CREATED: u8 = 0;
const STARTED: u8 = 1;
const STOPPED: u8 = 2;

pub(crate) struct ModelContext {
    id: Uuid,
    state: AtomicU8,
    topology: Mutex<WiringTopology>,
}

impl ModelContext {
    pub(crate) fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: AtomicU8::new(CREATED),
            topology: Mutex::new(WiringTopology::new()),
        }
    }

    pub(crate) const fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn is_started(&self) -> bool {
        self.state.load(Ordering::Acquire) != CREATED
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.state.load(Ordering::Acquire) == STOPPED
    }

    /// Wiring changes are only allowed before start.
    pub(crate) fn ensure_wiring(&self) -> Result<(), WiringError> {
        if self.is_started() {
            return Err(WiringError::AlreadyStarted);
        }
        Ok(())
    }

    pub(crate) fn start(&self) -> Result<(), WiringError> {
        match self
            .state
            .compare_exchange(CREATED, STARTED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(STARTED) => Err(WiringError::AlreadyStarted),
            Err(_) => Err(WiringError::AlreadyStopped),
        }
    }

    pub(crate) fn stop(&self) -> Result<(), WiringError> {
        match self
            .state
            .compare_exchange(STARTED, STOPPED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(CREATED) => Err(WiringError::NotStarted),
            Err(_) => Err(WiringError::AlreadyStopped),
        }
    }

    pub(crate) fn topology(&self) -> MutexGuard<'_, WiringTopology> {
        self.topology.lock()
    }

    pub(crate) fn add_vertex(&self, vertex: Vertex) -> Result<(), WiringError> {
        self.ensure_wiring()?;
        self.topology().add_vertex(vertex)
    }

    pub(crate) fn add_input(&self, vertex: &str, input: &str) -> Result<(), WiringError> {
        self.ensure_wiring()?;
        self.topology().add_input(vertex, input)
    }

    pub(crate) fn add_edge(&self, edge: Edge) -> Result<(), WiringError> {
        self.ensure_wiring()?;
        self.topology().add_edge(edge);
        Ok(())
    }

    pub(crate) fn mark_bound(&self, vertex: &str, input: &str) {
        self.topology().mark_bound(vertex, input);
    }
}
