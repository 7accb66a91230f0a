//! Input wires: typed entry points into a scheduler.

use std::any::TypeId;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::debug;

use crate::core::handler::{BoundHandler, Task};
use crate::core::scheduler::SchedulerCore;
use crate::core::WiringError;
use crate::wires::solder::Destination;
use crate::wires::OutputWire;

struct InputWireInner<IN, OUT> {
    name: String,
    scheduler: Arc<SchedulerCore>,
    output: OutputWire<OUT>,
    handler: OnceLock<BoundHandler<IN, OUT>>,
}

impl<IN: Send + 'static, OUT: Clone + Send + Sync + 'static> InputWireInner<IN, OUT> {
    fn task(&self, data: IN) -> Result<Task, WiringError> {
        let handler = self
            .handler
            .get()
            .ok_or_else(|| WiringError::Unbound(self.qualified_name()))?;
        let handler = Arc::clone(handler);
        let output = self.output.clone();
        Ok(Box::new(move || {
            if let Some(result) = handler(data) {
                output.forward(result);
            }
        }))
    }

    fn put_timeout(&self, data: IN, timeout: Duration) -> Result<bool, WiringError> {
        let task = self.task(data)?;
        self.scheduler.put_timeout(task, timeout)
    }

    fn qualified_name(&self) -> String {
        format!("{}.{}", self.scheduler.name, self.name)
    }
}

impl<IN: Send + 'static, OUT: Clone + Send + Sync + 'static> Destination<IN> for InputWireInner<IN, OUT> {
    fn put(&self, data: IN) -> Result<(), WiringError> {
        let task = self.task(data)?;
        self.scheduler.put(task)
    }

    fn offer(&self, data: IN) -> Result<bool, WiringError> {
        let task = self.task(data)?;
        self.scheduler.offer(task)
    }

    fn inject(&self, data: IN) -> Result<(), WiringError> {
        let task = self.task(data)?;
        self.scheduler.inject(task)
    }
}

/// Typed entry point into a scheduler.
///
/// Data admitted here is handed to the bound handler under the scheduler's
/// discipline; the handler's result goes to the scheduler's primary output
/// wire. Cloning shares the same wire.
pub struct InputWire<IN, OUT> {
    inner: Arc<InputWireInner<IN, OUT>>,
}

impl<IN, OUT> Clone for InputWire<IN, OUT> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<IN, OUT> fmt::Debug for InputWire<IN, OUT> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputWire")
            .field("scheduler", &self.inner.scheduler.name)
            .field("name", &self.inner.name)
            .field("bound", &self.inner.handler.get().is_some())
            .finish()
    }
}

impl<IN: Send + 'static, OUT: Clone + Send + Sync + 'static> InputWire<IN, OUT> {
    pub(crate) fn new(name: String, scheduler: Arc<SchedulerCore>, output: OutputWire<OUT>) -> Self {
        Self {
            inner: Arc::new(InputWireInner {
                name,
                scheduler,
                output,
                handler: OnceLock::new(),
            }),
        }
    }

    /// Wire name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Name of the owning scheduler.
    #[must_use]
    pub fn scheduler_name(&self) -> &str {
        &self.inner.scheduler.name
    }

    /// Whether a handler has been bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.inner.handler.get().is_some()
    }

    /// Bind the handler. Returning `None` forwards nothing.
    ///
    /// # Errors
    ///
    /// [`WiringError::AlreadyBound`] on a second call.
    pub fn bind<F>(&self, handler: F) -> Result<(), WiringError>
    where
        F: Fn(IN) -> Option<OUT> + Send + Sync + 'static,
    {
        self.set_handler(Arc::new(handler))
    }

    /// Bind a handler that produces nothing.
    ///
    /// # Errors
    ///
    /// [`WiringError::AmbiguousBind`] unless the scheduler's output type is `()`,
    /// [`WiringError::AlreadyBound`] on a second call.
    pub fn bind_consumer<F>(&self, consumer: F) -> Result<(), WiringError>
    where
        F: Fn(IN) + Send + Sync + 'static,
    {
        if TypeId::of::<OUT>() != TypeId::of::<()>() {
            return Err(WiringError::AmbiguousBind(self.inner.qualified_name()));
        }
        self.set_handler(Arc::new(move |data: IN| -> Option<OUT> {
            consumer(data);
            None
        }))
    }

    fn set_handler(&self, handler: BoundHandler<IN, OUT>) -> Result<(), WiringError> {
        self.inner
            .handler
            .set(handler)
            .map_err(|_| WiringError::AlreadyBound(self.inner.qualified_name()))?;
        self.inner
            .scheduler
            .context
            .mark_bound(&self.inner.scheduler.name, &self.inner.name);
        debug!(scheduler = %self.inner.scheduler.name, wire = %self.inner.name, "input wire bound");
        Ok(())
    }

    /// Admit `data`, waiting while the scheduler is at capacity.
    ///
    /// # Errors
    ///
    /// [`WiringError::Unbound`] without a handler, [`WiringError::Stopped`] after the model stops.
    pub fn put(&self, data: IN) -> Result<(), WiringError> {
        self.inner.put(data)
    }

    /// Admit `data`, waiting at most `timeout` while the scheduler is at capacity.
    ///
    /// `Ok(false)` means the wait expired and `data` was dropped.
    ///
    /// # Errors
    ///
    /// [`WiringError::Unbound`] without a handler, [`WiringError::Stopped`] after the model stops.
    pub fn put_timeout(&self, data: IN, timeout: Duration) -> Result<bool, WiringError> {
        self.inner.put_timeout(data, timeout)
    }

    /// Admit `data` if the scheduler has capacity now; `Ok(false)` means it was dropped.
    ///
    /// # Errors
    ///
    /// [`WiringError::Unbound`] without a handler, [`WiringError::Stopped`] after the model stops.
    pub fn offer(&self, data: IN) -> Result<bool, WiringError> {
        self.inner.offer(data)
    }

    /// Admit `data` regardless of capacity.
    ///
    /// # Errors
    ///
    /// [`WiringError::Unbound`] without a handler, [`WiringError::Stopped`] after the model stops.
    pub fn inject(&self, data: IN) -> Result<(), WiringError> {
        self.inner.inject(data)
    }

    pub(crate) fn destination(&self) -> Arc<dyn Destination<IN>> {
        Arc::clone(&self.inner) as Arc<dyn Destination<IN>>
    }
}
