//! Handler signatures and the side channel for handler failures.

use std::any::Any;
use std::sync::Arc;

use tracing::error;

/// Unit of work run by a scheduler.
pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handler bound to an input wire. `None` forwards nothing.
pub(crate) type BoundHandler<IN, OUT> = Arc<dyn Fn(IN) -> Option<OUT> + Send + Sync>;

/// A handler panic caught by its scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    /// Scheduler that ran the handler.
    pub scheduler: String,
    /// Panic payload rendered as text.
    pub message: String,
}

/// Receives handler failures; never sees failures of other schedulers.
pub type UncaughtExceptionHandler = Arc<dyn Fn(&HandlerFailure) + Send + Sync>;

/// Default handler: log at error level and keep going.
#[must_use]
pub fn log_and_continue() -> UncaughtExceptionHandler {
    Arc::new(|failure: &HandlerFailure| {
        error!(
            scheduler = %failure.scheduler,
            message = %failure.message,
            "handler panicked; continuing with next task"
        );
    })
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
