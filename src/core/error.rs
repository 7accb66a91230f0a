//! Error types for wiring operations.

use thiserror::Error;

use crate::core::worker_pool::PoolError;

/// Errors produced while building, wiring or driving a model.
#[derive(Debug, Error)]
pub enum WiringError {
    /// Name is empty or contains characters other than ASCII letters, digits and underscores.
    #[error("illegal name `{0}`: names must be non-empty and contain only ASCII letters, digits and underscores")]
    IllegalName(String),
    /// Name already used by another scheduler, wire or derived vertex.
    #[error("name `{0}` is already in use")]
    DuplicateName(String),
    /// Input wire already has a handler.
    #[error("input wire `{0}` is already bound")]
    AlreadyBound(String),
    /// Input wire received data before a handler was bound.
    #[error("input wire `{0}` has no bound handler")]
    Unbound(String),
    /// Consumer bound to a wire whose scheduler produces output.
    #[error("input wire `{0}` belongs to a scheduler with a non-unit output type; bind a value-returning handler")]
    AmbiguousBind(String),
    /// Operation not enabled for this scheduler.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    /// Model already started; wiring is frozen.
    #[error("model has already been started")]
    AlreadyStarted,
    /// Model has not been started yet.
    #[error("model has not been started")]
    NotStarted,
    /// Model already stopped.
    #[error("model has already been stopped")]
    AlreadyStopped,
    /// Admission refused because the model was stopped.
    #[error("scheduler `{0}` refused data: model stopped")]
    Stopped(String),
    /// Configuration value out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Worker pool failure.
    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
