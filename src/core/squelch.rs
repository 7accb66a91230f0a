//! Per-scheduler squelch flag.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::error;

use crate::core::WiringError;

/// Controls whether a scheduler discards tasks instead of handling them.
#[derive(Debug)]
pub enum Squelcher {
    /// Never squelches; start/stop are refused without logging.
    Disabled,
    /// Never squelches; start/stop are refused and logged at error level.
    Throwing,
    /// Squelching can be switched on and off.
    Toggle(AtomicBool),
}

impl Squelcher {
    /// Toggleable squelcher, initially off.
    #[must_use]
    pub const fn toggleable() -> Self {
        Self::Toggle(AtomicBool::new(false))
    }

    /// Whether tasks should currently be discarded.
    #[must_use]
    pub fn should_squelch(&self) -> bool {
        match self {
            Self::Toggle(flag) => flag.load(Ordering::Acquire),
            Self::Disabled | Self::Throwing => false,
        }
    }

    /// Whether start/stop are supported.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Toggle(_))
    }

    /// Begin discarding tasks.
    ///
    /// # Errors
    ///
    /// [`WiringError::Unsupported`] unless toggleable.
    pub fn start_squelching(&self) -> Result<(), WiringError> {
        self.set(true, "start squelching")
    }

    /// Resume handling tasks.
    ///
    /// # Errors
    ///
    /// [`WiringError::Unsupported`] unless toggleable.
    pub fn stop_squelching(&self) -> Result<(), WiringError> {
        self.set(false, "stop squelching")
    }

    fn set(&self, squelch: bool, operation: &str) -> Result<(), WiringError> {
        match self {
            Self::Toggle(flag) => {
                flag.store(squelch, Ordering::Release);
                Ok(())
            }
            Self::Disabled => Err(WiringError::Unsupported(format!(
                "cannot {operation}: squelching is not enabled"
            ))),
            Self::Throwing => {
                error!(operation, "squelching requested on a scheduler that cannot squelch");
                Err(WiringError::Unsupported(format!(
                    "cannot {operation}: scheduler cannot squelch"
                )))
            }
        }
    }
}
