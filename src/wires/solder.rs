//! Soldered edges and the inline vertices that run during forwarding.

use std::fmt;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::core::handler::panic_message;
use crate::core::WiringError;
use crate::wires::OutputWire;

/// Admission discipline of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolderType {
    /// Wait for capacity; backpressure propagates upstream.
    #[default]
    Put,
    /// Deliver only if capacity is available; otherwise drop the value.
    Offer,
    /// Deliver regardless of capacity.
    Inject,
}

impl fmt::Display for SolderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Put => "PUT",
            Self::Offer => "OFFER",
            Self::Inject => "INJECT",
        })
    }
}

/// Something an output wire can deliver into.
///
/// Inline vertices only implement `put`; they never block on their own.
pub(crate) trait Destination<T>: Send + Sync {
    fn put(&self, data: T) -> Result<(), WiringError>;

    fn offer(&self, data: T) -> Result<bool, WiringError> {
        self.put(data).map(|()| true)
    }

    fn inject(&self, data: T) -> Result<(), WiringError> {
        self.put(data)
    }
}

/// One `(target, solder type, destination)` record on an output wire.
pub(crate) struct SolderedEdge<T> {
    pub(crate) target: String,
    pub(crate) solder_type: SolderType,
    pub(crate) destination: Arc<dyn Destination<T>>,
}

impl<T> SolderedEdge<T> {
    /// Deliver one value. Failures and panics are logged and stay local to this edge.
    pub(crate) fn deliver(&self, data: T) {
        let delivered = catch_unwind(AssertUnwindSafe(|| match self.solder_type {
            SolderType::Put => self.destination.put(data),
            SolderType::Offer => self.destination.offer(data).map(|accepted| {
                if !accepted {
                    trace!(destination = %self.target, "offer dropped: destination at capacity");
                }
            }),
            SolderType::Inject => self.destination.inject(data),
        }));
        let outcome = match delivered {
            Ok(outcome) => outcome,
            Err(payload) => {
                error!(
                    destination = %self.target,
                    solder_type = %self.solder_type,
                    panic = %panic_message(payload.as_ref()),
                    "destination panicked while forwarding"
                );
                return;
            }
        };
        match outcome {
            Ok(()) => {}
            Err(err @ WiringError::Stopped(_)) => {
                debug!(destination = %self.target, error = %err, "value dropped after stop");
            }
            Err(err) => {
                error!(destination = %self.target, solder_type = %self.solder_type, error = %err, "failed to forward value");
            }
        }
    }
}

/// Plain closure consuming forwarded values.
pub(crate) struct ConsumerSink<T> {
    pub(crate) consumer: Arc<dyn Fn(T) + Send + Sync>,
}

impl<T> Destination<T> for ConsumerSink<T> {
    fn put(&self, data: T) -> Result<(), WiringError> {
        (self.consumer)(data);
        Ok(())
    }
}

/// Maps each value and forwards the result.
pub(crate) struct Transformer<T, U> {
    pub(crate) transform: Arc<dyn Fn(T) -> U + Send + Sync>,
    pub(crate) output: OutputWire<U>,
}

impl<T, U: Clone + Send + Sync + 'static> Destination<T> for Transformer<T, U> {
    fn put(&self, data: T) -> Result<(), WiringError> {
        self.output.forward((self.transform)(data));
        Ok(())
    }
}

/// Forwards values matching a predicate.
pub(crate) struct Filter<T> {
    pub(crate) predicate: Arc<dyn Fn(&T) -> bool + Send + Sync>,
    pub(crate) output: OutputWire<T>,
}

impl<T: Clone + Send + Sync + 'static> Destination<T> for Filter<T> {
    fn put(&self, data: T) -> Result<(), WiringError> {
        if (self.predicate)(&data) {
            self.output.forward(data);
        }
        Ok(())
    }
}

/// Forwards each element of a collection separately.
pub(crate) struct Splitter<T, E> {
    pub(crate) output: OutputWire<E>,
    pub(crate) _input: PhantomData<fn(T)>,
}

impl<T, E> Destination<T> for Splitter<T, E>
where
    T: IntoIterator<Item = E>,
    E: Clone + Send + Sync + 'static,
{
    fn put(&self, data: T) -> Result<(), WiringError> {
        for element in data {
            self.output.forward(element);
        }
        Ok(())
    }
}
