//! Output wires: fan-out of values to soldered destinations.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::core::WiringError;
use crate::model::context::ModelContext;
use crate::model::topology::{Edge, Vertex, VertexKind};
use crate::util::validate_name;
use crate::wires::solder::{ConsumerSink, Destination, Filter, SolderedEdge, Splitter, Transformer};
use crate::wires::{InputWire, SolderType};

struct OutputWireInner<T> {
    vertex: String,
    context: Arc<ModelContext>,
    edges: RwLock<Vec<Arc<SolderedEdge<T>>>>,
}

/// Source of values of type `T`, forwarded to every soldered destination.
///
/// Cloning shares the same wire.
pub struct OutputWire<T> {
    inner: Arc<OutputWireInner<T>>,
}

impl<T> Clone for OutputWire<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for OutputWire<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputWire")
            .field("vertex", &self.inner.vertex)
            .field("destinations", &self.inner.edges.read().len())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> OutputWire<T> {
    pub(crate) fn new(vertex: String, context: Arc<ModelContext>) -> Self {
        Self {
            inner: Arc::new(OutputWireInner {
                vertex,
                context,
                edges: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Name of the vertex producing this wire's values.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.vertex
    }

    /// Number of soldered destinations.
    #[must_use]
    pub fn destination_count(&self) -> usize {
        self.inner.edges.read().len()
    }

    /// Solder to `input` with [`SolderType::Put`].
    ///
    /// # Errors
    ///
    /// [`WiringError::AlreadyStarted`] once the model has started.
    pub fn solder<OUT: Clone + Send + Sync + 'static>(&self, input: &InputWire<T, OUT>) -> Result<(), WiringError> {
        self.solder_to(input, SolderType::Put)
    }

    /// Solder to `input` with the given admission discipline.
    ///
    /// # Errors
    ///
    /// [`WiringError::AlreadyStarted`] once the model has started.
    pub fn solder_to<OUT: Clone + Send + Sync + 'static>(
        &self,
        input: &InputWire<T, OUT>,
        solder_type: SolderType,
    ) -> Result<(), WiringError> {
        self.attach(
            input.scheduler_name(),
            input.name(),
            solder_type,
            input.destination(),
        )
    }

    /// Forward every value into `consumer`, inline on the forwarding thread.
    ///
    /// # Errors
    ///
    /// Fails on an illegal or duplicate name, or once the model has started.
    pub fn solder_to_consumer<F>(&self, name: &str, consumer: F) -> Result<(), WiringError>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.add_derived(name, VertexKind::Consumer)?;
        let sink = ConsumerSink {
            consumer: Arc::new(consumer),
        };
        self.attach(name, name, SolderType::Put, Arc::new(sink))
    }

    /// Derived wire carrying `transform(value)` for every value.
    ///
    /// # Errors
    ///
    /// Fails on an illegal or duplicate name, or once the model has started.
    pub fn build_transformer<U, F>(&self, name: &str, transform: F) -> Result<OutputWire<U>, WiringError>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.add_derived(name, VertexKind::Transformer)?;
        let output = OutputWire::new(name.to_string(), Arc::clone(&self.inner.context));
        let transformer = Transformer {
            transform: Arc::new(transform),
            output: output.clone(),
        };
        self.attach(name, name, SolderType::Put, Arc::new(transformer))?;
        Ok(output)
    }

    /// Derived wire carrying only the values `predicate` accepts.
    ///
    /// # Errors
    ///
    /// Fails on an illegal or duplicate name, or once the model has started.
    pub fn build_filter<F>(&self, name: &str, predicate: F) -> Result<Self, WiringError>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.add_derived(name, VertexKind::Filter)?;
        let output = Self::new(name.to_string(), Arc::clone(&self.inner.context));
        let filter = Filter {
            predicate: Arc::new(predicate),
            output: output.clone(),
        };
        self.attach(name, name, SolderType::Put, Arc::new(filter))?;
        Ok(output)
    }

    /// Derived wire carrying each element of every collection value.
    ///
    /// # Errors
    ///
    /// Fails on an illegal or duplicate name, or once the model has started.
    pub fn build_splitter<E>(&self, name: &str) -> Result<OutputWire<E>, WiringError>
    where
        T: IntoIterator<Item = E>,
        E: Clone + Send + Sync + 'static,
    {
        self.add_derived(name, VertexKind::Splitter)?;
        let output = OutputWire::new(name.to_string(), Arc::clone(&self.inner.context));
        let splitter = Splitter {
            output: output.clone(),
            _input: PhantomData,
        };
        self.attach(name, name, SolderType::Put, Arc::new(splitter))?;
        Ok(output)
    }

    /// Deliver `data` to every destination in soldering order.
    ///
    /// Each destination gets its own clone; a failure or panic at one does not affect
    /// the others. PUT destinations may block this call.
    pub fn forward(&self, data: T) {
        let edges: Vec<Arc<SolderedEdge<T>>> = self.inner.edges.read().clone();
        let Some((last, rest)) = edges.split_last() else {
            return;
        };
        for edge in rest {
            edge.deliver(data.clone());
        }
        last.deliver(data);
    }

    fn add_derived(&self, name: &str, kind: VertexKind) -> Result<(), WiringError> {
        validate_name(name)?;
        self.inner.context.add_vertex(Vertex::unbounded(name, kind))
    }

    fn attach(
        &self,
        target: &str,
        label: &str,
        solder_type: SolderType,
        destination: Arc<dyn Destination<T>>,
    ) -> Result<(), WiringError> {
        self.inner.context.add_edge(Edge {
            source: self.inner.vertex.clone(),
            target: target.to_string(),
            label: label.to_string(),
            solder_type,
        })?;
        let qualified = if target == label {
            target.to_string()
        } else {
            format!("{target}.{label}")
        };
        self.inner.edges.write().push(Arc::new(SolderedEdge {
            target: qualified,
            solder_type,
            destination,
        }));
        debug!(
            source = %self.inner.vertex,
            destination = target,
            wire = label,
            solder_type = %solder_type,
            "soldered"
        );
        Ok(())
    }
}
