//! Wiring topology recorded while the model is being assembled.
//!
//! Vertices are schedulers, derived wires, consumers and heartbeats; edges
//! are soldered connections labelled with the input wire they feed. The
//! graph is only inspected, never executed: forwarding uses the edges held by
//! each output wire.

use std::collections::BTreeMap;

use crate::core::{TaskSchedulerType, WiringError};
use crate::wires::SolderType;

/// What a vertex is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexKind {
    /// A scheduler with the given discipline.
    Scheduler(TaskSchedulerType),
    /// Inline map.
    Transformer,
    /// Inline predicate.
    Filter,
    /// Inline collection splitter.
    Splitter,
    /// Inline closure at the end of an edge.
    Consumer,
    /// Heartbeat source.
    Heartbeat,
}

impl VertexKind {
    /// Whether values pass through on the forwarding thread.
    #[must_use]
    pub const fn is_inline(self) -> bool {
        match self {
            Self::Scheduler(scheduler_type) => scheduler_type.runs_on_caller(),
            Self::Transformer | Self::Filter | Self::Splitter | Self::Consumer => true,
            Self::Heartbeat => false,
        }
    }
}

/// A node of the wiring graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vertex {
    /// Unique name.
    pub name: String,
    /// Vertex kind.
    pub kind: VertexKind,
    /// Bounded capacity or external backpressure.
    pub applies_backpressure: bool,
    /// Input wires by name, with whether each has a handler bound.
    pub inputs: BTreeMap<String, bool>,
}

impl Vertex {
    /// Vertex for a scheduler.
    #[must_use]
    pub fn scheduler(name: impl Into<String>, scheduler_type: TaskSchedulerType, applies_backpressure: bool) -> Self {
        Self {
            name: name.into(),
            kind: VertexKind::Scheduler(scheduler_type),
            applies_backpressure,
            inputs: BTreeMap::new(),
        }
    }

    /// Vertex that never applies backpressure itself.
    #[must_use]
    pub fn unbounded(name: impl Into<String>, kind: VertexKind) -> Self {
        Self {
            name: name.into(),
            kind,
            applies_backpressure: false,
            inputs: BTreeMap::new(),
        }
    }

    /// Whether a PUT-only cycle through this vertex can hold a blocked thread.
    fn carries_backpressure(&self) -> bool {
        self.applies_backpressure || self.kind.is_inline()
    }
}

/// A soldered connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Vertex owning the output wire.
    pub source: String,
    /// Vertex receiving the data.
    pub target: String,
    /// Input wire (or derived wire) name.
    pub label: String,
    /// Admission discipline.
    pub solder_type: SolderType,
}

/// The wiring graph.
#[derive(Debug, Clone, Default)]
pub struct WiringTopology {
    vertices: BTreeMap<String, Vertex>,
    edges: Vec<Edge>,
}

impl WiringTopology {
    /// Empty topology.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex.
    ///
    /// # Errors
    ///
    /// [`WiringError::DuplicateName`] if the name is taken.
    pub fn add_vertex(&mut self, vertex: Vertex) -> Result<(), WiringError> {
        if self.vertices.contains_key(&vertex.name) {
            return Err(WiringError::DuplicateName(vertex.name));
        }
        self.vertices.insert(vertex.name.clone(), vertex);
        Ok(())
    }

    /// Register an unbound input wire on `vertex`.
    ///
    /// # Errors
    ///
    /// [`WiringError::DuplicateName`] if the vertex already has an input of that name.
    pub fn add_input(&mut self, vertex: &str, input: &str) -> Result<(), WiringError> {
        let owner = self
            .vertices
            .get_mut(vertex)
            .ok_or_else(|| WiringError::InvalidConfig(format!("unknown vertex `{vertex}`")))?;
        if owner.inputs.contains_key(input) {
            return Err(WiringError::DuplicateName(format!("{vertex}.{input}")));
        }
        owner.inputs.insert(input.to_string(), false);
        Ok(())
    }

    /// Record that an input wire has a handler.
    pub fn mark_bound(&mut self, vertex: &str, input: &str) {
        if let Some(bound) = self.vertices.get_mut(vertex).and_then(|owner| owner.inputs.get_mut(input)) {
            *bound = true;
        }
    }

    /// Add an edge.
    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    /// Vertex by name.
    #[must_use]
    pub fn vertex(&self, name: &str) -> Option<&Vertex> {
        self.vertices.get(name)
    }

    /// Vertices sorted by name.
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.vertices.values()
    }

    /// Edges in soldering order.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// `(vertex, input)` pairs for every input wire without a handler.
    #[must_use]
    pub fn unbound_input_wires(&self) -> Vec<(String, String)> {
        self.vertices
            .values()
            .flat_map(|vertex| {
                vertex
                    .inputs
                    .iter()
                    .filter(|(_, bound)| !**bound)
                    .map(|(input, _)| (vertex.name.clone(), input.clone()))
            })
            .collect()
    }

    /// Cycles of PUT edges in which every vertex holds the forwarding thread
    /// and at least one applies backpressure.
    ///
    /// Such a cycle can fill up and block on itself. OFFER and INJECT edges
    /// and unbounded asynchronous schedulers break a cycle. Each cycle is
    /// reported as the sorted names of its strongly connected component.
    #[must_use]
    pub fn find_backpressure_cycles(&self) -> Vec<Vec<String>> {
        let names: Vec<&str> = self
            .vertices
            .values()
            .filter(|vertex| vertex.carries_backpressure())
            .map(|vertex| vertex.name.as_str())
            .collect();
        let index: BTreeMap<&str, usize> = names.iter().enumerate().map(|(i, name)| (*name, i)).collect();

        let mut adjacency = vec![Vec::new(); names.len()];
        let mut self_loops = vec![false; names.len()];
        for edge in self.edges.iter().filter(|edge| edge.solder_type == SolderType::Put) {
            if let (Some(&from), Some(&to)) = (index.get(edge.source.as_str()), index.get(edge.target.as_str())) {
                adjacency[from].push(to);
                if from == to {
                    self_loops[from] = true;
                }
            }
        }

        strongly_connected_components(&adjacency)
            .into_iter()
            .filter(|component| component.len() > 1 || self_loops[component[0]])
            .filter(|component| {
                component
                    .iter()
                    .any(|&member| self.vertices.get(names[member]).is_some_and(|v| v.applies_backpressure))
            })
            .map(|component| {
                let mut cycle: Vec<String> = component.iter().map(|&member| names[member].to_string()).collect();
                cycle.sort();
                cycle
            })
            .collect()
    }
}

/// Tarjan's algorithm; returns components with at least one member.
fn strongly_connected_components(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    struct Tarjan<'a> {
        adjacency: &'a [Vec<usize>],
        next_index: usize,
        index: Vec<Option<usize>>,
        low_link: Vec<usize>,
        on_stack: Vec<bool>,
        stack: Vec<usize>,
        components: Vec<Vec<usize>>,
    }

    impl Tarjan<'_> {
        fn visit(&mut self, node: usize) {
            self.index[node] = Some(self.next_index);
            self.low_link[node] = self.next_index;
            self.next_index += 1;
            self.stack.push(node);
            self.on_stack[node] = true;

            for &next in &self.adjacency[node] {
                match self.index[next] {
                    None => {
                        self.visit(next);
                        self.low_link[node] = self.low_link[node].min(self.low_link[next]);
                    }
                    Some(next_index) if self.on_stack[next] => {
                        self.low_link[node] = self.low_link[node].min(next_index);
                    }
                    Some(_) => {}
                }
            }

            if Some(self.low_link[node]) == self.index[node] {
                let mut component = Vec::new();
                while let Some(member) = self.stack.pop() {
                    self.on_stack[member] = false;
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                self.components.push(component);
            }
        }
    }

    let count = adjacency.len();
    let mut tarjan = Tarjan {
        adjacency,
        next_index: 0,
        index: vec![None; count],
        low_link: vec![0; count],
        on_stack: vec![false; count],
        stack: Vec::new(),
        components: Vec::new(),
    };
    for node in 0..count {
        if tarjan.index[node].is_none() {
            tarjan.visit(node);
        }
    }
    tarjan.components
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(topology: &mut WiringTopology, name: &str, bounded: bool) {
        topology
            .add_vertex(Vertex::scheduler(name, TaskSchedulerType::Sequential, bounded))
            .unwrap();
    }

    fn solder(topology: &mut WiringTopology, from: &str, to: &str, solder_type: SolderType) {
        topology.add_edge(Edge {
            source: from.into(),
            target: to.into(),
            label: format!("{to}_input"),
            solder_type,
        });
    }

    fn ring(size: usize, bounded: impl Fn(usize) -> bool) -> WiringTopology {
        let mut topology = WiringTopology::new();
        let names: Vec<String> = (0..size).map(|i| format!("s{i}")).collect();
        for (i, name) in names.iter().enumerate() {
            scheduler(&mut topology, name, bounded(i));
        }
        for i in 0..size {
            solder(&mut topology, &names[i], &names[(i + 1) % size], SolderType::Put);
        }
        topology
    }

    #[test]
    fn bounded_loops_of_every_size_are_cycles() {
        for size in 1..=4 {
            let topology = ring(size, |_| true);
            let cycles = topology.find_backpressure_cycles();
            assert_eq!(cycles.len(), 1, "ring of {size}");
            assert_eq!(cycles[0].len(), size);
        }
    }

    #[test]
    fn one_unbounded_async_scheduler_breaks_the_loop() {
        for size in 2..=4 {
            let topology = ring(size, |i| i != 0);
            assert!(topology.find_backpressure_cycles().is_empty(), "ring of {size}");
        }
    }

    #[test]
    fn inject_edge_breaks_the_loop() {
        let mut topology = WiringTopology::new();
        for name in ["a", "b", "c"] {
            scheduler(&mut topology, name, true);
        }
        solder(&mut topology, "a", "b", SolderType::Put);
        solder(&mut topology, "b", "c", SolderType::Put);
        solder(&mut topology, "c", "a", SolderType::Inject);
        assert!(topology.find_backpressure_cycles().is_empty());

        solder(&mut topology, "c", "a", SolderType::Put);
        assert_eq!(topology.find_backpressure_cycles(), vec![vec!["a", "b", "c"]]);
    }

    #[test]
    fn inline_vertices_pass_backpressure_through() {
        let mut topology = WiringTopology::new();
        scheduler(&mut topology, "a", true);
        topology
            .add_vertex(Vertex::scheduler("b", TaskSchedulerType::Direct, false))
            .unwrap();
        topology.add_vertex(Vertex::unbounded("only_even", VertexKind::Filter)).unwrap();
        solder(&mut topology, "a", "b", SolderType::Put);
        solder(&mut topology, "b", "only_even", SolderType::Put);
        solder(&mut topology, "only_even", "a", SolderType::Put);
        assert_eq!(topology.find_backpressure_cycles().len(), 1);
    }

    #[test]
    fn unbounded_loop_is_not_reported() {
        let topology = ring(3, |_| false);
        assert!(topology.find_backpressure_cycles().is_empty());
    }

    #[test]
    fn tracks_unbound_inputs_and_duplicates() {
        let mut topology = WiringTopology::new();
        scheduler(&mut topology, "a", false);
        assert!(matches!(
            topology.add_vertex(Vertex::unbounded("a", VertexKind::Filter)),
            Err(WiringError::DuplicateName(_))
        ));
        topology.add_input("a", "first").unwrap();
        topology.add_input("a", "second").unwrap();
        assert!(topology.add_input("a", "first").is_err());

        topology.mark_bound("a", "first");
        assert_eq!(topology.unbound_input_wires(), vec![("a".to_string(), "second".to_string())]);
    }
}
