//! The wiring model and its topology.

pub(crate) mod context;
pub mod diagram;
pub(crate) mod heartbeat;
pub mod topology;
pub mod wiring_model;

pub use diagram::render_mermaid;
pub use topology::{Edge, Vertex, VertexKind, WiringTopology};
pub use wiring_model::WiringModel;
