//! Mermaid rendering of a wiring topology.

use std::fmt::Write;

use crate::model::topology::{Vertex, VertexKind, WiringTopology};
use crate::wires::SolderType;

/// Render `topology` as a Mermaid flowchart.
///
/// Schedulers are boxes labelled with their discipline, derived wires are
/// rounded, consumers are flags and heartbeats are hexagons. PUT edges are
/// solid, OFFER dashed and INJECT thick. Vertices applying backpressure get
/// the `backpressure` class.
#[must_use]
pub fn render_mermaid(topology: &WiringTopology) -> String {
    let mut out = String::from("flowchart TD\n");
    out.push_str("    classDef backpressure stroke:#c0392b,stroke-width:3px\n");

    for vertex in topology.vertices() {
        let _ = writeln!(out, "    {}", node(vertex));
    }

    for edge in topology.edges() {
        let arrow = match edge.solder_type {
            SolderType::Put => "-->",
            SolderType::Offer => "-.->",
            SolderType::Inject => "==>",
        };
        if edge.label == edge.target {
            let _ = writeln!(out, "    {} {arrow} {}", edge.source, edge.target);
        } else {
            let _ = writeln!(out, "    {} {arrow}|{}| {}", edge.source, edge.label, edge.target);
        }
    }

    let bounded: Vec<&str> = topology
        .vertices()
        .filter(|vertex| vertex.applies_backpressure)
        .map(|vertex| vertex.name.as_str())
        .collect();
    if !bounded.is_empty() {
        let _ = writeln!(out, "    class {} backpressure", bounded.join(","));
    }
    out
}

fn node(vertex: &Vertex) -> String {
    let name = &vertex.name;
    match vertex.kind {
        VertexKind::Scheduler(scheduler_type) => format!("{name}[\"{name}<br/>{scheduler_type}\"]"),
        VertexKind::Transformer | VertexKind::Filter | VertexKind::Splitter => format!("{name}([\"{name}\"])"),
        VertexKind::Consumer => format!("{name}>\"{name}\"]"),
        VertexKind::Heartbeat => format!("{name}{{{{\"{name}\"}}}}"),
    }
}
