//! # Prometheus Wiring
//!
//! An in-process dataflow wiring framework. Processing stages ("task
//! schedulers") are connected by typed wires into a graph that runs inside a
//! single process on a shared worker pool.
//!
//! ## Key Features
//!
//! - **Execution Disciplines**: sequential on the pool, sequential on a
//!   dedicated thread, concurrent, direct on the caller, or no-op
//! - **Backpressure**: per-scheduler capacity ceilings and counters shared
//!   across a pipeline; `put` waits, `offer` refuses, `inject` bypasses
//! - **Deadlock Avoidance**: a pool worker blocked on backpressure is
//!   compensated by a spare worker
//! - **Flushing and Squelching**: wait for a stage to drain, or discard its
//!   work while keeping the counters honest
//! - **Heartbeats**: periodic time signals with catch-up semantics
//! - **Introspection**: cycle detection, unbound-wire checks and Mermaid
//!   diagrams of the wiring graph
//!
//! ## Example
//!
//! ```rust,no_run
//! use prometheus_wiring::config::WiringConfig;
//! use prometheus_wiring::core::TaskSchedulerType;
//! use prometheus_wiring::model::WiringModel;
//!
//! fn main() -> prometheus_wiring::core::AppResult<()> {
//!     let model = WiringModel::new(WiringConfig::default())?;
//!
//!     let doubler = model
//!         .scheduler_builder("doubler")?
//!         .with_type(TaskSchedulerType::Sequential)
//!         .with_unhandled_task_capacity(100)
//!         .with_flushing_enabled(true)
//!         .build::<u64>()?;
//!     let numbers = doubler.build_input_wire::<u64>("numbers")?;
//!     numbers.bind(|n| Some(n * 2))?;
//!     doubler
//!         .output_wire()
//!         .solder_to_consumer("print", |n| println!("{n}"))?;
//!
//!     model.start()?;
//!     for n in 0..10 {
//!         numbers.put(n)?;
//!     }
//!     doubler.flush()?;
//!     model.stop()?;
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Builders to construct schedulers from settings.
pub mod builders;
/// Configuration models for the model, its pool and its schedulers.
pub mod config;
/// Counters, squelching, schedulers, errors and the worker pool.
pub mod core;
/// The wiring model, its topology and diagrams.
pub mod model;
/// Shared utilities: names, time, metrics and tracing setup.
pub mod util;
/// Typed input and output wires.
pub mod wires;

pub use crate::builders::TaskSchedulerBuilder;
pub use crate::config::{SchedulerConfig, WiringConfig, WorkerPoolConfig};
pub use crate::core::{
    ObjectCounter, SharedCounter, TaskScheduler, TaskSchedulerType, WiringError, UNTRACKED_COUNT,
};
pub use crate::model::WiringModel;
pub use crate::wires::{InputWire, OutputWire, SolderType};
