//! Supporting utilities: names, time sources, metrics and telemetry.

pub mod metrics;
pub mod names;
pub mod telemetry;
pub mod time;

pub use metrics::{InMemoryMetrics, MetricsSink, Observable};
pub use names::validate_name;
pub use telemetry::init_tracing;
pub use time::{FakeTime, OsTime, Time};
