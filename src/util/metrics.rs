//! Metrics sink consumed by schedulers.

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};

/// Sampled value source for a gauge.
pub type Observable = Box<dyn Fn() -> i64 + Send + Sync>;

/// Destination for scheduler metrics. Purely observational.
pub trait MetricsSink: Send + Sync {
    /// Register a gauge sampled on demand.
    fn register_gauge(&self, name: &str, observe: Observable);

    /// Add `delta` to a named monotonic counter.
    fn increment(&self, name: &str, delta: u64);
}

/// Sink that keeps gauges and counters in memory.
#[derive(Default)]
pub struct InMemoryMetrics {
    gauges: RwLock<HashMap<String, Observable>>,
    counters: Mutex<HashMap<String, u64>>,
}

impl InMemoryMetrics {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample a gauge, if registered.
    #[must_use]
    pub fn gauge(&self, name: &str) -> Option<i64> {
        self.gauges.read().get(name).map(|observe| observe())
    }

    /// Current value of a counter; zero if never incremented.
    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    /// Names of all registered gauges, sorted.
    #[must_use]
    pub fn gauge_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.gauges.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl MetricsSink for InMemoryMetrics {
    fn register_gauge(&self, name: &str, observe: Observable) {
        self.gauges.write().insert(name.to_string(), observe);
    }

    fn increment(&self, name: &str, delta: u64) {
        *self.counters.lock().entry(name.to_string()).or_insert(0) += delta;
    }
}

impl std::fmt::Debug for InMemoryMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryMetrics")
            .field("gauges", &self.gauge_names())
            .field("counters", &*self.counters.lock())
            .finish()
    }
}
