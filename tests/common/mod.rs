//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use prometheus_wiring::config::{WiringConfig, WorkerPoolConfig};
use prometheus_wiring::model::WiringModel;
use prometheus_wiring::util::init_tracing;

/// Model with a small, fixed-size pool.
pub fn model_with_workers(workers: usize) -> WiringModel {
    init_tracing();
    let config = WiringConfig::new().with_pool(WorkerPoolConfig::new().with_worker_count(workers));
    WiringModel::new(config).expect("model")
}

/// Poll `condition` until it holds, panicking with `message` after `timeout`.
pub fn assert_eventually(timeout: Duration, message: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(condition(), "condition not met within {timeout:?}: {message}");
}

/// One-shot latch: `wait` blocks until `open` is called.
#[derive(Clone, Default)]
pub struct Gate {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let (lock, condvar) = &*self.state;
        *lock.lock() = true;
        condvar.notify_all();
    }

    pub fn wait(&self) {
        let (lock, condvar) = &*self.state;
        let mut open = lock.lock();
        while !*open {
            condvar.wait(&mut open);
        }
    }

    pub fn is_open(&self) -> bool {
        *self.state.0.lock()
    }
}
