//! Heartbeat sources driven by one shared thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::core::{PoolError, WiringError};
use crate::util::Time;
use crate::wires::OutputWire;

struct HeartbeatSource {
    period: Duration,
    output: OutputWire<Instant>,
}

/// Emits `Instant` ticks on every registered heartbeat wire.
///
/// Each source fires once per elapsed period; when the clock jumps ahead the
/// missed ticks are emitted back to back.
pub(crate) struct HeartbeatScheduler {
    time: Arc<dyn Time>,
    poll: Duration,
    sources: Mutex<Vec<HeartbeatSource>>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatScheduler {
    pub(crate) fn new(time: Arc<dyn Time>, poll: Duration) -> Self {
        Self {
            time,
            poll,
            sources: Mutex::new(Vec::new()),
            running: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        }
    }

    pub(crate) fn add(&self, period: Duration, output: OutputWire<Instant>) {
        self.sources.lock().push(HeartbeatSource { period, output });
    }

    pub(crate) fn len(&self) -> usize {
        self.sources.lock().len()
    }

    pub(crate) fn start(&self) -> Result<(), WiringError> {
        let sources = std::mem::take(&mut *self.sources.lock());
        if sources.is_empty() {
            return Ok(());
        }
        let origin = self.time.now();
        let time = Arc::clone(&self.time);
        let poll = self.poll;
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::Release);

        let source_count = sources.len();
        let handle = thread::Builder::new()
            .name("wiring-heartbeat".to_string())
            .spawn(move || run(time.as_ref(), poll, origin, &sources, &running))
            .map_err(|err| {
                self.running.store(false, Ordering::Release);
                WiringError::Pool(PoolError::Internal(format!("failed to spawn heartbeat thread: {err}")))
            })?;
        *self.thread.lock() = Some(handle);
        info!(sources = source_count, "heartbeat thread started");
        Ok(())
    }

    /// Stop the thread; waits for it unless called from the heartbeat thread itself.
    pub(crate) fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let Some(handle) = self.thread.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            debug!("heartbeat thread panicked");
        }
    }

    /// Signal the thread to exit without waiting.
    pub(crate) fn signal_stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

fn run(time: &dyn Time, poll: Duration, origin: Instant, sources: &[HeartbeatSource], running: &AtomicBool) {
    let mut due: Vec<Instant> = sources.iter().map(|source| origin + source.period).collect();

    while running.load(Ordering::Acquire) {
        let now = time.now();
        for (source, next) in sources.iter().zip(due.iter_mut()) {
            while *next <= now && running.load(Ordering::Acquire) {
                source.output.forward(now);
                *next += source.period;
            }
        }

        let earliest = due.iter().min().copied().unwrap_or(now + poll);
        let wait = earliest.saturating_duration_since(time.now()).min(poll);
        if !wait.is_zero() {
            time.sleep(wait);
        }
    }
    debug!("heartbeat thread exiting");
}
