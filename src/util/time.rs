//! Time sources: the OS clock and a manually advanced fake for tests.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Clock consumed by heartbeats.
pub trait Time: Send + Sync + fmt::Debug {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Sleep for up to `duration`. Implementations may return early; callers re-check [`Time::now`].
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`Instant::now`] and [`thread::sleep`].
#[derive(Debug, Default, Clone, Copy)]
pub struct OsTime;

impl Time for OsTime {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Real-time slice a [`FakeTime`] sleeper waits before handing control back.
const FAKE_SLEEP_SLICE: Duration = Duration::from_millis(5);

/// Deterministic clock that only moves when [`FakeTime::tick`] is called.
///
/// `sleep` blocks until the clock is advanced or a short real-time slice
/// passes, so loops driven by it stay responsive to shutdown flags.
#[derive(Debug)]
pub struct FakeTime {
    origin: Instant,
    elapsed: Mutex<Duration>,
    advanced: Condvar,
}

impl FakeTime {
    /// Create a fake clock frozen at the current real instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            advanced: Condvar::new(),
        }
    }

    /// Advance the clock and wake sleepers.
    pub fn tick(&self, amount: Duration) {
        let mut elapsed = self.elapsed.lock();
        *elapsed += amount;
        self.advanced.notify_all();
    }

    /// Total time the clock has been advanced.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for FakeTime {
    fn default() -> Self {
        Self::new()
    }
}

impl Time for FakeTime {
    fn now(&self) -> Instant {
        self.origin + *self.elapsed.lock()
    }

    fn sleep(&self, duration: Duration) {
        let mut elapsed = self.elapsed.lock();
        if duration.is_zero() {
            return;
        }
        let _ = self.advanced.wait_for(&mut elapsed, FAKE_SLEEP_SLICE);
    }
}
