//! Capacity counters used as scheduler on-ramps and off-ramps.
//!
//! A counter tracks how many tasks are admitted but not yet finished. The
//! backpressure variant enforces a ceiling by making [`ObjectCounter::on_ramp`]
//! wait; waits run inside [`managed_block`] so a pool worker stuck on a full
//! downstream is compensated.
//!
//! Capacity and emptiness waits are measured on the host clock: an off-ramp
//! wakes waiters immediately and the sleep duration only bounds the gap
//! between re-checks. The model's substitutable [`Time`](crate::util::Time)
//! source drives heartbeats alone, so a fake clock never stalls or hastens
//! backpressure.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::core::worker_pool::managed_block;

/// Count reported by counters that track nothing.
pub const UNTRACKED_COUNT: i64 = -1;

/// Shared counter handle.
pub type SharedCounter = Arc<dyn ObjectCounter>;

/// In-flight task accounting.
pub trait ObjectCounter: Send + Sync + fmt::Debug {
    /// Admit one object, waiting for capacity if the counter is bounded.
    ///
    /// The wait cannot be interrupted; it only ends once admission succeeds.
    fn on_ramp(&self);

    /// Admit one object if capacity is available right now.
    fn attempt_on_ramp(&self) -> bool;

    /// Admit one object even when that exceeds the ceiling.
    fn force_on_ramp(&self);

    /// Release one object.
    ///
    /// # Panics
    ///
    /// Panics if the count would drop below zero.
    fn off_ramp(&self);

    /// Current count, or [`UNTRACKED_COUNT`].
    fn count(&self) -> i64;

    /// Admit one object, giving up once `timeout` has elapsed.
    ///
    /// Returns whether the object was admitted. Counters that never block
    /// admit immediately.
    fn on_ramp_timeout(&self, _timeout: Duration) -> bool {
        self.on_ramp();
        true
    }

    /// Block until the count reaches zero.
    fn wait_until_empty(&self);

    /// Block until the count reaches zero or `timeout` elapses; returns whether it emptied.
    fn wait_until_empty_timeout(&self, timeout: Duration) -> bool;

    /// Whether `on_ramp` can block.
    fn is_bounded(&self) -> bool {
        false
    }

    /// Whether the counter tracks anything at all.
    fn is_tracking(&self) -> bool {
        true
    }
}

/// Condvar paired with a waiter count so releases skip the lock when nobody waits.
#[derive(Debug, Default)]
struct Signal {
    lock: Mutex<()>,
    condvar: Condvar,
    waiters: AtomicUsize,
}

impl Signal {
    /// Wait until `ready` returns true, re-checking at least every `poll`.
    ///
    /// Wakeups of any kind only trigger a re-check.
    fn wait_until(&self, poll: Duration, mut ready: impl FnMut() -> bool) {
        let mut guard = self.lock.lock();
        self.waiters.fetch_add(1, Ordering::SeqCst);
        while !ready() {
            let _ = self.condvar.wait_for(&mut guard, poll);
        }
        self.waiters.fetch_sub(1, Ordering::SeqCst);
    }

    /// Like [`Signal::wait_until`], but gives up at `deadline`. Returns the last `ready` result.
    fn wait_until_deadline(&self, poll: Duration, deadline: Instant, mut ready: impl FnMut() -> bool) -> bool {
        let mut guard = self.lock.lock();
        self.waiters.fetch_add(1, Ordering::SeqCst);
        let done = loop {
            if ready() {
                break true;
            }
            let now = Instant::now();
            if now >= deadline {
                break false;
            }
            let _ = self.condvar.wait_for(&mut guard, poll.min(deadline - now));
        };
        self.waiters.fetch_sub(1, Ordering::SeqCst);
        done
    }

    fn notify(&self) {
        if self.waiters.load(Ordering::SeqCst) > 0 {
            let _guard = self.lock.lock();
            self.condvar.notify_all();
        }
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365))
}

fn check_underflow(previous: i64, counter: &str) {
    assert!(
        previous > 0,
        "{counter} off-ramped below zero; more completions than admissions"
    );
}

/// Counter that never blocks and reports [`UNTRACKED_COUNT`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpObjectCounter;

impl ObjectCounter for NoOpObjectCounter {
    fn on_ramp(&self) {}

    fn attempt_on_ramp(&self) -> bool {
        true
    }

    fn force_on_ramp(&self) {}

    fn off_ramp(&self) {}

    fn count(&self) -> i64 {
        UNTRACKED_COUNT
    }

    fn wait_until_empty(&self) {}

    fn wait_until_empty_timeout(&self, _timeout: Duration) -> bool {
        true
    }

    fn is_tracking(&self) -> bool {
        false
    }
}

/// Unbounded counter that tracks the in-flight count.
#[derive(Debug)]
pub struct StandardObjectCounter {
    count: AtomicI64,
    sleep_duration: Duration,
    empty: Signal,
}

impl StandardObjectCounter {
    /// Create a counter; `sleep_duration` bounds how long `wait_until_empty` sleeps between checks.
    #[must_use]
    pub fn new(sleep_duration: Duration) -> Self {
        Self {
            count: AtomicI64::new(0),
            sleep_duration,
            empty: Signal::default(),
        }
    }
}

impl ObjectCounter for StandardObjectCounter {
    fn on_ramp(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn attempt_on_ramp(&self) -> bool {
        self.on_ramp();
        true
    }

    fn force_on_ramp(&self) {
        self.on_ramp();
    }

    fn off_ramp(&self) {
        let previous = self.count.fetch_sub(1, Ordering::SeqCst);
        check_underflow(previous, "counter");
        if previous == 1 {
            self.empty.notify();
        }
    }

    fn count(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }

    fn wait_until_empty(&self) {
        if self.count() == 0 {
            return;
        }
        managed_block(|| {
            self.empty
                .wait_until(self.sleep_duration, || self.count.load(Ordering::SeqCst) == 0);
        });
    }

    fn wait_until_empty_timeout(&self, timeout: Duration) -> bool {
        if self.count() == 0 {
            return true;
        }
        let deadline = deadline_after(timeout);
        managed_block(|| {
            self.empty.wait_until_deadline(self.sleep_duration, deadline, || {
                self.count.load(Ordering::SeqCst) == 0
            })
        })
    }
}

/// Counter with a ceiling; `on_ramp` waits while the ceiling is reached.
#[derive(Debug)]
pub struct BackpressureObjectCounter {
    name: String,
    capacity: i64,
    count: AtomicI64,
    sleep_duration: Duration,
    capacity_freed: Signal,
    empty: Signal,
}

impl BackpressureObjectCounter {
    /// Create a counter admitting at most `capacity` objects at once.
    ///
    /// A zero capacity admits nothing except through `force_on_ramp`.
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: u64, sleep_duration: Duration) -> Self {
        Self {
            name: name.into(),
            capacity: i64::try_from(capacity).unwrap_or(i64::MAX),
            count: AtomicI64::new(0),
            sleep_duration,
            capacity_freed: Signal::default(),
            empty: Signal::default(),
        }
    }

    /// Counter name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured ceiling.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity.unsigned_abs()
    }

    fn try_increment(&self) -> bool {
        let mut current = self.count.load(Ordering::SeqCst);
        loop {
            if current >= self.capacity {
                return false;
            }
            match self
                .count
                .compare_exchange_weak(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

impl ObjectCounter for BackpressureObjectCounter {
    fn on_ramp(&self) {
        if self.try_increment() {
            return;
        }
        trace!(counter = %self.name, capacity = self.capacity, "at capacity, waiting for room");
        managed_block(|| {
            self.capacity_freed
                .wait_until(self.sleep_duration, || self.try_increment());
        });
    }

    fn on_ramp_timeout(&self, timeout: Duration) -> bool {
        if self.try_increment() {
            return true;
        }
        let deadline = deadline_after(timeout);
        managed_block(|| {
            self.capacity_freed
                .wait_until_deadline(self.sleep_duration, deadline, || self.try_increment())
        })
    }

    fn attempt_on_ramp(&self) -> bool {
        self.try_increment()
    }

    fn force_on_ramp(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn off_ramp(&self) {
        let previous = self.count.fetch_sub(1, Ordering::SeqCst);
        check_underflow(previous, &self.name);
        self.capacity_freed.notify();
        if previous == 1 {
            self.empty.notify();
        }
    }

    fn count(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }

    fn wait_until_empty(&self) {
        if self.count() == 0 {
            return;
        }
        managed_block(|| {
            self.empty
                .wait_until(self.sleep_duration, || self.count.load(Ordering::SeqCst) == 0);
        });
    }

    fn wait_until_empty_timeout(&self, timeout: Duration) -> bool {
        if self.count() == 0 {
            return true;
        }
        let deadline = deadline_after(timeout);
        managed_block(|| {
            self.empty.wait_until_deadline(self.sleep_duration, deadline, || {
                self.count.load(Ordering::SeqCst) == 0
            })
        })
    }

    fn is_bounded(&self) -> bool {
        true
    }
}

/// Several counters ramped together, in order.
///
/// `count` and emptiness follow the first counter.
#[derive(Debug, Clone)]
pub struct MultiObjectCounter {
    counters: Vec<SharedCounter>,
}

impl MultiObjectCounter {
    /// Combine `counters`; the first one is the primary.
    #[must_use]
    pub fn new(counters: Vec<SharedCounter>) -> Self {
        Self { counters }
    }
}

impl ObjectCounter for MultiObjectCounter {
    fn on_ramp(&self) {
        for counter in &self.counters {
            counter.on_ramp();
        }
    }

    fn on_ramp_timeout(&self, timeout: Duration) -> bool {
        let deadline = deadline_after(timeout);
        for (index, counter) in self.counters.iter().enumerate() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !counter.on_ramp_timeout(remaining) {
                for admitted in &self.counters[..index] {
                    admitted.off_ramp();
                }
                return false;
            }
        }
        true
    }

    fn attempt_on_ramp(&self) -> bool {
        for (index, counter) in self.counters.iter().enumerate() {
            if !counter.attempt_on_ramp() {
                for admitted in &self.counters[..index] {
                    admitted.off_ramp();
                }
                return false;
            }
        }
        true
    }

    fn force_on_ramp(&self) {
        for counter in &self.counters {
            counter.force_on_ramp();
        }
    }

    fn off_ramp(&self) {
        for counter in &self.counters {
            counter.off_ramp();
        }
    }

    fn count(&self) -> i64 {
        self.counters.first().map_or(UNTRACKED_COUNT, |counter| counter.count())
    }

    fn wait_until_empty(&self) {
        if let Some(counter) = self.counters.first() {
            counter.wait_until_empty();
        }
    }

    fn wait_until_empty_timeout(&self, timeout: Duration) -> bool {
        self.counters
            .first()
            .map_or(true, |counter| counter.wait_until_empty_timeout(timeout))
    }

    fn is_bounded(&self) -> bool {
        self.counters.iter().any(|counter| counter.is_bounded())
    }

    fn is_tracking(&self) -> bool {
        self.counters.iter().any(|counter| counter.is_tracking())
    }
}
