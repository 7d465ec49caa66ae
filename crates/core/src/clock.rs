// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A clock that provides the current time
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn epoch_ms(&self) -> u64;
}

/// Real system clock
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Fake clock for testing with controllable time
#[derive(Clone)]
pub struct FakeClock {
    current: Arc<Mutex<Instant>>,
    epoch_ms: Arc<Mutex<u64>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(Instant::now())),
            epoch_ms: Arc::new(Mutex::new(1_000_000)),
        }
    }

    /// Advance the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        *self.current.lock() += duration;
        *self.epoch_ms.lock() += duration.as_millis() as u64;
    }

    /// Set the clock to a specific instant
    pub fn set(&self, instant: Instant) {
        *self.current.lock() = instant;
    }

    /// Set the epoch milliseconds value
    pub fn set_epoch_ms(&self, ms: u64) {
        *self.epoch_ms.lock() = ms;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.current.lock()
    }

    fn epoch_ms(&self) -> u64 {
        *self.epoch_ms.lock()
    }
}

/// Lock-free activity timestamp, touched on every admitted request.
///
/// Stores nanoseconds since a fixed epoch so reads never block a writer and
/// concurrent writers never block each other.
pub struct ActivityClock {
    epoch: Instant,
    last_active_nanos: AtomicU64,
}

impl ActivityClock {
    pub fn new(now: Instant) -> Self {
        Self { epoch: now, last_active_nanos: AtomicU64::new(0) }
    }

    /// Record activity at `now`. Monotonic: out-of-order touches never move
    /// the clock backwards.
    pub fn touch(&self, now: Instant) {
        let nanos = now.saturating_duration_since(self.epoch).as_nanos() as u64;
        self.last_active_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    /// Time elapsed since the last touch, as observed at `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        let last = self.last_active_nanos.load(Ordering::Relaxed);
        let elapsed = now.saturating_duration_since(self.epoch).as_nanos() as u64;
        Duration::from_nanos(elapsed.saturating_sub(last))
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
