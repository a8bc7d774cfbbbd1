// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction: wall time for timestamps, monotonic time for intervals.

#[cfg(any(test, feature = "test-support"))]
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(any(test, feature = "test-support"))]
use std::sync::Arc;
#[cfg(any(test, feature = "test-support"))]
use std::time::Duration;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Source of time for the core.
///
/// `epoch_ms` stamps records and events (wall clock); `now` drives interval
/// and deadline arithmetic (monotonic).
pub trait Clock: Clone + Send + Sync + 'static {
    /// Milliseconds since the Unix epoch.
    fn epoch_ms(&self) -> u64;

    /// Monotonic instant for elapsed-time comparisons.
    fn now(&self) -> Instant;
}

/// System clock for production use.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Deterministic clock for tests.
///
/// Wall time is settable and advances with the monotonic offset so
/// timestamps and intervals stay consistent.
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone)]
pub struct FakeClock {
    epoch_ms: Arc<AtomicU64>,
    base: Instant,
    offset_ms: Arc<AtomicU64>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeClock {
    pub fn new() -> Self {
        Self {
            epoch_ms: Arc::new(AtomicU64::new(1_700_000_000_000)),
            base: Instant::now(),
            offset_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Set the wall clock to an absolute epoch-ms value.
    pub fn set_epoch_ms(&self, ms: u64) {
        self.epoch_ms.store(ms, Ordering::SeqCst);
    }

    /// Advance both wall and monotonic time.
    pub fn advance(&self, d: Duration) {
        let ms = d.as_millis() as u64;
        self.epoch_ms.fetch_add(ms, Ordering::SeqCst);
        self.offset_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Clock for FakeClock {
    fn epoch_ms(&self) -> u64 {
        self.epoch_ms.load(Ordering::SeqCst)
    }

    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
