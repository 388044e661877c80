//! Mock implementations for testing
//!
//! This module provides mock implementations of all platform traits
//! for use in unit and integration tests and in the desktop simulator.

#![cfg(any(test, feature = "std"))]

use core::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU32, AtomicUsize, Ordering};

use crate::{Ticks, TickSource, WakeSignal, WallClock};

/// Mock tick source advanced explicitly by the test.
pub struct MockTickSource {
    now: AtomicU32,
    tick_hz: u32,
}

impl MockTickSource {
    /// Create a clock at tick 0 running at `tick_hz`.
    pub const fn new(tick_hz: u32) -> Self {
        Self {
            now: AtomicU32::new(0),
            tick_hz,
        }
    }

    /// Jump to an absolute tick value.
    pub fn set(&self, ticks: Ticks) {
        self.now.store(ticks, Ordering::SeqCst);
    }

    /// Advance by `ticks` (wrapping).
    pub fn advance(&self, ticks: Ticks) {
        let _ = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.wrapping_add(ticks))
            });
    }

    /// Advance by `ms` milliseconds converted at this clock's rate.
    pub fn advance_ms(&self, ms: u32) {
        self.advance(self.ms_to_ticks(ms));
    }
}

impl TickSource for MockTickSource {
    fn now_ticks(&self) -> Ticks {
        self.now.load(Ordering::SeqCst)
    }

    fn tick_hz(&self) -> u32 {
        self.tick_hz
    }
}

/// Mock wake signal that records gives and never blocks.
pub struct MockWakeSignal {
    gives: AtomicUsize,
    pending: AtomicBool,
    last_timeout: AtomicU32,
}

impl MockWakeSignal {
    /// Create a signal with no gives recorded.
    pub const fn new() -> Self {
        Self {
            gives: AtomicUsize::new(0),
            pending: AtomicBool::new(false),
            last_timeout: AtomicU32::new(u32::MAX),
        }
    }

    /// Total number of gives since creation.
    pub fn gives(&self) -> usize {
        self.gives.load(Ordering::SeqCst)
    }

    /// Consume the pending give, returning whether one was outstanding.
    pub fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }

    /// Timeout passed to the most recent wait (`u32::MAX` for unbounded).
    pub fn last_timeout(&self) -> Ticks {
        self.last_timeout.load(Ordering::SeqCst)
    }
}

impl Default for MockWakeSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl WakeSignal for MockWakeSignal {
    fn give(&self) {
        self.gives.fetch_add(1, Ordering::SeqCst);
        self.pending.store(true, Ordering::SeqCst);
    }

    async fn wait_for_wake(&self, timeout: Option<Ticks>) {
        self.last_timeout
            .store(timeout.unwrap_or(u32::MAX), Ordering::SeqCst);
        self.pending.store(false, Ordering::SeqCst);
    }
}

/// Mock wall clock with a standard offset and one optional DST window.
pub struct MockWallClock {
    now: AtomicI64,
    std_offset: AtomicI32,
    dst_start: AtomicI64,
    dst_end: AtomicI64,
    dst_extra: AtomicI32,
}

impl MockWallClock {
    /// Create a clock at `utc` seconds with a fixed `offset_secs` and no DST.
    pub const fn new(utc: i64, offset_secs: i32) -> Self {
        Self {
            now: AtomicI64::new(utc),
            std_offset: AtomicI32::new(offset_secs),
            dst_start: AtomicI64::new(0),
            dst_end: AtomicI64::new(0),
            dst_extra: AtomicI32::new(0),
        }
    }

    /// Set the current UTC time (a manual clock change).
    pub fn set_utc(&self, utc: i64) {
        self.now.store(utc, Ordering::SeqCst);
    }

    /// Advance the current time by `secs`.
    pub fn advance_secs(&self, secs: i64) {
        let _ = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(secs))
            });
    }

    /// Change the standard (non-DST) offset, e.g. a timezone change.
    pub fn set_offset(&self, offset_secs: i32) {
        self.std_offset.store(offset_secs, Ordering::SeqCst);
    }

    /// Apply `extra_secs` of daylight saving for UTC instants in
    /// `[start_utc, end_utc)`.
    pub fn set_dst(&self, start_utc: i64, end_utc: i64, extra_secs: i32) {
        self.dst_start.store(start_utc, Ordering::SeqCst);
        self.dst_end.store(end_utc, Ordering::SeqCst);
        self.dst_extra.store(extra_secs, Ordering::SeqCst);
    }
}

impl WallClock for MockWallClock {
    fn now_utc(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    fn utc_offset_secs(&self, utc: i64) -> i32 {
        let base = self.std_offset.load(Ordering::SeqCst);
        let start = self.dst_start.load(Ordering::SeqCst);
        let end = self.dst_end.load(Ordering::SeqCst);
        if (start..end).contains(&utc) {
            base.saturating_add(self.dst_extra.load(Ordering::SeqCst))
        } else {
            base
        }
    }
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_tick_source_advance_wraps() {
        let clock = MockTickSource::new(1000);
        clock.set(u32::MAX);
        clock.advance(2);
        assert_eq!(clock.now_ticks(), 1);
    }

    #[test]
    fn test_mock_wake_counts_gives() {
        let wake = MockWakeSignal::new();
        wake.give();
        wake.give();
        assert_eq!(wake.gives(), 2);
        assert!(wake.take_pending());
        assert!(!wake.take_pending());
    }

    #[test]
    fn test_mock_wall_clock_dst_window() {
        let clock = MockWallClock::new(0, 3600);
        clock.set_dst(100, 200, 3600);
        assert_eq!(clock.utc_offset_secs(99), 3600);
        assert_eq!(clock.utc_offset_secs(100), 7200);
        assert_eq!(clock.utc_offset_secs(200), 3600);
        assert_eq!(clock.to_local(150), 150 + 7200);
    }
}
