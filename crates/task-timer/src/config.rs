//! Timer service configuration and constants
//!
//! Compile-time limits live here as constants; per-manager tunables are
//! carried by [`TimerManagerConfig`], passed to
//! [`TaskTimerManager::new`](crate::TaskTimerManager::new).

use platform::Ticks;

/// Returned by `execute_expired_timers` when no timer is running.
///
/// The owning task should block on its wake signal without a timeout.
pub const WAIT_FOREVER: Ticks = Ticks::MAX;

/// Default cap on live timer records per manager: none.
///
/// Set a lower cap with [`TimerManagerConfig::with_max_timers`] to bound a
/// manager's heap use. Reaching it makes `create` return
/// [`TaskTimerId::INVALID`](crate::TaskTimerId::INVALID), standing in for an
/// exhausted allocator.
pub const DEFAULT_MAX_TIMERS: usize = usize::MAX;

/// Default slack before a repeating timer is reported as having fallen behind.
pub const DEFAULT_BEHIND_SLACK_MS: u32 = 100;

/// Maximum number of jobs a cron service tracks at once.
pub const MAX_CRON_JOBS: usize = 16;

/// Longest interval the cron service arms its task timer for.
///
/// Far-off jobs are reached in steps, re-reading the wall clock each time,
/// so tick-clock drift against the RTC never accumulates past one step.
pub const CRON_MAX_ARM_MS: u32 = 60 * 60 * 1000;

/// How far ahead the cron search looks for a matching day.
///
/// Eight years covers a February 29 job scheduled just after a leap day
/// across a skipped century leap year (e.g. 2096 → 2104).
pub const CRON_SEARCH_DAYS: u32 = 8 * 366;

/// Per-manager tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerManagerConfig {
    /// Maximum number of live timer records (running + idle).
    pub max_timers: usize,
    /// Lateness beyond one period tolerated before a repeating timer is
    /// rescheduled from "now" and a warning is logged.
    pub behind_slack_ms: u32,
}

impl Default for TimerManagerConfig {
    fn default() -> Self {
        Self {
            max_timers: DEFAULT_MAX_TIMERS,
            behind_slack_ms: DEFAULT_BEHIND_SLACK_MS,
        }
    }
}

impl TimerManagerConfig {
    /// Builder-style override of [`max_timers`](Self::max_timers).
    #[must_use]
    pub const fn with_max_timers(mut self, max_timers: usize) -> Self {
        self.max_timers = max_timers;
        self
    }

    /// Builder-style override of [`behind_slack_ms`](Self::behind_slack_ms).
    #[must_use]
    pub const fn with_behind_slack_ms(mut self, behind_slack_ms: u32) -> Self {
        self.behind_slack_ms = behind_slack_ms;
        self
    }
}
