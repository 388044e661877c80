//! Timer identifiers and start flags.

use core::fmt;
use core::ops::{BitOr, BitOrAssign};

/// Manager-unique timer identifier.
///
/// IDs are handed out sequentially from 1 and are never reused by the
/// manager that issued them. `0` is reserved as [`TaskTimerId::INVALID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct TaskTimerId(u32);

impl TaskTimerId {
    /// Sentinel meaning "no timer" (e.g. `create` could not allocate).
    pub const INVALID: Self = Self(0);

    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// `false` only for [`TaskTimerId::INVALID`].
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for TaskTimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Options accepted by [`TaskTimerManager::start`](crate::TaskTimerManager::start).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StartFlags(u8);

impl StartFlags {
    /// One-shot, unconditional (re)schedule.
    pub const NONE: Self = Self(0);
    /// Reinsert the timer one period later each time it fires.
    pub const REPEATING: Self = Self(1 << 0);
    /// Refuse to (re)schedule while the timer's callback is running.
    pub const FAIL_IF_EXECUTING: Self = Self(1 << 1);
    /// Refuse to (re)schedule a timer that is already running.
    pub const FAIL_IF_SCHEDULED: Self = Self(1 << 2);

    /// `true` when every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bit pattern.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for StartFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for StartFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
