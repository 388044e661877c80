//! Wall-clock cron jobs.
//!
//! A [`CronSpec`] names a local wall-clock time ("07:30 on weekdays",
//! "00:00 on the 1st") and the [`CronService`] fires a callback when that
//! time arrives. All jobs share one task timer armed for the soonest job;
//! the timer is recomputed whenever the table or the wall clock changes.

mod schedule;
mod service;

pub use schedule::{next_execution_local, next_execution_utc, CronSpec, WeekdayMask};
pub use service::{CronCallback, CronJobId, CronService};

use core::fmt;

/// Errors returned by the cron layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CronError {
    /// A field is outside its calendar range.
    InvalidField {
        /// Field name (`"minute"`, `"hour"`, `"mday"`, `"month"`, `"weekdays"`).
        field: &'static str,
        /// Offending value.
        value: u8,
    },
    /// No date within the search horizon matches (e.g. 30 February).
    NoMatch,
    /// The job table is full.
    TableFull,
    /// The service has no backing task timer (not attached, or the manager's
    /// pool was exhausted at attach time).
    Detached,
}

#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "std")]
impl std::error::Error for CronError {}

impl fmt::Display for CronError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidField { field, value } => {
                write!(f, "cron field {field} out of range: {value}")
            }
            Self::NoMatch => write!(f, "cron schedule never matches"),
            Self::TableFull => write!(f, "cron job table full"),
            Self::Detached => write!(f, "cron service has no backing timer"),
        }
    }
}
