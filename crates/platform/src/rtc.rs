//! Wall clock (RTC) abstraction.

/// UTC wall-clock time plus the local offset in effect at any instant.
///
/// Daylight saving is expressed by [`utc_offset_secs`](WallClock::utc_offset_secs)
/// returning a different value on either side of a transition.
pub trait WallClock {
    /// Current UTC time in seconds since the Unix epoch.
    fn now_utc(&self) -> i64;

    /// Offset of local time from UTC, in seconds, at the UTC instant `utc`.
    fn utc_offset_secs(&self, utc: i64) -> i32;

    /// Local time (seconds since the epoch, local wall clock) at `utc`.
    fn to_local(&self, utc: i64) -> i64 {
        utc.saturating_add(i64::from(self.utc_offset_secs(utc)))
    }
}

impl<T: WallClock + ?Sized> WallClock for &T {
    fn now_utc(&self) -> i64 {
        (**self).now_utc()
    }

    fn utc_offset_secs(&self, utc: i64) -> i32 {
        (**self).utc_offset_secs(utc)
    }
}
