//! Cron field matching and next-execution search.

use core::ops::BitOr;

use chrono::{DateTime, Datelike, NaiveDateTime, NaiveTime, TimeDelta, Timelike, Weekday};
use platform::WallClock;

use super::CronError;
use crate::config::CRON_SEARCH_DAYS;

/// Set of weekdays a job may fire on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WeekdayMask(u8);

impl WeekdayMask {
    /// No days. Rejected by [`CronSpec::validate`].
    pub const NONE: Self = Self(0);
    /// Monday.
    pub const MONDAY: Self = Self(1 << 0);
    /// Tuesday.
    pub const TUESDAY: Self = Self(1 << 1);
    /// Wednesday.
    pub const WEDNESDAY: Self = Self(1 << 2);
    /// Thursday.
    pub const THURSDAY: Self = Self(1 << 3);
    /// Friday.
    pub const FRIDAY: Self = Self(1 << 4);
    /// Saturday.
    pub const SATURDAY: Self = Self(1 << 5);
    /// Sunday.
    pub const SUNDAY: Self = Self(1 << 6);
    /// Monday to Friday.
    pub const WORKDAYS: Self = Self(0b001_1111);
    /// Saturday and Sunday.
    pub const WEEKEND: Self = Self(0b110_0000);
    /// Every day.
    pub const ANY: Self = Self(0b111_1111);

    /// Build a mask from raw bits (bit 0 = Monday … bit 6 = Sunday).
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// `true` when `day` is in the mask.
    pub fn contains(self, day: Weekday) -> bool {
        self.0 & 1_u8.checked_shl(day.num_days_from_monday()).unwrap_or(0) != 0
    }

    /// `true` when no day is selected.
    pub const fn is_empty(self) -> bool {
        self.0 & Self::ANY.0 == 0
    }
}

impl BitOr for WeekdayMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl Default for WeekdayMask {
    fn default() -> Self {
        Self::ANY
    }
}

/// When a cron job fires, in local wall-clock time.
///
/// `None` fields match any value. All set fields must match (a job with
/// both `mday` and a weekday mask fires only on days satisfying both).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CronSpec {
    /// Minute of the hour, 0–59.
    pub minute: Option<u8>,
    /// Hour of the day, 0–23.
    pub hour: Option<u8>,
    /// Day of the month, 1–31.
    pub mday: Option<u8>,
    /// Month, 1–12.
    pub month: Option<u8>,
    /// Days of the week the job may fire on.
    pub weekdays: WeekdayMask,
    /// Seconds added to the matched minute (negative fires early, e.g. a
    /// reminder ten minutes before the hour).
    pub offset_secs: i32,
    /// Allow a match in the current minute to fire immediately.
    pub may_be_instant: bool,
    /// After a forward clock jump, a job passed by no more than this many
    /// seconds still fires instead of being skipped.
    pub clock_change_tolerance_secs: u32,
}

impl Default for CronSpec {
    /// Every minute, every day.
    fn default() -> Self {
        Self {
            minute: None,
            hour: None,
            mday: None,
            month: None,
            weekdays: WeekdayMask::ANY,
            offset_secs: 0,
            may_be_instant: false,
            clock_change_tolerance_secs: 0,
        }
    }
}

impl CronSpec {
    /// Daily at `hour:minute` local time.
    pub const fn daily(hour: u8, minute: u8) -> Self {
        Self {
            minute: Some(minute),
            hour: Some(hour),
            mday: None,
            month: None,
            weekdays: WeekdayMask::ANY,
            offset_secs: 0,
            may_be_instant: false,
            clock_change_tolerance_secs: 0,
        }
    }

    /// Restrict to the given weekdays.
    #[must_use]
    pub const fn on(mut self, weekdays: WeekdayMask) -> Self {
        self.weekdays = weekdays;
        self
    }

    /// Restrict to one day of the month.
    #[must_use]
    pub const fn on_mday(mut self, mday: u8) -> Self {
        self.mday = Some(mday);
        self
    }

    /// Restrict to one month.
    #[must_use]
    pub const fn in_month(mut self, month: u8) -> Self {
        self.month = Some(month);
        self
    }

    /// Shift the fire time by `offset_secs` from the matched minute.
    #[must_use]
    pub const fn with_offset_secs(mut self, offset_secs: i32) -> Self {
        self.offset_secs = offset_secs;
        self
    }

    /// Fire immediately if the current minute matches.
    #[must_use]
    pub const fn instant_ok(mut self) -> Self {
        self.may_be_instant = true;
        self
    }

    /// See [`clock_change_tolerance_secs`](Self::clock_change_tolerance_secs).
    #[must_use]
    pub const fn with_clock_change_tolerance(mut self, secs: u32) -> Self {
        self.clock_change_tolerance_secs = secs;
        self
    }

    /// Check every field against its calendar range.
    pub fn validate(&self) -> Result<(), CronError> {
        check_range("minute", self.minute, 0, 59)?;
        check_range("hour", self.hour, 0, 23)?;
        check_range("mday", self.mday, 1, 31)?;
        check_range("month", self.month, 1, 12)?;
        let bits = self.weekdays.bits();
        if self.weekdays.is_empty() || bits & !WeekdayMask::ANY.bits() != 0 {
            return Err(CronError::InvalidField {
                field: "weekdays",
                value: bits,
            });
        }
        Ok(())
    }

    fn day_matches(&self, date: chrono::NaiveDate) -> bool {
        field_matches(self.month, date.month())
            && field_matches(self.mday, date.day())
            && self.weekdays.contains(date.weekday())
    }

    /// Earliest matching minute on a matching day at or after `floor`.
    fn first_time_from(&self, floor: NaiveTime) -> Option<NaiveTime> {
        for hour in floor.hour()..24 {
            if !field_matches(self.hour, hour) {
                continue;
            }
            let min_floor = if hour == floor.hour() { floor.minute() } else { 0 };
            let minute = match self.minute {
                Some(m) if u32::from(m) >= min_floor => u32::from(m),
                Some(_) => continue,
                None => min_floor,
            };
            return NaiveTime::from_hms_opt(hour, minute, 0);
        }
        None
    }
}

fn check_range(field: &'static str, value: Option<u8>, min: u8, max: u8) -> Result<(), CronError> {
    match value {
        Some(v) if !(min..=max).contains(&v) => Err(CronError::InvalidField { field, value: v }),
        _ => Ok(()),
    }
}

fn field_matches(field: Option<u8>, value: u32) -> bool {
    field.map_or(true, |f| u32::from(f) == value)
}

/// Next local time at which `spec` fires, strictly after `local_now`
/// (or within the current minute when `may_be_instant` is set).
///
/// The returned time already includes `offset_secs`. Returns `None` when no
/// matching day exists within [`CRON_SEARCH_DAYS`].
pub fn next_execution_local(spec: &CronSpec, local_now: NaiveDateTime) -> Option<NaiveDateTime> {
    let offset = TimeDelta::seconds(i64::from(spec.offset_secs));
    // Search for the matched minute, not the fire time.
    let base = local_now.checked_sub_signed(offset)?;
    let mut start = base.with_second(0)?.with_nanosecond(0)?;
    if !spec.may_be_instant {
        start = start.checked_add_signed(TimeDelta::minutes(1))?;
    }

    let mut date = start.date();
    for day in 0..CRON_SEARCH_DAYS {
        let floor = if day == 0 { start.time() } else { NaiveTime::MIN };
        if spec.day_matches(date) {
            if let Some(time) = spec.first_time_from(floor) {
                return date.and_time(time).checked_add_signed(offset);
            }
        }
        date = date.succ_opt()?;
    }
    None
}

/// Next UTC time (epoch seconds) at which `spec` fires according to `clock`.
///
/// The local match is converted back to UTC with the offset in effect at
/// the fire instant, not the current one, so jobs keep their wall-clock
/// time across DST transitions. A local time that falls into a
/// spring-forward gap fires at the equivalent instant after the gap.
pub fn next_execution_utc<R: WallClock>(spec: &CronSpec, clock: &R) -> Option<i64> {
    let now = clock.now_utc();
    let local_now = naive_from_secs(clock.to_local(now))?;
    let local = next_execution_local(spec, local_now)?.and_utc().timestamp();

    let guess = local.saturating_sub(i64::from(clock.utc_offset_secs(now)));
    let guess_offset = clock.utc_offset_secs(guess);
    let refined = local.saturating_sub(i64::from(guess_offset));
    if clock.utc_offset_secs(refined) == guess_offset {
        Some(refined)
    } else {
        Some(guess.max(refined))
    }
}

fn naive_from_secs(secs: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use platform::mocks::MockWallClock;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_validate_rejects_out_of_range_fields() {
        assert_eq!(
            CronSpec::daily(24, 0).validate(),
            Err(CronError::InvalidField {
                field: "hour",
                value: 24
            })
        );
        assert!(CronSpec::daily(7, 60).validate().is_err());
        assert!(CronSpec::daily(7, 0).on_mday(0).validate().is_err());
        assert!(CronSpec::daily(7, 0).in_month(13).validate().is_err());
        assert!(CronSpec::daily(7, 0).on(WeekdayMask::NONE).validate().is_err());
        assert!(CronSpec::daily(23, 59).validate().is_ok());
    }

    #[test]
    fn test_daily_later_today() {
        // 2024-03-13 is a Wednesday.
        let next = next_execution_local(&CronSpec::daily(7, 30), at(2024, 3, 13, 6, 0, 0));
        assert_eq!(next, Some(at(2024, 3, 13, 7, 30, 0)));
    }

    #[test]
    fn test_daily_exact_minute_rolls_to_tomorrow() {
        let spec = CronSpec::daily(7, 30);
        let next = next_execution_local(&spec, at(2024, 3, 13, 7, 30, 0));
        assert_eq!(next, Some(at(2024, 3, 14, 7, 30, 0)));
    }

    #[test]
    fn test_may_be_instant_fires_in_current_minute() {
        let spec = CronSpec::daily(7, 30).instant_ok();
        let next = next_execution_local(&spec, at(2024, 3, 13, 7, 30, 40));
        assert_eq!(next, Some(at(2024, 3, 13, 7, 30, 0)));
    }

    #[test]
    fn test_workdays_skip_weekend() {
        // Friday evening → Monday morning.
        let spec = CronSpec::daily(7, 0).on(WeekdayMask::WORKDAYS);
        let next = next_execution_local(&spec, at(2024, 3, 15, 20, 0, 0));
        assert_eq!(next, Some(at(2024, 3, 18, 7, 0, 0)));
    }

    #[test]
    fn test_wildcard_minute_is_next_minute() {
        let next = next_execution_local(&CronSpec::default(), at(2024, 3, 13, 6, 0, 15));
        assert_eq!(next, Some(at(2024, 3, 13, 6, 1, 0)));
    }

    #[test]
    fn test_negative_offset_fires_early() {
        let spec = CronSpec::daily(8, 0).with_offset_secs(-600);
        let next = next_execution_local(&spec, at(2024, 3, 13, 7, 45, 0));
        assert_eq!(next, Some(at(2024, 3, 13, 7, 50, 0)));
        let next = next_execution_local(&spec, at(2024, 3, 13, 7, 55, 0));
        assert_eq!(next, Some(at(2024, 3, 14, 7, 50, 0)));
    }

    #[test]
    fn test_feb_29_finds_next_leap_year() {
        let spec = CronSpec::daily(0, 0).on_mday(29).in_month(2);
        let next = next_execution_local(&spec, at(2024, 3, 1, 0, 0, 0));
        assert_eq!(next, Some(at(2028, 2, 29, 0, 0, 0)));
    }

    #[test]
    fn test_impossible_date_never_matches() {
        let spec = CronSpec::daily(0, 0).on_mday(30).in_month(2);
        assert_eq!(next_execution_local(&spec, at(2024, 1, 1, 0, 0, 0)), None);
    }

    #[test]
    fn test_utc_conversion_uses_offset() {
        // 2024-03-13 06:00 UTC, local = UTC+1 → 07:00 local.
        let clock = MockWallClock::new(1_710_309_600, 3600);
        let next = next_execution_utc(&CronSpec::daily(8, 0), &clock).unwrap();
        // 08:00 local = 07:00 UTC.
        assert_eq!(next, 1_710_309_600 + 3600);
    }

    #[test]
    fn test_utc_conversion_across_dst_start() {
        // Now: 2024-03-13 06:00 UTC, no offset. DST (+1h) starts one hour later.
        let now = 1_710_309_600;
        let clock = MockWallClock::new(now, 0);
        clock.set_dst(now + 3600, i64::MAX, 3600);
        // 10:00 local falls after the transition → 09:00 UTC.
        let next = next_execution_utc(&CronSpec::daily(10, 0), &clock).unwrap();
        assert_eq!(next, now + 3 * 3600);
    }

    #[test]
    fn test_utc_conversion_in_spring_forward_gap() {
        // Transition at 07:00 UTC: local jumps from 07:00 to 08:00.
        let now = 1_710_309_600;
        let clock = MockWallClock::new(now, 0);
        clock.set_dst(now + 3600, i64::MAX, 3600);
        // 07:30 local does not exist; fire at 07:30 UTC (08:30 local).
        let next = next_execution_utc(&CronSpec::daily(7, 30), &clock).unwrap();
        assert_eq!(next, now + 5400);
    }
}
