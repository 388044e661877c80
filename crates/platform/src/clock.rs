//! Monotonic tick source.
//!
//! Ticks are 32 bits wide on every target. A free-running counter at
//! 32 768 Hz wraps after roughly 36 hours and at 1 MHz after roughly
//! 71 minutes. Consumers compare raw tick values and therefore degrade
//! (late or early fires) across a wrap; the width is kept because stored
//! tick values are shared with other subsystems.

/// Raw tick count.
pub type Ticks = u32;

/// A monotonically increasing tick counter with a fixed rate.
pub trait TickSource {
    /// Current tick count.
    fn now_ticks(&self) -> Ticks;

    /// Ticks per second.
    fn tick_hz(&self) -> u32;

    /// Convert milliseconds to ticks, rounding down and saturating at
    /// [`u32::MAX`].
    fn ms_to_ticks(&self, ms: u32) -> Ticks {
        let ticks = u64::from(ms).saturating_mul(u64::from(self.tick_hz())) / 1000;
        Ticks::try_from(ticks).unwrap_or(Ticks::MAX)
    }

    /// Convert ticks to milliseconds, rounding down and saturating at
    /// [`u32::MAX`]. A zero tick rate yields zero.
    fn ticks_to_ms(&self, ticks: Ticks) -> u32 {
        let Some(ms) = u64::from(ticks)
            .saturating_mul(1000)
            .checked_div(u64::from(self.tick_hz()))
        else {
            return 0;
        };
        u32::try_from(ms).unwrap_or(u32::MAX)
    }
}

impl<T: TickSource + ?Sized> TickSource for &T {
    fn now_ticks(&self) -> Ticks {
        (**self).now_ticks()
    }

    fn tick_hz(&self) -> u32 {
        (**self).tick_hz()
    }
}

/// Tick source backed by the embassy time driver.
///
/// The 64-bit embassy instant is truncated to 32 bits.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EmbassyTickSource;

impl EmbassyTickSource {
    /// Create a tick source reading `embassy_time::Instant::now()`.
    pub const fn new() -> Self {
        Self
    }
}

impl TickSource for EmbassyTickSource {
    #[allow(clippy::cast_possible_truncation)] // 32-bit tick width is intentional
    fn now_ticks(&self) -> Ticks {
        embassy_time::Instant::now().as_ticks() as Ticks
    }

    fn tick_hz(&self) -> u32 {
        u32::try_from(embassy_time::TICK_HZ).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(u32);

    impl TickSource for Fixed {
        fn now_ticks(&self) -> Ticks {
            0
        }

        fn tick_hz(&self) -> u32 {
            self.0
        }
    }

    #[test]
    fn test_ms_to_ticks_at_1khz_is_identity() {
        assert_eq!(Fixed(1000).ms_to_ticks(50), 50);
    }

    #[test]
    fn test_ms_to_ticks_at_32768hz_rounds_down() {
        // 100 ms * 32768 / 1000 = 3276.8
        assert_eq!(Fixed(32_768).ms_to_ticks(100), 3276);
    }

    #[test]
    fn test_ms_to_ticks_saturates() {
        assert_eq!(Fixed(1_000_000).ms_to_ticks(u32::MAX), u32::MAX);
    }

    #[test]
    fn test_ticks_to_ms_zero_rate() {
        assert_eq!(Fixed(0).ticks_to_ms(1234), 0);
    }

    #[test]
    fn test_ticks_to_ms_at_32768hz() {
        assert_eq!(Fixed(32_768).ticks_to_ms(32_768), 1000);
    }

    #[test]
    fn test_reference_forwards() {
        let clock = Fixed(1000);
        let by_ref = &clock;
        assert_eq!(by_ref.tick_hz(), 1000);
    }
}
