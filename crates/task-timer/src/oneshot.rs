//! Fire-once timers that free themselves.
//!
//! [`register`] creates a task timer, starts it, and deletes the record
//! after the callback runs, unless the callback rescheduled it. The returned
//! [`OneShotTimer`] handle stays safe to use after that: operations on a
//! timer that has already fired simply report `false`.

use platform::{TickSource, WakeSignal};

use crate::id::{StartFlags, TaskTimerId};
use crate::manager::TaskTimerManager;

/// Handle to a timer created by [`register`] or [`register_repeating`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OneShotTimer {
    id: TaskTimerId,
}

impl OneShotTimer {
    /// Underlying task timer.
    pub fn id(self) -> TaskTimerId {
        self.id
    }

    /// Move the expiry to `timeout_ms` from now.
    ///
    /// Returns `false` once the timer has fired (and freed itself) or has
    /// been cancelled.
    pub fn reschedule<C: TickSource, W: WakeSignal>(
        self,
        manager: &TaskTimerManager<C, W>,
        timeout_ms: u32,
    ) -> bool {
        manager.restart(self.id, timeout_ms)
    }

    /// Cancel the timer. Safe to call after it fired, and from inside its
    /// own callback.
    pub fn cancel<C: TickSource, W: WakeSignal>(self, manager: &TaskTimerManager<C, W>) {
        manager.try_delete(self.id);
    }

    /// Milliseconds until the timer fires, `None` once fired or cancelled.
    pub fn remaining_ms<C: TickSource, W: WakeSignal>(
        self,
        manager: &TaskTimerManager<C, W>,
    ) -> Option<u32> {
        manager.try_remaining_ms(self.id)
    }
}

/// Run `cb` once, `timeout_ms` from now.
///
/// Returns `None` when the manager's record pool is exhausted.
pub fn register<C, W, F>(
    manager: &TaskTimerManager<C, W>,
    timeout_ms: u32,
    mut cb: F,
) -> Option<OneShotTimer>
where
    C: TickSource,
    W: WakeSignal,
    F: FnMut(&TaskTimerManager<C, W>) + Send + 'static,
{
    let id = manager.create();
    if !id.is_valid() {
        return None;
    }
    manager.start(id, timeout_ms, StartFlags::NONE, move |timers, me| {
        cb(timers);
        if !timers.scheduled(me) {
            timers.delete(me);
        }
    });
    Some(OneShotTimer { id })
}

/// Run `cb` every `period_ms` until cancelled.
///
/// Returns `None` when the manager's record pool is exhausted.
pub fn register_repeating<C, W, F>(
    manager: &TaskTimerManager<C, W>,
    period_ms: u32,
    mut cb: F,
) -> Option<OneShotTimer>
where
    C: TickSource,
    W: WakeSignal,
    F: FnMut(&TaskTimerManager<C, W>) + Send + 'static,
{
    let id = manager.create();
    if !id.is_valid() {
        return None;
    }
    manager.start(id, period_ms, StartFlags::REPEATING, move |timers, _| cb(timers));
    Some(OneShotTimer { id })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation
)]
mod tests {
    use super::*;
    use crate::TimerManagerConfig;
    use platform::mocks::{MockTickSource, MockWakeSignal};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_oneshot_frees_itself_after_firing() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = TaskTimerManager::new(&clock, &wake, TimerManagerConfig::default());
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        let timer = register(&mgr, 20, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        clock.advance(20);
        mgr.execute_expired_timers();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!mgr.contains(timer.id()));
        assert_eq!(mgr.idle_count(), 0);
        assert!(!timer.reschedule(&mgr, 10));
        assert_eq!(timer.remaining_ms(&mgr), None);
        timer.cancel(&mgr);
    }

    #[test]
    fn test_remaining_ms_none_after_fire() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = TaskTimerManager::new(&clock, &wake, TimerManagerConfig::default());
        let timer = register(&mgr, 10, |_| {}).unwrap();
        assert_eq!(timer.remaining_ms(&mgr), Some(10));
        clock.advance(10);
        mgr.execute_expired_timers();
        assert_eq!(timer.remaining_ms(&mgr), None);
        assert_eq!(timer.remaining_ms(&mgr), None);
    }

    #[test]
    fn test_reschedule_before_fire_moves_expiry() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = TaskTimerManager::new(&clock, &wake, TimerManagerConfig::default());
        let timer = register(&mgr, 20, |_| {}).unwrap();
        assert!(timer.reschedule(&mgr, 80));
        assert_eq!(timer.remaining_ms(&mgr), Some(80));
    }

    #[test]
    fn test_cancel_before_fire() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = TaskTimerManager::new(&clock, &wake, TimerManagerConfig::default());
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        let timer = register(&mgr, 20, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        timer.cancel(&mgr);
        clock.advance(50);
        mgr.execute_expired_timers();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_repeating_registration_keeps_firing() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = TaskTimerManager::new(&clock, &wake, TimerManagerConfig::default());
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        let timer = register_repeating(&mgr, 10, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        for _ in 0..3 {
            clock.advance(10);
            mgr.execute_expired_timers();
        }
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert!(mgr.contains(timer.id()));
        timer.cancel(&mgr);
        assert!(!mgr.contains(timer.id()));
    }

    #[test]
    fn test_register_reports_exhaustion() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = TaskTimerManager::new(
            &clock,
            &wake,
            TimerManagerConfig::default().with_max_timers(1),
        );
        assert!(register(&mgr, 10, |_| {}).is_some());
        assert!(register(&mgr, 10, |_| {}).is_none());
    }
}
