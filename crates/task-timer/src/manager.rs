//! Per-task software timer manager.
//!
//! A [`TaskTimerManager`] multiplexes one wake signal across any number of
//! one-shot or repeating timers owned by a single task. Any task may create,
//! start, stop or delete timers; only the owning task calls
//! [`execute_expired_timers`](TaskTimerManager::execute_expired_timers),
//! usually through [`driver::run`](crate::driver::run).
//!
//! # Locking
//!
//! Manager state sits behind a critical-section mutex. The lock is never
//! held while a callback runs, so callbacks may call back into the manager,
//! including stopping, restarting or deleting their own timer.
//!
//! # Deferred delete
//!
//! A record is never freed while its callback is on the stack. Deleting a
//! timer from inside its own callback marks it pending; the execution loop
//! frees it as soon as the callback returns.

use alloc::boxed::Box;
use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use platform::{TickSource, Ticks, WakeSignal};

use crate::config::{TimerManagerConfig, WAIT_FOREVER};
use crate::id::{StartFlags, TaskTimerId};
use crate::lists::{ExecState, TimerLists, TimerRecord};

/// Boxed timer callback.
///
/// Receives the manager that fired it and the timer's own ID.
pub type TimerCallback<C, W> = Box<dyn FnMut(&TaskTimerManager<C, W>, TaskTimerId) + Send>;

type Lists<C, W> = TimerLists<TimerCallback<C, W>>;

/// Outcome of one pass over the head of the running list.
enum Step<Cb> {
    Idle,
    Wait(Ticks),
    Fire { id: TaskTimerId, callback: Option<Cb> },
}

/// Values released by a critical section that must be dropped after it.
///
/// Callbacks own arbitrary captures whose `Drop` may re-enter the manager.
struct Released<Cb> {
    record: Option<TimerRecord<Cb>>,
    callback: Option<Cb>,
}

impl<Cb> Released<Cb> {
    const NOTHING: Self = Self {
        record: None,
        callback: None,
    };
}

/// Software timers for one owning task.
pub struct TaskTimerManager<C, W> {
    clock: C,
    wake: W,
    config: TimerManagerConfig,
    behind_slack_ticks: Ticks,
    /// Timer whose callback is on the stack, `0` otherwise. Diagnostic only.
    current: AtomicU32,
    lists: Mutex<CriticalSectionRawMutex, RefCell<Lists<C, W>>>,
}

impl<C: TickSource, W: WakeSignal> TaskTimerManager<C, W> {
    /// Create a manager reading `clock` and giving `wake` whenever the
    /// soonest expiry moves earlier.
    pub fn new(clock: C, wake: W, config: TimerManagerConfig) -> Self {
        let behind_slack_ticks = clock.ms_to_ticks(config.behind_slack_ms);
        Self {
            clock,
            wake,
            config,
            behind_slack_ticks,
            current: AtomicU32::new(0),
            lists: Mutex::new(RefCell::new(TimerLists::new())),
        }
    }

    /// Allocate an idle timer.
    ///
    /// Returns [`TaskTimerId::INVALID`] when the record pool is exhausted;
    /// callers must check [`TaskTimerId::is_valid`].
    pub fn create(&self) -> TaskTimerId {
        let max = self.config.max_timers;
        match self.with_lists(|lists| lists.create(max)) {
            Some(id) => id,
            None => {
                #[cfg(feature = "defmt")]
                defmt::warn!("task timer pool exhausted ({=usize} live)", max);
                #[cfg(feature = "tracing")]
                tracing::warn!(max_timers = max, "task timer pool exhausted");
                TaskTimerId::INVALID
            }
        }
    }

    /// Schedule `id` to fire `timeout_ms` from now with callback `cb`.
    ///
    /// Reschedules the timer if it is already running. Returns `false`
    /// without touching the schedule when a `FAIL_IF_*` flag applies.
    ///
    /// # Panics
    ///
    /// If `id` is unknown or its deletion is pending.
    pub fn start<F>(&self, id: TaskTimerId, timeout_ms: u32, flags: StartFlags, cb: F) -> bool
    where
        F: FnMut(&Self, TaskTimerId) + Send + 'static,
    {
        self.arm(id, timeout_ms, flags, Some(Box::new(cb)))
    }

    /// Reschedule `id` to fire `timeout_ms` from now, keeping the callback
    /// and repeat mode from its last [`start`](Self::start).
    ///
    /// Returns `false` if the timer has never been started, has been
    /// deleted, or is pending deletion.
    pub fn restart(&self, id: TaskTimerId, timeout_ms: u32) -> bool {
        self.arm(id, timeout_ms, StartFlags::NONE, None)
    }

    #[allow(clippy::panic)] // re-arming a timer mid-deletion is a contract violation
    fn arm(
        &self,
        id: TaskTimerId,
        timeout_ms: u32,
        flags: StartFlags,
        callback: Option<TimerCallback<C, W>>,
    ) -> bool {
        let timeout = self.clock.ms_to_ticks(timeout_ms);
        let (scheduled, became_head, released) = self.with_lists(|lists| {
            let restarting = callback.is_none();
            let record = match lists.get_mut(id) {
                Some(record) if record.exec != ExecState::ExecutingPendingDelete => record,
                Some(_) | None if restarting => return (false, false, None),
                Some(_) => panic!("start: {id} is being deleted"),
                None => panic!("start: unknown {id}"),
            };
            let rejected = (flags.contains(StartFlags::FAIL_IF_EXECUTING)
                && record.exec.is_executing())
                || (flags.contains(StartFlags::FAIL_IF_SCHEDULED) && record.expire.is_some());
            if rejected {
                return (false, false, callback);
            }

            let previous = match callback {
                Some(new) => {
                    record.repeating = flags.contains(StartFlags::REPEATING);
                    record.callback.replace(new)
                }
                // While executing the callback is out on the stack; it is
                // restored when it returns.
                None if record.callback.is_some() || record.exec.is_executing() => None,
                None => return (false, false, None),
            };
            record.period_ticks = if record.repeating {
                timeout.max(1)
            } else {
                timeout
            };

            lists.unschedule(id);
            let expire = self.clock.now_ticks().wrapping_add(timeout);
            let became_head = lists.schedule(id, expire);
            (true, became_head, previous)
        });
        drop(released);

        if became_head {
            self.wake.give();
        }
        scheduled
    }

    /// Move `id` to the idle list and clear its repeat flag.
    ///
    /// Returns `false` when the timer's callback is running at the time of
    /// the call: the callback cannot be interrupted and may still be on the
    /// stack when this returns. The timer is unscheduled either way.
    ///
    /// # Panics
    ///
    /// If `id` is unknown or its deletion is pending.
    #[allow(clippy::panic)] // stopping a timer mid-deletion is a contract violation
    pub fn stop(&self, id: TaskTimerId) -> bool {
        self.with_lists(|lists| {
            let record = lists.expect_mut(id, "stop");
            if record.exec == ExecState::ExecutingPendingDelete {
                panic!("stop: {id} is being deleted");
            }
            record.repeating = false;
            let executing = record.exec.is_executing();
            lists.unschedule(id);
            !executing
        })
    }

    /// `true` while `id` is on the running list.
    ///
    /// A timer whose callback is running reports `false` unless the callback
    /// re-armed it.
    ///
    /// # Panics
    ///
    /// If `id` is unknown.
    pub fn scheduled(&self, id: TaskTimerId) -> bool {
        self.with_lists(|lists| lists.expect_mut(id, "scheduled").expire.is_some())
    }

    /// Milliseconds until `id` fires, clamped to zero for overdue timers.
    /// `None` when not scheduled.
    ///
    /// # Panics
    ///
    /// If `id` is unknown.
    pub fn remaining_ms(&self, id: TaskTimerId) -> Option<u32> {
        let expire = self.with_lists(|lists| lists.expect_mut(id, "scheduled").expire)?;
        Some(self.ms_until(expire))
    }

    /// [`remaining_ms`](Self::remaining_ms) for IDs that may have been
    /// freed concurrently.
    ///
    /// `None` for unknown timers and timers whose deletion is pending, as
    /// well as for unscheduled ones.
    pub fn try_remaining_ms(&self, id: TaskTimerId) -> Option<u32> {
        let expire = self.with_lists(|lists| {
            lists
                .get(id)
                .filter(|record| record.exec != ExecState::ExecutingPendingDelete)
                .and_then(|record| record.expire)
        })?;
        Some(self.ms_until(expire))
    }

    fn ms_until(&self, expire: Ticks) -> u32 {
        let remaining = expire.saturating_sub(self.clock.now_ticks());
        self.clock.ticks_to_ms(remaining)
    }

    /// `true` when `id` is live and not pending deletion.
    pub fn contains(&self, id: TaskTimerId) -> bool {
        self.with_lists(|lists| {
            lists
                .get(id)
                .is_some_and(|record| record.exec != ExecState::ExecutingPendingDelete)
        })
    }

    /// Delete `id`.
    ///
    /// When called from the timer's own callback the record is freed after
    /// the callback returns. Deleting a timer whose deletion is already
    /// pending is a no-op.
    ///
    /// # Panics
    ///
    /// If `id` is unknown.
    pub fn delete(&self, id: TaskTimerId) {
        self.delete_inner(id, true);
    }

    /// Delete `id` if it is still live.
    ///
    /// Returns `false` for IDs that were already deleted (or never issued)
    /// instead of panicking. Used by handles that may race with a timer
    /// freeing itself.
    pub fn try_delete(&self, id: TaskTimerId) -> bool {
        self.delete_inner(id, false)
    }

    #[allow(clippy::panic)] // unknown IDs are programming errors for `delete`
    fn delete_inner(&self, id: TaskTimerId, strict: bool) -> bool {
        let (deleted, released) = self.with_lists(|lists| {
            let record = match lists.get_mut(id) {
                Some(record) => record,
                None if strict => panic!("delete: unknown {id}"),
                None => return (false, Released::NOTHING),
            };
            let released = match record.exec {
                ExecState::ExecutingPendingDelete => return (false, Released::NOTHING),
                ExecState::Executing => {
                    record.repeating = false;
                    record.exec = ExecState::ExecutingPendingDelete;
                    lists.unschedule(id);
                    Released::NOTHING
                }
                ExecState::Dormant => Released {
                    record: lists.remove(id),
                    callback: None,
                },
            };
            (true, released)
        });
        drop(released);
        deleted
    }

    /// Run every expired timer, then report how long the owning task may
    /// block.
    ///
    /// Returns the ticks until the next expiry, or [`WAIT_FOREVER`] when no
    /// timer is running. Must only be called from the owning task.
    pub fn execute_expired_timers(&self) -> Ticks {
        loop {
            let (id, mut callback) = match self.with_lists(|lists| self.pop_expired(lists)) {
                Step::Idle => return WAIT_FOREVER,
                Step::Wait(ticks) => return ticks,
                Step::Fire { id, callback } => (id, callback),
            };

            self.current.store(id.get(), Ordering::Relaxed);
            if let Some(cb) = callback.as_mut() {
                cb(self, id);
            }
            self.current.store(0, Ordering::Relaxed);

            let released = self.with_lists(|lists| Self::finish(lists, id, callback));
            drop(released);
        }
    }

    fn pop_expired(&self, lists: &mut Lists<C, W>) -> Step<TimerCallback<C, W>> {
        let now = self.clock.now_ticks();
        let Some((expire, id)) = lists.head() else {
            return Step::Idle;
        };
        if expire > now {
            return Step::Wait(expire.wrapping_sub(now).min(WAIT_FOREVER.wrapping_sub(1)));
        }

        lists.unschedule(id);
        let record = lists.expect_mut(id, "execute");
        record.exec = ExecState::Executing;
        record.reload_base = expire;
        if record.repeating {
            let late = now.wrapping_sub(expire);
            if late > record.period_ticks.saturating_add(self.behind_slack_ticks) {
                #[cfg(feature = "defmt")]
                defmt::warn!("{} fell behind by {=u32} ticks, catching up once", id, late);
                #[cfg(feature = "tracing")]
                tracing::warn!(timer = id.get(), late_ticks = late, "repeating timer fell behind");
                record.reload_base = now;
            }
        }
        Step::Fire {
            id,
            callback: record.callback.take(),
        }
    }

    fn finish(
        lists: &mut Lists<C, W>,
        id: TaskTimerId,
        callback: Option<TimerCallback<C, W>>,
    ) -> Released<TimerCallback<C, W>> {
        let record = lists.expect_mut(id, "execute");
        // A callback that re-armed itself with a new closure keeps the new one.
        let stale = if record.callback.is_none() {
            record.callback = callback;
            None
        } else {
            callback
        };

        if record.exec == ExecState::ExecutingPendingDelete {
            return Released {
                record: lists.remove(id),
                callback: stale,
            };
        }
        record.exec = ExecState::Dormant;

        if record.repeating && record.expire.is_none() {
            let next = record.reload_base.wrapping_add(record.period_ticks);
            lists.schedule(id, next);
        }
        Released {
            record: None,
            callback: stale,
        }
    }

    /// Timer whose callback is currently running, if any.
    ///
    /// Read without the lock; intended for crash dumps and debugging.
    pub fn current_timer(&self) -> Option<TaskTimerId> {
        let raw = self.current.load(Ordering::Relaxed);
        (raw != 0).then(|| TaskTimerId::from_raw(raw))
    }

    /// Number of timers on the running list.
    pub fn running_count(&self) -> usize {
        self.with_lists(|lists| lists.running_len())
    }

    /// Number of live timers on the idle list (including any whose
    /// callback is running and has not re-armed).
    pub fn idle_count(&self) -> usize {
        self.with_lists(|lists| lists.len().saturating_sub(lists.running_len()))
    }

    /// Tick source this manager schedules against.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Signal given when the soonest expiry moves earlier.
    pub fn wake_signal(&self) -> &W {
        &self.wake
    }

    /// Configuration the manager was created with.
    pub fn config(&self) -> &TimerManagerConfig {
        &self.config
    }

    fn with_lists<R>(&self, f: impl FnOnce(&mut Lists<C, W>) -> R) -> R {
        self.lists.lock(|cell| f(&mut cell.borrow_mut()))
    }
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
    use platform::mocks::{MockTickSource, MockWakeSignal};
    use std::sync::{Arc, Mutex as StdMutex};

    type TestManager<'a> = TaskTimerManager<&'a MockTickSource, &'a MockWakeSignal>;

    fn manager<'a>(clock: &'a MockTickSource, wake: &'a MockWakeSignal) -> TestManager<'a> {
        TaskTimerManager::new(clock, wake, TimerManagerConfig::default())
    }

    #[test]
    fn test_empty_manager_waits_forever() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = manager(&clock, &wake);
        assert_eq!(mgr.execute_expired_timers(), WAIT_FOREVER);
    }

    #[test]
    fn test_create_returns_idle_timer() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = manager(&clock, &wake);
        let id = mgr.create();
        assert!(id.is_valid());
        assert!(!mgr.scheduled(id));
        assert_eq!(mgr.idle_count(), 1);
        assert_eq!(mgr.running_count(), 0);
    }

    #[test]
    fn test_create_reports_exhaustion_with_invalid_id() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = TaskTimerManager::new(
            &clock,
            &wake,
            TimerManagerConfig::default().with_max_timers(2),
        );
        assert!(mgr.create().is_valid());
        let second = mgr.create();
        assert!(second.is_valid());
        assert_eq!(mgr.create(), TaskTimerId::INVALID);
        mgr.delete(second);
        assert!(mgr.create().is_valid());
    }

    #[test]
    fn test_start_gives_wake_only_for_new_head() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = manager(&clock, &wake);
        let a = mgr.create();
        let b = mgr.create();
        assert!(mgr.start(a, 100, StartFlags::NONE, |_, _| {}));
        assert_eq!(wake.gives(), 1);
        assert!(mgr.start(b, 200, StartFlags::NONE, |_, _| {}));
        assert_eq!(wake.gives(), 1);
        assert!(mgr.start(b, 10, StartFlags::NONE, |_, _| {}));
        assert_eq!(wake.gives(), 2);
    }

    #[test]
    fn test_remaining_ms_clamps_overdue_to_zero() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = manager(&clock, &wake);
        let id = mgr.create();
        mgr.start(id, 30, StartFlags::NONE, |_, _| {});
        assert_eq!(mgr.remaining_ms(id), Some(30));
        clock.advance(50);
        assert_eq!(mgr.remaining_ms(id), Some(0));
    }

    #[test]
    fn test_remaining_ms_none_when_idle() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = manager(&clock, &wake);
        let id = mgr.create();
        assert_eq!(mgr.remaining_ms(id), None);
    }

    #[test]
    fn test_try_remaining_ms_tolerates_freed_ids() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = manager(&clock, &wake);
        let id = mgr.create();
        assert_eq!(mgr.try_remaining_ms(id), None);
        mgr.start(id, 25, StartFlags::NONE, |_, _| {});
        assert_eq!(mgr.try_remaining_ms(id), Some(25));
        mgr.delete(id);
        assert_eq!(mgr.try_remaining_ms(id), None);
        assert_eq!(mgr.try_remaining_ms(TaskTimerId::from_raw(999)), None);
    }

    #[test]
    fn test_try_remaining_ms_none_while_delete_pending() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = manager(&clock, &wake);
        let seen = Arc::new(StdMutex::new(Some(0)));
        let id = mgr.create();
        let slot = Arc::clone(&seen);
        mgr.start(id, 5, StartFlags::REPEATING, move |m, me| {
            m.delete(me);
            *slot.lock().unwrap() = m.try_remaining_ms(me);
        });
        clock.advance(5);
        mgr.execute_expired_timers();
        assert_eq!(*seen.lock().unwrap(), None);
        assert!(!mgr.contains(id));
    }

    #[test]
    fn test_default_config_has_no_record_cap() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = manager(&clock, &wake);
        for _ in 0..1_000 {
            assert!(mgr.create().is_valid());
        }
        assert_eq!(mgr.idle_count(), 1_000);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = manager(&clock, &wake);
        let id = mgr.create();
        mgr.start(id, 10, StartFlags::REPEATING, |_, _| {});
        assert!(mgr.stop(id));
        assert!(mgr.stop(id));
        assert!(!mgr.scheduled(id));
        clock.advance(100);
        assert_eq!(mgr.execute_expired_timers(), WAIT_FOREVER);
    }

    #[test]
    fn test_restart_requires_prior_start() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = manager(&clock, &wake);
        let id = mgr.create();
        assert!(!mgr.restart(id, 10));
        mgr.start(id, 10, StartFlags::NONE, |_, _| {});
        mgr.stop(id);
        assert!(mgr.restart(id, 40));
        assert_eq!(mgr.remaining_ms(id), Some(40));
    }

    #[test]
    fn test_restart_keeps_callback() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = manager(&clock, &wake);
        let fired = Arc::new(StdMutex::new(0_u32));
        let id = mgr.create();
        let counter = Arc::clone(&fired);
        mgr.start(id, 10, StartFlags::NONE, move |_, _| {
            *counter.lock().unwrap() += 1;
        });
        clock.advance(10);
        mgr.execute_expired_timers();
        assert!(mgr.restart(id, 10));
        clock.advance(10);
        mgr.execute_expired_timers();
        assert_eq!(*fired.lock().unwrap(), 2);
    }

    #[test]
    fn test_current_timer_visible_inside_callback() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = manager(&clock, &wake);
        let seen = Arc::new(StdMutex::new(None));
        let id = mgr.create();
        let slot = Arc::clone(&seen);
        mgr.start(id, 1, StartFlags::NONE, move |m, _| {
            *slot.lock().unwrap() = m.current_timer();
        });
        clock.advance(1);
        mgr.execute_expired_timers();
        assert_eq!(*seen.lock().unwrap(), Some(id));
        assert_eq!(mgr.current_timer(), None);
    }

    #[test]
    fn test_scheduled_false_inside_own_callback() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = manager(&clock, &wake);
        let seen = Arc::new(StdMutex::new(true));
        let id = mgr.create();
        let slot = Arc::clone(&seen);
        mgr.start(id, 5, StartFlags::REPEATING, move |m, me| {
            *slot.lock().unwrap() = m.scheduled(me);
        });
        clock.advance(5);
        mgr.execute_expired_timers();
        assert!(!*seen.lock().unwrap());
        // Reinserted after the callback returned.
        assert!(mgr.scheduled(id));
    }

    #[test]
    fn test_fell_behind_repeating_timer_fires_once() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = manager(&clock, &wake);
        let fired = Arc::new(StdMutex::new(0_u32));
        let id = mgr.create();
        let counter = Arc::clone(&fired);
        mgr.start(id, 10, StartFlags::REPEATING, move |_, _| {
            *counter.lock().unwrap() += 1;
        });
        // Ten periods late, well beyond one period plus slack.
        clock.advance(1_000);
        let wait = mgr.execute_expired_timers();
        assert_eq!(*fired.lock().unwrap(), 1);
        assert_eq!(wait, 10);
        assert_eq!(mgr.remaining_ms(id), Some(10));
    }

    #[test]
    fn test_late_within_slack_keeps_phase() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = manager(&clock, &wake);
        let id = mgr.create();
        mgr.start(id, 100, StartFlags::REPEATING, |_, _| {});
        // 30 ms late: inside period + slack, so the next expiry stays at 200.
        clock.advance(130);
        assert_eq!(mgr.execute_expired_timers(), 70);
    }

    #[test]
    fn test_zero_period_repeating_timer_does_not_spin() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = manager(&clock, &wake);
        let id = mgr.create();
        mgr.start(id, 0, StartFlags::REPEATING, |_, _| {});
        assert_eq!(mgr.execute_expired_timers(), 1);
    }

    #[test]
    fn test_contains_false_after_delete() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = manager(&clock, &wake);
        let id = mgr.create();
        assert!(mgr.contains(id));
        mgr.delete(id);
        assert!(!mgr.contains(id));
    }

    #[test]
    #[should_panic(expected = "unknown")]
    fn test_start_unknown_id_panics() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = manager(&clock, &wake);
        mgr.start(TaskTimerId::from_raw(42), 10, StartFlags::NONE, |_, _| {});
    }

    #[test]
    #[should_panic(expected = "unknown")]
    fn test_delete_twice_outside_callback_panics() {
        let clock = MockTickSource::new(1000);
        let wake = MockWakeSignal::new();
        let mgr = manager(&clock, &wake);
        let id = mgr.create();
        mgr.delete(id);
        mgr.delete(id);
    }
}
