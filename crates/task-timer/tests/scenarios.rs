//! End-to-end timer scenarios against a mock tick source.
// Integration test file: unwrap/indexing are intentional test mechanisms.
#![allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
//!
//! The mock clock runs at 1 kHz so one tick is one millisecond and the
//! returned wait bounds can be compared against timeouts directly.

use std::sync::{Arc, Mutex};

use platform::mocks::{MockTickSource, MockWakeSignal};
use platform::TickSource;
use task_timer::{StartFlags, TaskTimerManager, TimerManagerConfig, WAIT_FOREVER};

type Manager<'a> = TaskTimerManager<&'a MockTickSource, &'a MockWakeSignal>;

fn manager<'a>(clock: &'a MockTickSource, wake: &'a MockWakeSignal) -> Manager<'a> {
    TaskTimerManager::new(clock, wake, TimerManagerConfig::default())
}

/// Shared log the callbacks append to.
fn log() -> Arc<Mutex<Vec<&'static str>>> {
    Arc::new(Mutex::new(Vec::new()))
}

/// Two timers: the sooner one fires first and the wait bound tracks the
/// remaining one.
#[test]
fn soonest_timer_sets_wait_bound_and_fires_alone() {
    let clock = MockTickSource::new(1000);
    let wake = MockWakeSignal::new();
    let mgr = manager(&clock, &wake);
    let fired = log();

    let a = mgr.create();
    let b = mgr.create();
    assert_eq!(a.get(), 1);
    let sink = Arc::clone(&fired);
    assert!(mgr.start(a, 100, StartFlags::NONE, move |_, _| {
        sink.lock().unwrap().push("a");
    }));
    let sink = Arc::clone(&fired);
    assert!(mgr.start(b, 50, StartFlags::NONE, move |_, _| {
        sink.lock().unwrap().push("b");
    }));

    assert_eq!(mgr.execute_expired_timers(), 50);

    clock.advance_ms(50);
    assert_eq!(mgr.execute_expired_timers(), 50);
    assert_eq!(*fired.lock().unwrap(), ["b"]);
    assert!(!mgr.scheduled(b));
    assert!(mgr.scheduled(a));

    clock.advance_ms(50);
    assert_eq!(mgr.execute_expired_timers(), WAIT_FOREVER);
    assert_eq!(*fired.lock().unwrap(), ["b", "a"]);
}

/// `FAIL_IF_SCHEDULED` leaves an armed timer's expiry untouched.
#[test]
fn fail_if_scheduled_keeps_original_expiry() {
    let clock = MockTickSource::new(1000);
    let wake = MockWakeSignal::new();
    let mgr = manager(&clock, &wake);
    let fired = log();

    let a = mgr.create();
    let sink = Arc::clone(&fired);
    assert!(mgr.start(a, 100, StartFlags::NONE, move |_, _| {
        sink.lock().unwrap().push("first");
    }));
    let sink = Arc::clone(&fired);
    assert!(!mgr.start(a, 50, StartFlags::FAIL_IF_SCHEDULED, move |_, _| {
        sink.lock().unwrap().push("second");
    }));

    assert_eq!(mgr.remaining_ms(a), Some(100));
    clock.advance_ms(50);
    assert_eq!(mgr.execute_expired_timers(), 50);
    assert!(fired.lock().unwrap().is_empty());

    clock.advance_ms(50);
    mgr.execute_expired_timers();
    assert_eq!(*fired.lock().unwrap(), ["first"]);
}

/// `FAIL_IF_SCHEDULED` does not block arming an idle timer.
#[test]
fn fail_if_scheduled_allows_idle_timer() {
    let clock = MockTickSource::new(1000);
    let wake = MockWakeSignal::new();
    let mgr = manager(&clock, &wake);
    let a = mgr.create();
    assert!(mgr.start(a, 30, StartFlags::FAIL_IF_SCHEDULED, |_, _| {}));
    assert!(mgr.scheduled(a));
}

/// Repeating timers reload from their previous expiry, so callback latency
/// never accumulates.
#[test]
fn repeating_timer_is_drift_free() {
    let clock = MockTickSource::new(1000);
    let wake = MockWakeSignal::new();
    let mgr = manager(&clock, &wake);
    let fire_times = Arc::new(Mutex::new(Vec::new()));

    let id = mgr.create();
    let sink = Arc::clone(&fire_times);
    mgr.start(id, 10, StartFlags::REPEATING, move |m, _| {
        sink.lock().unwrap().push(m.clock().now_ticks());
        // Simulated callback latency.
        m.clock().advance(3);
    });

    while fire_times.lock().unwrap().len() < 10 {
        let wait = mgr.execute_expired_timers();
        clock.advance(wait);
    }

    let expected: Vec<u32> = (1..=10).map(|n| n * 10).collect();
    assert_eq!(*fire_times.lock().unwrap(), expected);
}

/// A timer that is late by less than one period plus slack stays on its
/// original grid.
#[test]
fn repeating_timer_late_once_keeps_phase() {
    let clock = MockTickSource::new(1000);
    let wake = MockWakeSignal::new();
    let mgr = manager(&clock, &wake);
    let id = mgr.create();
    mgr.start(id, 50, StartFlags::REPEATING, |_, _| {});

    clock.advance_ms(70);
    assert_eq!(mgr.execute_expired_timers(), 30);
    clock.advance_ms(30);
    assert_eq!(mgr.execute_expired_timers(), 50);
}

/// A timer far behind fires once, then resumes one period from now.
#[test]
fn fallen_behind_timer_catches_up_with_single_fire() {
    let clock = MockTickSource::new(1000);
    let wake = MockWakeSignal::new();
    let mgr = manager(&clock, &wake);
    let count = Arc::new(Mutex::new(0_u32));

    let id = mgr.create();
    let sink = Arc::clone(&count);
    mgr.start(id, 20, StartFlags::REPEATING, move |_, _| {
        *sink.lock().unwrap() += 1;
    });

    clock.advance_ms(5_000);
    assert_eq!(mgr.execute_expired_timers(), 20);
    assert_eq!(*count.lock().unwrap(), 1);
}

/// Equal expiries fire in the order the timers were started.
#[test]
fn equal_expiries_fire_first_started_first() {
    let clock = MockTickSource::new(1000);
    let wake = MockWakeSignal::new();
    let mgr = manager(&clock, &wake);
    let fired = log();

    for name in ["one", "two", "three"] {
        let id = mgr.create();
        let sink = Arc::clone(&fired);
        mgr.start(id, 25, StartFlags::NONE, move |_, _| {
            sink.lock().unwrap().push(name);
        });
    }

    clock.advance_ms(25);
    mgr.execute_expired_timers();
    assert_eq!(*fired.lock().unwrap(), ["one", "two", "three"]);
}

/// Restarting a running timer moves it rather than duplicating it.
#[test]
fn restart_of_running_timer_reschedules() {
    let clock = MockTickSource::new(1000);
    let wake = MockWakeSignal::new();
    let mgr = manager(&clock, &wake);
    let count = Arc::new(Mutex::new(0_u32));

    let id = mgr.create();
    let sink = Arc::clone(&count);
    mgr.start(id, 100, StartFlags::NONE, move |_, _| {
        *sink.lock().unwrap() += 1;
    });
    mgr.start(id, 40, StartFlags::NONE, |_, _| {});
    assert_eq!(mgr.running_count(), 1);
    assert_eq!(mgr.execute_expired_timers(), 40);

    clock.advance_ms(100);
    mgr.execute_expired_timers();
    // The replacement callback ran; the original never did.
    assert_eq!(*count.lock().unwrap(), 0);
    assert_eq!(mgr.running_count(), 0);
    assert_eq!(mgr.idle_count(), 1);
}

/// Rapid reschedules collapse into a single pending wake.
#[test]
fn wake_is_a_give_not_a_count() {
    let clock = MockTickSource::new(1000);
    let wake = MockWakeSignal::new();
    let mgr = manager(&clock, &wake);
    let id = mgr.create();
    for timeout in [500, 400, 300, 200] {
        mgr.start(id, timeout, StartFlags::NONE, |_, _| {});
    }
    assert_eq!(wake.gives(), 4);
    assert!(wake.take_pending());
    assert!(!wake.take_pending());
    assert_eq!(mgr.execute_expired_timers(), 200);
}

/// Tick conversions follow the clock rate.
#[test]
fn remaining_ms_converts_at_tick_rate() {
    let clock = MockTickSource::new(32_768);
    let wake = MockWakeSignal::new();
    let mgr = TaskTimerManager::new(&clock, &wake, TimerManagerConfig::default());
    let id = mgr.create();
    mgr.start(id, 1000, StartFlags::NONE, |_, _| {});
    assert_eq!(mgr.execute_expired_timers(), 32_768);
    assert_eq!(mgr.remaining_ms(id), Some(1000));
    clock.advance_ms(250);
    assert_eq!(mgr.remaining_ms(id), Some(750));
}
