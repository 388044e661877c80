//! Criterion benchmarks for the task-timer core.
//!
//! Run: cargo bench -p task-timer --bench timer_throughput
//!
//! Results show:
//!   start_reschedule/*   : start on an already-running timer vs running-list size
//!   execute_expired/*    : one loop step firing every timer vs timer count
//!   cron_next_execution  : next-match search for a weekday alarm

#![allow(
    clippy::unwrap_used, // benchmark helpers use unwrap for brevity
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation,
    missing_docs, // criterion_group! macro generates undocumented items
)]

use std::hint::black_box;

use chrono::NaiveDate;
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use platform::mocks::{MockTickSource, MockWakeSignal};
use task_timer::cron::next_execution_local;
use task_timer::{CronSpec, StartFlags, TaskTimerManager, TimerManagerConfig, WeekdayMask};

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_start_reschedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("start_reschedule");

    for running in [16usize, 256, 4096] {
        let clock = MockTickSource::new(32_768);
        let wake = MockWakeSignal::new();
        let mgr = TaskTimerManager::new(
            &clock,
            &wake,
            TimerManagerConfig::default().with_max_timers(running + 1),
        );
        for n in 0..running {
            let id = mgr.create();
            mgr.start(id, (n as u32 % 5_000) + 10, StartFlags::NONE, |_, _| {});
        }
        let target = mgr.create();
        mgr.start(target, 100, StartFlags::NONE, |_, _| {});

        group.bench_with_input(BenchmarkId::new("timers", running), &running, |b, _| {
            let mut timeout = 0_u32;
            b.iter(|| {
                timeout = (timeout + 7) % 10_000;
                black_box(mgr.restart(target, timeout));
            });
        });
    }
    group.finish();
}

fn bench_execute_expired(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute_expired");

    for count in [16u32, 256, 1024] {
        group.bench_with_input(BenchmarkId::new("timers", count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let mgr = TaskTimerManager::new(
                        MockTickSource::new(1000),
                        MockWakeSignal::new(),
                        TimerManagerConfig::default().with_max_timers(count as usize),
                    );
                    for n in 0..count {
                        let id = mgr.create();
                        mgr.start(id, n % 50, StartFlags::NONE, |m, me| m.delete(me));
                    }
                    mgr.clock().advance(50);
                    mgr
                },
                |mgr| black_box(mgr.execute_expired_timers()),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_cron_next_execution(c: &mut Criterion) {
    let spec = CronSpec::daily(6, 45).on(WeekdayMask::WORKDAYS);
    // Friday evening: the search walks over the weekend.
    let now = NaiveDate::from_ymd_opt(2024, 3, 15)
        .unwrap()
        .and_hms_opt(21, 0, 0)
        .unwrap();
    c.bench_function("cron_next_execution", |b| {
        b.iter(|| black_box(next_execution_local(black_box(&spec), black_box(now))));
    });
}

criterion_group!(
    benches,
    bench_start_reschedule,
    bench_execute_expired,
    bench_cron_next_execution
);
criterion_main!(benches);
