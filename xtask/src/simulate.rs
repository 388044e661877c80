//! Virtual-time run of the timer service with tracing output.
//!
//! Plays the owning task's loop against mock clocks: each iteration runs
//! the expired timers and then jumps the tick clock straight to the
//! reported wait bound, keeping the wall clock in step.

use anyhow::{Context, Result};
use colored::Colorize;
use platform::mocks::{MockTickSource, MockWakeSignal, MockWallClock};
use platform::TickSource;
use task_timer::{
    oneshot, CronJobId, CronService, CronSpec, StartFlags, TaskTimerManager, TimerManagerConfig,
    WAIT_FOREVER,
};
use tracing_subscriber::EnvFilter;

/// 2024-03-13 06:59:00 UTC: one minute before the demo alarm.
const START_UTC: i64 = 1_710_313_140;
/// Watch RTC-derived tick rate.
const TICK_HZ: u32 = 32_768;
/// Point at which `--stall` blocks the owning task.
const STALL_AT_SECS: u64 = 10;
const STALL_MS: u32 = 5_000;

type Ticks = &'static MockTickSource;
type Wake = &'static MockWakeSignal;
type Cron = CronService<Ticks, Wake, &'static MockWallClock>;

fn alarm(cron: &Cron, id: CronJobId) {
    tracing::info!(job = %id, "alarm: good morning");
    if let Err(err) = cron.schedule(CronSpec::daily(7, 0), alarm) {
        tracing::error!(%err, "could not re-arm alarm");
    }
}

pub fn run(seconds: u32, stall: bool, log: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(log).context("Invalid log filter")?)
        .with_target(false)
        .init();

    println!();
    println!(
        "{}",
        format!("⏱  Simulating {seconds}s of watch time...").cyan().bold()
    );
    println!();

    let ticks: Ticks = Box::leak(Box::new(MockTickSource::new(TICK_HZ)));
    let wake: Wake = Box::leak(Box::new(MockWakeSignal::new()));
    let rtc: &'static MockWallClock = Box::leak(Box::new(MockWallClock::new(START_UTC, 0)));
    let timers: &'static TaskTimerManager<Ticks, Wake> = Box::leak(Box::new(
        TaskTimerManager::new(ticks, wake, TimerManagerConfig::default()),
    ));
    let cron: &'static Cron = Box::leak(Box::new(CronService::new(timers, rtc)));
    if !cron.attach() {
        anyhow::bail!("Timer pool exhausted while attaching the cron service");
    }

    let refresh = timers.create();
    timers.start(refresh, 1_000, StartFlags::REPEATING, |m, id| {
        let now_ms = m.clock().ticks_to_ms(m.clock().now_ticks());
        tracing::info!(timer = %id, now_ms, "display refresh");
    });
    oneshot::register(timers, 15_000, |_| tracing::info!("backlight off"))
        .context("Timer pool exhausted registering the backlight timeout")?;
    let (job, at) = cron
        .schedule(CronSpec::daily(7, 0), alarm)
        .context("Failed to schedule the alarm")?;
    tracing::info!(job = %job, execute_utc = at, "alarm scheduled");

    let end_ticks = u64::from(seconds).saturating_mul(u64::from(TICK_HZ));
    let mut elapsed: u64 = 0;
    let mut stalled = !stall;

    while elapsed < end_ticks {
        let wait = timers.execute_expired_timers();
        let remaining = end_ticks.saturating_sub(elapsed);
        let mut step = if wait == WAIT_FOREVER {
            remaining
        } else {
            u64::from(wait).clamp(1, remaining)
        };

        if !stalled && elapsed >= STALL_AT_SECS.saturating_mul(u64::from(TICK_HZ)) {
            tracing::warn!(stall_ms = STALL_MS, "owning task blocked");
            step = step.saturating_add(u64::from(ticks.ms_to_ticks(STALL_MS)));
            stalled = true;
        }

        let step_ticks = u32::try_from(step).unwrap_or(u32::MAX);
        ticks.advance(step_ticks);
        elapsed = elapsed.saturating_add(u64::from(step_ticks));
        let whole_secs = elapsed.checked_div(u64::from(TICK_HZ)).unwrap_or(0);
        let elapsed_secs = i64::try_from(whole_secs).unwrap_or(i64::MAX);
        rtc.set_utc(START_UTC.saturating_add(elapsed_secs));
    }
    timers.execute_expired_timers();

    println!();
    println!(
        "{}",
        format!(
            "✓ Simulation finished: {} running, {} idle timers, {} cron jobs",
            timers.running_count(),
            timers.idle_count(),
            cron.job_count()
        )
        .green()
        .bold()
    );
    println!();

    Ok(())
}
