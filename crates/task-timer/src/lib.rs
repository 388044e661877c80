//! Task-timer scheduling core
//!
//! Software timers multiplexed onto a single wake signal per owning task,
//! plus the services built on top of them.
//!
//! # Layers
//!
//! ```text
//! cron::CronService      wall-clock jobs (DST / clock-change aware)
//! oneshot                fire-once timers that free themselves
//!         ↓
//! TaskTimerManager       running/idle lists, deferred delete, execution loop
//!         ↓
//! driver::run            owning task: execute → wait on wake signal → repeat
//!         ↓
//! platform               TickSource, WakeSignal, WallClock
//! ```
//!
//! # Features
//!
//! - `std`: Enable the platform mocks for downstream tests
//! - `defmt`: Log through defmt (hardware)
//! - `tracing`: Log through tracing (desktop / simulator)
//!
//! # Example
//!
//! ```
//! use platform::mocks::{MockTickSource, MockWakeSignal};
//! use task_timer::{StartFlags, TaskTimerManager, TimerManagerConfig, WAIT_FOREVER};
//!
//! let clock = MockTickSource::new(1000);
//! let wake = MockWakeSignal::new();
//! let timers = TaskTimerManager::new(&clock, &wake, TimerManagerConfig::default());
//!
//! let blink = timers.create();
//! timers.start(blink, 500, StartFlags::REPEATING, |_, _| { /* toggle LED */ });
//! assert_eq!(timers.execute_expired_timers(), 500);
//!
//! timers.delete(blink);
//! assert_eq!(timers.execute_expired_timers(), WAIT_FOREVER);
//! ```

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(unused_must_use)]
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(async_fn_in_trait)]

extern crate alloc;

pub mod config;
pub mod cron;
pub mod driver;
mod id;
mod lists;
pub mod manager;
pub mod oneshot;

pub use config::{TimerManagerConfig, WAIT_FOREVER};
pub use cron::{CronError, CronJobId, CronService, CronSpec, WeekdayMask};
pub use id::{StartFlags, TaskTimerId};
pub use manager::{TaskTimerManager, TimerCallback};
pub use oneshot::OneShotTimer;
