//! Platform seams for the task-timer core
//!
//! This crate provides trait-based abstractions for the three RTOS/hardware
//! collaborators a timer manager depends on, so the scheduling logic can be
//! developed and tested without an executor or a real time driver.
//!
//! # Architecture Layers
//!
//! ```text
//! Owning task (firmware / simulator)
//!         ↓
//! Timer services (task-timer: manager, one-shot timers, cron)
//!         ↓
//! Platform seams (this crate - trait abstractions)
//!         ↓
//! Embassy time driver + embassy-sync primitives
//! ```
//!
//! # Seams
//!
//! - [`TickSource`] - monotonic 32-bit tick counter and tick rate
//! - [`WakeSignal`] - binary "give" signal the owning task blocks on
//! - [`WallClock`] - UTC seconds plus the local offset in effect (DST-aware)
//!
//! # Features
//!
//! - `std`: Expose [`mocks`] outside of this crate's own tests
//! - `defmt`: Enable defmt logging derives
//!
//! # Example
//!
//! ```no_run
//! use platform::{TickSource, WakeSignal};
//!
//! async fn sleep_until_due<C: TickSource, W: WakeSignal>(clock: &C, wake: &W) {
//!     let bound = clock.ms_to_ticks(250);
//!     wake.wait_for_wake(Some(bound)).await;
//! }
//! ```

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(unused_must_use)]
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
#![allow(clippy::must_use_candidate)] // clock accessors: callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(async_fn_in_trait)] // Embassy no_std: single-threaded, Send bounds not needed

pub mod clock;
pub mod mocks;
pub mod rtc;
pub mod wake;

pub use clock::{EmbassyTickSource, TickSource, Ticks};
pub use rtc::WallClock;
pub use wake::WakeSignal;
