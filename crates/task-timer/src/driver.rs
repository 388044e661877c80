//! Owning-task dispatch loop.
//!
//! The owning task alternates between running expired timers and blocking
//! on the manager's wake signal for at most the reported wait bound. Gives
//! that arrive while timers are running are not lost: the signal stays set
//! and the next wait returns immediately.
//!
//! ```no_run
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//! use embassy_sync::signal::Signal;
//! use platform::EmbassyTickSource;
//! use task_timer::{driver, TaskTimerManager, TimerManagerConfig};
//!
//! static WAKE: Signal<CriticalSectionRawMutex, ()> = Signal::new();
//!
//! async fn timer_task(
//!     manager: &'static TaskTimerManager<EmbassyTickSource, &'static Signal<CriticalSectionRawMutex, ()>>,
//! ) -> ! {
//!     driver::run(manager).await
//! }
//! ```

use platform::{TickSource, Ticks, WakeSignal};

use crate::config::WAIT_FOREVER;
use crate::manager::TaskTimerManager;

/// Map an `execute_expired_timers` result to a wake-signal timeout.
pub fn wait_bound(ticks: Ticks) -> Option<Ticks> {
    (ticks != WAIT_FOREVER).then_some(ticks)
}

/// Service one wake: run expired timers, then block until the next expiry
/// or a give. Returns the bound that was waited on.
pub async fn service_once<C: TickSource, W: WakeSignal>(
    manager: &TaskTimerManager<C, W>,
) -> Option<Ticks> {
    let bound = wait_bound(manager.execute_expired_timers());
    manager.wake_signal().wait_for_wake(bound).await;
    bound
}

/// Run the owning task's timer loop forever.
pub async fn run<C: TickSource, W: WakeSignal>(manager: &TaskTimerManager<C, W>) -> ! {
    loop {
        service_once(manager).await;
    }
}
