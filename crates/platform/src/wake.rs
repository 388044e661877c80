//! Wake signal for the owning task's dispatch loop.
//!
//! A wake signal is a binary semaphore: any number of [`WakeSignal::give`]
//! calls before the owner waits collapse into a single wake.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration};

use crate::clock::Ticks;

/// Binary wake signal given by timer clients and consumed by the owning task.
pub trait WakeSignal {
    /// Signal the owner. Never blocks.
    fn give(&self);

    /// Block until [`give`](WakeSignal::give) is called or `timeout` ticks
    /// elapse. `None` waits without a bound.
    async fn wait_for_wake(&self, timeout: Option<Ticks>);
}

impl<T: WakeSignal + ?Sized> WakeSignal for &T {
    fn give(&self) {
        (**self).give();
    }

    async fn wait_for_wake(&self, timeout: Option<Ticks>) {
        (**self).wait_for_wake(timeout).await;
    }
}

impl<M: RawMutex> WakeSignal for Signal<M, ()> {
    fn give(&self) {
        self.signal(());
    }

    async fn wait_for_wake(&self, timeout: Option<Ticks>) {
        match timeout {
            None => Signal::wait(self).await,
            Some(ticks) => {
                // Timeout is the expected path when no client re-arms sooner.
                let _ = with_timeout(Duration::from_ticks(u64::from(ticks)), Signal::wait(self))
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    #[tokio::test]
    async fn test_signal_given_before_wait_returns_immediately() {
        let signal: Signal<CriticalSectionRawMutex, ()> = Signal::new();
        signal.give();
        signal.wait_for_wake(None).await;
        assert!(!signal.signaled());
    }

    #[tokio::test]
    async fn test_repeated_gives_collapse_into_one_wake() {
        let signal: Signal<CriticalSectionRawMutex, ()> = Signal::new();
        signal.give();
        signal.give();
        signal.give();
        signal.wait_for_wake(Some(0)).await;
        assert!(!signal.signaled());
    }

    #[tokio::test]
    async fn test_bounded_wait_times_out_without_give() {
        let signal: Signal<CriticalSectionRawMutex, ()> = Signal::new();
        let start = embassy_time::Instant::now();
        signal
            .wait_for_wake(Some(u32::try_from(Duration::from_millis(5).as_ticks()).unwrap_or(u32::MAX)))
            .await;
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
