//! Cron job table multiplexed onto one task timer.

use alloc::boxed::Box;
use core::cell::RefCell;
use core::fmt;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;
use platform::{TickSource, WakeSignal, WallClock};

use super::schedule::{next_execution_utc, CronSpec};
use super::CronError;
use crate::config::{CRON_MAX_ARM_MS, MAX_CRON_JOBS};
use crate::id::{StartFlags, TaskTimerId};
use crate::manager::TaskTimerManager;

/// Handle to a scheduled cron job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CronJobId(u32);

impl CronJobId {
    /// Raw value, for logging.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CronJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cron#{}", self.0)
    }
}

/// Boxed cron callback. Receives the service and the job's ID.
pub type CronCallback<C, W, R> = Box<dyn FnMut(&CronService<C, W, R>, CronJobId) + Send>;

struct CronJob<Cb> {
    id: CronJobId,
    spec: CronSpec,
    execute_utc: i64,
    callback: Cb,
}

struct CronTable<Cb> {
    jobs: Vec<CronJob<Cb>, MAX_CRON_JOBS>,
    next_id: u32,
    timer: TaskTimerId,
    /// Set while a firing pass runs callbacks.
    firing: bool,
}

impl<Cb> CronTable<Cb> {
    const fn new() -> Self {
        Self {
            jobs: Vec::new(),
            next_id: 0,
            timer: TaskTimerId::INVALID,
            firing: false,
        }
    }

    fn position(&self, id: CronJobId) -> Option<usize> {
        self.jobs.iter().position(|job| job.id == id)
    }

    fn find(&self, id: CronJobId) -> Option<&CronJob<Cb>> {
        self.jobs.iter().find(|job| job.id == id)
    }

    fn soonest(&self) -> Option<i64> {
        self.jobs.iter().map(|job| job.execute_utc).min()
    }

    /// Jobs due at `now`, soonest first; ties go to the older job.
    fn due_at(&self, now: i64) -> Vec<CronJobId, MAX_CRON_JOBS> {
        let mut due: Vec<(i64, CronJobId), MAX_CRON_JOBS> = self
            .jobs
            .iter()
            .filter(|job| job.execute_utc <= now)
            .map(|job| (job.execute_utc, job.id))
            .collect();
        due.sort_unstable();
        due.iter().map(|&(_, id)| id).collect()
    }

    fn take(&mut self, id: CronJobId) -> Option<CronJob<Cb>> {
        let index = self.position(id)?;
        Some(self.jobs.swap_remove(index))
    }
}

/// Wall-clock job scheduler.
///
/// Jobs are one-shot: a job is removed from the table just before its
/// callback runs, and a recurring job schedules itself again from the
/// callback. Callbacks run on the manager's owning task, outside the cron
/// lock, so they may call [`schedule`](Self::schedule) and
/// [`unschedule`](Self::unschedule).
///
/// A firing pass runs only the jobs due when it started. Jobs scheduled
/// from a callback never match the minute being served, even with
/// [`CronSpec::instant_ok`], so a self-rescheduling job fires once per
/// matching minute.
///
/// The service lives in a `static` (it hands a `&'static self` to its task
/// timer) and must be [`attach`](Self::attach)ed before jobs can be scheduled.
pub struct CronService<C: 'static, W: 'static, R> {
    manager: &'static TaskTimerManager<C, W>,
    clock: R,
    table: Mutex<CriticalSectionRawMutex, RefCell<CronTable<CronCallback<C, W, R>>>>,
}

impl<C, W, R> CronService<C, W, R>
where
    C: TickSource + 'static,
    W: WakeSignal + 'static,
    R: WallClock,
{
    /// Create a detached service scheduling on `manager` against `clock`.
    pub const fn new(manager: &'static TaskTimerManager<C, W>, clock: R) -> Self {
        Self {
            manager,
            clock,
            table: Mutex::new(RefCell::new(CronTable::new())),
        }
    }

    /// Create the backing task timer.
    ///
    /// Returns `false` when the manager's record pool is exhausted. Calling
    /// it again replaces the timer.
    pub fn attach(&'static self) -> bool
    where
        C: Sync,
        W: Sync,
        R: Sync + 'static,
    {
        let timer = self.manager.create();
        if !timer.is_valid() {
            return false;
        }
        self.manager
            .start(timer, CRON_MAX_ARM_MS, StartFlags::NONE, move |_, _| {
                self.fire_due();
            });
        let previous = self.with_table(|table| {
            let previous = core::mem::replace(&mut table.timer, timer);
            self.rearm(table);
            previous
        });
        if previous.is_valid() {
            self.manager.try_delete(previous);
        }
        true
    }

    /// Schedule `cb` for the next time matching `spec`.
    ///
    /// Returns the job's ID and its execute time in UTC epoch seconds.
    pub fn schedule<F>(&self, spec: CronSpec, cb: F) -> Result<(CronJobId, i64), CronError>
    where
        F: FnMut(&Self, CronJobId) + Send + 'static,
    {
        spec.validate()?;
        let search = if spec.may_be_instant && self.with_table(|table| table.firing) {
            CronSpec {
                may_be_instant: false,
                ..spec
            }
        } else {
            spec
        };
        let execute_utc = next_execution_utc(&search, &self.clock).ok_or(CronError::NoMatch)?;
        let callback: CronCallback<C, W, R> = Box::new(cb);

        let (result, rejected) = self.with_table(|table| {
            if !table.timer.is_valid() {
                return (Err(CronError::Detached), Some(callback));
            }
            let id = CronJobId(table.next_id.wrapping_add(1).max(1));
            let job = CronJob {
                id,
                spec,
                execute_utc,
                callback,
            };
            if let Err(job) = table.jobs.push(job) {
                return (Err(CronError::TableFull), Some(job.callback));
            }
            table.next_id = id.0;
            #[cfg(feature = "defmt")]
            defmt::debug!("{} scheduled for {=i64}", id, execute_utc);
            #[cfg(feature = "tracing")]
            tracing::debug!(job = id.get(), execute_utc, "cron job scheduled");
            self.rearm(table);
            (Ok((id, execute_utc)), None)
        });
        drop(rejected);
        result
    }

    /// Remove a job before it fires. Returns `false` if it already fired
    /// or was never scheduled.
    pub fn unschedule(&self, id: CronJobId) -> bool {
        let removed = self.with_table(|table| {
            let index = table.position(id)?;
            let job = table.jobs.swap_remove(index);
            self.rearm(table);
            Some(job)
        });
        removed.is_some()
    }

    /// `true` while the job is waiting to fire.
    pub fn is_scheduled(&self, id: CronJobId) -> bool {
        self.with_table(|table| table.position(id).is_some())
    }

    /// UTC epoch seconds at which the job fires.
    pub fn execute_time(&self, id: CronJobId) -> Option<i64> {
        self.with_table(|table| table.find(id).map(|job| job.execute_utc))
    }

    /// Number of jobs waiting to fire.
    pub fn job_count(&self) -> usize {
        self.with_table(|table| table.jobs.len())
    }

    /// Task timer backing the service, [`TaskTimerId::INVALID`] until attached.
    pub fn timer(&self) -> TaskTimerId {
        self.with_table(|table| table.timer)
    }

    /// Wall clock the service schedules against.
    pub fn wall_clock(&self) -> &R {
        &self.clock
    }

    /// Recompute every job after the wall clock or the timezone changed.
    ///
    /// A job whose execute time was jumped over by no more than its
    /// `clock_change_tolerance_secs` keeps its time and fires on the next
    /// pass; every other job moves to its next match under the new clock.
    pub fn handle_clock_change(&self) {
        let now = self.clock.now_utc();
        let stale: Vec<(CronJobId, CronSpec), MAX_CRON_JOBS> = self.with_table(|table| {
            table
                .jobs
                .iter()
                .filter(|job| {
                    let passed_by = now.saturating_sub(job.execute_utc);
                    let tolerance = i64::from(job.spec.clock_change_tolerance_secs);
                    !(0..=tolerance).contains(&passed_by)
                })
                .map(|job| (job.id, job.spec))
                .collect()
        });

        // The calendar search and the wall clock run outside the lock.
        let updates: Vec<(CronJobId, i64), MAX_CRON_JOBS> = stale
            .iter()
            .filter_map(|(id, spec)| Some((*id, next_execution_utc(spec, &self.clock)?)))
            .collect();

        let recomputed = self.with_table(|table| {
            let mut recomputed = 0_usize;
            for &(id, execute_utc) in &updates {
                // Jobs that fired or were unscheduled meanwhile are gone.
                if let Some(job) = table.jobs.iter_mut().find(|job| job.id == id) {
                    job.execute_utc = execute_utc;
                    recomputed = recomputed.saturating_add(1);
                }
            }
            self.rearm(table);
            recomputed
        });

        #[cfg(feature = "defmt")]
        defmt::info!("clock change: {=usize} cron jobs recomputed", recomputed);
        #[cfg(feature = "tracing")]
        tracing::info!(recomputed, "clock change handled");
        #[cfg(not(any(feature = "defmt", feature = "tracing")))]
        let _ = recomputed;
    }

    /// Timer callback: run the jobs due at entry, soonest first, then re-arm.
    fn fire_due(&self) {
        let now = self.clock.now_utc();
        let due = self.with_table(|table| {
            table.firing = true;
            table.due_at(now)
        });
        for &id in &due {
            // A callback earlier in this pass may have unscheduled it.
            let Some(job) = self.with_table(|table| table.take(id)) else {
                continue;
            };
            let CronJob {
                id, mut callback, ..
            } = job;
            #[cfg(feature = "defmt")]
            defmt::debug!("{} fired", id);
            #[cfg(feature = "tracing")]
            tracing::debug!(job = id.get(), "cron job fired");
            callback(self, id);
        }
        self.with_table(|table| {
            table.firing = false;
            self.rearm(table);
        });
    }

    /// Point the task timer at the soonest job, or park it.
    fn rearm(&self, table: &CronTable<CronCallback<C, W, R>>) {
        let timer = table.timer;
        if !timer.is_valid() {
            return;
        }
        let Some(at) = table.soonest() else {
            self.manager.stop(timer);
            return;
        };
        let delay_secs = at.saturating_sub(self.clock.now_utc()).max(0);
        let delay_ms = u32::try_from(delay_secs.saturating_mul(1000))
            .unwrap_or(u32::MAX)
            .min(CRON_MAX_ARM_MS);
        self.manager.restart(timer, delay_ms);
        #[cfg(feature = "defmt")]
        defmt::debug!("cron timer armed for {=u32} ms", delay_ms);
        #[cfg(feature = "tracing")]
        tracing::debug!(delay_ms, "cron timer armed");
    }

    fn with_table<T>(
        &self,
        f: impl FnOnce(&mut CronTable<CronCallback<C, W, R>>) -> T,
    ) -> T {
        self.table.lock(|cell| f(&mut cell.borrow_mut()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    fn job(id: u32, execute_utc: i64) -> CronJob<()> {
        CronJob {
            id: CronJobId(id),
            spec: CronSpec::default(),
            execute_utc,
            callback: (),
        }
    }

    #[test]
    fn test_due_at_soonest_first_ties_by_id() {
        let mut table = CronTable::<()>::new();
        for (id, at) in [(3, 100), (1, 100), (2, 50), (4, 500)] {
            assert!(table.jobs.push(job(id, at)).is_ok());
        }
        let due: std::vec::Vec<u32> = table.due_at(100).iter().map(|id| id.get()).collect();
        assert_eq!(due, [2, 1, 3]);
        // Listing does not remove anything.
        assert_eq!(table.jobs.len(), 4);
    }

    #[test]
    fn test_due_at_nothing_due() {
        let mut table = CronTable::<()>::new();
        assert!(table.jobs.push(job(1, 200)).is_ok());
        assert!(table.due_at(199).is_empty());
    }

    #[test]
    fn test_take_removes_only_named_job() {
        let mut table = CronTable::<()>::new();
        for (id, at) in [(1, 10), (2, 20)] {
            assert!(table.jobs.push(job(id, at)).is_ok());
        }
        assert_eq!(table.take(CronJobId(2)).map(|j| j.execute_utc), Some(20));
        assert!(table.take(CronJobId(2)).is_none());
        assert_eq!(table.soonest(), Some(10));
    }

    #[test]
    fn test_cron_job_id_display() {
        assert_eq!(std::format!("{}", CronJobId(7)), "cron#7");
    }
}
