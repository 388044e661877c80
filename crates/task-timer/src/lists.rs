//! Timer records and the running/idle lists.
//!
//! Every live record sits in the arena keyed by ID. A record is on the
//! *running* list exactly when `expire` is `Some`, in which case the running
//! index holds it under `(expire, seq)`; otherwise it is on the *idle* list.
//! `seq` is a per-insertion counter, so equal expiries fire first-in,
//! first-out.

use alloc::collections::BTreeMap;

use platform::Ticks;

use crate::id::TaskTimerId;

/// Callback execution state.
///
/// "Scheduled" is tracked separately by `expire`: a callback may re-arm its
/// own timer while it is still executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum ExecState {
    /// Callback not on the stack.
    Dormant,
    /// Callback is running on the owning task.
    Executing,
    /// Callback is running and the record must be freed when it returns.
    ExecutingPendingDelete,
}

impl ExecState {
    pub(crate) fn is_executing(self) -> bool {
        !matches!(self, Self::Dormant)
    }
}

/// One schedulable unit.
pub(crate) struct TimerRecord<Cb> {
    /// Absolute fire tick while on the running list.
    pub(crate) expire: Option<Ticks>,
    /// Running-index tie breaker for the current insertion.
    seq: u64,
    /// Reschedule interval for repeating timers.
    pub(crate) period_ticks: Ticks,
    /// Base the next repeating expiry is computed from (previous expiry,
    /// or "now" after falling behind).
    pub(crate) reload_base: Ticks,
    pub(crate) repeating: bool,
    pub(crate) exec: ExecState,
    /// Taken out while the callback runs, restored afterwards.
    pub(crate) callback: Option<Cb>,
}

impl<Cb> TimerRecord<Cb> {
    fn new() -> Self {
        Self {
            expire: None,
            seq: 0,
            period_ticks: 0,
            reload_base: 0,
            repeating: false,
            exec: ExecState::Dormant,
            callback: None,
        }
    }
}

pub(crate) struct TimerLists<Cb> {
    records: BTreeMap<TaskTimerId, TimerRecord<Cb>>,
    running: BTreeMap<(Ticks, u64), TaskTimerId>,
    next_id: u32,
    next_seq: u64,
}

impl<Cb> TimerLists<Cb> {
    pub(crate) const fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            running: BTreeMap::new(),
            next_id: 1,
            next_seq: 0,
        }
    }

    /// Allocate an idle record. `None` once `max_records` are live.
    #[allow(clippy::panic)] // 2^32 creations on one manager is a contract violation
    pub(crate) fn create(&mut self, max_records: usize) -> Option<TaskTimerId> {
        if self.records.len() >= max_records {
            return None;
        }
        let raw = self.next_id;
        if raw == 0 {
            panic!("task timer id space exhausted");
        }
        self.next_id = raw.wrapping_add(1);
        let id = TaskTimerId::from_raw(raw);
        self.records.insert(id, TimerRecord::new());
        Some(id)
    }

    pub(crate) fn get(&self, id: TaskTimerId) -> Option<&TimerRecord<Cb>> {
        self.records.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: TaskTimerId) -> Option<&mut TimerRecord<Cb>> {
        self.records.get_mut(&id)
    }

    /// Look up a record that the caller's contract says must exist.
    #[allow(clippy::panic)] // unknown IDs are programming errors, not recoverable states
    pub(crate) fn expect_mut(&mut self, id: TaskTimerId, op: &str) -> &mut TimerRecord<Cb> {
        match self.records.get_mut(&id) {
            Some(record) => record,
            None => panic!("{op}: unknown {id}"),
        }
    }

    /// Put an idle record on the running list at `expire`.
    ///
    /// Returns `true` when the record is now the soonest-expiring timer.
    pub(crate) fn schedule(&mut self, id: TaskTimerId, expire: Ticks) -> bool {
        let seq = self.next_seq;
        self.next_seq = seq.wrapping_add(1);
        let Some(record) = self.records.get_mut(&id) else {
            return false;
        };
        debug_assert!(record.expire.is_none(), "{id} scheduled twice");
        record.expire = Some(expire);
        record.seq = seq;
        self.running.insert((expire, seq), id);
        self.head().map(|(_, head)| head) == Some(id)
    }

    /// Move a record to the idle list. No-op when already idle.
    pub(crate) fn unschedule(&mut self, id: TaskTimerId) {
        let Some(record) = self.records.get_mut(&id) else {
            return;
        };
        if let Some(expire) = record.expire.take() {
            self.running.remove(&(expire, record.seq));
        }
    }

    /// Soonest-expiring running timer.
    pub(crate) fn head(&self) -> Option<(Ticks, TaskTimerId)> {
        self.running
            .first_key_value()
            .map(|(&(expire, _), &id)| (expire, id))
    }

    /// Free a record, unscheduling it first.
    pub(crate) fn remove(&mut self, id: TaskTimerId) -> Option<TimerRecord<Cb>> {
        self.unschedule(id);
        self.records.remove(&id)
    }

    pub(crate) fn running_len(&self) -> usize {
        self.running.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Running-list IDs in firing order.
    #[cfg(test)]
    fn running_ids(&self) -> alloc::vec::Vec<TaskTimerId> {
        self.running.values().copied().collect()
    }
}
