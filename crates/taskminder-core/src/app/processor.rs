//! ReminderProcessor - 1 件の reminder に対する副作用（通知）
//!
//! at-least-once 配送なので同じメッセージが何度も届きます。通知チャネル自体は
//! 冪等とは限らないため、dispatch 済みの reminder を ledger に覚えておき、
//! 2 回目以降は通知せずに成功を返します。

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::{ProcessError, ReminderKey, ReminderMessage};
use crate::observability::PipelineCounters;
use crate::ports::{Clock, Notifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The notifier was invoked and succeeded.
    Dispatched,

    /// This reminder was dispatched before (or is being dispatched right now).
    AlreadyDispatched,
}

/// Remembers dispatched reminders, oldest evicted first.
#[derive(Debug)]
struct DispatchLedger {
    capacity: usize,
    in_flight: HashSet<ReminderKey>,
    dispatched: HashSet<ReminderKey>,
    order: VecDeque<ReminderKey>,
}

impl DispatchLedger {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            in_flight: HashSet::new(),
            dispatched: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    fn try_begin(&mut self, key: ReminderKey) -> bool {
        if self.dispatched.contains(&key) || self.in_flight.contains(&key) {
            return false;
        }
        self.in_flight.insert(key);
        true
    }

    fn finish(&mut self, key: ReminderKey, dispatched: bool) {
        self.in_flight.remove(&key);
        if !dispatched || self.capacity == 0 {
            return;
        }
        if self.dispatched.insert(key) {
            self.order.push_back(key);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.dispatched.remove(&oldest);
            }
        }
    }
}

/// Releases the in-flight mark even if the notifier panics.
struct InFlight<'a> {
    ledger: &'a Mutex<DispatchLedger>,
    key: ReminderKey,
    dispatched: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finish(self.key, self.dispatched);
    }
}

pub struct ReminderProcessor {
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    counters: Arc<PipelineCounters>,
    ledger: Mutex<DispatchLedger>,
}

impl ReminderProcessor {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        counters: Arc<PipelineCounters>,
        ledger_capacity: usize,
    ) -> Self {
        Self {
            notifier,
            clock,
            counters,
            ledger: Mutex::new(DispatchLedger::new(ledger_capacity)),
        }
    }

    fn ledger(&self) -> MutexGuard<'_, DispatchLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn process(&self, message: &ReminderMessage) -> Result<ProcessOutcome, ProcessError> {
        let key = message.key();
        if !self.ledger().try_begin(key) {
            self.counters.record_duplicate();
            tracing::info!(
                task_id = %message.task_id(),
                created_at = %message.created_at(),
                "reminder already dispatched, skipping"
            );
            return Ok(ProcessOutcome::AlreadyDispatched);
        }
        let mut in_flight = InFlight {
            ledger: &self.ledger,
            key,
            dispatched: false,
        };

        let processed = message.processed(self.clock.now());
        tracing::info!("Hi your Task is due Task {}", processed.title());

        self.notifier
            .notify(&processed)
            .await
            .map_err(|source| ProcessError::Dispatch {
                task_id: processed.task_id(),
                source,
            })?;
        in_flight.dispatched = true;

        tracing::info!(
            task_id = %processed.task_id(),
            title = processed.title(),
            due_date = %processed.due_date(),
            "processed reminder"
        );
        Ok(ProcessOutcome::Dispatched)
    }
}
