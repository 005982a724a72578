//! ReminderConsumer - `task-reminders` キューから 1 件ずつ取り出して処理する
//!
//! # フロー（1 delivery）
//! 1. payload を ReminderMessage に decode（失敗したら reject、再配送しない）
//! 2. ReminderProcessor::process
//! 3. 成功なら ack、失敗なら RedeliveryPolicy に従って nack(requeue) か reject
//!
//! 1 インスタンスにつき未 ack のメッセージは常に 1 件まで（broker 側の prefetch=1 と
//! このループの逐次処理の両方で保証）。

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::watch;

use crate::app::processor::{ProcessOutcome, ReminderProcessor};
use crate::app::shutdown;
use crate::domain::{
    BrokerError, ConsumerId, Decision, DeliveryState, RedeliveryPolicy, ReminderKey,
    ReminderMessage, REMINDER_QUEUE,
};
use crate::observability::PipelineCounters;
use crate::ports::{Delivery, MessageBroker};

/// Attempts remembered per instance unless overridden.
pub const DEFAULT_ATTEMPT_CAPACITY: usize = 1024;

/// Failed attempts per reminder seen by one consumer instance.
///
/// Another instance may ack a reminder this one requeued, so entries are not
/// always released here. The oldest entry is evicted past `capacity`.
struct AttemptTracker {
    capacity: usize,
    counts: HashMap<ReminderKey, u32>,
    order: VecDeque<ReminderKey>,
}

impl AttemptTracker {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            counts: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Record one more failure for `key` and return the total.
    fn record_failure(&mut self, key: ReminderKey) -> u32 {
        let count = match self.counts.get_mut(&key) {
            Some(count) => {
                *count += 1;
                *count
            }
            None => {
                self.counts.insert(key, 1);
                self.order.push_back(key);
                1
            }
        };
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.counts.remove(&oldest);
            }
        }
        count
    }

    fn forget(&mut self, key: &ReminderKey) {
        if self.counts.remove(key).is_some() {
            self.order.retain(|tracked| tracked != key);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.counts.len()
    }
}

pub struct ReminderConsumer {
    id: ConsumerId,
    broker: Arc<dyn MessageBroker>,
    processor: Arc<ReminderProcessor>,
    policy: RedeliveryPolicy,
    counters: Arc<PipelineCounters>,
    shutdown_rx: watch::Receiver<bool>,
    attempts: AttemptTracker,
}

impl ReminderConsumer {
    pub fn new(
        id: ConsumerId,
        broker: Arc<dyn MessageBroker>,
        processor: Arc<ReminderProcessor>,
        policy: RedeliveryPolicy,
        counters: Arc<PipelineCounters>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            broker,
            processor,
            policy,
            counters,
            shutdown_rx,
            attempts: AttemptTracker::new(DEFAULT_ATTEMPT_CAPACITY),
        }
    }

    /// How many reminders this instance remembers failure counts for.
    pub fn with_attempt_capacity(mut self, capacity: usize) -> Self {
        self.attempts = AttemptTracker::new(capacity);
        self
    }

    pub fn id(&self) -> ConsumerId {
        self.id
    }

    /// Subscribe and handle deliveries one at a time until the subscription
    /// ends or shutdown is requested.
    pub async fn run(mut self) -> Result<(), BrokerError> {
        let mut subscription = self.broker.subscribe(REMINDER_QUEUE).await?;
        tracing::info!(
            consumer = %self.id,
            queue = subscription.queue(),
            broker = self.broker.name(),
            "reminder consumer subscribed"
        );

        loop {
            if shutdown::is_requested(&self.shutdown_rx) {
                break;
            }

            let delivery = tokio::select! {
                biased;
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                delivery = subscription.next() => delivery,
            };

            let Some(delivery) = delivery else {
                tracing::info!(consumer = %self.id, "subscription ended");
                break;
            };
            self.handle(delivery).await;
        }

        tracing::info!(consumer = %self.id, "reminder consumer stopped");
        Ok(())
    }

    /// Handle one delivery and settle it. Returns the terminal state.
    pub async fn handle(&mut self, delivery: Delivery) -> DeliveryState {
        let state = DeliveryState::Delivered;
        let redelivered = delivery.redelivered();

        let message = match ReminderMessage::from_wire(delivery.payload()) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(consumer = %self.id, redelivered, error = %err, "dropping malformed reminder");
                self.settle(delivery.reject().await, "reject");
                self.counters.record_dropped();
                return advance(state, DeliveryState::Dropped);
            }
        };

        let state = advance(state, DeliveryState::Handling);
        let key = message.key();
        let result = AssertUnwindSafe(self.processor.process(&message))
            .catch_unwind()
            .await;

        let reason = match result {
            Ok(Ok(outcome)) => {
                self.attempts.forget(&key);
                self.settle(delivery.ack().await, "ack");
                self.counters.record_acked();
                if outcome == ProcessOutcome::AlreadyDispatched {
                    tracing::debug!(consumer = %self.id, task_id = %key.task_id, redelivered, "acked duplicate reminder");
                }
                return advance(state, DeliveryState::Acked);
            }
            Ok(Err(err)) => err.to_string(),
            Err(panic) => format!("processor panicked: {}", panic_message(panic.as_ref())),
        };

        self.retry_or_drop(state, delivery, key, reason).await
    }

    async fn retry_or_drop(
        &mut self,
        state: DeliveryState,
        delivery: Delivery,
        key: ReminderKey,
        failure: String,
    ) -> DeliveryState {
        let redelivered = delivery.redelivered();
        let attempts = self.attempts.record_failure(key);

        match self.policy.decide(attempts) {
            Decision::Requeue { delay, reason } => {
                tracing::warn!(
                    consumer = %self.id,
                    task_id = %key.task_id,
                    attempts,
                    redelivered,
                    error = %failure,
                    "processing failed, requeueing ({reason})"
                );
                if !delay.is_zero() {
                    // 停止要求が来たら待たずに返却する
                    shutdown::sleep_or_shutdown(&mut self.shutdown_rx, delay).await;
                }
                self.settle(delivery.nack_requeue().await, "nack");
                self.counters.record_requeued();
                advance(state, DeliveryState::NackedRequeue)
            }
            Decision::DeadLetter { reason } => {
                self.attempts.forget(&key);
                tracing::error!(
                    consumer = %self.id,
                    task_id = %key.task_id,
                    attempts,
                    redelivered,
                    error = %failure,
                    "giving up on reminder ({reason})"
                );
                self.settle(delivery.reject().await, "reject");
                self.counters.record_dropped();
                advance(state, DeliveryState::Dropped)
            }
        }
    }

    fn settle(&self, result: Result<(), BrokerError>, action: &'static str) {
        if let Err(err) = result {
            // 接続が切れていれば broker 側が未 ack として再配送する
            tracing::warn!(consumer = %self.id, action, error = %err, "failed to settle delivery");
        }
    }
}

fn advance(from: DeliveryState, to: DeliveryState) -> DeliveryState {
    match from.transition(to) {
        Ok(next) => next,
        Err(err) => {
            tracing::error!(error = %err, "delivery state machine violated");
            to
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
