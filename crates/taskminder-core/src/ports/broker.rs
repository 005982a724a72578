//! MessageBroker port - 永続キューへの publish / subscribe
//!
//! Broker は起動時に 1 回だけ選ばれ、`Arc<dyn MessageBroker>` として scanner と
//! consumer に渡されます。どの実装が選ばれたかは呼び出し側からは見えません。
//!
//! # 実装
//! - `AmqpBroker`: RabbitMQ（本番用、Active）
//! - `InertBroker`: 何もしない（broker に繋がらないときの fallback）
//! - `InMemoryBroker`: 開発・テスト用
//!
//! Broker のコールバックは bounded channel に流し込まれ、consumer のループが
//! `Subscription::next` で 1 件ずつ取り出します。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::BrokerError;

/// One message handed to a consumer.
///
/// The consumer owns the delivery and must settle it exactly once with
/// `ack`, `nack_requeue` or `reject`. A delivery that is dropped unsettled is
/// redelivered by the broker.
#[async_trait]
pub trait DeliveryHandle: Send {
    fn payload(&self) -> &[u8];

    /// Set by the broker when this message was delivered before.
    fn redelivered(&self) -> bool;

    /// Processed; remove from the queue.
    async fn ack(self: Box<Self>) -> Result<(), BrokerError>;

    /// Return to the queue for redelivery.
    async fn nack_requeue(self: Box<Self>) -> Result<(), BrokerError>;

    /// Remove from the queue without redelivery.
    async fn reject(self: Box<Self>) -> Result<(), BrokerError>;
}

pub type Delivery = Box<dyn DeliveryHandle>;

/// Stream of deliveries for one consumer.
pub struct Subscription {
    queue: String,
    deliveries: mpsc::Receiver<Delivery>,
}

impl Subscription {
    pub fn new(queue: impl Into<String>, deliveries: mpsc::Receiver<Delivery>) -> Self {
        Self {
            queue: queue.into(),
            deliveries,
        }
    }

    /// A subscription that never yields anything.
    pub fn closed(queue: impl Into<String>) -> Self {
        let (_tx, rx) = mpsc::channel(1);
        Self::new(queue, rx)
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Next delivery, or `None` once the broker side has gone away.
    pub async fn next(&mut self) -> Option<Delivery> {
        self.deliveries.recv().await
    }
}

#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Short variant name for log lines.
    fn name(&self) -> &'static str;

    /// Declare `queue` (durable, idempotent) and send `payload` as a
    /// persistent message. Returns once the broker accepted it.
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Declare `queue` and start delivering with at most one unacknowledged
    /// message in flight for this subscription.
    async fn subscribe(&self, queue: &str) -> Result<Subscription, BrokerError>;

    /// Close the connection. Open subscriptions end; unsettled messages are
    /// redelivered by the broker.
    async fn close(&self) -> Result<(), BrokerError>;
}

/// Builds an Active broker. Used once at startup by `select_broker`.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Where this connector points, for log lines (no credentials).
    fn target(&self) -> String;

    async fn connect(&self) -> Result<Arc<dyn MessageBroker>, BrokerError>;
}
