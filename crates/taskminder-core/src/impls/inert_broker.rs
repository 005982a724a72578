//! InertBroker - broker に繋がらないときの no-op 実装
//!
//! publish は即座に成功し、subscribe は何も配送しない subscription を返します。

use async_trait::async_trait;

use crate::domain::BrokerError;
use crate::ports::{MessageBroker, Subscription};

#[derive(Debug, Clone, Copy, Default)]
pub struct InertBroker;

impl InertBroker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MessageBroker for InertBroker {
    fn name(&self) -> &'static str {
        "inert"
    }

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        tracing::debug!(queue, bytes = payload.len(), "inert broker discarded message");
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> Result<Subscription, BrokerError> {
        Ok(Subscription::closed(queue))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inert_broker_accepts_everything_and_delivers_nothing() {
        let broker = InertBroker::new();

        broker.publish("task-reminders", b"{}".to_vec()).await.unwrap();
        broker.publish("task-reminders", b"garbage".to_vec()).await.unwrap();

        let mut subscription = broker.subscribe("task-reminders").await.unwrap();
        assert!(subscription.next().await.is_none());

        broker.close().await.unwrap();
        broker.publish("task-reminders", Vec::new()).await.unwrap();
    }
}
