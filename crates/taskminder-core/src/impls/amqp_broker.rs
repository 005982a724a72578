//! AmqpBroker - RabbitMQ (AMQP 0-9-1) による Active broker
//!
//! # 実装詳細
//! - 接続時に publisher 用 channel を 1 本開き、confirm mode にする
//! - publish: queue_declare(durable) → basic_publish(persistent) → confirm 待ち
//! - subscribe: 専用 channel + basic_qos(1) + basic_consume、delivery を mpsc に転送

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    BasicRejectOptions, ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio::sync::{Mutex, mpsc};

use crate::config::BrokerSettings;
use crate::domain::{BrokerError, ConsumerId};
use crate::ports::{BrokerConnector, DeliveryHandle, IdGenerator, MessageBroker, Subscription};

/// AMQP delivery mode for messages that survive a broker restart.
const PERSISTENT: u8 = 2;

const REPLY_SUCCESS: u16 = 200;

/// Connects to RabbitMQ with the configured settings.
pub struct AmqpConnector {
    settings: BrokerSettings,
    ids: Arc<dyn IdGenerator>,
}

impl AmqpConnector {
    pub fn new(settings: BrokerSettings, ids: Arc<dyn IdGenerator>) -> Self {
        Self { settings, ids }
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    fn target(&self) -> String {
        format!("amqp://{}:{}", self.settings.host, self.settings.port)
    }

    async fn connect(&self) -> Result<Arc<dyn MessageBroker>, BrokerError> {
        let broker = AmqpBroker::connect(&self.settings.amqp_uri(), Arc::clone(&self.ids)).await?;
        Ok(Arc::new(broker))
    }
}

pub struct AmqpBroker {
    connection: Connection,
    publisher: Mutex<Channel>,
    ids: Arc<dyn IdGenerator>,
}

impl AmqpBroker {
    pub async fn connect(uri: &str, ids: Arc<dyn IdGenerator>) -> Result<Self, BrokerError> {
        let connection = Connection::connect(uri, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let publisher = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Connection(format!("failed to create channel: {e}")))?;
        publisher
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| BrokerError::Connection(format!("failed to enable confirms: {e}")))?;

        tracing::info!("rabbitmq connection established");

        Ok(Self {
            connection,
            publisher: Mutex::new(publisher),
            ids,
        })
    }
}

async fn declare_durable(channel: &Channel, queue: &str) -> Result<(), lapin::Error> {
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map(|_| ())
}

#[async_trait]
impl MessageBroker for AmqpBroker {
    fn name(&self) -> &'static str {
        "amqp"
    }

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let publish_error = |reason: String| BrokerError::Publish {
            queue: queue.to_string(),
            reason,
        };

        let channel = self.publisher.lock().await;
        declare_durable(&channel, queue)
            .await
            .map_err(|e| publish_error(format!("queue declare: {e}")))?;

        let properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT)
            .with_content_type("application/json".into());

        let confirmation = channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(|e| publish_error(e.to_string()))?
            .await
            .map_err(|e| publish_error(format!("confirm: {e}")))?;

        if confirmation.is_nack() {
            return Err(publish_error("broker nacked the message".to_string()));
        }

        tracing::debug!(queue, bytes = payload.len(), "message published");
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> Result<Subscription, BrokerError> {
        let subscribe_error = |reason: String| BrokerError::Subscribe {
            queue: queue.to_string(),
            reason,
        };

        // subscription ごとに channel を分けて prefetch を独立させる
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| subscribe_error(format!("create channel: {e}")))?;
        declare_durable(&channel, queue)
            .await
            .map_err(|e| subscribe_error(format!("queue declare: {e}")))?;
        channel
            .basic_qos(1, BasicQosOptions::default())
            .await
            .map_err(|e| subscribe_error(format!("qos: {e}")))?;

        let consumer_tag: ConsumerId = self.ids.consumer_id();
        let consumer = channel
            .basic_consume(
                queue,
                &consumer_tag.to_string(),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| subscribe_error(e.to_string()))?;

        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(forward_deliveries(channel, consumer, tx, consumer_tag));

        tracing::info!(queue, %consumer_tag, "amqp subscription started");
        Ok(Subscription::new(queue, rx))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.connection
            .close(REPLY_SUCCESS, "OK")
            .await
            .map_err(|e| BrokerError::Connection(format!("close: {e}")))
    }
}

/// Broker コールバック（consumer stream）を mpsc に流し込む
async fn forward_deliveries(
    // consumer が生きている間は channel も保持しておく
    _channel: Channel,
    mut consumer: lapin::Consumer,
    tx: mpsc::Sender<Box<dyn DeliveryHandle>>,
    consumer_tag: ConsumerId,
) {
    while let Some(item) = consumer.next().await {
        match item {
            Ok(delivery) => {
                if tx.send(Box::new(AmqpDelivery { delivery })).await.is_err() {
                    // consumer loop が終了した。未 ack の delivery は切断時に再配送される
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(%consumer_tag, error = %e, "amqp consumer stream failed");
                break;
            }
        }
    }
    tracing::debug!(%consumer_tag, "amqp subscription ended");
}

struct AmqpDelivery {
    delivery: lapin::message::Delivery,
}

#[async_trait]
impl DeliveryHandle for AmqpDelivery {
    fn payload(&self) -> &[u8] {
        &self.delivery.data
    }

    fn redelivered(&self) -> bool {
        self.delivery.redelivered
    }

    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        self.delivery
            .acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| BrokerError::Settle(format!("ack: {e}")))
    }

    async fn nack_requeue(self: Box<Self>) -> Result<(), BrokerError> {
        self.delivery
            .acker
            .nack(BasicNackOptions {
                multiple: false,
                requeue: true,
            })
            .await
            .map_err(|e| BrokerError::Settle(format!("nack: {e}")))
    }

    async fn reject(self: Box<Self>) -> Result<(), BrokerError> {
        self.delivery
            .acker
            .reject(BasicRejectOptions { requeue: false })
            .await
            .map_err(|e| BrokerError::Settle(format!("reject: {e}")))
    }
}
