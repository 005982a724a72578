//! Broker の選択（起動時に 1 回だけ）
//!
//! 接続設定がない、接続に失敗した、`probe_timeout` 内に繋がらない、のいずれでも
//! プロセスは止めずに InertBroker で起動します。選ばれた実装は以後変わりません。

use std::sync::Arc;
use std::time::Duration;

use crate::domain::BrokerError;
use crate::impls::InertBroker;
use crate::ports::{BrokerConnector, MessageBroker};

pub async fn select_broker(
    connector: Option<&dyn BrokerConnector>,
    probe_timeout: Duration,
) -> Arc<dyn MessageBroker> {
    let Some(connector) = connector else {
        tracing::warn!("no broker connection settings, reminders will not be queued");
        return inert();
    };

    let target = connector.target();
    let connected = match tokio::time::timeout(probe_timeout, connector.connect()).await {
        Ok(result) => result,
        Err(_elapsed) => Err(BrokerError::Timeout(probe_timeout)),
    };

    match connected {
        Ok(broker) => {
            tracing::info!(%target, broker = broker.name(), "using active message broker");
            broker
        }
        Err(err) => {
            tracing::warn!(%target, error = %err, "broker unreachable, falling back to inert broker");
            inert()
        }
    }
}

fn inert() -> Arc<dyn MessageBroker> {
    let broker: Arc<dyn MessageBroker> = Arc::new(InertBroker::new());
    tracing::info!(broker = broker.name(), "using inert message broker");
    broker
}
