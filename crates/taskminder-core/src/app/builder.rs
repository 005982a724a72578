//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）: 設定値と必須コンポーネントを build() で確認
//! - scanner / consumer はここで作った共有部品（clock, ids, counters, processor）を使う

use std::sync::Arc;

use tokio::sync::watch;

use crate::app::consumer_loop::ReminderConsumer;
use crate::app::processor::ReminderProcessor;
use crate::app::scanner_loop::OverdueScanner;
use crate::config::{ConfigError, ReminderConfig};
use crate::impls::{AmqpConnector, LogNotifier};
use crate::observability::PipelineCounters;
use crate::ports::{Clock, IdGenerator, MessageBroker, Notifier, SystemClock, TaskStore, UlidGenerator};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(config)
///     .task_store(Arc::new(InMemoryTaskStore::seeded(Utc::now())))
///     .build()?;
/// let broker = select_broker(app.connector().as_ref().map(|c| c as _), app.config().connect_timeout()).await;
/// let pipeline = ReminderPipeline::spawn(&app, broker);
/// ```
///
/// # Fail-fast 設計
/// - TaskStore は必須（無ければ BuildError::MissingComponent）
/// - Notifier の既定は LogNotifier、Clock の既定は SystemClock
/// - 設定値は ReminderConfig::validate で検証
pub struct AppBuilder {
    config: ReminderConfig,
    store: Option<Arc<dyn TaskStore>>,
    notifier: Option<Arc<dyn Notifier>>,
    clock: Option<Arc<dyn Clock>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing component: {0}. It must be provided before build().")]
    MissingComponent(&'static str),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AppBuilder {
    pub fn new(config: ReminderConfig) -> Self {
        Self {
            config,
            store: None,
            notifier: None,
            clock: None,
        }
    }

    pub fn task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        self.config.validate()?;
        let store = self.store.ok_or(BuildError::MissingComponent("task store"))?;
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
        let counters = Arc::new(PipelineCounters::new());
        let processor = Arc::new(ReminderProcessor::new(
            notifier,
            Arc::clone(&clock),
            Arc::clone(&counters),
            self.config.ledger_capacity,
        ));

        Ok(App {
            config: self.config,
            store,
            clock,
            ids,
            counters,
            processor,
        })
    }
}

/// App は構築済みの共有部品を保持し、scanner / consumer を組み立てる
pub struct App {
    config: ReminderConfig,
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    counters: Arc<PipelineCounters>,
    processor: Arc<ReminderProcessor>,
}

impl App {
    pub fn config(&self) -> &ReminderConfig {
        &self.config
    }

    pub fn counters(&self) -> Arc<PipelineCounters> {
        Arc::clone(&self.counters)
    }

    /// RabbitMQ connector, or `None` when no broker is configured.
    pub fn connector(&self) -> Option<AmqpConnector> {
        self.config
            .broker
            .clone()
            .map(|settings| AmqpConnector::new(settings, Arc::clone(&self.ids)))
    }

    pub fn scanner(&self, broker: Arc<dyn MessageBroker>) -> OverdueScanner {
        OverdueScanner::new(
            Arc::clone(&self.store),
            broker,
            Arc::clone(&self.clock),
            Arc::clone(&self.ids),
            Arc::clone(&self.counters),
        )
        .with_interval(self.config.scan_interval())
        .with_error_backoff(self.config.error_backoff())
    }

    pub fn consumer(
        &self,
        broker: Arc<dyn MessageBroker>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> ReminderConsumer {
        ReminderConsumer::new(
            self.ids.consumer_id(),
            broker,
            Arc::clone(&self.processor),
            self.config.redelivery.clone(),
            Arc::clone(&self.counters),
            shutdown_rx,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerSettings;
    use crate::impls::{InMemoryTaskStore, InertBroker};

    fn store() -> Arc<dyn TaskStore> {
        Arc::new(InMemoryTaskStore::new())
    }

    #[test]
    fn build_success() {
        let app = AppBuilder::new(ReminderConfig::default())
            .task_store(store())
            .build();
        assert!(app.is_ok());
    }

    #[test]
    fn build_without_store_fails() {
        let app = AppBuilder::new(ReminderConfig::default()).build();
        assert!(matches!(app, Err(BuildError::MissingComponent("task store"))));
    }

    #[test]
    fn build_validates_config() {
        let config = ReminderConfig {
            consumer_instances: 0,
            ..ReminderConfig::default()
        };
        let app = AppBuilder::new(config).task_store(store()).build();
        assert!(matches!(app, Err(BuildError::Config(ConfigError::Invalid(_)))));
    }

    #[test]
    fn connector_only_when_broker_configured() {
        let app = AppBuilder::new(ReminderConfig::default())
            .task_store(store())
            .build()
            .unwrap();
        assert!(app.connector().is_none());

        let config = ReminderConfig {
            broker: Some(BrokerSettings::for_host("rabbit")),
            ..ReminderConfig::default()
        };
        let app = AppBuilder::new(config).task_store(store()).build().unwrap();
        let connector = app.connector().unwrap();
        assert_eq!(crate::ports::BrokerConnector::target(&connector), "amqp://rabbit:5672");
    }

    #[tokio::test]
    async fn consumers_get_distinct_ids() {
        let app = AppBuilder::new(ReminderConfig::default())
            .task_store(store())
            .build()
            .unwrap();
        let (_tx, rx) = watch::channel(false);

        let first = app.consumer(Arc::new(InertBroker::new()), rx.clone());
        let second = app.consumer(Arc::new(InertBroker::new()), rx);

        assert_ne!(first.id(), second.id());
    }
}
