//! taskminder-core
//!
//! Overdue task reminder pipeline: a periodic scanner publishes one reminder
//! per overdue task to a durable queue, and consumers process them with
//! at-least-once delivery.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（task, reminder, state, decision, errors, ids）
//! - **ports**: 抽象化レイヤー（MessageBroker, TaskStore, Notifier, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（builder, scanner, consumer, processor, pipeline）
//! - **impls**: 実装（AmqpBroker, InertBroker, InMemoryBroker, InMemoryTaskStore, LogNotifier）
//! - **config**: 起動時設定（TOML）
//! - **observability**: パイプラインのカウンタ

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;

pub use app::{App, AppBuilder, ReminderPipeline, select_broker};
pub use config::{BrokerSettings, ConfigError, ReminderConfig};
pub use observability::{PipelineCounters, PipelineCounts};
