//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **AmqpBroker** / **AmqpConnector**: RabbitMQ（Active broker）
//! - **InertBroker**: broker に繋がらないときの fallback
//! - **InMemoryBroker**: 開発・テスト用の broker（delivery 回数を記録）
//! - **InMemoryTaskStore**: 永続化レイヤーの代わり
//! - **LogNotifier**: ログに書くだけの通知チャネル

pub mod amqp_broker;
pub mod inert_broker;
pub mod inmem_broker;
pub mod inmem_task_store;
pub mod log_notifier;

// 主要な型を再エクスポート
pub use self::amqp_broker::{AmqpBroker, AmqpConnector};
pub use self::inert_broker::InertBroker;
pub use self::inmem_broker::{InMemoryBroker, MessageLedger};
pub use self::inmem_task_store::{InMemoryTaskStore, NewTask};
pub use self::log_notifier::LogNotifier;
