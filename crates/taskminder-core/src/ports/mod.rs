//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」です。外部システム（RabbitMQ, タスクの
//! 永続化, 通知チャネル, 時刻）へのインターフェースを提供し、実装の詳細を隠蔽します。

pub mod broker;
pub mod clock;
pub mod id_generator;
pub mod notifier;
pub mod task_store;

pub use self::broker::{BrokerConnector, Delivery, DeliveryHandle, MessageBroker, Subscription};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::notifier::Notifier;
pub use self::task_store::TaskStore;
