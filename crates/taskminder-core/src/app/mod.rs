//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせて reminder パイプラインを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **select_broker**: 起動時の broker 選択（Active / Inert）
//! - **OverdueScanner**: 期限切れタスクの定期スキャンと publish
//! - **ReminderConsumer**: キューからの逐次受信と ack / nack
//! - **ReminderProcessor**: 1 件ごとの通知（重複抑止つき）
//! - **ReminderPipeline**: scanner と consumer 群の起動と停止

pub mod broker_select;
pub mod builder;
pub mod consumer_loop;
pub mod pipeline;
pub mod processor;
pub mod scanner_loop;
mod shutdown;

// 主要な型を再エクスポート
pub use self::broker_select::select_broker;
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::consumer_loop::ReminderConsumer;
pub use self::pipeline::ReminderPipeline;
pub use self::processor::{ProcessOutcome, ReminderProcessor};
pub use self::scanner_loop::{OverdueScanner, ScanReport};
