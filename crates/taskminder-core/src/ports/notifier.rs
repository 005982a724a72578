//! Notifier port - 通知チャネル（email/SMS など）の抽象化
//!
//! 通知の実体はこのクレートの範囲外です。デフォルトは `LogNotifier`。

use async_trait::async_trait;

use crate::domain::{NotifyError, ReminderMessage};

/// Black-box notification capability invoked by the reminder processor.
///
/// Implementations need not be idempotent; the processor guards against
/// duplicate dispatch.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &ReminderMessage) -> Result<(), NotifyError>;
}
