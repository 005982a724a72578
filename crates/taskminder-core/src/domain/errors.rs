//! Errors - 関心ごとのエラー型
//!
//! 各 port / loop は自分のエラー型を返し、`?` で伝播させます。

use std::time::Duration;

use thiserror::Error;

/// Broker の操作エラー（接続・publish・subscribe・ack）
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("broker connection probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("publish to queue={queue} failed: {reason}")]
    Publish { queue: String, reason: String },

    #[error("subscribe to queue={queue} failed: {reason}")]
    Subscribe { queue: String, reason: String },

    #[error("settling delivery failed: {0}")]
    Settle(String),

    #[error("broker is closed")]
    Closed,
}

/// TaskStore のクエリエラー
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task store unavailable: {0}")]
    Unavailable(String),

    #[error("task store query failed: {0}")]
    Query(String),
}

/// Wire format の変換エラー
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[source] std::str::Utf8Error),

    #[error("payload is not a reminder message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode reminder message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Notifier（通知チャネル）のエラー
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),

    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// ReminderProcessor のエラー
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("dispatch failed for task_id={task_id}: {source}")]
    Dispatch {
        task_id: crate::domain::TaskId,
        #[source]
        source: NotifyError,
    },
}

/// Scanner の 1 tick のエラー
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Encode(#[from] CodecError),

    #[error(transparent)]
    Publish(#[from] BrokerError),
}

impl ScanError {
    /// Store failures just skip the tick; anything else triggers the error backoff.
    pub fn needs_backoff(&self) -> bool {
        !matches!(self, ScanError::Store(_))
    }
}
