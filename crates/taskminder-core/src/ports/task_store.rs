//! TaskStore port - タスクの正本（source of truth）
//!
//! 永続化レイヤーは外部コラボレーターで、reminder pipeline から見えるのは
//! overdue クエリ 1 本だけです。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{OverdueTask, StoreError};

/// Read-only view of the task store used by the overdue scanner.
///
/// # Contract
/// - Returns every task with `due_date < now` that is not completed.
/// - Never mutates tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn query_overdue(&self, now: DateTime<Utc>) -> Result<Vec<OverdueTask>, StoreError>;
}
