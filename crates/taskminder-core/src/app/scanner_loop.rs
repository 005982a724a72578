//! OverdueScanner - 期限切れタスクを定期的に探して reminder を publish する
//!
//! # フロー（1 tick）
//! 1. TaskStore::query_overdue(now)
//! 2. 1 件ごとに ReminderMessage を作って JSON にする
//! 3. MessageBroker::publish("task-reminders")
//!
//! # 失敗時
//! - Store エラー: その tick を諦めて通常の間隔で次へ
//! - それ以外（encode / publish / panic）: `error_backoff` 待ってから次へ
//!
//! tick の途中で publish が失敗した場合、それまでに publish した分は取り消しません。
//! 次の tick で同じタスクがもう一度見つかれば、新しい reminder として publish されます。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::watch;

use crate::app::shutdown;
use crate::domain::{ReminderMessage, ScanError, ScanId, REMINDER_QUEUE};
use crate::observability::PipelineCounters;
use crate::ports::{Clock, IdGenerator, MessageBroker, TaskStore};

/// Result of one successful tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub scan_id: ScanId,
    pub found: usize,
    pub published: usize,
}

pub struct OverdueScanner {
    store: Arc<dyn TaskStore>,
    broker: Arc<dyn MessageBroker>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    counters: Arc<PipelineCounters>,
    interval: Duration,
    error_backoff: Duration,
}

impl OverdueScanner {
    pub fn new(
        store: Arc<dyn TaskStore>,
        broker: Arc<dyn MessageBroker>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        Self {
            store,
            broker,
            clock,
            ids,
            counters,
            interval: Duration::from_secs(5 * 60),
            error_backoff: Duration::from_secs(60),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_error_backoff(mut self, error_backoff: Duration) -> Self {
        self.error_backoff = error_backoff;
        self
    }

    /// Run a single tick.
    pub async fn scan_once(&self) -> Result<ScanReport, ScanError> {
        let scan_id = self.ids.scan_id();
        let overdue = self.store.query_overdue(self.clock.now()).await?;
        tracing::info!(%scan_id, count = overdue.len(), "found overdue tasks");

        let mut published = 0;
        for task in &overdue {
            let message = ReminderMessage::for_task(task, self.clock.now());
            let payload = message.to_wire()?;
            self.broker.publish(REMINDER_QUEUE, payload).await?;
            self.counters.record_published();
            published += 1;
            tracing::info!(
                %scan_id,
                task_id = %task.id,
                title = %task.title,
                "queued reminder for overdue task"
            );
        }

        Ok(ScanReport {
            scan_id,
            found: overdue.len(),
            published,
        })
    }

    /// Tick immediately, then every `interval` until shutdown is requested.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::info!(
            interval = ?self.interval,
            broker = self.broker.name(),
            "overdue scanner started"
        );

        loop {
            if shutdown::is_requested(&shutdown_rx) {
                break;
            }

            // tick の途中でも停止要求が来たら抜ける（publish 済みの分はそのまま）
            let outcome = tokio::select! {
                outcome = AssertUnwindSafe(self.scan_once()).catch_unwind() => outcome,
                _ = shutdown_rx.changed() => break,
            };
            self.counters.record_scan_tick();

            let wait = match outcome {
                Ok(Ok(report)) => {
                    tracing::debug!(
                        scan_id = %report.scan_id,
                        published = report.published,
                        "scan tick finished"
                    );
                    self.interval
                }
                Ok(Err(err)) if err.needs_backoff() => {
                    self.counters.record_skipped_tick();
                    tracing::error!(error = %err, backoff = ?self.error_backoff, "overdue scan failed");
                    self.error_backoff
                }
                Ok(Err(err)) => {
                    self.counters.record_skipped_tick();
                    tracing::error!(error = %err, "overdue query failed, skipping this tick");
                    self.interval
                }
                Err(_panic) => {
                    self.counters.record_skipped_tick();
                    tracing::error!(backoff = ?self.error_backoff, "overdue scan panicked");
                    self.error_backoff
                }
            };

            if shutdown::sleep_or_shutdown(&mut shutdown_rx, wait).await {
                break;
            }
        }

        tracing::info!("overdue scanner stopped");
    }
}
