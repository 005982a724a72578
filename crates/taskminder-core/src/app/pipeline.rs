//! ReminderPipeline - scanner 1 本と consumer N 本を動かすハンドル
//!
//! - `request_shutdown()` で全ループに停止を通知（処理中のメッセージは最後まで処理）
//! - `shutdown_and_join()` で全ループの終了を待ってから broker を閉じる

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::app::builder::App;
use crate::observability::{PipelineCounters, PipelineCounts};
use crate::ports::MessageBroker;

pub struct ReminderPipeline {
    shutdown_tx: watch::Sender<bool>,
    scanner: JoinHandle<()>,
    consumers: Vec<JoinHandle<()>>,
    broker: Arc<dyn MessageBroker>,
    counters: Arc<PipelineCounters>,
}

impl ReminderPipeline {
    /// Spawn the scanner and `consumer_instances` consumers on `broker`.
    pub fn spawn(app: &App, broker: Arc<dyn MessageBroker>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scanner = tokio::spawn(app.scanner(Arc::clone(&broker)).run(shutdown_rx.clone()));

        let instances = app.config().consumer_instances;
        let mut consumers = Vec::with_capacity(instances);
        for _ in 0..instances {
            let consumer = app.consumer(Arc::clone(&broker), shutdown_rx.clone());
            let consumer_id = consumer.id();
            consumers.push(tokio::spawn(async move {
                if let Err(err) = consumer.run().await {
                    tracing::error!(consumer = %consumer_id, error = %err, "reminder consumer could not subscribe");
                }
            }));
        }

        tracing::info!(broker = broker.name(), consumers = instances, "reminder pipeline started");

        Self {
            shutdown_tx,
            scanner,
            consumers,
            broker,
            counters: app.counters(),
        }
    }

    pub fn broker_name(&self) -> &'static str {
        self.broker.name()
    }

    pub fn counts(&self) -> PipelineCounts {
        self.counters.snapshot()
    }

    /// Request shutdown for the scanner and every consumer.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown, wait for all loops, then close the broker.
    pub async fn shutdown_and_join(self) -> PipelineCounts {
        self.request_shutdown();

        if let Err(err) = self.scanner.await {
            tracing::error!(error = %err, "overdue scanner task failed");
        }
        for consumer in self.consumers {
            if let Err(err) = consumer.await {
                tracing::error!(error = %err, "reminder consumer task failed");
            }
        }
        if let Err(err) = self.broker.close().await {
            tracing::warn!(error = %err, "failed to close broker connection");
        }

        let counts = self.counters.snapshot();
        tracing::info!(?counts, "reminder pipeline stopped");
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::builder::AppBuilder;
    use crate::config::ReminderConfig;
    use crate::domain::REMINDER_QUEUE;
    use crate::impls::{InMemoryBroker, InMemoryTaskStore, InertBroker};
    use crate::ports::{Clock, FixedClock};
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn app_with_clock(consumer_instances: usize) -> (App, Arc<FixedClock>) {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(now));
        let app = AppBuilder::new(ReminderConfig {
            consumer_instances,
            ..ReminderConfig::default()
        })
        .task_store(Arc::new(InMemoryTaskStore::seeded(now)))
        .clock(Arc::clone(&clock) as Arc<dyn Clock>)
        .build()
        .unwrap();
        (app, clock)
    }

    fn app(consumer_instances: usize) -> App {
        app_with_clock(consumer_instances).0
    }

    #[tokio::test(start_paused = true)]
    async fn overdue_task_is_published_and_acked() {
        let broker = InMemoryBroker::new();
        let pipeline = ReminderPipeline::spawn(&app(1), Arc::new(broker.clone()));

        while pipeline.counts().acked < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let counts = pipeline.shutdown_and_join().await;

        assert_eq!(counts.published, 1);
        assert_eq!(counts.acked, 1);
        assert_eq!(broker.ready_count(REMINDER_QUEUE), 0);
        assert_eq!(broker.ledgers()[0].acks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn each_tick_publishes_a_fresh_reminder() {
        let broker = InMemoryBroker::new();
        let (app, clock) = app_with_clock(2);
        let pipeline = ReminderPipeline::spawn(&app, Arc::new(broker.clone()));

        while pipeline.counts().acked < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        clock.advance(chrono::Duration::minutes(5));

        // 2 回目の tick は t=300s
        tokio::time::sleep(Duration::from_secs(300)).await;
        while pipeline.counts().acked < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let counts = pipeline.shutdown_and_join().await;

        assert_eq!(counts.scan_ticks, 2);
        assert_eq!(counts.published, 2);
        assert_eq!(counts.acked, 2);
        assert_eq!(counts.duplicates_suppressed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn inert_pipeline_keeps_scanning_and_shuts_down() {
        let pipeline = ReminderPipeline::spawn(&app(1), Arc::new(InertBroker::new()));
        assert_eq!(pipeline.broker_name(), "inert");

        tokio::time::sleep(Duration::from_secs(1)).await;
        let counts = pipeline.shutdown_and_join().await;

        assert_eq!(counts.scan_ticks, 1);
        assert_eq!(counts.published, 1);
        assert_eq!(counts.acked, 0);
    }
}
