use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use taskminder_core::app::{ReminderPipeline, select_broker};
use taskminder_core::domain::{
    BrokerError, NotifyError, REMINDER_QUEUE, ReminderMessage, TaskId, TaskPriority,
};
use taskminder_core::impls::{InMemoryBroker, InMemoryTaskStore, NewTask};
use taskminder_core::ports::{BrokerConnector, Clock, FixedClock, MessageBroker, Notifier};
use taskminder_core::{App, AppBuilder, ReminderConfig};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap()
}

/// Remembers every reminder it was asked to send.
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<ReminderMessage>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<ReminderMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &ReminderMessage) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

struct Harness {
    app: App,
    clock: Arc<FixedClock>,
    store: Arc<InMemoryTaskStore>,
    notifier: Arc<RecordingNotifier>,
}

fn harness(store: InMemoryTaskStore) -> Harness {
    let clock = Arc::new(FixedClock::new(now()));
    let store = Arc::new(store);
    let notifier = Arc::new(RecordingNotifier::default());
    let app = AppBuilder::new(ReminderConfig::default())
        .task_store(store.clone())
        .notifier(notifier.clone())
        .clock(clock.clone() as Arc<dyn Clock>)
        .build()
        .unwrap();
    Harness {
        app,
        clock,
        store,
        notifier,
    }
}

async fn wait_for_acks(pipeline: &ReminderPipeline, acked: u64) {
    while pipeline.counts().acked < acked {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn overdue_task_is_reminded_exactly_once() {
    let store = InMemoryTaskStore::new();
    store.insert(
        NewTask {
            title: "Fix Login Bug".to_string(),
            description: "Resolve the authentication issue in the login module".to_string(),
            priority: TaskPriority::Critical,
            full_name: "Jane Smith".to_string(),
            telephone: "+1-555-0124".to_string(),
            email: "jane.smith@example.com".to_string(),
            due_date: now() - chrono::Duration::days(2),
        },
        now(),
    );
    let h = harness(store);
    let broker = InMemoryBroker::new();
    let pipeline = ReminderPipeline::spawn(&h.app, Arc::new(broker.clone()));

    wait_for_acks(&pipeline, 1).await;
    let counts = pipeline.shutdown_and_join().await;

    assert_eq!(counts.published, 1);
    assert_eq!(counts.acked, 1);
    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].task_id(), TaskId::new(1));
    assert_eq!(sent[0].title(), "Fix Login Bug");
    assert_eq!(sent[0].full_name(), "Jane Smith");
    assert_eq!(sent[0].email(), "jane.smith@example.com");
    assert_eq!(sent[0].due_date(), now() - chrono::Duration::days(2));
    assert_eq!(sent[0].processed_at(), Some(now()));

    let ledgers = broker.ledgers();
    assert_eq!(ledgers.len(), 1);
    assert_eq!(ledgers[0].deliveries, 1);
    assert_eq!(ledgers[0].acks, 1);
}

#[tokio::test(start_paused = true)]
async fn still_overdue_task_is_reminded_on_every_tick() {
    let h = harness(InMemoryTaskStore::seeded(now()));
    let broker = InMemoryBroker::new();
    let pipeline = ReminderPipeline::spawn(&h.app, Arc::new(broker.clone()));

    wait_for_acks(&pipeline, 1).await;
    h.clock.advance(chrono::Duration::minutes(5));
    tokio::time::sleep(Duration::from_secs(300)).await;
    wait_for_acks(&pipeline, 2).await;
    pipeline.shutdown_and_join().await;

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].task_id(), sent[1].task_id());
    assert_ne!(sent[0].created_at(), sent[1].created_at());
    assert_eq!(broker.published_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn completed_task_stops_being_reminded() {
    let h = harness(InMemoryTaskStore::seeded(now()));
    let broker = InMemoryBroker::new();
    let pipeline = ReminderPipeline::spawn(&h.app, Arc::new(broker.clone()));

    wait_for_acks(&pipeline, 1).await;
    assert!(h.store.mark_completed(TaskId::new(2), now()));
    h.clock.advance(chrono::Duration::minutes(5));
    tokio::time::sleep(Duration::from_secs(301)).await;
    let counts = pipeline.shutdown_and_join().await;

    assert_eq!(counts.scan_ticks, 2);
    assert_eq!(counts.published, 1);
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn duplicate_delivery_is_acked_without_a_second_reminder() {
    let h = harness(InMemoryTaskStore::new());
    let broker = InMemoryBroker::new();
    let message = ReminderMessage::new(
        TaskId::new(7),
        "Renew certificate",
        "Ops",
        "ops@example.com",
        now() - chrono::Duration::hours(3),
        now(),
    );
    for _ in 0..2 {
        broker
            .publish(REMINDER_QUEUE, message.to_wire().unwrap())
            .await
            .unwrap();
    }
    let pipeline = ReminderPipeline::spawn(&h.app, Arc::new(broker.clone()));

    wait_for_acks(&pipeline, 2).await;
    let counts = pipeline.shutdown_and_join().await;

    assert_eq!(counts.duplicates_suppressed, 1);
    assert_eq!(h.notifier.sent().len(), 1);
    assert_eq!(broker.ready_count(REMINDER_QUEUE), 0);
}

#[tokio::test(start_paused = true)]
async fn poison_message_is_dropped_and_the_queue_keeps_flowing() {
    let h = harness(InMemoryTaskStore::seeded(now()));
    let broker = InMemoryBroker::new();
    broker
        .publish(REMINDER_QUEUE, b"\xff\xfe not a reminder".to_vec())
        .await
        .unwrap();
    let pipeline = ReminderPipeline::spawn(&h.app, Arc::new(broker.clone()));

    wait_for_acks(&pipeline, 1).await;
    let counts = pipeline.shutdown_and_join().await;

    assert_eq!(counts.dropped, 1);
    let poison = broker.ledgers()[0];
    assert_eq!(poison.deliveries, 1);
    assert_eq!(poison.rejects, 1);
    assert_eq!(h.notifier.sent().len(), 1);
}

struct RefusingConnector;

#[async_trait]
impl BrokerConnector for RefusingConnector {
    fn target(&self) -> String {
        "amqp://localhost:5672".to_string()
    }

    async fn connect(&self) -> Result<Arc<dyn MessageBroker>, BrokerError> {
        Err(BrokerError::Connection("connection refused".to_string()))
    }
}

struct HangingConnector;

#[async_trait]
impl BrokerConnector for HangingConnector {
    fn target(&self) -> String {
        "amqp://10.255.255.1:5672".to_string()
    }

    async fn connect(&self) -> Result<Arc<dyn MessageBroker>, BrokerError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn unreachable_broker_falls_back_to_inert_and_keeps_scanning() {
    let h = harness(InMemoryTaskStore::seeded(now()));

    for connector in [
        &RefusingConnector as &dyn BrokerConnector,
        &HangingConnector as &dyn BrokerConnector,
    ] {
        let broker = select_broker(Some(connector), h.app.config().connect_timeout()).await;
        assert_eq!(broker.name(), "inert");

        let report = h.app.scanner(broker).scan_once().await.unwrap();
        assert_eq!(report.published, 1);
    }
    assert!(h.notifier.sent().is_empty());
}
