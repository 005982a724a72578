//! InMemoryBroker - 開発・テスト用の broker
//!
//! # 学習ポイント
//! - std Mutex + Notify による待ち合わせ（lock を跨いで await しない）
//! - Semaphore(1) で prefetch = 1 を再現
//! - Drop で未 settle の delivery をキューに戻す（接続断の再現）
//!
//! メッセージごとに delivery / ack / requeue / reject の回数を記録するので、
//! at-least-once の挙動をテストから検証できます。

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, mpsc};

use crate::domain::BrokerError;
use crate::ports::{DeliveryHandle, MessageBroker, Subscription};

/// Per-message bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageLedger {
    pub deliveries: u32,
    pub acks: u32,
    pub requeues: u32,
    pub rejects: u32,
}

impl MessageLedger {
    pub fn redeliveries(&self) -> u32 {
        self.deliveries.saturating_sub(1)
    }
}

#[derive(Debug)]
struct StoredMessage {
    id: u64,
    payload: Vec<u8>,
    delivered_before: bool,
}

#[derive(Debug, Clone, Copy)]
enum Settlement {
    Ack,
    Requeue,
    Reject,
}

#[derive(Default)]
struct BrokerState {
    /// queue 名ごとの ready メッセージ
    queues: HashMap<String, VecDeque<StoredMessage>>,
    /// message id -> ledger（publish 順）
    ledger: BTreeMap<u64, MessageLedger>,
    next_id: u64,
    closed: bool,
}

impl BrokerState {
    fn push_front(&mut self, queue: &str, mut message: StoredMessage) {
        message.delivered_before = true;
        self.queues
            .entry(queue.to_string())
            .or_default()
            .push_front(message);
    }
}

struct Shared {
    state: Mutex<BrokerState>,
    notify: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for the next ready message; `None` once the broker is closed.
    async fn next_ready(&self, queue: &str) -> Option<StoredMessage> {
        loop {
            // 通知の取りこぼしを防ぐため、状態を見る前に enable しておく
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                let next = state.queues.get_mut(queue).and_then(VecDeque::pop_front);
                if let Some(message) = next {
                    state.ledger.entry(message.id).or_default().deliveries += 1;
                    return Some(message);
                }
            }

            notified.await;
        }
    }
}

/// In-memory broker with per-message delivery bookkeeping.
#[derive(Clone)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BrokerState::default()),
                notify: Notify::new(),
            }),
        }
    }

    /// Number of messages waiting in `queue` (not counting in-flight ones).
    pub fn ready_count(&self, queue: &str) -> usize {
        self.shared.lock().queues.get(queue).map_or(0, VecDeque::len)
    }

    /// Ledger of every message ever published, in publish order.
    pub fn ledgers(&self) -> Vec<MessageLedger> {
        self.shared.lock().ledger.values().copied().collect()
    }

    pub fn published_count(&self) -> usize {
        self.shared.lock().ledger.len()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(BrokerError::Closed);
            }
            let id = state.next_id;
            state.next_id += 1;
            state.ledger.insert(id, MessageLedger::default());
            state
                .queues
                .entry(queue.to_string())
                .or_default()
                .push_back(StoredMessage {
                    id,
                    payload,
                    delivered_before: false,
                });
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> Result<Subscription, BrokerError> {
        if self.shared.lock().closed {
            return Err(BrokerError::Closed);
        }

        let (tx, rx) = mpsc::channel(1);
        let prefetch = Arc::new(Semaphore::new(1));
        tokio::spawn(pump(
            Arc::clone(&self.shared),
            queue.to_string(),
            tx,
            prefetch,
        ));

        Ok(Subscription::new(queue, rx))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.shared.lock().closed = true;
        self.shared.notify.notify_waiters();
        Ok(())
    }
}

/// Moves ready messages into one subscription, one unsettled message at a time.
async fn pump(
    shared: Arc<Shared>,
    queue: String,
    tx: mpsc::Sender<Box<dyn DeliveryHandle>>,
    prefetch: Arc<Semaphore>,
) {
    loop {
        // 前の delivery が settle されるまで permit は返ってこない
        let permit = tokio::select! {
            biased;
            _ = tx.closed() => return,
            permit = Arc::clone(&prefetch).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        let message = tokio::select! {
            biased;
            _ = tx.closed() => return,
            message = shared.next_ready(&queue) => match message {
                Some(message) => message,
                None => return,
            },
        };

        let delivery = InMemoryDelivery {
            shared: Arc::clone(&shared),
            queue: queue.clone(),
            redelivered: message.delivered_before,
            message: Some(message),
            _permit: permit,
        };

        // 受け手がいなければ delivery は Drop でキューに戻る
        if tx.send(Box::new(delivery)).await.is_err() {
            return;
        }
    }
}

struct InMemoryDelivery {
    shared: Arc<Shared>,
    queue: String,
    redelivered: bool,
    message: Option<StoredMessage>,
    _permit: OwnedSemaphorePermit,
}

impl InMemoryDelivery {
    fn settle(&mut self, settlement: Settlement) -> Result<(), BrokerError> {
        let Some(message) = self.message.take() else {
            return Ok(());
        };

        let requeued = {
            let mut state = self.shared.lock();
            if state.closed {
                state.push_front(&self.queue, message);
                return Err(BrokerError::Closed);
            }

            let ledger = state.ledger.entry(message.id).or_default();
            match settlement {
                Settlement::Ack => {
                    ledger.acks += 1;
                    false
                }
                Settlement::Reject => {
                    ledger.rejects += 1;
                    false
                }
                Settlement::Requeue => {
                    ledger.requeues += 1;
                    state.push_front(&self.queue, message);
                    true
                }
            }
        };

        if requeued {
            self.shared.notify.notify_waiters();
        }
        Ok(())
    }
}

#[async_trait]
impl DeliveryHandle for InMemoryDelivery {
    fn payload(&self) -> &[u8] {
        self.message
            .as_ref()
            .map(|message| message.payload.as_slice())
            .unwrap_or_default()
    }

    fn redelivered(&self) -> bool {
        self.redelivered
    }

    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        let mut this = self;
        this.settle(Settlement::Ack)
    }

    async fn nack_requeue(self: Box<Self>) -> Result<(), BrokerError> {
        let mut this = self;
        this.settle(Settlement::Requeue)
    }

    async fn reject(self: Box<Self>) -> Result<(), BrokerError> {
        let mut this = self;
        this.settle(Settlement::Reject)
    }
}

impl Drop for InMemoryDelivery {
    fn drop(&mut self) {
        if self.message.is_some() {
            // 未 settle のまま手放された: broker が切断を検知したのと同じ扱い
            let _ = self.settle(Settlement::Requeue);
        }
    }
}
