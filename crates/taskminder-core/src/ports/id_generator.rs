//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: Clock の時刻 + ランダム部分で ULID を生成

use std::sync::Arc;

use ulid::Ulid;

use crate::domain::ids::{ConsumerId, ScanId};
use crate::ports::Clock;

/// IdGenerator はログ相関用の ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（scanner と consumer から共有される）
pub trait IdGenerator: Send + Sync {
    fn scan_id(&self) -> ScanId;

    fn consumer_id(&self) -> ConsumerId;
}

/// UlidGenerator は Clock を使って ULID を生成します。
/// テストで FixedClock を渡すと timestamp 部分が決定的になります。
pub struct UlidGenerator {
    clock: Arc<dyn Clock>,
}

impl UlidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl IdGenerator for UlidGenerator {
    fn scan_id(&self) -> ScanId {
        ScanId::from_ulid(self.next_ulid())
    }

    fn consumer_id(&self) -> ConsumerId {
        ConsumerId::from_ulid(self.next_ulid())
    }
}
