//! Decision model: what to do with a reminder whose processing failed.
//!
//! The broker redelivers a nacked message immediately, so the consumer waits
//! `delay` before nacking and gives up once the attempt cap is reached.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The next action for a failed delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Return the message to the queue after a delay.
    Requeue { delay: Duration, reason: String },

    /// Drop the message for good (dead-lettered).
    DeadLetter { reason: String },
}

/// Redelivery policy for failed reminders.
///
/// Attempts are counted per reminder identity by one consumer instance.
/// `max_attempts = None` (or `0`) requeues forever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedeliveryPolicy {
    pub max_attempts: Option<u32>,

    /// Delay before the first requeue.
    #[serde(with = "millis")]
    pub base_delay: Duration,

    pub multiplier: f64,

    #[serde(with = "millis")]
    pub max_delay: Duration,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(5),
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RedeliveryPolicy {
    /// Requeue forever without waiting.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    /// Give up after `max_attempts`, no waiting in between.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Self::unbounded()
        }
    }

    /// delay = base_delay * multiplier^(attempts - 1), capped at max_delay.
    ///
    /// With base=1s, multiplier=2.0, max=30s:
    /// - attempt 1: 1s
    /// - attempt 2: 2s
    /// - attempt 5: 16s
    /// - attempt 6+: 30s
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs.max(0.0))
    }

    /// Effective cap; `Some(0)` is treated like `None` so TOML can disable it.
    pub fn cap(&self) -> Option<u32> {
        self.max_attempts.filter(|max| *max > 0)
    }

    /// Decide after the `attempts`-th failed attempt (1-indexed).
    pub fn decide(&self, attempts: u32) -> Decision {
        match self.cap() {
            Some(max) if attempts >= max => Decision::DeadLetter {
                reason: format!("max attempts reached: {attempts}/{max}"),
            },
            Some(max) => {
                let delay = self.next_delay(attempts);
                Decision::Requeue {
                    delay,
                    reason: format!("attempt {}/{} after {:?}", attempts + 1, max, delay),
                }
            }
            None => {
                let delay = self.next_delay(attempts);
                Decision::Requeue {
                    delay,
                    reason: format!("attempt {} after {:?}", attempts + 1, delay),
                }
            }
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
