//! Delivery state machine for one message inside a consumer.

/// State of a single delivery.
///
/// State transitions:
/// - Delivered -> Handling -> Acked
/// - Delivered -> Handling -> NackedRequeue (broker redelivers later)
/// - Delivered -> Handling -> Dropped (attempt cap reached)
/// - Delivered -> Dropped (poison message, cannot be decoded)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryState {
    /// Received from the broker, not decoded yet.
    Delivered,

    /// Decoded; the processor is running.
    Handling,

    /// Processed and acknowledged.
    Acked,

    /// Negatively acknowledged, returned to the queue.
    NackedRequeue,

    /// Removed permanently, no redelivery.
    Dropped,
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid delivery transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: DeliveryState,
    pub to: DeliveryState,
}

impl DeliveryState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeliveryState::Acked | DeliveryState::NackedRequeue | DeliveryState::Dropped
        )
    }

    pub fn can_transition_to(self, next: DeliveryState) -> bool {
        use DeliveryState::*;
        matches!(
            (self, next),
            (Delivered, Handling)
                | (Delivered, Dropped)
                | (Handling, Acked)
                | (Handling, NackedRequeue)
                | (Handling, Dropped)
        )
    }

    pub fn transition(self, next: DeliveryState) -> Result<DeliveryState, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}
