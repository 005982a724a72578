//! Domain model (tasks, reminder messages, delivery states, decisions, errors).

pub mod decision;
pub mod errors;
pub mod ids;
pub mod reminder;
pub mod state;
pub mod task;

pub use decision::{Decision, RedeliveryPolicy};
pub use errors::{BrokerError, CodecError, NotifyError, ProcessError, ScanError, StoreError};
pub use ids::{ConsumerId, ScanId};
pub use reminder::{REMINDER_QUEUE, ReminderKey, ReminderMessage};
pub use state::{DeliveryState, InvalidTransition};
pub use task::{OverdueTask, TaskId, TaskPriority, UserTask};
