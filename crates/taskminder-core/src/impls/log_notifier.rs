use async_trait::async_trait;

use crate::domain::{NotifyError, ReminderMessage};
use crate::ports::Notifier;

/// Notifier that only writes the reminder to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &ReminderMessage) -> Result<(), NotifyError> {
        tracing::info!(
            task_id = %message.task_id(),
            email = message.email(),
            due_date = %message.due_date(),
            "Hi {}, your task is due: {}",
            message.full_name(),
            message.title()
        );
        Ok(())
    }
}
