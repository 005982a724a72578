//! ReminderMessage - the value that travels through the queue.
//!
//! Wire format: UTF-8 JSON with camelCase keys
//! (`taskId`, `title`, `fullName`, `email`, `dueDate`, `createdAt`, optional `processedAt`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::CodecError;
use super::task::{OverdueTask, TaskId};

/// Name of the durable queue shared by the scanner and every consumer.
pub const REMINDER_QUEUE: &str = "task-reminders";

/// One reminder for one overdue task, created at publish time.
///
/// Fields are private so a message cannot be edited after construction.
/// `processed_at` is only ever set on a consumer's local copy via
/// [`ReminderMessage::processed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderMessage {
    task_id: TaskId,
    title: String,
    full_name: String,
    email: String,
    due_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    processed_at: Option<DateTime<Utc>>,
}

/// Identity of a reminder: redeliveries of the same message share it,
/// reminders from different scan ticks do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReminderKey {
    pub task_id: TaskId,
    pub created_at: DateTime<Utc>,
}

impl ReminderMessage {
    pub fn new(
        task_id: TaskId,
        title: impl Into<String>,
        full_name: impl Into<String>,
        email: impl Into<String>,
        due_date: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            title: title.into(),
            full_name: full_name.into(),
            email: email.into(),
            due_date,
            created_at,
            processed_at: None,
        }
    }

    /// Build the reminder for an overdue task found at `created_at`.
    pub fn for_task(task: &OverdueTask, created_at: DateTime<Utc>) -> Self {
        Self::new(
            task.id,
            task.title.clone(),
            task.full_name.clone(),
            task.email.clone(),
            task.due_date,
            created_at,
        )
    }

    /// Copy stamped with the consumer-side processing time.
    pub fn processed(&self, at: DateTime<Utc>) -> Self {
        Self {
            processed_at: Some(at),
            ..self.clone()
        }
    }

    pub fn key(&self) -> ReminderKey {
        ReminderKey {
            task_id: self.task_id,
            created_at: self.created_at,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn due_date(&self) -> DateTime<Utc> {
        self.due_date
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.processed_at
    }

    pub fn to_wire(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(CodecError::Encode)
    }

    pub fn from_wire(bytes: &[u8]) -> Result<Self, CodecError> {
        let text = std::str::from_utf8(bytes).map_err(CodecError::Utf8)?;
        serde_json::from_str(text).map_err(CodecError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn sample() -> ReminderMessage {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap();
        ReminderMessage::new(
            TaskId::new(1),
            "Fix Login Bug",
            "Jane Smith",
            "jane.smith@example.com",
            now - Duration::days(2),
            now,
        )
    }

    #[test]
    fn wire_roundtrip_is_field_for_field_equal() {
        let message = sample();
        let decoded = ReminderMessage::from_wire(&message.to_wire().unwrap()).unwrap();
        assert_eq!(decoded, message);

        let processed = message.processed(message.created_at() + Duration::seconds(3));
        let decoded = ReminderMessage::from_wire(&processed.to_wire().unwrap()).unwrap();
        assert_eq!(decoded, processed);
    }

    #[test]
    fn wire_format_uses_camel_case_keys() {
        let value: serde_json::Value = serde_json::from_slice(&sample().to_wire().unwrap()).unwrap();

        assert_eq!(value["taskId"], json!(1));
        assert_eq!(value["title"], json!("Fix Login Bug"));
        assert_eq!(value["fullName"], json!("Jane Smith"));
        assert_eq!(value["email"], json!("jane.smith@example.com"));
        assert_eq!(value["dueDate"], json!("2024-01-08T09:00:00Z"));
        assert_eq!(value["createdAt"], json!("2024-01-10T09:00:00Z"));
        assert!(value.get("processedAt").is_none());
    }

    #[test]
    fn decodes_payload_without_processed_at() {
        let payload = br#"{"taskId":7,"title":"t","fullName":"n","email":"e@x","dueDate":"2024-01-01T00:00:00Z","createdAt":"2024-01-02T00:00:00Z"}"#;
        let message = ReminderMessage::from_wire(payload).unwrap();

        assert_eq!(message.task_id(), TaskId::new(7));
        assert_eq!(message.processed_at(), None);
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(matches!(
            ReminderMessage::from_wire(b"not json"),
            Err(CodecError::Decode(_))
        ));
        assert!(matches!(
            ReminderMessage::from_wire(&[0xff, 0xfe, 0x00]),
            Err(CodecError::Utf8(_))
        ));
        assert!(matches!(
            ReminderMessage::from_wire(br#"{"taskId":"one"}"#),
            Err(CodecError::Decode(_))
        ));
    }

    #[test]
    fn processed_copy_keeps_identity() {
        let message = sample();
        let processed = message.processed(Utc::now());

        assert_eq!(processed.key(), message.key());
        assert!(processed.processed_at().is_some());
        assert!(message.processed_at().is_none());
    }
}
