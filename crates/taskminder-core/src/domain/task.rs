use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned by the task store (identity column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(i32);

impl TaskId {
    pub fn new(value: i32) -> Self {
        Self(value)
    }

    pub fn get(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskPriority {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

/// A work item as owned by the task store.
///
/// The reminder pipeline never mutates it; the scanner only sees the
/// [`OverdueTask`] projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTask {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub full_name: String,
    pub telephone: String,
    pub email: String,
    pub due_date: DateTime<Utc>,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserTask {
    /// Due strictly before `now` and not completed yet.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.due_date < now && !self.is_completed
    }
}

/// Read-only projection returned by the overdue query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverdueTask {
    pub id: TaskId,
    pub title: String,
    pub full_name: String,
    pub email: String,
    pub due_date: DateTime<Utc>,
}

impl From<&UserTask> for OverdueTask {
    fn from(task: &UserTask) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            full_name: task.full_name.clone(),
            email: task.email.clone(),
            due_date: task.due_date,
        }
    }
}
