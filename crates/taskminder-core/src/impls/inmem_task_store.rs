//! InMemoryTaskStore - 永続化レイヤーの代わりに使うタスクストア
//!
//! CLI のデモとテストで使います。`seeded` はサンプルデータ 3 件
//! （うち "Fix Login Bug" が 2 日遅れ）を投入します。

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::domain::{OverdueTask, StoreError, TaskId, TaskPriority, UserTask};
use crate::ports::TaskStore;

#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<Vec<UserTask>>,
}

/// Fields the caller provides when creating a task; the store assigns
/// the id and timestamps.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub full_name: String,
    pub telephone: String,
    pub email: String,
    pub due_date: DateTime<Utc>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with the demo tasks, due dates relative to `now`.
    pub fn seeded(now: DateTime<Utc>) -> Self {
        let store = Self::new();
        let samples = [
            NewTask {
                title: "Complete Project Documentation".to_string(),
                description: "Finish writing the technical documentation for the new project"
                    .to_string(),
                priority: TaskPriority::High,
                full_name: "John Doe".to_string(),
                telephone: "+1-555-0123".to_string(),
                email: "john.doe@example.com".to_string(),
                due_date: now + Duration::days(7),
            },
            NewTask {
                title: "Fix Login Bug".to_string(),
                description: "Resolve the authentication issue in the login module".to_string(),
                priority: TaskPriority::Critical,
                full_name: "Jane Smith".to_string(),
                telephone: "+1-555-0124".to_string(),
                email: "jane.smith@example.com".to_string(),
                due_date: now - Duration::days(2),
            },
            NewTask {
                title: "Team Meeting Preparation".to_string(),
                description: "Prepare agenda and materials for the weekly team meeting"
                    .to_string(),
                priority: TaskPriority::Medium,
                full_name: "Bob Johnson".to_string(),
                telephone: "+1-555-0125".to_string(),
                email: "bob.johnson@example.com".to_string(),
                due_date: now + Duration::days(2),
            },
        ];
        for task in samples {
            store.insert(task, now);
        }
        store
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<UserTask>> {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<UserTask>> {
        self.tasks.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, task: NewTask, now: DateTime<Utc>) -> TaskId {
        let mut tasks = self.write();
        let next = tasks.iter().map(|t| t.id.get()).max().unwrap_or(0) + 1;
        let id = TaskId::new(next);
        tasks.push(UserTask {
            id,
            title: task.title,
            description: task.description,
            priority: task.priority,
            full_name: task.full_name,
            telephone: task.telephone,
            email: task.email,
            due_date: task.due_date,
            is_completed: false,
            created_at: now,
            updated_at: now,
        });
        id
    }

    /// Returns `false` when no task has this id.
    pub fn mark_completed(&self, id: TaskId, now: DateTime<Utc>) -> bool {
        let mut tasks = self.write();
        match tasks.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                task.is_completed = true;
                task.updated_at = now;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: TaskId) -> Option<UserTask> {
        self.read().iter().find(|t| t.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn query_overdue(&self, now: DateTime<Utc>) -> Result<Vec<OverdueTask>, StoreError> {
        Ok(self
            .read()
            .iter()
            .filter(|task| task.is_overdue(now))
            .map(OverdueTask::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn seeded_store_has_one_overdue_task() {
        let store = InMemoryTaskStore::seeded(now());
        assert_eq!(store.len(), 3);

        let overdue = store.query_overdue(now()).await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].title, "Fix Login Bug");
        assert_eq!(overdue[0].due_date, now() - Duration::days(2));
    }

    #[tokio::test]
    async fn completed_tasks_are_not_overdue() {
        let store = InMemoryTaskStore::seeded(now());
        let overdue = store.query_overdue(now()).await.unwrap();

        assert!(store.mark_completed(overdue[0].id, now()));
        assert!(store.query_overdue(now()).await.unwrap().is_empty());
        assert!(store.get(overdue[0].id).unwrap().is_completed);
    }

    #[tokio::test]
    async fn tasks_become_overdue_as_time_passes() {
        let store = InMemoryTaskStore::seeded(now());
        let later = now() + Duration::days(3);

        let titles: Vec<String> = store
            .query_overdue(later)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["Fix Login Bug", "Team Meeting Preparation"]);
    }

    #[test]
    fn ids_are_assigned_sequentially() {
        let store = InMemoryTaskStore::seeded(now());
        assert!(!store.mark_completed(TaskId::new(99), now()));
        assert_eq!(store.get(TaskId::new(2)).unwrap().title, "Fix Login Bug");
    }
}
