//! services/api/src/adapters/inmemory.rs
//!
//! An in-memory implementation of the `ReminderRepo` port. It backs the service
//! when no database is configured, and the web layer's tests.

use async_trait::async_trait;
use chrono::Utc;
use remind_me_core::domain::{JobId, NewReminder, Reminder};
use remind_me_core::ports::{PortError, PortResult, ReminderRepo, ReminderStream};
use tokio::sync::watch;
use uuid::Uuid;

/// Keeps the active reminders ordered by trigger time. Every change is published
/// to the open streams through the watch channel.
pub struct InMemoryReminderRepo {
    reminders: watch::Sender<Vec<Reminder>>,
}

impl InMemoryReminderRepo {
    pub fn new() -> Self {
        let (reminders, _) = watch::channel(Vec::new());
        Self { reminders }
    }
}

impl Default for InMemoryReminderRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReminderRepo for InMemoryReminderRepo {
    async fn active_reminders(&self) -> PortResult<ReminderStream> {
        let mut rx = self.reminders.subscribe();
        let stream = async_stream::stream! {
            loop {
                let current = rx.borrow_and_update().clone();
                yield Ok(current);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn list_active_reminders(&self) -> PortResult<Vec<Reminder>> {
        Ok(self.reminders.borrow().clone())
    }

    async fn get_reminder(&self, reminder_id: Uuid) -> PortResult<Reminder> {
        self.reminders
            .borrow()
            .iter()
            .find(|r| r.id == reminder_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Reminder {} not found", reminder_id)))
    }

    async fn insert_reminder(
        &self,
        reminder: &NewReminder,
        external_id: JobId,
    ) -> PortResult<Reminder> {
        let reminder = reminder.clone().into_reminder(external_id, Utc::now());
        let mut duplicate = false;
        self.reminders.send_if_modified(|list| {
            if list.iter().any(|r| r.id == reminder.id) {
                duplicate = true;
                return false;
            }
            list.push(reminder.clone());
            list.sort_by_key(|r| r.remind_at);
            true
        });
        if duplicate {
            return Err(PortError::InvalidInput(format!(
                "Reminder {} already exists",
                reminder.id
            )));
        }
        Ok(reminder)
    }

    async fn update_reminder(
        &self,
        reminder: &NewReminder,
        external_id: JobId,
    ) -> PortResult<Reminder> {
        let mut updated = None;
        self.reminders.send_if_modified(|list| {
            let Some(stored) = list.iter_mut().find(|r| r.id == reminder.id) else {
                return false;
            };
            *stored = reminder.clone().into_reminder(external_id, stored.created_at);
            updated = Some(stored.clone());
            list.sort_by_key(|r| r.remind_at);
            true
        });
        updated.ok_or_else(|| PortError::NotFound(format!("Reminder {} not found", reminder.id)))
    }

    async fn delete_reminder(&self, reminder_id: Uuid) -> PortResult<()> {
        self.reminders.send_if_modified(|list| {
            let before = list.len();
            list.retain(|r| r.id != reminder_id);
            list.len() != before
        });
        Ok(())
    }

    async fn delete_all_reminders(&self) -> PortResult<()> {
        self.reminders.send_if_modified(|list| {
            let changed = !list.is_empty();
            list.clear();
            changed
        });
        Ok(())
    }
}
