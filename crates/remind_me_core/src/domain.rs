//! crates/remind_me_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Identifier the job scheduler uses for a reminder's trigger.
pub type JobId = i64;

/// Identifier of the OS notification shown for a reminder.
pub type NotificationId = i32;

/// A persisted reminder. The repository is the sole owner of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub id: Uuid,
    pub external_id: JobId,
    pub notification_id: NotificationId,
    pub title: String,
    pub remind_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Reminder {
    /// The back-reference used to correlate a later delete confirmation.
    pub fn handle(&self) -> ReminderHandle {
        ReminderHandle {
            id: self.id,
            external_id: self.external_id,
            notification_id: self.notification_id,
        }
    }

    /// The same reminder with new content, ready to be scheduled again.
    ///
    /// The id and notification id carry over so the view keeps tracking one reminder.
    pub fn edited(&self, title: impl Into<String>, remind_at: DateTime<Utc>) -> NewReminder {
        NewReminder {
            id: self.id,
            notification_id: self.notification_id,
            title: title.into(),
            remind_at,
        }
    }
}

/// Keys into repository-owned storage for a single reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderHandle {
    pub id: Uuid,
    pub external_id: JobId,
    pub notification_id: NotificationId,
}

/// A reminder that has not been scheduled or persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReminder {
    pub id: Uuid,
    pub notification_id: NotificationId,
    pub title: String,
    pub remind_at: DateTime<Utc>,
}

impl NewReminder {
    pub fn new(title: impl Into<String>, remind_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            // Notification ids must stay positive for the OS notification APIs.
            notification_id: rand::random_range(1..NotificationId::MAX),
            title: title.into(),
            remind_at,
        }
    }

    /// Completes the reminder once the scheduler has assigned its job.
    pub fn into_reminder(self, external_id: JobId, created_at: DateTime<Utc>) -> Reminder {
        Reminder {
            id: self.id,
            external_id,
            notification_id: self.notification_id,
            title: self.title,
            remind_at: self.remind_at,
            created_at,
        }
    }
}
