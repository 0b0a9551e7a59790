//! crates/remind_me_core/src/usecases.rs
//!
//! Operations that coordinate both ports outside of the list view-model.

use crate::domain::{NewReminder, Reminder};
use crate::ports::{JobRequestScheduler, PortError, PortResult, ReminderRepo};
use chrono::{DateTime, Utc};
use tracing::{error, info};
use uuid::Uuid;

fn validated_title(title: &str) -> PortResult<&str> {
    let title = title.trim();
    if title.is_empty() {
        return Err(PortError::InvalidInput(
            "Reminder title must not be empty".to_string(),
        ));
    }
    Ok(title)
}

/// Schedules and persists a new reminder.
///
/// The job is scheduled first so the stored reminder always carries its external id.
/// If persisting fails the job is cancelled again.
pub async fn create_reminder(
    repo: &dyn ReminderRepo,
    scheduler: &dyn JobRequestScheduler,
    title: &str,
    remind_at: DateTime<Utc>,
) -> PortResult<Reminder> {
    let new_reminder = NewReminder::new(validated_title(title)?, remind_at);
    let external_id = scheduler.schedule_job(&new_reminder).await?;

    match repo.insert_reminder(&new_reminder, external_id).await {
        Ok(reminder) => {
            info!(reminder_id = %reminder.id, external_id, "Reminder created.");
            Ok(reminder)
        }
        Err(e) => {
            error!("Failed to persist reminder, cancelling job {}: {}", external_id, e);
            if let Err(cancel_err) = scheduler.cancel_job(external_id).await {
                error!("Failed to cancel orphaned job {}: {}", external_id, cancel_err);
            }
            Err(e)
        }
    }
}

/// Changes the title and trigger time of an existing reminder.
///
/// The replacement job is scheduled before the row is updated, and the old job is
/// cancelled only once the update is stored. If storing fails the replacement job
/// is cancelled and the reminder keeps its old one.
pub async fn update_reminder(
    repo: &dyn ReminderRepo,
    scheduler: &dyn JobRequestScheduler,
    reminder_id: Uuid,
    title: &str,
    remind_at: DateTime<Utc>,
) -> PortResult<Reminder> {
    let title = validated_title(title)?;
    let current = repo.get_reminder(reminder_id).await?;
    let edited = current.edited(title, remind_at);
    let external_id = scheduler.schedule_job(&edited).await?;

    let updated = match repo.update_reminder(&edited, external_id).await {
        Ok(updated) => updated,
        Err(e) => {
            error!(
                "Failed to update reminder {}, cancelling job {}: {}",
                reminder_id, external_id, e
            );
            if let Err(cancel_err) = scheduler.cancel_job(external_id).await {
                error!("Failed to cancel orphaned job {}: {}", external_id, cancel_err);
            }
            return Err(e);
        }
    };

    scheduler.cancel_job(current.external_id).await?;
    info!(
        reminder_id = %updated.id,
        old_external_id = current.external_id,
        external_id,
        "Reminder rescheduled."
    );
    Ok(updated)
}
