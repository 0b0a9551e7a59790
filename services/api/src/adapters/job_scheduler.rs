//! services/api/src/adapters/job_scheduler.rs
//!
//! An in-process implementation of the `JobRequestScheduler` port. Every job is a
//! tokio task that sleeps until the reminder's trigger time and then publishes a
//! `FiredReminder` to the connected views.
//!
//! Jobs live only as long as the process; `restore_jobs` re-arms the persisted
//! reminders at startup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use remind_me_core::domain::{JobId, NewReminder, NotificationId, Reminder};
use remind_me_core::ports::{JobRequestScheduler, PortResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// Fired reminders buffered per subscriber before the slowest one starts lagging.
const FIRED_BUFFER: usize = 64;

/// Published when a reminder's trigger time is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredReminder {
    pub reminder_id: Uuid,
    pub notification_id: NotificationId,
    pub title: String,
}

type JobTable = Arc<Mutex<HashMap<JobId, AbortHandle>>>;

pub struct TokioJobScheduler {
    next_id: AtomicI64,
    jobs: JobTable,
    fired: broadcast::Sender<FiredReminder>,
}

impl TokioJobScheduler {
    pub fn new() -> Self {
        let (fired, _) = broadcast::channel(FIRED_BUFFER);
        Self {
            next_id: AtomicI64::new(1),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            fired,
        }
    }

    /// The sender side of the fired-reminder channel, for handing to the web state.
    pub fn notifications(&self) -> broadcast::Sender<FiredReminder> {
        self.fired.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FiredReminder> {
        self.fired.subscribe()
    }

    pub fn pending_jobs(&self) -> usize {
        lock(&self.jobs).len()
    }

    /// Re-arms persisted reminders under their existing external ids.
    ///
    /// Reminders whose trigger time has passed are not fired again. Newly
    /// scheduled jobs get ids above every restored one.
    pub fn restore_jobs(&self, reminders: &[Reminder]) -> usize {
        let now = Utc::now();
        let mut restored = 0;
        for reminder in reminders {
            self.next_id
                .fetch_max(reminder.external_id.saturating_add(1), Ordering::SeqCst);
            if reminder.remind_at <= now {
                debug!(reminder_id = %reminder.id, "Skipping reminder whose time has passed.");
                continue;
            }
            self.arm(
                reminder.external_id,
                reminder.remind_at,
                FiredReminder {
                    reminder_id: reminder.id,
                    notification_id: reminder.notification_id,
                    title: reminder.title.clone(),
                },
            );
            restored += 1;
        }
        info!("Restored {} scheduled reminder jobs.", restored);
        restored
    }

    fn arm(&self, external_id: JobId, remind_at: DateTime<Utc>, fired: FiredReminder) {
        let delay = (remind_at - Utc::now()).to_std().unwrap_or_default();
        let deadline = tokio::time::Instant::now() + delay;

        // The table stays locked until the handle is stored, so a job that fires
        // immediately cannot remove itself before it has been registered.
        let mut jobs = lock(&self.jobs);
        let table = self.jobs.clone();
        let sender = self.fired.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            lock(&table).remove(&external_id);
            info!(external_id, reminder_id = %fired.reminder_id, "Reminder job fired.");
            // Nobody listening just means no view is open.
            let _ = sender.send(fired);
        });
        if let Some(previous) = jobs.insert(external_id, task.abort_handle()) {
            previous.abort();
        }
    }
}

impl Default for TokioJobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(jobs: &JobTable) -> MutexGuard<'_, HashMap<JobId, AbortHandle>> {
    jobs.lock().unwrap_or_else(PoisonError::into_inner)
}

//=========================================================================================
// `JobRequestScheduler` Trait Implementation
//=========================================================================================

#[async_trait]
impl JobRequestScheduler for TokioJobScheduler {
    async fn schedule_job(&self, reminder: &NewReminder) -> PortResult<JobId> {
        let external_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.arm(
            external_id,
            reminder.remind_at,
            FiredReminder {
                reminder_id: reminder.id,
                notification_id: reminder.notification_id,
                title: reminder.title.clone(),
            },
        );
        debug!(external_id, remind_at = %reminder.remind_at, "Scheduled reminder job.");
        Ok(external_id)
    }

    async fn cancel_job(&self, external_id: JobId) -> PortResult<()> {
        match lock(&self.jobs).remove(&external_id) {
            Some(handle) => {
                handle.abort();
                debug!(external_id, "Cancelled reminder job.");
            }
            None => debug!(external_id, "No pending job to cancel."),
        }
        Ok(())
    }

    async fn cancel_all_jobs(&self) -> PortResult<()> {
        let cancelled: Vec<AbortHandle> = lock(&self.jobs).drain().map(|(_, h)| h).collect();
        for handle in &cancelled {
            handle.abort();
        }
        info!("Cancelled {} reminder jobs.", cancelled.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    fn reminder_in(minutes: i64) -> NewReminder {
        NewReminder::new("take a break", Utc::now() + ChronoDuration::minutes(minutes))
    }

    #[tokio::test]
    async fn job_in_the_past_fires_immediately() {
        let scheduler = TokioJobScheduler::new();
        let mut fired = scheduler.subscribe();
        let reminder = reminder_in(-1);

        scheduler.schedule_job(&reminder).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(1), fired.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.reminder_id, reminder.id);
        assert_eq!(received.notification_id, reminder.notification_id);
        tokio::task::yield_now().await;
        assert_eq!(scheduler.pending_jobs(), 0);
    }

    #[tokio::test]
    async fn job_ids_increase() {
        let scheduler = TokioJobScheduler::new();
        let first = scheduler.schedule_job(&reminder_in(10)).await.unwrap();
        let second = scheduler.schedule_job(&reminder_in(10)).await.unwrap();
        assert!(second > first);
        assert_eq!(scheduler.pending_jobs(), 2);
    }

    #[tokio::test]
    async fn cancelled_job_never_fires() {
        let scheduler = TokioJobScheduler::new();
        let mut fired = scheduler.subscribe();
        let id = scheduler.schedule_job(&reminder_in(60)).await.unwrap();

        scheduler.cancel_job(id).await.unwrap();

        assert_eq!(scheduler.pending_jobs(), 0);
        assert!(fired.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancelling_an_unknown_job_is_fine() {
        let scheduler = TokioJobScheduler::new();
        scheduler.cancel_job(999).await.unwrap();
    }

    #[tokio::test]
    async fn cancel_all_clears_every_job() {
        let scheduler = TokioJobScheduler::new();
        scheduler.schedule_job(&reminder_in(10)).await.unwrap();
        scheduler.schedule_job(&reminder_in(20)).await.unwrap();

        scheduler.cancel_all_jobs().await.unwrap();
        assert_eq!(scheduler.pending_jobs(), 0);
    }

    #[tokio::test]
    async fn restore_keeps_external_ids_and_skips_past_reminders() {
        let scheduler = TokioJobScheduler::new();
        let now = Utc::now();
        let upcoming = reminder_in(30).into_reminder(41, now);
        let overdue = reminder_in(-30).into_reminder(7, now);

        let restored = scheduler.restore_jobs(&[upcoming.clone(), overdue]);
        assert_eq!(restored, 1);
        assert_eq!(scheduler.pending_jobs(), 1);

        let next = scheduler.schedule_job(&reminder_in(5)).await.unwrap();
        assert_eq!(next, 42);

        scheduler.cancel_job(upcoming.external_id).await.unwrap();
        assert_eq!(scheduler.pending_jobs(), 1);
    }

    #[tokio::test]
    async fn restoring_the_largest_job_id_does_not_overflow() {
        let scheduler = TokioJobScheduler::new();
        let stored = reminder_in(-5).into_reminder(JobId::MAX, Utc::now());

        assert_eq!(scheduler.restore_jobs(&[stored]), 0);
        assert_eq!(scheduler.next_id.load(Ordering::SeqCst), JobId::MAX);
    }
}
