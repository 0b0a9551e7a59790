//! crates/remind_me_core/src/view_model.rs
//!
//! The reminder list view-model. It holds the transient UI state of the list screen
//! (the reminder pending deletion and the list visibility) and mediates between the
//! view and the repository/scheduler ports.
//!
//! A view-model is owned by exactly one task. Every method takes `&self`/`&mut self`
//! on that task, so no locking is involved.

use crate::domain::{Reminder, ReminderHandle};
use crate::events::{ListVisibility, ViewEvent, ViewEvents};
use crate::ports::{JobRequestScheduler, PortError, PortResult, ReminderRepo};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub struct ReminderListViewModel {
    repo: Arc<dyn ReminderRepo>,
    scheduler: Arc<dyn JobRequestScheduler>,
    pending_delete: Option<ReminderHandle>,
    visibility: watch::Sender<ListVisibility>,
    events: mpsc::UnboundedSender<ViewEvent>,
}

impl ReminderListViewModel {
    /// Creates a view-model together with the only receiver of its events.
    pub fn new(
        repo: Arc<dyn ReminderRepo>,
        scheduler: Arc<dyn JobRequestScheduler>,
    ) -> (Self, ViewEvents) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (visibility, _) = watch::channel(ListVisibility::default());
        let view_model = Self {
            repo,
            scheduler,
            pending_delete: None,
            visibility,
            events,
        };
        (view_model, events_rx)
    }

    //=====================================================================================
    // Observable state
    //=====================================================================================

    /// Subscribes to the list visibility. The receiver starts at the current value.
    pub fn visibility(&self) -> watch::Receiver<ListVisibility> {
        self.visibility.subscribe()
    }

    pub fn current_visibility(&self) -> ListVisibility {
        *self.visibility.borrow()
    }

    pub fn spinner_visible(&self) -> bool {
        self.current_visibility().spinner_visible()
    }

    pub fn empty_visible(&self) -> bool {
        self.current_visibility().empty_visible()
    }

    pub fn pending_delete(&self) -> Option<ReminderHandle> {
        self.pending_delete
    }

    //=====================================================================================
    // List updates
    //=====================================================================================

    pub fn reminder_list_updated(&mut self, list: &[Reminder]) {
        let next = if list.is_empty() {
            ListVisibility::Empty
        } else {
            ListVisibility::Populated
        };
        // `send_replace` keeps the value even while nobody is subscribed.
        self.visibility.send_replace(next);
        debug!(count = list.len(), visibility = ?next, "Reminder list updated.");
    }

    /// Reports a failed delivery to the view. The visibility state is left as it was.
    pub fn reminder_list_failed(&mut self, error: &PortError) {
        warn!("Active reminder stream delivered an error: {}", error);
        self.emit(ViewEvent::ReminderListUnavailable {
            message: error.to_string(),
        });
    }

    //=====================================================================================
    // Delete all
    //=====================================================================================

    pub fn confirm_delete_all_reminders(&self) {
        self.emit(ViewEvent::ShowDeleteAllConfirmation);
    }

    /// Expects the user to have already confirmed through the delete-all prompt.
    pub async fn delete_all_reminders(&mut self) -> PortResult<()> {
        info!("Deleting all reminders.");
        self.scheduler.cancel_all_jobs().await?;
        self.repo.delete_all_reminders().await?;
        self.emit(ViewEvent::ClearNotification {
            notification_id: None,
        });
        Ok(())
    }

    //=====================================================================================
    // Delete one
    //=====================================================================================

    pub fn confirm_delete_reminder(&mut self, reminder: &Reminder) {
        self.pending_delete = Some(reminder.handle());
        self.emit(ViewEvent::ShowDeleteConfirmation);
    }

    /// Deletes the reminder selected by `confirm_delete_reminder`, if any.
    ///
    /// With nothing pending this does nothing. On a collaborator failure the
    /// selection is kept so the confirmation can be retried.
    pub async fn delete_reminder(&mut self) -> PortResult<()> {
        let Some(pending) = self.pending_delete else {
            debug!("Delete confirmed without a pending reminder; ignoring.");
            return Ok(());
        };

        info!(reminder_id = %pending.id, "Deleting reminder.");
        self.scheduler.cancel_job(pending.external_id).await?;
        self.repo.delete_reminder(pending.id).await?;
        self.emit(ViewEvent::ClearNotification {
            notification_id: Some(pending.notification_id),
        });
        self.pending_delete = None;
        Ok(())
    }

    pub fn cancel_delete_reminder(&mut self) {
        self.pending_delete = None;
    }

    fn emit(&self, event: ViewEvent) {
        if self.events.send(event).is_err() {
            warn!("View event dropped: the view is no longer listening.");
        }
    }
}
