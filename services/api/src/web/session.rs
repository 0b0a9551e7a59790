//! services/api/src/web/session.rs
//!
//! The server-side half of a reminder list screen. A session owns one view-model and
//! the list the client last rendered, turns client intents into view-model calls, and
//! renders view-model output as `ServerMessage`s.

use crate::adapters::FiredReminder;
use crate::web::protocol::{ClientMessage, ReminderDto, ServerMessage};
use remind_me_core::domain::Reminder;
use remind_me_core::events::{ListVisibility, ViewEvent, ViewEvents};
use remind_me_core::ports::{JobRequestScheduler, PortResult, ReminderRepo};
use remind_me_core::view_model::ReminderListViewModel;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ReminderListSession {
    view_model: ReminderListViewModel,
    reminders: Vec<Reminder>,
}

impl ReminderListSession {
    pub fn new(
        repo: Arc<dyn ReminderRepo>,
        scheduler: Arc<dyn JobRequestScheduler>,
    ) -> (Self, ViewEvents) {
        let (view_model, events) = ReminderListViewModel::new(repo, scheduler);
        let session = Self {
            view_model,
            reminders: Vec::new(),
        };
        (session, events)
    }

    pub fn visibility_message(&self) -> ServerMessage {
        visibility_message(self.view_model.current_visibility())
    }

    /// Applies one delivery from the active reminder subscription.
    ///
    /// A failed delivery renders nothing directly; the view-model reports it as an event.
    pub fn apply_list_update(&mut self, update: PortResult<Vec<Reminder>>) -> Vec<ServerMessage> {
        match update {
            Ok(reminders) => {
                self.view_model.reminder_list_updated(&reminders);
                let list = ServerMessage::ReminderList {
                    reminders: reminders.iter().map(ReminderDto::from).collect(),
                };
                self.reminders = reminders;
                vec![list, self.visibility_message()]
            }
            Err(e) => {
                self.view_model.reminder_list_failed(&e);
                Vec::new()
            }
        }
    }

    pub async fn handle_client_message(&mut self, msg: ClientMessage) -> PortResult<()> {
        debug!(?msg, "Handling client intent.");
        match msg {
            ClientMessage::DeleteAllRequested => self.view_model.confirm_delete_all_reminders(),
            ClientMessage::DeleteAllConfirmed => self.view_model.delete_all_reminders().await?,
            ClientMessage::DeleteRequested { reminder_id } => {
                match self.reminders.iter().find(|r| r.id == reminder_id) {
                    Some(reminder) => self.view_model.confirm_delete_reminder(reminder),
                    None => warn!(
                        "Delete requested for reminder {} which is not in the list.",
                        reminder_id
                    ),
                }
            }
            ClientMessage::DeleteConfirmed => self.view_model.delete_reminder().await?,
            ClientMessage::DeleteCancelled => self.view_model.cancel_delete_reminder(),
        }
        Ok(())
    }

    pub fn render_event(event: ViewEvent) -> ServerMessage {
        match event {
            ViewEvent::ShowDeleteAllConfirmation => ServerMessage::ShowDeleteAllConfirmation,
            ViewEvent::ShowDeleteConfirmation => ServerMessage::ShowDeleteConfirmation,
            ViewEvent::ClearNotification { notification_id } => {
                ServerMessage::ClearNotification { notification_id }
            }
            ViewEvent::ReminderListUnavailable { message } => ServerMessage::Error {
                message: format!("Could not load reminders: {}", message),
            },
        }
    }

    pub fn render_fired(fired: FiredReminder) -> ServerMessage {
        ServerMessage::ShowNotification {
            reminder_id: fired.reminder_id,
            notification_id: fired.notification_id,
            title: fired.title,
        }
    }
}

fn visibility_message(visibility: ListVisibility) -> ServerMessage {
    ServerMessage::Visibility {
        spinner_visible: visibility.spinner_visible(),
        empty_visible: visibility.empty_visible(),
    }
}
