//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the reminder list client and the
//! API server.

use chrono::{DateTime, Utc};
use remind_me_core::domain::{NotificationId, Reminder};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// Shared Payloads
//=========================================================================================

/// A reminder as shown to clients. The scheduler's job id stays server-side.
#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct ReminderDto {
    pub id: Uuid,
    #[schema(value_type = i32)]
    pub notification_id: NotificationId,
    pub title: String,
    pub remind_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<&Reminder> for ReminderDto {
    fn from(reminder: &Reminder) -> Self {
        Self {
            id: reminder.id,
            notification_id: reminder.notification_id,
            title: reminder.title.clone(),
            remind_at: reminder.remind_at,
            created_at: reminder.created_at,
        }
    }
}

//=========================================================================================
// Messages Sent FROM the Client TO the Server
//=========================================================================================

/// The user intents a client forwards from the reminder list screen.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// The user picked "delete all" from the menu. The server answers with a confirmation prompt.
    DeleteAllRequested,

    /// The user accepted the delete-all prompt.
    DeleteAllConfirmed,

    /// The user asked to delete a single reminder from the list.
    DeleteRequested { reminder_id: Uuid },

    /// The user accepted the delete prompt for the selected reminder.
    DeleteConfirmed,

    /// The user dismissed the delete prompt.
    DeleteCancelled,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once after the connection opens.
    SessionInitialized { list_header: String },

    /// The full active reminder list, replacing whatever the client shows.
    ReminderList { reminders: Vec<ReminderDto> },

    Visibility {
        spinner_visible: bool,
        empty_visible: bool,
    },

    ShowDeleteAllConfirmation,

    ShowDeleteConfirmation,

    /// Clears one OS notification, or all of them when `notification_id` is null.
    ClearNotification {
        notification_id: Option<NotificationId>,
    },

    /// A reminder's time has come; the client should post an OS notification.
    ShowNotification {
        reminder_id: Uuid,
        notification_id: NotificationId,
        title: String,
    },

    /// Reports an error to the client, which should display an error message.
    Error { message: String },
}
