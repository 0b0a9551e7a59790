//! crates/remind_me_core/src/events.rs
//!
//! The observable state and the fire-once events the view-model publishes to its view.

use crate::domain::NotificationId;
use tokio::sync::mpsc;

/// Which of the three mutually exclusive list states the view should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListVisibility {
    /// No collection has been delivered yet.
    #[default]
    Loading,
    /// The last delivered collection was empty.
    Empty,
    Populated,
}

impl ListVisibility {
    pub fn spinner_visible(self) -> bool {
        self == ListVisibility::Loading
    }

    pub fn empty_visible(self) -> bool {
        self == ListVisibility::Empty
    }
}

/// One-shot requests from the view-model to its view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    ShowDeleteAllConfirmation,
    ShowDeleteConfirmation,
    /// `None` clears every notification.
    ClearNotification {
        notification_id: Option<NotificationId>,
    },
    /// The active-reminder stream delivered an error instead of a collection.
    ReminderListUnavailable { message: String },
}

/// The single consumer end of a view-model's event channel.
pub type ViewEvents = mpsc::UnboundedReceiver<ViewEvent>;
