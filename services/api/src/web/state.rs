//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::adapters::FiredReminder;
use crate::config::Config;
use remind_me_core::ports::{JobRequestScheduler, ReminderRepo};
use std::sync::Arc;
use tokio::sync::broadcast;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn ReminderRepo>,
    pub scheduler: Arc<dyn JobRequestScheduler>,
    /// Fired reminder jobs; every open list session subscribes to this.
    pub notifications: broadcast::Sender<FiredReminder>,
    pub config: Arc<Config>,
}
