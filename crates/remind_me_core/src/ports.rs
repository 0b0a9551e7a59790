//! crates/remind_me_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete storage and job scheduling implementations.

use crate::domain::{JobId, NewReminder, Reminder};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, scheduler).
#[derive(Debug, Clone, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Every item is the full active-reminder collection at that point in time.
pub type ReminderStream = Pin<Box<dyn Stream<Item = PortResult<Vec<Reminder>>> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait ReminderRepo: Send + Sync {
    /// Emits the current active reminders, then again after every change.
    async fn active_reminders(&self) -> PortResult<ReminderStream>;

    /// A one-off snapshot of the active reminders, ordered by trigger time.
    async fn list_active_reminders(&self) -> PortResult<Vec<Reminder>>;

    async fn get_reminder(&self, reminder_id: Uuid) -> PortResult<Reminder>;

    async fn insert_reminder(&self, reminder: &NewReminder, external_id: JobId)
        -> PortResult<Reminder>;

    /// Replaces the content and job of an existing reminder, keeping its `created_at`.
    /// Returns `PortError::NotFound` when the reminder is gone.
    async fn update_reminder(&self, reminder: &NewReminder, external_id: JobId)
        -> PortResult<Reminder>;

    async fn delete_reminder(&self, reminder_id: Uuid) -> PortResult<()>;

    async fn delete_all_reminders(&self) -> PortResult<()>;
}

#[async_trait]
pub trait JobRequestScheduler: Send + Sync {
    /// Arms the trigger for a reminder and returns the id that references it.
    async fn schedule_job(&self, reminder: &NewReminder) -> PortResult<JobId>;

    async fn cancel_job(&self, external_id: JobId) -> PortResult<()>;

    async fn cancel_all_jobs(&self) -> PortResult<()>;
}
