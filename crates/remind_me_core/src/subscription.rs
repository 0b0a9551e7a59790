//! crates/remind_me_core/src/subscription.rs
//!
//! Hands the active-reminder stream off from the task that produces it to the
//! single task that owns a view-model.

use crate::domain::Reminder;
use crate::ports::{PortResult, ReminderRepo};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Deliveries buffered between the producer and the consumer.
const DELIVERY_BUFFER: usize = 8;

pub type ReminderListReceiver = mpsc::Receiver<PortResult<Vec<Reminder>>>;

/// A running subscription to the repository's active reminders.
///
/// The producer stops when the subscription is cancelled or dropped, when the
/// stream ends, or when the receiver goes away.
pub struct ReminderListSubscription {
    token: CancellationToken,
}

impl ReminderListSubscription {
    /// Spawns the producer task. Must be called from within a tokio runtime.
    pub fn spawn(repo: Arc<dyn ReminderRepo>) -> (Self, ReminderListReceiver) {
        let (tx, rx) = mpsc::channel(DELIVERY_BUFFER);
        let token = CancellationToken::new();
        tokio::spawn(forward_reminders(repo, tx, token.clone()));
        (Self { token }, rx)
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Drop for ReminderListSubscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn forward_reminders(
    repo: Arc<dyn ReminderRepo>,
    tx: mpsc::Sender<PortResult<Vec<Reminder>>>,
    token: CancellationToken,
) {
    let mut stream = match repo.active_reminders().await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to open the active reminder stream: {}", e);
            // The consumer decides what to show; the subscription itself is over.
            let _ = tx.send(Err(e)).await;
            return;
        }
    };
    info!("Active reminder subscription started.");

    loop {
        let item = tokio::select! {
            _ = token.cancelled() => {
                debug!("Active reminder subscription cancelled.");
                return;
            }
            item = stream.next() => item,
        };

        let Some(item) = item else {
            info!("Active reminder stream ended.");
            return;
        };

        let sent = tokio::select! {
            _ = token.cancelled() => return,
            sent = tx.send(item) => sent,
        };
        if sent.is_err() {
            debug!("Reminder list consumer is gone; stopping subscription.");
            return;
        }
    }
}
