//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a reminder list WebSocket
//! connection. The connection's task is the only owner of its session, so list
//! deliveries, view-model events and client intents are handled one at a time.

use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    session::ReminderListSession,
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use rand::seq::IndexedRandom;
use remind_me_core::ports::PortError;
use remind_me_core::subscription::ReminderListSubscription;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Wait before subscribing again once the active reminder subscription has ended.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    info!("New reminder list connection established.");
    let (sender, receiver) = socket.split();
    run_session(sender, receiver, app_state).await;
}

/// Drives one reminder list session over any frame sink and source.
async fn run_session<S, R>(mut sender: S, mut receiver: R, app_state: Arc<AppState>)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let (mut session, mut events) =
        ReminderListSession::new(app_state.repo.clone(), app_state.scheduler.clone());
    let (mut subscription, mut lists) = ReminderListSubscription::spawn(app_state.repo.clone());
    let mut lists_open = true;
    let resubscribe = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(resubscribe);
    let mut fired = app_state.notifications.subscribe();
    let mut fired_open = true;

    // --- 1. Initialization Phase ---
    let init_msg = ServerMessage::SessionInitialized {
        list_header: pick_list_header(&app_state.config.list_headers),
    };
    if send_message(&mut sender, &init_msg).await.is_err()
        || send_message(&mut sender, &session.visibility_message())
            .await
            .is_err()
    {
        error!("Failed to send session initialized message.");
        return;
    }

    // --- 2. Main Message Loop ---
    loop {
        let outgoing: Vec<ServerMessage> = tokio::select! {
            update = lists.recv(), if lists_open => match update {
                Some(update) => session.apply_list_update(update),
                None => {
                    warn!(
                        "Reminder list subscription ended; subscribing again in {:?}.",
                        RESUBSCRIBE_DELAY
                    );
                    lists_open = false;
                    resubscribe.as_mut().reset(Instant::now() + RESUBSCRIBE_DELAY);
                    Vec::new()
                }
            },
            () = &mut resubscribe, if !lists_open => {
                (subscription, lists) = ReminderListSubscription::spawn(app_state.repo.clone());
                lists_open = true;
                Vec::new()
            }
            Some(event) = events.recv() => vec![ReminderListSession::render_event(event)],
            fired_reminder = fired.recv(), if fired_open => match fired_reminder {
                Ok(fired_reminder) => vec![ReminderListSession::render_fired(fired_reminder)],
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Connection lagged behind and missed {} notifications.", skipped);
                    Vec::new()
                }
                Err(RecvError::Closed) => {
                    fired_open = false;
                    Vec::new()
                }
            },
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => handle_text_message(text.as_str(), &mut session).await,
                Some(Ok(Message::Close(_))) => {
                    info!("Client sent close message.");
                    break;
                }
                Some(Ok(_)) => Vec::new(),
                Some(Err(e)) => {
                    warn!("WebSocket receive failed: {}", e);
                    break;
                }
                None => {
                    info!("Client disconnected.");
                    break;
                }
            },
        };

        for msg in &outgoing {
            if let Err(e) = send_message(&mut sender, msg).await {
                error!("Failed to send message to client: {}", e);
                subscription.cancel();
                return;
            }
        }
    }

    // --- 3. Cleanup ---
    subscription.cancel();
    info!("Reminder list connection closed.");
}

/// Routes one text frame. Returns an error message for the client when the intent failed.
async fn handle_text_message(text: &str, session: &mut ReminderListSession) -> Vec<ServerMessage> {
    let client_msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            return Vec::new();
        }
    };

    match session.handle_client_message(client_msg).await {
        Ok(()) => Vec::new(),
        Err(e) => {
            error!("Failed to handle client intent: {}", e);
            vec![ServerMessage::Error {
                message: e.to_string(),
            }]
        }
    }
}

async fn send_message<S>(sender: &mut S, msg: &ServerMessage) -> Result<(), PortError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let json = serde_json::to_string(msg).map_err(|e| PortError::Unexpected(e.to_string()))?;
    sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))
}

fn pick_list_header(headers: &[String]) -> String {
    headers.choose(&mut rand::rng()).cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FiredReminder, InMemoryReminderRepo, TokioJobScheduler};
    use crate::config::{parse_list_headers, Config};
    use crate::web::protocol::ReminderDto;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use futures::channel::mpsc;
    use remind_me_core::domain::{JobId, NewReminder, Reminder};
    use remind_me_core::ports::{PortResult, ReminderRepo, ReminderStream};
    use remind_me_core::usecases::create_reminder;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::task::JoinHandle;
    use tracing::Level;
    use uuid::Uuid;

    /// The in-memory store, except that opening the stream fails a set number of times.
    struct FlakyRepo {
        inner: InMemoryReminderRepo,
        open_failures: AtomicUsize,
    }

    #[async_trait]
    impl ReminderRepo for FlakyRepo {
        async fn active_reminders(&self) -> PortResult<ReminderStream> {
            let failed = self
                .open_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(PortError::Unexpected("too many connections".to_string()));
            }
            self.inner.active_reminders().await
        }

        async fn list_active_reminders(&self) -> PortResult<Vec<Reminder>> {
            self.inner.list_active_reminders().await
        }

        async fn get_reminder(&self, reminder_id: Uuid) -> PortResult<Reminder> {
            self.inner.get_reminder(reminder_id).await
        }

        async fn insert_reminder(
            &self,
            reminder: &NewReminder,
            external_id: JobId,
        ) -> PortResult<Reminder> {
            self.inner.insert_reminder(reminder, external_id).await
        }

        async fn update_reminder(
            &self,
            reminder: &NewReminder,
            external_id: JobId,
        ) -> PortResult<Reminder> {
            self.inner.update_reminder(reminder, external_id).await
        }

        async fn delete_reminder(&self, reminder_id: Uuid) -> PortResult<()> {
            self.inner.delete_reminder(reminder_id).await
        }

        async fn delete_all_reminders(&self) -> PortResult<()> {
            self.inner.delete_all_reminders().await
        }
    }

    fn app_state(repo: Arc<dyn ReminderRepo>) -> Arc<AppState> {
        let scheduler = Arc::new(TokioJobScheduler::new());
        Arc::new(AppState {
            repo,
            notifications: scheduler.notifications(),
            scheduler,
            config: Arc::new(Config {
                bind_address: "127.0.0.1:0".parse().unwrap(),
                database_url: None,
                log_level: Level::INFO,
                cors_origin: "http://localhost:3000".to_string(),
                list_headers: vec!["Coming up".to_string()],
            }),
        })
    }

    struct Client {
        outbound: mpsc::UnboundedReceiver<Message>,
        inbound: mpsc::UnboundedSender<Result<Message, axum::Error>>,
        session: JoinHandle<()>,
    }

    fn connect(state: Arc<AppState>) -> Client {
        let (out_tx, outbound) = mpsc::unbounded();
        let (inbound, in_rx) = mpsc::unbounded();
        let session = tokio::spawn(run_session(out_tx, in_rx, state));
        Client {
            outbound,
            inbound,
            session,
        }
    }

    impl Client {
        async fn next(&mut self) -> Value {
            let frame = tokio::time::timeout(Duration::from_secs(5), self.outbound.next())
                .await
                .unwrap()
                .unwrap();
            match frame {
                Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
                other => panic!("unexpected frame {:?}", other),
            }
        }

        /// Skips everything until a message of the given type arrives.
        async fn next_of_type(&mut self, kind: &str) -> Value {
            loop {
                let msg = self.next().await;
                if msg["type"] == kind {
                    return msg;
                }
            }
        }

        /// Waits until every expected message has arrived, in any order.
        async fn expect_all(&mut self, mut expected: Vec<Value>) {
            while !expected.is_empty() {
                let msg = self.next().await;
                expected.retain(|e| *e != msg);
            }
        }

        fn send(&self, msg: Value) {
            self.inbound
                .unbounded_send(Ok(Message::Text(msg.to_string().into())))
                .unwrap();
        }
    }

    fn wire(msg: ServerMessage) -> Value {
        serde_json::to_value(msg).unwrap()
    }

    #[tokio::test]
    async fn session_renders_the_list_and_runs_a_delete() {
        let state = app_state(Arc::new(InMemoryReminderRepo::new()));
        let reminder = create_reminder(
            state.repo.as_ref(),
            state.scheduler.as_ref(),
            "pay rent",
            Utc::now() + ChronoDuration::hours(1),
        )
        .await
        .unwrap();
        let mut client = connect(state.clone());

        assert_eq!(
            client.next().await,
            json!({ "type": "session_initialized", "list_header": "Coming up" })
        );
        assert_eq!(
            client.next().await,
            json!({ "type": "visibility", "spinner_visible": true, "empty_visible": false })
        );
        assert_eq!(
            client.next().await,
            wire(ServerMessage::ReminderList {
                reminders: vec![ReminderDto::from(&reminder)]
            })
        );
        assert_eq!(
            client.next().await,
            json!({ "type": "visibility", "spinner_visible": false, "empty_visible": false })
        );

        client.send(json!({ "type": "delete_requested", "reminder_id": reminder.id }));
        client.next_of_type("show_delete_confirmation").await;
        client.send(json!({ "type": "delete_confirmed" }));
        client
            .expect_all(vec![
                wire(ServerMessage::ClearNotification {
                    notification_id: Some(reminder.notification_id),
                }),
                wire(ServerMessage::ReminderList { reminders: vec![] }),
                json!({ "type": "visibility", "spinner_visible": false, "empty_visible": true }),
            ])
            .await;
        assert!(state.repo.list_active_reminders().await.unwrap().is_empty());

        client
            .inbound
            .unbounded_send(Ok(Message::Close(None)))
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), client.session)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn malformed_frames_are_ignored() {
        let state = app_state(Arc::new(InMemoryReminderRepo::new()));
        let mut client = connect(state);
        client.next_of_type("reminder_list").await;

        client.send(json!({ "type": "self_destruct" }));
        client.send(json!({ "type": "delete_all_requested" }));
        assert_eq!(
            client.next_of_type("show_delete_all_confirmation").await,
            json!({ "type": "show_delete_all_confirmation" })
        );
    }

    #[tokio::test]
    async fn fired_reminders_reach_the_client() {
        let state = app_state(Arc::new(InMemoryReminderRepo::new()));
        let mut client = connect(state.clone());
        client.next_of_type("session_initialized").await;

        let reminder_id = Uuid::new_v4();
        state
            .notifications
            .send(FiredReminder {
                reminder_id,
                notification_id: 4,
                title: "stand up".to_string(),
            })
            .unwrap();

        assert_eq!(
            client.next_of_type("show_notification").await,
            json!({
                "type": "show_notification",
                "reminder_id": reminder_id,
                "notification_id": 4,
                "title": "stand up"
            })
        );
    }

    #[tokio::test]
    async fn ended_subscription_is_opened_again() {
        let repo = Arc::new(FlakyRepo {
            inner: InMemoryReminderRepo::new(),
            open_failures: AtomicUsize::new(1),
        });
        let mut client = connect(app_state(repo));

        client.next_of_type("error").await;
        assert_eq!(
            client.next_of_type("reminder_list").await,
            wire(ServerMessage::ReminderList { reminders: vec![] })
        );
        assert_eq!(
            client.next().await,
            json!({ "type": "visibility", "spinner_visible": false, "empty_visible": true })
        );
    }

    #[test]
    fn list_header_comes_from_the_configured_set() {
        let headers = parse_list_headers(Some("a|b"));
        for _ in 0..16 {
            assert!(headers.contains(&pick_list_header(&headers)));
        }
        assert_eq!(pick_list_header(&[]), "");
    }
}
