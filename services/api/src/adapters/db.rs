//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `ReminderRepo` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! The active reminder streams are driven by `LISTEN reminders_changed`; a trigger on
//! the `reminders` table notifies that channel after every statement that changes it.
//! One background task per repository holds the listening connection, outside the
//! query pool, and fans every change out to the open streams through a `watch`
//! channel. Each (re)connect of that task is published as a change too, so a stream
//! never keeps showing a collection from before a lost connection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Future;
use remind_me_core::domain::{JobId, NewReminder, Reminder};
use remind_me_core::ports::{PortError, PortResult, ReminderRepo, ReminderStream};
use sqlx::postgres::PgListener;
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

const CHANGE_CHANNEL: &str = "reminders_changed";

/// Pause before listening again after the notification connection failed.
const LISTEN_RETRY_DELAY: Duration = Duration::from_secs(1);

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `ReminderRepo` port.
#[derive(Clone)]
pub struct PgReminderRepo {
    pool: PgPool,
    changes: watch::Receiver<ChangeFeed>,
}

impl PgReminderRepo {
    /// Creates a new `PgReminderRepo` and starts its change listener.
    ///
    /// The listener opens its own connection from `database_url`, so open streams
    /// never hold connections of `pool`. It stops once the repository and every
    /// stream it handed out are dropped. Must be called from within a tokio runtime.
    pub fn new(pool: PgPool, database_url: impl Into<String>) -> Self {
        let (sender, changes) = watch::channel(ChangeFeed::default());
        tokio::spawn(listen_for_changes(database_url.into(), sender));
        Self { pool, changes }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

//=========================================================================================
// Change Fan-out
//=========================================================================================

/// What the listener task publishes to the open streams.
#[derive(Debug, Clone, Default)]
struct ChangeFeed {
    revision: u64,
    /// Set while the listener is down; cleared by the next successful listen.
    listener_error: Option<PortError>,
}

fn publish(changes: &watch::Sender<ChangeFeed>, listener_error: Option<PortError>) {
    changes.send_modify(|feed| {
        feed.revision = feed.revision.wrapping_add(1);
        feed.listener_error = listener_error;
    });
}

async fn listen_for_changes(database_url: String, changes: watch::Sender<ChangeFeed>) {
    loop {
        tokio::select! {
            _ = changes.closed() => break,
            failure = follow_changes(&database_url, &changes) => {
                warn!("Lost the {} listener: {}", CHANGE_CHANNEL, failure);
                publish(&changes, Some(failure));
            }
        }
        tokio::select! {
            _ = changes.closed() => break,
            _ = tokio::time::sleep(LISTEN_RETRY_DELAY) => {}
        }
    }
    debug!("No reminder streams left; {} listener stopped.", CHANGE_CHANNEL);
}

/// Listens until the connection fails and returns why.
async fn follow_changes(database_url: &str, changes: &watch::Sender<ChangeFeed>) -> PortError {
    let mut listener = match PgListener::connect(database_url).await {
        Ok(listener) => listener,
        Err(e) => return unexpected(e),
    };
    if let Err(e) = listener.listen(CHANGE_CHANNEL).await {
        return unexpected(e);
    }
    info!("Listening on {}.", CHANGE_CHANNEL);
    // Anything that changed while nobody listened is picked up by this resync.
    publish(changes, None);

    loop {
        match listener.try_recv().await {
            Ok(Some(_)) => {
                debug!("Received {} notification.", CHANGE_CHANNEL);
                publish(changes, None);
            }
            Ok(None) => {
                return PortError::Unexpected(format!(
                    "connection listening on {} was lost",
                    CHANGE_CHANNEL
                ))
            }
            Err(e) => return unexpected(e),
        }
    }
}

/// Yields a fresh collection first and then once per published change.
fn change_driven_stream<F, Fut>(
    mut changes: watch::Receiver<ChangeFeed>,
    fetch: F,
) -> ReminderStream
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = PortResult<Vec<Reminder>>> + Send,
{
    let stream = async_stream::stream! {
        changes.borrow_and_update();
        yield fetch().await;
        while changes.changed().await.is_ok() {
            let listener_error = changes.borrow_and_update().listener_error.clone();
            match listener_error {
                Some(e) => yield Err(e),
                None => yield fetch().await,
            }
        }
    };
    Box::pin(stream)
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ReminderRecord {
    id: Uuid,
    external_id: i64,
    notification_id: i32,
    title: String,
    remind_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}
impl ReminderRecord {
    fn to_domain(self) -> Reminder {
        Reminder {
            id: self.id,
            external_id: self.external_id,
            notification_id: self.notification_id,
            title: self.title,
            remind_at: self.remind_at,
            created_at: self.created_at,
        }
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(reminder_id: Uuid) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match e {
        sqlx::Error::RowNotFound => {
            PortError::NotFound(format!("Reminder {} not found", reminder_id))
        }
        _ => unexpected(e),
    }
}

async fn fetch_active(pool: PgPool) -> PortResult<Vec<Reminder>> {
    let records = sqlx::query_as::<_, ReminderRecord>(
        "SELECT id, external_id, notification_id, title, remind_at, created_at \
         FROM reminders ORDER BY remind_at ASC",
    )
    .fetch_all(&pool)
    .await
    .map_err(unexpected)?;

    Ok(records.into_iter().map(|r| r.to_domain()).collect())
}

//=========================================================================================
// `ReminderRepo` Trait Implementation
//=========================================================================================

#[async_trait]
impl ReminderRepo for PgReminderRepo {
    async fn active_reminders(&self) -> PortResult<ReminderStream> {
        let pool = self.pool.clone();
        Ok(change_driven_stream(self.changes.clone(), move || {
            fetch_active(pool.clone())
        }))
    }

    async fn list_active_reminders(&self) -> PortResult<Vec<Reminder>> {
        fetch_active(self.pool.clone()).await
    }

    async fn get_reminder(&self, reminder_id: Uuid) -> PortResult<Reminder> {
        let record = sqlx::query_as::<_, ReminderRecord>(
            "SELECT id, external_id, notification_id, title, remind_at, created_at \
             FROM reminders WHERE id = $1",
        )
        .bind(reminder_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(reminder_id))?;
        Ok(record.to_domain())
    }

    async fn insert_reminder(
        &self,
        reminder: &NewReminder,
        external_id: JobId,
    ) -> PortResult<Reminder> {
        let record = sqlx::query_as::<_, ReminderRecord>(
            "INSERT INTO reminders (id, external_id, notification_id, title, remind_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, external_id, notification_id, title, remind_at, created_at",
        )
        .bind(reminder.id)
        .bind(external_id)
        .bind(reminder.notification_id)
        .bind(&reminder.title)
        .bind(reminder.remind_at)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn update_reminder(
        &self,
        reminder: &NewReminder,
        external_id: JobId,
    ) -> PortResult<Reminder> {
        let record = sqlx::query_as::<_, ReminderRecord>(
            "UPDATE reminders SET external_id = $2, title = $3, remind_at = $4 \
             WHERE id = $1 \
             RETURNING id, external_id, notification_id, title, remind_at, created_at",
        )
        .bind(reminder.id)
        .bind(external_id)
        .bind(&reminder.title)
        .bind(reminder.remind_at)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(reminder.id))?;
        Ok(record.to_domain())
    }

    async fn delete_reminder(&self, reminder_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM reminders WHERE id = $1")
            .bind(reminder_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            debug!("Reminder {} was already deleted.", reminder_id);
        }
        Ok(())
    }

    async fn delete_all_reminders(&self) -> PortResult<()> {
        sqlx::query("DELETE FROM reminders")
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_stream(
        changes: &watch::Sender<ChangeFeed>,
        fetches: &Arc<AtomicUsize>,
    ) -> ReminderStream {
        let fetches = fetches.clone();
        change_driven_stream(changes.subscribe(), move || {
            let fetches = fetches.clone();
            async move {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            }
        })
    }

    #[tokio::test]
    async fn every_stream_refetches_on_a_change() {
        let (changes, _keep) = watch::channel(ChangeFeed::default());
        let fetches = Arc::new(AtomicUsize::new(0));
        let mut streams: Vec<_> = (0..12).map(|_| counting_stream(&changes, &fetches)).collect();

        for stream in &mut streams {
            assert!(stream.next().await.unwrap().is_ok());
        }
        publish(&changes, None);
        for stream in &mut streams {
            assert!(stream.next().await.unwrap().is_ok());
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 24);
    }

    #[tokio::test]
    async fn lost_listener_is_reported_then_resynced() {
        let (changes, _keep) = watch::channel(ChangeFeed::default());
        let fetches = Arc::new(AtomicUsize::new(0));
        let mut stream = counting_stream(&changes, &fetches);
        stream.next().await.unwrap().unwrap();

        publish(
            &changes,
            Some(PortError::Unexpected("connection lost".to_string())),
        );
        assert!(matches!(
            stream.next().await,
            Some(Err(PortError::Unexpected(_)))
        ));
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        publish(&changes, None);
        assert!(stream.next().await.unwrap().is_ok());
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stream_ends_when_the_listener_is_gone() {
        let (changes, _keep) = watch::channel(ChangeFeed::default());
        let fetches = Arc::new(AtomicUsize::new(0));
        let mut stream = counting_stream(&changes, &fetches);
        stream.next().await.unwrap().unwrap();

        drop(changes);
        assert!(stream.next().await.is_none());
    }

    //=====================================================================================
    // Against a live database
    //=====================================================================================

    fn database_url() -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/remind_me".into())
    }

    async fn small_pool_repo(max_connections: u32) -> PgReminderRepo {
        let url = database_url();
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&url)
            .await
            .unwrap();
        let repo = PgReminderRepo::new(pool, url);
        repo.run_migrations().await.unwrap();
        repo
    }

    async fn next_with_timeout(stream: &mut ReminderStream) -> PortResult<Vec<Reminder>> {
        tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    #[ignore = "needs a PostgreSQL database in DATABASE_URL"]
    async fn open_streams_leave_the_pool_free() {
        let repo = small_pool_repo(2).await;
        let mut streams = Vec::new();
        for _ in 0..6 {
            streams.push(repo.active_reminders().await.unwrap());
        }
        for stream in &mut streams {
            next_with_timeout(stream).await.unwrap();
        }

        let reminder = NewReminder::new("water the plants", Utc::now());
        let stored = repo.insert_reminder(&reminder, 1).await.unwrap();
        repo.delete_reminder(stored.id).await.unwrap();
        assert!(!repo.list_active_reminders().await.unwrap().contains(&stored));
    }

    #[tokio::test]
    #[ignore = "needs a PostgreSQL database in DATABASE_URL"]
    async fn changes_made_while_the_listener_was_down_are_delivered() {
        let repo = small_pool_repo(2).await;
        let mut stream = repo.active_reminders().await.unwrap();
        // Initial fetch, then the resync once the listener is up.
        next_with_timeout(&mut stream).await.unwrap();
        next_with_timeout(&mut stream).await.unwrap();

        sqlx::query(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
             WHERE query ILIKE 'LISTEN%' AND pid <> pg_backend_pid()",
        )
        .execute(&repo.pool)
        .await
        .unwrap();
        let reminder = NewReminder::new("call the bank", Utc::now());
        let stored = repo.insert_reminder(&reminder, 1).await.unwrap();

        let mut latest = next_with_timeout(&mut stream).await;
        while !matches!(&latest, Ok(list) if list.contains(&stored)) {
            latest = next_with_timeout(&mut stream).await;
        }
        repo.delete_reminder(stored.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "needs a PostgreSQL database in DATABASE_URL"]
    async fn update_keeps_created_at_and_missing_rows_are_not_found() {
        let repo = small_pool_repo(2).await;
        let stored = repo
            .insert_reminder(&NewReminder::new("renew passport", Utc::now()), 1)
            .await
            .unwrap();

        let edited = stored.edited("renew passport today", Utc::now());
        let updated = repo.update_reminder(&edited, 2).await.unwrap();
        assert_eq!(updated.external_id, 2);
        assert_eq!(updated.created_at, stored.created_at);
        assert_eq!(repo.get_reminder(stored.id).await.unwrap(), updated);

        let missing = NewReminder::new("ghost", Utc::now());
        assert!(matches!(
            repo.update_reminder(&missing, 3).await,
            Err(PortError::NotFound(_))
        ));
        repo.delete_reminder(stored.id).await.unwrap();
    }
}
