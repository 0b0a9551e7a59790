//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{InMemoryReminderRepo, PgReminderRepo, TokioJobScheduler},
    config::Config,
    error::ApiError,
    web::{
        create_reminder_handler, get_reminder_handler, list_reminders_handler, rest::ApiDoc,
        state::AppState, update_reminder_handler, ws_handler,
    },
};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::{routing::get, Router};
use remind_me_core::ports::ReminderRepo;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to the Reminder Store ---
    let repo: Arc<dyn ReminderRepo> = match &config.database_url {
        Some(database_url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let pg_repo = PgReminderRepo::new(db_pool, database_url.clone());
            info!("Running database migrations...");
            pg_repo.run_migrations().await?;
            info!("Database migrations complete.");
            Arc::new(pg_repo)
        }
        None => {
            warn!("DATABASE_URL is not set; reminders will only be kept in memory.");
            Arc::new(InMemoryReminderRepo::new())
        }
    };

    // --- 3. Start the Job Scheduler ---
    let scheduler = Arc::new(TokioJobScheduler::new());
    let existing = repo.list_active_reminders().await?;
    scheduler.restore_jobs(&existing);

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        repo,
        notifications: scheduler.notifications(),
        scheduler,
        config: config.clone(),
    });

    let cors_origin = config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("Invalid CORS origin: {}", e)))?;
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    let api_router = Router::new()
        .route(
            "/reminders",
            get(list_reminders_handler).post(create_reminder_handler),
        )
        .route(
            "/reminders/{id}",
            get(get_reminder_handler).put(update_reminder_handler),
        )
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
