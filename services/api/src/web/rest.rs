//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::{protocol::ReminderDto, state::AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use remind_me_core::ports::PortError;
use remind_me_core::usecases::{create_reminder, update_reminder};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        create_reminder_handler,
        list_reminders_handler,
        get_reminder_handler,
        update_reminder_handler,
    ),
    components(
        schemas(ReminderRequest, ReminderDto)
    ),
    tags(
        (name = "RemindMe API", description = "API endpoints for scheduling, editing and listing reminders.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Payload Structs
//=========================================================================================

/// The payload for scheduling a new reminder or rescheduling an existing one.
#[derive(Deserialize, ToSchema)]
pub struct ReminderRequest {
    pub title: String,
    pub remind_at: DateTime<Utc>,
}

/// Maps a port failure onto a status code and a message safe to show to clients.
fn port_error_response(e: PortError) -> (StatusCode, String) {
    match e {
        PortError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        PortError::Unexpected(msg) => {
            error!("Reminder request failed: {}", msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Schedule a new reminder.
///
/// The reminder shows up in every open reminder list and fires a notification at `remind_at`.
#[utoipa::path(
    post,
    path = "/reminders",
    request_body = ReminderRequest,
    responses(
        (status = 201, description = "Reminder scheduled", body = ReminderDto),
        (status = 400, description = "Bad request (e.g., empty title)"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_reminder_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<ReminderRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let reminder = create_reminder(
        app_state.repo.as_ref(),
        app_state.scheduler.as_ref(),
        &req.title,
        req.remind_at,
    )
    .await
    .map_err(port_error_response)?;

    Ok((StatusCode::CREATED, Json(ReminderDto::from(&reminder))))
}

/// List the active reminders, soonest first.
#[utoipa::path(
    get,
    path = "/reminders",
    responses(
        (status = 200, description = "Active reminders", body = [ReminderDto]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_reminders_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<ReminderDto>>, (StatusCode, String)> {
    let reminders = app_state
        .repo
        .list_active_reminders()
        .await
        .map_err(port_error_response)?;

    Ok(Json(reminders.iter().map(ReminderDto::from).collect()))
}

/// Fetch one reminder, e.g. to fill an edit form.
#[utoipa::path(
    get,
    path = "/reminders/{id}",
    params(("id" = Uuid, Path, description = "The reminder's id")),
    responses(
        (status = 200, description = "The reminder", body = ReminderDto),
        (status = 404, description = "No such reminder"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_reminder_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReminderDto>, (StatusCode, String)> {
    let reminder = app_state
        .repo
        .get_reminder(id)
        .await
        .map_err(port_error_response)?;

    Ok(Json(ReminderDto::from(&reminder)))
}

/// Change a reminder's title and trigger time.
///
/// The reminder's job is replaced, so it fires at the new `remind_at` only.
#[utoipa::path(
    put,
    path = "/reminders/{id}",
    params(("id" = Uuid, Path, description = "The reminder's id")),
    request_body = ReminderRequest,
    responses(
        (status = 200, description = "Reminder rescheduled", body = ReminderDto),
        (status = 400, description = "Bad request (e.g., empty title)"),
        (status = 404, description = "No such reminder"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn update_reminder_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReminderRequest>,
) -> Result<Json<ReminderDto>, (StatusCode, String)> {
    let reminder = update_reminder(
        app_state.repo.as_ref(),
        app_state.scheduler.as_ref(),
        id,
        &req.title,
        req.remind_at,
    )
    .await
    .map_err(port_error_response)?;

    Ok(Json(ReminderDto::from(&reminder)))
}
