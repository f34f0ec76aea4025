use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use super::{ApiJson, ApiPath};
use crate::error::Result;
use crate::middleware::CurrentUser;
use crate::models::{Event, EventId, EventUpdate, NewEvent, UserId};
use crate::services::catalog::{EventDetail, EventListing, OrganizerProfile, UserEvents};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_events).post(create_event))
        .route("/categories", get(list_categories))
        .route("/cities", get(list_cities))
        .route("/category/:category", get(events_by_category))
        .route("/user/events", get(user_events))
        .route("/organizer/:id", get(organizer_profile))
        .route(
            "/:id",
            get(get_event).put(update_event).delete(delete_event),
        )
        .route("/:id/join", post(join_event))
        .route("/:id/leave", post(leave_event))
}

async fn list_events(State(state): State<AppState>) -> Result<Json<Vec<EventListing>>> {
    Ok(Json(state.catalog.list_public().await?))
}

async fn create_event(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(data): ApiJson<NewEvent>,
) -> Result<(StatusCode, Json<Event>)> {
    let event = state.roster.create_event(user.id, data).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

async fn get_event(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<EventId>,
) -> Result<Json<EventDetail>> {
    Ok(Json(state.catalog.event_detail(id).await?))
}

async fn update_event(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<EventId>,
    ApiJson(update): ApiJson<EventUpdate>,
) -> Result<Json<Event>> {
    Ok(Json(state.roster.update_event(id, user.id, update).await?))
}

async fn delete_event(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<EventId>,
) -> Result<Json<serde_json::Value>> {
    state.roster.delete_event(id, user.id).await?;
    Ok(Json(json!({ "message": "Event deleted successfully" })))
}

async fn join_event(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<EventId>,
) -> Result<Json<serde_json::Value>> {
    let event = state.roster.join(id, user.id).await?;
    Ok(Json(json!({
        "message": "Successfully joined event",
        "event": event,
    })))
}

async fn leave_event(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<EventId>,
) -> Result<Json<serde_json::Value>> {
    let event = state.roster.leave(id, user.id).await?;
    Ok(Json(json!({
        "message": "Successfully left event",
        "event": event,
    })))
}

async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.catalog.categories().await?))
}

async fn events_by_category(
    State(state): State<AppState>,
    ApiPath(category): ApiPath<String>,
) -> Result<Json<Vec<EventListing>>> {
    Ok(Json(state.catalog.by_category(&category).await?))
}

async fn list_cities(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.catalog.cities().await?))
}

async fn user_events(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<UserEvents>> {
    Ok(Json(state.catalog.user_events(user.id).await?))
}

async fn organizer_profile(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UserId>,
) -> Result<Json<OrganizerProfile>> {
    Ok(Json(state.catalog.organizer_profile(id).await?))
}
