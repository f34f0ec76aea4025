use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use super::ApiJson;
use crate::error::{AppError, Result};
use crate::middleware::CurrentUser;
use crate::models::{ProfileUpdate, UserId, UserProfile};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/profile", get(get_profile).put(update_profile))
        .route("/account", delete(delete_account))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub token: String,
    pub user_id: UserId,
}

async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>)> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }

    let user_id = state
        .credentials
        .register(&payload.name, &payload.email, &payload.password)
        .await?;
    let token = state.tokens.issue(user_id)?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { token, user_id })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub profile_image_url: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserInfo,
}

async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let user_id = state
        .credentials
        .verify(&payload.email, &payload.password)
        .await?;
    let token = state.tokens.issue(user_id)?;
    let profile = state.directory.get_profile(user_id).await?;

    Ok(Json(LoginResponse {
        token,
        user: UserInfo {
            id: profile.id,
            name: profile.name,
            email: profile.email,
            profile_image_url: profile.profile_image_url,
            bio: profile.bio,
        },
    }))
}

async fn get_profile(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<UserProfile>> {
    Ok(Json(state.directory.get_profile(user.id).await?))
}

async fn update_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> Result<Json<UserProfile>> {
    Ok(Json(state.directory.update_profile(user.id, update).await?))
}

async fn delete_account(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<serde_json::Value>> {
    let report = state.directory.delete_account(user.id).await?;

    Ok(Json(json!({
        "message": "Account deleted successfully",
        "eventsDeleted": report.events_deleted,
        "rostersLeft": report.rosters_left,
        "notificationsDeleted": report.notifications_deleted,
    })))
}
