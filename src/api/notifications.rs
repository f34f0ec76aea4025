use axum::{extract::State, routing::get, Json, Router};

use crate::error::Result;
use crate::middleware::CurrentUser;
use crate::models::Notification;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(list_notifications))
}

async fn list_notifications(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<Notification>>> {
    Ok(Json(state.notifications.list_for(user.id).await?))
}
