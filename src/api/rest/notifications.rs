use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::auth::Caller;
use crate::error::AppError;
use crate::fanout;
use crate::models::notification::Notification;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/:id/read", post(mark_read))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Json<Vec<Notification>> {
    Json(fanout::feed(&state, caller.user_id))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    let notification = fanout::mark_notification_read(&state, caller.user_id, id)?;
    Ok(Json(notification))
}
