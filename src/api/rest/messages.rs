use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Serialize;

use crate::auth::Caller;
use crate::error::AppError;
use crate::fanout::messaging::{
    self, ConversationSummary, CreateGroupRequest, SendMessageRequest,
};
use crate::models::message::{Group, Message};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/groups", post(create_group))
        .route("/messages", post(send_message))
        .route("/conversations", get(list_conversations))
        .route("/conversations/:channel/messages", get(list_messages))
        .route("/conversations/:channel/read", post(mark_read))
}

#[derive(Serialize)]
struct MarkReadResponse {
    newly_read: usize,
}

async fn create_group(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<CreateGroupRequest>,
) -> Result<Json<Group>, AppError> {
    let group = messaging::create_group(&state, &caller, payload)?;
    Ok(Json(group))
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Json<Message>, AppError> {
    let message = messaging::send_message(&state, &caller, payload)?;
    Ok(Json(message))
}

async fn list_conversations(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Json<Vec<ConversationSummary>> {
    Json(messaging::conversations_for(&state, &caller))
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(channel): Path<String>,
) -> Result<Json<Vec<Message>>, AppError> {
    let messages = messaging::list_messages(&state, &caller, &channel)?;
    Ok(Json(messages))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(channel): Path<String>,
) -> Result<Json<MarkReadResponse>, AppError> {
    let newly_read = messaging::mark_read(&state, &caller, &channel)?;
    Ok(Json(MarkReadResponse { newly_read }))
}
