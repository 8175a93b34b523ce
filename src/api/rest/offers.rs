use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::auth::Caller;
use crate::engine::assignment::{self, OfferRequest, RejectRequest};
use crate::error::AppError;
use crate::models::assignment::AssignmentView;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/loads/:id/offers", post(create_offer).get(list_offers))
        .route("/offers/:id", get(get_offer))
        .route("/offers/:id/accept", post(accept_offer))
        .route("/offers/:id/reject", post(reject_offer))
}

async fn create_offer(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(load_id): Path<Uuid>,
    Json(payload): Json<OfferRequest>,
) -> Result<Json<AssignmentView>, AppError> {
    let view = assignment::offer(&state, &caller, load_id, payload).await?;
    Ok(Json(view))
}

async fn list_offers(
    State(state): State<Arc<AppState>>,
    Path(load_id): Path<Uuid>,
) -> Result<Json<Vec<AssignmentView>>, AppError> {
    let views = assignment::list_for_load(&state, load_id).await?;
    Ok(Json(views))
}

async fn get_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AssignmentView>, AppError> {
    let view = assignment::get(&state, id).await?;
    Ok(Json(view))
}

async fn accept_offer(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<AssignmentView>, AppError> {
    let view = assignment::accept(&state, &caller, id).await?;
    Ok(Json(view))
}

async fn reject_offer(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    payload: Option<Json<RejectRequest>>,
) -> Result<Json<AssignmentView>, AppError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let view = assignment::reject(&state, &caller, id, request).await?;
    Ok(Json(view))
}
