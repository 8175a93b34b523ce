use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::auth::Caller;
use crate::engine::tracking::{self, RecordPositionRequest};
use crate::error::AppError;
use crate::models::position::{PositionSample, RouteEstimate};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/loads/:id/positions", post(record_position))
        .route("/loads/:id/positions/latest", get(latest_position))
        .route("/loads/:id/route", get(route_estimate))
}

async fn record_position(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(load_id): Path<Uuid>,
    Json(payload): Json<RecordPositionRequest>,
) -> Result<Json<PositionSample>, AppError> {
    let sample = tracking::record_position(&state, &caller, load_id, payload)?;
    Ok(Json(sample))
}

async fn latest_position(
    State(state): State<Arc<AppState>>,
    Path(load_id): Path<Uuid>,
) -> Result<Json<PositionSample>, AppError> {
    let sample = tracking::latest(&state, load_id)?;
    Ok(Json(sample))
}

async fn route_estimate(
    State(state): State<Arc<AppState>>,
    Path(load_id): Path<Uuid>,
) -> Result<Json<RouteEstimate>, AppError> {
    let estimate = tracking::route(&state, load_id)?;
    Ok(Json(estimate))
}
