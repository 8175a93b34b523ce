use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::Caller;
use crate::engine::lifecycle::{self, AdvanceRequest};
use crate::error::AppError;
use crate::models::load::{Financials, Load, Location, StatusEntry};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/loads", post(create_load).get(list_loads))
        .route("/loads/:id", get(get_load))
        .route("/loads/:id/history", get(get_history))
        .route("/loads/:id/advance", post(advance_load))
        .route("/loads/:id/cancel", post(cancel_load))
        .route("/loads/:id/watch", post(watch_load))
}

#[derive(Deserialize)]
pub struct CreateLoadRequest {
    pub origin: Location,
    pub destination: Location,
    pub pickup_at: Option<DateTime<Utc>>,
    pub delivery_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub financials: Financials,
}

#[derive(Deserialize, Default)]
pub struct CancelRequest {
    pub note: Option<String>,
}

async fn create_load(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<CreateLoadRequest>,
) -> Result<Json<Load>, AppError> {
    caller.require_dispatch()?;

    if payload.origin.address.trim().is_empty() || payload.destination.address.trim().is_empty() {
        return Err(AppError::BadRequest(
            "origin and destination addresses are required".to_string(),
        ));
    }

    let load = Load::new(
        payload.origin,
        payload.destination,
        payload.pickup_at,
        payload.delivery_at,
        payload.financials,
    );

    // The creating dispatcher watches the load by default.
    state
        .watchers
        .insert(load.id, HashSet::from([caller.user_id]));
    state.loads.insert(load.id, load.clone());
    state.metrics.active_loads.inc();

    Ok(Json(load))
}

async fn list_loads(State(state): State<Arc<AppState>>) -> Json<Vec<Load>> {
    let mut loads: Vec<Load> = state
        .loads
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    loads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(loads)
}

async fn get_load(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Load>, AppError> {
    let load = state
        .loads
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("load {id} not found")))?;
    Ok(Json(load.value().clone()))
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<StatusEntry>>, AppError> {
    let load = state
        .loads
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("load {id} not found")))?;
    Ok(Json(load.status_history.clone()))
}

async fn advance_load(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdvanceRequest>,
) -> Result<Json<Load>, AppError> {
    let load = lifecycle::advance(&state, &caller, id, payload).await?;
    Ok(Json(load))
}

async fn cancel_load(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<Load>, AppError> {
    let load = lifecycle::cancel(&state, &caller, id, payload.note).await?;
    Ok(Json(load))
}

async fn watch_load(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Uuid>>, AppError> {
    caller.require_dispatch()?;

    if !state.loads.contains_key(&id) {
        return Err(AppError::NotFound(format!("load {id} not found")));
    }

    let mut watchers = state.watchers.entry(id).or_default();
    watchers.insert(caller.user_id);
    Ok(Json(watchers.iter().copied().collect()))
}
