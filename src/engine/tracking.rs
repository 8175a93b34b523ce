use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::auth::Caller;
use crate::error::AppError;
use crate::geo;
use crate::models::position::{GeoPoint, PositionSample, RouteEstimate};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RecordPositionRequest {
    pub lat: f64,
    pub lng: f64,
    pub speed_mph: Option<f64>,
    pub heading_deg: Option<f64>,
    pub accuracy_m: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

/// Accepts a GPS fix from the bound driver while the load is en route.
/// Samples may arrive out of order or be resent; both are tolerated.
pub fn record_position(
    state: &AppState,
    caller: &Caller,
    load_id: Uuid,
    request: RecordPositionRequest,
) -> Result<PositionSample, AppError> {
    let load = state
        .loads
        .get(&load_id)
        .ok_or_else(|| AppError::NotFound(format!("load {load_id} not found")))?;

    if load.driver_id != Some(caller.user_id) {
        return Err(AppError::NotAssignedDriver);
    }
    if !load.stage.is_en_route() {
        return Err(AppError::LoadNotTrackable(load.stage));
    }
    drop(load);

    if !(-90.0..=90.0).contains(&request.lat) || !(-180.0..=180.0).contains(&request.lng) {
        return Err(AppError::BadRequest(format!(
            "coordinates out of range: {}, {}",
            request.lat, request.lng
        )));
    }

    let sample = PositionSample {
        load_id,
        point: GeoPoint {
            lat: request.lat,
            lng: request.lng,
        },
        speed_mph: request.speed_mph,
        heading_deg: request.heading_deg,
        accuracy_m: request.accuracy_m,
        recorded_at: request.recorded_at,
    };

    let mut log = state.positions.entry(load_id).or_default();
    let recorded = log.record(sample.clone(), state.config.position_history_limit);
    drop(log);

    if recorded {
        state.metrics.positions_recorded_total.inc();
        debug!(load_id = %load_id, at = %sample.recorded_at, "position recorded");
    } else {
        debug!(load_id = %load_id, at = %sample.recorded_at, "duplicate position ignored");
    }

    Ok(sample)
}

pub fn latest(state: &AppState, load_id: Uuid) -> Result<PositionSample, AppError> {
    if !state.loads.contains_key(&load_id) {
        return Err(AppError::NotFound(format!("load {load_id} not found")));
    }

    state
        .positions
        .get(&load_id)
        .and_then(|log| log.latest.clone())
        .ok_or_else(|| AppError::NotFound(format!("no position recorded for load {load_id}")))
}

/// Distance traveled over the timestamp-ordered sample path, plus the
/// great-circle distance from the latest fix to the destination when its
/// coordinates are known. Estimates, not routing.
pub fn route(state: &AppState, load_id: Uuid) -> Result<RouteEstimate, AppError> {
    let destination = state
        .loads
        .get(&load_id)
        .ok_or_else(|| AppError::NotFound(format!("load {load_id} not found")))?
        .destination
        .point;

    let log = state
        .positions
        .get(&load_id)
        .ok_or_else(|| AppError::NotFound(format!("no position recorded for load {load_id}")))?;

    let mut ordered: Vec<&PositionSample> = log.samples.iter().collect();
    ordered.sort_by_key(|sample| sample.recorded_at);
    let path: Vec<GeoPoint> = ordered.iter().map(|sample| sample.point).collect();

    let remaining_km = match (&log.latest, destination) {
        (Some(latest), Some(dest)) => Some(geo::haversine_km(&latest.point, &dest)),
        _ => None,
    };

    Ok(RouteEstimate {
        traveled_km: geo::path_km(&path),
        remaining_km,
        sample_count: log.samples.len(),
    })
}
