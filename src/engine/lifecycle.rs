use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::auth::Caller;
use crate::error::AppError;
use crate::fanout::{self, Audience, Event};
use crate::models::load::{Load, Stage, StagePayload, StatusEntry};
use crate::models::notification::NotificationCategory;
use crate::models::position::GeoPoint;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AdvanceRequest {
    pub stage: Stage,
    pub payload: Option<StagePayload>,
    pub point: Option<GeoPoint>,
    pub note: Option<String>,
}

/// Moves a load one step forward in the trip checklist. The caller must be
/// the bound driver; the target must be the immediate successor of the
/// current stage; stage-specific artifacts must be present.
pub async fn advance(
    state: &AppState,
    caller: &Caller,
    load_id: Uuid,
    request: AdvanceRequest,
) -> Result<Load, AppError> {
    let lock = state.load_lock(load_id);
    let _guard = lock.lock().await;

    let mut load = state
        .loads
        .get_mut(&load_id)
        .ok_or_else(|| AppError::NotFound(format!("load {load_id} not found")))?;

    if load.driver_id != Some(caller.user_id) {
        return Err(AppError::NotAssignedDriver);
    }

    // Cancellation is a dispatch action, and the early stages belong to the
    // assignment engine; the driver checklist starts at trip_started.
    if request.stage == Stage::Cancelled
        || request.stage.ordinal() <= Stage::TripAccepted.ordinal()
    {
        return Err(AppError::InvalidTransition {
            from: load.stage,
            to: request.stage,
        });
    }

    if !load.stage.can_advance_to(request.stage) {
        return Err(AppError::InvalidTransition {
            from: load.stage,
            to: request.stage,
        });
    }

    apply_payload(&mut load, request.stage, request.payload)?;
    transition(state, &mut load, request.stage, request.point, request.note);

    info!(load_id = %load.id, stage = ?load.stage, "load advanced");
    Ok(load.clone())
}

/// Dispatch-only termination, legal from any non-terminal stage.
pub async fn cancel(
    state: &AppState,
    caller: &Caller,
    load_id: Uuid,
    note: Option<String>,
) -> Result<Load, AppError> {
    caller.require_dispatch()?;

    let lock = state.load_lock(load_id);
    let _guard = lock.lock().await;

    let mut load = state
        .loads
        .get_mut(&load_id)
        .ok_or_else(|| AppError::NotFound(format!("load {load_id} not found")))?;

    if !load.stage.can_advance_to(Stage::Cancelled) {
        return Err(AppError::InvalidTransition {
            from: load.stage,
            to: Stage::Cancelled,
        });
    }

    transition(state, &mut load, Stage::Cancelled, None, note);

    info!(load_id = %load.id, "load cancelled");
    Ok(load.clone())
}

/// Validates the stage artifact and persists its fields onto the load.
/// Variant mismatch counts as a missing payload: the caller asserted one
/// stage but shipped another stage's artifact.
fn apply_payload(
    load: &mut Load,
    target: Stage,
    payload: Option<StagePayload>,
) -> Result<(), AppError> {
    match target {
        Stage::TripStarted => match payload {
            Some(StagePayload::TripStart {
                odometer_miles,
                odometer_photo_url,
            }) => {
                if odometer_photo_url.trim().is_empty() {
                    return Err(AppError::MissingPayload(
                        "odometer photo required for trip_started".to_string(),
                    ));
                }
                load.odometer_start_miles = Some(odometer_miles);
                load.odometer_photo_url = Some(odometer_photo_url);
                Ok(())
            }
            _ => Err(AppError::MissingPayload(
                "trip_start payload required for trip_started".to_string(),
            )),
        },
        Stage::ShipperLoadIn => match payload {
            Some(StagePayload::LoadIn {
                po_number,
                reference_numbers,
            }) => {
                if po_number.trim().is_empty() {
                    return Err(AppError::MissingPayload(
                        "PO number required for shipper_load_in".to_string(),
                    ));
                }
                load.po_number = Some(po_number);
                load.reference_numbers = reference_numbers;
                Ok(())
            }
            _ => Err(AppError::MissingPayload(
                "load_in payload required for shipper_load_in".to_string(),
            )),
        },
        Stage::ShipperLoadOut => match payload {
            Some(StagePayload::LoadOut { bill_of_lading_url }) => {
                if bill_of_lading_url.trim().is_empty() {
                    return Err(AppError::MissingPayload(
                        "bill of lading required for shipper_load_out".to_string(),
                    ));
                }
                load.bill_of_lading_url = Some(bill_of_lading_url);
                Ok(())
            }
            _ => Err(AppError::MissingPayload(
                "load_out payload required for shipper_load_out".to_string(),
            )),
        },
        Stage::ReceiverOffload => match payload {
            Some(StagePayload::Offload {
                proof_of_delivery_url,
            }) => {
                if proof_of_delivery_url.trim().is_empty() {
                    return Err(AppError::MissingPayload(
                        "proof of delivery required for receiver_offload".to_string(),
                    ));
                }
                load.proof_of_delivery_url = Some(proof_of_delivery_url);
                Ok(())
            }
            _ => Err(AppError::MissingPayload(
                "offload payload required for receiver_offload".to_string(),
            )),
        },
        _ => Ok(()),
    }
}

/// Appends the history entry, updates the stage and mirrors the change to
/// dispatch watchers. Callers hold the per-load lock.
pub(crate) fn transition(
    state: &AppState,
    load: &mut Load,
    target: Stage,
    point: Option<GeoPoint>,
    note: Option<String>,
) {
    load.status_history.push(StatusEntry {
        stage: target,
        at: Utc::now(),
        point,
        note: note.clone(),
    });
    let was_terminal = load.stage.is_terminal();
    load.stage = target;

    state
        .metrics
        .stage_transitions_total
        .with_label_values(&[stage_label(target)])
        .inc();
    if target.is_terminal() && !was_terminal {
        state.metrics.active_loads.dec();
    }

    fanout::publish(
        state,
        Event::new(
            NotificationCategory::StatusChanged,
            "Load status changed",
            format!("Load {} is now {}", load.id, stage_label(target)),
            Audience::LoadWatchers(load.id),
            json!({
                "load_id": load.id,
                "stage": target,
                "note": note,
            }),
        ),
    );
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Created => "created",
        Stage::Assigned => "assigned",
        Stage::TripAccepted => "trip_accepted",
        Stage::TripStarted => "trip_started",
        Stage::ShipperCheckIn => "shipper_check_in",
        Stage::ShipperLoadIn => "shipper_load_in",
        Stage::ShipperLoadOut => "shipper_load_out",
        Stage::InTransit => "in_transit",
        Stage::ReceiverCheckIn => "receiver_check_in",
        Stage::ReceiverOffload => "receiver_offload",
        Stage::Completed => "completed",
        Stage::Delivered => "delivered",
        Stage::Cancelled => "cancelled",
    }
}
