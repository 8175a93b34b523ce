use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::auth::Caller;
use crate::engine::lifecycle;
use crate::error::AppError;
use crate::fanout::{self, Audience, Event};
use crate::models::assignment::{Assignment, AssignmentView, OfferStatus};
use crate::models::load::Stage;
use crate::models::notification::NotificationCategory;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OfferRequest {
    pub driver_id: Uuid,
    pub vehicle_id: Option<Uuid>,
    pub trailer_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

/// Creates a pending offer for a load. A live pending offer blocks a second
/// one; a pending offer past its window is lazily expired first and does
/// not block.
pub async fn offer(
    state: &AppState,
    caller: &Caller,
    load_id: Uuid,
    request: OfferRequest,
) -> Result<AssignmentView, AppError> {
    caller.require_dispatch()?;

    let lock = state.load_lock(load_id);
    let _guard = lock.lock().await;

    let now = Utc::now();

    {
        let load = state
            .loads
            .get(&load_id)
            .ok_or_else(|| AppError::NotFound(format!("load {load_id} not found")))?;

        // Mid-trip reassignment is unsupported: once an offer was accepted
        // the load has moved past `assigned` and a fresh offer is illegal.
        if load.stage != Stage::Created && load.stage != Stage::Assigned {
            return Err(AppError::InvalidTransition {
                from: load.stage,
                to: Stage::Assigned,
            });
        }
    }

    let stale_pending: Vec<Uuid> = state
        .assignments
        .iter()
        .filter(|entry| {
            let a = entry.value();
            a.load_id == load_id && a.status == OfferStatus::Pending
        })
        .map(|entry| entry.value().id)
        .collect();

    for id in stale_pending {
        let mut assignment = match state.assignments.get_mut(&id) {
            Some(assignment) => assignment,
            None => continue,
        };
        if !assignment.is_past_expiry(now) {
            return Err(AppError::OfferConflict);
        }
        assignment.status = OfferStatus::Expired;
        let expired = assignment.clone();
        drop(assignment);
        notify_expired(state, &expired);
    }

    let assignment = Assignment {
        id: Uuid::new_v4(),
        load_id,
        driver_id: request.driver_id,
        vehicle_id: request.vehicle_id,
        trailer_id: request.trailer_id,
        status: OfferStatus::Pending,
        offered_at: now,
        expires_at: now + Duration::hours(state.config.offer_window_hours),
        responded_at: None,
        rejection_reason: None,
    };
    state.assignments.insert(assignment.id, assignment.clone());

    if let Some(mut load) = state.loads.get_mut(&load_id) {
        if load.stage == Stage::Created {
            lifecycle::transition(state, &mut load, Stage::Assigned, None, None);
        }
    }

    state
        .metrics
        .offers_total
        .with_label_values(&["offered"])
        .inc();

    fanout::publish(
        state,
        Event::new(
            NotificationCategory::AssignmentOffered,
            "New load offered",
            format!("You have been offered load {load_id}"),
            Audience::User(request.driver_id),
            json!({
                "assignment_id": assignment.id,
                "load_id": load_id,
                "expires_at": assignment.expires_at,
            }),
        ),
    );

    info!(load_id = %load_id, driver_id = %request.driver_id, assignment_id = %assignment.id, "offer created");
    Ok(assignment.into())
}

/// Accepts a pending offer. Recording the acceptance, binding the driver
/// and advancing the load to `trip_accepted` happen as one unit under the
/// per-load lock, so a borderline-timed expiry or a concurrent cancel
/// cannot interleave.
pub async fn accept(
    state: &AppState,
    caller: &Caller,
    assignment_id: Uuid,
) -> Result<AssignmentView, AppError> {
    let load_id = load_id_of(state, assignment_id)?;
    let lock = state.load_lock(load_id);
    let _guard = lock.lock().await;

    let now = Utc::now();
    guard_pending(state, assignment_id, caller.user_id, now)?;

    {
        let load = state
            .loads
            .get(&load_id)
            .ok_or_else(|| AppError::NotFound(format!("load {load_id} not found")))?;
        // The load was cancelled while the offer sat pending; acceptance
        // must not be recorded.
        if load.stage != Stage::Created && load.stage != Stage::Assigned {
            return Err(AppError::InvalidTransition {
                from: load.stage,
                to: Stage::TripAccepted,
            });
        }
    }

    let accepted = {
        let mut assignment = state
            .assignments
            .get_mut(&assignment_id)
            .ok_or_else(|| AppError::NotFound(format!("assignment {assignment_id} not found")))?;
        assignment.status = OfferStatus::Accepted;
        assignment.responded_at = Some(now);
        assignment.clone()
    };

    if let Some(mut load) = state.loads.get_mut(&load_id) {
        load.driver_id = Some(accepted.driver_id);
        load.vehicle_id = accepted.vehicle_id;
        load.trailer_id = accepted.trailer_id;
        lifecycle::transition(state, &mut load, Stage::TripAccepted, None, None);
    }

    state
        .metrics
        .offers_total
        .with_label_values(&["accepted"])
        .inc();

    info!(assignment_id = %assignment_id, load_id = %load_id, "offer accepted");
    Ok(accepted.into())
}

/// Rejects a pending offer. The load's stage is untouched so dispatch can
/// immediately offer the load to another driver.
pub async fn reject(
    state: &AppState,
    caller: &Caller,
    assignment_id: Uuid,
    request: RejectRequest,
) -> Result<AssignmentView, AppError> {
    let load_id = load_id_of(state, assignment_id)?;
    let lock = state.load_lock(load_id);
    let _guard = lock.lock().await;

    let now = Utc::now();
    guard_pending(state, assignment_id, caller.user_id, now)?;

    let rejected = {
        let mut assignment = state
            .assignments
            .get_mut(&assignment_id)
            .ok_or_else(|| AppError::NotFound(format!("assignment {assignment_id} not found")))?;
        assignment.status = OfferStatus::Rejected;
        assignment.responded_at = Some(now);
        assignment.rejection_reason = request.reason.clone();
        assignment.clone()
    };

    state
        .metrics
        .offers_total
        .with_label_values(&["rejected"])
        .inc();

    fanout::publish(
        state,
        Event::new(
            NotificationCategory::AssignmentRejected,
            "Offer rejected",
            format!(
                "Driver declined load {load_id}{}",
                rejected
                    .rejection_reason
                    .as_deref()
                    .map(|reason| format!(": {reason}"))
                    .unwrap_or_default()
            ),
            Audience::LoadWatchers(load_id),
            json!({
                "assignment_id": assignment_id,
                "load_id": load_id,
                "reason": rejected.rejection_reason,
            }),
        ),
    );

    info!(assignment_id = %assignment_id, load_id = %load_id, "offer rejected");
    Ok(rejected.into())
}

/// Read path with lazy expiry: a pending assignment past its window flips
/// to `expired` on first observation.
pub async fn get(state: &AppState, assignment_id: Uuid) -> Result<AssignmentView, AppError> {
    let load_id = load_id_of(state, assignment_id)?;
    let lock = state.load_lock(load_id);
    let _guard = lock.lock().await;

    expire_if_stale(state, assignment_id, Utc::now());

    let assignment = state
        .assignments
        .get(&assignment_id)
        .ok_or_else(|| AppError::NotFound(format!("assignment {assignment_id} not found")))?;
    Ok(assignment.clone().into())
}

pub async fn list_for_load(state: &AppState, load_id: Uuid) -> Result<Vec<AssignmentView>, AppError> {
    if !state.loads.contains_key(&load_id) {
        return Err(AppError::NotFound(format!("load {load_id} not found")));
    }

    let lock = state.load_lock(load_id);
    let _guard = lock.lock().await;

    let now = Utc::now();
    let ids: Vec<Uuid> = state
        .assignments
        .iter()
        .filter(|entry| entry.value().load_id == load_id)
        .map(|entry| entry.value().id)
        .collect();
    for id in &ids {
        expire_if_stale(state, *id, now);
    }

    let mut views: Vec<AssignmentView> = state
        .assignments
        .iter()
        .filter(|entry| entry.value().load_id == load_id)
        .map(|entry| entry.value().clone().into())
        .collect();
    views.sort_by_key(|view: &AssignmentView| view.assignment.offered_at);
    Ok(views)
}

fn load_id_of(state: &AppState, assignment_id: Uuid) -> Result<Uuid, AppError> {
    state
        .assignments
        .get(&assignment_id)
        .map(|entry| entry.value().load_id)
        .ok_or_else(|| AppError::NotFound(format!("assignment {assignment_id} not found")))
}

/// Common accept/reject guards, run under the per-load lock. Detecting a
/// stale window here flips the assignment to `expired` so it is never
/// retried.
fn guard_pending(
    state: &AppState,
    assignment_id: Uuid,
    caller_id: Uuid,
    now: chrono::DateTime<Utc>,
) -> Result<(), AppError> {
    let mut assignment = state
        .assignments
        .get_mut(&assignment_id)
        .ok_or_else(|| AppError::NotFound(format!("assignment {assignment_id} not found")))?;

    if assignment.driver_id != caller_id {
        return Err(AppError::Forbidden(
            "assignment belongs to a different driver".to_string(),
        ));
    }
    if assignment.status != OfferStatus::Pending {
        return Err(AppError::AlreadyResolved(assignment.status));
    }
    if assignment.is_past_expiry(now) {
        assignment.status = OfferStatus::Expired;
        let expired = assignment.clone();
        drop(assignment);
        state
            .metrics
            .offers_total
            .with_label_values(&["expired"])
            .inc();
        notify_expired(state, &expired);
        return Err(AppError::Expired);
    }
    Ok(())
}

fn expire_if_stale(state: &AppState, assignment_id: Uuid, now: chrono::DateTime<Utc>) {
    let Some(mut assignment) = state.assignments.get_mut(&assignment_id) else {
        return;
    };
    if assignment.status == OfferStatus::Pending && assignment.is_past_expiry(now) {
        assignment.status = OfferStatus::Expired;
        let expired = assignment.clone();
        drop(assignment);
        state
            .metrics
            .offers_total
            .with_label_values(&["expired"])
            .inc();
        notify_expired(state, &expired);
    }
}

fn notify_expired(state: &AppState, assignment: &Assignment) {
    fanout::publish(
        state,
        Event::new(
            NotificationCategory::AssignmentExpired,
            "Offer expired",
            format!("Offer for load {} expired unanswered", assignment.load_id),
            Audience::LoadWatchers(assignment.load_id),
            json!({
                "assignment_id": assignment.id,
                "load_id": assignment.load_id,
            }),
        ),
    );
}
