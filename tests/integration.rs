use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use load_coordinator::api::rest::router;
use load_coordinator::config::Config;
use load_coordinator::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

struct Identity {
    user_id: Uuid,
    role: &'static str,
}

fn dispatcher() -> Identity {
    Identity {
        user_id: Uuid::new_v4(),
        role: "dispatch",
    }
}

fn driver() -> Identity {
    Identity {
        user_id: Uuid::new_v4(),
        role: "driver",
    }
}

fn setup() -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(Config::default()));
    (router(state.clone()), state)
}

fn post_request(uri: &str, identity: &Identity, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-user-id", identity.user_id.to_string())
        .header("x-role", identity.role)
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str, identity: &Identity) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-user-id", identity.user_id.to_string())
        .header("x-role", identity.role)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn load_body() -> Value {
    json!({
        "origin": { "address": "400 Industrial Pkwy, Columbus OH", "point": { "lat": 39.9612, "lng": -82.9988 } },
        "destination": { "address": "12 Dock St, Newark NJ", "point": { "lat": 40.7357, "lng": -74.1724 } },
        "financials": { "rate": 2400.0 }
    })
}

async fn create_load(app: &axum::Router, dispatch: &Identity) -> String {
    let response = app
        .clone()
        .oneshot(post_request("/loads", dispatch, load_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    body["id"].as_str().unwrap().to_string()
}

async fn offer_to(
    app: &axum::Router,
    dispatch: &Identity,
    load_id: &str,
    driver_id: Uuid,
) -> String {
    let response = app
        .clone()
        .oneshot(post_request(
            &format!("/loads/{load_id}/offers"),
            dispatch,
            json!({ "driver_id": driver_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    body["id"].as_str().unwrap().to_string()
}

async fn accept_offer(app: &axum::Router, offer_id: &str, identity: &Identity) -> StatusCode {
    app.clone()
        .oneshot(post_request(
            &format!("/offers/{offer_id}/accept"),
            identity,
            json!({}),
        ))
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/health", &dispatcher())).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["loads"], 0);
    assert_eq!(body["assignments"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/metrics", &dispatcher())).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    assert!(body.contains("active_loads"));
}

#[tokio::test]
async fn missing_identity_headers_are_rejected() {
    let (app, _state) = setup();
    let request = Request::builder()
        .method("POST")
        .uri("/loads")
        .header("content-type", "application/json")
        .body(Body::from(load_body().to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn driver_cannot_create_loads() {
    let (app, _state) = setup();
    let response = app
        .oneshot(post_request("/loads", &driver(), load_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn created_load_starts_at_created_stage() {
    let (app, _state) = setup();
    let dispatch = dispatcher();
    let load_id = create_load(&app, &dispatch).await;

    let response = app
        .oneshot(get_request(&format!("/loads/{load_id}"), &dispatch))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["stage"], "created");
    assert!(body["driver_id"].is_null());
    assert_eq!(body["status_history"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn wrong_driver_forbidden_then_offered_driver_accepts() {
    let (app, _state) = setup();
    let dispatch = dispatcher();
    let d1 = driver();
    let d2 = driver();

    let load_id = create_load(&app, &dispatch).await;
    let offer_id = offer_to(&app, &dispatch, &load_id, d1.user_id).await;

    assert_eq!(accept_offer(&app, &offer_id, &d2).await, StatusCode::FORBIDDEN);
    assert_eq!(accept_offer(&app, &offer_id, &d1).await, StatusCode::OK);

    let response = app
        .oneshot(get_request(&format!("/loads/{load_id}"), &dispatch))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["stage"], "trip_accepted");
    assert_eq!(body["driver_id"], d1.user_id.to_string());
}

#[tokio::test]
async fn expired_offer_fails_and_reoffer_succeeds() {
    let (app, state) = setup();
    let dispatch = dispatcher();
    let d1 = driver();
    let d2 = driver();

    let load_id = create_load(&app, &dispatch).await;
    let offer_id = offer_to(&app, &dispatch, &load_id, d1.user_id).await;

    // Push the window into the past, as if 25 hours elapsed.
    state
        .assignments
        .get_mut(&Uuid::parse_str(&offer_id).unwrap())
        .unwrap()
        .expires_at = Utc::now() - Duration::hours(1);

    assert_eq!(accept_offer(&app, &offer_id, &d1).await, StatusCode::GONE);

    let second = offer_to(&app, &dispatch, &load_id, d2.user_id).await;
    assert_ne!(second, offer_id);

    let response = app
        .oneshot(get_request(&format!("/offers/{second}"), &dispatch))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");
    assert!(body["expires_in_hours"].as_f64().unwrap() > 23.0);
}

#[tokio::test]
async fn duplicate_pending_offer_conflicts() {
    let (app, _state) = setup();
    let dispatch = dispatcher();
    let load_id = create_load(&app, &dispatch).await;
    offer_to(&app, &dispatch, &load_id, Uuid::new_v4()).await;

    let response = app
        .oneshot(post_request(
            &format!("/loads/{load_id}/offers"),
            &dispatch,
            json!({ "driver_id": Uuid::new_v4() }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn stage_skip_is_an_invalid_transition() {
    let (app, _state) = setup();
    let dispatch = dispatcher();
    let d1 = driver();

    let load_id = create_load(&app, &dispatch).await;
    offer_to(&app, &dispatch, &load_id, d1.user_id).await;

    // Before acceptance the driver is not bound yet, so the skip surfaces
    // as an authorization failure.
    let response = app
        .clone()
        .oneshot(post_request(
            &format!("/loads/{load_id}/advance"),
            &d1,
            json!({ "stage": "in_transit" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // After acceptance the driver is bound, and the same skip is rejected
    // as an invalid transition.
    let offers = app
        .clone()
        .oneshot(get_request(&format!("/loads/{load_id}/offers"), &dispatch))
        .await
        .unwrap();
    let offers = body_json(offers).await;
    let offer_id = offers[0]["id"].as_str().unwrap().to_string();
    assert_eq!(accept_offer(&app, &offer_id, &d1).await, StatusCode::OK);

    let response = app
        .oneshot(post_request(
            &format!("/loads/{load_id}/advance"),
            &d1,
            json!({ "stage": "in_transit" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn trip_started_without_odometer_payload_is_rejected() {
    let (app, _state) = setup();
    let dispatch = dispatcher();
    let d1 = driver();

    let load_id = create_load(&app, &dispatch).await;
    let offer_id = offer_to(&app, &dispatch, &load_id, d1.user_id).await;
    accept_offer(&app, &offer_id, &d1).await;

    let response = app
        .clone()
        .oneshot(post_request(
            &format!("/loads/{load_id}/advance"),
            &d1,
            json!({ "stage": "trip_started" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_request(
            &format!("/loads/{load_id}/advance"),
            &d1,
            json!({
                "stage": "trip_started",
                "payload": {
                    "kind": "trip_start",
                    "odometer_miles": 120340.0,
                    "odometer_photo_url": "s3://docs/odometer.jpg"
                }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["stage"], "trip_started");
    assert_eq!(body["odometer_photo_url"], "s3://docs/odometer.jpg");
}

#[tokio::test]
async fn positions_rejected_before_trip_and_latest_wins_by_timestamp() {
    let (app, _state) = setup();
    let dispatch = dispatcher();
    let d1 = driver();

    let load_id = create_load(&app, &dispatch).await;
    let offer_id = offer_to(&app, &dispatch, &load_id, d1.user_id).await;
    accept_offer(&app, &offer_id, &d1).await;

    // Not yet en route.
    let response = app
        .clone()
        .oneshot(post_request(
            &format!("/loads/{load_id}/positions"),
            &d1,
            json!({ "lat": 39.9, "lng": -82.9, "recorded_at": "2026-08-25T12:00:00Z" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .clone()
        .oneshot(post_request(
            &format!("/loads/{load_id}/advance"),
            &d1,
            json!({
                "stage": "trip_started",
                "payload": {
                    "kind": "trip_start",
                    "odometer_miles": 88000.0,
                    "odometer_photo_url": "s3://docs/odometer.jpg"
                }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // t=100 arrives first, then a late t=90 resend.
    for (lng, ts) in [(-82.0, "2026-08-25T12:01:40Z"), (-82.5, "2026-08-25T12:01:30Z")] {
        let response = app
            .clone()
            .oneshot(post_request(
                &format!("/loads/{load_id}/positions"),
                &d1,
                json!({ "lat": 39.95, "lng": lng, "recorded_at": ts }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(get_request(
            &format!("/loads/{load_id}/positions/latest"),
            &dispatch,
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["point"]["lng"], -82.0);

    let response = app
        .oneshot(get_request(&format!("/loads/{load_id}/route"), &dispatch))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["sample_count"], 2);
    assert!(body["remaining_km"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn offer_and_status_changes_reach_the_notification_feed() {
    let (app, _state) = setup();
    let dispatch = dispatcher();
    let d1 = driver();

    let load_id = create_load(&app, &dispatch).await;
    let offer_id = offer_to(&app, &dispatch, &load_id, d1.user_id).await;

    // The driver's feed holds the durable offer notification.
    let response = app
        .clone()
        .oneshot(get_request("/notifications", &d1))
        .await
        .unwrap();
    let feed = body_json(response).await;
    let feed = feed.as_array().unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0]["category"], "assignment_offered");
    assert_eq!(feed[0]["metadata"]["assignment_id"], offer_id);
    assert_eq!(feed[0]["read"], false);

    accept_offer(&app, &offer_id, &d1).await;

    // The creating dispatcher watches the load and sees the stage change.
    let response = app
        .clone()
        .oneshot(get_request("/notifications", &dispatch))
        .await
        .unwrap();
    let feed = body_json(response).await;
    let feed = feed.as_array().unwrap();
    assert!(feed
        .iter()
        .any(|notification| notification["category"] == "status_changed"));

    // Mark the offer notification read, twice.
    let response = app
        .clone()
        .oneshot(get_request("/notifications", &d1))
        .await
        .unwrap();
    let feed = body_json(response).await;
    let notification_id = feed[0]["id"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post_request(
                &format!("/notifications/{notification_id}/read"),
                &d1,
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["read"], true);
    }
}

#[tokio::test]
async fn cancel_then_accept_is_refused() {
    let (app, _state) = setup();
    let dispatch = dispatcher();
    let d1 = driver();

    let load_id = create_load(&app, &dispatch).await;
    let offer_id = offer_to(&app, &dispatch, &load_id, d1.user_id).await;

    let response = app
        .clone()
        .oneshot(post_request(
            &format!("/loads/{load_id}/cancel"),
            &dispatch,
            json!({ "note": "customer cancelled" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["stage"], "cancelled");

    assert_eq!(accept_offer(&app, &offer_id, &d1).await, StatusCode::CONFLICT);
}

#[tokio::test]
async fn direct_message_round_trip() {
    let (app, _state) = setup();
    let alice = driver();
    let bob = dispatcher();

    let response = app
        .clone()
        .oneshot(post_request(
            "/messages",
            &alice,
            json!({
                "to": { "kind": "direct", "user_id": bob.user_id },
                "body": "loaded and rolling"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Bob sees one conversation with one unread message.
    let response = app
        .clone()
        .oneshot(get_request("/conversations", &bob))
        .await
        .unwrap();
    let conversations = body_json(response).await;
    let conversations = conversations.as_array().unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0]["unread_count"], 1);
    let channel = conversations[0]["channel"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post_request(
            &format!("/conversations/{channel}/read"),
            &bob,
            json!({}),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["newly_read"], 1);

    // And a durable message notification landed in Bob's feed.
    let response = app
        .oneshot(get_request("/notifications", &bob))
        .await
        .unwrap();
    let feed = body_json(response).await;
    assert!(feed
        .as_array()
        .unwrap()
        .iter()
        .any(|notification| notification["category"] == "message_received"));
}

#[tokio::test]
async fn group_messaging_fans_out_to_members() {
    let (app, _state) = setup();
    let owner = dispatcher();
    let member = driver();
    let outsider = driver();

    let response = app
        .clone()
        .oneshot(post_request(
            "/groups",
            &owner,
            json!({ "name": "night shift", "members": [member.user_id] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let group = body_json(response).await;
    let group_id = group["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post_request(
            "/messages",
            &owner,
            json!({
                "to": { "kind": "group", "group_id": group_id },
                "body": "dock 4 closed tonight"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_request("/notifications", &member))
        .await
        .unwrap();
    let feed = body_json(response).await;
    assert_eq!(feed.as_array().unwrap().len(), 1);

    // Non-members cannot read the group conversation.
    let response = app
        .oneshot(get_request(
            &format!("/conversations/group:{group_id}/messages"),
            &outsider,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn get_nonexistent_load_returns_404() {
    let (app, _state) = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(get_request(&format!("/loads/{fake_id}"), &dispatcher()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
