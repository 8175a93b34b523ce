pub mod messaging;
pub mod push;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::message::user_channel;
use crate::models::notification::{Notification, NotificationCategory};
use crate::state::AppState;

/// Who an event is addressed to. Resolved to concrete user ids at publish
/// time.
#[derive(Debug, Clone)]
pub enum Audience {
    User(Uuid),
    /// Dispatch watchers registered on a load.
    LoadWatchers(Uuid),
    Users(Vec<Uuid>),
}

#[derive(Debug, Clone)]
pub struct Event {
    pub category: NotificationCategory,
    pub title: String,
    pub body: String,
    pub audience: Audience,
    pub metadata: Value,
    /// Extra named channel to push on, besides each recipient's own
    /// channel (used by messaging for the conversation channel).
    pub extra_channel: Option<String>,
}

impl Event {
    pub fn new(
        category: NotificationCategory,
        title: impl Into<String>,
        body: impl Into<String>,
        audience: Audience,
        metadata: Value,
    ) -> Self {
        Self {
            category,
            title: title.into(),
            body: body.into(),
            audience,
            metadata,
            extra_channel: None,
        }
    }

    pub fn with_extra_channel(mut self, channel: String) -> Self {
        self.extra_channel = Some(channel);
        self
    }
}

/// Dual-path delivery: one durable notification row per recipient, always,
/// then best-effort push. A push failure is logged and swallowed; it never
/// propagates to the caller.
pub fn publish(state: &AppState, event: Event) {
    let recipients = resolve_audience(state, &event.audience);

    let event_name = event_name(event.category);
    for recipient_id in &recipients {
        let notification = Notification::new(
            *recipient_id,
            event.category,
            event.title.clone(),
            event.body.clone(),
            event.metadata.clone(),
        );
        let payload = json!({
            "notification_id": notification.id,
            "category": event.category,
            "title": event.title,
            "body": event.body,
            "metadata": event.metadata,
        });
        state.notifications.insert(notification.id, notification);
        state.metrics.notifications_created_total.inc();

        push_best_effort(state, &user_channel(*recipient_id), event_name, &payload);
    }

    if let Some(channel) = &event.extra_channel {
        let payload = json!({
            "category": event.category,
            "title": event.title,
            "body": event.body,
            "metadata": event.metadata,
        });
        push_best_effort(state, channel, event_name, &payload);
    }
}

fn resolve_audience(state: &AppState, audience: &Audience) -> Vec<Uuid> {
    match audience {
        Audience::User(id) => vec![*id],
        Audience::Users(ids) => ids.clone(),
        Audience::LoadWatchers(load_id) => state
            .watchers
            .get(load_id)
            .map(|entry| entry.value().iter().copied().collect())
            .unwrap_or_default(),
    }
}

fn push_best_effort(state: &AppState, channel: &str, event_name: &str, payload: &Value) {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match state.push.publish(channel, event_name, payload) {
            Ok(()) => {
                state
                    .metrics
                    .push_deliveries_total
                    .with_label_values(&["success"])
                    .inc();
                return;
            }
            Err(err) if attempts <= state.config.push_retry_limit => {
                warn!(channel, attempts, error = %err, "push failed, retrying");
            }
            Err(err) => {
                state
                    .metrics
                    .push_deliveries_total
                    .with_label_values(&["dropped"])
                    .inc();
                warn!(channel, error = %err, "push dropped after retries; durable record kept");
                return;
            }
        }
    }
}

/// Caller's durable feed, newest first. This is the poll path a client
/// falls back to when it missed the push.
pub fn feed(state: &AppState, user_id: Uuid) -> Vec<Notification> {
    let mut notifications: Vec<Notification> = state
        .notifications
        .iter()
        .filter(|entry| entry.value().recipient_id == user_id)
        .map(|entry| entry.value().clone())
        .collect();
    notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    notifications
}

/// Recipient-only, idempotent read receipt.
pub fn mark_notification_read(
    state: &AppState,
    caller_id: Uuid,
    notification_id: Uuid,
) -> Result<Notification, AppError> {
    let mut notification = state
        .notifications
        .get_mut(&notification_id)
        .ok_or_else(|| AppError::NotFound(format!("notification {notification_id} not found")))?;

    if notification.recipient_id != caller_id {
        return Err(AppError::Forbidden(
            "notification belongs to a different user".to_string(),
        ));
    }
    if !notification.read {
        notification.read = true;
        notification.read_at = Some(Utc::now());
    }
    Ok(notification.clone())
}

fn event_name(category: NotificationCategory) -> &'static str {
    match category {
        NotificationCategory::AssignmentOffered => "assignment_offered",
        NotificationCategory::AssignmentRejected => "assignment_rejected",
        NotificationCategory::AssignmentExpired => "assignment_expired",
        NotificationCategory::StatusChanged => "status_changed",
        NotificationCategory::MessageReceived => "message_received",
    }
}
