use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    AssignmentOffered,
    AssignmentRejected,
    AssignmentExpired,
    StatusChanged,
    MessageReceived,
}

/// Durable per-recipient record. The push channel is an optimization; this
/// row is the source of truth for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub category: NotificationCategory,
    pub title: String,
    pub body: String,
    /// Structured context for the recipient UI, e.g. the assignment id so
    /// an offer can be accepted or rejected in place.
    pub metadata: Value,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn new(
        recipient_id: Uuid,
        category: NotificationCategory,
        title: String,
        body: String,
        metadata: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id,
            category,
            title,
            body,
            metadata,
            read: false,
            created_at: Utc::now(),
            read_at: None,
        }
    }
}
