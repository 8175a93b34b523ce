use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// A chat message inside one conversation. `read_by` tracks read state per
/// member and is seeded with the sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub read_by: HashSet<Uuid>,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversationKind {
    Direct { a: Uuid, b: Uuid },
    Group { group_id: Uuid },
}

/// A direct pair or group thread, keyed by its deterministic channel name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub channel: String,
    pub kind: ConversationKind,
    pub members: HashSet<Uuid>,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn direct(a: Uuid, b: Uuid) -> Self {
        Self {
            channel: direct_channel(a, b),
            kind: ConversationKind::Direct { a, b },
            members: HashSet::from([a, b]),
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn group(group_id: Uuid, members: HashSet<Uuid>) -> Self {
        Self {
            channel: group_channel(group_id),
            kind: ConversationKind::Group { group_id },
            members,
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub members: HashSet<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Deterministic channel for a user pair: both participants derive the same
/// name regardless of who initiates.
pub fn direct_channel(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("dm:{lo}:{hi}")
}

pub fn group_channel(group_id: Uuid) -> String {
    format!("group:{group_id}")
}

/// Per-user channel for notification push.
pub fn user_channel(user_id: Uuid) -> String {
    format!("user:{user_id}")
}
