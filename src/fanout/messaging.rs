use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::auth::Caller;
use crate::error::AppError;
use crate::fanout::{self, Audience, Event};
use crate::models::message::{Attachment, Conversation, Group, Message};
use crate::models::notification::NotificationCategory;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageTarget {
    Direct { user_id: Uuid },
    Group { group_id: Uuid },
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub to: MessageTarget,
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub members: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub channel: String,
    pub members: Vec<Uuid>,
    pub message_count: usize,
    pub unread_count: usize,
    pub last_message_at: Option<chrono::DateTime<Utc>>,
}

pub fn create_group(
    state: &AppState,
    caller: &Caller,
    request: CreateGroupRequest,
) -> Result<Group, AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::BadRequest("group name cannot be empty".to_string()));
    }

    let mut members: HashSet<Uuid> = request.members.into_iter().collect();
    members.insert(caller.user_id);
    if members.len() < 2 {
        return Err(AppError::BadRequest(
            "a group needs at least two members".to_string(),
        ));
    }

    let group = Group {
        id: Uuid::new_v4(),
        name: request.name,
        members: members.clone(),
        created_by: caller.user_id,
        created_at: Utc::now(),
    };
    let conversation = Conversation::group(group.id, members);
    state
        .conversations
        .insert(conversation.channel.clone(), conversation);
    state.groups.insert(group.id, group.clone());

    info!(group_id = %group.id, members = group.members.len(), "group created");
    Ok(group)
}

/// Appends the message to its conversation, pushes it once on the
/// conversation channel and writes a durable notification per recipient
/// (everyone but the sender).
pub fn send_message(
    state: &AppState,
    caller: &Caller,
    request: SendMessageRequest,
) -> Result<Message, AppError> {
    if request.body.trim().is_empty() && request.attachments.is_empty() {
        return Err(AppError::BadRequest(
            "message needs a body or an attachment".to_string(),
        ));
    }

    let channel = match &request.to {
        MessageTarget::Direct { user_id } => {
            if *user_id == caller.user_id {
                return Err(AppError::BadRequest(
                    "cannot message yourself".to_string(),
                ));
            }
            let conversation = Conversation::direct(caller.user_id, *user_id);
            let channel = conversation.channel.clone();
            state
                .conversations
                .entry(channel.clone())
                .or_insert(conversation);
            channel
        }
        MessageTarget::Group { group_id } => {
            let group = state
                .groups
                .get(group_id)
                .ok_or_else(|| AppError::NotFound(format!("group {group_id} not found")))?;
            if !group.members.contains(&caller.user_id) {
                return Err(AppError::Forbidden(
                    "caller is not a member of this group".to_string(),
                ));
            }
            let conversation = Conversation::group(group.id, group.members.clone());
            let channel = conversation.channel.clone();
            state
                .conversations
                .entry(channel.clone())
                .or_insert(conversation);
            channel
        }
    };

    let message = Message {
        id: Uuid::new_v4(),
        sender_id: caller.user_id,
        body: request.body,
        attachments: request.attachments,
        read_by: HashSet::from([caller.user_id]),
        sent_at: Utc::now(),
    };

    let recipients: Vec<Uuid> = {
        let mut conversation = state
            .conversations
            .get_mut(&channel)
            .ok_or_else(|| AppError::Internal(format!("conversation {channel} vanished")))?;
        conversation.messages.push(message.clone());
        conversation
            .members
            .iter()
            .filter(|member| **member != caller.user_id)
            .copied()
            .collect()
    };

    state.metrics.messages_sent_total.inc();

    fanout::publish(
        state,
        Event::new(
            NotificationCategory::MessageReceived,
            "New message",
            preview(&message.body),
            Audience::Users(recipients),
            json!({
                "channel": channel,
                "message_id": message.id,
                "sender_id": message.sender_id,
            }),
        )
        .with_extra_channel(channel.clone()),
    );

    info!(channel = %channel, message_id = %message.id, "message sent");
    Ok(message)
}

/// Marks every message in the conversation read for the caller. Repeat
/// calls are no-ops.
pub fn mark_read(state: &AppState, caller: &Caller, channel: &str) -> Result<usize, AppError> {
    let mut conversation = state
        .conversations
        .get_mut(channel)
        .ok_or_else(|| AppError::NotFound(format!("conversation {channel} not found")))?;

    if !conversation.members.contains(&caller.user_id) {
        return Err(AppError::Forbidden(
            "caller is not a member of this conversation".to_string(),
        ));
    }

    let mut newly_read = 0;
    for message in conversation.messages.iter_mut() {
        if message.read_by.insert(caller.user_id) {
            newly_read += 1;
        }
    }
    Ok(newly_read)
}

pub fn list_messages(
    state: &AppState,
    caller: &Caller,
    channel: &str,
) -> Result<Vec<Message>, AppError> {
    let conversation = state
        .conversations
        .get(channel)
        .ok_or_else(|| AppError::NotFound(format!("conversation {channel} not found")))?;

    if !conversation.members.contains(&caller.user_id) {
        return Err(AppError::Forbidden(
            "caller is not a member of this conversation".to_string(),
        ));
    }
    Ok(conversation.messages.clone())
}

pub fn conversations_for(state: &AppState, caller: &Caller) -> Vec<ConversationSummary> {
    let mut summaries: Vec<ConversationSummary> = state
        .conversations
        .iter()
        .filter(|entry| entry.value().members.contains(&caller.user_id))
        .map(|entry| {
            let conversation = entry.value();
            ConversationSummary {
                channel: conversation.channel.clone(),
                members: conversation.members.iter().copied().collect(),
                message_count: conversation.messages.len(),
                unread_count: conversation
                    .messages
                    .iter()
                    .filter(|message| !message.read_by.contains(&caller.user_id))
                    .count(),
                last_message_at: conversation.messages.last().map(|message| message.sent_at),
            }
        })
        .collect();
    summaries.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
    summaries
}

fn preview(body: &str) -> String {
    const PREVIEW_LEN: usize = 80;
    if body.chars().count() <= PREVIEW_LEN {
        body.to_string()
    } else {
        let cut: String = body.chars().take(PREVIEW_LEN).collect();
        format!("{cut}…")
    }
}
