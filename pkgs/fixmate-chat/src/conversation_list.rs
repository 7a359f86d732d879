//! Inbox projection
//!
//! A read model derived from conversation metadata, the message store, the
//! unread counters and presence. It holds no state of its own.

use crate::message_store::MessageStore;
use crate::models::{Conversation, ConversationId, LastMessage, Participant, Role};
use crate::unread_tracker::{PresenceTracker, UnreadCounter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One inbox row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub counterpart: Participant,
    pub online: bool,
    pub last_message: Option<LastMessage>,
    pub unread_count: u32,
    pub last_activity: DateTime<Utc>,
}

/// Derive the inbox, most recent activity first
pub fn project<'a>(
    conversations: impl IntoIterator<Item = &'a Conversation>,
    messages: &MessageStore,
    unread: &UnreadCounter,
    presence: &PresenceTracker,
    local_role: Role,
) -> Vec<ConversationSummary> {
    let mut rows: Vec<ConversationSummary> = conversations
        .into_iter()
        .map(|conversation| summarize(conversation, messages, unread, presence, local_role))
        .collect();

    rows.sort_by(|a, b| {
        b.last_activity
            .cmp(&a.last_activity)
            .then_with(|| a.id.cmp(&b.id))
    });
    rows
}

fn summarize(
    conversation: &Conversation,
    messages: &MessageStore,
    unread: &UnreadCounter,
    presence: &PresenceTracker,
    local_role: Role,
) -> ConversationSummary {
    let counterpart = conversation.counterpart(local_role).clone();

    let stored = messages.latest(&conversation.id).map(|m| LastMessage {
        preview: m.body.preview(),
        timestamp: m.timestamp,
        sender_role: m.sender_role,
    });
    let last_message = match (stored, conversation.last_message.clone()) {
        (Some(local), Some(server)) if server.timestamp > local.timestamp => Some(server),
        (Some(local), _) => Some(local),
        (None, server) => server,
    };

    let last_activity = last_message
        .as_ref()
        .map(|m| m.timestamp)
        .unwrap_or(conversation.updated_at);

    ConversationSummary {
        id: conversation.id.clone(),
        online: presence
            .known(&counterpart.user_id)
            .unwrap_or(conversation.online),
        counterpart,
        last_message,
        unread_count: unread.count(&conversation.id),
        last_activity,
    }
}
