//! Real-time events exchanged with the chat server

use crate::models::{Conversation, ConversationId, Message, Role, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events pushed by the server over the live channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum InboundEvent {
    NewMessage {
        message: Message,
    },
    ChatListUpdated {
        conversation: Conversation,
    },
    ChatJoined {
        conversation_id: ConversationId,
    },
    ChatError {
        message: String,
    },
    MessagesRead {
        conversation_id: ConversationId,
        reader_role: Role,
    },
    UserOnline {
        user_id: UserId,
    },
    UserOffline {
        user_id: UserId,
    },
}

impl InboundEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            InboundEvent::NewMessage { .. } => "new_message",
            InboundEvent::ChatListUpdated { .. } => "chat_list_updated",
            InboundEvent::ChatJoined { .. } => "chat_joined",
            InboundEvent::ChatError { .. } => "chat_error",
            InboundEvent::MessagesRead { .. } => "messages_read",
            InboundEvent::UserOnline { .. } => "user_online",
            InboundEvent::UserOffline { .. } => "user_offline",
        }
    }
}

/// Commands sent by the client over the live channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum OutboundCommand {
    JoinChat {
        conversation_id: ConversationId,
    },
    LeaveChat {
        conversation_id: ConversationId,
    },
    SendMessage {
        conversation_id: ConversationId,
        content: String,
        client_ref: Uuid,
    },
    MarkMessagesRead {
        conversation_id: ConversationId,
    },
    TypingStart {
        conversation_id: ConversationId,
    },
    TypingStop {
        conversation_id: ConversationId,
    },
}

impl OutboundCommand {
    pub fn event_name(&self) -> &'static str {
        match self {
            OutboundCommand::JoinChat { .. } => "join_chat",
            OutboundCommand::LeaveChat { .. } => "leave_chat",
            OutboundCommand::SendMessage { .. } => "send_message",
            OutboundCommand::MarkMessagesRead { .. } => "mark_messages_read",
            OutboundCommand::TypingStart { .. } => "typing_start",
            OutboundCommand::TypingStop { .. } => "typing_stop",
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            OutboundCommand::JoinChat { conversation_id }
            | OutboundCommand::LeaveChat { conversation_id }
            | OutboundCommand::SendMessage {
                conversation_id, ..
            }
            | OutboundCommand::MarkMessagesRead { conversation_id }
            | OutboundCommand::TypingStart { conversation_id }
            | OutboundCommand::TypingStop { conversation_id } => conversation_id,
        }
    }
}
