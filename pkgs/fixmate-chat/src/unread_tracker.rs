//! Unread counters and presence
//!
//! - **UnreadCounter**: conversation id -> unread count, plus the currently
//!   focused conversation. The focused conversation always reads zero.
//! - **PresenceTracker**: user id -> online flag, last write wins.

use crate::models::{ConversationId, UserId};
use std::collections::HashMap;
use tracing::debug;

/// Per-conversation unread counts
#[derive(Debug, Default)]
pub struct UnreadCounter {
    counts: HashMap<ConversationId, u32>,
    focused: Option<ConversationId>,
}

impl UnreadCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more unread message. Ignored for the focused conversation.
    pub fn increment(&mut self, conversation_id: &ConversationId) {
        if self.is_focused(conversation_id) {
            return;
        }
        let count = self.counts.entry(conversation_id.clone()).or_insert(0);
        *count = count.saturating_add(1);
        debug!("Unread for {} is now {}", conversation_id, count);
    }

    /// Overwrite the count with a server-provided value
    pub fn set(&mut self, conversation_id: &ConversationId, count: u32) {
        if self.is_focused(conversation_id) {
            return;
        }
        if count == 0 {
            self.counts.remove(conversation_id);
        } else {
            self.counts.insert(conversation_id.clone(), count);
        }
    }

    pub fn reset(&mut self, conversation_id: &ConversationId) {
        self.counts.remove(conversation_id);
    }

    /// Focus a conversation, clearing its count
    pub fn focus(&mut self, conversation_id: &ConversationId) {
        self.reset(conversation_id);
        self.focused = Some(conversation_id.clone());
    }

    pub fn unfocus(&mut self) -> Option<ConversationId> {
        self.focused.take()
    }

    pub fn focused(&self) -> Option<&ConversationId> {
        self.focused.as_ref()
    }

    pub fn is_focused(&self, conversation_id: &ConversationId) -> bool {
        self.focused.as_ref() == Some(conversation_id)
    }

    pub fn count(&self, conversation_id: &ConversationId) -> u32 {
        self.counts.get(conversation_id).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn remove(&mut self, conversation_id: &ConversationId) {
        self.counts.remove(conversation_id);
        if self.is_focused(conversation_id) {
            self.focused = None;
        }
    }

    /// Keep only the counts of conversations `keep` accepts
    pub fn retain(&mut self, mut keep: impl FnMut(&ConversationId) -> bool) {
        self.counts.retain(|id, _| keep(id));
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.focused = None;
    }
}

/// Online/offline state per user
#[derive(Debug, Default)]
pub struct PresenceTracker {
    online: HashMap<UserId, bool>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest presence event; returns whether it changed anything
    pub fn set_presence(&mut self, user_id: &UserId, online: bool) -> bool {
        let previous = self.online.insert(user_id.clone(), online);
        previous != Some(online)
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.online.get(user_id).copied().unwrap_or(false)
    }

    /// Presence if any event for this user has been seen
    pub fn known(&self, user_id: &UserId) -> Option<bool> {
        self.online.get(user_id).copied()
    }

    pub fn clear(&mut self) {
        self.online.clear();
    }
}
