//! Message store - ordered, deduplicated per-conversation message logs
//!
//! Every conversation keeps its messages sorted by timestamp ascending, with
//! ties kept in arrival order. Identifiers are unique within a conversation:
//!
//! 1. An inbound message whose server id is already present replaces the
//!    stored copy (the server data is authoritative).
//! 2. Otherwise, a pending local message is reconciled with it, matched by
//!    `client_ref` when the server echoes one, or else by sender role plus
//!    content for the earliest pending candidate.
//! 3. Otherwise the message is inserted.
//!
//! Older history is merged in by [`MessageStore::load_page`], which never
//! reorders entries that are already loaded.

use crate::models::{
    ConversationId, DeliveryStatus, HistoryPage, Message, MessageBody, MessageId, Role,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

/// Pagination state for backward scrolling
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageCursor {
    /// Oldest server message loaded so far
    pub oldest: Option<String>,
    pub has_more: bool,
}

/// What [`MessageStore::append_inbound`] did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// New message, appended at its timestamp position
    Inserted,
    /// Replaced a pending local copy
    Reconciled,
    /// Same server id was already stored; data refreshed
    Updated,
}

/// Result of prepending an older page
#[derive(Debug, Clone, PartialEq)]
pub struct PrependOutcome {
    pub inserted: usize,
    /// Message that was first before the prepend. A renderer keeps it in
    /// place to compensate for the height added above it.
    pub anchor: Option<MessageId>,
}

#[derive(Debug, Clone, Default)]
struct ConversationLog {
    messages: Vec<Message>,
    cursor: PageCursor,
    loaded: bool,
}

impl ConversationLog {
    fn position_of(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|m| &m.id == id)
    }

    fn insert_sorted(&mut self, message: Message) -> usize {
        let idx = self
            .messages
            .partition_point(|m| m.timestamp <= message.timestamp);
        self.messages.insert(idx, message);
        idx
    }

    fn find_pending_match(&self, message: &Message) -> Option<usize> {
        if let Some(client_ref) = message.client_ref {
            return self.messages.iter().position(|m| {
                m.is_pending()
                    && (m.client_ref == Some(client_ref) || m.id == MessageId::Local(client_ref))
            });
        }

        let key = message.body.reconcile_key();
        self.messages.iter().position(|m| {
            m.is_pending() && m.sender_role == message.sender_role && m.body.reconcile_key() == key
        })
    }
}

/// Per-conversation message logs
#[derive(Debug, Default)]
pub struct MessageStore {
    logs: HashMap<ConversationId, ConversationLog>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a server-delivered message, deduplicating and reconciling
    pub fn append_inbound(
        &mut self,
        conversation_id: &ConversationId,
        mut message: Message,
    ) -> AppendOutcome {
        message.status = DeliveryStatus::Delivered;
        let log = self.logs.entry(conversation_id.clone()).or_default();

        if let Some(idx) = log.position_of(&message.id) {
            if message.client_ref.is_none() {
                message.client_ref = log.messages[idx].client_ref;
            }
            if log.messages[idx].timestamp == message.timestamp {
                log.messages[idx] = message.clone();
            } else {
                log.messages.remove(idx);
                log.insert_sorted(message.clone());
            }
            // An earlier echo may have landed before the confirmation that
            // carries the client_ref
            if let Some(client_ref) = message.client_ref {
                log.messages.retain(|m| {
                    !(m.is_pending()
                        && (m.client_ref == Some(client_ref)
                            || m.id == MessageId::Local(client_ref)))
                });
            }
            debug!("Refreshed message in {}", conversation_id);
            return AppendOutcome::Updated;
        }

        if let Some(idx) = log.find_pending_match(&message) {
            let pending = log.messages.remove(idx);
            debug!(
                "Reconciled pending {} with {} in {}",
                pending.id, message.id, conversation_id
            );
            if message.client_ref.is_none() {
                message.client_ref = pending.client_ref;
            }
            log.insert_sorted(message);
            return AppendOutcome::Reconciled;
        }

        log.insert_sorted(message);
        AppendOutcome::Inserted
    }

    /// Insert a locally composed message before the server has seen it.
    ///
    /// `client_ref` becomes the temporary id until the server echo arrives.
    pub fn append_outbound_optimistic(
        &mut self,
        conversation_id: &ConversationId,
        client_ref: Uuid,
        sender_role: Role,
        body: MessageBody,
        now: DateTime<Utc>,
    ) -> Message {
        let message = Message {
            id: MessageId::Local(client_ref),
            conversation_id: conversation_id.clone(),
            sender_role,
            body,
            timestamp: now,
            status: DeliveryStatus::PendingLocal,
            client_ref: Some(client_ref),
        };

        self.logs
            .entry(conversation_id.clone())
            .or_default()
            .insert_sorted(message.clone());
        debug!("Optimistic {} in {}", message.id, conversation_id);
        message
    }

    /// Merge an older page in front of the loaded history.
    ///
    /// The page is applied as a whole: messages already present are skipped
    /// and the relative order of loaded messages is never changed.
    pub fn load_page(
        &mut self,
        conversation_id: &ConversationId,
        page: HistoryPage,
    ) -> PrependOutcome {
        let mut log = self.logs.get(conversation_id).cloned().unwrap_or_default();
        let anchor = log.messages.first().map(|m| m.id.clone());

        let mut inserted = 0;
        for mut message in page.messages {
            if log.position_of(&message.id).is_some() {
                continue;
            }
            message.status = DeliveryStatus::Delivered;
            log.insert_sorted(message);
            inserted += 1;
        }

        log.cursor.has_more = page.has_more;
        if let Some(oldest) = page.oldest_message_id.or_else(|| oldest_server_id(&log)) {
            log.cursor.oldest = Some(oldest);
        }
        log.loaded = true;

        info!(
            "Prepended {} messages to {} (has_more: {})",
            inserted, conversation_id, log.cursor.has_more
        );
        self.logs.insert(conversation_id.clone(), log);

        PrependOutcome { inserted, anchor }
    }

    /// Replace a conversation's history with a freshly fetched first page.
    ///
    /// Pending local messages survive unless the page already carries their
    /// confirmed copy.
    pub fn replace_page(&mut self, conversation_id: &ConversationId, page: HistoryPage) {
        let pending: Vec<Message> = self
            .logs
            .get(conversation_id)
            .map(|log| log.messages.iter().filter(|m| m.is_pending()).cloned().collect())
            .unwrap_or_default();

        let mut log = ConversationLog::default();
        let mut seen = HashSet::new();
        for mut message in page.messages {
            if !seen.insert(message.id.clone()) {
                continue;
            }
            message.status = DeliveryStatus::Delivered;
            log.insert_sorted(message);
        }

        for message in pending {
            let confirmed = log
                .messages
                .iter()
                .any(|m| m.client_ref.is_some() && m.client_ref == message.client_ref);
            if !confirmed {
                log.insert_sorted(message);
            }
        }

        log.cursor = PageCursor {
            oldest: page.oldest_message_id.or_else(|| oldest_server_id(&log)),
            has_more: page.has_more,
        };
        log.loaded = true;

        info!(
            "Loaded {} messages into {}",
            log.messages.len(),
            conversation_id
        );
        self.logs.insert(conversation_id.clone(), log);
    }

    /// Drop an optimistic entry whose send failed
    pub fn discard_pending(&mut self, conversation_id: &ConversationId, client_ref: Uuid) -> bool {
        let Some(log) = self.logs.get_mut(conversation_id) else {
            return false;
        };
        let before = log.messages.len();
        log.messages
            .retain(|m| !(m.is_pending() && m.client_ref == Some(client_ref)));
        before != log.messages.len()
    }

    /// Whether the optimistic copy for `client_ref` still awaits its server copy
    pub fn is_pending(&self, conversation_id: &ConversationId, client_ref: Uuid) -> bool {
        self.logs.get(conversation_id).is_some_and(|log| {
            log.messages
                .iter()
                .any(|m| m.is_pending() && m.client_ref == Some(client_ref))
        })
    }

    pub fn messages(&self, conversation_id: &ConversationId) -> &[Message] {
        self.logs
            .get(conversation_id)
            .map(|log| log.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn latest(&self, conversation_id: &ConversationId) -> Option<&Message> {
        self.logs
            .get(conversation_id)
            .and_then(|log| log.messages.last())
    }

    pub fn contains(&self, conversation_id: &ConversationId, id: &MessageId) -> bool {
        self.logs
            .get(conversation_id)
            .is_some_and(|log| log.position_of(id).is_some())
    }

    pub fn cursor(&self, conversation_id: &ConversationId) -> Option<&PageCursor> {
        self.logs.get(conversation_id).map(|log| &log.cursor)
    }

    /// Whether the first page has been fetched
    pub fn is_loaded(&self, conversation_id: &ConversationId) -> bool {
        self.logs.get(conversation_id).is_some_and(|log| log.loaded)
    }

    /// Cursor for the next backward fetch, `None` when there is nothing older
    pub fn older_cursor(&self, conversation_id: &ConversationId) -> Option<String> {
        let log = self.logs.get(conversation_id)?;
        if !log.loaded || !log.cursor.has_more {
            return None;
        }
        log.cursor.oldest.clone()
    }

    pub fn remove_conversation(&mut self, conversation_id: &ConversationId) {
        self.logs.remove(conversation_id);
    }

    pub fn clear(&mut self) {
        self.logs.clear();
    }
}

fn oldest_server_id(log: &ConversationLog) -> Option<String> {
    log.messages
        .iter()
        .find_map(|m| m.id.as_server().map(str::to_string))
}
