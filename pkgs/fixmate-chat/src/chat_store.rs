//! Chat store - the single owner of client-side chat state
//!
//! All mutations go through one method per event type, so the order in which
//! the caller invokes them is the order in which state changes. The store is
//! plain data: it does no I/O and never blocks.
//!
//! History fetches are tagged with a [`HistoryTicket`]. Every focus change
//! bumps a generation counter, and a page whose ticket no longer matches the
//! focused conversation is discarded instead of applied.

use crate::conversation_list::{self, ConversationSummary};
use crate::error::{ChatError, Result};
use crate::events::InboundEvent;
use crate::message_store::{AppendOutcome, MessageStore, PageCursor, PrependOutcome};
use crate::models::{Conversation, ConversationId, HistoryPage, Message, Role, UserId};
use crate::outbox::{Attachment, Draft, Outbox, OutboxState, SendPlan};
use crate::selection_cache::{PartSelection, SelectionCache};
use crate::unread_tracker::{PresenceTracker, UnreadCounter};
use crate::ChatConfig;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identifies the conversation and focus generation a history fetch was
/// issued for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTicket {
    pub conversation_id: ConversationId,
    pub generation: u64,
    /// Cursor for an older page, `None` for the first page
    pub before: Option<String>,
}

/// Whether an event changed state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Changed,
    Unchanged,
}

/// Result of applying a fetched history page
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryApplied {
    Replaced,
    Prepended(PrependOutcome),
    /// The ticket was stale; nothing was applied
    Discarded,
}

/// Client-side chat state for one signed-in user
#[derive(Debug)]
pub struct ChatStore {
    local_user: UserId,
    local_role: Role,
    config: ChatConfig,
    conversations: HashMap<ConversationId, Conversation>,
    messages: MessageStore,
    unread: UnreadCounter,
    presence: PresenceTracker,
    outbox: Outbox,
    selections: SelectionCache,
    generation: u64,
    revision: u64,
}

impl ChatStore {
    pub fn new(local_user: UserId, local_role: Role, config: ChatConfig) -> Self {
        Self {
            local_user,
            local_role,
            config,
            conversations: HashMap::new(),
            messages: MessageStore::new(),
            unread: UnreadCounter::new(),
            presence: PresenceTracker::new(),
            outbox: Outbox::new(),
            selections: SelectionCache::new(),
            generation: 0,
            revision: 0,
        }
    }

    pub fn local_user(&self) -> &UserId {
        &self.local_user
    }

    pub fn local_role(&self) -> Role {
        self.local_role
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Incremented on every change; cheap change detection for views
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) -> Applied {
        self.revision += 1;
        Applied::Changed
    }

    // ------------------------------------------------------------------
    // Conversations
    // ------------------------------------------------------------------

    /// Hydrate the inbox from the conversation list endpoint
    pub fn load_conversations(&mut self, conversations: Vec<Conversation>) -> Applied {
        info!("Loaded {} conversations", conversations.len());
        self.conversations.clear();
        for conversation in conversations {
            self.unread
                .set(&conversation.id, conversation.unread_count);
            self.conversations
                .insert(conversation.id.clone(), conversation);
        }
        let conversations = &self.conversations;
        self.unread.retain(|id| conversations.contains_key(id));
        self.touch()
    }

    /// Insert or refresh one conversation's metadata
    pub fn upsert_conversation(&mut self, mut conversation: Conversation) -> Applied {
        self.unread
            .set(&conversation.id, conversation.unread_count);
        let counterpart = conversation.counterpart(self.local_role).user_id.clone();
        if let Some(online) = self.presence.known(&counterpart) {
            conversation.online = online;
        }
        debug!("Upserted conversation {}", conversation.id);
        self.conversations
            .insert(conversation.id.clone(), conversation);
        self.touch()
    }

    /// Drop a conversation from the local cache; the server keeps its history
    pub fn remove_conversation(&mut self, conversation_id: &ConversationId) -> Applied {
        if self.unread.is_focused(conversation_id) {
            self.unfocus();
        }
        let existed = self.conversations.remove(conversation_id).is_some();
        self.messages.remove_conversation(conversation_id);
        self.unread.remove(conversation_id);
        self.outbox.discard(conversation_id);
        if !existed {
            return Applied::Unchanged;
        }
        info!("Removed conversation {}", conversation_id);
        self.touch()
    }

    pub fn conversation(&self, conversation_id: &ConversationId) -> Option<&Conversation> {
        self.conversations.get(conversation_id)
    }

    pub fn conversations(&self) -> impl Iterator<Item = &Conversation> {
        self.conversations.values()
    }

    /// Inbox rows derived from the current state
    pub fn conversation_list(&self) -> Vec<ConversationSummary> {
        conversation_list::project(
            self.conversations.values(),
            &self.messages,
            &self.unread,
            &self.presence,
            self.local_role,
        )
    }

    // ------------------------------------------------------------------
    // Focus and history
    // ------------------------------------------------------------------

    /// Focus a conversation: its unread count drops to zero and stays there
    /// until focus moves. Returns the ticket for the first-page fetch.
    pub fn focus(&mut self, conversation_id: &ConversationId) -> HistoryTicket {
        self.unread.focus(conversation_id);
        if let Some(conversation) = self.conversations.get_mut(conversation_id) {
            conversation.unread_count = 0;
        }
        self.generation += 1;
        self.touch();
        info!(
            "Focused {} (generation {})",
            conversation_id, self.generation
        );
        HistoryTicket {
            conversation_id: conversation_id.clone(),
            generation: self.generation,
            before: None,
        }
    }

    pub fn unfocus(&mut self) -> Option<ConversationId> {
        let previous = self.unread.unfocus();
        if previous.is_some() {
            self.generation += 1;
            self.touch();
        }
        previous
    }

    pub fn focused(&self) -> Option<&ConversationId> {
        self.unread.focused()
    }

    /// Ticket for fetching the page before the oldest loaded message, or
    /// `None` when the server reported no more history.
    pub fn begin_older_history(&self, conversation_id: &ConversationId) -> Option<HistoryTicket> {
        let before = self.messages.older_cursor(conversation_id)?;
        Some(HistoryTicket {
            conversation_id: conversation_id.clone(),
            generation: self.generation,
            before: Some(before),
        })
    }

    /// Apply a fetched page if its ticket is still current
    pub fn apply_history(&mut self, ticket: &HistoryTicket, page: HistoryPage) -> HistoryApplied {
        let current = self.unread.is_focused(&ticket.conversation_id)
            && ticket.generation == self.generation;
        if !current {
            warn!(
                "Discarding stale history page for {} (generation {}, now {})",
                ticket.conversation_id, ticket.generation, self.generation
            );
            return HistoryApplied::Discarded;
        }

        let applied = match ticket.before {
            None => {
                self.messages.replace_page(&ticket.conversation_id, page);
                HistoryApplied::Replaced
            }
            Some(_) => {
                HistoryApplied::Prepended(self.messages.load_page(&ticket.conversation_id, page))
            }
        };
        self.touch();
        applied
    }

    pub fn messages(&self, conversation_id: &ConversationId) -> &[Message] {
        self.messages.messages(conversation_id)
    }

    pub fn cursor(&self, conversation_id: &ConversationId) -> Option<&PageCursor> {
        self.messages.cursor(conversation_id)
    }

    pub fn is_history_loaded(&self, conversation_id: &ConversationId) -> bool {
        self.messages.is_loaded(conversation_id)
    }

    // ------------------------------------------------------------------
    // Server events
    // ------------------------------------------------------------------

    /// Apply one server event. Events must be applied in receipt order.
    pub fn apply(&mut self, event: InboundEvent) -> Applied {
        match event {
            InboundEvent::NewMessage { message } => self.on_new_message(message),
            InboundEvent::ChatListUpdated { conversation } => self.upsert_conversation(conversation),
            InboundEvent::ChatJoined { conversation_id } => {
                debug!("Joined room {}", conversation_id);
                Applied::Unchanged
            }
            InboundEvent::ChatError { message } => {
                warn!("Chat server reported: {}", message);
                Applied::Unchanged
            }
            InboundEvent::MessagesRead {
                conversation_id,
                reader_role,
            } => self.on_messages_read(&conversation_id, reader_role),
            InboundEvent::UserOnline { user_id } => self.set_presence(&user_id, true),
            InboundEvent::UserOffline { user_id } => self.set_presence(&user_id, false),
        }
    }

    fn on_new_message(&mut self, message: Message) -> Applied {
        let conversation_id = message.conversation_id.clone();
        let from_counterpart = message.sender_role != self.local_role;

        let outcome = self.messages.append_inbound(&conversation_id, message);
        if outcome == AppendOutcome::Inserted && from_counterpart {
            self.unread.increment(&conversation_id);
        }
        debug!("new_message in {}: {:?}", conversation_id, outcome);
        self.touch()
    }

    fn on_messages_read(&mut self, conversation_id: &ConversationId, reader_role: Role) -> Applied {
        if reader_role != self.local_role {
            debug!(
                "{} read messages in {}",
                reader_role, conversation_id
            );
            return Applied::Unchanged;
        }
        self.unread.reset(conversation_id);
        if let Some(conversation) = self.conversations.get_mut(conversation_id) {
            conversation.unread_count = 0;
        }
        self.touch()
    }

    /// Record presence and refresh every conversation with that user
    pub fn set_presence(&mut self, user_id: &UserId, online: bool) -> Applied {
        if !self.presence.set_presence(user_id, online) {
            return Applied::Unchanged;
        }
        for conversation in self.conversations.values_mut() {
            if conversation.involves(user_id) && &self.local_user != user_id {
                conversation.online = online;
            }
        }
        debug!("{} is {}", user_id, if online { "online" } else { "offline" });
        self.touch()
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.presence.is_online(user_id)
    }

    pub fn unread_count(&self, conversation_id: &ConversationId) -> u32 {
        self.unread.count(conversation_id)
    }

    pub fn total_unread(&self) -> u32 {
        self.unread.total()
    }

    // ------------------------------------------------------------------
    // Compose / outbox
    // ------------------------------------------------------------------

    pub fn set_draft_text(&mut self, conversation_id: &ConversationId, text: impl Into<String>) {
        self.outbox.set_text(conversation_id, text);
        self.touch();
    }

    /// Validate and stage an attachment; an invalid file leaves the draft as it was
    pub fn stage_attachment(
        &mut self,
        conversation_id: &ConversationId,
        attachment: Attachment,
    ) -> Result<()> {
        self.outbox
            .stage_attachment(conversation_id, attachment, &self.config.attachment_policy)?;
        self.touch();
        Ok(())
    }

    pub fn clear_attachment(&mut self, conversation_id: &ConversationId) {
        self.outbox.clear_attachment(conversation_id);
        self.touch();
    }

    pub fn draft(&self, conversation_id: &ConversationId) -> Option<&Draft> {
        self.outbox.draft(conversation_id)
    }

    pub fn outbox_state(&self, conversation_id: &ConversationId) -> OutboxState {
        self.outbox.state(conversation_id)
    }

    /// Start a send attempt and insert its optimistic copy
    pub fn begin_send(
        &mut self,
        conversation_id: &ConversationId,
        connected: bool,
        now: DateTime<Utc>,
    ) -> Result<SendPlan> {
        if !self.conversations.contains_key(conversation_id) {
            return Err(ChatError::ConversationNotFound(conversation_id.to_string()));
        }
        let plan = self.outbox.begin_send(conversation_id, connected)?;
        self.messages.append_outbound_optimistic(
            conversation_id,
            plan.client_ref,
            self.local_role,
            plan.body(),
            now,
        );
        self.touch();
        Ok(plan)
    }

    /// Finish a send attempt. `confirmed` is the server copy when the route
    /// returned one (REST); otherwise the echo reconciles later.
    pub fn complete_send(
        &mut self,
        conversation_id: &ConversationId,
        client_ref: Uuid,
        confirmed: Option<Message>,
    ) {
        self.outbox.complete(conversation_id, client_ref);
        if let Some(mut message) = confirmed {
            if message.client_ref.is_none() {
                message.client_ref = Some(client_ref);
            }
            self.messages.append_inbound(conversation_id, message);
        }
        self.touch();
    }

    /// Fail a send attempt: the draft stays, the optimistic copy goes
    pub fn fail_send(
        &mut self,
        conversation_id: &ConversationId,
        client_ref: Uuid,
        reason: impl Into<String>,
    ) {
        self.outbox.fail(conversation_id, client_ref, reason);
        self.messages.discard_pending(conversation_id, client_ref);
        self.touch();
    }

    /// Whether a send's optimistic copy is still waiting for the server copy
    pub fn is_send_pending(&self, conversation_id: &ConversationId, client_ref: Uuid) -> bool {
        self.messages.is_pending(conversation_id, client_ref)
    }

    /// Undo a completed send the server never received: the optimistic copy
    /// goes and the text returns to the draft as a failed attempt
    pub fn restore_send(&mut self, plan: &SendPlan, reason: impl Into<String>) {
        self.messages
            .discard_pending(&plan.conversation_id, plan.client_ref);
        self.outbox.restore(
            &plan.conversation_id,
            plan.text.as_deref().unwrap_or_default(),
            reason,
        );
        self.touch();
    }

    pub fn retry_send(&mut self, conversation_id: &ConversationId) -> bool {
        let retried = self.outbox.retry(conversation_id);
        if retried {
            self.touch();
        }
        retried
    }

    // ------------------------------------------------------------------
    // Quotation part selection
    // ------------------------------------------------------------------

    pub fn select_part(&mut self, job_id: &str, part: PartSelection) {
        self.selections.select(job_id, part);
        self.touch();
    }

    pub fn deselect_part(&mut self, job_id: &str, part_id: &str) {
        self.selections.deselect(job_id, part_id);
        self.touch();
    }

    pub fn selected_parts(&self, job_id: &str) -> &[PartSelection] {
        self.selections.selected(job_id)
    }

    pub fn selected_parts_total(&self, job_id: &str) -> u64 {
        self.selections.parts_total(job_id)
    }

    pub fn close_selection(&mut self, job_id: &str) {
        self.selections.close(job_id);
        self.touch();
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Tear down all state. In-flight history tickets become stale.
    pub fn sign_out(&mut self) {
        info!("Clearing chat state for {}", self.local_user);
        self.conversations.clear();
        self.messages.clear();
        self.unread.clear();
        self.presence.clear();
        self.outbox.clear();
        self.selections.clear();
        self.generation += 1;
        self.touch();
    }
}
