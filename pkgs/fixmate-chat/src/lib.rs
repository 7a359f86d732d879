//! Fixmate Chat - client-side chat state for the customer/repairman marketplace
//!
//! This crate holds the state and consistency rules of the marketplace chat.
//! It performs no I/O: the `fixmate-client` crate feeds it with REST responses
//! and real-time events and carries out the sends it plans.
//!
//! # Architecture
//!
//! - **MessageStore**: ordered, deduplicated message log per conversation,
//!   optimistic/confirmed reconciliation and pagination cursors
//! - **UnreadCounter / PresenceTracker**: unread counts (zero while focused)
//!   and last-write-wins presence
//! - **conversation_list**: the inbox projection, derived on demand
//! - **Outbox**: drafts, attachment staging and the send attempt state machine
//! - **SelectionCache**: parts picked for a quotation, scoped per job
//! - **ChatStore**: owns all of the above and serializes every mutation
//!
//! # Example Usage
//!
//! ```rust
//! use fixmate_chat::{ChatConfig, ChatStore, ConversationId, Role, UserId};
//!
//! let mut store = ChatStore::new(UserId::from("u-1"), Role::Customer, ChatConfig::default());
//! let conversation = ConversationId::from("c-1");
//! let ticket = store.focus(&conversation);
//! assert_eq!(ticket.before, None);
//! assert_eq!(store.unread_count(&conversation), 0);
//! ```

pub mod chat_store;
pub mod conversation_list;
pub mod error;
pub mod events;
pub mod message_store;
pub mod models;
pub mod outbox;
pub mod selection_cache;
pub mod unread_tracker;

pub use chat_store::{Applied, ChatStore, HistoryApplied, HistoryTicket};
pub use conversation_list::ConversationSummary;
pub use error::{ChatError, Result};
pub use events::{InboundEvent, OutboundCommand};
pub use message_store::{AppendOutcome, MessageStore, PageCursor, PrependOutcome};
pub use models::{
    Conversation, ConversationId, DeliveryStatus, DeviceInfo, HistoryPage, LastMessage, MediaRef,
    Message, MessageBody, MessageId, Participant, PricingBreakdown, Quotation, QuotationStatus,
    Role, UserId,
};
pub use outbox::{
    Attachment, AttachmentPolicy, Draft, Outbox, OutboxState, SendPlan, SendRoute,
};
pub use selection_cache::{PartSelection, SelectionCache};
pub use unread_tracker::{PresenceTracker, UnreadCounter};

/// Configuration for the chat state
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Messages requested per history page (default: 30)
    pub page_size: usize,

    /// Limits for staged attachments (default: 10MB, images and PDF)
    pub attachment_policy: AttachmentPolicy,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            page_size: 30,
            attachment_policy: AttachmentPolicy::default(),
        }
    }
}
