//! Chat data model: participants, conversations and messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Server-assigned conversation identifier
    ConversationId
);
string_id!(
    /// Server-assigned user identifier, the key for presence
    UserId
);

/// Which side of the marketplace a participant is on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Repairman,
}

impl Role {
    pub fn counterpart(self) -> Role {
        match self {
            Role::Customer => Role::Repairman,
            Role::Repairman => Role::Customer,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Repairman => "repairman",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "repairman" => Ok(Role::Repairman),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Minimal profile shown next to a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub user_id: UserId,
    pub name: String,
    pub avatar_url: Option<String>,
    pub verified: bool,
}

/// Server-side summary of the latest message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LastMessage {
    pub preview: String,
    pub timestamp: DateTime<Utc>,
    pub sender_role: Role,
}

/// Conversation metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: ConversationId,
    pub customer: Participant,
    pub repairman: Participant,
    /// Whether the counterpart of the local user is online
    pub online: bool,
    pub last_message: Option<LastMessage>,
    pub unread_count: u32,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn participant(&self, role: Role) -> &Participant {
        match role {
            Role::Customer => &self.customer,
            Role::Repairman => &self.repairman,
        }
    }

    /// The participant on the other side from `local_role`
    pub fn counterpart(&self, local_role: Role) -> &Participant {
        self.participant(local_role.counterpart())
    }

    pub fn involves(&self, user_id: &UserId) -> bool {
        &self.customer.user_id == user_id || &self.repairman.user_id == user_id
    }
}

/// Message identifier.
///
/// A message sent from this client carries a `Local` id until the server
/// confirms it; every other message carries the server id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageId {
    Local(Uuid),
    Server(String),
}

impl MessageId {
    pub fn is_local(&self) -> bool {
        matches!(self, MessageId::Local(_))
    }

    pub fn as_server(&self) -> Option<&str> {
        match self {
            MessageId::Server(id) => Some(id),
            MessageId::Local(_) => None,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Local(id) => write!(f, "local-{}", id),
            MessageId::Server(id) => f.write_str(id),
        }
    }
}

/// Uploaded file reference; `url` is absent while the upload is pending
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaRef {
    pub url: Option<String>,
    pub filename: String,
}

/// Device a quotation refers to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceInfo {
    pub brand: String,
    pub model: String,
    pub issue: String,
}

/// Quotation price breakdown in minor currency units
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingBreakdown {
    pub parts: u64,
    pub labor: u64,
    pub other: u64,
    pub currency: String,
}

impl PricingBreakdown {
    pub fn total(&self) -> u64 {
        self.parts
            .saturating_add(self.labor)
            .saturating_add(self.other)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuotationStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

/// A priced service offer sent inside a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quotation {
    pub device: DeviceInfo,
    pub pricing: PricingBreakdown,
    pub valid_until: DateTime<Utc>,
    pub status: QuotationStatus,
}

impl Quotation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.valid_until
    }

    /// A pending quotation past its validity reads as expired.
    pub fn effective_status(&self, now: DateTime<Utc>) -> QuotationStatus {
        match self.status {
            QuotationStatus::Pending if self.is_expired(now) => QuotationStatus::Expired,
            status => status,
        }
    }
}

/// Message payload, one variant per message kind
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    Text {
        text: String,
    },
    Image {
        media: MediaRef,
        caption: Option<String>,
    },
    File {
        media: MediaRef,
        caption: Option<String>,
    },
    Mixed {
        text: Option<String>,
        media: Vec<MediaRef>,
    },
    Quotation(Quotation),
}

impl MessageBody {
    pub fn text(text: impl Into<String>) -> Self {
        MessageBody::Text { text: text.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MessageBody::Text { .. } => "text",
            MessageBody::Image { .. } => "image",
            MessageBody::File { .. } => "file",
            MessageBody::Mixed { .. } => "mixed",
            MessageBody::Quotation(_) => "quotation",
        }
    }

    /// Text content, if the kind carries any
    pub fn content(&self) -> Option<&str> {
        match self {
            MessageBody::Text { text } => Some(text),
            MessageBody::Image { caption, .. } | MessageBody::File { caption, .. } => {
                caption.as_deref()
            }
            MessageBody::Mixed { text, .. } => text.as_deref(),
            MessageBody::Quotation(_) => None,
        }
    }

    /// One-line summary for the inbox
    pub fn preview(&self) -> String {
        match self {
            MessageBody::Text { text } => text.clone(),
            MessageBody::Image { media, caption } => caption
                .clone()
                .unwrap_or_else(|| format!("[image] {}", media.filename)),
            MessageBody::File { media, caption } => caption
                .clone()
                .unwrap_or_else(|| format!("[file] {}", media.filename)),
            MessageBody::Mixed { text, media } => text
                .clone()
                .unwrap_or_else(|| format!("[{} attachments]", media.len())),
            MessageBody::Quotation(q) => format!(
                "[quotation] {} {} {}",
                q.device.brand, q.device.model, q.pricing.total()
            ),
        }
    }

    /// Key used to pair a pending local message with its server echo when
    /// no identifier links them.
    pub fn reconcile_key(&self) -> String {
        match self {
            MessageBody::Text { text } => format!("text:{}", text.trim()),
            MessageBody::Image { media, caption } | MessageBody::File { media, caption } => {
                format!(
                    "media:{}:{}",
                    media.filename,
                    caption.as_deref().unwrap_or("").trim()
                )
            }
            MessageBody::Mixed { text, media } => {
                let names: Vec<&str> = media.iter().map(|m| m.filename.as_str()).collect();
                format!(
                    "mixed:{}:{}",
                    text.as_deref().unwrap_or("").trim(),
                    names.join(",")
                )
            }
            MessageBody::Quotation(q) => format!(
                "quotation:{}:{}:{}",
                q.device.brand,
                q.device.model,
                q.pricing.total()
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeliveryStatus {
    PendingLocal,
    Delivered,
}

/// A chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_role: Role,
    pub body: MessageBody,
    pub timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
    /// Temporary id of the optimistic copy, echoed back by the server
    pub client_ref: Option<Uuid>,
}

impl Message {
    pub fn is_pending(&self) -> bool {
        self.status == DeliveryStatus::PendingLocal
    }
}

/// One page of history as returned by the REST API
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
    pub has_more: bool,
    pub oldest_message_id: Option<String>,
}
