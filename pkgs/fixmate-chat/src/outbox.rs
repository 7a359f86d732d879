//! Compose/outbox state
//!
//! Each conversation has one draft (text plus at most one staged
//! attachment) and one send attempt state:
//!
//! ```text
//! Idle -> Sending -> Delivered
//!                 -> Failed -> (retry) Idle
//! ```
//!
//! The draft is cleared only when an attempt is delivered; a failed attempt
//! leaves it intact for the retry.

use crate::error::{ChatError, Result};
use crate::models::{ConversationId, MediaRef, MessageBody};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A file staged for upload
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

impl Attachment {
    /// Build an attachment, guessing the content type from the file name
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let filename = filename.into();
        let content_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            filename,
            content_type,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

/// Client-side limits checked before an attachment is staged
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentPolicy {
    /// Maximum size in bytes
    pub max_size: u64,
    pub allowed_types: Vec<String>,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            max_size: 10 * 1024 * 1024, // 10MB
            allowed_types: [
                "image/jpeg",
                "image/png",
                "image/gif",
                "image/webp",
                "application/pdf",
            ]
            .iter()
            .map(|t| t.to_string())
            .collect(),
        }
    }
}

impl AttachmentPolicy {
    pub fn validate(&self, attachment: &Attachment) -> Result<()> {
        if attachment.data.is_empty() {
            return Err(ChatError::Validation(format!(
                "{} is empty",
                attachment.filename
            )));
        }
        if attachment.size() > self.max_size {
            return Err(ChatError::Validation(format!(
                "{} is {} bytes, the maximum is {} bytes",
                attachment.filename,
                attachment.size(),
                self.max_size
            )));
        }
        if !self
            .allowed_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&attachment.content_type))
        {
            return Err(ChatError::Validation(format!(
                "{} has type {}, allowed types are {}",
                attachment.filename,
                attachment.content_type,
                self.allowed_types.join(", ")
            )));
        }
        Ok(())
    }
}

/// Unsent input for one conversation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    pub text: String,
    pub attachment: Option<Attachment>,
}

impl Draft {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachment.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutboxState {
    #[default]
    Idle,
    Sending,
    Delivered,
    Failed(String),
}

/// Channel a send goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRoute {
    /// Live connection, plain text only
    Realtime,
    /// REST, JSON or multipart
    Rest,
}

/// Everything needed to carry out one send attempt
#[derive(Debug, Clone, PartialEq)]
pub struct SendPlan {
    pub conversation_id: ConversationId,
    pub route: SendRoute,
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
    /// Temporary id of the optimistic copy
    pub client_ref: Uuid,
}

impl SendPlan {
    /// Body of the optimistic copy
    pub fn body(&self) -> MessageBody {
        match &self.attachment {
            Some(attachment) => {
                let media = MediaRef {
                    url: None,
                    filename: attachment.filename.clone(),
                };
                if attachment.is_image() {
                    MessageBody::Image {
                        media,
                        caption: self.text.clone(),
                    }
                } else {
                    MessageBody::File {
                        media,
                        caption: self.text.clone(),
                    }
                }
            }
            None => MessageBody::text(self.text.clone().unwrap_or_default()),
        }
    }
}

#[derive(Debug, Default)]
struct OutboxEntry {
    draft: Draft,
    state: OutboxState,
    in_flight: Option<Uuid>,
}

/// Drafts and send attempts for every conversation
#[derive(Debug, Default)]
pub struct Outbox {
    entries: HashMap<ConversationId, OutboxEntry>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_text(&mut self, conversation_id: &ConversationId, text: impl Into<String>) {
        self.entries
            .entry(conversation_id.clone())
            .or_default()
            .draft
            .text = text.into();
    }

    /// Validate and stage an attachment, replacing any staged one
    pub fn stage_attachment(
        &mut self,
        conversation_id: &ConversationId,
        attachment: Attachment,
        policy: &AttachmentPolicy,
    ) -> Result<()> {
        if let Err(e) = policy.validate(&attachment) {
            warn!("Rejected attachment for {}: {}", conversation_id, e);
            return Err(e);
        }
        let entry = self.entries.entry(conversation_id.clone()).or_default();
        if let Some(previous) = entry.draft.attachment.replace(attachment) {
            debug!("Replaced staged attachment {}", previous.filename);
        }
        Ok(())
    }

    pub fn clear_attachment(&mut self, conversation_id: &ConversationId) {
        if let Some(entry) = self.entries.get_mut(conversation_id) {
            entry.draft.attachment = None;
        }
    }

    pub fn draft(&self, conversation_id: &ConversationId) -> Option<&Draft> {
        self.entries.get(conversation_id).map(|e| &e.draft)
    }

    pub fn state(&self, conversation_id: &ConversationId) -> OutboxState {
        self.entries
            .get(conversation_id)
            .map(|e| e.state.clone())
            .unwrap_or_default()
    }

    /// Start an attempt and decide its route.
    ///
    /// Plain text goes over the live channel when it is up; attachments, and
    /// everything while disconnected, go through REST.
    pub fn begin_send(
        &mut self,
        conversation_id: &ConversationId,
        connected: bool,
    ) -> Result<SendPlan> {
        let entry = self
            .entries
            .get_mut(conversation_id)
            .filter(|e| !e.draft.is_empty())
            .ok_or_else(|| ChatError::Validation("Nothing to send".to_string()))?;

        match &entry.state {
            OutboxState::Sending => {
                return Err(ChatError::InvalidState(format!(
                    "A send is already in progress for {}",
                    conversation_id
                )))
            }
            OutboxState::Failed(reason) => {
                info!("Retrying send for {} after: {}", conversation_id, reason);
            }
            OutboxState::Idle | OutboxState::Delivered => {}
        }

        let text = Some(entry.draft.text.trim().to_string()).filter(|t| !t.is_empty());
        let attachment = entry.draft.attachment.clone();
        let route = if connected && attachment.is_none() {
            SendRoute::Realtime
        } else {
            SendRoute::Rest
        };

        let client_ref = Uuid::new_v4();
        entry.state = OutboxState::Sending;
        entry.in_flight = Some(client_ref);

        Ok(SendPlan {
            conversation_id: conversation_id.clone(),
            route,
            text,
            attachment,
            client_ref,
        })
    }

    /// Mark the attempt delivered and clear the draft
    pub fn complete(&mut self, conversation_id: &ConversationId, client_ref: Uuid) -> bool {
        match self.entries.get_mut(conversation_id) {
            Some(entry) if entry.in_flight == Some(client_ref) => {
                entry.draft = Draft::default();
                entry.state = OutboxState::Delivered;
                entry.in_flight = None;
                true
            }
            _ => false,
        }
    }

    /// Mark the attempt failed, keeping the draft
    pub fn fail(
        &mut self,
        conversation_id: &ConversationId,
        client_ref: Uuid,
        reason: impl Into<String>,
    ) -> bool {
        match self.entries.get_mut(conversation_id) {
            Some(entry) if entry.in_flight == Some(client_ref) => {
                entry.state = OutboxState::Failed(reason.into());
                entry.in_flight = None;
                true
            }
            _ => false,
        }
    }

    /// Hand the text of a send that was lost after completing back to the
    /// draft. Text typed since then wins; an attempt in flight is left alone.
    pub fn restore(
        &mut self,
        conversation_id: &ConversationId,
        text: &str,
        reason: impl Into<String>,
    ) -> bool {
        let entry = self.entries.entry(conversation_id.clone()).or_default();
        if entry.in_flight.is_some() {
            return false;
        }
        if entry.draft.text.trim().is_empty() {
            entry.draft.text = text.to_string();
        }
        entry.state = OutboxState::Failed(reason.into());
        true
    }

    /// Return a failed attempt to idle
    pub fn retry(&mut self, conversation_id: &ConversationId) -> bool {
        match self.entries.get_mut(conversation_id) {
            Some(entry) if matches!(entry.state, OutboxState::Failed(_)) => {
                entry.state = OutboxState::Idle;
                true
            }
            _ => false,
        }
    }

    pub fn discard(&mut self, conversation_id: &ConversationId) {
        self.entries.remove(conversation_id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
