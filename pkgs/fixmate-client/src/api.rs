//! REST client for the chat backend
//!
//! [`ChatApi`] is the seam the orchestrator talks to; [`RestApi`] is the
//! reqwest implementation. Every request carries the bearer token, and a 401
//! surfaces as [`ChatError::Unauthorized`] so the caller can end the session.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fixmate_chat::{
    Attachment, ChatError, Conversation, ConversationId, DeviceInfo, HistoryPage, Message,
    PricingBreakdown, Result, UserId,
};
use reqwest::{multipart, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::wire::{WireConversation, WireHistoryPage, WireMessage};

/// Quotation as composed by a repairman before it is sent
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationDraft {
    pub device: DeviceInfo,
    pub pricing: PricingBreakdown,
    pub valid_until: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotationDecision {
    Accept,
    Reject,
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;

    /// Open (or reuse) the conversation with another user
    async fn start_conversation(&self, participant: &UserId) -> Result<Conversation>;

    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
        before: Option<&str>,
    ) -> Result<HistoryPage>;

    async fn send_message(
        &self,
        conversation_id: &ConversationId,
        text: &str,
        client_ref: Uuid,
    ) -> Result<Message>;

    /// Multipart upload of one attachment with an optional caption
    async fn send_attachment(
        &self,
        conversation_id: &ConversationId,
        text: Option<&str>,
        attachment: &Attachment,
        client_ref: Uuid,
    ) -> Result<Message>;

    async fn create_quotation(
        &self,
        conversation_id: &ConversationId,
        quotation: &QuotationDraft,
    ) -> Result<Message>;

    async fn respond_quotation(
        &self,
        message_id: &str,
        decision: QuotationDecision,
    ) -> Result<Message>;

    async fn mark_as_read(&self, conversation_id: &ConversationId) -> Result<()>;
}

/// Map a non-success status to an error, `None` for 2xx
pub fn classify_status(status: StatusCode, body: &str) -> Option<ChatError> {
    if status.is_success() {
        return None;
    }
    if status == StatusCode::UNAUTHORIZED {
        return Some(ChatError::Unauthorized);
    }
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                body.trim().to_string()
            }
        });
    Some(ChatError::Server {
        status: status.as_u16(),
        message,
    })
}

fn transport_error(context: &str, e: reqwest::Error) -> ChatError {
    if e.is_timeout() {
        ChatError::Timeout(format!("{} timed out", context))
    } else {
        ChatError::Network(format!("{} failed: {}", context, e))
    }
}

pub struct RestApi {
    http: Client,
    uploads: Client,
    base_url: Url,
    token: String,
}

impl RestApi {
    pub fn new(
        base_url: &str,
        token: impl Into<String>,
        request_timeout: Duration,
        upload_timeout: Duration,
    ) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| ChatError::InvalidState(format!("invalid API url '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ChatError::InvalidState(format!(
                "API url '{}' cannot carry a path",
                base_url
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let build = |timeout: Duration| {
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| ChatError::Network(format!("failed to build HTTP client: {}", e)))
        };
        Ok(Self {
            http: build(request_timeout)?,
            uploads: build(upload_timeout)?,
            base_url,
            token: token.into(),
        })
    }

    /// Endpoint under the base URL; each segment is percent-encoded
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ChatError::InvalidState(format!("API url '{}' cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authed(&self, client: &Client, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        Ok(client
            .request(method, self.url(segments)?)
            .bearer_auth(&self.token))
    }

    async fn check(context: &str, resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let err = classify_status(status, &body)
            .unwrap_or_else(|| ChatError::Network(format!("{} failed", context)));
        warn!("{} -> {}", context, err);
        Err(err)
    }

    async fn send_json<T: DeserializeOwned>(&self, context: &str, req: RequestBuilder) -> Result<T> {
        let resp = req.send().await.map_err(|e| transport_error(context, e))?;
        let resp = Self::check(context, resp).await?;
        resp.json::<T>()
            .await
            .map_err(|e| ChatError::Serialization(format!("{}: {}", context, e)))
    }

    async fn send_ok(&self, context: &str, req: RequestBuilder) -> Result<()> {
        let resp = req.send().await.map_err(|e| transport_error(context, e))?;
        Self::check(context, resp).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatApi for RestApi {
    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let req = self.authed(&self.http, Method::GET, &["chats"])?;
        let chats: Vec<WireConversation> = self.send_json("list chats", req).await?;
        debug!("Fetched {} conversations", chats.len());
        Ok(chats.into_iter().map(Conversation::from).collect())
    }

    async fn start_conversation(&self, participant: &UserId) -> Result<Conversation> {
        let req = self
            .authed(&self.http, Method::POST, &["chats"])?
            .json(&json!({ "participantId": participant.as_str() }));
        let chat: WireConversation = self.send_json("start chat", req).await?;
        Ok(chat.into())
    }

    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
        before: Option<&str>,
    ) -> Result<HistoryPage> {
        let path = ["chats", conversation_id.as_str(), "messages"];
        let mut req = self
            .authed(&self.http, Method::GET, &path)?
            .query(&[("limit", limit.to_string())]);
        if let Some(before) = before {
            req = req.query(&[("before", before)]);
        }
        let page: WireHistoryPage = self.send_json("fetch messages", req).await?;
        page.into_page()
    }

    async fn send_message(
        &self,
        conversation_id: &ConversationId,
        text: &str,
        client_ref: Uuid,
    ) -> Result<Message> {
        let path = ["chats", conversation_id.as_str(), "messages"];
        let req = self.authed(&self.http, Method::POST, &path)?.json(&json!({
            "content": text,
            "messageType": "text",
            "clientRef": client_ref,
        }));
        let message: WireMessage = self.send_json("send message", req).await?;
        message.into_message()
    }

    async fn send_attachment(
        &self,
        conversation_id: &ConversationId,
        text: Option<&str>,
        attachment: &Attachment,
        client_ref: Uuid,
    ) -> Result<Message> {
        let part = multipart::Part::bytes(attachment.data.to_vec())
            .file_name(attachment.filename.clone())
            .mime_str(&attachment.content_type)
            .map_err(|e| ChatError::Validation(format!("invalid content type: {}", e)))?;
        let message_type = if attachment.is_image() { "image" } else { "file" };
        let mut form = multipart::Form::new()
            .text("messageType", message_type)
            .text("clientRef", client_ref.to_string())
            .part("file", part);
        if let Some(text) = text {
            form = form.text("content", text.to_string());
        }

        debug!(
            "Uploading {} ({} bytes) to {}",
            attachment.filename,
            attachment.size(),
            conversation_id
        );
        let path = ["chats", conversation_id.as_str(), "messages"];
        let req = self
            .authed(&self.uploads, Method::POST, &path)?
            .multipart(form);
        let message: WireMessage = self.send_json("upload attachment", req).await?;
        message.into_message()
    }

    async fn create_quotation(
        &self,
        conversation_id: &ConversationId,
        quotation: &QuotationDraft,
    ) -> Result<Message> {
        let path = ["chats", conversation_id.as_str(), "quotations"];
        let req = self
            .authed(&self.http, Method::POST, &path)?
            .json(quotation);
        let message: WireMessage = self.send_json("create quotation", req).await?;
        message.into_message()
    }

    async fn respond_quotation(
        &self,
        message_id: &str,
        decision: QuotationDecision,
    ) -> Result<Message> {
        let path = ["messages", message_id, "quotation"];
        let req = self
            .authed(&self.http, Method::PATCH, &path)?
            .json(&json!({ "decision": decision }));
        let message: WireMessage = self.send_json("respond to quotation", req).await?;
        message.into_message()
    }

    async fn mark_as_read(&self, conversation_id: &ConversationId) -> Result<()> {
        let path = ["chats", conversation_id.as_str(), "read"];
        let req = self.authed(&self.http, Method::POST, &path)?;
        self.send_ok("mark as read", req).await
    }
}
