//! Wire formats for the REST API and the real-time channel
//!
//! The backend speaks camelCase JSON with Mongo-style `_id` fields. These
//! types mirror that shape and convert into the `fixmate-chat` model.
//! Real-time frames are `{"event": "<name>", "data": {...}}`.

use chrono::{DateTime, Utc};
use fixmate_chat::{
    ChatError, Conversation, ConversationId, DeliveryStatus, DeviceInfo, HistoryPage, InboundEvent,
    LastMessage, MediaRef, Message, MessageBody, MessageId, OutboundCommand, Participant,
    PricingBreakdown, Quotation, QuotationStatus, Result, Role, UserId,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAttachment {
    pub url: Option<String>,
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireQuotation {
    pub device: DeviceInfo,
    pub pricing: PricingBreakdown,
    pub valid_until: DateTime<Utc>,
    pub status: QuotationStatus,
}

/// Message as returned by the API and pushed in `new_message`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(rename = "_id")]
    pub id: String,
    pub chat_id: String,
    pub sender_type: Role,
    #[serde(default)]
    pub content: Option<String>,
    pub message_type: String,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub attachments: Vec<WireAttachment>,
    #[serde(default)]
    pub quotation: Option<WireQuotation>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub client_ref: Option<Uuid>,
}

impl WireMessage {
    pub fn into_message(self) -> Result<Message> {
        let single_media = || -> Result<MediaRef> {
            let filename = self.file_name.clone().ok_or_else(|| {
                ChatError::Serialization(format!("message {} is missing fileName", self.id))
            })?;
            Ok(MediaRef {
                url: self.file_url.clone(),
                filename,
            })
        };

        let body = match self.message_type.as_str() {
            "text" => MessageBody::Text {
                text: self.content.clone().unwrap_or_default(),
            },
            "image" => MessageBody::Image {
                media: single_media()?,
                caption: self.content.clone().filter(|c| !c.is_empty()),
            },
            "file" => MessageBody::File {
                media: single_media()?,
                caption: self.content.clone().filter(|c| !c.is_empty()),
            },
            "mixed" => MessageBody::Mixed {
                text: self.content.clone().filter(|c| !c.is_empty()),
                media: self
                    .attachments
                    .iter()
                    .map(|a| MediaRef {
                        url: a.url.clone(),
                        filename: a.file_name.clone(),
                    })
                    .collect(),
            },
            "quotation" => {
                let q = self.quotation.clone().ok_or_else(|| {
                    ChatError::Serialization(format!(
                        "quotation message {} has no quotation payload",
                        self.id
                    ))
                })?;
                MessageBody::Quotation(Quotation {
                    device: q.device,
                    pricing: q.pricing,
                    valid_until: q.valid_until,
                    status: q.status,
                })
            }
            other => {
                return Err(ChatError::Serialization(format!(
                    "unknown message type '{}'",
                    other
                )))
            }
        };

        Ok(Message {
            id: MessageId::Server(self.id),
            conversation_id: ConversationId::new(self.chat_id),
            sender_role: self.sender_type,
            body,
            timestamp: self.created_at,
            status: DeliveryStatus::Delivered,
            client_ref: self.client_ref,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireParticipant {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
}

impl From<WireParticipant> for Participant {
    fn from(p: WireParticipant) -> Self {
        Participant {
            user_id: UserId::new(p.id),
            name: p.name,
            avatar_url: p.avatar,
            verified: p.is_verified,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireLastMessage {
    #[serde(default)]
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub sender_type: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireConversation {
    #[serde(rename = "_id")]
    pub id: String,
    pub customer: WireParticipant,
    pub repairman: WireParticipant,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub last_message: Option<WireLastMessage>,
    #[serde(default)]
    pub unread_count: u32,
    pub updated_at: DateTime<Utc>,
}

impl From<WireConversation> for Conversation {
    fn from(c: WireConversation) -> Self {
        Conversation {
            id: ConversationId::new(c.id),
            customer: c.customer.into(),
            repairman: c.repairman.into(),
            online: c.is_online,
            last_message: c.last_message.map(|m| LastMessage {
                preview: m.content,
                timestamp: m.created_at,
                sender_role: m.sender_type,
            }),
            unread_count: c.unread_count,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireHistoryPage {
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub oldest_message_id: Option<String>,
}

impl WireHistoryPage {
    pub fn into_page(self) -> Result<HistoryPage> {
        let messages = self
            .messages
            .into_iter()
            .map(WireMessage::into_message)
            .collect::<Result<Vec<_>>>()?;
        Ok(HistoryPage {
            messages,
            has_more: self.has_more,
            oldest_message_id: self.oldest_message_id,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRef {
    chat_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadReceipt {
    chat_id: String,
    reader_type: Role,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRef {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    message: String,
}

/// Decode one real-time frame; unknown event names yield `None`
pub fn decode_frame(text: &str) -> Result<Option<InboundEvent>> {
    let frame: Frame = serde_json::from_str(text)?;
    let data = frame.data;

    let event = match frame.event.as_str() {
        "new_message" => InboundEvent::NewMessage {
            message: serde_json::from_value::<WireMessage>(data)?.into_message()?,
        },
        "chat_list_updated" => InboundEvent::ChatListUpdated {
            conversation: serde_json::from_value::<WireConversation>(data)?.into(),
        },
        "chat_joined" => InboundEvent::ChatJoined {
            conversation_id: ConversationId::new(serde_json::from_value::<ChatRef>(data)?.chat_id),
        },
        "chat_error" => InboundEvent::ChatError {
            message: serde_json::from_value::<ErrorPayload>(data)?.message,
        },
        "messages_read" => {
            let receipt: ReadReceipt = serde_json::from_value(data)?;
            InboundEvent::MessagesRead {
                conversation_id: ConversationId::new(receipt.chat_id),
                reader_role: receipt.reader_type,
            }
        }
        "user_online" => InboundEvent::UserOnline {
            user_id: UserId::new(serde_json::from_value::<UserRef>(data)?.user_id),
        },
        "user_offline" => InboundEvent::UserOffline {
            user_id: UserId::new(serde_json::from_value::<UserRef>(data)?.user_id),
        },
        other => {
            debug!("Ignoring unknown event '{}'", other);
            return Ok(None);
        }
    };
    Ok(Some(event))
}

/// Encode one outbound command as a frame
pub fn encode_command(command: &OutboundCommand) -> String {
    let data = match command {
        OutboundCommand::SendMessage {
            conversation_id,
            content,
            client_ref,
        } => json!({
            "chatId": conversation_id.as_str(),
            "content": content,
            "messageType": "text",
            "clientRef": client_ref,
        }),
        other => json!({ "chatId": other.conversation_id().as_str() }),
    };
    json!({ "event": command.event_name(), "data": data }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_new_message() {
        let frame = r#"{
            "event": "new_message",
            "data": {
                "_id": "m-1",
                "chatId": "c-1",
                "senderType": "repairman",
                "content": "I can fix it today",
                "messageType": "text",
                "createdAt": "2024-05-01T10:00:00Z"
            }
        }"#;

        match decode_frame(frame).unwrap() {
            Some(InboundEvent::NewMessage { message }) => {
                assert_eq!(message.id, MessageId::Server("m-1".to_string()));
                assert_eq!(message.conversation_id.as_str(), "c-1");
                assert_eq!(message.sender_role, Role::Repairman);
                assert_eq!(message.body.content(), Some("I can fix it today"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_image_without_file_name_fails() {
        let frame = r#"{"event":"new_message","data":{"_id":"m","chatId":"c","senderType":"customer",
            "messageType":"image","fileUrl":"https://x/y.png","createdAt":"2024-05-01T10:00:00Z"}}"#;
        assert!(matches!(
            decode_frame(frame),
            Err(ChatError::Serialization(_))
        ));
    }

    #[test]
    fn test_decode_presence_and_unknown() {
        let online = decode_frame(r#"{"event":"user_online","data":{"userId":"u-9"}}"#).unwrap();
        assert_eq!(
            online,
            Some(InboundEvent::UserOnline {
                user_id: UserId::from("u-9")
            })
        );
        assert_eq!(decode_frame(r#"{"event":"typing","data":{}}"#).unwrap(), None);
    }

    #[test]
    fn test_encode_send_message() {
        let client_ref = Uuid::nil();
        let text = encode_command(&OutboundCommand::SendMessage {
            conversation_id: ConversationId::from("c-1"),
            content: "hello".to_string(),
            client_ref,
        });
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event"], "send_message");
        assert_eq!(value["data"]["chatId"], "c-1");
        assert_eq!(value["data"]["clientRef"], client_ref.to_string());

        let join = encode_command(&OutboundCommand::JoinChat {
            conversation_id: ConversationId::from("c-2"),
        });
        assert_eq!(join, r#"{"data":{"chatId":"c-2"},"event":"join_chat"}"#);
    }
}
