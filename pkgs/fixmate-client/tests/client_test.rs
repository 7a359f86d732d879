//! Chat client flow tests
//!
//! The REST API and the live channel are replaced by in-memory fakes so the
//! tests can script failures and observe which calls were made.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use fixmate_chat::{
    Attachment, AttachmentPolicy, ChatConfig, ChatError, Conversation, ConversationId,
    DeliveryStatus, DeviceInfo, HistoryApplied, HistoryPage, InboundEvent, MediaRef, Message,
    MessageBody, MessageId, OutboundCommand, OutboxState, Participant, PricingBreakdown, Quotation,
    QuotationStatus, Result, Role, UserId,
};
use fixmate_client::{
    ChatApi, ChatClient, ConnectionEvent, ConnectionManager, Link, Notice, QuotationDecision,
    QuotationDraft, ReconnectPolicy, Session, Transport,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

const ME: &str = "user-customer";

fn participant(id: &str, name: &str) -> Participant {
    Participant {
        user_id: UserId::from(id),
        name: name.to_string(),
        avatar_url: None,
        verified: true,
    }
}

fn conversation(id: &str, repairman: &str) -> Conversation {
    Conversation {
        id: ConversationId::from(id),
        customer: participant(ME, "Carla"),
        repairman: participant(repairman, "Rami"),
        online: false,
        last_message: None,
        unread_count: 2,
        updated_at: Utc::now(),
    }
}

fn server_message(conv: &ConversationId, id: &str, role: Role, text: &str) -> Message {
    Message {
        id: MessageId::Server(id.to_string()),
        conversation_id: conv.clone(),
        sender_role: role,
        body: MessageBody::text(text),
        timestamp: Utc::now(),
        status: DeliveryStatus::Delivered,
        client_ref: None,
    }
}

fn page(messages: Vec<Message>, has_more: bool) -> HistoryPage {
    let oldest_message_id = messages.first().map(|m| m.id.to_string());
    HistoryPage {
        messages,
        has_more,
        oldest_message_id,
    }
}

/// Scripted REST backend that records every call
#[derive(Default)]
struct FakeApi {
    conversations: Mutex<Vec<Conversation>>,
    list_error: Mutex<Option<ChatError>>,
    pages: Mutex<HashMap<ConversationId, VecDeque<Result<HistoryPage>>>>,
    send_failures: Mutex<VecDeque<ChatError>>,
    /// Holds the first-page fetch of one conversation until notified
    gate: Mutex<Option<(ConversationId, Arc<Notify>)>>,
    calls: Mutex<Vec<String>>,
    next_id: AtomicUsize,
}

impl FakeApi {
    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn push_page(&self, conversation_id: &ConversationId, result: Result<HistoryPage>) {
        self.pages
            .lock()
            .entry(conversation_id.clone())
            .or_default()
            .push_back(result);
    }

    fn next_id(&self) -> String {
        format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn confirmed(&self, conversation_id: &ConversationId, body: MessageBody, client_ref: Uuid) -> Message {
        Message {
            id: MessageId::Server(self.next_id()),
            conversation_id: conversation_id.clone(),
            sender_role: Role::Customer,
            body,
            timestamp: Utc::now(),
            status: DeliveryStatus::Delivered,
            client_ref: Some(client_ref),
        }
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        self.record("list".to_string());
        if let Some(err) = self.list_error.lock().clone() {
            return Err(err);
        }
        Ok(self.conversations.lock().clone())
    }

    async fn start_conversation(&self, participant: &UserId) -> Result<Conversation> {
        self.record(format!("start {}", participant));
        Ok(conversation("c-new", participant.as_str()))
    }

    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
        _limit: usize,
        before: Option<&str>,
    ) -> Result<HistoryPage> {
        self.record(format!("fetch {} before={:?}", conversation_id, before));
        let gated = matches!(self.gate.lock().as_ref(), Some((gated, _)) if gated == conversation_id);
        let gate = if gated {
            self.gate.lock().take().map(|(_, notify)| notify)
        } else {
            None
        };
        if let Some(notify) = gate {
            notify.notified().await;
        }
        self.pages
            .lock()
            .get_mut(conversation_id)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| Ok(page(Vec::new(), false)))
    }

    async fn send_message(
        &self,
        conversation_id: &ConversationId,
        text: &str,
        client_ref: Uuid,
    ) -> Result<Message> {
        self.record(format!("send {} {}", conversation_id, text));
        if let Some(err) = self.send_failures.lock().pop_front() {
            return Err(err);
        }
        Ok(self.confirmed(conversation_id, MessageBody::text(text), client_ref))
    }

    async fn send_attachment(
        &self,
        conversation_id: &ConversationId,
        text: Option<&str>,
        attachment: &Attachment,
        client_ref: Uuid,
    ) -> Result<Message> {
        self.record(format!("upload {} {}", conversation_id, attachment.filename));
        let body = MessageBody::Image {
            media: MediaRef {
                url: Some(format!("https://cdn.example.com/{}", attachment.filename)),
                filename: attachment.filename.clone(),
            },
            caption: text.map(str::to_string),
        };
        Ok(self.confirmed(conversation_id, body, client_ref))
    }

    async fn create_quotation(
        &self,
        conversation_id: &ConversationId,
        quotation: &QuotationDraft,
    ) -> Result<Message> {
        self.record(format!("quote {}", conversation_id));
        let mut message = server_message(conversation_id, &self.next_id(), Role::Repairman, "");
        message.body = MessageBody::Quotation(Quotation {
            device: quotation.device.clone(),
            pricing: quotation.pricing.clone(),
            valid_until: quotation.valid_until,
            status: QuotationStatus::Pending,
        });
        Ok(message)
    }

    async fn respond_quotation(
        &self,
        message_id: &str,
        decision: QuotationDecision,
    ) -> Result<Message> {
        self.record(format!("respond {} {:?}", message_id, decision));
        Err(ChatError::Server {
            status: 422,
            message: "Quotation already answered".to_string(),
        })
    }

    async fn mark_as_read(&self, conversation_id: &ConversationId) -> Result<()> {
        self.record(format!("read {}", conversation_id));
        Ok(())
    }
}

/// Live channel whose accepted links are handed to the test
struct FakeTransport {
    accept: bool,
    links: mpsc::UnboundedSender<(
        mpsc::UnboundedReceiver<OutboundCommand>,
        mpsc::UnboundedSender<InboundEvent>,
    )>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, _token: &str) -> Result<Link> {
        if !self.accept {
            return Err(ChatError::Network("connection refused".to_string()));
        }
        let (outbound, commands) = mpsc::unbounded_channel();
        let (events, inbound) = mpsc::unbounded_channel();
        let _ = self.links.send((commands, events));
        Ok(Link { outbound, inbound })
    }
}

type RemoteLinks = mpsc::UnboundedReceiver<(
    mpsc::UnboundedReceiver<OutboundCommand>,
    mpsc::UnboundedSender<InboundEvent>,
)>;

struct Harness {
    api: Arc<FakeApi>,
    client: ChatClient,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
    notices: mpsc::UnboundedReceiver<Notice>,
    links: RemoteLinks,
}

fn harness(config: ChatConfig, accept: bool) -> Harness {
    let api = Arc::new(FakeApi::default());
    *api.conversations.lock() = vec![conversation("c1", "rep-1"), conversation("c2", "rep-2")];

    let (links_tx, links) = mpsc::unbounded_channel();
    let transport = Arc::new(FakeTransport {
        accept,
        links: links_tx,
    });
    let (connection, events) = ConnectionManager::new(transport, ReconnectPolicy::default());
    let session = Session {
        user_id: UserId::from(ME),
        role: Role::Customer,
        token: "token".to_string(),
    };
    let (client, notices) = ChatClient::new(api.clone(), connection, session, config);
    Harness {
        api,
        client,
        events,
        notices,
        links,
    }
}

fn drain(notices: &mut mpsc::UnboundedReceiver<Notice>) -> Vec<Notice> {
    let mut out = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        out.push(notice);
    }
    out
}

fn c1() -> ConversationId {
    ConversationId::from("c1")
}

fn c2() -> ConversationId {
    ConversationId::from("c2")
}

#[tokio::test]
async fn test_send_falls_back_to_rest_when_disconnected() {
    let mut h = harness(ChatConfig::default(), false);
    h.client.open_inbox().await.unwrap();
    h.client.open_conversation(&c1()).await.unwrap();

    h.client.set_draft_text(&c1(), "Can you come tomorrow?");
    h.client.send(&c1()).await.unwrap();

    assert_eq!(h.api.count("send c1"), 1);
    let messages = h.client.messages(&c1());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, DeliveryStatus::Delivered);
    assert_eq!(messages[0].body.content(), Some("Can you come tomorrow?"));
    assert_eq!(h.client.outbox_state(&c1()), OutboxState::Delivered);
    assert!(h.client.draft(&c1()).unwrap().is_empty());

    // Read receipt went over REST as well
    assert_eq!(h.api.count("read c1"), 1);
    assert!(drain(&mut h.notices).is_empty());
}

#[tokio::test]
async fn test_realtime_send_reconciles_with_echo() {
    let mut h = harness(ChatConfig::default(), true);
    h.client.start().await.unwrap();
    assert_eq!(h.events.recv().await, Some(ConnectionEvent::Connected));
    let (mut commands, server) = h.links.recv().await.unwrap();

    h.client.open_conversation(&c1()).await.unwrap();
    assert_eq!(
        commands.recv().await,
        Some(OutboundCommand::JoinChat {
            conversation_id: c1()
        })
    );
    assert_eq!(
        commands.recv().await,
        Some(OutboundCommand::MarkMessagesRead {
            conversation_id: c1()
        })
    );

    h.client.set_draft_text(&c1(), "on my way");
    h.client.send(&c1()).await.unwrap();

    let client_ref = match commands.recv().await {
        Some(OutboundCommand::SendMessage {
            conversation_id,
            content,
            client_ref,
        }) => {
            assert_eq!(conversation_id, c1());
            assert_eq!(content, "on my way");
            client_ref
        }
        other => panic!("expected send_message, got {:?}", other),
    };
    assert_eq!(h.api.count("send"), 0);
    assert!(h.client.messages(&c1())[0].is_pending());

    let mut echo = server_message(&c1(), "srv-echo", Role::Customer, "on my way");
    echo.client_ref = Some(client_ref);
    server
        .send(InboundEvent::NewMessage { message: echo })
        .unwrap();
    let event = h.events.recv().await.unwrap();
    h.client.handle_event(event).await;

    let messages = h.client.messages(&c1());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, MessageId::Server("srv-echo".to_string()));
    assert_eq!(messages[0].status, DeliveryStatus::Delivered);
}

/// Connect, open c1 and send `text` over the live channel. Returns both
/// server-side halves of the link and the client_ref of the queued send.
async fn send_live(
    h: &mut Harness,
    text: &str,
) -> (
    mpsc::UnboundedReceiver<OutboundCommand>,
    mpsc::UnboundedSender<InboundEvent>,
    Uuid,
) {
    h.client.start().await.unwrap();
    assert_eq!(h.events.recv().await, Some(ConnectionEvent::Connected));
    let (mut commands, server) = h.links.recv().await.unwrap();
    h.client.open_conversation(&c1()).await.unwrap();

    h.client.set_draft_text(&c1(), text);
    h.client.send(&c1()).await.unwrap();
    loop {
        match commands.recv().await {
            Some(OutboundCommand::SendMessage { client_ref, .. }) => {
                return (commands, server, client_ref)
            }
            Some(_) => {}
            None => panic!("link closed before send_message"),
        }
    }
}

#[tokio::test]
async fn test_unechoed_live_send_is_resent_over_rest_when_link_drops() {
    let mut h = harness(ChatConfig::default(), true);
    let (commands, server, client_ref) = send_live(&mut h, "is it fixed?").await;
    assert!(h.client.draft(&c1()).unwrap().is_empty());

    // The socket dies before the frame reached the server
    drop(commands);
    drop(server);
    let event = h.events.recv().await.unwrap();
    assert!(matches!(
        event,
        ConnectionEvent::Disconnected {
            will_retry: true,
            ..
        }
    ));
    h.client.handle_event(event).await;

    assert_eq!(h.api.count("send c1 is it fixed?"), 1);
    let messages = h.client.messages(&c1());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, DeliveryStatus::Delivered);
    assert_eq!(messages[0].client_ref, Some(client_ref));
    assert!(drain(&mut h.notices).is_empty());
}

#[tokio::test]
async fn test_echoed_live_send_is_not_resent() {
    let mut h = harness(ChatConfig::default(), true);
    let (_commands, server, client_ref) = send_live(&mut h, "on my way").await;

    let mut echo = server_message(&c1(), "srv-echo", Role::Customer, "on my way");
    echo.client_ref = Some(client_ref);
    server
        .send(InboundEvent::NewMessage { message: echo })
        .unwrap();
    let event = h.events.recv().await.unwrap();
    h.client.handle_event(event).await;

    drop(server);
    let event = h.events.recv().await.unwrap();
    h.client.handle_event(event).await;

    assert_eq!(h.api.count("send"), 0);
    assert_eq!(h.client.messages(&c1()).len(), 1);
}

#[tokio::test]
async fn test_failed_resend_returns_text_to_draft() {
    let mut h = harness(ChatConfig::default(), true);
    let (_commands, server, _) = send_live(&mut h, "see you at 5").await;
    h.api
        .send_failures
        .lock()
        .push_back(ChatError::Network("offline".to_string()));

    drop(server);
    let event = h.events.recv().await.unwrap();
    h.client.handle_event(event).await;

    assert!(h.client.messages(&c1()).is_empty());
    assert_eq!(h.client.draft(&c1()).unwrap().text, "see you at 5");
    assert!(matches!(h.client.outbox_state(&c1()), OutboxState::Failed(_)));
    assert_eq!(
        drain(&mut h.notices),
        vec![Notice::Error(ChatError::Network("offline".to_string()))]
    );
}

#[tokio::test]
async fn test_send_on_dead_writer_goes_over_rest() {
    let mut h = harness(ChatConfig::default(), true);
    h.client.start().await.unwrap();
    assert_eq!(h.events.recv().await, Some(ConnectionEvent::Connected));
    let (commands, _server) = h.links.recv().await.unwrap();
    h.client.open_inbox().await.unwrap();

    // Writer side gone while the manager still believes the link is up
    drop(commands);
    h.client.set_draft_text(&c1(), "anyone there?");
    h.client.send(&c1()).await.unwrap();

    assert_eq!(h.api.count("send c1 anyone there?"), 1);
    let messages = h.client.messages(&c1());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, DeliveryStatus::Delivered);
}

#[tokio::test]
async fn test_counterpart_message_in_focused_conversation_is_marked_read() {
    let mut h = harness(ChatConfig::default(), true);
    h.client.start().await.unwrap();
    assert_eq!(h.events.recv().await, Some(ConnectionEvent::Connected));
    let (mut commands, server) = h.links.recv().await.unwrap();

    h.client.open_conversation(&c1()).await.unwrap();
    while commands.try_recv().is_ok() {}

    server
        .send(InboundEvent::NewMessage {
            message: server_message(&c1(), "m-1", Role::Repairman, "ready for pickup"),
        })
        .unwrap();
    server
        .send(InboundEvent::NewMessage {
            message: server_message(&c2(), "m-2", Role::Repairman, "quote attached"),
        })
        .unwrap();
    for _ in 0..2 {
        let event = h.events.recv().await.unwrap();
        h.client.handle_event(event).await;
    }

    assert_eq!(h.client.unread_count(&c1()), 0);
    assert_eq!(h.client.unread_count(&c2()), 3);
    assert_eq!(
        commands.try_recv().ok(),
        Some(OutboundCommand::MarkMessagesRead {
            conversation_id: c1()
        })
    );
    assert!(commands.try_recv().is_err());
}

#[tokio::test]
async fn test_oversized_attachment_makes_no_api_call() {
    let config = ChatConfig {
        attachment_policy: AttachmentPolicy {
            max_size: 1024,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut h = harness(config, false);
    h.client.open_inbox().await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("motherboard.png");
    tokio::fs::write(&path, vec![0u8; 4096]).await.unwrap();
    let data = tokio::fs::read(&path).await.unwrap();

    let result = h
        .client
        .stage_attachment(&c1(), Attachment::new("motherboard.png", data));

    assert!(matches!(result, Err(ChatError::Validation(_))));
    assert!(h
        .client
        .draft(&c1())
        .map_or(true, |d| d.attachment.is_none()));
    assert_eq!(h.api.calls(), vec!["list".to_string()]);
    assert!(matches!(
        drain(&mut h.notices).as_slice(),
        [Notice::Error(ChatError::Validation(_))]
    ));
}

#[tokio::test]
async fn test_attachment_is_uploaded_over_rest() {
    let h = harness(ChatConfig::default(), false);
    h.client.open_inbox().await.unwrap();

    h.client.set_draft_text(&c1(), "the crack");
    h.client
        .stage_attachment(&c1(), Attachment::new("screen.jpg", vec![1u8; 64]))
        .unwrap();
    h.client.send(&c1()).await.unwrap();

    assert_eq!(h.api.count("upload c1 screen.jpg"), 1);
    let messages = h.client.messages(&c1());
    assert_eq!(messages.len(), 1);
    assert!(!messages[0].is_pending());
    assert!(h.client.draft(&c1()).unwrap().attachment.is_none());
}

#[tokio::test]
async fn test_no_fetch_when_history_is_exhausted() {
    let h = harness(ChatConfig::default(), false);
    h.client.open_inbox().await.unwrap();
    h.api.push_page(
        &c1(),
        Ok(page(
            vec![server_message(&c1(), "m-1", Role::Repairman, "hello")],
            false,
        )),
    );

    let applied = h.client.open_conversation(&c1()).await.unwrap();
    assert_eq!(applied, HistoryApplied::Replaced);

    assert_eq!(h.client.load_older(&c1()).await.unwrap(), None);
    assert_eq!(h.api.count("fetch c1"), 1);
}

#[tokio::test]
async fn test_load_older_uses_cursor() {
    let h = harness(ChatConfig::default(), false);
    h.client.open_inbox().await.unwrap();
    h.api.push_page(
        &c1(),
        Ok(page(
            vec![server_message(&c1(), "m-2", Role::Repairman, "second")],
            true,
        )),
    );
    h.api.push_page(
        &c1(),
        Ok(page(
            vec![server_message(&c1(), "m-1", Role::Repairman, "first")],
            false,
        )),
    );

    h.client.open_conversation(&c1()).await.unwrap();
    let applied = h.client.load_older(&c1()).await.unwrap();

    assert!(matches!(applied, Some(HistoryApplied::Prepended(_))));
    assert!(h
        .api
        .calls()
        .contains(&"fetch c1 before=Some(\"m-2\")".to_string()));
    assert_eq!(h.client.messages(&c1()).len(), 2);
    assert_eq!(h.client.load_older(&c1()).await.unwrap(), None);
}

#[tokio::test]
async fn test_stale_page_discarded_when_switching_conversations() {
    let h = harness(ChatConfig::default(), false);
    h.client.open_inbox().await.unwrap();

    let release = Arc::new(Notify::new());
    *h.api.gate.lock() = Some((c1(), release.clone()));
    h.api.push_page(
        &c1(),
        Ok(page(
            vec![server_message(&c1(), "a-1", Role::Repairman, "from A")],
            false,
        )),
    );
    h.api.push_page(
        &c2(),
        Ok(page(
            vec![server_message(&c2(), "b-1", Role::Repairman, "from B")],
            false,
        )),
    );

    let first_id = c1();
    let (first, second) = tokio::join!(h.client.open_conversation(&first_id), async {
        let result = h.client.open_conversation(&c2()).await;
        release.notify_one();
        result
    });

    assert_eq!(first.unwrap(), HistoryApplied::Discarded);
    assert_eq!(second.unwrap(), HistoryApplied::Replaced);
    assert_eq!(h.client.focused(), Some(c2()));
    assert!(h.client.messages(&c1()).is_empty());
    assert_eq!(h.client.messages(&c2()).len(), 1);
    // Only the conversation that is still open was marked read
    assert_eq!(h.api.count("read c1"), 0);
    assert_eq!(h.api.count("read c2"), 1);
}

#[tokio::test]
async fn test_unauthorized_clears_local_state() {
    let mut h = harness(ChatConfig::default(), false);
    h.client.open_inbox().await.unwrap();
    h.client.set_draft_text(&c1(), "half written");
    assert_eq!(h.client.conversation_list().len(), 2);

    h.api.push_page(&c1(), Err(ChatError::Unauthorized));
    let result = h.client.open_conversation(&c1()).await;

    assert_eq!(result, Err(ChatError::Unauthorized));
    assert!(h.client.conversation_list().is_empty());
    assert_eq!(h.client.focused(), None);
    assert_eq!(h.client.total_unread(), 0);
    assert!(h.client.draft(&c1()).is_none());
    assert!(h.client.watch_inbox().borrow().is_empty());
    assert_eq!(drain(&mut h.notices), vec![Notice::SessionExpired]);
}

#[tokio::test]
async fn test_failed_send_keeps_draft_and_retry_succeeds() {
    let mut h = harness(ChatConfig::default(), false);
    h.client.open_inbox().await.unwrap();
    h.api
        .send_failures
        .lock()
        .push_back(ChatError::Timeout("send message timed out".to_string()));

    h.client.set_draft_text(&c1(), "Is the battery covered?");
    let failed = h.client.send(&c1()).await;

    assert!(matches!(failed, Err(ChatError::Timeout(_))));
    assert!(matches!(h.client.outbox_state(&c1()), OutboxState::Failed(_)));
    assert_eq!(h.client.draft(&c1()).unwrap().text, "Is the battery covered?");
    assert!(h.client.messages(&c1()).is_empty());
    assert!(matches!(
        drain(&mut h.notices).as_slice(),
        [Notice::Error(ChatError::Timeout(_))]
    ));

    h.client.send(&c1()).await.unwrap();

    assert_eq!(h.api.count("send c1"), 2);
    assert_eq!(h.client.outbox_state(&c1()), OutboxState::Delivered);
    let messages = h.client.messages(&c1());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].body.content(), Some("Is the battery covered?"));
}

#[tokio::test]
async fn test_list_failure_is_reported() {
    let mut h = harness(ChatConfig::default(), false);
    *h.api.list_error.lock() = Some(ChatError::Network("offline".to_string()));

    assert!(h.client.open_inbox().await.is_err());
    assert_eq!(
        drain(&mut h.notices),
        vec![Notice::Error(ChatError::Network("offline".to_string()))]
    );
}

#[tokio::test]
async fn test_quotation_flow() {
    let mut h = harness(ChatConfig::default(), false);
    h.client.open_inbox().await.unwrap();

    let draft = QuotationDraft {
        device: DeviceInfo {
            brand: "Apple".to_string(),
            model: "iPhone 13".to_string(),
            issue: "Cracked screen".to_string(),
        },
        pricing: PricingBreakdown {
            parts: 120,
            labor: 40,
            other: 0,
            currency: "EUR".to_string(),
        },
        valid_until: Utc::now() + ChronoDuration::days(3),
    };
    let message = h.client.create_quotation(&c1(), &draft).await.unwrap();
    assert_eq!(h.client.messages(&c1()), vec![message.clone()]);

    let answered = h
        .client
        .respond_quotation(&message.id.to_string(), QuotationDecision::Accept)
        .await;
    assert!(matches!(answered, Err(ChatError::Server { status: 422, .. })));
    assert_eq!(drain(&mut h.notices).len(), 1);
}

#[tokio::test]
async fn test_start_and_remove_conversation() {
    let h = harness(ChatConfig::default(), false);
    h.client.open_inbox().await.unwrap();

    let id = h
        .client
        .start_conversation(&UserId::from("rep-9"))
        .await
        .unwrap();
    assert_eq!(id.as_str(), "c-new");
    assert_eq!(h.client.conversation_list().len(), 3);

    h.client.open_conversation(&id).await.unwrap();
    h.client.remove_conversation(&id);
    assert_eq!(h.client.focused(), None);
    assert_eq!(h.client.conversation_list().len(), 2);
}
