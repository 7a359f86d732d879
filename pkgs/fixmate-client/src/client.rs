//! Chat client - drives the chat state from the network
//!
//! `ChatClient` ties the [`ChatStore`] to the REST API and the live channel.
//! The store sits behind a mutex that is only ever locked between awaits, so
//! every mutation is applied whole and in the order this client issues them.
//! Failures are reported on the notice channel; a rejected session (401)
//! signs the user out.
//!
//! A realtime send is only queued on the socket, so it stays tracked until
//! its echo arrives. If the link drops first, it is sent again over REST.

use chrono::Utc;
use fixmate_chat::{
    Attachment, ChatConfig, ChatError, ChatStore, ConversationId, ConversationSummary, Draft,
    HistoryApplied, InboundEvent, Message, OutboundCommand, OutboxState, Result, Role, SendPlan,
    SendRoute, UserId,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{ChatApi, QuotationDecision, QuotationDraft, RestApi};
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionState};
use crate::ws::WsTransport;
use crate::ClientConfig;

/// The signed-in user
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub role: Role,
    pub token: String,
}

/// User-facing notification
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Info(String),
    Warning(String),
    Error(ChatError),
    /// The server rejected the session; local state has been cleared
    SessionExpired,
}

pub struct ChatClient {
    api: Arc<dyn ChatApi>,
    connection: ConnectionManager,
    store: Arc<Mutex<ChatStore>>,
    inbox: watch::Sender<Vec<ConversationSummary>>,
    notices: mpsc::UnboundedSender<Notice>,
    session: Session,
    /// Realtime sends not yet echoed, oldest first
    unconfirmed: Mutex<Vec<SendPlan>>,
}

impl ChatClient {
    pub fn new(
        api: Arc<dyn ChatApi>,
        connection: ConnectionManager,
        session: Session,
        config: ChatConfig,
    ) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let store = ChatStore::new(session.user_id.clone(), session.role, config);
        let (inbox, _) = watch::channel(Vec::new());
        let (notices, notices_rx) = mpsc::unbounded_channel();
        let client = Self {
            api,
            connection,
            store: Arc::new(Mutex::new(store)),
            inbox,
            notices,
            session,
            unconfirmed: Mutex::new(Vec::new()),
        };
        (client, notices_rx)
    }

    /// Build a client over the REST API and WebSocket transport
    pub fn from_config(
        config: &ClientConfig,
        session: Session,
    ) -> Result<(
        Self,
        mpsc::UnboundedReceiver<ConnectionEvent>,
        mpsc::UnboundedReceiver<Notice>,
    )> {
        let api = RestApi::new(
            &config.api_url,
            session.token.clone(),
            config.request_timeout,
            config.upload_timeout,
        )?;
        let transport = Arc::new(WsTransport::new(config.ws_url.clone()));
        let (connection, events) = ConnectionManager::new(transport, config.reconnect.clone());
        let (client, notices) = Self::new(Arc::new(api), connection, session, config.chat.clone());
        Ok((client, events, notices))
    }

    // ------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------

    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }

    /// Report a failure; must not be called with the store locked
    fn report(&self, err: ChatError) {
        if err.is_fatal() {
            warn!("Session rejected by the server, signing out");
            self.sign_out();
            self.notify(Notice::SessionExpired);
        } else {
            warn!("{}", err);
            self.notify(Notice::Error(err));
        }
    }

    fn check<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.report(e.clone());
        }
        result
    }

    fn publish_inbox(&self) {
        let list = self.store.lock().conversation_list();
        self.inbox.send_replace(list);
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Open the live channel and load the inbox
    pub async fn start(&self) -> Result<Vec<ConversationSummary>> {
        info!(
            "Starting chat for {} ({})",
            self.session.user_id, self.session.role
        );
        self.connection.connect(&self.session.token);
        self.open_inbox().await
    }

    /// Consume connection events until the manager goes away
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<ConnectionEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        debug!("Connection event stream ended");
    }

    /// Close the live channel and clear all chat state
    pub fn sign_out(&self) {
        self.connection.disconnect();
        self.unconfirmed.lock().clear();
        self.store.lock().sign_out();
        self.inbox.send_replace(Vec::new());
    }

    // ------------------------------------------------------------------
    // Conversations
    // ------------------------------------------------------------------

    pub async fn open_inbox(&self) -> Result<Vec<ConversationSummary>> {
        let conversations = self.api.list_conversations().await;
        let conversations = self.check(conversations)?;
        let list = {
            let mut store = self.store.lock();
            store.load_conversations(conversations);
            store.conversation_list()
        };
        self.inbox.send_replace(list.clone());
        Ok(list)
    }

    pub async fn start_conversation(&self, participant: &UserId) -> Result<ConversationId> {
        let conversation = self.api.start_conversation(participant).await;
        let conversation = self.check(conversation)?;
        let id = conversation.id.clone();
        self.store.lock().upsert_conversation(conversation);
        self.publish_inbox();
        info!("Started conversation {} with {}", id, participant);
        Ok(id)
    }

    /// Drop a conversation from the local inbox
    pub fn remove_conversation(&self, conversation_id: &ConversationId) {
        let was_focused = {
            let mut store = self.store.lock();
            let was_focused = store.focused() == Some(conversation_id);
            store.remove_conversation(conversation_id);
            was_focused
        };
        if was_focused {
            self.connection.leave(conversation_id);
        }
        self.publish_inbox();
    }

    /// Focus a conversation, join its room, load the latest page and mark it
    /// read. A page that arrives after focus moved elsewhere is discarded.
    pub async fn open_conversation(&self, conversation_id: &ConversationId) -> Result<HistoryApplied> {
        let (previous, ticket, page_size) = {
            let mut store = self.store.lock();
            let previous = store.focused().cloned();
            let ticket = store.focus(conversation_id);
            (previous, ticket, store.config().page_size)
        };
        if previous.as_ref() != Some(conversation_id) {
            if let Some(previous) = &previous {
                self.connection.leave(previous);
            }
            self.connection.join(conversation_id);
        }
        self.publish_inbox();

        let page = self
            .api
            .fetch_messages(conversation_id, page_size, None)
            .await;
        let page = self.check(page)?;
        let applied = self.store.lock().apply_history(&ticket, page);
        if applied == HistoryApplied::Discarded {
            return Ok(applied);
        }

        self.mark_read(conversation_id).await?;
        Ok(applied)
    }

    pub fn close_conversation(&self) {
        let previous = self.store.lock().unfocus();
        if let Some(previous) = previous {
            self.connection.leave(&previous);
            self.publish_inbox();
        }
    }

    /// Fetch the page before the oldest loaded message. `None` when the
    /// server has reported there is nothing older.
    pub async fn load_older(&self, conversation_id: &ConversationId) -> Result<Option<HistoryApplied>> {
        let (ticket, page_size) = {
            let store = self.store.lock();
            (
                store.begin_older_history(conversation_id),
                store.config().page_size,
            )
        };
        let Some(ticket) = ticket else {
            debug!("No older history for {}", conversation_id);
            return Ok(None);
        };

        let page = self
            .api
            .fetch_messages(conversation_id, page_size, ticket.before.as_deref())
            .await;
        let page = self.check(page)?;
        let applied = self.store.lock().apply_history(&ticket, page);
        Ok(Some(applied))
    }

    async fn mark_read(&self, conversation_id: &ConversationId) -> Result<()> {
        let live = self.connection.send(OutboundCommand::MarkMessagesRead {
            conversation_id: conversation_id.clone(),
        });
        if live.is_ok() {
            return Ok(());
        }
        let result = self.api.mark_as_read(conversation_id).await;
        self.check(result)
    }

    // ------------------------------------------------------------------
    // Compose
    // ------------------------------------------------------------------

    pub fn set_draft_text(&self, conversation_id: &ConversationId, text: impl Into<String>) {
        self.store.lock().set_draft_text(conversation_id, text);
    }

    pub fn stage_attachment(&self, conversation_id: &ConversationId, attachment: Attachment) -> Result<()> {
        let result = self.store.lock().stage_attachment(conversation_id, attachment);
        self.check(result)
    }

    pub fn clear_attachment(&self, conversation_id: &ConversationId) {
        self.store.lock().clear_attachment(conversation_id);
    }

    /// Send the current draft. Text goes over the live channel when it is up
    /// and falls back to REST otherwise; attachments always go over REST.
    /// Sending again after a failure retries the preserved draft.
    pub async fn send(&self, conversation_id: &ConversationId) -> Result<()> {
        let connected = self.connection.is_connected();
        let plan = self
            .store
            .lock()
            .begin_send(conversation_id, connected, Utc::now());
        let plan = self.check(plan)?;
        self.publish_inbox();

        let result = match plan.route {
            SendRoute::Realtime => {
                let command = OutboundCommand::SendMessage {
                    conversation_id: conversation_id.clone(),
                    content: plan.text.clone().unwrap_or_default(),
                    client_ref: plan.client_ref,
                };
                self.unconfirmed.lock().push(plan.clone());
                match self.connection.send(command) {
                    Ok(()) => Ok(None),
                    Err(e) => {
                        if !self.take_unconfirmed(plan.client_ref) {
                            debug!("Send {} already resent over REST", plan.client_ref);
                            Ok(None)
                        } else if e == ChatError::Disconnected {
                            info!("Live channel unavailable, sending over REST");
                            self.send_rest(&plan).await.map(Some)
                        } else {
                            Err(e)
                        }
                    }
                }
            }
            SendRoute::Rest => self.send_rest(&plan).await.map(Some),
        };

        match result {
            Ok(confirmed) => {
                self.store
                    .lock()
                    .complete_send(conversation_id, plan.client_ref, confirmed);
                self.publish_inbox();
                Ok(())
            }
            Err(e) => {
                self.store
                    .lock()
                    .fail_send(conversation_id, plan.client_ref, e.to_string());
                self.publish_inbox();
                self.check(Err(e))
            }
        }
    }

    async fn send_rest(&self, plan: &SendPlan) -> Result<Message> {
        match &plan.attachment {
            Some(attachment) => {
                self.api
                    .send_attachment(
                        &plan.conversation_id,
                        plan.text.as_deref(),
                        attachment,
                        plan.client_ref,
                    )
                    .await
            }
            None => {
                self.api
                    .send_message(
                        &plan.conversation_id,
                        plan.text.as_deref().unwrap_or_default(),
                        plan.client_ref,
                    )
                    .await
            }
        }
    }

    fn take_unconfirmed(&self, client_ref: Uuid) -> bool {
        let mut unconfirmed = self.unconfirmed.lock();
        let before = unconfirmed.len();
        unconfirmed.retain(|plan| plan.client_ref != client_ref);
        before != unconfirmed.len()
    }

    /// Forget realtime sends whose echo has arrived
    fn prune_unconfirmed(&self) {
        let mut unconfirmed = self.unconfirmed.lock();
        if unconfirmed.is_empty() {
            return;
        }
        let store = self.store.lock();
        unconfirmed.retain(|plan| store.is_send_pending(&plan.conversation_id, plan.client_ref));
    }

    /// Send every realtime message still waiting for its echo over REST.
    /// One that fails again goes back to its draft.
    async fn resend_unconfirmed(&self) {
        let stranded: Vec<SendPlan> = {
            let mut unconfirmed = self.unconfirmed.lock();
            let store = self.store.lock();
            unconfirmed
                .drain(..)
                .filter(|plan| store.is_send_pending(&plan.conversation_id, plan.client_ref))
                .collect()
        };
        if stranded.is_empty() {
            return;
        }

        warn!(
            "Live channel dropped with {} unconfirmed sends, resending over REST",
            stranded.len()
        );
        for plan in stranded {
            match self.send_rest(&plan).await {
                Ok(message) => {
                    self.store
                        .lock()
                        .complete_send(&plan.conversation_id, plan.client_ref, Some(message));
                }
                Err(e) if e.is_fatal() => {
                    self.report(e);
                    return;
                }
                Err(e) => {
                    self.store.lock().restore_send(&plan, e.to_string());
                    self.report(e);
                }
            }
        }
        self.publish_inbox();
    }

    /// Typing indicators are best effort and only go over the live channel
    pub fn typing(&self, conversation_id: &ConversationId, active: bool) {
        let conversation_id = conversation_id.clone();
        let command = if active {
            OutboundCommand::TypingStart { conversation_id }
        } else {
            OutboundCommand::TypingStop { conversation_id }
        };
        if let Err(e) = self.connection.send(command) {
            debug!("Typing indicator not sent: {}", e);
        }
    }

    // ------------------------------------------------------------------
    // Quotations
    // ------------------------------------------------------------------

    pub async fn create_quotation(
        &self,
        conversation_id: &ConversationId,
        quotation: &QuotationDraft,
    ) -> Result<Message> {
        let message = self.api.create_quotation(conversation_id, quotation).await;
        let message = self.check(message)?;
        self.store.lock().apply(InboundEvent::NewMessage {
            message: message.clone(),
        });
        self.publish_inbox();
        Ok(message)
    }

    pub async fn respond_quotation(
        &self,
        message_id: &str,
        decision: QuotationDecision,
    ) -> Result<Message> {
        let message = self.api.respond_quotation(message_id, decision).await;
        let message = self.check(message)?;
        self.store.lock().apply(InboundEvent::NewMessage {
            message: message.clone(),
        });
        self.publish_inbox();
        Ok(message)
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Apply one connection event. Events must be handled in receipt order.
    pub async fn handle_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => debug!("Live channel up"),
            ConnectionEvent::Reconnecting { attempt, delay } => {
                self.notify(Notice::Info(format!(
                    "Connection lost, reconnecting in {}s (attempt {})",
                    delay.as_secs(),
                    attempt
                )));
            }
            ConnectionEvent::Disconnected { reason, .. } if reason.is_fatal() => {
                self.report(reason);
            }
            ConnectionEvent::Disconnected { reason, will_retry } => {
                self.resend_unconfirmed().await;
                if !will_retry {
                    self.report(reason);
                }
            }
            ConnectionEvent::Inbound(event) => self.handle_inbound(event),
        }
    }

    fn handle_inbound(&self, event: InboundEvent) {
        if let InboundEvent::ChatError { message } = &event {
            self.notify(Notice::Warning(message.clone()));
        }

        let mark_read = {
            let mut store = self.store.lock();
            let mark_read = match &event {
                InboundEvent::NewMessage { message }
                    if message.sender_role != store.local_role()
                        && store.focused() == Some(&message.conversation_id) =>
                {
                    Some(message.conversation_id.clone())
                }
                _ => None,
            };
            store.apply(event);
            mark_read
        };
        self.prune_unconfirmed();

        if let Some(conversation_id) = mark_read {
            if let Err(e) = self
                .connection
                .send(OutboundCommand::MarkMessagesRead { conversation_id })
            {
                debug!("Read receipt not sent: {}", e);
            }
        }
        self.publish_inbox();
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn store(&self) -> Arc<Mutex<ChatStore>> {
        self.store.clone()
    }

    pub fn watch_inbox(&self) -> watch::Receiver<Vec<ConversationSummary>> {
        self.inbox.subscribe()
    }

    pub fn conversation_list(&self) -> Vec<ConversationSummary> {
        self.store.lock().conversation_list()
    }

    pub fn messages(&self, conversation_id: &ConversationId) -> Vec<Message> {
        self.store.lock().messages(conversation_id).to_vec()
    }

    pub fn draft(&self, conversation_id: &ConversationId) -> Option<Draft> {
        self.store.lock().draft(conversation_id).cloned()
    }

    pub fn outbox_state(&self, conversation_id: &ConversationId) -> OutboxState {
        self.store.lock().outbox_state(conversation_id)
    }

    pub fn focused(&self) -> Option<ConversationId> {
        self.store.lock().focused().cloned()
    }

    pub fn unread_count(&self, conversation_id: &ConversationId) -> u32 {
        self.store.lock().unread_count(conversation_id)
    }

    pub fn total_unread(&self) -> u32 {
        self.store.lock().total_unread()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }
}
