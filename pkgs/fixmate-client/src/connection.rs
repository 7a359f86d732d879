//! Connection manager for the real-time channel
//!
//! Owns at most one live session. A session task connects through the
//! [`Transport`], forwards inbound events in receipt order, and reconnects
//! with exponential back-off when the link drops. Joined rooms are tracked
//! with reference counts and re-joined after every reconnect.

use async_trait::async_trait;
use fixmate_chat::{ChatError, ConversationId, InboundEvent, OutboundCommand, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Back-off schedule for reconnect attempts
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Attempts after a failure before giving up (default: 5)
    pub max_attempts: u32,

    /// Delay before the first attempt (default: 1s)
    pub initial_delay: Duration,

    /// Growth factor between attempts (default: 2)
    pub multiplier: u32,

    /// Upper bound for any single delay (default: 30s)
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            multiplier: 2,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given attempt, counting from 1
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// `reason` is `None` before the first connect and after a client-side close
    Disconnected { reason: Option<String> },
    Connecting,
    Reconnecting { attempt: u32 },
    Connected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected { reason: ChatError, will_retry: bool },
    Reconnecting { attempt: u32, delay: Duration },
    Inbound(InboundEvent),
}

/// Both halves of an established link. The link is closed when `inbound`
/// yields `None`; dropping `outbound` closes it from our side.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<OutboundCommand>,
    pub inbound: mpsc::UnboundedReceiver<InboundEvent>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, token: &str) -> Result<Link>;
}

struct SessionHandle {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Inner {
    session: Option<SessionHandle>,
    next_session: u64,
    outbound: Option<mpsc::UnboundedSender<OutboundCommand>>,
    rooms: HashMap<ConversationId, usize>,
}

struct Shared {
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    state: watch::Sender<ConnectionState>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    inner: Mutex<Inner>,
}

impl Shared {
    fn emit(&self, event: ConnectionEvent) {
        if self.events.send(event).is_err() {
            debug!("Connection event dropped, no receiver");
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn is_current(inner: &Inner, session_id: u64) -> bool {
        inner.session.as_ref().map(|s| s.id) == Some(session_id)
    }

    /// Install a fresh link and re-join rooms. Returns false if the session
    /// was replaced or closed meanwhile.
    fn on_connected(&self, session_id: u64, outbound: mpsc::UnboundedSender<OutboundCommand>) -> bool {
        let mut inner = self.inner.lock();
        if !Self::is_current(&inner, session_id) {
            return false;
        }
        for conversation_id in inner.rooms.keys() {
            debug!("Re-joining room {}", conversation_id);
            let _ = outbound.send(OutboundCommand::JoinChat {
                conversation_id: conversation_id.clone(),
            });
        }
        inner.outbound = Some(outbound);
        drop(inner);

        info!("Real-time channel connected");
        self.set_state(ConnectionState::Connected);
        self.emit(ConnectionEvent::Connected);
        true
    }

    fn on_link_lost(&self, session_id: u64) {
        let mut inner = self.inner.lock();
        if Self::is_current(&inner, session_id) {
            inner.outbound = None;
        }
    }

    /// End the session for good
    fn finish(&self, session_id: u64, reason: ChatError) {
        {
            let mut inner = self.inner.lock();
            if !Self::is_current(&inner, session_id) {
                return;
            }
            inner.session = None;
            inner.outbound = None;
        }
        warn!("Real-time channel closed: {}", reason);
        self.set_state(ConnectionState::Disconnected {
            reason: Some(reason.to_string()),
        });
        self.emit(ConnectionEvent::Disconnected {
            reason,
            will_retry: false,
        });
    }

    /// Forward inbound events until the link closes (`Some`) or the session
    /// is cancelled (`None`)
    async fn pump(
        &self,
        cancel: &CancellationToken,
        inbound: &mut mpsc::UnboundedReceiver<InboundEvent>,
    ) -> Option<ChatError> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return None,
                event = inbound.recv() => match event {
                    Some(event) => {
                        debug!("Inbound {}", event.event_name());
                        self.emit(ConnectionEvent::Inbound(event));
                    }
                    None => return Some(ChatError::Disconnected),
                },
            }
        }
    }
}

async fn run_session(shared: Arc<Shared>, session_id: u64, cancel: CancellationToken, token: String) {
    let mut attempt: u32 = 0;
    loop {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            result = shared.transport.connect(&token) => result,
        };

        let reason = match connected {
            Ok(mut link) => {
                attempt = 0;
                if !shared.on_connected(session_id, link.outbound) {
                    return;
                }
                let Some(reason) = shared.pump(&cancel, &mut link.inbound).await else {
                    return;
                };
                shared.on_link_lost(session_id);
                warn!("Real-time channel lost: {}", reason);
                shared.emit(ConnectionEvent::Disconnected {
                    reason: reason.clone(),
                    will_retry: true,
                });
                reason
            }
            Err(e) if e.is_fatal() => {
                shared.finish(session_id, e);
                return;
            }
            Err(e) => {
                warn!("Connect attempt failed: {}", e);
                e
            }
        };

        attempt += 1;
        if attempt > shared.policy.max_attempts {
            shared.finish(session_id, reason);
            return;
        }

        let delay = shared.policy.delay_for(attempt);
        info!("Reconnecting in {:?} (attempt {})", delay, attempt);
        shared.set_state(ConnectionState::Reconnecting { attempt });
        shared.emit(ConnectionEvent::Reconnecting { attempt, delay });

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        policy: ReconnectPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Disconnected { reason: None });
        let shared = Arc::new(Shared {
            transport,
            policy,
            state,
            events,
            inner: Mutex::new(Inner::default()),
        });
        (Self { shared }, rx)
    }

    /// Start a session. A no-op while one is already running.
    pub fn connect(&self, token: &str) {
        let (session_id, cancel) = {
            let mut inner = self.shared.inner.lock();
            if inner.session.is_some() {
                debug!("Connect ignored, a session is already active");
                return;
            }
            inner.next_session += 1;
            let handle = SessionHandle {
                id: inner.next_session,
                cancel: CancellationToken::new(),
            };
            let started = (handle.id, handle.cancel.clone());
            inner.session = Some(handle);
            started
        };

        info!("Connecting real-time channel (session {})", session_id);
        self.shared.set_state(ConnectionState::Connecting);
        tokio::spawn(run_session(
            self.shared.clone(),
            session_id,
            cancel,
            token.to_string(),
        ));
    }

    /// Close the session and forget joined rooms. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let session = {
            let mut inner = self.shared.inner.lock();
            inner.outbound = None;
            inner.rooms.clear();
            inner.session.take()
        };
        if let Some(session) = session {
            info!("Disconnecting real-time channel (session {})", session.id);
            session.cancel.cancel();
            self.shared
                .set_state(ConnectionState::Disconnected { reason: None });
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.shared.state.borrow(), ConnectionState::Connected)
    }

    /// Send over the live channel; `ChatError::Disconnected` when there is none
    pub fn send(&self, command: OutboundCommand) -> Result<()> {
        let inner = self.shared.inner.lock();
        let outbound = inner.outbound.as_ref().ok_or(ChatError::Disconnected)?;
        debug!("Outbound {}", command.event_name());
        outbound.send(command).map_err(|_| ChatError::Disconnected)
    }

    /// Join a room; only the first join is sent to the server
    pub fn join(&self, conversation_id: &ConversationId) {
        let mut inner = self.shared.inner.lock();
        let first = {
            let count = inner.rooms.entry(conversation_id.clone()).or_insert(0);
            *count += 1;
            *count == 1
        };
        if first {
            if let Some(outbound) = &inner.outbound {
                let _ = outbound.send(OutboundCommand::JoinChat {
                    conversation_id: conversation_id.clone(),
                });
            }
        }
    }

    /// Leave a room; only the last leave is sent to the server
    pub fn leave(&self, conversation_id: &ConversationId) {
        let mut inner = self.shared.inner.lock();
        let Some(count) = inner.rooms.get_mut(conversation_id) else {
            return;
        };
        *count -= 1;
        if *count > 0 {
            return;
        }
        inner.rooms.remove(conversation_id);
        if let Some(outbound) = &inner.outbound {
            let _ = outbound.send(OutboundCommand::LeaveChat {
                conversation_id: conversation_id.clone(),
            });
        }
    }

    pub fn room_count(&self, conversation_id: &ConversationId) -> usize {
        self.shared
            .inner
            .lock()
            .rooms
            .get(conversation_id)
            .copied()
            .unwrap_or(0)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(session) = self.shared.inner.lock().session.take() {
            session.cancel.cancel();
        }
    }
}
