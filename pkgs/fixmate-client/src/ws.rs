//! WebSocket transport
//!
//! Opens the socket with the bearer token in the handshake, then runs one
//! writer task (commands to text frames) and one reader task (text frames to
//! events). The link closes when either task stops, including when a write
//! fails.

use async_trait::async_trait;
use fixmate_chat::{ChatError, OutboundCommand, Result};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, info, warn};

use crate::connection::{Link, Transport};
use crate::wire::{decode_frame, encode_command};

pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

fn handshake_error(e: WsError) -> ChatError {
    match e {
        WsError::Http(response) if response.status() == StatusCode::UNAUTHORIZED => {
            ChatError::Unauthorized
        }
        WsError::Http(response) => ChatError::Server {
            status: response.status().as_u16(),
            message: "websocket handshake rejected".to_string(),
        },
        other => ChatError::Network(format!("websocket connect failed: {}", other)),
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, token: &str) -> Result<Link> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ChatError::InvalidState(format!("invalid socket url '{}': {}", self.url, e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ChatError::Validation("token contains invalid characters".to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (stream, _) = connect_async(request).await.map_err(handshake_error)?;
        info!("WebSocket connected to {}", self.url);
        let (mut sink, mut source) = stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundCommand>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        // Either task stopping closes the whole link
        let closed = CancellationToken::new();

        let writer_closed = closed.clone();
        tokio::spawn(async move {
            loop {
                let command = tokio::select! {
                    _ = writer_closed.cancelled() => break,
                    command = outbound_rx.recv() => match command {
                        Some(command) => command,
                        None => break,
                    },
                };
                if let Err(e) = sink.send(WsMessage::Text(encode_command(&command))).await {
                    warn!("Failed to send {}: {}", command.event_name(), e);
                    break;
                }
            }
            writer_closed.cancel();
            let _ = sink.close().await;
            debug!("WebSocket writer stopped");
        });

        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = closed.cancelled() => break,
                    frame = source.next() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };
                match frame {
                    Ok(WsMessage::Text(text)) => match decode_frame(&text) {
                        Ok(Some(event)) => {
                            if inbound_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!("Dropping malformed frame: {}", e),
                    },
                    Ok(WsMessage::Close(reason)) => {
                        debug!("Server closed the socket: {:?}", reason);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("WebSocket read error: {}", e);
                        break;
                    }
                }
            }
            closed.cancel();
            debug!("WebSocket reader stopped");
        });

        Ok(Link {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
