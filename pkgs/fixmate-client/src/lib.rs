//! Fixmate Client - network side of the marketplace chat
//!
//! Connects the `fixmate-chat` state to the backend:
//!
//! - **connection**: single live session with back-off reconnect and
//!   ref-counted rooms, behind the [`Transport`] seam
//! - **ws**: WebSocket [`Transport`] over tokio-tungstenite
//! - **api**: REST calls behind the [`ChatApi`] seam, implemented with reqwest
//! - **wire**: JSON shapes of the API and real-time frames
//! - **client**: [`ChatClient`], which runs every user flow and reports
//!   failures as [`Notice`]s
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use fixmate_chat::{Role, UserId};
//! use fixmate_client::{ChatClient, ClientConfig, Session};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> fixmate_chat::Result<()> {
//!     let session = Session {
//!         user_id: UserId::from("u-1"),
//!         role: Role::Customer,
//!         token: "jwt".to_string(),
//!     };
//!     let (client, events, _notices) = ChatClient::from_config(&ClientConfig::default(), session)?;
//!     let client = Arc::new(client);
//!     let runner = client.clone();
//!     tokio::spawn(async move { runner.run(events).await });
//!     let inbox = client.start().await?;
//!     println!("{} conversations", inbox.len());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod connection;
pub mod wire;
pub mod ws;

pub use api::{ChatApi, QuotationDecision, QuotationDraft, RestApi};
pub use client::{ChatClient, Notice, Session};
pub use connection::{
    ConnectionEvent, ConnectionManager, ConnectionState, Link, ReconnectPolicy, Transport,
};
pub use ws::WsTransport;

use fixmate_chat::ChatConfig;
use std::time::Duration;

/// Configuration for the network client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST API base URL (default: http://localhost:3000/api)
    pub api_url: String,

    /// Real-time endpoint (default: ws://localhost:3000/ws)
    pub ws_url: String,

    /// Timeout for JSON requests (default: 30s)
    pub request_timeout: Duration,

    /// Timeout for attachment uploads (default: 120s)
    pub upload_timeout: Duration,

    /// Reconnect back-off for the live channel
    pub reconnect: ReconnectPolicy,

    /// Chat state settings
    pub chat: ChatConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000/api".to_string(),
            ws_url: "ws://localhost:3000/ws".to_string(),
            request_timeout: Duration::from_secs(30),
            upload_timeout: Duration::from_secs(120),
            reconnect: ReconnectPolicy::default(),
            chat: ChatConfig::default(),
        }
    }
}
