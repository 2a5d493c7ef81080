//! Blaze chat client - connection management and message reconciliation
//!
//! This crate talks to the Blaze chat backend over Socket.IO (WebSocket with
//! HTTP long-polling fallback), keeps the conversation as an ordered log
//! keyed by `msg_id`, and composes outbound user messages. It has no UI
//! knowledge; front ends render from [`ChatClient::messages`].
//!
//! # Example
//!
//! ```no_run
//! use blaze_client::{ChatClient, ClientConfig, ClientEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), blaze_client::ChatError> {
//!     let config = ClientConfig::new("http://localhost:8000/chat")?;
//!     let mut client = ChatClient::new(config);
//!     client.connect();
//!
//!     while let Some(event) = client.next_event().await {
//!         match event {
//!             ClientEvent::Connected { .. } => {
//!                 client.send_text("What's the weather in Paris?", None)?;
//!             }
//!             ClientEvent::Message { outcome, .. } => {
//!                 let message = &client.messages()[outcome.index()];
//!                 println!("{:?}: {}", message.status, message.text());
//!             }
//!             ClientEvent::Error(text) => eprintln!("{text}"),
//!             ClientEvent::Disconnected { .. } => break,
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod backoff;
pub mod client;
pub mod config;
pub mod connection;
mod error;
pub mod protocol;
pub mod reconciler;
pub mod session;
pub mod transport;
pub mod types;

pub use client::{ChatClient, ClientEvent};
pub use config::{ClientConfig, FileConfig, ReconnectConfig, load_config};
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState, ConnectionStatus};
pub use error::{
    CONNECT_FAILED_MESSAGE, CONNECTION_LOST_MESSAGE, ChatError, NOT_CONNECTED_MESSAGE,
    ProtocolError, TransportError,
};
pub use reconciler::{MessageLog, Reconciled};
pub use session::ChatSession;
pub use transport::{Endpoint, TransportKind};
pub use types::{
    ChatInput, ChatMessage, FileRef, ImageDetail, ImageUrl, InboundPayload, MessageContent,
    MsgStatus, MsgType, Sender, ToolStatus,
};
