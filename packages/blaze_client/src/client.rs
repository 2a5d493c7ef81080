//! Chat client: connection, conversation log and session in one place.
//!
//! All mutations of the log go through [`ChatClient::next_event`] and
//! [`ChatClient::clear`], one at a time, in the order the transport delivers
//! events.

use crate::config::ClientConfig;
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionStatus};
use crate::error::ChatError;
use crate::reconciler::{MessageLog, Reconciled};
use crate::session::ChatSession;
use crate::transport::TransportKind;
use crate::types::{ChatInput, ChatMessage, MessageContent};

/// What changed after handling one channel event.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected { transport: TransportKind },
    Disconnected { reason: String },
    /// A chat message was reconciled into the log.
    Message { outcome: Reconciled, msg_id: String },
    /// A user-visible error string (connect failure or server error).
    Error(String),
}

pub struct ChatClient {
    connection: ConnectionManager,
    log: MessageLog,
    session: ChatSession,
}

impl ChatClient {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_session(config, ChatSession::new())
    }

    pub fn with_session(config: ClientConfig, session: ChatSession) -> Self {
        Self {
            connection: ConnectionManager::new(config),
            log: MessageLog::new(),
            session,
        }
    }

    pub fn connect(&mut self) {
        self.connection.connect();
    }

    pub async fn disconnect(&mut self) {
        self.connection.disconnect().await;
    }

    /// Compose and send a user message. The log is not touched: the backend
    /// echoes user input back as an inbound `input` message.
    pub fn send(
        &self,
        content: Vec<MessageContent>,
        system_prompt: Option<String>,
    ) -> Result<ChatInput, ChatError> {
        let input = self.session.compose(content, system_prompt);
        self.connection.send(&input)?;
        Ok(input)
    }

    pub fn send_text(
        &self,
        text: impl Into<String>,
        system_prompt: Option<String>,
    ) -> Result<ChatInput, ChatError> {
        self.send(vec![MessageContent::text(text)], system_prompt)
    }

    /// Wait for the next channel event and apply it.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        let event = self.connection.next_event().await?;
        Some(self.apply(event))
    }

    fn apply(&mut self, event: ConnectionEvent) -> ClientEvent {
        match event {
            ConnectionEvent::Connected { transport } => ClientEvent::Connected { transport },
            ConnectionEvent::Disconnected { reason } => ClientEvent::Disconnected { reason },
            ConnectionEvent::ConnectError { .. } => ClientEvent::Error(
                self.connection
                    .last_error()
                    .unwrap_or_else(|| crate::error::CONNECT_FAILED_MESSAGE.to_string()),
            ),
            ConnectionEvent::ServerError(text) => ClientEvent::Error(text),
            ConnectionEvent::Chat(message) => {
                let msg_id = message.msg_id.clone();
                let outcome = self.log.reconcile(*message);
                ClientEvent::Message { outcome, msg_id }
            }
        }
    }

    /// Clear the conversation.
    pub fn clear(&mut self) {
        self.log.clear();
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.log.messages()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn last_error(&self) -> Option<String> {
        self.connection.last_error()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconnectConfig;
    use crate::types::{MsgStatus, MsgType};

    fn client() -> ChatClient {
        let config = ClientConfig::new("http://127.0.0.1:9/chat")
            .unwrap()
            .with_reconnect(ReconnectConfig::disabled());
        ChatClient::with_session(config, ChatSession::with_ids("s", "c"))
    }

    fn chat(id: &str, status: MsgStatus) -> ConnectionEvent {
        ConnectionEvent::Chat(Box::new(ChatMessage {
            session_id: "s".into(),
            conversation_id: "c".into(),
            msg_id: id.into(),
            msg_type: MsgType::Output,
            status,
            content: vec![],
            actions: vec![],
            tools: vec![],
        }))
    }

    #[tokio::test]
    async fn chat_events_are_reconciled() {
        let mut client = client();

        let e = client.apply(chat("a", MsgStatus::Progress));
        assert_eq!(
            e,
            ClientEvent::Message {
                outcome: Reconciled::Appended(0),
                msg_id: "a".into()
            }
        );
        client.apply(chat("b", MsgStatus::Progress));
        let e = client.apply(chat("a", MsgStatus::Success));
        assert!(matches!(
            e,
            ClientEvent::Message {
                outcome: Reconciled::Replaced(0),
                ..
            }
        ));
        assert_eq!(client.messages().len(), 2);
        assert_eq!(client.messages()[0].status, MsgStatus::Success);

        client.clear();
        assert!(client.messages().is_empty());
    }

    #[tokio::test]
    async fn server_errors_surface_as_text() {
        let mut client = client();
        let e = client.apply(ConnectionEvent::ServerError("Init error: db".into()));
        assert_eq!(e, ClientEvent::Error("Init error: db".into()));
    }

    #[tokio::test]
    async fn send_while_disconnected_does_not_touch_log() {
        let client = client();
        let result = client.send_text("hi", None);
        assert!(matches!(result, Err(ChatError::NotConnected)));
        assert!(client.messages().is_empty());
        assert_eq!(
            client.last_error().as_deref(),
            Some("Not connected to server")
        );
    }
}
