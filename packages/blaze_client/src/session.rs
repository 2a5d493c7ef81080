//! Per-session identifiers and outbound message composition.

use uuid::Uuid;

use crate::types::{ChatInput, MessageContent, MsgStatus, MsgType, Sender};

/// Identifiers generated once per UI session and stamped on every message
/// sent within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    session_id: String,
    conversation_id: String,
}

impl ChatSession {
    /// Start a session with fresh random identifiers.
    pub fn new() -> Self {
        Self {
            session_id: format!("session_{}", Uuid::new_v4()),
            conversation_id: format!("conv_{}", Uuid::new_v4()),
        }
    }

    pub fn with_ids(session_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            conversation_id: conversation_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Build an outbound user message with a fresh `msg_id`.
    pub fn compose(
        &self,
        content: Vec<MessageContent>,
        system_prompt: Option<String>,
    ) -> ChatInput {
        ChatInput {
            session_id: self.session_id.clone(),
            conversation_id: self.conversation_id.clone(),
            system_prompt,
            sender: Sender::User,
            tools: Vec::new(),
            actions: Vec::new(),
            content,
            status: MsgStatus::Success,
            msg_id: Uuid::new_v4().to_string(),
            msg_type: MsgType::Input,
        }
    }

    pub fn compose_text(&self, text: impl Into<String>, system_prompt: Option<String>) -> ChatInput {
        self.compose(vec![MessageContent::text(text)], system_prompt)
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_have_prefixes() {
        let session = ChatSession::new();
        assert!(session.session_id().starts_with("session_"));
        assert!(session.conversation_id().starts_with("conv_"));
        assert_ne!(session, ChatSession::new());
    }

    #[test]
    fn compose_sets_fixed_fields() {
        let session = ChatSession::with_ids("s1", "c1");
        let input = session.compose_text("hello", Some("be brief".into()));

        assert_eq!(input.session_id, "s1");
        assert_eq!(input.conversation_id, "c1");
        assert_eq!(input.msg_type, MsgType::Input);
        assert_eq!(input.sender, Sender::User);
        assert_eq!(input.status, MsgStatus::Success);
        assert!(input.tools.is_empty());
        assert!(input.actions.is_empty());
        assert_eq!(input.system_prompt.as_deref(), Some("be brief"));
        assert_eq!(input.content, vec![MessageContent::text("hello")]);
        assert!(Uuid::parse_str(&input.msg_id).is_ok());
    }

    #[test]
    fn ids_reused_but_msg_id_fresh() {
        let session = ChatSession::new();
        let a = session.compose_text("one", None);
        let b = session.compose_text("two", None);

        assert_eq!(a.session_id, b.session_id);
        assert_eq!(a.conversation_id, b.conversation_id);
        assert_ne!(a.msg_id, b.msg_id);
    }
}
