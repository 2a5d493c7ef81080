//! Chat message types exchanged with the backend.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Direction of a message: user-originated or assistant-originated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MsgType {
    Input,
    Output,
}

/// Lifecycle stage of an output message. Meaningless for input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MsgStatus {
    Progress,
    #[default]
    Success,
    Error,
}

/// Status of a single tool invocation, independent of the parent message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Progress,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    Low,
    High,
    Auto,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<ImageDetail>,
}

// The backend model emits `image_url` as a bare string, the browser client
// as an object. Both are accepted.
impl<'de> Deserialize<'de> for ImageUrl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bare(String),
            Full {
                url: String,
                #[serde(default)]
                detail: Option<ImageDetail>,
            },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Bare(url) => ImageUrl { url, detail: None },
            Repr::Full { url, detail } => ImageUrl { url, detail },
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRef {
    pub file_id: String,
    pub filename: String,
}

/// One item of message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: ImageUrl,
    },
    File {
        file: FileRef,
    },
    /// A backend tool call: name, arguments, response and its own status.
    Tool {
        tool_name: String,
        #[serde(default)]
        tool_args: Map<String, Value>,
        #[serde(default)]
        tool_response: Value,
        tool_status: ToolStatus,
    },
    /// A content type this client does not know; kept so the rest of the
    /// message still decodes.
    #[serde(other)]
    Unknown,
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>, detail: Option<ImageDetail>) -> Self {
        Self::ImageUrl {
            image_url: ImageUrl {
                url: url.into(),
                detail,
            },
        }
    }

    pub fn file(file_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self::File {
            file: FileRef {
                file_id: file_id.into(),
                filename: filename.into(),
            },
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn is_tool(&self) -> bool {
        matches!(self, Self::Tool { .. })
    }
}

/// A conversation message as received from the channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub session_id: String,

    #[serde(rename = "conv_id")]
    pub conversation_id: String,

    pub msg_id: String,

    pub msg_type: MsgType,

    #[serde(default)]
    pub status: MsgStatus,

    #[serde(default)]
    pub content: Vec<MessageContent>,

    #[serde(default)]
    pub actions: Vec<String>,

    #[serde(default)]
    pub tools: Vec<String>,
}

impl ChatMessage {
    /// Concatenated text items, in order.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(MessageContent::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
}

/// An outbound user message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatInput {
    pub session_id: String,

    #[serde(rename = "conv_id")]
    pub conversation_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    pub sender: Sender,

    pub tools: Vec<String>,

    pub actions: Vec<String>,

    pub content: Vec<MessageContent>,

    pub status: MsgStatus,

    pub msg_id: String,

    pub msg_type: MsgType,
}

/// Payload carried by an inbound `"chat"` event.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundPayload {
    Message(Box<ChatMessage>),
    /// The backend reports failures as `{"error": "..."}` on the same event.
    ServerError(String),
}

impl InboundPayload {
    /// Decode a `"chat"` event payload.
    ///
    /// An object with an `error` field is a server error; anything else must
    /// be a well-formed message.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        if let Some(error) = value.get("error") {
            let text = match error {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Ok(Self::ServerError(text));
        }
        let message: ChatMessage = serde_json::from_value(value)?;
        Ok(Self::Message(Box::new(message)))
    }
}
