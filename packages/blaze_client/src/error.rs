//! Error types for the chat client.

use tokio_tungstenite::tungstenite;

/// User-visible status string for a failed connection attempt.
pub const CONNECT_FAILED_MESSAGE: &str = "Failed to connect to server";

/// User-visible status string for a send attempted while disconnected.
pub const NOT_CONNECTED_MESSAGE: &str = "Not connected to server";

/// User-visible status string for a channel that dropped with an error.
pub const CONNECTION_LOST_MESSAGE: &str = "Connection to server lost";

/// Errors raised while encoding or decoding Engine.IO / Socket.IO packets.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty packet")]
    Empty,

    #[error("unknown packet type: {0:?}")]
    UnknownPacketType(char),

    #[error("binary packets are not supported")]
    BinaryUnsupported,

    #[error("malformed packet: {0}")]
    Malformed(String),

    #[error("invalid json in packet: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by a transport (WebSocket or HTTP long-polling).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected http status: {0}")]
    Status(reqwest::StatusCode),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("transport closed")]
    Closed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl TransportError {
    /// Whether the error means nothing is listening at the endpoint.
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::WebSocket(tungstenite::Error::Io(io_err)) => matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            Self::Http(err) => err.is_connect(),
            _ => false,
        }
    }
}

/// Errors surfaced by the public client API.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("not connected to server")]
    NotConnected,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("failed to load configuration: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ChatError {
    /// Short string suitable for a status indicator.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotConnected => NOT_CONNECTED_MESSAGE.to_string(),
            Self::Transport(_) => CONNECT_FAILED_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<figment::Error> for ChatError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}
