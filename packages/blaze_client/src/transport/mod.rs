//! Transports carrying Engine.IO packets: WebSocket first, long-polling as
//! fallback.
//!
//! Each open transport spawns a reader task that pushes inbound packets onto
//! a channel, so the connection driver can `select!` on it without cancelling
//! an in-flight read.

mod polling;
mod websocket;

pub use polling::PollingTransport;
pub use websocket::WebSocketTransport;

use std::fmt;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::protocol::engineio::{self, Handshake};

/// Path the Socket.IO server is mounted on.
pub const SOCKET_IO_PATH: &str = "/socket.io/";

/// Inbound packet channel capacity per transport.
const INCOMING_CAPACITY: usize = 256;

/// One raw Engine.IO packet, or the error that ended the reader.
pub type Incoming = Result<String, TransportError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Websocket,
    Polling,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Websocket => "websocket",
            Self::Polling => "polling",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Socket.IO endpoint such as `http://localhost:8000/chat`, split into the
/// server origin and the namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    origin: Url,
    namespace: String,
}

impl Endpoint {
    pub fn parse(url: &str) -> Result<Self, TransportError> {
        let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;
        match parsed.scheme() {
            "http" | "https" | "ws" | "wss" => {}
            other => {
                return Err(TransportError::InvalidUrl(format!(
                    "{url}: unsupported scheme {other}"
                )));
            }
        }
        if parsed.host_str().is_none() {
            return Err(TransportError::InvalidUrl(format!("{url}: missing host")));
        }

        let path = parsed.path().trim_end_matches('/');
        let namespace = if path.is_empty() {
            "/".to_string()
        } else {
            path.to_string()
        };

        let mut origin = parsed.clone();
        origin.set_path("");
        origin.set_query(None);
        origin.set_fragment(None);

        Ok(Self { origin, namespace })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Engine.IO URL for `kind`, with the session id once one is assigned.
    pub fn transport_url(&self, kind: TransportKind, sid: Option<&str>) -> Url {
        let mut url = self.origin.clone();
        let secure = matches!(url.scheme(), "https" | "wss");
        let scheme = match (kind, secure) {
            (TransportKind::Websocket, false) => "ws",
            (TransportKind::Websocket, true) => "wss",
            (TransportKind::Polling, false) => "http",
            (TransportKind::Polling, true) => "https",
        };
        // Only switches between special schemes, which `Url` permits.
        let _ = url.set_scheme(scheme);
        url.set_path(SOCKET_IO_PATH);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("EIO", &engineio::PROTOCOL_VERSION.to_string());
            query.append_pair("transport", kind.as_str());
            if let Some(sid) = sid {
                query.append_pair("sid", sid);
            }
        }
        url
    }
}

/// An open Engine.IO transport.
pub enum Transport {
    WebSocket(WebSocketTransport),
    Polling(PollingTransport),
}

impl Transport {
    /// Open a transport of `kind` and complete the Engine.IO handshake.
    pub async fn open(
        endpoint: &Endpoint,
        kind: TransportKind,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let open = async {
            match kind {
                TransportKind::Websocket => WebSocketTransport::open(endpoint)
                    .await
                    .map(Transport::WebSocket),
                TransportKind::Polling => PollingTransport::open(endpoint)
                    .await
                    .map(Transport::Polling),
            }
        };
        tokio::time::timeout(timeout, open)
            .await
            .map_err(|_| TransportError::Timeout("engine.io handshake"))?
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Self::WebSocket(_) => TransportKind::Websocket,
            Self::Polling(_) => TransportKind::Polling,
        }
    }

    pub fn handshake(&self) -> &Handshake {
        match self {
            Self::WebSocket(t) => t.handshake(),
            Self::Polling(t) => t.handshake(),
        }
    }

    /// Send one encoded Engine.IO packet.
    pub async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        match self {
            Self::WebSocket(t) => t.send(frame).await,
            Self::Polling(t) => t.send(frame).await,
        }
    }

    /// Inbound packets. The channel closes when the transport does.
    pub fn incoming(&mut self) -> &mut mpsc::Receiver<Incoming> {
        match self {
            Self::WebSocket(t) => t.incoming(),
            Self::Polling(t) => t.incoming(),
        }
    }

    /// Best-effort close; the reader task stops either way.
    pub async fn close(self) {
        match self {
            Self::WebSocket(t) => t.close().await,
            Self::Polling(t) => t.close().await,
        }
    }
}

fn incoming_channel() -> (mpsc::Sender<Incoming>, mpsc::Receiver<Incoming>) {
    mpsc::channel(INCOMING_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_origin_and_namespace() {
        let ep = Endpoint::parse("http://localhost:8000/chat").unwrap();
        assert_eq!(ep.namespace(), "/chat");
        assert_eq!(ep.origin().as_str(), "http://localhost:8000/");

        let ep = Endpoint::parse("https://example.com/chat/").unwrap();
        assert_eq!(ep.namespace(), "/chat");

        let ep = Endpoint::parse("http://localhost:8000").unwrap();
        assert_eq!(ep.namespace(), "/");
    }

    #[test]
    fn builds_transport_urls() {
        let ep = Endpoint::parse("http://localhost:8000/chat").unwrap();
        assert_eq!(
            ep.transport_url(TransportKind::Websocket, None).as_str(),
            "ws://localhost:8000/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            ep.transport_url(TransportKind::Polling, Some("abc")).as_str(),
            "http://localhost:8000/socket.io/?EIO=4&transport=polling&sid=abc"
        );

        let ep = Endpoint::parse("https://blaze.example/chat").unwrap();
        assert_eq!(
            ep.transport_url(TransportKind::Websocket, None).scheme(),
            "wss"
        );
    }

    #[test]
    fn rejects_bad_endpoints() {
        assert!(Endpoint::parse("not a url").is_err());
        assert!(Endpoint::parse("ftp://host/chat").is_err());
    }
}
