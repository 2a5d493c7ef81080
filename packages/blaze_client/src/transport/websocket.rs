use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite};
use tracing::debug;

use super::{Endpoint, Incoming, TransportKind, incoming_channel};
use crate::error::TransportError;
use crate::protocol::engineio::{Handshake, Packet};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Engine.IO over a single WebSocket: one packet per text frame.
pub struct WebSocketTransport {
    handshake: Handshake,
    writer: SplitSink<WsStream, tungstenite::Message>,
    rx: mpsc::Receiver<Incoming>,
    reader: JoinHandle<()>,
}

impl WebSocketTransport {
    pub async fn open(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let url = endpoint.transport_url(TransportKind::Websocket, None);
        debug!(%url, "websocket: connecting");
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (writer, mut read) = stream.split();

        // The server speaks first with the open packet.
        let handshake = loop {
            match read.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => match Packet::decode(text.as_str())? {
                    Packet::Open(handshake) => break handshake,
                    other => {
                        return Err(TransportError::Handshake(format!(
                            "expected open packet, got {other:?}"
                        )));
                    }
                },
                Some(Ok(tungstenite::Message::Close(_))) | None => {
                    return Err(TransportError::Closed);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        };
        debug!(sid = %handshake.sid, "websocket: handshake complete");

        let (tx, rx) = incoming_channel();
        let reader = tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                let item = match msg {
                    Ok(tungstenite::Message::Text(text)) => Ok(text.as_str().to_string()),
                    Ok(tungstenite::Message::Close(_)) => break,
                    // Ping/pong frames are answered by tungstenite itself.
                    Ok(_) => continue,
                    Err(e) => Err(TransportError::from(e)),
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
            debug!("websocket: reader finished");
        });

        Ok(Self {
            handshake,
            writer,
            rx,
            reader,
        })
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    pub async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.writer
            .send(tungstenite::Message::Text(frame.into()))
            .await?;
        Ok(())
    }

    pub fn incoming(&mut self) -> &mut mpsc::Receiver<Incoming> {
        &mut self.rx
    }

    pub async fn close(mut self) {
        let _ = self.writer.send(tungstenite::Message::Close(None)).await;
        let _ = self.writer.close().await;
        self.reader.abort();
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
