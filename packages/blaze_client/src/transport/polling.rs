use reqwest::{Client, Url, header};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Endpoint, Incoming, TransportKind, incoming_channel};
use crate::error::TransportError;
use crate::protocol::engineio::{self, Handshake, Packet};

const TEXT_CONTENT_TYPE: &str = "text/plain;charset=UTF-8";

/// Engine.IO over HTTP long-polling: GET receives, POST sends.
pub struct PollingTransport {
    client: Client,
    url: Url,
    handshake: Handshake,
    rx: mpsc::Receiver<Incoming>,
    reader: JoinHandle<()>,
}

impl PollingTransport {
    pub async fn open(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let client = Client::new();
        let handshake_url = endpoint.transport_url(TransportKind::Polling, None);
        debug!(url = %handshake_url, "polling: handshaking");

        let payload = get_payload(&client, &handshake_url).await?;
        let mut packets = engineio::split_payload(&payload);
        let handshake = match packets.next().map(Packet::decode).transpose()? {
            Some(Packet::Open(handshake)) => handshake,
            Some(other) => {
                return Err(TransportError::Handshake(format!(
                    "expected open packet, got {other:?}"
                )));
            }
            None => return Err(TransportError::Handshake("empty handshake payload".into())),
        };
        debug!(sid = %handshake.sid, "polling: handshake complete");

        let url = endpoint.transport_url(TransportKind::Polling, Some(&handshake.sid));
        // Packets that rode along with the open packet go out before the first poll.
        let pending: Vec<String> = packets.map(str::to_string).collect();
        let (tx, rx) = incoming_channel();
        let reader = tokio::spawn(poll_loop(client.clone(), url.clone(), tx, pending));

        Ok(Self {
            client,
            url,
            handshake,
            rx,
            reader,
        })
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    pub async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        let resp = self
            .client
            .post(self.url.clone())
            .header(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)
            .body(frame)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(TransportError::Status(resp.status()));
        }
        Ok(())
    }

    pub fn incoming(&mut self) -> &mut mpsc::Receiver<Incoming> {
        &mut self.rx
    }

    pub async fn close(mut self) {
        if let Err(e) = self.send(Packet::Close.encode()).await {
            debug!(error = %e, "polling: close packet not delivered");
        }
        self.reader.abort();
    }
}

impl Drop for PollingTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn get_payload(client: &Client, url: &Url) -> Result<String, TransportError> {
    let resp = client.get(url.clone()).send().await?;
    if !resp.status().is_success() {
        return Err(TransportError::Status(resp.status()));
    }
    Ok(resp.text().await?)
}

async fn poll_loop(client: Client, url: Url, tx: mpsc::Sender<Incoming>, pending: Vec<String>) {
    for packet in pending {
        if tx.send(Ok(packet)).await.is_err() {
            return;
        }
    }

    loop {
        let payload = match get_payload(&client, &url).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "polling: request failed");
                let _ = tx.send(Err(e)).await;
                return;
            }
        };

        for packet in engineio::split_payload(&payload) {
            let closing = packet == Packet::Close.encode();
            if tx.send(Ok(packet.to_string())).await.is_err() || closing {
                debug!("polling: reader finished");
                return;
            }
        }
    }
}
