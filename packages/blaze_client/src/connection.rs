//! Connection manager: owns one Socket.IO channel to the configured endpoint.
//!
//! A background driver task opens the transport, joins the namespace, answers
//! pings, forwards outbound frames and turns inbound `"chat"` events into
//! [`ConnectionEvent`]s. Connection state is published through a
//! `tokio::sync::watch` channel so callers can observe `is_connected` and
//! `last_error` without polling the driver.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::config::ClientConfig;
use crate::error::{
    CONNECT_FAILED_MESSAGE, CONNECTION_LOST_MESSAGE, ChatError, NOT_CONNECTED_MESSAGE,
    TransportError,
};
use crate::protocol::{self, engineio, socketio};
use crate::transport::{Transport, TransportKind};
use crate::types::{ChatInput, ChatMessage, InboundPayload};

/// Upper bound on a graceful transport close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Observable connection state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub last_error: Option<String>,
    /// Transport in use while connected.
    pub transport: Option<TransportKind>,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// Events produced by the channel, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected { transport: TransportKind },
    Disconnected { reason: String },
    ConnectError { message: String },
    Chat(Box<ChatMessage>),
    /// The backend reported a failure on the chat event.
    ServerError(String),
}

struct DriverHandle {
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owner of the real-time channel.
pub struct ConnectionManager {
    config: ClientConfig,
    status: Arc<watch::Sender<ConnectionStatus>>,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    events_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
    driver: Option<DriverHandle>,
}

impl ConnectionManager {
    pub fn new(config: ClientConfig) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            status: Arc::new(status),
            events_tx,
            events_rx,
            driver: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Start the channel. Calling it again while the driver runs is a no-op.
    pub fn connect(&mut self) {
        if let Some(driver) = &self.driver {
            if !driver.task.is_finished() {
                debug!("connect: already running");
                return;
            }
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let driver = Driver {
            config: self.config.clone(),
            status: self.status.clone(),
            events: self.events_tx.clone(),
            outbound: outbound_rx,
            cancel: cancel.clone(),
        };

        info!(
            url = %self.config.endpoint.origin(),
            namespace = %self.config.endpoint.namespace(),
            "connecting"
        );
        let task = tokio::spawn(driver.run());
        self.driver = Some(DriverHandle {
            outbound: outbound_tx,
            cancel,
            task,
        });
    }

    /// Transmit a message. Fails with [`ChatError::NotConnected`] and records
    /// the error when the channel is not connected; nothing is queued.
    pub fn send(&self, message: &ChatInput) -> Result<(), ChatError> {
        let outbound = match &self.driver {
            Some(driver) if self.is_connected() => &driver.outbound,
            _ => {
                warn!(msg_id = %message.msg_id, "send while disconnected");
                self.record_error(NOT_CONNECTED_MESSAGE);
                return Err(ChatError::NotConnected);
            }
        };

        let frame = protocol::encode_chat_frame(self.config.endpoint.namespace(), message)?;
        if outbound.send(frame).is_err() {
            self.record_error(NOT_CONNECTED_MESSAGE);
            return Err(ChatError::NotConnected);
        }
        debug!(msg_id = %message.msg_id, "chat message queued for send");
        Ok(())
    }

    /// Tear the channel down. Safe to call repeatedly.
    pub async fn disconnect(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.cancel.cancel();
            if let Err(e) = driver.task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "connection driver panicked");
                }
            }
        }
        self.status.send_modify(|s| {
            s.state = ConnectionState::Disconnected;
            s.transport = None;
        });
    }

    /// Next channel event. Pending until one arrives.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        self.events_rx.recv().await
    }

    /// Non-blocking variant of [`next_event`](Self::next_event).
    pub fn try_next_event(&mut self) -> Option<ConnectionEvent> {
        self.events_rx.try_recv().ok()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().is_connected()
    }

    pub fn last_error(&self) -> Option<String> {
        self.status.borrow().last_error.clone()
    }

    /// Watch for status changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    fn record_error(&self, message: &str) {
        self.status
            .send_modify(|s| s.last_error = Some(message.to_string()));
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.cancel.cancel();
            driver.task.abort();
        }
    }
}

/// How a connected session ended.
#[derive(Debug)]
enum SessionEnd {
    /// `disconnect()` was called.
    Cancelled,
    /// The server left the namespace; no reconnection.
    ServerDisconnect,
    /// The transport went away; `error` marks an abnormal loss.
    Lost { reason: String, error: bool },
}

enum FrameAction {
    Continue,
    PingReceived,
    End(SessionEnd),
}

struct Driver {
    config: ClientConfig,
    status: Arc<watch::Sender<ConnectionStatus>>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(mut self) {
        let policy = self.config.reconnect.clone();
        let mut backoff = Backoff::new(
            policy.delay,
            policy.delay_max,
            policy.randomization_factor,
        );

        loop {
            self.status.send_modify(|s| {
                s.state = ConnectionState::Connecting;
                s.transport = None;
            });

            let opened = tokio::select! {
                _ = self.cancel.cancelled() => break,
                opened = self.open_session() => opened,
            };

            match opened {
                Ok(mut transport) => {
                    backoff.reset();
                    self.on_connected(transport.kind());
                    let end = self.run_session(&mut transport).await;
                    self.drop_pending();

                    match end {
                        SessionEnd::Cancelled => {
                            let leave = protocol::wrap(&socketio::Packet::disconnect(
                                self.config.endpoint.namespace(),
                            ));
                            let _ = transport.send(leave).await;
                            close_transport(transport).await;
                            self.on_disconnected("io client disconnect", None);
                            return;
                        }
                        SessionEnd::ServerDisconnect => {
                            close_transport(transport).await;
                            self.on_disconnected("io server disconnect", None);
                            return;
                        }
                        SessionEnd::Lost { reason, error } => {
                            close_transport(transport).await;
                            let last_error = error.then_some(CONNECTION_LOST_MESSAGE);
                            self.on_disconnected(&reason, last_error);
                        }
                    }
                }
                Err(e) => self.on_connect_error(&e),
            }

            if !policy.enabled {
                debug!("reconnection disabled");
                break;
            }
            if let Some(max) = policy.attempts {
                if backoff.attempts() >= max {
                    warn!(attempts = max, "reconnection attempts exhausted");
                    break;
                }
            }

            let delay = backoff.next_delay();
            info!(
                attempt = backoff.attempts(),
                delay_ms = delay.as_millis() as u64,
                "reconnecting"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.status.send_modify(|s| {
            s.state = ConnectionState::Disconnected;
            s.transport = None;
        });
    }

    /// Try each configured transport in order, then join the namespace.
    async fn open_session(&self) -> Result<Transport, TransportError> {
        let mut last_err = TransportError::Closed;
        for &kind in &self.config.transports {
            let mut transport =
                match Transport::open(&self.config.endpoint, kind, self.config.connect_timeout)
                    .await
                {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(transport = %kind, error = %e, "transport unavailable");
                        last_err = e;
                        continue;
                    }
                };

            match self.join_namespace(&mut transport).await {
                Ok(()) => return Ok(transport),
                // Rejected by the server itself; another transport won't help.
                Err(e @ TransportError::Handshake(_)) => {
                    close_transport(transport).await;
                    return Err(e);
                }
                Err(e) => {
                    warn!(transport = %kind, error = %e, "namespace join failed");
                    close_transport(transport).await;
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    async fn join_namespace(&self, transport: &mut Transport) -> Result<(), TransportError> {
        let namespace = self.config.endpoint.namespace();
        transport
            .send(protocol::wrap(&socketio::Packet::connect(namespace, None)))
            .await?;

        tokio::time::timeout(
            self.config.connect_timeout,
            await_namespace_ack(transport, namespace),
        )
        .await
        .map_err(|_| TransportError::Timeout("namespace connect"))?
    }

    async fn run_session(&mut self, transport: &mut Transport) -> SessionEnd {
        let handshake = transport.handshake();
        let ping_window =
            Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
        let ping_deadline = tokio::time::sleep(ping_window);
        tokio::pin!(ping_deadline);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return SessionEnd::Cancelled,

                () = &mut ping_deadline => {
                    return SessionEnd::Lost {
                        reason: "ping timeout".to_string(),
                        error: true,
                    };
                }

                frame = transport.incoming().recv() => {
                    let text = match frame {
                        Some(Ok(text)) => text,
                        Some(Err(e)) => {
                            return SessionEnd::Lost {
                                reason: format!("transport error: {e}"),
                                error: true,
                            };
                        }
                        None => {
                            return SessionEnd::Lost {
                                reason: "transport close".to_string(),
                                error: false,
                            };
                        }
                    };
                    match self.handle_frame(transport, &text).await {
                        FrameAction::Continue => {}
                        FrameAction::PingReceived => {
                            ping_deadline.as_mut().reset(Instant::now() + ping_window);
                        }
                        FrameAction::End(end) => return end,
                    }
                }

                Some(frame) = self.outbound.recv() => {
                    if let Err(e) = transport.send(frame).await {
                        return SessionEnd::Lost {
                            reason: format!("transport error: {e}"),
                            error: true,
                        };
                    }
                }
            }
        }
    }

    async fn handle_frame(&mut self, transport: &mut Transport, text: &str) -> FrameAction {
        let packet = match engineio::Packet::decode(text) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "ignoring undecodable engine.io packet");
                return FrameAction::Continue;
            }
        };

        match packet {
            engineio::Packet::Ping(data) => {
                if let Err(e) = transport.send(engineio::Packet::Pong(data).encode()).await {
                    return FrameAction::End(SessionEnd::Lost {
                        reason: format!("transport error: {e}"),
                        error: true,
                    });
                }
                FrameAction::PingReceived
            }
            engineio::Packet::Close => FrameAction::End(SessionEnd::Lost {
                reason: "transport close".to_string(),
                error: false,
            }),
            engineio::Packet::Message(data) => self.handle_socket_packet(transport, &data).await,
            engineio::Packet::Open(_)
            | engineio::Packet::Pong(_)
            | engineio::Packet::Upgrade
            | engineio::Packet::Noop => FrameAction::Continue,
        }
    }

    async fn handle_socket_packet(&mut self, transport: &mut Transport, data: &str) -> FrameAction {
        let packet = match socketio::Packet::decode(data) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "ignoring undecodable socket.io packet");
                return FrameAction::Continue;
            }
        };
        let namespace = self.config.endpoint.namespace();
        if packet.namespace != namespace {
            debug!(namespace = %packet.namespace, "ignoring packet for other namespace");
            return FrameAction::Continue;
        }

        match packet.packet_type {
            socketio::PacketType::Disconnect => {
                return FrameAction::End(SessionEnd::ServerDisconnect);
            }
            socketio::PacketType::ConnectError => {
                let reason = packet
                    .error_message()
                    .unwrap_or_else(|| "connect error".to_string());
                return FrameAction::End(SessionEnd::Lost {
                    reason,
                    error: true,
                });
            }
            socketio::PacketType::Connect | socketio::PacketType::Ack => {
                return FrameAction::Continue;
            }
            socketio::PacketType::Event => {}
        }

        if let Some(id) = packet.id {
            let ack = socketio::Packet {
                packet_type: socketio::PacketType::Ack,
                namespace: namespace.to_string(),
                id: Some(id),
                data: Some(serde_json::Value::Array(Vec::new())),
            };
            if let Err(e) = transport.send(protocol::wrap(&ack)).await {
                return FrameAction::End(SessionEnd::Lost {
                    reason: format!("transport error: {e}"),
                    error: true,
                });
            }
        }

        match protocol::decode_chat_payload(&packet) {
            None => {
                let name = packet.event_parts().map(|(name, _)| name.to_string());
                debug!(event = ?name, "ignoring event");
            }
            Some(Ok(InboundPayload::Message(message))) => {
                debug!(
                    msg_id = %message.msg_id,
                    msg_type = ?message.msg_type,
                    status = ?message.status,
                    "chat message received"
                );
                let _ = self.events.send(ConnectionEvent::Chat(message));
            }
            Some(Ok(InboundPayload::ServerError(text))) => {
                warn!(error = %text, "server reported an error");
                self.status
                    .send_modify(|s| s.last_error = Some(text.clone()));
                let _ = self.events.send(ConnectionEvent::ServerError(text));
            }
            Some(Err(e)) => {
                warn!(error = %e, "ignoring malformed chat payload");
            }
        }
        FrameAction::Continue
    }

    fn on_connected(&self, transport: TransportKind) {
        info!(%transport, "connected to server");
        self.status.send_modify(|s| {
            s.state = ConnectionState::Connected;
            s.last_error = None;
            s.transport = Some(transport);
        });
        let _ = self.events.send(ConnectionEvent::Connected { transport });
    }

    fn on_disconnected(&self, reason: &str, last_error: Option<&str>) {
        info!(reason, "disconnected from server");
        self.status.send_modify(|s| {
            s.state = ConnectionState::Disconnected;
            s.transport = None;
            if let Some(err) = last_error {
                s.last_error = Some(err.to_string());
            }
        });
        let _ = self.events.send(ConnectionEvent::Disconnected {
            reason: reason.to_string(),
        });
    }

    fn on_connect_error(&self, err: &TransportError) {
        if err.is_unreachable() {
            info!(error = %err, "server unreachable");
        } else {
            warn!(error = %err, "connection error");
        }
        self.status.send_modify(|s| {
            s.state = ConnectionState::Disconnected;
            s.transport = None;
            s.last_error = Some(CONNECT_FAILED_MESSAGE.to_string());
        });
        let _ = self.events.send(ConnectionEvent::ConnectError {
            message: err.to_string(),
        });
    }

    /// Frames queued when the session ended are not carried over.
    fn drop_pending(&mut self) {
        let mut dropped = 0usize;
        while self.outbound.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!(dropped, "dropped unsent messages");
        }
    }
}

/// Wait for the server to accept (or refuse) the namespace connect, answering
/// pings meanwhile.
async fn await_namespace_ack(
    transport: &mut Transport,
    namespace: &str,
) -> Result<(), TransportError> {
    loop {
        let frame = match transport.incoming().recv().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Err(e),
            None => return Err(TransportError::Closed),
        };
        match engineio::Packet::decode(&frame)? {
            engineio::Packet::Ping(data) => {
                transport.send(engineio::Packet::Pong(data).encode()).await?;
            }
            engineio::Packet::Close => return Err(TransportError::Closed),
            engineio::Packet::Message(data) => {
                let packet = socketio::Packet::decode(&data)?;
                if packet.namespace != namespace {
                    continue;
                }
                match packet.packet_type {
                    socketio::PacketType::Connect => return Ok(()),
                    socketio::PacketType::ConnectError => {
                        let reason = packet
                            .error_message()
                            .unwrap_or_else(|| "connection refused".to_string());
                        return Err(TransportError::Handshake(format!(
                            "namespace {namespace} rejected: {reason}"
                        )));
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
}

async fn close_transport(transport: Transport) {
    let kind = transport.kind();
    if tokio::time::timeout(CLOSE_TIMEOUT, transport.close())
        .await
        .is_err()
    {
        debug!(transport = %kind, "close timed out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconnectConfig;
    use crate::session::ChatSession;

    fn unreachable_config() -> ClientConfig {
        // Port 9 (discard) on loopback is not expected to accept connections.
        ClientConfig::new("http://127.0.0.1:9/chat")
            .unwrap()
            .with_reconnect(ReconnectConfig::disabled())
            .with_connect_timeout(Duration::from_secs(2))
    }

    #[test]
    fn status_defaults_to_disconnected() {
        let status = ConnectionStatus::default();
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert!(!status.is_connected());
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn send_before_connect_records_error() {
        let manager = ConnectionManager::new(unreachable_config());
        let input = ChatSession::new().compose_text("hello", None);

        let result = manager.send(&input);
        assert!(matches!(result, Err(ChatError::NotConnected)));
        assert_eq!(manager.last_error().as_deref(), Some("Not connected to server"));
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn connect_failure_reports_error() {
        let mut manager = ConnectionManager::new(unreachable_config());
        manager.connect();

        let event = tokio::time::timeout(Duration::from_secs(10), manager.next_event())
            .await
            .expect("timed out waiting for connect error");
        assert!(matches!(event, Some(ConnectionEvent::ConnectError { .. })));

        let mut status = manager.subscribe();
        let status = status
            .wait_for(|s| s.state == ConnectionState::Disconnected)
            .await
            .unwrap()
            .clone();
        assert_eq!(
            status.last_error.as_deref(),
            Some("Failed to connect to server")
        );

        manager.disconnect().await;
        manager.disconnect().await;
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn reconnection_stops_after_attempt_cap() {
        let config = unreachable_config().with_reconnect(ReconnectConfig {
            enabled: true,
            attempts: Some(2),
            delay: Duration::from_millis(10),
            delay_max: Duration::from_millis(20),
            randomization_factor: 0.0,
        });
        let mut manager = ConnectionManager::new(config);
        manager.connect();

        // The first attempt plus two retries.
        for _ in 0..3 {
            let event = tokio::time::timeout(Duration::from_secs(10), manager.next_event())
                .await
                .expect("timed out waiting for connect error");
            assert!(matches!(event, Some(ConnectionEvent::ConnectError { .. })));
        }
        let more = tokio::time::timeout(Duration::from_millis(500), manager.next_event()).await;
        assert!(more.is_err(), "unexpected event after cap: {more:?}");
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = crate::transport::Endpoint::parse(&format!("http://127.0.0.1:{port}/chat"))
            .unwrap();
        for kind in [TransportKind::Websocket, TransportKind::Polling] {
            let err = Transport::open(&endpoint, kind, Duration::from_secs(2))
                .await
                .err()
                .expect("nothing listens on the port");
            assert!(err.is_unreachable(), "{kind}: {err}");
        }
    }
}
