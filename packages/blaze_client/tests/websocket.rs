//! End-to-end tests against a loopback Socket.IO server speaking over WebSocket.

use std::time::Duration;

use blaze_client::{
    ChatClient, ClientConfig, ClientEvent, ConnectionState, MsgStatus, MsgType, ReconnectConfig,
    TransportKind,
};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

const OPEN: &str =
    r#"0{"sid":"test-sid","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

type ServerStream = WebSocketStream<TcpStream>;

async fn listen() -> (TcpListener, ClientConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = ClientConfig::new(&format!("http://127.0.0.1:{port}/chat"))
        .unwrap()
        .with_transports(vec![TransportKind::Websocket])
        .with_reconnect(ReconnectConfig::disabled())
        .with_connect_timeout(Duration::from_secs(5));
    (listener, config)
}

/// Accept one client and complete the Engine.IO and `/chat` namespace handshakes.
async fn accept(listener: &TcpListener) -> ServerStream {
    accept_with(listener, OPEN).await
}

async fn accept_with(listener: &TcpListener, open: &str) -> ServerStream {
    let (tcp, _) = listener.accept().await.unwrap();
    let mut ws = accept_async(tcp).await.unwrap();
    ws.send(Message::Text(open.to_string().into())).await.unwrap();
    assert_eq!(recv_text(&mut ws).await, "40/chat,");
    ws.send(Message::Text(r#"40/chat,{"sid":"ns-sid"}"#.into()))
        .await
        .unwrap();
    ws
}

async fn recv_text(ws: &mut ServerStream) -> String {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return text.as_str().to_string(),
            Some(Ok(_)) => continue,
            other => panic!("client went away: {other:?}"),
        }
    }
}

/// Wait for the next chat event from the client and return its payload.
async fn recv_chat(ws: &mut ServerStream) -> Value {
    loop {
        let text = recv_text(ws).await;
        if let Some(json) = text.strip_prefix("42/chat,") {
            let args: Value = serde_json::from_str(json).unwrap();
            assert_eq!(args[0], "chat");
            return args[1].clone();
        }
    }
}

async fn push_chat(ws: &mut ServerStream, payload: Value) {
    let frame = format!("42/chat,{}", json!(["chat", payload]));
    ws.send(Message::Text(frame.into())).await.unwrap();
}

fn output(id: &str, status: &str, text: &str) -> Value {
    json!({
        "session_id": "s",
        "conv_id": "c",
        "msg_id": id,
        "msg_type": "output",
        "status": status,
        "content": [{"type": "text", "text": text}],
        "actions": [],
        "tools": []
    })
}

async fn next(client: &mut ChatClient) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(5), client.next_event())
        .await
        .expect("timed out waiting for client event")
        .expect("event channel closed")
}

#[tokio::test]
async fn streamed_reply_is_reconciled_in_place() {
    let (listener, config) = listen().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let input = recv_chat(&mut ws).await;
        assert_eq!(input["sender"], "user");
        assert_eq!(input["msg_type"], "input");
        assert_eq!(input["content"][0]["text"], "What's the weather in Paris?");

        // Echo of the user's message, then the streamed reply.
        let mut echo = input.clone();
        echo.as_object_mut().unwrap().remove("sender");
        push_chat(&mut ws, echo).await;
        push_chat(&mut ws, output("m1", "progress", "Par")).await;
        push_chat(&mut ws, output("m1", "success", "Paris: sunny")).await;
        ws
    });

    let mut client = ChatClient::new(config);
    client.connect();
    assert_eq!(
        next(&mut client).await,
        ClientEvent::Connected {
            transport: TransportKind::Websocket
        }
    );
    assert!(client.is_connected());

    let input = client
        .send_text("What's the weather in Paris?", None)
        .unwrap();

    for _ in 0..3 {
        assert!(matches!(next(&mut client).await, ClientEvent::Message { .. }));
    }

    let messages = client.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].msg_id, input.msg_id);
    assert_eq!(messages[0].msg_type, MsgType::Input);
    assert_eq!(messages[1].msg_id, "m1");
    assert_eq!(messages[1].status, MsgStatus::Success);
    assert_eq!(messages[1].text(), "Paris: sunny");

    let _ws = server.await.unwrap();
    client.disconnect().await;
    assert!(!client.is_connected());
}

#[tokio::test]
async fn malformed_payloads_are_ignored() {
    let (listener, config) = listen().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        push_chat(&mut ws, json!({"bogus": true})).await;
        ws.send(Message::Text("42/chat,not json".into())).await.unwrap();
        push_chat(&mut ws, output("m2", "success", "still here")).await;
        ws
    });

    let mut client = ChatClient::new(config);
    client.connect();
    assert!(matches!(next(&mut client).await, ClientEvent::Connected { .. }));

    match next(&mut client).await {
        ClientEvent::Message { msg_id, .. } => assert_eq!(msg_id, "m2"),
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(client.messages().len(), 1);
    assert!(client.is_connected());

    let _ws = server.await.unwrap();
}

#[tokio::test]
async fn server_error_payload_sets_last_error() {
    let (listener, config) = listen().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        push_chat(&mut ws, json!({"error": "Init error: model unavailable"})).await;
        ws
    });

    let mut client = ChatClient::new(config);
    client.connect();
    assert!(matches!(next(&mut client).await, ClientEvent::Connected { .. }));
    assert_eq!(
        next(&mut client).await,
        ClientEvent::Error("Init error: model unavailable".into())
    );
    assert_eq!(
        client.last_error().as_deref(),
        Some("Init error: model unavailable")
    );
    assert!(client.messages().is_empty());

    let _ws = server.await.unwrap();
}

#[tokio::test]
async fn pings_are_answered() {
    let (listener, config) = listen().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        ws.send(Message::Text("2".into())).await.unwrap();
        assert_eq!(recv_text(&mut ws).await, "3");
        ws
    });

    let mut client = ChatClient::new(config);
    client.connect();
    assert!(matches!(next(&mut client).await, ClientEvent::Connected { .. }));

    let _ws = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn server_disconnect_is_final() {
    let (listener, config) = listen().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        ws.send(Message::Text("41/chat,".into())).await.unwrap();
        ws
    });

    let mut client = ChatClient::new(config);
    client.connect();
    assert!(matches!(next(&mut client).await, ClientEvent::Connected { .. }));
    assert_eq!(
        next(&mut client).await,
        ClientEvent::Disconnected {
            reason: "io server disconnect".into()
        }
    );
    assert!(!client.is_connected());
    assert!(client.send_text("anyone?", None).is_err());
    assert_eq!(
        client.last_error().as_deref(),
        Some("Not connected to server")
    );

    let _ws = server.await.unwrap();
}

#[tokio::test]
async fn refused_connection_reports_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = ClientConfig::new(&format!("http://127.0.0.1:{port}/chat"))
        .unwrap()
        .with_reconnect(ReconnectConfig::disabled());
    let mut client = ChatClient::new(config);
    client.connect();

    assert_eq!(
        next(&mut client).await,
        ClientEvent::Error("Failed to connect to server".into())
    );
    assert!(!client.is_connected());
    assert_eq!(
        client.last_error().as_deref(),
        Some("Failed to connect to server")
    );
}

#[tokio::test]
async fn reconnects_after_connection_loss() {
    let (listener, config) = listen().await;
    // A cap of one retry still allows every reconnect, since a successful
    // connection resets the attempt counter.
    let config = config.with_reconnect(ReconnectConfig {
        enabled: true,
        attempts: Some(1),
        delay: Duration::from_millis(20),
        delay_max: Duration::from_millis(50),
        randomization_factor: 0.0,
    });
    let server = tokio::spawn(async move {
        for _ in 0..2 {
            let ws = accept(&listener).await;
            drop(ws);
        }
        accept(&listener).await
    });

    let mut client = ChatClient::new(config);
    client.connect();

    for _ in 0..2 {
        assert_eq!(
            next(&mut client).await,
            ClientEvent::Connected {
                transport: TransportKind::Websocket
            }
        );
        assert!(matches!(
            next(&mut client).await,
            ClientEvent::Disconnected { .. }
        ));
    }
    assert_eq!(
        next(&mut client).await,
        ClientEvent::Connected {
            transport: TransportKind::Websocket
        }
    );
    assert!(client.is_connected());
    assert_eq!(client.last_error(), None);

    let _ws = server.await.unwrap();
    client.disconnect().await;
}

#[tokio::test]
async fn missing_pings_end_the_session() {
    const QUICK_OPEN: &str =
        r#"0{"sid":"quiet","upgrades":[],"pingInterval":100,"pingTimeout":100}"#;
    let (listener, config) = listen().await;
    let server = tokio::spawn(async move {
        let ws = accept_with(&listener, QUICK_OPEN).await;
        // Hold the socket open without ever pinging.
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(ws);
    });

    let mut client = ChatClient::new(config);
    client.connect();
    assert!(matches!(next(&mut client).await, ClientEvent::Connected { .. }));
    assert_eq!(
        next(&mut client).await,
        ClientEvent::Disconnected {
            reason: "ping timeout".into()
        }
    );
    assert_eq!(client.status().state, ConnectionState::Disconnected);
    assert_eq!(
        client.last_error().as_deref(),
        Some("Connection to server lost")
    );

    server.abort();
}
