//! Wire protocol: Socket.IO packets inside Engine.IO packets.

pub mod engineio;
pub mod socketio;

use serde::Serialize;

use crate::error::ProtocolError;
use crate::types::InboundPayload;

/// Event name used in both directions.
pub const CHAT_EVENT: &str = "chat";

/// Encode a `"chat"` event for `namespace` as a complete Engine.IO frame.
pub fn encode_chat_frame<T: Serialize>(namespace: &str, payload: &T) -> Result<String, ProtocolError> {
    let value = serde_json::to_value(payload)?;
    Ok(wrap(&socketio::Packet::event(namespace, CHAT_EVENT, value)))
}

/// Wrap a Socket.IO packet in an Engine.IO message packet.
pub fn wrap(packet: &socketio::Packet) -> String {
    engineio::Packet::Message(packet.encode()).encode()
}

/// Decode the payload of an inbound `"chat"` event.
pub fn decode_chat_payload(packet: &socketio::Packet) -> Option<Result<InboundPayload, ProtocolError>> {
    let (name, payload) = packet.event_parts()?;
    if name != CHAT_EVENT {
        return None;
    }
    Some(InboundPayload::from_value(payload.clone()).map_err(ProtocolError::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ChatSession;
    use serde_json::json;

    #[test]
    fn chat_frame_layout() {
        let session = ChatSession::with_ids("s", "c");
        let input = session.compose_text("hi", None);
        let frame = encode_chat_frame("/chat", &input).unwrap();

        assert!(frame.starts_with(r#"42/chat,["chat",{"#));
        let engineio::Packet::Message(inner) = engineio::Packet::decode(&frame).unwrap() else {
            panic!("expected message packet");
        };
        let packet = socketio::Packet::decode(&inner).unwrap();
        let (name, payload) = packet.event_parts().unwrap();
        assert_eq!(name, "chat");
        assert_eq!(payload["msg_id"], input.msg_id.as_str());
    }

    #[test]
    fn other_events_are_skipped() {
        let packet = socketio::Packet::event("/chat", "typing", json!({}));
        assert!(decode_chat_payload(&packet).is_none());
        assert!(decode_chat_payload(&socketio::Packet::disconnect("/chat")).is_none());
    }

    #[test]
    fn chat_payload_decoding() {
        let packet = socketio::Packet::event("/chat", "chat", json!({"error": "boom"}));
        assert_eq!(
            decode_chat_payload(&packet).unwrap().unwrap(),
            InboundPayload::ServerError("boom".into())
        );

        let packet = socketio::Packet::event("/chat", "chat", json!({"msg_id": 3}));
        assert!(decode_chat_payload(&packet).unwrap().is_err());
    }
}
