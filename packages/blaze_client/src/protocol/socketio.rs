//! Socket.IO (protocol v5) packets, carried inside Engine.IO message packets.
//!
//! Wire format: `<type>[<namespace>,][<ack id>][<json data>]`. The default
//! namespace `/` is left out.

use serde_json::Value;

use crate::error::ProtocolError;

pub const DEFAULT_NAMESPACE: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
}

impl PacketType {
    fn from_char(c: char) -> Result<Self, ProtocolError> {
        match c {
            '0' => Ok(Self::Connect),
            '1' => Ok(Self::Disconnect),
            '2' => Ok(Self::Event),
            '3' => Ok(Self::Ack),
            '4' => Ok(Self::ConnectError),
            '5' | '6' => Err(ProtocolError::BinaryUnsupported),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }

    fn as_char(self) -> char {
        match self {
            Self::Connect => '0',
            Self::Disconnect => '1',
            Self::Event => '2',
            Self::Ack => '3',
            Self::ConnectError => '4',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub namespace: String,
    pub id: Option<u64>,
    pub data: Option<Value>,
}

impl Packet {
    /// Namespace connect request, optionally with an auth payload.
    pub fn connect(namespace: &str, auth: Option<Value>) -> Self {
        Self {
            packet_type: PacketType::Connect,
            namespace: namespace.to_string(),
            id: None,
            data: auth,
        }
    }

    pub fn disconnect(namespace: &str) -> Self {
        Self {
            packet_type: PacketType::Disconnect,
            namespace: namespace.to_string(),
            id: None,
            data: None,
        }
    }

    /// Event packet: data is `[name, payload]`.
    pub fn event(namespace: &str, name: &str, payload: Value) -> Self {
        Self {
            packet_type: PacketType::Event,
            namespace: namespace.to_string(),
            id: None,
            data: Some(Value::Array(vec![Value::String(name.to_string()), payload])),
        }
    }

    /// Name and first argument of an event packet.
    pub fn event_parts(&self) -> Option<(&str, &Value)> {
        if self.packet_type != PacketType::Event {
            return None;
        }
        let args = self.data.as_ref()?.as_array()?;
        let name = args.first()?.as_str()?;
        Some((name, args.get(1).unwrap_or(&Value::Null)))
    }

    /// Human-readable reason carried by a connect error.
    pub fn error_message(&self) -> Option<String> {
        if self.packet_type != PacketType::ConnectError {
            return None;
        }
        match self.data.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| Some(Value::Object(map.clone()).to_string())),
            other => Some(other.to_string()),
        }
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.packet_type.as_char());
        if self.namespace != DEFAULT_NAMESPACE && !self.namespace.is_empty() {
            out.push_str(&self.namespace);
            out.push(',');
        }
        if let Some(id) = self.id {
            out.push_str(&id.to_string());
        }
        if let Some(data) = &self.data {
            out.push_str(&data.to_string());
        }
        out
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let mut chars = text.chars();
        let packet_type = PacketType::from_char(chars.next().ok_or(ProtocolError::Empty)?)?;
        let mut rest = chars.as_str();

        let namespace = if rest.starts_with('/') {
            match rest.find(',') {
                Some(end) => {
                    let ns = &rest[..end];
                    rest = &rest[end + 1..];
                    ns.to_string()
                }
                None => {
                    let ns = rest.to_string();
                    rest = "";
                    ns
                }
            }
        } else {
            DEFAULT_NAMESPACE.to_string()
        };

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let id = if digits > 0 {
            let id = rest[..digits]
                .parse()
                .map_err(|_| ProtocolError::Malformed(format!("bad ack id in {text:?}")))?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let data = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest)?)
        };

        if packet_type == PacketType::Event
            && !matches!(&data, Some(Value::Array(args)) if args.first().is_some_and(Value::is_string))
        {
            return Err(ProtocolError::Malformed(
                "event data must be an array starting with the event name".to_string(),
            ));
        }

        Ok(Self {
            packet_type,
            namespace,
            id,
            data,
        })
    }
}
