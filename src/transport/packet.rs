//! Socket.IO v4 text packet codec
//!
//! Every WebSocket text frame is one Engine.IO packet. Engine.IO `message`
//! packets carry a Socket.IO packet:
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,..}   engine open
//! 2 / 3                                   engine ping / pong
//! 40                                      socket connect (client)
//! 40{"sid":".."}                          socket connect ack (server)
//! 42["status_result",{"ok":true}]         socket event
//! 44{"message":"Not authorized"}          socket connect error
//! 41                                      socket disconnect
//! ```

use serde_json::Value;

use super::TransportError;

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Value),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, args: Vec<Value> },
    Ack { id: u64, args: Vec<Value> },
    ConnectError(Value),
    /// Any packet addressed to a namespace other than `/`
    Foreign { namespace: String },
}

impl SocketPacket {
    /// Payload handed to an event listener: the first argument, null if
    /// there is none. Further arguments are dropped.
    pub fn event_payload(args: Vec<Value>) -> Value {
        args.into_iter().next().unwrap_or(Value::Null)
    }
}

/// Encode a packet the client sends. Server-only packets are refused.
pub fn encode(packet: &EnginePacket) -> Result<String, TransportError> {
    let text = match packet {
        EnginePacket::Close => "1".to_string(),
        EnginePacket::Ping(data) => format!("2{data}"),
        EnginePacket::Pong(data) => format!("3{data}"),
        EnginePacket::Noop => "6".to_string(),
        EnginePacket::Message(socket) => format!("4{}", encode_socket(socket)?),
        EnginePacket::Open(_) | EnginePacket::Upgrade => return Err(server_only(packet)),
    };
    Ok(text)
}

fn server_only(packet: &impl std::fmt::Debug) -> TransportError {
    TransportError::Protocol(format!("{packet:?} is not sent by a client"))
}

fn encode_socket(packet: &SocketPacket) -> Result<String, TransportError> {
    let text = match packet {
        SocketPacket::Connect(None) => "0".to_string(),
        SocketPacket::Connect(Some(auth)) => format!("0{}", serde_json::to_string(auth)?),
        SocketPacket::Disconnect => "1".to_string(),
        SocketPacket::Event { name, args } => {
            let mut items = Vec::with_capacity(args.len() + 1);
            items.push(Value::String(name.clone()));
            items.extend(args.iter().cloned());
            format!("2{}", serde_json::to_string(&items)?)
        }
        SocketPacket::Ack { .. }
        | SocketPacket::ConnectError(_)
        | SocketPacket::Foreign { .. } => return Err(server_only(packet)),
    };
    Ok(text)
}

pub fn decode(text: &str) -> Result<EnginePacket, TransportError> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| TransportError::Protocol("empty packet".into()))?;
    let rest = chars.as_str();

    match kind {
        '0' => Ok(EnginePacket::Open(serde_json::from_str(rest)?)),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping(rest.to_string())),
        '3' => Ok(EnginePacket::Pong(rest.to_string())),
        '4' => Ok(EnginePacket::Message(decode_socket(rest)?)),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(TransportError::Protocol(format!(
            "unknown engine packet type '{other}'"
        ))),
    }
}

fn decode_socket(text: &str) -> Result<SocketPacket, TransportError> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| TransportError::Protocol("empty socket packet".into()))?;
    let (namespace, body) = split_namespace(chars.as_str());
    if !matches!(namespace, "" | "/") {
        return Ok(SocketPacket::Foreign {
            namespace: namespace.to_string(),
        });
    }

    match kind {
        '0' => {
            if body.is_empty() {
                Ok(SocketPacket::Connect(None))
            } else {
                Ok(SocketPacket::Connect(Some(serde_json::from_str(body)?)))
            }
        }
        '1' => Ok(SocketPacket::Disconnect),
        '2' => {
            let (_, json) = split_ack_id(body);
            let mut items = parse_array(json)?;
            if items.is_empty() {
                return Err(TransportError::Protocol("event without a name".into()));
            }
            let name = match items.remove(0) {
                Value::String(name) => name,
                other => {
                    return Err(TransportError::Protocol(format!(
                        "event name is not a string: {other}"
                    )))
                }
            };
            Ok(SocketPacket::Event { name, args: items })
        }
        '3' => {
            let (id, json) = split_ack_id(body);
            let id = id.ok_or_else(|| TransportError::Protocol("ack without id".into()))?;
            Ok(SocketPacket::Ack {
                id,
                args: parse_array(json)?,
            })
        }
        '4' => {
            let data = if body.is_empty() {
                Value::Null
            } else {
                serde_json::from_str(body)?
            };
            Ok(SocketPacket::ConnectError(data))
        }
        '5' | '6' => Err(TransportError::Protocol(
            "binary packets are not supported".into(),
        )),
        other => Err(TransportError::Protocol(format!(
            "unknown socket packet type '{other}'"
        ))),
    }
}

/// Split a `/namespace,` prefix off the packet body. No prefix means the
/// default namespace and yields an empty namespace.
fn split_namespace(body: &str) -> (&str, &str) {
    if !body.starts_with('/') {
        return ("", body);
    }
    match body.find(',') {
        Some(idx) => (&body[..idx], &body[idx + 1..]),
        None => (body, ""),
    }
}

fn split_ack_id(body: &str) -> (Option<u64>, &str) {
    let digits = body.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return (None, body);
    }
    (body[..digits].parse().ok(), &body[digits..])
}

fn parse_array(json: &str) -> Result<Vec<Value>, TransportError> {
    match serde_json::from_str(json)? {
        Value::Array(items) => Ok(items),
        other => Err(TransportError::Protocol(format!(
            "expected JSON array, got {other}"
        ))),
    }
}
