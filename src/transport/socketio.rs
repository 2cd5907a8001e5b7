//! Socket.IO client transport over tokio-tungstenite
//!
//! Connects straight to the WebSocket transport (no HTTP long-polling
//! upgrade), completes the Engine.IO open and Socket.IO namespace handshake,
//! and then exchanges events on the default namespace.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use super::packet::{self, EnginePacket, SocketPacket};
use super::{Connection, InboundEvent, Transport, TransportError};
use crate::error::remote_message;
use crate::target::ServerTarget;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production transport: one WebSocket per connect call, no reconnection.
#[derive(Debug, Clone, Default)]
pub struct SocketIoTransport;

impl SocketIoTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for SocketIoTransport {
    async fn connect(&self, target: &ServerTarget) -> Result<Box<dyn Connection>, TransportError> {
        let url = target.socket_url();
        debug!(url = %url, "Opening Socket.IO connection");

        let (ws, _) = connect_async(url.as_str()).await?;
        let mut connection = SocketIoConnection {
            ws: Some(ws),
            sid: None,
        };

        if let Err(e) = connection.handshake().await {
            connection.close().await;
            return Err(e);
        }

        debug!(
            address = %target.address(),
            sid = connection.sid.as_deref().unwrap_or("-"),
            "Socket.IO namespace connected"
        );
        Ok(Box::new(connection))
    }
}

/// An established Socket.IO connection on the default namespace.
pub struct SocketIoConnection {
    ws: Option<WsStream>,
    sid: Option<String>,
}

impl SocketIoConnection {
    async fn handshake(&mut self) -> Result<(), TransportError> {
        match self.read_packet().await? {
            EnginePacket::Open(handshake) => {
                trace!(handshake = %handshake, "Engine.IO open");
            }
            other => {
                return Err(TransportError::Handshake(format!(
                    "expected open packet, got {other:?}"
                )))
            }
        }

        self.send_packet(&EnginePacket::Message(SocketPacket::Connect(None)))
            .await?;

        loop {
            match self.read_packet().await? {
                EnginePacket::Message(SocketPacket::Connect(data)) => {
                    self.sid = data
                        .as_ref()
                        .and_then(|d| d.get("sid"))
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    return Ok(());
                }
                EnginePacket::Message(SocketPacket::ConnectError(data)) => {
                    return Err(TransportError::Rejected(remote_message(&data)));
                }
                EnginePacket::Ping(data) => {
                    self.send_packet(&EnginePacket::Pong(data)).await?;
                }
                EnginePacket::Close | EnginePacket::Message(SocketPacket::Disconnect) => {
                    return Err(TransportError::Disconnected(
                        "server closed during handshake".into(),
                    ));
                }
                EnginePacket::Noop
                | EnginePacket::Pong(_)
                | EnginePacket::Message(SocketPacket::Foreign { .. }) => {}
                other => {
                    return Err(TransportError::Handshake(format!(
                        "unexpected packet before namespace connect: {other:?}"
                    )))
                }
            }
        }
    }

    async fn send_packet(&mut self, packet: &EnginePacket) -> Result<(), TransportError> {
        let text = packet::encode(packet)?;
        let ws = self.ws.as_mut().ok_or(TransportError::Closed)?;
        trace!(frame = %text, "Socket.IO send");
        ws.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn read_packet(&mut self) -> Result<EnginePacket, TransportError> {
        loop {
            let ws = self.ws.as_mut().ok_or(TransportError::Closed)?;
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    trace!(frame = %text, "Socket.IO receive");
                    return packet::decode(&text);
                }
                Some(Ok(Message::Binary(_))) => {
                    return Err(TransportError::Protocol(
                        "binary frames are not supported".into(),
                    ));
                }
                Some(Ok(Message::Ping(data))) => {
                    ws.send(Message::Pong(data)).await?;
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "transport close".to_string());
                    return Err(TransportError::Disconnected(reason));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(TransportError::Disconnected("transport close".into())),
            }
        }
    }
}

#[async_trait]
impl Connection for SocketIoConnection {
    async fn emit(&mut self, event: &str, payload: Value) -> Result<(), TransportError> {
        self.send_packet(&EnginePacket::Message(SocketPacket::Event {
            name: event.to_string(),
            args: vec![payload],
        }))
        .await
    }

    async fn next_event(&mut self) -> Result<InboundEvent, TransportError> {
        loop {
            match self.read_packet().await? {
                EnginePacket::Message(SocketPacket::Event { name, args }) => {
                    return Ok(InboundEvent::new(name, SocketPacket::event_payload(args)));
                }
                EnginePacket::Ping(data) => {
                    self.send_packet(&EnginePacket::Pong(data)).await?;
                }
                EnginePacket::Message(SocketPacket::Disconnect) => {
                    return Err(TransportError::Disconnected("io server disconnect".into()));
                }
                EnginePacket::Close => {
                    return Err(TransportError::Disconnected("transport close".into()));
                }
                EnginePacket::Message(SocketPacket::ConnectError(data)) => {
                    return Err(TransportError::Rejected(remote_message(&data)));
                }
                other => {
                    trace!(packet = ?other, "Ignoring control packet");
                }
            }
        }
    }

    async fn close(&mut self) {
        let Some(mut ws) = self.ws.take() else {
            return;
        };

        let disconnect = EnginePacket::Message(SocketPacket::Disconnect);
        if let Ok(text) = packet::encode(&disconnect) {
            let _ = ws.send(Message::Text(text)).await;
        }
        if let Err(e) = ws.close(None).await {
            debug!("Error closing Socket.IO connection: {}", e);
        }
    }
}
