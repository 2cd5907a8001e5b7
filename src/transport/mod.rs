//! Event transport seam
//!
//! A `Transport` opens one `Connection` per session. Connections are
//! event-based: named events with a JSON payload go out and come in. The
//! production transport speaks Socket.IO over a WebSocket; tests plug in
//! scripted transports.

pub mod packet;
pub mod socketio;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::target::ServerTarget;

pub use socketio::SocketIoTransport;

/// Connection-level failure
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Engine.IO or Socket.IO handshake did not complete
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The server refused the namespace connection (`connect_error`)
    #[error("Connection rejected: {0}")]
    Rejected(String),

    /// Malformed or unsupported packet
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server ended the connection
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// The connection was already released
    #[error("Connection closed")]
    Closed,
}

/// One named inbound event
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub name: String,
    pub payload: Value,
}

impl InboundEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// Opens connections. Exactly one attempt per call, no reconnection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Resolve once the connection is established and ready for events.
    async fn connect(&self, target: &ServerTarget) -> Result<Box<dyn Connection>, TransportError>;
}

/// An established, exclusively owned connection.
#[async_trait]
pub trait Connection: Send {
    /// Emit a named event.
    async fn emit(&mut self, event: &str, payload: Value) -> Result<(), TransportError>;

    /// Wait for the next inbound event. Heartbeats and other control traffic
    /// are handled internally. Server-side disconnects surface as
    /// `TransportError::Disconnected`.
    async fn next_event(&mut self) -> Result<InboundEvent, TransportError>;

    /// Close the connection. Pending sends are abandoned. Calling it again is
    /// a no-op.
    async fn close(&mut self);
}
