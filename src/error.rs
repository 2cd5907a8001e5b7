//! Error types for command sessions

use serde_json::Value;
use thiserror::Error;

use crate::transport::TransportError;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Terminal failure of a command session.
///
/// Every variant ends the session; nothing at this layer retries.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Missing server target, credential or command. Detected before any
    /// connection attempt.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No connection within the connect budget
    #[error("Connection timeout: could not connect to {host}:{port} within {elapsed_ms} ms")]
    ConnectTimeout {
        host: String,
        port: u16,
        elapsed_ms: u64,
    },

    /// Connection-level failure, before or after the connection was established
    #[error("{} error: {source}", transport_label(.connected))]
    Transport {
        connected: bool,
        #[source]
        source: TransportError,
    },

    /// Connected and sent, but no matching reply arrived in time
    #[error("Response timeout: no response received for '{command}' command within {elapsed_ms} ms")]
    ResponseTimeout { command: String, elapsed_ms: u64 },

    /// The server answered the command on the shared error channel
    #[error("Server error: {}", remote_message(.detail))]
    Remote { command: String, detail: Value },

    /// The session was force-terminated by a registry shutdown
    #[error("Session abandoned before completion")]
    Abandoned,
}

impl SessionError {
    /// Short machine-readable kind, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Configuration(_) => "configuration",
            SessionError::ConnectTimeout { .. } => "connect_timeout",
            SessionError::Transport { .. } => "transport",
            SessionError::ResponseTimeout { .. } => "response_timeout",
            SessionError::Remote { .. } => "remote",
            SessionError::Abandoned => "abandoned",
        }
    }

    /// Whether the failure happened while a connection was established.
    pub fn after_connect(&self) -> bool {
        match self {
            SessionError::Transport { connected, .. } => *connected,
            SessionError::ResponseTimeout { .. } | SessionError::Remote { .. } => true,
            _ => false,
        }
    }
}

fn transport_label(connected: &bool) -> &'static str {
    if *connected {
        "Socket"
    } else {
        "Connection"
    }
}

/// Human-readable text of an `error_result` payload.
///
/// The server sends either `{ "message": "..." }` or a bare string.
pub fn remote_message(detail: &Value) -> String {
    match detail {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("message") {
            Some(Value::String(msg)) => msg.clone(),
            Some(other) => other.to_string(),
            None => detail.to_string(),
        },
        other => other.to_string(),
    }
}
