//! Server target configuration

use serde::{Deserialize, Serialize};
use std::fmt;

/// Host used when the target leaves it unset
pub const DEFAULT_HOST: &str = "localhost";

/// ScriptLauncher's well-known port
pub const DEFAULT_PORT: u16 = 8810;

/// Socket.IO endpoint path on the ScriptLauncher server
pub const SOCKET_IO_PATH: &str = "/socket.io/";

/// Address and shared secret of a ScriptLauncher server.
///
/// Immutable once built. Sessions clone it for their own lifetime.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTarget {
    #[serde(default = "default_host")]
    host: String,

    #[serde(default = "default_port")]
    port: u16,

    /// Shared password sent with every command
    #[serde(default, rename = "password")]
    shared_secret: String,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl ServerTarget {
    /// Target on `localhost:8810` with the given shared secret.
    pub fn new(shared_secret: impl Into<String>) -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            shared_secret: shared_secret.into(),
        }
    }

    /// Build from optional host configuration. Empty hosts and port 0 count
    /// as unset.
    pub fn from_parts(
        host: Option<&str>,
        port: Option<u16>,
        shared_secret: impl Into<String>,
    ) -> Self {
        let mut target = Self::new(shared_secret);
        if let Some(host) = host.map(str::trim).filter(|h| !h.is_empty()) {
            target.host = host.to_string();
        }
        if let Some(port) = port.filter(|p| *p != 0) {
            target.port = port;
        }
        target
    }

    /// Set the host. Empty strings keep the default.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        let host = host.into();
        if !host.trim().is_empty() {
            self.host = host.trim().to_string();
        }
        self
    }

    /// Set the port. Zero keeps the default.
    pub fn with_port(mut self, port: u16) -> Self {
        if port != 0 {
            self.port = port;
        }
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn shared_secret(&self) -> &str {
        &self.shared_secret
    }

    pub fn has_credential(&self) -> bool {
        !self.shared_secret.is_empty()
    }

    /// `host:port`, as used in log and error messages
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// WebSocket URL of the Socket.IO endpoint (Engine.IO v4).
    pub fn socket_url(&self) -> String {
        format!(
            "ws://{}:{}{}?EIO=4&transport=websocket",
            self.host, self.port, SOCKET_IO_PATH
        )
    }
}

impl fmt::Debug for ServerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("shared_secret", &"<redacted>")
            .finish()
    }
}
