//! Command requests and responses

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Command that carries the extra `time` field
pub const SHUTDOWN_COMMAND: &str = "shutdown";

/// Outbound event every command is emitted on
pub const COMMAND_EVENT: &str = "command";

/// Shared inbound channel for server-reported failures
pub const ERROR_EVENT: &str = "error_result";

/// One command to send to the server. Consumed by a single session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,

    /// Passed through into the outbound payload
    #[serde(default)]
    pub parameters: Map<String, Value>,

    /// Delay in seconds, only sent with `shutdown`
    #[serde(default, rename = "shutdownTime")]
    pub shutdown_time: Option<u64>,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            parameters: Map::new(),
            shutdown_time: None,
        }
    }

    pub fn with_shutdown_time(mut self, seconds: u64) -> Self {
        self.shutdown_time = Some(seconds);
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn is_shutdown(&self) -> bool {
        self.command == SHUTDOWN_COMMAND
    }

    /// Name of the event the server answers this command on.
    pub fn result_event(&self) -> String {
        format!("{}_result", self.command)
    }

    /// Payload of the outbound `command` event.
    ///
    /// Parameters go in first; `command`, `password` and `time` always win.
    pub fn outbound_payload(&self, password: &str) -> Value {
        let mut payload = self.parameters.clone();
        payload.remove("time");
        payload.insert("command".into(), Value::String(self.command.clone()));
        payload.insert("password".into(), Value::String(password.to_string()));

        if self.is_shutdown() {
            if let Some(time) = self.shutdown_time {
                payload.insert("time".into(), Value::from(time));
            }
        }

        Value::Object(payload)
    }
}

/// Successful reply, tagged with the session that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResponse {
    pub session_id: Uuid,
    pub command: String,
    /// Raw payload of the `<command>_result` event
    pub payload: Value,
}
