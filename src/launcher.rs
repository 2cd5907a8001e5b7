//! ScriptLauncher node
//!
//! Host-facing wrapper around `CommandSession`. Holds the per-instance
//! defaults, resolves per-message overrides, runs each message on its own
//! session and owns the registry used to abandon pending sessions on close.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info};

use crate::error::{Result, SessionError};
use crate::registry::SessionRegistry;
use crate::request::CommandRequest;
use crate::session::{CommandSession, Timeouts, CONNECTION_TIMEOUT, RESPONSE_TIMEOUT};
use crate::status::{status_channel, SessionStatus, StatusSender, StatusUpdate};
use crate::target::ServerTarget;
use crate::transport::{SocketIoTransport, Transport};

/// Default delay sent with `shutdown`, in seconds
pub const DEFAULT_SHUTDOWN_TIME: u64 = 1;

/// Per-instance node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LauncherConfig {
    /// Server to talk to. `None` means the node is not configured.
    #[serde(default)]
    pub server: Option<ServerTarget>,

    /// Command used when a message does not name one
    #[serde(default)]
    pub command: String,

    /// Shutdown delay used when a message does not set one
    #[serde(default = "default_shutdown_time")]
    pub shutdown_time: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

fn default_shutdown_time() -> u64 {
    DEFAULT_SHUTDOWN_TIME
}

fn default_connect_timeout_ms() -> u64 {
    millis(CONNECTION_TIMEOUT)
}

fn default_response_timeout_ms() -> u64 {
    millis(RESPONSE_TIMEOUT)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            server: None,
            command: String::new(),
            shutdown_time: DEFAULT_SHUTDOWN_TIME,
            connect_timeout_ms: default_connect_timeout_ms(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

impl LauncherConfig {
    pub fn new(server: ServerTarget) -> Self {
        Self {
            server: Some(server),
            ..Default::default()
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts::from_millis(self.connect_timeout_ms, self.response_timeout_ms)
    }

    /// Configured shutdown delay; zero falls back to the default
    pub fn effective_shutdown_time(&self) -> u64 {
        if self.shutdown_time > 0 {
            self.shutdown_time
        } else {
            DEFAULT_SHUTDOWN_TIME
        }
    }
}

/// Message flowing through the host. Fields other than the ones below are
/// carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(
        default,
        rename = "shutdownTime",
        skip_serializing_if = "Option::is_none"
    )]
    pub shutdown_time: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FlowMessage {
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Default::default()
        }
    }

    /// Whether the payload is a forwarded server error
    pub fn is_error(&self) -> bool {
        self.payload
            .as_ref()
            .and_then(|p| p.as_object())
            .is_some_and(|p| p.contains_key("error"))
    }
}

/// The node: defaults, transport, status channel and live sessions.
pub struct ScriptLauncher {
    config: LauncherConfig,
    transport: Arc<dyn Transport>,
    registry: SessionRegistry,
    status: StatusSender,
}

impl ScriptLauncher {
    /// Node using the Socket.IO transport
    pub fn new(config: LauncherConfig) -> Self {
        Self::with_transport(config, Arc::new(SocketIoTransport::new()))
    }

    pub fn with_transport(config: LauncherConfig, transport: Arc<dyn Transport>) -> Self {
        let (status, _) = status_channel();
        Self {
            config,
            transport,
            registry: SessionRegistry::new(),
            status,
        }
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusUpdate> {
        self.status.subscribe()
    }

    /// Resolve the request for a message against the node defaults.
    pub fn build_request(&self, msg: &FlowMessage) -> Result<CommandRequest> {
        let command = msg
            .command
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.config.command);
        if command.is_empty() {
            return Err(SessionError::Configuration("no command configured".into()));
        }

        let shutdown_time = msg
            .shutdown_time
            .filter(|t| *t > 0)
            .unwrap_or_else(|| self.config.effective_shutdown_time());

        let mut request = CommandRequest::new(command).with_shutdown_time(shutdown_time);
        if let Some(parameters) = &msg.parameters {
            request.parameters = parameters.clone();
        }
        Ok(request)
    }

    /// Handle one message. The reply payload is stored in `msg.payload`.
    ///
    /// Server error replies are forwarded as `{"error": <detail>}` payloads;
    /// every other failure is returned as `Err`.
    pub async fn execute(&self, mut msg: FlowMessage) -> Result<FlowMessage> {
        let Some(server) = self.config.server.clone() else {
            self.publish(SessionStatus::NotConfigured);
            error!("ScriptLauncher server not configured");
            return Err(SessionError::Configuration(
                "script launcher server not configured".into(),
            ));
        };

        let request = match self.build_request(&msg) {
            Ok(request) => request,
            Err(e) => {
                self.publish(SessionStatus::NotConfigured);
                error!("{}", e);
                return Err(e);
            }
        };

        let session = CommandSession::new(server, request, self.transport.clone(), &self.registry)
            .with_timeouts(self.config.timeouts())
            .with_status(self.status.clone());
        debug!(
            session_id = %session.id(),
            command = %session.request().command,
            "Dispatching command"
        );

        // The session owns its cleanup even if this future is dropped
        let (tx, rx) = oneshot::channel();
        tokio::spawn(session.run(tx));

        match rx.await {
            Ok(Ok(response)) => {
                msg.payload = Some(response.payload);
                Ok(msg)
            }
            Ok(Err(SessionError::Remote { detail, .. })) => {
                msg.payload = Some(json!({ "error": detail }));
                Ok(msg)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SessionError::Abandoned),
        }
    }

    /// Tear the node down: abandon every pending session and clear the
    /// status.
    pub fn close(&self) {
        let abandoned = self.registry.shutdown_all();
        info!(abandoned, "ScriptLauncher closed");
        self.publish(SessionStatus::Idle);
    }

    fn publish(&self, status: SessionStatus) {
        let _ = self.status.send(StatusUpdate {
            session_id: None,
            status,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launcher(command: &str, shutdown_time: u64) -> ScriptLauncher {
        let config = LauncherConfig {
            command: command.into(),
            shutdown_time,
            ..LauncherConfig::new(ServerTarget::new("pw"))
        };
        ScriptLauncher::new(config)
    }

    #[test]
    fn test_message_overrides_defaults() {
        let node = launcher("status", 1);
        let msg = FlowMessage {
            command: Some("shutdown".into()),
            shutdown_time: Some(30),
            ..Default::default()
        };
        let request = node.build_request(&msg).unwrap();
        assert_eq!(request.command, "shutdown");
        assert_eq!(request.shutdown_time, Some(30));
    }

    #[test]
    fn test_defaults_apply_for_empty_overrides() {
        let node = launcher("shutdown", 0);
        let msg = FlowMessage {
            command: Some(String::new()),
            shutdown_time: Some(0),
            ..Default::default()
        };
        let request = node.build_request(&msg).unwrap();
        assert_eq!(request.command, "shutdown");
        assert_eq!(request.shutdown_time, Some(DEFAULT_SHUTDOWN_TIME));
    }

    #[test]
    fn test_missing_command_is_configuration_error() {
        let node = launcher("", 1);
        let err = node.build_request(&FlowMessage::default()).unwrap_err();
        assert!(matches!(err, SessionError::Configuration(_)));
    }

    #[test]
    fn test_parameters_pass_through() {
        let node = launcher("run", 1);
        let mut parameters = Map::new();
        parameters.insert("script".into(), json!("backup.sh"));
        let msg = FlowMessage {
            parameters: Some(parameters),
            ..Default::default()
        };
        let request = node.build_request(&msg).unwrap();
        assert_eq!(request.parameters["script"], "backup.sh");
    }

    #[test]
    fn test_flow_message_keeps_unknown_fields() {
        let msg: FlowMessage =
            serde_json::from_str(r#"{"command":"status","topic":"lab","_msgid":"a1"}"#).unwrap();
        assert_eq!(msg.command.as_deref(), Some("status"));
        assert_eq!(msg.extra["topic"], "lab");

        let out = serde_json::to_value(&msg).unwrap();
        assert_eq!(out["_msgid"], "a1");
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: LauncherConfig = serde_json::from_str(
            r#"{"server": {"host": "10.0.0.9", "password": "pw"}, "command": "status"}"#,
        )
        .unwrap();
        assert_eq!(config.server.as_ref().unwrap().address(), "10.0.0.9:8810");
        assert_eq!(config.shutdown_time, 1);
        assert_eq!(config.timeouts(), Timeouts::default());
    }

    #[test]
    fn test_config_fields_are_camel_case() {
        let config: LauncherConfig = serde_json::from_str(
            r#"{"command": "status", "shutdownTime": 5, "connectTimeoutMs": 2500, "responseTimeoutMs": 9000}"#,
        )
        .unwrap();
        assert_eq!(config.shutdown_time, 5);
        assert_eq!(config.timeouts(), Timeouts::from_millis(2_500, 9_000));

        let out = serde_json::to_value(&config).unwrap();
        assert_eq!(out["connectTimeoutMs"], 2500);
        assert_eq!(out["responseTimeoutMs"], 9000);
        assert!(out.get("connect_timeout_ms").is_none());
    }

    #[test]
    fn test_default_timeouts_in_millis() {
        let config = LauncherConfig::default();
        assert_eq!(config.connect_timeout_ms, 10_000);
        assert_eq!(config.response_timeout_ms, 30_000);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_is_error_payload() {
        let mut msg = FlowMessage::default();
        assert!(!msg.is_error());
        msg.payload = Some(json!({"error": {"message": "busy"}}));
        assert!(msg.is_error());
        msg.payload = Some(json!({"ok": true}));
        assert!(!msg.is_error());
    }
}
