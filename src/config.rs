//! Configuration for the scriptlauncher CLI
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use serde_json::{Map, Value};

use crate::launcher::{FlowMessage, LauncherConfig, DEFAULT_SHUTDOWN_TIME};
use crate::target::{ServerTarget, DEFAULT_HOST, DEFAULT_PORT};

/// Send one command to a ScriptLauncher server and print the reply
#[derive(Parser, Debug, Clone)]
#[command(name = "scriptlauncher")]
#[command(about = "Send a single command to a ScriptLauncher server")]
pub struct Args {
    /// ScriptLauncher host
    #[arg(long, env = "SCRIPTLAUNCHER_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// ScriptLauncher port
    #[arg(long, env = "SCRIPTLAUNCHER_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Shared password (required)
    #[arg(long, env = "SCRIPTLAUNCHER_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Command to send
    #[arg(long, env = "SCRIPTLAUNCHER_COMMAND", default_value = "status")]
    pub command: String,

    /// Delay in seconds sent with the `shutdown` command
    #[arg(long, env = "SCRIPTLAUNCHER_SHUTDOWN_TIME", default_value_t = DEFAULT_SHUTDOWN_TIME)]
    pub shutdown_time: u64,

    /// Extra command parameter as key=value (value parsed as JSON when possible)
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, Value)>,

    /// Connection timeout in milliseconds
    #[arg(long, env = "SCRIPTLAUNCHER_CONNECT_TIMEOUT_MS", default_value = "10000")]
    pub connect_timeout_ms: u64,

    /// Response timeout in milliseconds
    #[arg(long, env = "SCRIPTLAUNCHER_RESPONSE_TIMEOUT_MS", default_value = "30000")]
    pub response_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.password.as_deref().map_or(true, str::is_empty) {
            return Err(
                "Password not configured (use --password or SCRIPTLAUNCHER_PASSWORD)".into(),
            );
        }
        if self.port == 0 {
            return Err("Port must be between 1 and 65535".into());
        }
        if self.connect_timeout_ms == 0 || self.response_timeout_ms == 0 {
            return Err("Timeouts must be greater than zero".into());
        }
        if self.command.trim().is_empty() {
            return Err("Command must not be empty".into());
        }
        Ok(())
    }

    pub fn server_target(&self) -> ServerTarget {
        ServerTarget::from_parts(
            Some(&self.host),
            Some(self.port),
            self.password.clone().unwrap_or_default(),
        )
    }

    pub fn launcher_config(&self) -> LauncherConfig {
        LauncherConfig {
            server: Some(self.server_target()),
            command: self.command.clone(),
            shutdown_time: self.shutdown_time,
            connect_timeout_ms: self.connect_timeout_ms,
            response_timeout_ms: self.response_timeout_ms,
        }
    }

    /// Message the CLI feeds into the launcher
    pub fn message(&self) -> FlowMessage {
        let mut msg = FlowMessage::command(self.command.clone());
        if !self.params.is_empty() {
            let parameters: Map<String, Value> = self.params.iter().cloned().collect();
            msg.parameters = Some(parameters);
        }
        msg
    }
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("invalid parameter '{raw}', expected KEY=VALUE"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("invalid parameter '{raw}', empty key"));
    }
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
