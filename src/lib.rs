//! ScriptLauncher client
//!
//! Sends one command per connection to a ScriptLauncher server over
//! Socket.IO and waits for the matching reply.
//!
//! ## Components
//!
//! - **ServerTarget**: host, port and shared password
//! - **CommandSession**: one connection, one command, two timeout budgets
//! - **SessionRegistry**: live sessions, abandoned together on shutdown
//! - **ScriptLauncher**: host node with defaults, overrides and status updates
//!
//! # Example
//!
//! ```rust,no_run
//! use scriptlauncher_client::{FlowMessage, LauncherConfig, ScriptLauncher, ServerTarget};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let launcher = ScriptLauncher::new(LauncherConfig::new(
//!     ServerTarget::new("secret").with_host("192.168.1.20"),
//! ));
//!
//! let reply = launcher.execute(FlowMessage::command("status")).await?;
//! println!("{:?}", reply.payload);
//!
//! launcher.close();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod launcher;
pub mod registry;
pub mod request;
pub mod session;
pub mod status;
pub mod target;
pub mod transport;

pub use config::Args;
pub use error::{Result, SessionError};
pub use launcher::{FlowMessage, LauncherConfig, ScriptLauncher};
pub use registry::SessionRegistry;
pub use request::{CommandRequest, CommandResponse};
pub use session::{
    CommandSession, CompletionSink, ConnectionState, Timeouts, CLOSE_TIMEOUT,
    CONNECTION_TIMEOUT, RESPONSE_TIMEOUT,
};
pub use status::{SessionStatus, StatusUpdate};
pub use target::ServerTarget;
pub use transport::{Connection, InboundEvent, SocketIoTransport, Transport, TransportError};
