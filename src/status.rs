//! Status side-channel
//!
//! Each session publishes its transitions as `StatusUpdate`s. Hosts render
//! them with the fill/shape/text triple from `SessionStatus::indicator`.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Status channel capacity per launcher
pub const STATUS_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Connecting,
    Connected,
    CommandSent,
    /// The server answered on `error_result`
    CommandError,
    /// Transport failure after the connection was established
    Error,
    /// Transport failure before the connection was established
    ConnectionFailed,
    ConnectionTimeout,
    ResponseTimeout,
    NotConfigured,
    Idle,
}

/// The canonical state a status maps onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CanonicalState {
    Connecting,
    Connected,
    CommandSent,
    Error,
    Timeout,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Fill {
    Red,
    Green,
    Yellow,
    Blue,
    Grey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Ring,
    Dot,
    Square,
}

/// Visual status triple. `Idle` clears it (no fill, no shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusIndicator {
    pub fill: Option<Fill>,
    pub shape: Option<Shape>,
    pub text: &'static str,
}

impl SessionStatus {
    pub fn canonical(self) -> CanonicalState {
        match self {
            SessionStatus::Connecting => CanonicalState::Connecting,
            SessionStatus::Connected => CanonicalState::Connected,
            SessionStatus::CommandSent => CanonicalState::CommandSent,
            SessionStatus::CommandError
            | SessionStatus::Error
            | SessionStatus::ConnectionFailed
            | SessionStatus::NotConfigured => CanonicalState::Error,
            SessionStatus::ConnectionTimeout | SessionStatus::ResponseTimeout => {
                CanonicalState::Timeout
            }
            SessionStatus::Idle => CanonicalState::Idle,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
            SessionStatus::CommandSent => "command sent",
            SessionStatus::CommandError => "command error",
            SessionStatus::Error => "error",
            SessionStatus::ConnectionFailed => "connection failed",
            SessionStatus::ConnectionTimeout => "connection timeout",
            SessionStatus::ResponseTimeout => "disconnect",
            SessionStatus::NotConfigured => "not configured",
            SessionStatus::Idle => "",
        }
    }

    pub fn indicator(self) -> StatusIndicator {
        let (fill, shape) = match self {
            SessionStatus::Connecting => (Some(Fill::Yellow), Some(Shape::Ring)),
            SessionStatus::Connected => (Some(Fill::Green), Some(Shape::Dot)),
            SessionStatus::CommandSent => (Some(Fill::Blue), Some(Shape::Ring)),
            SessionStatus::ResponseTimeout => (Some(Fill::Grey), Some(Shape::Square)),
            SessionStatus::Idle => (None, None),
            _ => (Some(Fill::Red), Some(Shape::Ring)),
        };
        StatusIndicator {
            fill,
            shape,
            text: self.text(),
        }
    }

    /// Whether this status ends a session
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            SessionStatus::Connecting | SessionStatus::Connected | SessionStatus::Idle
        )
    }
}

/// One published transition. Launcher-wide updates (such as `Idle` on close)
/// carry no session id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusUpdate {
    pub session_id: Option<Uuid>,
    pub status: SessionStatus,
}

/// Sender half shared by a launcher and its sessions
pub type StatusSender = broadcast::Sender<StatusUpdate>;

pub fn status_channel() -> (StatusSender, broadcast::Receiver<StatusUpdate>) {
    broadcast::channel(STATUS_CHANNEL_CAPACITY)
}
