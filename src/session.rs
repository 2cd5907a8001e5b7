//! Command session
//!
//! A `CommandSession` owns one connection for the lifetime of one command:
//! connect, authenticate and send, wait for the matching reply, tear down.
//! Two timers bound the session (connection establishment, reply arrival)
//! and every exit path goes through the same idempotent release.
//!
//! The session is a single future. `tokio::select!` with `biased` ordering
//! serializes its reactions: the abandon signal first, then the armed timer,
//! then the connection. That ordering is the tie-break: a timer that is due
//! wins over a connect or a reply that becomes ready in the same poll.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::time::{sleep, timeout, Instant, Sleep};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::error::{remote_message, Result, SessionError};
use crate::events::{Channel, Subscriptions};
use crate::registry::{AbandonSignal, Registration, SessionRegistry};
use crate::request::{CommandRequest, CommandResponse, COMMAND_EVENT, ERROR_EVENT};
use crate::status::{SessionStatus, StatusSender, StatusUpdate};
use crate::target::ServerTarget;
use crate::transport::{Connection, Transport, TransportError};

/// Budget for establishing the connection
pub const CONNECTION_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Budget for the reply, counted from the send
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Budget for a graceful close during release
pub const CLOSE_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Receives the outcome of a session, at most once
pub type CompletionSink = oneshot::Sender<Result<CommandResponse>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub response: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: CONNECTION_TIMEOUT,
            response: RESPONSE_TIMEOUT,
        }
    }
}

impl Timeouts {
    pub fn from_millis(connect_ms: u64, response_ms: u64) -> Self {
        Self {
            connect: Duration::from_millis(connect_ms),
            response: Duration::from_millis(response_ms),
        }
    }
}

/// Lifecycle of a session. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Completed,
    Failed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Connected)
                | (Connected, Completed)
                | (Idle, Failed)
                | (Connecting, Failed)
                | (Connected, Failed)
        )
    }

    pub fn is_finished(self) -> bool {
        matches!(self, ConnectionState::Completed | ConnectionState::Failed)
    }
}

/// What woke the session up
enum Step<T> {
    Abandoned,
    TimedOut,
    Ready(T),
}

pub struct CommandSession {
    id: Uuid,
    target: ServerTarget,
    request: CommandRequest,
    state: ConnectionState,
    timeouts: Timeouts,
    transport: Arc<dyn Transport>,
    status: Option<StatusSender>,

    connect_timer: Option<Pin<Box<Sleep>>>,
    response_timer: Option<Pin<Box<Sleep>>>,
    connection_timed_out: bool,
    connection: Option<Box<dyn Connection>>,
    subscriptions: Subscriptions,

    abandon: Option<AbandonSignal>,
    registration: Option<Registration>,
    terminal_emitted: bool,
}

impl CommandSession {
    /// Create a session and register it as live.
    pub fn new(
        target: ServerTarget,
        request: CommandRequest,
        transport: Arc<dyn Transport>,
        registry: &SessionRegistry,
    ) -> Self {
        let id = Uuid::new_v4();
        let abandon = registry.register(id);

        Self {
            id,
            target,
            request,
            state: ConnectionState::Idle,
            timeouts: Timeouts::default(),
            transport,
            status: None,
            connect_timer: None,
            response_timer: None,
            connection_timed_out: false,
            connection: None,
            subscriptions: Subscriptions::new(),
            abandon,
            registration: Some(Registration::new(id, registry.clone())),
            terminal_emitted: false,
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Publish status transitions on `status`.
    pub fn with_status(mut self, status: StatusSender) -> Self {
        self.status = Some(status);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request(&self) -> &CommandRequest {
        &self.request
    }

    /// Run the session to its end and hand the outcome to `sink`.
    ///
    /// Resources are released before the sink is called. If the session is
    /// abandoned through the registry, the sink is dropped without a value,
    /// even when an outcome was already known while the session released.
    pub async fn run(mut self, sink: CompletionSink) {
        let outcome = self.drive().await;
        let abandoned = self.release().await;

        match outcome {
            Some(result) if !abandoned => {
                if sink.send(result).is_err() {
                    debug!(session_id = %self.id, "Completion receiver dropped");
                }
            }
            _ => {
                info!(
                    session_id = %self.id,
                    command = %self.request.command,
                    "Session abandoned"
                );
            }
        }
    }

    /// Run the session in place and return its outcome. Abandonment
    /// surfaces as `SessionError::Abandoned`.
    pub async fn execute(self) -> Result<CommandResponse> {
        let (tx, rx) = oneshot::channel();
        self.run(tx).await;
        rx.await.unwrap_or(Err(SessionError::Abandoned))
    }

    async fn drive(&mut self) -> Option<Result<CommandResponse>> {
        if !self.target.has_credential() {
            return Some(self.fail_configuration("missing credential"));
        }
        if self.request.command.is_empty() {
            return Some(self.fail_configuration("missing command"));
        }

        let connection = match self.connect().await? {
            Ok(connection) => connection,
            Err(e) => return Some(Err(e)),
        };

        self.connection = Some(connection);
        if !self.transition(ConnectionState::Connected) {
            return Some(Err(SessionError::Transport {
                connected: false,
                source: TransportError::Closed,
            }));
        }
        self.emit(SessionStatus::Connected);
        info!(
            session_id = %self.id,
            address = %self.target.address(),
            "Connected to ScriptLauncher"
        );

        self.exchange().await
    }

    /// Idle → Connecting → (Connected | Failed). `None` means abandoned.
    async fn connect(&mut self) -> Option<Result<Box<dyn Connection>>> {
        self.transition(ConnectionState::Connecting);
        self.emit(SessionStatus::Connecting);
        debug!(
            session_id = %self.id,
            address = %self.target.address(),
            "Connecting"
        );

        let started = Instant::now();
        self.connect_timer = Some(Box::pin(sleep(self.timeouts.connect)));

        let step = {
            let attempt = self.transport.connect(&self.target);
            tokio::select! {
                biased;
                _ = abandoned(&mut self.abandon) => Step::Abandoned,
                _ = armed(&mut self.connect_timer) => Step::TimedOut,
                result = attempt => Step::Ready(result),
            }
        };
        self.connect_timer = None;

        match step {
            Step::Abandoned => None,
            Step::TimedOut => {
                // Any connect success from here on is stale
                self.connection_timed_out = true;
                self.transition(ConnectionState::Failed);
                self.emit(SessionStatus::ConnectionTimeout);

                let elapsed_ms = elapsed_ms(started);
                error!(
                    session_id = %self.id,
                    "Connection timeout: Could not connect to {} within {} ms",
                    self.target.address(),
                    elapsed_ms
                );
                Some(Err(SessionError::ConnectTimeout {
                    host: self.target.host().to_string(),
                    port: self.target.port(),
                    elapsed_ms,
                }))
            }
            Step::Ready(Err(e)) => {
                self.transition(ConnectionState::Failed);
                self.emit(SessionStatus::ConnectionFailed);
                error!(
                    session_id = %self.id,
                    "Connection error to {}: {}",
                    self.target.address(),
                    e
                );
                Some(Err(SessionError::Transport {
                    connected: false,
                    source: e,
                }))
            }
            Step::Ready(Ok(connection)) => Some(Ok(connection)),
        }
    }

    /// Send the command and wait for its reply. Runs in state Connected.
    async fn exchange(&mut self) -> Option<Result<CommandResponse>> {
        let payload = self.request.outbound_payload(self.target.shared_secret());

        // Subscribe before sending so an immediate reply cannot slip past
        self.subscriptions
            .subscribe_once(self.request.result_event(), Channel::Result);
        self.subscriptions.subscribe_once(ERROR_EVENT, Channel::Error);

        let sent_at = Instant::now();
        self.response_timer = Some(Box::pin(sleep(self.timeouts.response)));

        let step = match self.connection.as_mut() {
            Some(connection) => tokio::select! {
                biased;
                _ = abandoned(&mut self.abandon) => Step::Abandoned,
                _ = armed(&mut self.response_timer) => Step::TimedOut,
                sent = connection.emit(COMMAND_EVENT, payload) => Step::Ready(sent),
            },
            None => Step::Ready(Err(TransportError::Closed)),
        };

        match step {
            Step::Abandoned => return None,
            Step::TimedOut => return Some(self.fail_response_timeout(sent_at)),
            Step::Ready(Err(e)) => return Some(self.fail_transport(e)),
            Step::Ready(Ok(())) => {
                debug!(
                    session_id = %self.id,
                    command = %self.request.command,
                    "Command emitted"
                );
            }
        }

        loop {
            let step = match self.connection.as_mut() {
                Some(connection) => tokio::select! {
                    biased;
                    _ = abandoned(&mut self.abandon) => Step::Abandoned,
                    _ = armed(&mut self.response_timer) => Step::TimedOut,
                    event = connection.next_event() => Step::Ready(event),
                },
                None => Step::Ready(Err(TransportError::Closed)),
            };

            let event = match step {
                Step::Abandoned => return None,
                Step::TimedOut => return Some(self.fail_response_timeout(sent_at)),
                Step::Ready(Err(e)) => return Some(self.fail_transport(e)),
                Step::Ready(Ok(event)) => event,
            };

            let name = event.name.clone();
            match self.subscriptions.dispatch(event) {
                Some((Channel::Result, payload)) => {
                    self.response_timer = None;
                    self.transition(ConnectionState::Completed);
                    self.emit(SessionStatus::CommandSent);
                    info!(
                        session_id = %self.id,
                        command = %self.request.command,
                        elapsed_ms = elapsed_ms(sent_at),
                        "Command result received"
                    );
                    return Some(Ok(CommandResponse {
                        session_id: self.id,
                        command: self.request.command.clone(),
                        payload,
                    }));
                }
                Some((Channel::Error, detail)) => {
                    self.response_timer = None;
                    self.transition(ConnectionState::Completed);
                    self.emit(SessionStatus::CommandError);
                    error!(
                        session_id = %self.id,
                        command = %self.request.command,
                        "Server error: {}",
                        remote_message(&detail)
                    );
                    return Some(Err(SessionError::Remote {
                        command: self.request.command.clone(),
                        detail,
                    }));
                }
                None => {
                    trace!(session_id = %self.id, event = %name, "Ignoring unsubscribed event");
                }
            }
        }
    }

    fn fail_configuration(&mut self, detail: &str) -> Result<CommandResponse> {
        self.transition(ConnectionState::Failed);
        self.emit(SessionStatus::NotConfigured);
        error!(session_id = %self.id, "Configuration error: {}", detail);
        Err(SessionError::Configuration(detail.to_string()))
    }

    fn fail_response_timeout(&mut self, sent_at: Instant) -> Result<CommandResponse> {
        self.response_timer = None;
        self.transition(ConnectionState::Failed);
        self.emit(SessionStatus::ResponseTimeout);

        let elapsed_ms = elapsed_ms(sent_at);
        error!(
            session_id = %self.id,
            "Response timeout: No response received for '{}' command within {} ms",
            self.request.command,
            elapsed_ms
        );
        Err(SessionError::ResponseTimeout {
            command: self.request.command.clone(),
            elapsed_ms,
        })
    }

    fn fail_transport(&mut self, source: TransportError) -> Result<CommandResponse> {
        self.response_timer = None;
        self.transition(ConnectionState::Failed);
        self.emit(SessionStatus::Error);
        error!(session_id = %self.id, "Socket error: {}", source);
        Err(SessionError::Transport {
            connected: true,
            source,
        })
    }

    fn transition(&mut self, next: ConnectionState) -> bool {
        let allowed = self.state.can_transition_to(next)
            && !(next == ConnectionState::Connected && self.connection_timed_out);

        if allowed {
            trace!(session_id = %self.id, from = ?self.state, to = ?next, "State transition");
            self.state = next;
        } else {
            warn!(
                session_id = %self.id,
                from = ?self.state,
                to = ?next,
                "Rejected state transition"
            );
        }
        allowed
    }

    /// Publish a status. Nothing is published after the terminal status.
    fn emit(&mut self, status: SessionStatus) {
        if self.terminal_emitted {
            return;
        }
        if status.is_terminal() {
            self.terminal_emitted = true;
        }

        debug!(session_id = %self.id, status = status.text(), "Status");
        if let Some(sender) = &self.status {
            // No subscribers is fine
            let _ = sender.send(StatusUpdate {
                session_id: Some(self.id),
                status,
            });
        }
    }

    /// Drop both timers, clear subscriptions, close the connection and leave
    /// the registry. Safe to call any number of times.
    ///
    /// Returns whether the registry abandoned the session before it left.
    /// Only the first call can observe that.
    async fn release(&mut self) -> bool {
        self.connect_timer = None;
        self.response_timer = None;
        if !self.subscriptions.is_empty() {
            trace!(session_id = %self.id, "Dropping pending subscriptions");
            self.subscriptions.clear();
        }

        if let Some(mut connection) = self.connection.take() {
            if timeout(CLOSE_TIMEOUT, connection.close()).await.is_err() {
                warn!(
                    session_id = %self.id,
                    "Connection close did not finish within {} ms",
                    CLOSE_TIMEOUT.as_millis()
                );
            }
            debug!(session_id = %self.id, "Connection released");
        }

        if let Some(registration) = self.registration.take() {
            registration.release();
        }

        // Out of the registry now, so the signal can no longer change. A
        // sender still alive is held by a shutdown_all that is mid-send.
        match self.abandon.take().map(|mut rx| rx.try_recv()) {
            Some(Ok(())) | Some(Err(TryRecvError::Empty)) => true,
            Some(Err(TryRecvError::Closed)) | None => false,
        }
    }
}

/// Resolves when the session has been told to abandon. A dropped sender
/// (registry entry removed without a signal) never resolves.
async fn abandoned(signal: &mut Option<AbandonSignal>) {
    if let Some(rx) = signal.as_mut() {
        if rx.await.is_ok() {
            return;
        }
        *signal = None;
    }
    std::future::pending::<()>().await
}

/// Resolves when the timer fires; never resolves for a disarmed timer.
async fn armed(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending::<()>().await,
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
