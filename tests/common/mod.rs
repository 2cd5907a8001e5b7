//! Scripted transport shared by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::sleep;

use scriptlauncher_client::status::StatusUpdate;
use scriptlauncher_client::{
    Connection, InboundEvent, SessionStatus, ServerTarget, Transport, TransportError,
};

/// How the scripted connect attempt behaves
#[derive(Debug, Clone)]
pub enum Connect {
    /// Connection established after the delay
    After(Duration),
    /// Connection attempt fails after the delay
    FailAfter(Duration, String),
    /// The peer never answers
    Never,
}

/// One scripted inbound step, delayed from the previous one
#[derive(Debug, Clone)]
pub enum Reply {
    Event(Duration, String, Value),
    Disconnect(Duration, String),
}

impl Reply {
    pub fn event(after_ms: u64, name: &str, payload: Value) -> Self {
        Reply::Event(Duration::from_millis(after_ms), name.to_string(), payload)
    }

    pub fn disconnect(after_ms: u64, reason: &str) -> Self {
        Reply::Disconnect(Duration::from_millis(after_ms), reason.to_string())
    }
}

/// How the scripted connection behaves on close
#[derive(Debug, Clone)]
pub enum Close {
    Immediate,
    /// Close completes after the delay
    After(Duration),
    /// Close never completes
    Stall,
}

/// Counters the tests assert on
#[derive(Debug, Clone, Default)]
pub struct Probe {
    connects: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    emitted: Arc<Mutex<Vec<(String, Value)>>>,
}

impl Probe {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn emitted(&self) -> Vec<(String, Value)> {
        self.emitted.lock().unwrap().clone()
    }
}

pub struct MockTransport {
    connect: Connect,
    replies: Vec<Reply>,
    emit_failure: Option<String>,
    close: Close,
    probe: Probe,
}

impl MockTransport {
    pub fn new(connect: Connect, replies: Vec<Reply>) -> Self {
        Self {
            connect,
            replies,
            emit_failure: None,
            close: Close::Immediate,
            probe: Probe::default(),
        }
    }

    /// Sending the command fails with `detail`
    pub fn failing_emit(mut self, detail: &str) -> Self {
        self.emit_failure = Some(detail.to_string());
        self
    }

    pub fn closing(mut self, close: Close) -> Self {
        self.close = close;
        self
    }

    /// Connects immediately and plays `replies`
    pub fn replying(replies: Vec<Reply>) -> Self {
        Self::new(Connect::After(Duration::ZERO), replies)
    }

    pub fn probe(&self) -> Probe {
        self.probe.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _target: &ServerTarget) -> Result<Box<dyn Connection>, TransportError> {
        self.probe.connects.fetch_add(1, Ordering::SeqCst);
        match &self.connect {
            Connect::After(delay) => {
                sleep(*delay).await;
                Ok(Box::new(MockConnection {
                    replies: self.replies.clone().into(),
                    emit_failure: self.emit_failure.clone(),
                    close: self.close.clone(),
                    probe: self.probe.clone(),
                    closed: false,
                }))
            }
            Connect::FailAfter(delay, detail) => {
                sleep(*delay).await;
                Err(TransportError::Handshake(detail.clone()))
            }
            Connect::Never => std::future::pending().await,
        }
    }
}

pub struct MockConnection {
    replies: VecDeque<Reply>,
    emit_failure: Option<String>,
    close: Close,
    probe: Probe,
    closed: bool,
}

#[async_trait]
impl Connection for MockConnection {
    async fn emit(&mut self, event: &str, payload: Value) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if let Some(detail) = &self.emit_failure {
            return Err(TransportError::Disconnected(detail.clone()));
        }
        self.probe
            .emitted
            .lock()
            .unwrap()
            .push((event.to_string(), payload));
        Ok(())
    }

    async fn next_event(&mut self) -> Result<InboundEvent, TransportError> {
        match self.replies.pop_front() {
            Some(Reply::Event(delay, name, payload)) => {
                sleep(delay).await;
                Ok(InboundEvent::new(name, payload))
            }
            Some(Reply::Disconnect(delay, reason)) => {
                sleep(delay).await;
                Err(TransportError::Disconnected(reason))
            }
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        match &self.close {
            Close::Immediate => {}
            Close::After(delay) => sleep(*delay).await,
            Close::Stall => std::future::pending().await,
        }
    }
}

/// Every status published so far, in order
pub fn drain_statuses(rx: &mut broadcast::Receiver<StatusUpdate>) -> Vec<SessionStatus> {
    let mut statuses = Vec::new();
    while let Ok(update) = rx.try_recv() {
        statuses.push(update.status);
    }
    statuses
}

pub fn target() -> ServerTarget {
    ServerTarget::new("pw")
}
