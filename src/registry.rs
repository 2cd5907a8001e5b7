//! Live session registry
//!
//! Tracks every session that has not finished yet, so a host shutdown can
//! force-terminate all of them. Each entry holds the sending half of the
//! session's abandon signal, never the session itself.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

/// Receiving half of an abandon signal
pub type AbandonSignal = oneshot::Receiver<()>;

/// Shared set of live sessions. Cloning shares the same set.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<Uuid, oneshot::Sender<()>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session. Returns `None` if the id is already registered.
    pub fn register(&self, id: Uuid) -> Option<AbandonSignal> {
        match self.sessions.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(tx);
                debug!(session_id = %id, "Session registered");
                Some(rx)
            }
        }
    }

    /// Remove a session. No-op if it is absent.
    pub fn deregister(&self, id: &Uuid) {
        if self.sessions.remove(id).is_some() {
            debug!(session_id = %id, "Session deregistered");
        }
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Signal every registered session to abandon its work and empty the
    /// registry. Sessions release their timers and connections without
    /// delivering a result. Returns the number of sessions signalled.
    pub fn shutdown_all(&self) -> usize {
        let ids: Vec<Uuid> = self.sessions.iter().map(|entry| *entry.key()).collect();

        let mut signalled = 0;
        for id in ids {
            if let Some((_, abandon)) = self.sessions.remove(&id) {
                // The session may already be past its last suspension point
                let _ = abandon.send(());
                signalled += 1;
            }
        }

        if signalled > 0 {
            info!("Abandoned {} pending session(s)", signalled);
        }
        signalled
    }
}

/// Registry membership of one session. Deregisters on drop, so a session
/// dropped mid-flight never lingers in the registry.
#[derive(Debug)]
pub struct Registration {
    id: Uuid,
    registry: SessionRegistry,
}

impl Registration {
    pub fn new(id: Uuid, registry: SessionRegistry) -> Self {
        Self { id, registry }
    }

    pub fn release(&self) {
        self.registry.deregister(&self.id);
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.release();
    }
}
