use std::sync::Arc;

use catchment_common::connection::ConnectionInfo;
use dashmap::DashMap;
use tokio::sync::{Notify, watch};

/// Operator-side handle on one live session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    info: watch::Receiver<ConnectionInfo>,
    closer: Arc<Notify>,
}

impl SessionHandle {
    #[must_use]
    pub const fn new(info: watch::Receiver<ConnectionInfo>, closer: Arc<Notify>) -> Self {
        Self { info, closer }
    }

    /// The most recent snapshot the session published.
    #[must_use]
    pub fn info(&self) -> ConnectionInfo {
        self.info.borrow().clone()
    }

    /// Ask the session to close. The request is remembered if the session is
    /// not waiting on it yet.
    pub fn close(&self) {
        self.closer.notify_one();
    }
}

/// Every live SMTP session, keyed by connection id.
///
/// Cloning shares the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    sessions: Arc<DashMap<String, SessionHandle>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: impl Into<String>, handle: SessionHandle) {
        self.sessions.insert(id.into(), handle);
    }

    /// Returns `true` if the id was registered.
    pub fn remove(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<ConnectionInfo> {
        self.sessions.get(id).map(|handle| handle.info())
    }

    /// Snapshots of all sessions, ordered by connection id.
    #[must_use]
    pub fn list(&self) -> Vec<ConnectionInfo> {
        let mut connections: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| entry.value().info())
            .collect();
        connections.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        connections
    }

    /// Ask one session to close. Returns `false` for an unknown id.
    pub fn close(&self, id: &str) -> bool {
        self.sessions.get(id).is_some_and(|handle| {
            handle.close();
            true
        })
    }

    /// Ask every session to close, returning how many were asked.
    pub fn close_all(&self) -> usize {
        let mut closed = 0;
        for entry in self.sessions.iter() {
            entry.value().close();
            closed += 1;
        }
        closed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
