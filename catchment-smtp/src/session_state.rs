//! Per-connection protocol state.
//!
//! `SessionState` carries the client identity, authentication outcome, the
//! envelope of the current mail transaction and the body buffer. Every change
//! that is visible to operators is published through a watch channel so that
//! the connection registry can read a consistent snapshot without locking the
//! session.

use std::net::SocketAddr;

use catchment_common::{
    connection::ConnectionInfo,
    status::{EnhancedCode, Status},
};
use catchment_jobs::{AuthData, EnvelopeData};
use tokio::sync::watch;

use crate::{auth::Credentials, reply::Reply};

#[derive(Debug)]
pub struct SessionState {
    id: String,
    remote_addr: SocketAddr,
    helo: Option<String>,
    extended: bool,
    credentials: Option<Credentials>,
    from: Option<String>,
    to: Vec<String>,
    buffer: Vec<u8>,
    publisher: Option<watch::Sender<ConnectionInfo>>,
}

impl SessionState {
    #[must_use]
    pub fn new(id: impl Into<String>, remote_addr: SocketAddr) -> Self {
        Self {
            id: id.into(),
            remote_addr,
            helo: None,
            extended: false,
            credentials: None,
            from: None,
            to: Vec::new(),
            buffer: Vec::new(),
            publisher: None,
        }
    }

    /// Publish snapshots of this session to `publisher` from now on.
    #[must_use]
    pub fn with_publisher(mut self, publisher: watch::Sender<ConnectionInfo>) -> Self {
        self.publisher = Some(publisher);
        self.publish();
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// The identity given with HELO/EHLO.
    #[must_use]
    pub fn helo(&self) -> Option<&str> {
        self.helo.as_deref()
    }

    #[must_use]
    pub const fn is_extended(&self) -> bool {
        self.extended
    }

    /// Record a HELO/EHLO greeting. A greeting always starts a fresh transaction.
    pub fn greet(&mut self, id: impl Into<String>, extended: bool) {
        self.helo = Some(id.into());
        self.extended = extended;
        self.clear_transaction();
        self.publish();
    }

    /// Accept the sender of a new transaction.
    pub fn mail(&mut self, from: impl Into<String>) -> Reply {
        self.from = Some(from.into());
        self.publish();

        Reply::new(Status::Ok, Some(EnhancedCode::SENDER_OK), "Sender OK")
    }

    /// Accept one more recipient for the current transaction.
    pub fn rcpt(&mut self, to: impl Into<String>) -> Reply {
        self.to.push(to.into());
        self.publish();

        Reply::new(
            Status::Ok,
            Some(EnhancedCode::DESTINATION_OK),
            "Recipient OK",
        )
    }

    /// Record a completed AUTH exchange.
    pub fn authenticate(&mut self, credentials: Credentials) -> Reply {
        self.credentials = Some(credentials);
        self.publish();

        Reply::new(
            Status::AuthSuccessful,
            Some(EnhancedCode::AUTH_OK),
            "Authentication successful",
        )
    }

    #[must_use]
    pub const fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        self.from.as_deref()
    }

    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.to
    }

    #[must_use]
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub const fn buffer_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buffer
    }

    /// Abandon the current transaction. The greeting and authentication
    /// outcome survive.
    pub fn reset(&mut self) {
        self.clear_transaction();
        self.publish();
    }

    fn clear_transaction(&mut self) {
        self.from = None;
        self.to.clear();
        self.buffer.clear();
    }

    #[must_use]
    pub fn envelope(&self) -> EnvelopeData {
        EnvelopeData {
            from: self.from.clone().unwrap_or_default(),
            to: self.to.clone(),
            helo: self.helo.clone().unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn auth_data(&self) -> AuthData {
        self.credentials
            .as_ref()
            .map_or_else(AuthData::default, |credentials| AuthData {
                attempted: true,
                mechanism: credentials.mechanism.to_string(),
                username: credentials.username.clone(),
                password: credentials.password.clone(),
            })
    }

    /// A snapshot for operators.
    #[must_use]
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            uuid: self.id.clone(),
            remote_addr: self.remote_addr.to_string(),
            from: self.from.clone().unwrap_or_default(),
            to: self.to.clone(),
            authenticated: self.is_authenticated(),
            username: self
                .credentials
                .as_ref()
                .map(|credentials| credentials.username.clone())
                .unwrap_or_default(),
        }
    }

    fn publish(&self) {
        if let Some(publisher) = &self.publisher {
            publisher.send_replace(self.info());
        }
    }
}
