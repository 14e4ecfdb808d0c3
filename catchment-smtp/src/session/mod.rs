use std::{net::SocketAddr, sync::Arc};

use catchment_common::{
    config::ServerTimeouts,
    connection::ConnectionInfo,
    error::SessionError,
    internal,
    status::{EnhancedCode, Status},
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{Notify, watch},
};
use uuid::Uuid;

use crate::{
    State,
    connection::Connection,
    extensions::Extension,
    registry::{ConnectionRegistry, SessionHandle},
    reply::Reply,
    session_state::SessionState,
    transaction_handler::TransactionHandler,
};

mod events;
mod io;

#[derive(PartialEq, Eq, Debug)]
pub enum Event {
    ConnectionClose,
    ConnectionKeepAlive,
}

/// Settings shared by every session of a listener.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub extensions: Vec<Extension>,
    pub hostname: String,
    /// 0 means no limit.
    pub max_message_size: usize,
    pub timeouts: ServerTimeouts,
}

impl SessionConfig {
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    hostname: Option<String>,
    max_message_size: usize,
    timeouts: ServerTimeouts,
}

impl SessionConfigBuilder {
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    #[must_use]
    pub const fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: ServerTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    #[must_use]
    pub fn build(self) -> SessionConfig {
        SessionConfig {
            extensions: Extension::supported(self.max_message_size),
            hostname: self
                .hostname
                .filter(|hostname| !hostname.is_empty())
                .unwrap_or_else(|| String::from("localhost")),
            max_message_size: self.max_message_size,
            timeouts: self.timeouts,
        }
    }
}

enum Outcome {
    Finished(Result<(), SessionError>),
    Closed,
}

/// One SMTP conversation with one client.
pub struct Session<Stream> {
    pub(super) connection: Connection<Stream>,
    pub(super) state: State,
    pub(super) context: SessionState,
    pub(super) config: Arc<SessionConfig>,
    handler: Arc<TransactionHandler>,
    registry: ConnectionRegistry,
    closer: Arc<Notify>,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Session<Stream> {
    /// Create a session for a freshly accepted connection and register it.
    pub fn create(
        stream: Stream,
        peer: SocketAddr,
        config: Arc<SessionConfig>,
        handler: Arc<TransactionHandler>,
        registry: ConnectionRegistry,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        let (publisher, info) = watch::channel(ConnectionInfo::new(&id, peer.to_string()));
        let closer = Arc::new(Notify::new());

        registry.register(id.clone(), SessionHandle::new(info, Arc::clone(&closer)));

        Self {
            connection: Connection::new(stream, &config.timeouts),
            state: State::default(),
            context: SessionState::new(id, peer).with_publisher(publisher),
            config,
            handler,
            registry,
            closer,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.context.id()
    }

    /// Drive the conversation until the client leaves, an error ends it, or
    /// it is closed through the registry.
    ///
    /// # Errors
    ///
    /// [`SessionError::Closed`] when closed through the registry, otherwise
    /// whatever ended the connection.
    pub async fn run(mut self) -> Result<(), SessionError> {
        internal!(
            level = DEBUG,
            "[{}] Connected from {}",
            self.id(),
            self.context.remote_addr()
        );

        let closer = Arc::clone(&self.closer);
        let outcome = tokio::select! {
            result = self.converse() => Outcome::Finished(result),
            () = closer.notified() => Outcome::Closed,
        };

        let result = match outcome {
            Outcome::Finished(result) => result,
            Outcome::Closed => {
                if let Err(err) = self.connection.send(&Reply::shutting_down()).await {
                    internal!(level = DEBUG, "[{}] Unable to say goodbye: {err}", self.id());
                }
                Err(SessionError::Closed)
            }
        };

        internal!(level = DEBUG, "[{}] Connection closed", self.id());
        result
    }

    async fn converse(&mut self) -> Result<(), SessionError> {
        let greeting = Reply::new(
            Status::ServiceReady,
            None,
            format!("{} ESMTP catchment ready", self.config.hostname),
        );
        self.connection.send(&greeting).await?;

        loop {
            let line = match self.connection.read_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    internal!("[{}] Client disconnected", self.id());
                    return Ok(());
                }
                Err(err) => return Err(self.abandon(err).await),
            };

            if self.receive(&line).await? == Event::ConnectionClose {
                return Ok(());
            }
        }
    }

    /// Tell the client why the connection is being dropped, if there is
    /// anything useful to say.
    async fn abandon(&mut self, err: SessionError) -> SessionError {
        let reply = match &err {
            SessionError::Protocol(_) => Reply::new(
                Status::SyntaxError,
                Some(EnhancedCode::SYNTAX),
                "Line too long",
            ),
            SessionError::Timeout(_) => Reply::new(
                Status::Unavailable,
                Some(EnhancedCode(4, 4, 2)),
                "Idle timeout, closing connection",
            ),
            _ => return err,
        };

        if let Err(send) = self.connection.send(&reply).await {
            internal!(level = DEBUG, "[{}] {send}", self.id());
        }
        err
    }
}

impl<Stream> Drop for Session<Stream> {
    fn drop(&mut self) {
        self.registry.remove(self.context.id());
    }
}
