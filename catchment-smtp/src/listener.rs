use std::{net::SocketAddr, sync::Arc, time::Duration};

use catchment_common::{
    Signal,
    error::{ControllerError, ListenerError},
    internal,
};
use futures_util::future::join_all;
use tokio::{
    net::TcpListener,
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};

use crate::{
    SmtpConfig,
    registry::ConnectionRegistry,
    session::{Session, SessionConfig},
    transaction_handler::TransactionHandler,
};

/// Accepts SMTP connections and runs one session task per client.
pub struct Listener {
    listener: TcpListener,
    config: Arc<SessionConfig>,
    handler: Arc<TransactionHandler>,
    registry: ConnectionRegistry,
    shutdown_timeout: Duration,
}

impl Listener {
    /// Bind the configured address.
    ///
    /// # Errors
    ///
    /// [`ListenerError::BindFailed`] if the address cannot be bound.
    pub async fn bind(
        config: &SmtpConfig,
        handler: TransactionHandler,
        registry: ConnectionRegistry,
    ) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(&config.listen)
            .await
            .map_err(|source| ListenerError::BindFailed {
                address: config.listen.clone(),
                source,
            })?;

        Ok(Self {
            listener,
            config: Arc::new(config.session_config()),
            handler: Arc::new(handler),
            registry,
            shutdown_timeout: config.timeouts.shutdown(),
        })
    }

    /// The address actually bound, useful when listening on port 0.
    ///
    /// # Errors
    ///
    /// If the socket has no local address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    #[must_use]
    pub const fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Serve until [`Signal::Shutdown`], then close every session and wait for
    /// them to finish.
    ///
    /// # Errors
    ///
    /// [`ControllerError::ShutdownTimeout`] if sessions are still running once
    /// the shutdown timeout has passed. They are aborted.
    pub async fn serve(
        self,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<(), ControllerError> {
        let address = self
            .local_addr()
            .map_or_else(|_| String::from("?"), |address| address.to_string());
        internal!(level = INFO, "SMTP listening on {address}");

        let mut sessions: Vec<JoinHandle<()>> = Vec::new();

        loop {
            tokio::select! {
                signal = shutdown.recv() => match signal {
                    Ok(Signal::Shutdown) | Err(RecvError::Closed) => break,
                    Ok(Signal::Finalised) | Err(RecvError::Lagged(_)) => {}
                },

                connection = self.listener.accept() => {
                    let (stream, peer) = match connection {
                        Ok(connection) => connection,
                        Err(err) => {
                            internal!(level = WARN, "{}", ListenerError::AcceptFailed(err));
                            continue;
                        }
                    };

                    let session = Session::create(
                        stream,
                        peer,
                        Arc::clone(&self.config),
                        Arc::clone(&self.handler),
                        self.registry.clone(),
                    );

                    sessions.retain(|session| !session.is_finished());
                    sessions.push(tokio::spawn(async move {
                        let id = session.id().to_string();
                        match session.run().await {
                            Ok(()) => {}
                            Err(err) if err.is_shutdown() => {
                                internal!(level = DEBUG, "[{id}] {err}");
                            }
                            Err(err) if err.is_client_error() => {
                                internal!(level = INFO, "[{id}] {err}");
                            }
                            Err(err) => internal!(level = ERROR, "[{id}] {err}"),
                        }
                    }));
                }
            }
        }

        let closing = self.registry.close_all();
        internal!(
            level = INFO,
            "SMTP listener {address} shutting down, closing {closing} sessions"
        );

        let finished =
            tokio::time::timeout(self.shutdown_timeout, join_all(sessions.iter_mut())).await;

        if finished.is_err() {
            for session in &sessions {
                session.abort();
            }
            return Err(ControllerError::ShutdownTimeout(
                self.shutdown_timeout.as_secs(),
            ));
        }

        internal!(level = INFO, "SMTP listener {address} stopped");
        Ok(())
    }
}
