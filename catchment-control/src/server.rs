//! Control server

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use catchment_common::Signal;
use tokio::{
    net::{UnixListener, UnixStream},
    sync::broadcast::{self, error::RecvError},
};
use tracing::{debug, error, info, trace, warn};

use crate::{
    ControlError, Request, Response, Result,
    protocol::{read_frame, write_frame},
};

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Answers control requests on behalf of the running server.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// An `Err` is sent back to the client as [`crate::ResponsePayload::Error`].
    async fn handle_request(&self, request: Request) -> Result<Response>;
}

/// Serves control requests over a Unix domain socket
pub struct ControlServer {
    socket_path: String,
    handler: Arc<dyn CommandHandler>,
}

impl ControlServer {
    /// # Errors
    ///
    /// If the socket path is empty.
    pub fn new(socket_path: impl Into<String>, handler: Arc<dyn CommandHandler>) -> Result<Self> {
        let socket_path = socket_path.into();
        if socket_path.trim().is_empty() {
            return Err(ControlError::InvalidSocketPath(socket_path));
        }

        Ok(Self {
            socket_path,
            handler,
        })
    }

    #[must_use]
    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    /// Serve until [`Signal::Shutdown`], then remove the socket file.
    ///
    /// A socket file left behind by a crashed instance is replaced; one that
    /// still accepts connections is [`ControlError::SocketInUse`].
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) -> Result<()> {
        let socket_path = Path::new(&self.socket_path);
        if socket_path.exists() {
            if UnixStream::connect(socket_path).await.is_ok() {
                return Err(ControlError::SocketInUse(self.socket_path.clone()));
            }
            info!("Removing stale socket file: {}", self.socket_path);
            tokio::fs::remove_file(socket_path).await?;
        }

        let listener = UnixListener::bind(socket_path)?;

        #[cfg(unix)]
        {
            let mut perms = tokio::fs::metadata(socket_path).await?.permissions();
            perms.set_mode(0o600);
            tokio::fs::set_permissions(socket_path, perms).await?;
        }
        info!("Control server listening on {}", self.socket_path);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let handler = Arc::clone(&self.handler);
                        tokio::spawn(async move {
                            if let Err(e) = Self::handle_connection(stream, handler).await {
                                error!("Error handling control connection: {e}");
                            }
                        });
                    }
                    Err(e) => error!("Error accepting control connection: {e}"),
                },

                signal = shutdown.recv() => match signal {
                    Ok(Signal::Shutdown) | Err(RecvError::Closed) => {
                        info!("Control server shutting down");
                        break;
                    }
                    Ok(Signal::Finalised) | Err(RecvError::Lagged(_)) => {}
                },
            }
        }

        if socket_path.exists() {
            debug!("Removing socket file: {}", self.socket_path);
            let _ = tokio::fs::remove_file(socket_path).await;
        }

        Ok(())
    }

    async fn handle_connection(
        mut stream: UnixStream,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<()> {
        let request: Request = tokio::time::timeout(CONNECTION_TIMEOUT, read_frame(&mut stream))
            .await
            .map_err(|_| ControlError::Timeout)??;

        trace!("Received request: {request:?}");

        let response = if request.version == crate::PROTOCOL_VERSION {
            match handler.handle_request(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Error handling request: {e}");
                    Response::error(e.to_string())
                }
            }
        } else {
            Response::error(
                ControlError::IncompatibleVersion {
                    server: crate::PROTOCOL_VERSION,
                    client: request.version,
                }
                .to_string(),
            )
        };

        trace!("Sending response: {response:?}");

        tokio::time::timeout(CONNECTION_TIMEOUT, write_frame(&mut stream, &response))
            .await
            .map_err(|_| ControlError::Timeout)??;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nothing;

    #[async_trait]
    impl CommandHandler for Nothing {
        async fn handle_request(&self, _: Request) -> Result<Response> {
            Ok(Response::ok())
        }
    }

    #[test]
    fn empty_socket_path_is_rejected() {
        let result = ControlServer::new(" ", Arc::new(Nothing));
        assert!(matches!(result, Err(ControlError::InvalidSocketPath(_))));
    }

    #[test]
    fn keeps_socket_path() {
        let server = ControlServer::new("/tmp/test.sock", Arc::new(Nothing)).unwrap();
        assert_eq!(server.socket_path(), "/tmp/test.sock");
    }
}
