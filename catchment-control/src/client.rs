//! Client for the control socket

use std::{path::Path, time::Duration};

use tokio::net::UnixStream;
use tracing::{debug, trace};

use crate::{
    ControlError, PROTOCOL_VERSION, Request, Response, ResponsePayload, Result,
    protocol::{read_frame, write_frame},
};

/// One request per connection; every call opens a fresh socket.
pub struct ControlClient {
    socket_path: String,
    timeout: Duration,
}

impl ControlClient {
    #[must_use]
    pub fn new(socket_path: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Bound on the whole request/response cycle
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send a request and wait for the response.
    ///
    /// # Errors
    ///
    /// Connection or framing failures, [`ControlError::Timeout`],
    /// [`ControlError::IncompatibleVersion`], and
    /// [`ControlError::ServerError`] when the server answered with an error.
    pub async fn send_request(&self, request: Request) -> Result<Response> {
        tokio::time::timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_| ControlError::Timeout)?
    }

    async fn exchange(&self, request: Request) -> Result<Response> {
        debug!("Connecting to control socket: {}", self.socket_path);
        let mut stream = UnixStream::connect(&self.socket_path).await?;

        trace!("Sending request: {request:?}");
        write_frame(&mut stream, &request).await?;
        let response: Response = read_frame(&mut stream).await?;

        if !response.is_version_compatible() {
            return Err(ControlError::IncompatibleVersion {
                server: response.version,
                client: PROTOCOL_VERSION,
            });
        }

        if let ResponsePayload::Error(ref err) = response.payload {
            return Err(ControlError::ServerError(err.clone()));
        }

        Ok(response)
    }

    /// # Errors
    ///
    /// If nothing exists at the socket path.
    pub fn check_socket_exists(&self) -> Result<()> {
        if Path::new(&self.socket_path).exists() {
            Ok(())
        } else {
            Err(ControlError::InvalidSocketPath(format!(
                "Socket does not exist: {}",
                self.socket_path
            )))
        }
    }
}
