//! Answers `catchmentctl` requests from the live connection registry.

use std::time::Instant;

use async_trait::async_trait;
use catchment_common::internal;
use catchment_control::{
    CommandHandler, ConnectionCommand, ControlError, Request, RequestCommand, Response,
    ResponseData, SystemCommand, SystemStatus,
};
use catchment_smtp::ConnectionRegistry;
use chrono::Utc;

pub struct CatchmentControlHandler {
    registry: ConnectionRegistry,
    start_time: Instant,
    /// Milliseconds since the epoch
    started_at: u64,
}

impl CatchmentControlHandler {
    #[must_use]
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self {
            registry,
            start_time: Instant::now(),
            started_at: u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default(),
        }
    }

    fn handle_connection_command(
        &self,
        command: ConnectionCommand,
    ) -> catchment_control::Result<Response> {
        match command {
            ConnectionCommand::List => Ok(Response::data(ResponseData::Connections(
                self.registry.list(),
            ))),
            ConnectionCommand::Close { uuid } => {
                if self.registry.close(&uuid) {
                    internal!(level = INFO, "Closing connection {uuid} on request");
                    Ok(Response::data(ResponseData::Message(format!(
                        "Connection {uuid} closed"
                    ))))
                } else {
                    Err(ControlError::ServerError(format!(
                        "Connection {uuid} not found"
                    )))
                }
            }
        }
    }

    fn handle_system_command(&self, command: SystemCommand) -> Response {
        match command {
            SystemCommand::Ping => Response::ok(),
            SystemCommand::Status => Response::data(ResponseData::SystemStatus(SystemStatus {
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_secs: self.start_time.elapsed().as_secs(),
                started_at: self.started_at,
                active_connections: self.registry.len(),
            })),
        }
    }
}

#[async_trait]
impl CommandHandler for CatchmentControlHandler {
    async fn handle_request(&self, request: Request) -> catchment_control::Result<Response> {
        match request.command {
            RequestCommand::Connections(command) => self.handle_connection_command(command),
            RequestCommand::System(command) => Ok(self.handle_system_command(command)),
        }
    }
}
