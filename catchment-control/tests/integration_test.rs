//! Client/server round trips over a real Unix socket.
#![allow(clippy::unwrap_used, clippy::panic)]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use catchment_common::{Signal, connection::ConnectionInfo};
use catchment_control::{
    CommandHandler, ConnectionCommand, ControlClient, ControlError, ControlServer, Request,
    RequestCommand, Response, ResponseData, ResponsePayload, Result, SystemCommand, SystemStatus,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio::{sync::broadcast, task::JoinHandle};

struct MockHandler {
    connections: Vec<ConnectionInfo>,
}

impl MockHandler {
    fn new() -> Self {
        Self {
            connections: vec![
                ConnectionInfo {
                    from: "a@example.com".to_string(),
                    ..ConnectionInfo::new("0001", "127.0.0.1:40000")
                },
                ConnectionInfo::new("0002", "127.0.0.1:40001"),
            ],
        }
    }
}

#[async_trait]
impl CommandHandler for MockHandler {
    async fn handle_request(&self, request: Request) -> Result<Response> {
        match request.command {
            RequestCommand::Connections(ConnectionCommand::List) => Ok(Response::data(
                ResponseData::Connections(self.connections.clone()),
            )),
            RequestCommand::Connections(ConnectionCommand::Close { uuid }) => {
                if self.connections.iter().any(|info| info.uuid == uuid) {
                    Ok(Response::ok())
                } else {
                    Err(ControlError::ServerError(format!("Connection {uuid} not found")))
                }
            }
            RequestCommand::System(SystemCommand::Ping) => Ok(Response::ok()),
            RequestCommand::System(SystemCommand::Status) => {
                Ok(Response::data(ResponseData::SystemStatus(SystemStatus {
                    version: "0.1.0".to_string(),
                    uptime_secs: 5,
                    started_at: 0,
                    active_connections: self.connections.len(),
                })))
            }
        }
    }
}

struct Harness {
    _dir: TempDir,
    socket: String,
    shutdown: broadcast::Sender<Signal>,
    task: JoinHandle<Result<()>>,
}

async fn start() -> Harness {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("control.sock").to_string_lossy().into_owned();
    let server = ControlServer::new(socket.clone(), Arc::new(MockHandler::new())).unwrap();
    let (shutdown, receiver) = broadcast::channel(1);
    let task = tokio::spawn(async move { server.serve(receiver).await });

    for _ in 0..50 {
        if std::path::Path::new(&socket).exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    Harness {
        _dir: dir,
        socket,
        shutdown,
        task,
    }
}

#[tokio::test]
async fn list_connections() {
    let harness = start().await;
    let client = ControlClient::new(&harness.socket);

    let response = client
        .send_request(Request::connections(ConnectionCommand::List))
        .await
        .unwrap();

    let ResponsePayload::Data(data) = response.payload else {
        panic!("Expected data");
    };
    let ResponseData::Connections(connections) = *data else {
        panic!("Expected connections");
    };
    assert_eq!(connections.len(), 2);
    assert_eq!(connections[0].uuid, "0001");
    assert_eq!(connections[0].from, "a@example.com");
}

#[tokio::test]
async fn close_unknown_connection_is_an_error() {
    let harness = start().await;
    let client = ControlClient::new(&harness.socket);

    let response = client
        .send_request(Request::connections(ConnectionCommand::Close {
            uuid: "0002".to_string(),
        }))
        .await
        .unwrap();
    assert!(response.is_success());

    let err = client
        .send_request(Request::connections(ConnectionCommand::Close {
            uuid: "ffff".to_string(),
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::ServerError(message) if message.contains("not found")));
}

#[tokio::test]
async fn ping_and_status() {
    let harness = start().await;
    let client = ControlClient::new(&harness.socket);

    let response = client
        .send_request(Request::system(SystemCommand::Ping))
        .await
        .unwrap();
    assert!(matches!(response.payload, ResponsePayload::Ok));

    let response = client
        .send_request(Request::system(SystemCommand::Status))
        .await
        .unwrap();
    let ResponsePayload::Data(data) = response.payload else {
        panic!("Expected data");
    };
    let ResponseData::SystemStatus(status) = *data else {
        panic!("Expected status");
    };
    assert_eq!(status.active_connections, 2);
}

#[tokio::test]
async fn version_mismatch_is_refused() {
    let harness = start().await;
    let client = ControlClient::new(&harness.socket);

    let mut request = Request::system(SystemCommand::Ping);
    request.version += 1;

    let err = client.send_request(request).await.unwrap_err();
    assert!(matches!(err, ControlError::ServerError(message) if message.contains("version")));
}

#[tokio::test]
async fn second_server_cannot_take_the_socket() {
    let harness = start().await;

    let second = ControlServer::new(harness.socket.clone(), Arc::new(MockHandler::new())).unwrap();
    let (_tx, rx) = broadcast::channel(1);
    let err = second.serve(rx).await.unwrap_err();
    assert!(matches!(err, ControlError::SocketInUse(_)));
}

#[tokio::test]
async fn shutdown_removes_socket() {
    let harness = start().await;
    assert!(ControlClient::new(&harness.socket).check_socket_exists().is_ok());

    harness.shutdown.send(Signal::Shutdown).unwrap();
    harness.task.await.unwrap().unwrap();

    assert!(!std::path::Path::new(&harness.socket).exists());
    let err = ControlClient::new(&harness.socket)
        .send_request(Request::system(SystemCommand::Ping))
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::Io(_)));
}

#[tokio::test]
async fn stale_socket_file_is_replaced() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("stale.sock");
    drop(std::os::unix::net::UnixListener::bind(&socket).unwrap());
    assert!(socket.exists());

    let server =
        ControlServer::new(socket.to_string_lossy(), Arc::new(MockHandler::new())).unwrap();
    let (shutdown, receiver) = broadcast::channel(1);
    let task = tokio::spawn(async move { server.serve(receiver).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = ControlClient::new(socket.to_string_lossy())
        .send_request(Request::system(SystemCommand::Ping))
        .await
        .unwrap();
    assert!(response.is_success());

    shutdown.send(Signal::Shutdown).unwrap();
    task.await.unwrap().unwrap();
}
