//! The whole server from a RON configuration: SMTP in, job documents out,
//! control socket alongside.

use std::{path::Path, time::Duration};

use catchment::controller::Catchment;
use catchment_common::Signal;
use catchment_control::{
    ConnectionCommand, ControlClient, Request, ResponseData, ResponsePayload, SystemCommand,
};
use catchment_jobs::EncodedJob;
use pretty_assertions::assert_eq;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    sync::broadcast,
};

const MESSAGE: &str = concat!(
    "From: Alice <alice@example.com>\r\n",
    "To: bob@example.com\r\n",
    "Subject: Quarterly report\r\n",
    "MIME-Version: 1.0\r\n",
    "Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n",
    "\r\n",
    "--XYZ\r\n",
    "Content-Type: text/plain; charset=utf-8\r\n",
    "\r\n",
    "Please see attached.\r\n",
    "--XYZ\r\n",
    "Content-Type: application/pdf\r\n",
    "Content-Disposition: attachment; filename=\"report.pdf\"\r\n",
    "Content-Transfer-Encoding: base64\r\n",
    "\r\n",
    "JVBERi0=\r\n",
    "--XYZ--\r\n",
    ".\r\n",
);

fn config(root: &Path) -> Catchment {
    let config = format!(
        r#"Catchment (
            smtp: (listen: "127.0.0.1:0", hostname: "capture.test", timeouts: (shutdown_secs: 5)),
            attachments: (mode: Spooled, spool_dir: "{root}/spool"),
            jobs: (queue: "smtp-emails", priority: 3),
            dispatcher: Some((type: "Directory", path: "{root}/jobs")),
            control: Some((socket: "{root}/control.sock")),
        )"#,
        root = root.display()
    );

    ron::from_str(&config).unwrap()
}

async fn reply(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> String {
    let mut reply = String::new();
    loop {
        let mut line = String::new();
        assert!(reader.read_line(&mut line).await.unwrap() > 0);
        let done = line.as_bytes().get(3) != Some(&b'-');
        reply.push_str(&line);
        if done {
            return reply;
        }
    }
}

async fn wait_for_job(queue: &Path) -> EncodedJob {
    for _ in 0..200 {
        if let Ok(entries) = std::fs::read_dir(queue) {
            let job = entries
                .flatten()
                .map(|entry| entry.path())
                .find(|path| path.extension().is_some_and(|ext| ext == "json"));
            if let Some(job) = job {
                return serde_json::from_slice(&std::fs::read(job).unwrap()).unwrap();
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    panic!("No job written to {}", queue.display());
}

async fn wait_for_socket(client: &ControlClient) {
    for _ in 0..100 {
        if client.check_socket_exists().is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn message_becomes_a_job() {
    let root = tempfile::tempdir().unwrap();
    let server = config(root.path()).build().await.unwrap();
    let address = server.local_addr().unwrap();
    let socket = server.control_socket().unwrap().to_string();

    let (shutdown, _) = broadcast::channel(8);
    let task = tokio::spawn(server.serve(shutdown.clone()));

    let (read, mut write) = TcpStream::connect(address).await.unwrap().into_split();
    let mut read = BufReader::new(read);
    assert!(reply(&mut read).await.starts_with("220 capture.test"));

    for (command, expected) in [
        ("EHLO client.test\r\n", "250"),
        ("MAIL FROM:<alice@example.com>\r\n", "250"),
        ("RCPT TO:<bob@example.com>\r\n", "250"),
        ("DATA\r\n", "354"),
    ] {
        write.write_all(command.as_bytes()).await.unwrap();
        assert!(reply(&mut read).await.starts_with(expected), "{command}");
    }
    write.write_all(MESSAGE.as_bytes()).await.unwrap();
    assert!(reply(&mut read).await.starts_with("250 2.0.0 OK: queued as"));

    let job = wait_for_job(&root.path().join("jobs").join("smtp-emails")).await;
    assert_eq!(job.options().priority, 3);

    let email = job.email().unwrap();
    assert_eq!(email.envelope.from, "alice@example.com");
    assert_eq!(email.envelope.helo, "client.test");
    assert!(!email.authentication.attempted);
    assert_eq!(email.message.body.trim_end(), "Please see attached.");
    assert!(email.message.raw.is_some());

    let attachment = &email.attachments[0];
    assert_eq!(attachment.filename, "report.pdf");
    assert_eq!(attachment.content, None);
    let spooled = attachment.path.as_deref().unwrap();
    assert!(spooled.starts_with(&root.path().join("spool").display().to_string()));
    assert_eq!(std::fs::read(spooled).unwrap(), b"%PDF-");

    let client = ControlClient::new(socket.clone());
    wait_for_socket(&client).await;
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
    assert_eq!(status.active_connections, 1);

    shutdown.send(Signal::Shutdown).unwrap();
    assert!(reply(&mut read).await.starts_with("421"));
    tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(!Path::new(&socket).exists());
}

#[tokio::test]
async fn control_socket_closes_connections() {
    let root = tempfile::tempdir().unwrap();
    let server = config(root.path()).build().await.unwrap();
    let address = server.local_addr().unwrap();
    let socket = server.control_socket().unwrap().to_string();
    let registry = server.registry().clone();

    let (shutdown, _) = broadcast::channel(8);
    let task = tokio::spawn(server.serve(shutdown.clone()));

    let (read, mut write) = TcpStream::connect(address).await.unwrap().into_split();
    let mut read = BufReader::new(read);
    reply(&mut read).await;
    write
        .write_all(b"EHLO client.test\r\nMAIL FROM:<watched@example.com>\r\n")
        .await
        .unwrap();
    reply(&mut read).await;
    reply(&mut read).await;

    let client = ControlClient::new(socket);
    wait_for_socket(&client).await;

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
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].from, "watched@example.com");

    let uuid = connections[0].uuid.clone();
    client
        .send_request(Request::connections(ConnectionCommand::Close { uuid: uuid.clone() }))
        .await
        .unwrap();
    assert!(reply(&mut read).await.starts_with("421"));

    for _ in 0..100 {
        if registry.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(registry.is_empty());

    let err = client
        .send_request(Request::connections(ConnectionCommand::Close { uuid }))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));

    shutdown.send(Signal::Shutdown).unwrap();
    task.await.unwrap().unwrap();
}
