use std::{sync::Arc, time::Duration};

use base64::prelude::*;
use catchment_common::{Signal, config::JobsConfig};
use catchment_jobs::MemoryDispatcher;
use catchment_smtp::{ConnectionRegistry, Listener, SmtpConfig, TransactionHandler};
use pretty_assertions::assert_eq;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::broadcast,
    task::JoinHandle,
};

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(address: std::net::SocketAddr) -> Self {
        let (reader, writer) = TcpStream::connect(address).await.unwrap().into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send(&mut self, data: &str) {
        self.writer.write_all(data.as_bytes()).await.unwrap();
    }

    async fn reply(&mut self) -> String {
        let mut reply = String::new();
        loop {
            let mut line = String::new();
            let read = self.reader.read_line(&mut line).await.unwrap();
            assert!(read > 0, "Connection closed while waiting for a reply");
            let done = line.as_bytes().get(3) != Some(&b'-');
            reply.push_str(&line);
            if done {
                return reply.trim_end().to_string();
            }
        }
    }

    async fn command(&mut self, line: &str) -> String {
        self.send(&format!("{line}\r\n")).await;
        self.reply().await
    }
}

struct Server {
    address: std::net::SocketAddr,
    registry: ConnectionRegistry,
    shutdown: broadcast::Sender<Signal>,
    task: JoinHandle<Result<(), catchment_common::error::ControllerError>>,
}

async fn serve(dispatcher: &MemoryDispatcher) -> Server {
    let config = SmtpConfig {
        listen: String::from("127.0.0.1:0"),
        hostname: String::from("capture.test"),
        ..SmtpConfig::default()
    };
    let handler = TransactionHandler::new(JobsConfig {
        queue: String::from("smtp-emails"),
        ..JobsConfig::default()
    })
    .with_dispatcher(Arc::new(dispatcher.clone()));
    let registry = ConnectionRegistry::new();

    let listener = Listener::bind(&config, handler, registry.clone()).await.unwrap();
    let address = listener.local_addr().unwrap();
    let (shutdown, receiver) = broadcast::channel(4);

    Server {
        address,
        registry,
        shutdown,
        task: tokio::spawn(listener.serve(receiver)),
    }
}

#[tokio::test]
async fn authenticated_delivery() {
    let dispatcher = MemoryDispatcher::new();
    let server = serve(&dispatcher).await;
    let mut client = Client::connect(server.address).await;

    assert_eq!(client.reply().await, "220 capture.test ESMTP catchment ready");
    client.command("EHLO sender.test").await;

    let credentials = BASE64_STANDARD.encode("\0mailer\0s3cret");
    assert_eq!(
        client.command(&format!("AUTH PLAIN {credentials}")).await,
        "235 2.7.0 Authentication successful"
    );
    assert!(client.command("AUTH PLAIN").await.starts_with("503"));

    client.command("MAIL FROM:<mailer@sender.test>").await;
    client.command("RCPT TO:<one@capture.test>").await;
    client.command("RCPT TO:<two@capture.test>").await;
    assert!(client.command("DATA").await.starts_with("354"));
    client
        .send(concat!(
            "From: Mailer <mailer@sender.test>\r\n",
            "Subject: Welcome\r\n\r\n",
            "Hello there\r\n..dotted\r\n.\r\n",
        ))
        .await;
    assert!(client.reply().await.starts_with("250 2.0.0 OK: queued as"));
    client.command("QUIT").await;

    dispatcher
        .wait_for_count(1, Duration::from_secs(5))
        .await
        .unwrap();

    let email = dispatcher.jobs().await[0].email().unwrap();
    assert!(email.authentication.attempted);
    assert_eq!(email.authentication.mechanism, "PLAIN");
    assert_eq!(email.authentication.username, "mailer");
    assert_eq!(email.authentication.password, "s3cret");
    assert_eq!(email.envelope.to, ["one@capture.test", "two@capture.test"]);
    assert_eq!(email.envelope.helo, "sender.test");
    assert_eq!(email.subject(), Some("Welcome"));
    assert!(email.message.body.contains("\n.dotted"));

    server.shutdown.send(Signal::Shutdown).unwrap();
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn login_exchange() {
    let dispatcher = MemoryDispatcher::new();
    let server = serve(&dispatcher).await;
    let mut client = Client::connect(server.address).await;
    client.reply().await;
    client.command("EHLO sender.test").await;

    assert_eq!(client.command("AUTH LOGIN").await, "334 VXNlcm5hbWU6");
    assert_eq!(
        client.command(&BASE64_STANDARD.encode("operator")).await,
        "334 UGFzc3dvcmQ6"
    );
    assert!(
        client
            .command(&BASE64_STANDARD.encode("pw"))
            .await
            .starts_with("235")
    );

    let info = server.registry.list().remove(0);
    assert!(info.authenticated);
    assert_eq!(info.username, "operator");

    assert_eq!(
        client.command("AUTH LOGIN").await,
        "503 5.5.1 Already authenticated"
    );
}

#[tokio::test]
async fn cancelled_and_invalid_auth() {
    let dispatcher = MemoryDispatcher::new();
    let server = serve(&dispatcher).await;
    let mut client = Client::connect(server.address).await;
    client.reply().await;

    assert!(client.command("AUTH PLAIN").await.starts_with("503"));
    client.command("EHLO sender.test").await;

    assert_eq!(client.command("AUTH PLAIN").await, "334");
    assert!(client.command("*").await.starts_with("501 5.0.0"));
    assert!(client.command("AUTH PLAIN !!!").await.starts_with("501"));
    assert!(client.command("AUTH CRAM-MD5").await.starts_with("504"));
    assert!(!server.registry.list()[0].authenticated);
}

#[tokio::test]
async fn ordering_and_misc_commands() {
    let dispatcher = MemoryDispatcher::new();
    let server = serve(&dispatcher).await;
    let mut client = Client::connect(server.address).await;
    client.reply().await;

    assert!(client.command("MAIL FROM:<a@b.c>").await.starts_with("503"));
    assert!(client.command("FROB").await.starts_with("500"));
    assert!(client.command("MAIL FROM").await.starts_with("501"));
    assert!(
        client
            .command("HELO old.client")
            .await
            .starts_with("250 capture.test Hello")
    );
    assert!(client.command("RCPT TO:<a@b.c>").await.starts_with("503"));
    assert!(client.command("DATA").await.starts_with("503"));
    assert!(client.command("NOOP").await.starts_with("250"));
    assert!(client.command("VRFY someone").await.starts_with("252"));
    assert!(client.command("HELP").await.starts_with("214"));
    assert!(client.command("STARTTLS").await.starts_with("502"));
    assert!(client.command("AUTH PLAIN").await.starts_with("503"));

    client.command("MAIL FROM:<a@b.c>").await;
    assert!(client.command("DATA").await.starts_with("503"));
    client.command("RCPT TO:<d@e.f>").await;
    assert!(client.command("RSET").await.starts_with("250"));
    assert!(client.command("DATA").await.starts_with("503"));

    assert!(client.command("QUIT").await.starts_with("221"));
    assert_eq!(dispatcher.attempts(), 0);
}

#[tokio::test]
async fn pipelined_commands() {
    let dispatcher = MemoryDispatcher::new();
    let server = serve(&dispatcher).await;
    let mut client = Client::connect(server.address).await;
    client.reply().await;
    client.command("EHLO pipeliner").await;

    client
        .send("MAIL FROM:<p@pipe.test>\r\nRCPT TO:<q@pipe.test>\r\nDATA\r\n")
        .await;
    assert!(client.reply().await.starts_with("250"));
    assert!(client.reply().await.starts_with("250"));
    assert!(client.reply().await.starts_with("354"));

    client
        .send("Subject: piped\r\n\r\nbody\r\n.\r\nMAIL FROM:<p@pipe.test>\r\n")
        .await;
    assert!(client.reply().await.starts_with("250 2.0.0"));
    assert!(client.reply().await.starts_with("250"));

    assert_eq!(dispatcher.len().await, 1);
}

#[tokio::test]
async fn shutdown_closes_sessions() {
    let dispatcher = MemoryDispatcher::new();
    let server = serve(&dispatcher).await;

    let mut first = Client::connect(server.address).await;
    let mut second = Client::connect(server.address).await;
    first.reply().await;
    second.reply().await;
    first.command("EHLO first").await;
    assert_eq!(server.registry.len(), 2);

    server.shutdown.send(Signal::Shutdown).unwrap();

    assert!(first.reply().await.starts_with("421"));
    assert!(second.reply().await.starts_with("421"));

    tokio::time::timeout(Duration::from_secs(5), server.task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(server.registry.is_empty());
}
