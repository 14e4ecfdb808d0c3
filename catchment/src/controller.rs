use std::{
    net::SocketAddr,
    path::Path,
    sync::{Arc, LazyLock},
};

use catchment_common::{
    Signal,
    config::{AttachmentConfig, JobsConfig},
    error::{ConfigError, ControllerError},
    internal, logging,
};
use catchment_control::ControlServer;
use catchment_jobs::DispatcherConfig;
use catchment_mime::AttachmentStorage;
use catchment_smtp::{ConnectionRegistry, Listener, SmtpConfig, TransactionHandler};
use serde::Deserialize;
use tokio::{sync::broadcast, task::JoinHandle};

use crate::{control_handler::CatchmentControlHandler, janitor::Janitor};

/// Top level configuration, read from a RON file.
///
/// ```ron
/// Catchment (
///     smtp: (listen: "0.0.0.0:1025"),
///     attachments: (mode: Spooled),
///     jobs: (queue: "smtp-emails"),
///     dispatcher: Some((type: "Directory", path: "/var/spool/catchment/jobs")),
///     control: Some((socket: "/run/catchment.sock")),
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Catchment {
    #[serde(default)]
    pub smtp: SmtpConfig,

    #[serde(default)]
    pub attachments: AttachmentConfig,

    /// Attach the raw message source to every job. Default: true
    #[serde(default = "defaults::include_raw")]
    pub include_raw: bool,

    #[serde(default)]
    pub jobs: JobsConfig,

    /// Where jobs go. Startup is refused without one.
    #[serde(default)]
    pub dispatcher: Option<DispatcherConfig>,

    #[serde(default)]
    pub control: Option<ControlConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "defaults::socket")]
    pub socket: String,
}

mod defaults {
    pub const fn include_raw() -> bool {
        true
    }

    pub fn socket() -> String {
        catchment_control::DEFAULT_CONTROL_SOCKET.to_string()
    }
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Wait for CTRL+C or SIGTERM, then broadcast [`Signal::Shutdown`]. A second
/// CTRL+C exits straight away.
async fn shutdown(broadcast: broadcast::Sender<Signal>) -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    broadcast
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    tokio::signal::ctrl_c().await?;
    internal!(level = WARN, "Forcing shutdown");
    std::process::exit(130);
}

impl Catchment {
    /// Read and parse a configuration file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Load`] if the file cannot be read or is not valid RON.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let load_error = |reason: String| ConfigError::Load {
            path: path.display().to_string(),
            reason,
        };

        let content = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        ron::from_str(&content).map_err(|e| load_error(e.to_string()))
    }

    /// # Errors
    ///
    /// The first problem found, checked before anything binds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.smtp.validate()?;
        self.attachments.validate()?;
        self.jobs.validate()?;

        if self.dispatcher.is_none() {
            return Err(ConfigError::MissingDispatcher);
        }

        if self
            .control
            .as_ref()
            .is_some_and(|control| control.socket.trim().is_empty())
        {
            return Err(ConfigError::MissingField("control.socket"));
        }

        Ok(())
    }

    /// Validate, create the dispatcher and bind the SMTP listener.
    ///
    /// # Errors
    ///
    /// Invalid configuration, a dispatcher that cannot be initialised, or an
    /// address that cannot be bound.
    pub async fn build(self) -> anyhow::Result<Server> {
        self.validate().map_err(ControllerError::from)?;

        let Some(dispatcher) = self.dispatcher else {
            return Err(ControllerError::from(ConfigError::MissingDispatcher).into());
        };
        let dispatcher = dispatcher.into_dispatcher().await?;
        internal!(level = INFO, "Dispatching jobs to queue {:?}", self.jobs.queue);

        let handler = TransactionHandler::new(self.jobs)
            .with_dispatcher(dispatcher)
            .with_storage(AttachmentStorage::from(&self.attachments))
            .with_include_raw(self.include_raw);

        let registry = ConnectionRegistry::new();
        let listener = Listener::bind(&self.smtp, handler, registry.clone())
            .await
            .map_err(ControllerError::from)?;

        let control = self
            .control
            .map(|control| {
                ControlServer::new(
                    control.socket,
                    Arc::new(CatchmentControlHandler::new(registry.clone())),
                )
            })
            .transpose()?;

        Ok(Server {
            listener,
            control,
            janitor: Janitor::from_config(&self.attachments),
        })
    }

    /// Run until a shutdown signal arrives and every session has finished.
    ///
    /// # Errors
    ///
    /// Startup failures, or sessions still running once the shutdown
    /// timeout has passed.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let server = self.build().await?;
        internal!(level = INFO, "Controller running");

        tokio::spawn(async {
            if let Err(err) = shutdown(SHUTDOWN_BROADCAST.clone()).await {
                internal!(level = ERROR, "Unable to listen for signals: {err}");
            }
        });

        server.serve(SHUTDOWN_BROADCAST.clone()).await?;
        internal!(level = INFO, "Shutdown complete");

        Ok(())
    }
}

/// A bound server ready to run.
pub struct Server {
    listener: Listener,
    control: Option<ControlServer>,
    janitor: Option<Janitor>,
}

impl Server {
    /// # Errors
    ///
    /// If the listening socket has no local address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    #[must_use]
    pub const fn registry(&self) -> &ConnectionRegistry {
        self.listener.registry()
    }

    #[must_use]
    pub fn control_socket(&self) -> Option<&str> {
        self.control.as_ref().map(ControlServer::socket_path)
    }

    /// Serve SMTP, the control socket and the spool janitor until
    /// [`Signal::Shutdown`] is sent on `shutdown`.
    ///
    /// # Errors
    ///
    /// [`ControllerError::ShutdownTimeout`] if sessions outlived the shutdown
    /// timeout.
    pub async fn serve(self, shutdown: broadcast::Sender<Signal>) -> Result<(), ControllerError> {
        let control: Option<JoinHandle<()>> = self.control.map(|server| {
            let receiver = shutdown.subscribe();
            tokio::spawn(async move {
                if let Err(err) = server.serve(receiver).await {
                    internal!(level = ERROR, "Control server failed: {err}");
                }
            })
        });

        let janitor = self
            .janitor
            .map(|janitor| tokio::spawn(janitor.run(shutdown.subscribe())));

        let result = self.listener.serve(shutdown.subscribe()).await;

        for task in [control, janitor].into_iter().flatten() {
            if let Err(err) = task.await {
                internal!(level = WARN, "Background task ended abnormally: {err}");
            }
        }

        let _ = shutdown.send(Signal::Finalised);
        result
    }
}
