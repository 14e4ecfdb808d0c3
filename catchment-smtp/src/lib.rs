//! The SMTP side of catchment: command parsing, the per-connection dialogue,
//! message body framing and the listener that accepts clients.

pub mod auth;
pub mod command;
pub mod connection;
pub mod extensions;
pub mod listener;
pub mod registry;
pub mod reply;
pub mod session;
pub mod session_state;
pub mod state;
pub mod transaction_handler;

use catchment_common::{config::ServerTimeouts, error::ConfigError};
use serde::{Deserialize, Serialize};

pub use self::{
    listener::Listener,
    registry::{ConnectionRegistry, SessionHandle},
    reply::Reply,
    session::{Session, SessionConfig},
    session_state::SessionState,
    state::State,
    transaction_handler::TransactionHandler,
};

/// SMTP listener settings.
///
/// ```ron
/// smtp: (
///     listen: "0.0.0.0:1025",
///     hostname: "mail.example.com",
///     max_message_size: 26214400,
///     timeouts: (read_secs: 120),
/// ),
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "defaults::listen", alias = "addr")]
    pub listen: String,

    /// Name used in the greeting and EHLO replies.
    #[serde(default = "defaults::hostname")]
    pub hostname: String,

    #[serde(default)]
    pub timeouts: ServerTimeouts,

    /// Largest message body accepted, in bytes. 0 disables the limit.
    #[serde(default = "defaults::max_message_size")]
    pub max_message_size: usize,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            listen: defaults::listen(),
            hostname: defaults::hostname(),
            timeouts: ServerTimeouts::default(),
            max_message_size: defaults::max_message_size(),
        }
    }
}

impl SmtpConfig {
    /// # Errors
    ///
    /// If the listen address is empty or a timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::MissingField("smtp.listen"));
        }

        self.timeouts.validate()
    }

    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::builder()
            .with_hostname(self.hostname.clone())
            .with_max_message_size(self.max_message_size)
            .with_timeouts(self.timeouts.clone())
            .build()
    }
}

mod defaults {
    pub fn listen() -> String {
        String::from("127.0.0.1:1025")
    }

    pub fn hostname() -> String {
        String::from("localhost")
    }

    pub const fn max_message_size() -> usize {
        10 * 1024 * 1024
    }
}
