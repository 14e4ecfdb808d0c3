//! Socket timeout configuration for the SMTP server.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Server-side SMTP timeouts.
///
/// Every read from the client is bounded by `read_secs`, every write by
/// `write_secs`. `shutdown_secs` bounds how long a graceful shutdown waits for
/// open sessions after they have been told to close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTimeouts {
    /// Default: 60 seconds
    #[serde(default = "defaults::read_secs")]
    pub read_secs: u64,

    /// Default: 10 seconds
    #[serde(default = "defaults::write_secs")]
    pub write_secs: u64,

    /// Default: 30 seconds
    #[serde(default = "defaults::shutdown_secs")]
    pub shutdown_secs: u64,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            read_secs: defaults::read_secs(),
            write_secs: defaults::write_secs(),
            shutdown_secs: defaults::shutdown_secs(),
        }
    }
}

impl ServerTimeouts {
    #[must_use]
    pub const fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    #[must_use]
    pub const fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }

    #[must_use]
    pub const fn shutdown(&self) -> Duration {
        Duration::from_secs(self.shutdown_secs)
    }

    /// Reject zero timeouts, which would make every read fail immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first zero field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("smtp.timeouts.read_secs", self.read_secs),
            ("smtp.timeouts.write_secs", self.write_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        Ok(())
    }
}

mod defaults {
    pub const fn read_secs() -> u64 {
        60
    }

    pub const fn write_secs() -> u64 {
        10
    }

    pub const fn shutdown_secs() -> u64 {
        30
    }
}
