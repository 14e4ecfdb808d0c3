//! Configuration shared between the MIME engine, the job encoder and the server.

mod timeouts;

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

pub use self::timeouts::ServerTimeouts;
use crate::error::ConfigError;

/// Where decoded attachment content ends up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageMode {
    /// Base64 content embedded in the job payload.
    #[default]
    Memory,
    /// Content written to a file in the spool directory; the job carries the path.
    #[serde(alias = "TempFile", alias = "Tempfile")]
    Spooled,
}

/// Attachment handling.
///
/// ```ron
/// attachments: (
///     mode: Spooled,
///     spool_dir: "/tmp/smtp-attachments",
///     cleanup_after_secs: 3600,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentConfig {
    #[serde(default)]
    pub mode: StorageMode,

    /// Directory for spooled attachments. Default: `/tmp/smtp-attachments`
    #[serde(default = "defaults::spool_dir")]
    pub spool_dir: PathBuf,

    /// Age after which spooled attachments are removed, also used as the
    /// sweep interval. Default: 3600 seconds
    #[serde(default = "defaults::cleanup_after_secs")]
    pub cleanup_after_secs: u64,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            mode: StorageMode::default(),
            spool_dir: defaults::spool_dir(),
            cleanup_after_secs: defaults::cleanup_after_secs(),
        }
    }
}

impl AttachmentConfig {
    #[must_use]
    pub const fn cleanup_after(&self) -> Duration {
        Duration::from_secs(self.cleanup_after_secs)
    }

    /// # Errors
    ///
    /// Spooled mode needs a non-empty directory and a non-zero cleanup age.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mode == StorageMode::Spooled {
            if self.spool_dir.as_os_str().is_empty() {
                return Err(ConfigError::MissingField("attachments.spool_dir"));
            }
            if self.cleanup_after_secs == 0 {
                return Err(ConfigError::Invalid {
                    field: "attachments.cleanup_after_secs",
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Routing options copied onto every job.
///
/// ```ron
/// jobs: (queue: "smtp-emails", priority: 10, delay: 0, auto_ack: false)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Destination queue (pipeline) name. Required.
    #[serde(default, alias = "pipeline")]
    pub queue: String,

    /// Default: 10
    #[serde(default = "defaults::priority")]
    pub priority: i64,

    /// Delay in seconds before the job becomes visible. Default: 0
    #[serde(default)]
    pub delay: i64,

    /// Default: false
    #[serde(default)]
    pub auto_ack: bool,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            queue: String::new(),
            priority: defaults::priority(),
            delay: 0,
            auto_ack: false,
        }
    }
}

impl JobsConfig {
    /// # Errors
    ///
    /// The queue name is the only required field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.trim().is_empty() {
            return Err(ConfigError::MissingField("jobs.queue"));
        }

        Ok(())
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn spool_dir() -> PathBuf {
        PathBuf::from("/tmp/smtp-attachments")
    }

    pub const fn cleanup_after_secs() -> u64 {
        3600
    }

    pub const fn priority() -> i64 {
        10
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn attachment_defaults() {
        let config: AttachmentConfig = ron::from_str("()").unwrap();
        assert_eq!(config, AttachmentConfig::default());
        assert_eq!(config.mode, StorageMode::Memory);
        assert_eq!(config.spool_dir, PathBuf::from("/tmp/smtp-attachments"));
        assert_eq!(config.cleanup_after(), Duration::from_secs(3600));
    }

    #[test]
    fn storage_mode_aliases() {
        let config: AttachmentConfig = ron::from_str("(mode: TempFile)").unwrap();
        assert_eq!(config.mode, StorageMode::Spooled);

        assert!(ron::from_str::<AttachmentConfig>("(mode: Disk)").is_err());
    }

    #[test]
    fn jobs_defaults() {
        let config: JobsConfig = ron::from_str(r#"(queue: "smtp-emails")"#).unwrap();
        assert_eq!(
            config,
            JobsConfig {
                queue: "smtp-emails".to_string(),
                priority: 10,
                delay: 0,
                auto_ack: false,
            }
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn jobs_queue_required() {
        let err = JobsConfig::default().validate().unwrap_err();
        assert_eq!(err.to_string(), "jobs.queue is required");

        let config: JobsConfig = ron::from_str(r#"(pipeline: "legacy")"#).unwrap();
        assert_eq!(config.queue, "legacy");
    }

    #[test]
    fn spooled_mode_needs_cleanup_age() {
        let config = AttachmentConfig {
            mode: StorageMode::Spooled,
            cleanup_after_secs: 0,
            ..AttachmentConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
