use std::io;

use thiserror::Error;

/// The email record could not be turned into a job.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Unable to serialize job payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A job could not be handed to the queue. Never retried by the caller.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No dispatcher is wired up.
    #[error("No dispatcher available")]
    Unavailable,

    /// The queue refused the job, e.g. because it is full.
    #[error("Job rejected: {0}")]
    Rejected(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DispatchError {
    /// Returns `true` when a later attempt could succeed without intervention.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::Io(_))
    }
}
