//! Turning received email into queue jobs.
//!
//! [`EmailData`] is the record a consumer receives, [`encode`] wraps it in an
//! [`EncodedJob`] carrying the configured routing options, and a
//! [`Dispatcher`] submits the job to wherever the consumers read from.

pub mod backends;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod payload;

pub use backends::{DirectoryDispatcher, MemoryDispatcher};
pub use config::DispatcherConfig;
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, EncodeError};
pub use job::{EncodedJob, JOB_NAME, JobOptions, encode};
pub use payload::{
    AttachmentData, AuthData, EVENT_EMAIL_RECEIVED, EmailData, EnvelopeData, MessageData,
};
