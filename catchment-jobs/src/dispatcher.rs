use async_trait::async_trait;

use crate::{error::DispatchError, job::EncodedJob};

/// Submits jobs to the queue consumers read from.
///
/// A push either hands the job over or fails; callers do not retry. The SMTP
/// client sees a failed push as a transient error and is expected to resend.
#[async_trait]
pub trait Dispatcher: Send + Sync + std::fmt::Debug {
    /// Submit one job.
    ///
    /// # Errors
    ///
    /// Any [`DispatchError`]; the job is not queued.
    async fn push(&self, job: EncodedJob) -> Result<(), DispatchError>;
}
