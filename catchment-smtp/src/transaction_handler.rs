//! Turning a finished DATA phase into a queued job.
//!
//! Every failure after the body has been read becomes a reply here, so a bad
//! message or an unavailable queue never ends the session.

use std::sync::Arc;

use catchment_common::{
    config::JobsConfig,
    internal,
    status::{EnhancedCode, Status},
};
use catchment_jobs::{DispatchError, Dispatcher, EmailData, encode};
use catchment_mime::{AttachmentStorage, ParseOptions, parse_message, storage};
use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{reply::Reply, session_state::SessionState};

const TRY_AGAIN: &str = "Temporary failure, try again later";

#[derive(Debug, Clone)]
pub struct TransactionHandler {
    dispatcher: Option<Arc<dyn Dispatcher>>,
    storage: AttachmentStorage,
    jobs: JobsConfig,
    include_raw: bool,
}

impl TransactionHandler {
    /// A handler with no dispatcher. Until one is set every message is
    /// refused with a temporary failure.
    #[must_use]
    pub fn new(jobs: JobsConfig) -> Self {
        Self {
            dispatcher: None,
            storage: AttachmentStorage::default(),
            jobs,
            include_raw: true,
        }
    }

    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    #[must_use]
    pub fn with_storage(mut self, storage: AttachmentStorage) -> Self {
        self.storage = storage;
        self
    }

    #[must_use]
    pub const fn with_include_raw(mut self, include_raw: bool) -> Self {
        self.include_raw = include_raw;
        self
    }

    /// Read a message body from `body`, decompose it and hand it to the
    /// dispatcher.
    ///
    /// The transaction is always reset afterwards, whatever the outcome.
    pub async fn data<R>(&self, session: &mut SessionState, body: R) -> Reply
    where
        R: AsyncRead + Unpin + Send,
    {
        let reply = self.accept(session, body).await;
        session.reset();
        reply
    }

    fn dispatcher(&self) -> Result<&Arc<dyn Dispatcher>, DispatchError> {
        self.dispatcher.as_ref().ok_or(DispatchError::Unavailable)
    }

    async fn accept<R>(&self, session: &mut SessionState, mut body: R) -> Reply
    where
        R: AsyncRead + Unpin + Send,
    {
        let buffer = session.buffer_mut();
        buffer.clear();

        if let Err(err) = body.read_to_end(buffer).await {
            internal!(
                level = WARN,
                "[{}] Failed to read message body: {err}",
                session.id()
            );
            return Reply::temporary("Error reading message body");
        }

        let dispatcher = match self.dispatcher() {
            Ok(dispatcher) => dispatcher,
            Err(err) => {
                internal!(level = ERROR, "[{}] Refusing message: {err}", session.id());
                return Reply::temporary(TRY_AGAIN);
            }
        };

        let options = ParseOptions {
            storage: &self.storage,
            connection_id: session.id(),
            include_raw: self.include_raw,
        };

        let parsed = match parse_message(session.buffer(), &options) {
            Ok(parsed) => parsed,
            Err(err) => {
                if err.is_malformed() {
                    internal!(
                        level = WARN,
                        "[{}] Unable to parse message: {err}",
                        session.id()
                    );
                } else {
                    internal!(
                        level = ERROR,
                        "[{}] Unable to store attachment: {err}",
                        session.id()
                    );
                }
                return Reply::new(
                    Status::TransactionFailed,
                    Some(EnhancedCode::CONTENT_INVALID),
                    "Error parsing message",
                );
            }
        };
        let spooled = parsed.spooled_paths();

        let email = EmailData::new(
            session.id(),
            session.remote_addr().to_string(),
            session.envelope(),
            session.auth_data(),
            parsed,
            Utc::now(),
        );

        internal!(
            level = INFO,
            "[{}] Email received from {:?} for {:?}: {:?} ({} bytes, {} attachments)",
            email.uuid,
            email.envelope.from,
            email.envelope.to,
            email.subject().unwrap_or_default(),
            session.buffer().len(),
            email.attachments.len()
        );

        let job = match encode(&email, &self.jobs) {
            Ok(job) => job,
            Err(err) => {
                internal!(
                    level = ERROR,
                    "[{}] Unable to encode job: {err}",
                    session.id()
                );
                storage::discard(&spooled);
                return Reply::temporary(TRY_AGAIN);
            }
        };
        let id = job.id().to_string();

        match dispatcher.push(job).await {
            Ok(()) => {
                internal!(level = INFO, "[{}] Queued as {id}", session.id());
                Reply::queued(&id)
            }
            Err(err) => {
                if err.is_transient() {
                    internal!(
                        level = WARN,
                        "[{}] Queue refused job {id}: {err}",
                        session.id()
                    );
                } else {
                    internal!(
                        level = ERROR,
                        "[{}] Unable to dispatch job {id}: {err}",
                        session.id()
                    );
                }
                storage::discard(&spooled);
                Reply::temporary(TRY_AGAIN)
            }
        }
    }
}
