use catchment_common::{
    error::SessionError,
    internal,
    status::{EnhancedCode, Status},
};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    State,
    auth::{self, AuthError, Mechanism, Step},
    reply::Reply,
    session::{Event, Session},
};

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Session<Stream> {
    /// Receive a message body after `DATA` and queue it.
    ///
    /// A body over the size limit is skipped up to its terminator so the
    /// client can carry on with the next transaction.
    pub(super) async fn data(&mut self) -> Result<Event, SessionError> {
        self.connection
            .send(&Reply::new(
                Status::StartMailInput,
                None,
                "End data with <CR><LF>.<CR><LF>",
            ))
            .await?;

        let limit = self.config.max_message_size;
        let mut reader = self.connection.data_reader(limit);
        let mut reply = self.handler.data(&mut self.context, &mut reader).await;

        if !reader.is_finished() {
            reader.drain().await?;
        }

        if reader.exceeded() {
            internal!(
                level = INFO,
                "[{}] Refused message over {limit} bytes",
                self.context.id()
            );
            reply = Reply::message_too_big(limit);
        }
        drop(reader);

        self.state = State::idle(&self.context);
        self.connection.send(&reply).await?;

        Ok(Event::ConnectionKeepAlive)
    }

    /// Run a SASL exchange. Credentials are recorded, never checked.
    pub(super) async fn authenticate(
        &mut self,
        mechanism: Mechanism,
        initial: Option<String>,
    ) -> Result<Event, SessionError> {
        let mut step = auth::start(mechanism, initial.as_deref());

        loop {
            match step {
                Ok(Step::Done(credentials)) => {
                    internal!(
                        level = INFO,
                        "[{}] Authenticated as {:?} using {mechanism}",
                        self.context.id(),
                        credentials.username
                    );
                    let reply = self.context.authenticate(credentials);
                    self.connection.send(&reply).await?;
                    return Ok(Event::ConnectionKeepAlive);
                }
                Ok(Step::Continue(exchange, challenge)) => {
                    self.connection
                        .send(&Reply::new(Status::AuthContinue, None, challenge))
                        .await?;

                    let Some(line) = self.connection.read_line().await? else {
                        return Ok(Event::ConnectionClose);
                    };
                    step = exchange.respond(&line);
                }
                Err(err) => {
                    internal!(
                        level = DEBUG,
                        "[{}] AUTH {mechanism} failed: {err}",
                        self.context.id()
                    );

                    let code = match &err {
                        AuthError::Cancelled => EnhancedCode::ABORTED,
                        AuthError::InvalidEncoding | AuthError::Malformed(_) => {
                            EnhancedCode::SYNTAX
                        }
                    };
                    self.connection
                        .send(&Reply::new(
                            Status::ParameterError,
                            Some(code),
                            err.to_string(),
                        ))
                        .await?;
                    return Ok(Event::ConnectionKeepAlive);
                }
            }
        }
    }
}
