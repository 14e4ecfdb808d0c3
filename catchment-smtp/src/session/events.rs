use catchment_common::{
    error::SessionError,
    incoming, internal,
    status::{EnhancedCode, Status},
};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    command::{Command, HeloVariant},
    reply::Reply,
    session::{Event, Session},
};

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Session<Stream> {
    /// Handle one command line from the client.
    pub(super) async fn receive(&mut self, line: &str) -> Result<Event, SessionError> {
        let command = match Command::try_from(line) {
            Ok(command) => command,
            Err(err) => {
                incoming!("[{}] {line}", self.id());
                internal!(level = DEBUG, "[{}] {err}", self.id());
                self.connection.send(&err.reply()).await?;
                return Ok(Event::ConnectionKeepAlive);
            }
        };

        incoming!("[{}] {command}", self.id());

        let reply = match command {
            Command::Noop => Reply::ok("OK"),
            Command::Help => Reply::new(
                Status::HelpMessage,
                None,
                "Commands: HELO EHLO MAIL RCPT DATA RSET NOOP QUIT VRFY AUTH HELP",
            ),
            Command::Vrfy(_) => Reply::new(
                Status::CannotVerify,
                Some(EnhancedCode::CANNOT_VERIFY),
                "Cannot VRFY user, but will accept message and attempt delivery",
            ),
            Command::StartTls => Reply::new(
                Status::NotImplemented,
                Some(EnhancedCode::NOT_IMPLEMENTED),
                "STARTTLS not supported",
            ),
            command => return self.advance(command).await,
        };

        self.connection.send(&reply).await?;
        Ok(Event::ConnectionKeepAlive)
    }

    /// Commands that move the session through the dialogue.
    async fn advance(&mut self, command: Command) -> Result<Event, SessionError> {
        let next = match self.state.transition(&command, &self.context) {
            Ok(next) => next,
            Err(invalid) => {
                internal!(
                    level = DEBUG,
                    "[{}] {command} refused in state {}: {invalid}",
                    self.id(),
                    self.state
                );
                self.connection.send(&Reply::bad_sequence(invalid.reason)).await?;
                return Ok(Event::ConnectionKeepAlive);
            }
        };

        let reply = match command {
            Command::Helo(HeloVariant::Ehlo(id)) => {
                let reply = self.ehlo(&id);
                self.context.greet(id, true);
                reply
            }
            Command::Helo(HeloVariant::Helo(id)) => {
                let reply = Reply::new(
                    Status::Ok,
                    None,
                    format!("{} Hello {id}", self.config.hostname),
                );
                self.context.greet(id, false);
                reply
            }
            Command::MailFrom(from, params) => {
                let limit = self.config.max_message_size;
                if limit > 0 && params.size().is_some_and(|declared| declared > limit) {
                    self.connection.send(&Reply::message_too_big(limit)).await?;
                    return Ok(Event::ConnectionKeepAlive);
                }
                self.context.mail(from)
            }
            Command::RcptTo(to) => self.context.rcpt(to),
            Command::Rset => {
                self.context.reset();
                Reply::ok("Reset OK")
            }
            Command::Data => {
                self.state = next;
                return self.data().await;
            }
            Command::Auth(mechanism, initial) => {
                return self.authenticate(mechanism, initial).await;
            }
            Command::Quit => {
                self.state = next;
                self.connection
                    .send(&Reply::new(
                        Status::GoodBye,
                        Some(EnhancedCode::BYE),
                        "Bye",
                    ))
                    .await?;
                return Ok(Event::ConnectionClose);
            }
            Command::Noop | Command::Help | Command::Vrfy(_) | Command::StartTls => {
                Reply::ok("OK")
            }
        };

        self.state = next;
        self.connection.send(&reply).await?;
        Ok(Event::ConnectionKeepAlive)
    }

    fn ehlo(&self, id: &str) -> Reply {
        let mut lines = vec![format!("{} Hello {id}", self.config.hostname).into()];
        lines.extend(
            self.config
                .extensions
                .iter()
                .map(|extension| extension.to_string().into()),
        );

        Reply::multiline(Status::Ok, lines)
    }
}
