use core::fmt::{self, Display, Formatter};

use crate::{
    command::{Command, HeloVariant},
    session_state::SessionState,
};

/// Client connected, no greeting yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connect;

/// After a successful EHLO
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ehlo {
    pub id: String,
}

/// After a successful HELO
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Helo {
    pub id: String,
}

/// Sender accepted, no recipients yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailFrom;

/// At least one recipient accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RcptTo;

/// Receiving the message body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Data;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quit;

/// A command that is not allowed in the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalid {
    pub reason: &'static str,
}

impl Display for Invalid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason)
    }
}

/// Where a session is in the SMTP dialogue.
///
/// `Helo` and `Ehlo` are the idle states between transactions; `MailFrom`,
/// `RcptTo` and `Data` make up a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Connect,
    Ehlo(Ehlo),
    Helo(Helo),
    MailFrom(MailFrom),
    RcptTo(RcptTo),
    Data(Data),
    Quit(Quit),
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "Connect",
            Self::Ehlo(_) => "Ehlo",
            Self::Helo(_) => "Helo",
            Self::MailFrom(_) => "MailFrom",
            Self::RcptTo(_) => "RcptTo",
            Self::Data(_) => "Data",
            Self::Quit(_) => "Quit",
        })
    }
}

impl State {
    /// The idle state for a session, derived from its greeting.
    #[must_use]
    pub fn idle(session: &SessionState) -> Self {
        match session.helo() {
            None => Self::Connect,
            Some(id) if session.is_extended() => Self::Ehlo(Ehlo { id: id.to_string() }),
            Some(id) => Self::Helo(Helo { id: id.to_string() }),
        }
    }

    /// Work out the state after `command`.
    ///
    /// Only ordering is decided here. The caller applies the effect of the
    /// command to the session once the transition is accepted.
    ///
    /// # Errors
    ///
    /// [`Invalid`] when the command is out of sequence. The current state is
    /// left as it was.
    pub fn transition(&self, command: &Command, session: &SessionState) -> Result<Self, Invalid> {
        match (self, command) {
            (_, Command::Quit) => Ok(Self::Quit(Quit)),

            (Self::Quit(_), _) => Err(Invalid {
                reason: "Session is closing",
            }),

            (Self::Data(_), _) => Err(Invalid {
                reason: "Message body in progress",
            }),

            (_, Command::Helo(HeloVariant::Ehlo(id))) => Ok(Self::Ehlo(Ehlo { id: id.clone() })),
            (_, Command::Helo(HeloVariant::Helo(id))) => Ok(Self::Helo(Helo { id: id.clone() })),

            (_, Command::Rset) => Ok(Self::idle(session)),

            (Self::Connect, Command::MailFrom(..)) => Err(Invalid {
                reason: "Send HELO/EHLO first",
            }),
            (Self::Ehlo(_) | Self::Helo(_), Command::MailFrom(..)) => Ok(Self::MailFrom(MailFrom)),
            (_, Command::MailFrom(..)) => Err(Invalid {
                reason: "Nested MAIL command",
            }),

            (Self::MailFrom(_) | Self::RcptTo(_), Command::RcptTo(_)) => Ok(Self::RcptTo(RcptTo)),
            (_, Command::RcptTo(_)) => Err(Invalid {
                reason: "Need MAIL before RCPT",
            }),

            (Self::RcptTo(_), Command::Data) => Ok(Self::Data(Data)),
            (Self::MailFrom(_), Command::Data) => Err(Invalid {
                reason: "Need RCPT before DATA",
            }),
            (_, Command::Data) => Err(Invalid {
                reason: "Need MAIL before DATA",
            }),

            (Self::Connect, Command::Auth(..)) => Err(Invalid {
                reason: "Send EHLO first",
            }),
            (_, Command::Auth(..)) if session.is_authenticated() => Err(Invalid {
                reason: "Already authenticated",
            }),
            (Self::Helo(_), Command::Auth(..)) => Err(Invalid {
                reason: "AUTH requires EHLO",
            }),
            (Self::Ehlo(_), Command::Auth(..)) => Ok(self.clone()),
            (_, Command::Auth(..)) => Err(Invalid {
                reason: "AUTH not permitted during a mail transaction",
            }),

            (_, Command::Noop | Command::Vrfy(_) | Command::Help | Command::StartTls) => {
                Ok(self.clone())
            }
        }
    }
}
