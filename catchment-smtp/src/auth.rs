//! SASL exchanges for `AUTH PLAIN` and `AUTH LOGIN` (RFC 4954).
//!
//! Credentials are never checked. Every completed exchange succeeds and the
//! decoded username and password are recorded for the job payload.

use core::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use base64::prelude::*;
use thiserror::Error;

/// `Username:` and `Password:`, base64 encoded.
const USERNAME_CHALLENGE: &str = "VXNlcm5hbWU6";
const PASSWORD_CHALLENGE: &str = "UGFzc3dvcmQ6";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    Plain,
    Login,
}

impl Mechanism {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        }
    }
}

impl Display for Mechanism {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mechanism {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("PLAIN") {
            Ok(Self::Plain)
        } else if value.eq_ignore_ascii_case("LOGIN") {
            Ok(Self::Login)
        } else {
            Err(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub mechanism: Mechanism,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication cancelled")]
    Cancelled,

    #[error("Invalid base64 data")]
    InvalidEncoding,

    #[error("Malformed {0} response")]
    Malformed(Mechanism),
}

/// What to do next in an exchange.
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    /// Send `334 <challenge>` and feed the client's next line to the exchange.
    Continue(Exchange, &'static str),
    Done(Credentials),
}

/// An exchange waiting on the client.
#[derive(Debug, PartialEq, Eq)]
pub struct Exchange {
    pending: Pending,
}

#[derive(Debug, PartialEq, Eq)]
enum Pending {
    Plain,
    LoginUsername,
    LoginPassword(String),
}

fn decode(line: &str) -> Result<String, AuthError> {
    let line = line.trim();
    if line == "*" {
        return Err(AuthError::Cancelled);
    }

    // A lone "=" is an empty initial response
    if line == "=" {
        return Ok(String::new());
    }

    BASE64_STANDARD
        .decode(line)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .map_err(|_| AuthError::InvalidEncoding)
}

/// `authzid NUL authcid NUL passwd`, the authorisation identity is ignored.
fn plain(decoded: &str) -> Result<Credentials, AuthError> {
    let mut fields = decoded.split('\0');
    match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (Some(_), Some(username), Some(password), None) => Ok(Credentials {
            mechanism: Mechanism::Plain,
            username: username.to_string(),
            password: password.to_string(),
        }),
        _ => Err(AuthError::Malformed(Mechanism::Plain)),
    }
}

/// Begin an exchange for `mechanism`, consuming the initial response if one
/// was sent with the command.
///
/// # Errors
///
/// If the initial response cancels the exchange or cannot be decoded.
pub fn start(mechanism: Mechanism, initial: Option<&str>) -> Result<Step, AuthError> {
    let pending = match mechanism {
        Mechanism::Plain => Pending::Plain,
        Mechanism::Login => Pending::LoginUsername,
    };
    let exchange = Exchange { pending };

    match initial {
        Some(initial) => exchange.respond(initial),
        None => Ok(exchange.challenge()),
    }
}

impl Exchange {
    fn challenge(self) -> Step {
        let challenge = match self.pending {
            Pending::Plain => "",
            Pending::LoginUsername => USERNAME_CHALLENGE,
            Pending::LoginPassword(_) => PASSWORD_CHALLENGE,
        };

        Step::Continue(self, challenge)
    }

    /// Feed one client line into the exchange.
    ///
    /// # Errors
    ///
    /// If the client cancelled with `*`, or sent something that is not valid
    /// for the current step.
    pub fn respond(self, line: &str) -> Result<Step, AuthError> {
        let decoded = decode(line)?;

        match self.pending {
            Pending::Plain => plain(&decoded).map(Step::Done),
            Pending::LoginUsername => Ok(Self {
                pending: Pending::LoginPassword(decoded),
            }
            .challenge()),
            Pending::LoginPassword(username) => Ok(Step::Done(Credentials {
                mechanism: Mechanism::Login,
                username,
                password: decoded,
            })),
        }
    }
}

#[cfg(test)]
mod test {
    use base64::prelude::*;
    use pretty_assertions::assert_eq;

    use super::*;

    fn done(step: Result<Step, AuthError>) -> Credentials {
        match step {
            Ok(Step::Done(credentials)) => credentials,
            other => panic!("Expected a finished exchange, got {other:?}"),
        }
    }

    fn next(step: Result<Step, AuthError>, expected: &str) -> Exchange {
        match step {
            Ok(Step::Continue(exchange, challenge)) => {
                assert_eq!(challenge, expected);
                exchange
            }
            other => panic!("Expected a challenge, got {other:?}"),
        }
    }

    #[test]
    fn plain_with_initial_response() {
        let initial = BASE64_STANDARD.encode("\0alice\0secret");
        let credentials = done(start(Mechanism::Plain, Some(&initial)));

        assert_eq!(
            credentials,
            Credentials {
                mechanism: Mechanism::Plain,
                username: "alice".into(),
                password: "secret".into(),
            }
        );
    }

    #[test]
    fn plain_after_empty_challenge() {
        let exchange = next(start(Mechanism::Plain, None), "");
        let credentials = done(exchange.respond(&BASE64_STANDARD.encode("admin\0bob\0pw")));

        assert_eq!(credentials.username, "bob");
        assert_eq!(credentials.password, "pw");
    }

    #[test]
    fn login() {
        let exchange = next(start(Mechanism::Login, None), USERNAME_CHALLENGE);
        let exchange = next(
            exchange.respond(&BASE64_STANDARD.encode("carol")),
            PASSWORD_CHALLENGE,
        );
        let credentials = done(exchange.respond(&BASE64_STANDARD.encode("hunter2")));

        assert_eq!(credentials.mechanism, Mechanism::Login);
        assert_eq!(credentials.username, "carol");
        assert_eq!(credentials.password, "hunter2");
    }

    #[test]
    fn login_with_initial_username() {
        let exchange = next(
            start(Mechanism::Login, Some(&BASE64_STANDARD.encode("dave"))),
            PASSWORD_CHALLENGE,
        );
        assert_eq!(done(exchange.respond("cHc=")).username, "dave");
    }

    #[test]
    fn cancel_and_bad_encoding() {
        let exchange = next(start(Mechanism::Login, None), USERNAME_CHALLENGE);
        assert_eq!(exchange.respond("*"), Err(AuthError::Cancelled));

        assert_eq!(
            start(Mechanism::Plain, Some("not base64!")),
            Err(AuthError::InvalidEncoding)
        );
        assert_eq!(
            start(Mechanism::Plain, Some(&BASE64_STANDARD.encode("no separators"))),
            Err(AuthError::Malformed(Mechanism::Plain))
        );
    }

    #[test]
    fn mechanism_names() {
        assert_eq!("plain".parse(), Ok(Mechanism::Plain));
        assert_eq!("LOGIN".parse(), Ok(Mechanism::Login));
        assert_eq!("XOAUTH2".parse::<Mechanism>(), Err(()));
        assert_eq!(Mechanism::Login.to_string(), "LOGIN");
    }
}
