use core::fmt::{self, Display, Formatter};

use ahash::AHashMap;
use catchment_common::status::{EnhancedCode, Status};
use thiserror::Error;

use crate::{auth::Mechanism, reply::Reply};

/// ESMTP parameters given after the MAIL FROM path (RFC 5321 Section 3.3).
///
/// Keys are stored uppercased. Only `SIZE` is acted on; everything else is
/// accepted and ignored.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct MailParameters {
    params: AHashMap<String, Option<String>>,
}

impl MailParameters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `KEY=VALUE` and `FLAG` tokens.
    ///
    /// # Errors
    ///
    /// A repeated parameter, or a `SIZE` that is not a positive integer.
    pub fn from_params_str(params: &str) -> Result<Self, String> {
        let mut parsed = Self::new();

        for token in params.split_whitespace() {
            let (key, value) = token
                .split_once('=')
                .map_or((token, None), |(key, value)| (key, Some(value)));
            let key = key.to_ascii_uppercase();

            if parsed.params.contains_key(&key) {
                return Err(format!("Duplicate parameter '{key}' not allowed"));
            }

            if key == "SIZE" {
                match value.map(str::parse::<usize>) {
                    Some(Ok(size)) if size > 0 => {}
                    _ => return Err(format!("Invalid SIZE value: {}", value.unwrap_or(""))),
                }
            }

            parsed.params.insert(key, value.map(str::to_string));
        }

        Ok(parsed)
    }

    /// Gets a parameter value by key (case-insensitive).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(&key.to_ascii_uppercase())?.as_deref()
    }

    /// The declared message size, if any.
    #[must_use]
    pub fn size(&self) -> Option<usize> {
        self.get("SIZE")?.parse().ok()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl Display for MailParameters {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.params.iter().collect();
        keys.sort_by(|a, b| a.0.cmp(b.0));

        for (index, (key, value)) in keys.into_iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }

            match value {
                None => f.write_str(key)?,
                Some(value) => write!(f, "{key}={value}")?,
            }
        }

        Ok(())
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum HeloVariant {
    Ehlo(String),
    Helo(String),
}

impl HeloVariant {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Ehlo(id) | Self::Helo(id) => id,
        }
    }
}

impl Display for HeloVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ehlo(_) => "EHLO",
            Self::Helo(_) => "HELO",
        })
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Command {
    Helo(HeloVariant),
    /// An empty address is the null reverse-path (`MAIL FROM:<>`).
    MailFrom(String, MailParameters),
    RcptTo(String),
    Data,
    Rset,
    Noop,
    Vrfy(String),
    Help,
    StartTls,
    /// The mechanism and an optional initial response.
    Auth(Mechanism, Option<String>),
    Quit,
}

impl Display for Command {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo(variant) => write!(fmt, "{variant} {}", variant.id()),
            Self::MailFrom(from, params) if params.is_empty() => write!(fmt, "MAIL FROM:<{from}>"),
            Self::MailFrom(from, params) => write!(fmt, "MAIL FROM:<{from}> {params}"),
            Self::RcptTo(to) => write!(fmt, "RCPT TO:<{to}>"),
            Self::Data => fmt.write_str("DATA"),
            Self::Rset => fmt.write_str("RSET"),
            Self::Noop => fmt.write_str("NOOP"),
            Self::Vrfy(target) => write!(fmt, "VRFY {target}"),
            Self::Help => fmt.write_str("HELP"),
            Self::StartTls => fmt.write_str("STARTTLS"),
            // Initial responses carry credentials, keep them out of logs
            Self::Auth(mechanism, Some(_)) => write!(fmt, "AUTH {mechanism} ****"),
            Self::Auth(mechanism, None) => write!(fmt, "AUTH {mechanism}"),
            Self::Quit => fmt.write_str("QUIT"),
        }
    }
}

/// Why a command line could not be turned into a [`Command`].
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CommandError {
    #[error("Command not recognized: {0}")]
    Unrecognised(String),

    #[error("Syntax error in {command}: {reason}")]
    Syntax {
        command: &'static str,
        reason: String,
    },

    #[error("Unrecognized authentication type {0}")]
    UnsupportedMechanism(String),
}

impl CommandError {
    fn syntax(command: &'static str, reason: impl Into<String>) -> Self {
        Self::Syntax {
            command,
            reason: reason.into(),
        }
    }

    /// The reply sent back for this error.
    #[must_use]
    pub fn reply(&self) -> Reply {
        match self {
            Self::Unrecognised(_) => Reply::new(
                Status::SyntaxError,
                Some(EnhancedCode::SYNTAX),
                "Command not recognized",
            ),
            Self::Syntax { reason, .. } => Reply::new(
                Status::ParameterError,
                Some(EnhancedCode::INVALID_ARGUMENTS),
                reason.clone(),
            ),
            Self::UnsupportedMechanism(_) => Reply::new(
                Status::ParameterNotImplemented,
                Some(EnhancedCode::INVALID_ARGUMENTS),
                "Unrecognized authentication type",
            ),
        }
    }
}

/// Split `<path> params` into the address inside the brackets and whatever
/// follows. Bare addresses without brackets are tolerated.
fn path(argument: &str) -> Result<(&str, &str), String> {
    let argument = argument.trim_start();

    if let Some(rest) = argument.strip_prefix('<') {
        let end = rest
            .find('>')
            .ok_or_else(|| String::from("Unterminated address, expected '>'"))?;
        Ok((rest[..end].trim(), rest[end + 1..].trim()))
    } else {
        let (address, rest) = argument
            .split_once(char::is_whitespace)
            .unwrap_or((argument, ""));
        Ok((address, rest.trim()))
    }
}

/// Strip a case-insensitive `prefix` from `value`.
fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(line: &str) -> Result<Self, Self::Error> {
        let trimmed = line.trim();
        let (verb, argument) = trimmed
            .split_once(char::is_whitespace)
            .map_or((trimmed, ""), |(verb, argument)| (verb, argument.trim()));

        match verb.to_ascii_uppercase().as_str() {
            "HELO" | "EHLO" if argument.is_empty() => Err(CommandError::syntax(
                "HELO",
                format!("Expected hostname in {trimmed}"),
            )),
            "HELO" => Ok(Self::Helo(HeloVariant::Helo(argument.to_string()))),
            "EHLO" => Ok(Self::Helo(HeloVariant::Ehlo(argument.to_string()))),
            "MAIL" => {
                let rest = strip_prefix_ignore_case(argument, "FROM:")
                    .ok_or_else(|| CommandError::syntax("MAIL", "Expected MAIL FROM:<address>"))?;
                let (address, params) =
                    path(rest).map_err(|reason| CommandError::syntax("MAIL", reason))?;
                let params = MailParameters::from_params_str(params)
                    .map_err(|reason| CommandError::syntax("MAIL", reason))?;

                Ok(Self::MailFrom(address.to_string(), params))
            }
            "RCPT" => {
                let rest = strip_prefix_ignore_case(argument, "TO:")
                    .ok_or_else(|| CommandError::syntax("RCPT", "Expected RCPT TO:<address>"))?;
                let (address, _) =
                    path(rest).map_err(|reason| CommandError::syntax("RCPT", reason))?;

                if address.is_empty() {
                    return Err(CommandError::syntax("RCPT", "Recipient address is required"));
                }

                Ok(Self::RcptTo(address.to_string()))
            }
            "DATA" => Ok(Self::Data),
            "RSET" => Ok(Self::Rset),
            "NOOP" => Ok(Self::Noop),
            "VRFY" => Ok(Self::Vrfy(argument.to_string())),
            "HELP" => Ok(Self::Help),
            "STARTTLS" => Ok(Self::StartTls),
            "QUIT" => Ok(Self::Quit),
            "AUTH" => {
                let (mechanism, initial) = argument
                    .split_once(char::is_whitespace)
                    .map_or((argument, None), |(mechanism, initial)| {
                        (mechanism, Some(initial.trim().to_string()))
                    });

                if mechanism.is_empty() {
                    return Err(CommandError::syntax("AUTH", "Expected a mechanism"));
                }

                let mechanism = mechanism
                    .parse::<Mechanism>()
                    .map_err(|()| CommandError::UnsupportedMechanism(mechanism.to_string()))?;

                Ok(Self::Auth(mechanism, initial))
            }
            _ => Err(CommandError::Unrecognised(trimmed.to_string())),
        }
    }
}
