use core::fmt::{self, Display, Formatter};
use std::borrow::Cow;

use catchment_common::status::{EnhancedCode, Status};

/// A reply written back to the client.
///
/// Multi-line replies render as `250-first`, `250-second`, `250 last`. The
/// enhanced status code, when present, prefixes the text of every line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    status: Status,
    code: Option<EnhancedCode>,
    lines: Vec<Cow<'static, str>>,
}

impl Reply {
    #[must_use]
    pub fn new(
        status: Status,
        code: Option<EnhancedCode>,
        text: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            status,
            code,
            lines: vec![text.into()],
        }
    }

    #[must_use]
    pub fn multiline(status: Status, lines: Vec<Cow<'static, str>>) -> Self {
        Self {
            status,
            code: None,
            lines,
        }
    }

    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub const fn code(&self) -> Option<EnhancedCode> {
        self.code
    }

    /// The text of the last line.
    #[must_use]
    pub fn text(&self) -> &str {
        self.lines.last().map_or("", AsRef::as_ref)
    }

    pub fn ok(text: impl Into<Cow<'static, str>>) -> Self {
        Self::new(Status::Ok, Some(EnhancedCode::OK), text)
    }

    #[must_use]
    pub fn queued(id: &str) -> Self {
        Self::ok(format!("OK: queued as {id}"))
    }

    /// Any failure that the client should retry later.
    pub fn temporary(text: impl Into<Cow<'static, str>>) -> Self {
        Self::new(
            Status::ActionUnavailable,
            Some(EnhancedCode::SYSTEM_TRANSIENT),
            text,
        )
    }

    pub fn bad_sequence(text: impl Into<Cow<'static, str>>) -> Self {
        Self::new(
            Status::InvalidCommandSequence,
            Some(EnhancedCode::BAD_SEQUENCE),
            text,
        )
    }

    #[must_use]
    pub fn message_too_big(limit: usize) -> Self {
        Self::new(
            Status::ExceededStorage,
            Some(EnhancedCode::MESSAGE_TOO_BIG),
            format!("Message exceeds maximum size of {limit} bytes"),
        )
    }

    #[must_use]
    pub fn shutting_down() -> Self {
        Self::new(
            Status::Unavailable,
            Some(EnhancedCode::SYSTEM_TRANSIENT),
            "Service closing transmission channel",
        )
    }
}

impl Display for Reply {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        let last = self.lines.len().saturating_sub(1);

        for (index, line) in self.lines.iter().enumerate() {
            let separator = if index == last { ' ' } else { '-' };
            if index > 0 {
                fmt.write_str("\r\n")?;
            }

            match self.code {
                Some(code) => write!(fmt, "{}{separator}{code} {line}", self.status)?,
                None => write!(fmt, "{}{separator}{line}", self.status)?,
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use catchment_common::status::{EnhancedCode, Status};

    use super::Reply;

    #[test]
    fn single_line() {
        assert_eq!(Reply::queued("01ABC").to_string(), "250 2.0.0 OK: queued as 01ABC");
        assert_eq!(
            Reply::temporary("Temporary failure, try again later").to_string(),
            "451 4.3.0 Temporary failure, try again later"
        );
        assert_eq!(
            Reply::new(Status::ServiceReady, None, "localhost ESMTP").to_string(),
            "220 localhost ESMTP"
        );
    }

    #[test]
    fn multi_line() {
        let reply = Reply::multiline(
            Status::Ok,
            vec!["localhost greets you".into(), "SIZE 100".into(), "8BITMIME".into()],
        );

        assert_eq!(
            reply.to_string(),
            "250-localhost greets you\r\n250-SIZE 100\r\n250 8BITMIME"
        );
        assert_eq!(reply.text(), "8BITMIME");
    }

    #[test]
    fn accessors() {
        let reply = Reply::message_too_big(10);
        assert_eq!(reply.status(), Status::ExceededStorage);
        assert_eq!(reply.code(), Some(EnhancedCode::MESSAGE_TOO_BIG));
        assert_eq!(reply.status().to_string(), "552");
    }
}
