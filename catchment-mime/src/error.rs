use std::{io, path::PathBuf};

use thiserror::Error;

/// Reasons a message could not be decomposed.
///
/// Everything else in a message is handled best-effort: malformed address
/// headers become empty lists, undecodable bodies fall back to their raw bytes
/// and unrecognised parts are dropped.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The header block could not be parsed at all.
    #[error("Unable to parse message headers: {0}")]
    Header(#[from] mailparse::MailParseError),

    /// A spooled attachment could not be written.
    #[error("Unable to store attachment {filename} in {}: {source}", .dir.display())]
    Storage {
        filename: String,
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ParseError {
    /// Returns `true` if the message itself is at fault, rather than local storage.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Header(_))
    }
}
