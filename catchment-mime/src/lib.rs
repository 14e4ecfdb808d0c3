//! MIME decomposition of received messages.
//!
//! [`parse_message`] turns the raw bytes of a message into a [`ParsedMessage`]:
//! single-valued headers, address lists, text and HTML bodies and the
//! attachments found among the top-level parts. Attachment content either
//! stays in memory as base64 or is written to the spool directory, depending
//! on the configured [`AttachmentStorage`].

mod decode;
pub mod error;
pub mod message;
mod parser;
pub mod storage;

pub use error::ParseError;
pub use message::{Attachment, AttachmentPayload, EmailAddress, ParsedMessage};
pub use parser::{ParseOptions, parse_message};
pub use storage::AttachmentStorage;
