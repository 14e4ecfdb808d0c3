use core::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl Display for EmailAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            f.write_str(&self.email)
        } else {
            write!(f, "{} <{}>", self.name, self.email)
        }
    }
}

/// Where an attachment's decoded content lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentPayload {
    /// Base64 of the decoded bytes.
    Inline(String),
    /// File in the attachment spool directory holding the decoded bytes.
    Spooled(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content_id: Option<String>,
    /// Decoded size in bytes.
    pub size: usize,
    pub payload: AttachmentPayload,
}

impl Attachment {
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        match &self.payload {
            AttachmentPayload::Inline(content) => Some(content),
            AttachmentPayload::Spooled(_) => None,
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.payload {
            AttachmentPayload::Inline(_) => None,
            AttachmentPayload::Spooled(path) => Some(path),
        }
    }
}

/// A received message after MIME decomposition. Built once, never modified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMessage {
    pub id: Option<String>,
    pub subject: String,
    pub sender: Vec<EmailAddress>,
    pub recipients: Vec<EmailAddress>,
    pub ccs: Vec<EmailAddress>,
    pub reply_to: Vec<EmailAddress>,
    pub text_body: String,
    pub html_body: String,
    pub attachments: Vec<Attachment>,
    pub raw: Option<String>,
}

impl ParsedMessage {
    /// Files written to the spool for this message's attachments.
    #[must_use]
    pub fn spooled_paths(&self) -> Vec<PathBuf> {
        self.attachments
            .iter()
            .filter_map(Attachment::path)
            .map(Path::to_path_buf)
            .collect()
    }
}
