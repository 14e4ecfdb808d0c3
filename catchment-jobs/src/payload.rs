//! The record delivered to queue consumers. Field names are part of the wire
//! contract and must not change.

use std::collections::BTreeMap;

use catchment_mime::{Attachment, AttachmentPayload, EmailAddress, ParsedMessage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const EVENT_EMAIL_RECEIVED: &str = "EMAIL_RECEIVED";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailData {
    pub event: String,
    /// Connection id of the session that received the message.
    pub uuid: String,
    pub remote_addr: String,
    pub received_at: DateTime<Utc>,
    pub envelope: EnvelopeData,
    pub authentication: AuthData,
    pub message: MessageData,
    pub attachments: Vec<AttachmentData>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeData {
    pub from: String,
    pub to: Vec<String>,
    pub helo: String,
}

/// Credentials as the client sent them. Never checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthData {
    pub attempted: bool,
    pub mechanism: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub headers: BTreeMap<String, Vec<String>>,
    /// Plain text body, or the HTML body when the message has no plain part.
    pub body: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub html_body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentData {
    pub filename: String,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    pub size: usize,
    /// Base64 content, present in memory mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Spool file, present in spooled mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl From<Attachment> for AttachmentData {
    fn from(attachment: Attachment) -> Self {
        let (content, path) = match attachment.payload {
            AttachmentPayload::Inline(content) => (Some(content), None),
            AttachmentPayload::Spooled(path) => (None, Some(path.display().to_string())),
        };

        Self {
            filename: attachment.filename,
            content_type: attachment.content_type,
            content_id: attachment.content_id,
            size: attachment.size,
            content,
            path,
        }
    }
}

fn rendered(addresses: &[EmailAddress]) -> Vec<String> {
    addresses.iter().map(ToString::to_string).collect()
}

impl From<ParsedMessage> for MessageData {
    fn from(parsed: ParsedMessage) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Subject".to_string(), vec![parsed.subject]);

        if let Some(id) = &parsed.id {
            headers.insert("Message-ID".to_string(), vec![id.clone()]);
        }

        for (name, addresses) in [
            ("From", &parsed.sender),
            ("To", &parsed.recipients),
            ("Cc", &parsed.ccs),
            ("Reply-To", &parsed.reply_to),
        ] {
            if !addresses.is_empty() {
                headers.insert(name.to_string(), rendered(addresses));
            }
        }

        let (body, html_body) = if parsed.text_body.is_empty() {
            (parsed.html_body.clone(), parsed.html_body)
        } else {
            (parsed.text_body, parsed.html_body)
        };

        Self {
            id: parsed.id,
            headers,
            body,
            html_body,
            raw: parsed.raw,
        }
    }
}

impl EmailData {
    /// Assemble the record for one accepted message.
    #[must_use]
    pub fn new(
        uuid: impl Into<String>,
        remote_addr: impl Into<String>,
        envelope: EnvelopeData,
        authentication: AuthData,
        mut parsed: ParsedMessage,
        received_at: DateTime<Utc>,
    ) -> Self {
        let attachments = std::mem::take(&mut parsed.attachments)
            .into_iter()
            .map(AttachmentData::from)
            .collect();

        Self {
            event: EVENT_EMAIL_RECEIVED.to_string(),
            uuid: uuid.into(),
            remote_addr: remote_addr.into(),
            received_at,
            envelope,
            authentication,
            message: MessageData::from(parsed),
            attachments,
        }
    }

    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.message
            .headers
            .get("Subject")
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}
