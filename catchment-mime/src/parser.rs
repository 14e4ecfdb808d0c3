use mailparse::{MailAddr, MailHeader, MailHeaderMap, ParsedMail, SingleInfo};
use tracing::{debug, trace};

use crate::{
    decode,
    error::ParseError,
    message::{Attachment, EmailAddress, ParsedMessage},
    storage::{self, AttachmentStorage},
};

const DEFAULT_FILENAME: &str = "unnamed";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy)]
pub struct ParseOptions<'a> {
    pub storage: &'a AttachmentStorage,
    /// Used to name spooled attachment files.
    pub connection_id: &'a str,
    pub include_raw: bool,
}

/// Decompose a raw message.
///
/// Only the top level of a multipart message is walked: each part is either an
/// attachment (it has an `attachment` or `inline` disposition), a body part
/// (`text/plain`, `text/html` or no content type) or dropped. Nested
/// multiparts therefore contribute nothing.
///
/// # Errors
///
/// [`ParseError::Header`] if the header block is unparsable,
/// [`ParseError::Storage`] if a spooled attachment cannot be written.
pub fn parse_message(raw: &[u8], options: &ParseOptions<'_>) -> Result<ParsedMessage, ParseError> {
    let mail = mailparse::parse_mail(raw)?;
    let headers = &mail.headers;

    let mut message = ParsedMessage {
        id: headers
            .get_first_value("Message-ID")
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty()),
        subject: headers.get_first_value("Subject").unwrap_or_default(),
        sender: addresses(headers, "From"),
        recipients: addresses(headers, "To"),
        ccs: addresses(headers, "Cc"),
        reply_to: addresses(headers, "Reply-To"),
        raw: options
            .include_raw
            .then(|| String::from_utf8_lossy(raw).into_owned()),
        ..ParsedMessage::default()
    };

    if is_multipart(&mail) {
        for part in &mail.subparts {
            if let Err(err) = walk_part(part, options, &mut message) {
                storage::discard(&message.spooled_paths());
                return Err(err);
            }
        }
    } else {
        let text = decode::to_text(&decode::transfer_decoded(&mail), &mail.ctype.charset);
        if mail.ctype.mimetype == "text/html" {
            message.html_body = text;
        } else {
            message.text_body = text;
        }
    }

    debug!(
        subject = %message.subject,
        attachments = message.attachments.len(),
        "Parsed message"
    );

    Ok(message)
}

fn is_multipart(mail: &ParsedMail<'_>) -> bool {
    mail.ctype.mimetype.starts_with("multipart/") && mail.ctype.params.contains_key("boundary")
}

fn walk_part(
    part: &ParsedMail<'_>,
    options: &ParseOptions<'_>,
    message: &mut ParsedMessage,
) -> Result<(), ParseError> {
    if is_attachment(part) {
        message.attachments.push(attachment(part, options)?);
        return Ok(());
    }

    let declared = part.headers.get_first_value("Content-Type").is_some();
    match part.ctype.mimetype.as_str() {
        "text/html" => {
            let html = decode::to_text(&decode::transfer_decoded(part), &part.ctype.charset);
            message.html_body.push_str(&html);
        }
        mimetype if mimetype == "text/plain" || !declared => {
            let text = decode::to_text(&decode::transfer_decoded(part), &part.ctype.charset);
            if !message.text_body.is_empty() {
                message.text_body.push_str("\n\n");
            }
            message.text_body.push_str(&text);
        }
        other => trace!(content_type = other, "Dropping part"),
    }

    Ok(())
}

fn is_attachment(part: &ParsedMail<'_>) -> bool {
    part.headers
        .get_first_value("Content-Disposition")
        .is_some_and(|disposition| {
            let disposition = disposition.trim_start().to_ascii_lowercase();
            disposition.starts_with("attachment") || disposition.starts_with("inline")
        })
}

fn attachment(part: &ParsedMail<'_>, options: &ParseOptions<'_>) -> Result<Attachment, ParseError> {
    let disposition = part.get_content_disposition();
    let filename = disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string());

    let content_type = part
        .headers
        .get_first_value("Content-Type")
        .map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string()
        })
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    let content_id = part
        .headers
        .get_first_value("Content-ID")
        .map(|id| id.trim().trim_matches(['<', '>']).to_string())
        .filter(|id| !id.is_empty());

    let content = decode::attachment_decoded(part);
    let payload = options
        .storage
        .store(options.connection_id, &filename, &content)?;

    Ok(Attachment {
        filename,
        content_type,
        content_id,
        size: content.len(),
        payload,
    })
}

fn addresses(headers: &[MailHeader<'_>], key: &str) -> Vec<EmailAddress> {
    let Some(header) = headers.get_first_header(key) else {
        return Vec::new();
    };

    match mailparse::addrparse_header(header) {
        Ok(list) => list
            .iter()
            .flat_map(|addr| match addr {
                MailAddr::Single(info) => vec![address(info)],
                MailAddr::Group(group) => group.addrs.iter().map(address).collect(),
            })
            .collect(),
        Err(err) => {
            debug!(header = key, error = %err, "Ignoring malformed address header");
            Vec::new()
        }
    }
}

fn address(info: &SingleInfo) -> EmailAddress {
    EmailAddress {
        email: info.addr.clone(),
        name: info.display_name.clone().unwrap_or_default(),
    }
}
