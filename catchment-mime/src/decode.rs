use mailparse::{ParsedMail, body::Body};
use tracing::debug;

/// Body bytes with base64 or quoted-printable removed. Any other transfer
/// encoding passes through, as does content that fails to decode.
pub(crate) fn transfer_decoded(part: &ParsedMail<'_>) -> Vec<u8> {
    match part.get_body_encoded() {
        Body::Base64(body) | Body::QuotedPrintable(body) => {
            body.get_decoded().unwrap_or_else(|err| {
                debug!(error = %err, "Falling back to raw body");
                body.get_raw().to_vec()
            })
        }
        Body::SevenBit(body) | Body::EightBit(body) => body.get_raw().to_vec(),
        Body::Binary(body) => body.get_raw().to_vec(),
    }
}

/// Attachment bytes. Only base64 is undone here; quoted-printable attachments
/// are kept as sent.
pub(crate) fn attachment_decoded(part: &ParsedMail<'_>) -> Vec<u8> {
    match part.get_body_encoded() {
        Body::Base64(body) => body.get_decoded().unwrap_or_else(|err| {
            debug!(error = %err, "Keeping undecodable attachment as-is");
            body.get_raw().to_vec()
        }),
        Body::QuotedPrintable(body) => body.get_raw().to_vec(),
        Body::SevenBit(body) | Body::EightBit(body) => body.get_raw().to_vec(),
        Body::Binary(body) => body.get_raw().to_vec(),
    }
}

/// Convert decoded text to UTF-8 using the part's declared charset.
pub(crate) fn to_text(bytes: &[u8], charset: &str) -> String {
    let label = charset.trim();
    let passthrough = ["", "us-ascii", "ascii", "utf-8", "utf8"]
        .iter()
        .any(|known| label.eq_ignore_ascii_case(known));

    if passthrough {
        return String::from_utf8_lossy(bytes).into_owned();
    }

    charset::Charset::for_label(label.as_bytes()).map_or_else(
        || String::from_utf8_lossy(bytes).into_owned(),
        |charset| charset.decode_without_bom_handling(bytes).0.into_owned(),
    )
}
