//! Parsing of fetched message parts.
//!
//! Parts arrive as raw, still transfer-encoded bytes; their MIME metadata comes
//! from BODYSTRUCTURE. [`parse_part`] rebuilds a minimal MIME entity from that
//! metadata so mailparse can decode transfer encoding and charset.

use crate::error::{Error, Result};
use crate::mailbox::{Disposition, MessagePart};
use mailparse::{parse_headers, parse_mail, DispositionType, MailHeaderMap, ParsedMail};
use tracing::debug;

/// Sender recorded when a message has no `From` header.
pub const NO_SENDER: &str = "(no sender)";
/// Subject recorded when a message has no `Subject` header.
pub const NO_SUBJECT: &str = "(no subject)";

/// One inline part of an unread message, decoded for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadMessage {
    /// UID of the message on the server.
    pub uid: u32,
    /// Decoded `From` header, or [`NO_SENDER`].
    pub sender: String,
    /// Decoded `Subject` header, or [`NO_SUBJECT`].
    pub subject: String,
    /// Plain-text body of the part (empty if none).
    pub plain_body: String,
    /// HTML body of the part (empty if none).
    pub html_body: String,
    /// Disposition of the part this was built from.
    pub disposition: Disposition,
}

/// Sender and subject of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Decoded `From` header, or [`NO_SENDER`].
    pub sender: String,
    /// Decoded `Subject` header, or [`NO_SUBJECT`].
    pub subject: String,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            sender: NO_SENDER.to_string(),
            subject: NO_SUBJECT.to_string(),
        }
    }
}

/// Reads sender and subject from a raw header block.
///
/// Unparseable headers yield the placeholders rather than an error.
#[must_use]
pub fn parse_envelope(raw_header: &[u8]) -> Envelope {
    let Ok((headers, _)) = parse_headers(raw_header) else {
        debug!("Unparseable header block, using placeholders");
        return Envelope::default();
    };

    let non_empty = |value: Option<String>| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    Envelope {
        sender: non_empty(headers.get_first_value("From")).unwrap_or_else(|| NO_SENDER.to_string()),
        subject: non_empty(headers.get_first_value("Subject"))
            .unwrap_or_else(|| NO_SUBJECT.to_string()),
    }
}

/// Decodes one fetched part into an [`UnreadMessage`].
///
/// `text/html` fills the HTML body, any other `text/*` the plain body, and
/// `message/rfc822` is parsed as a nested message whose first text bodies are
/// used. Other types produce empty bodies.
///
/// # Errors
///
/// Returns [`Error::ParseEmail`] or [`Error::ExtractBody`] if the part cannot
/// be decoded.
pub fn parse_part(
    uid: u32,
    envelope: &Envelope,
    part: &MessagePart,
    content: &[u8],
) -> Result<UnreadMessage> {
    let (plain_body, html_body) = match part.mime_type.as_str() {
        "message/rfc822" => {
            let nested = parse_mail(content).map_err(|source| Error::ParseEmail { source })?;
            (
                first_body(&nested, "text/plain")?.unwrap_or_default(),
                first_body(&nested, "text/html")?.unwrap_or_default(),
            )
        }
        mime if mime.starts_with("text/") => {
            let text = decode_leaf(part, content)?;
            if mime == "text/html" {
                (String::new(), text)
            } else {
                (text, String::new())
            }
        }
        _ => (String::new(), String::new()),
    };

    Ok(UnreadMessage {
        uid,
        sender: envelope.sender.clone(),
        subject: envelope.subject.clone(),
        plain_body,
        html_body,
        disposition: part.disposition.clone(),
    })
}

/// Wraps raw part content in headers built from its metadata and decodes it.
fn decode_leaf(part: &MessagePart, content: &[u8]) -> Result<String> {
    let charset = part.charset.as_deref().unwrap_or("us-ascii");
    let mut entity = format!(
        "Content-Type: {}; charset=\"{}\"\r\nContent-Transfer-Encoding: {}\r\n\r\n",
        part.mime_type, charset, part.transfer_encoding
    )
    .into_bytes();
    entity.extend_from_slice(content);

    let parsed = parse_mail(&entity).map_err(|source| Error::ParseEmail { source })?;
    parsed
        .get_body()
        .map_err(|source| Error::ExtractBody { source })
}

/// Finds the first non-attachment body of `mime_type` in a parsed message tree.
fn first_body(parsed: &ParsedMail<'_>, mime_type: &str) -> Result<Option<String>> {
    if parsed.get_content_disposition().disposition == DispositionType::Attachment {
        return Ok(None);
    }

    if parsed.subparts.is_empty() {
        if parsed.ctype.mimetype.eq_ignore_ascii_case(mime_type) {
            return parsed
                .get_body()
                .map(Some)
                .map_err(|source| Error::ExtractBody { source });
        }
        return Ok(None);
    }

    for subpart in &parsed.subparts {
        if let Some(body) = first_body(subpart, mime_type)? {
            return Ok(Some(body));
        }
    }
    Ok(None)
}
