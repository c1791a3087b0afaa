//! Mail-retrieval seam used by the extraction engine.
//!
//! [`MailConnector`] opens an authenticated session for one mailbox with the
//! INBOX already selected; [`MailSession`] exposes the handful of IMAP
//! operations the engine needs. The production implementation lives in
//! [`crate::ImapConnector`]; tests substitute scripted sessions.

use crate::error::Result;
use crate::store::MailboxCredential;
use async_trait::async_trait;

/// Opens mail sessions for individual mailboxes.
#[async_trait]
pub trait MailConnector: Send + Sync {
    /// Connects, authenticates and selects the inbox for `credential`.
    async fn open(&self, credential: &MailboxCredential) -> Result<Box<dyn MailSession>>;
}

/// An open, authenticated session with the inbox selected.
#[async_trait]
pub trait MailSession: Send {
    /// UIDs of messages without the `\Seen` flag, in server order.
    async fn unseen_uids(&mut self) -> Result<Vec<u32>>;

    /// Leaf parts of the message's MIME tree, in document order.
    async fn message_parts(&mut self, uid: u32) -> Result<Vec<MessagePart>>;

    /// Raw RFC 5322 header block of the message.
    async fn message_header(&mut self, uid: u32) -> Result<Vec<u8>>;

    /// Raw (still transfer-encoded) content of one part.
    ///
    /// Must not set the `\Seen` flag.
    async fn part_content(&mut self, uid: u32, section: &str) -> Result<Vec<u8>>;

    /// Sets the `\Seen` flag on the message.
    async fn mark_seen(&mut self, uid: u32) -> Result<()>;

    /// Ends the session.
    async fn logout(&mut self) -> Result<()>;
}

/// Content-Disposition of a MIME part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// No Content-Disposition header.
    Absent,
    /// `inline`.
    Inline,
    /// `attachment`.
    Attachment,
    /// Any other disposition token, lowercased.
    Other(String),
}

impl Disposition {
    /// Parses a disposition token such as `"INLINE"` or `"attachment"`.
    #[must_use]
    pub fn from_token(token: Option<&str>) -> Self {
        match token.map(|t| t.trim().to_ascii_lowercase()) {
            None => Disposition::Absent,
            Some(t) if t.is_empty() => Disposition::Absent,
            Some(t) if t == "inline" => Disposition::Inline,
            Some(t) if t == "attachment" => Disposition::Attachment,
            Some(t) => Disposition::Other(t),
        }
    }

    /// `true` for parts that are read as message content rather than skipped.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        matches!(self, Disposition::Absent | Disposition::Inline)
    }
}

/// One leaf of a message's MIME structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePart {
    /// IMAP section specifier, e.g. `1` or `2.1`.
    pub section: String,
    /// Lowercased `type/subtype`.
    pub mime_type: String,
    /// Declared charset, if any.
    pub charset: Option<String>,
    /// Lowercased Content-Transfer-Encoding (`7bit`, `base64`, ...).
    pub transfer_encoding: String,
    /// Content-Disposition of the part.
    pub disposition: Disposition,
}

impl MessagePart {
    /// A `text/plain`, UTF-8, 7bit part with no disposition.
    #[must_use]
    pub fn plain(section: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            mime_type: "text/plain".to_string(),
            charset: Some("utf-8".to_string()),
            transfer_encoding: "7bit".to_string(),
            disposition: Disposition::Absent,
        }
    }

    /// Returns `true` if the part should be inspected for an OTP.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        self.disposition.is_inline()
    }
}

/// A node of a BODYSTRUCTURE tree, independent of the IMAP parser's types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MimeNode {
    /// A multipart container.
    Multipart(Vec<MimeNode>),
    /// A single part; its section is assigned when flattening.
    Leaf(LeafInfo),
}

/// Metadata of a single part before it has a section number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LeafInfo {
    pub mime_type: String,
    pub charset: Option<String>,
    pub transfer_encoding: String,
    pub disposition: Disposition,
}

impl LeafInfo {
    fn into_part(self, section: String) -> MessagePart {
        MessagePart {
            section,
            mime_type: self.mime_type,
            charset: self.charset,
            transfer_encoding: self.transfer_encoding,
            disposition: self.disposition,
        }
    }
}

/// Flattens a structure tree into leaf parts with IMAP section numbers.
///
/// A non-multipart message has the single section `1`; children of a
/// multipart are numbered from 1 under their parent's prefix.
pub(crate) fn flatten_parts(root: MimeNode) -> Vec<MessagePart> {
    let mut parts = Vec::new();
    match root {
        MimeNode::Leaf(info) => parts.push(info.into_part("1".to_string())),
        MimeNode::Multipart(children) => collect_children(children, "", &mut parts),
    }
    parts
}

fn collect_children(children: Vec<MimeNode>, prefix: &str, parts: &mut Vec<MessagePart>) {
    for (index, child) in children.into_iter().enumerate() {
        let section = if prefix.is_empty() {
            (index + 1).to_string()
        } else {
            format!("{prefix}.{}", index + 1)
        };
        match child {
            MimeNode::Leaf(info) => parts.push(info.into_part(section)),
            MimeNode::Multipart(grandchildren) => collect_children(grandchildren, &section, parts),
        }
    }
}
