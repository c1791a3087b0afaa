//! IMAP commands used by [`crate::ImapMailbox`].
//!
//! Header and part fetches use `BODY.PEEK`, so inspecting a message never sets `\Seen`.

use crate::connection::TlsStream;
use crate::error::{Error, Result};
use crate::mailbox::{flatten_parts, Disposition, LeafInfo, MessagePart, MimeNode};
use async_imap::types::Fetch;
use async_imap::Session;
use futures::TryStreamExt;
use imap_proto::types::{
    BodyContentCommon, BodyContentSinglePart, BodyStructure, ContentEncoding, SectionPath,
};
use tracing::{debug, instrument};

/// Type alias for IMAP session over TLS.
pub(crate) type ImapSession = Session<TlsStream>;

/// Authenticates to IMAP server and returns a session.
#[instrument(name = "session::authenticate", skip_all, fields(email = %email))]
pub(crate) async fn authenticate(
    tls_stream: TlsStream,
    email: &str,
    password: &str,
) -> Result<ImapSession> {
    let client = async_imap::Client::new(tls_stream);

    debug!("Authenticating to IMAP server");

    client
        .login(email, password)
        .await
        .map_err(|e| Error::ImapLogin {
            email: email.to_string(),
            source: e.0,
        })
}

/// Selects a mailbox (typically "INBOX").
#[instrument(name = "session::select", skip(session), fields(mailbox = %mailbox))]
pub(crate) async fn select_mailbox(session: &mut ImapSession, mailbox: &str) -> Result<()> {
    debug!("Selecting mailbox");

    session
        .select(mailbox)
        .await
        .map_err(|source| Error::SelectMailbox {
            mailbox: mailbox.to_string(),
            source,
        })?;

    Ok(())
}

/// Searches for UIDs of unread messages, ascending.
#[instrument(name = "session::search_unseen", skip(session))]
pub(crate) async fn search_unseen(session: &mut ImapSession) -> Result<Vec<u32>> {
    let uids = session
        .uid_search("UNSEEN")
        .await
        .map_err(|source| Error::ImapSearch { source })?;

    let mut uids: Vec<u32> = uids.into_iter().collect();
    uids.sort_unstable();

    debug!(uid_count = uids.len(), "Found unseen messages");

    Ok(uids)
}

/// Fetches one data item for a single UID and collects the responses.
async fn fetch_item(session: &mut ImapSession, uid: u32, item: &str) -> Result<Vec<Fetch>> {
    let map_err = |source| Error::ImapFetch {
        uid,
        item: item.to_string(),
        source,
    };

    session
        .uid_fetch(uid.to_string(), item)
        .await
        .map_err(map_err)?
        .try_collect()
        .await
        .map_err(map_err)
}

/// Fetches BODYSTRUCTURE and returns the message's leaf parts.
#[instrument(name = "session::fetch_structure", skip(session))]
pub(crate) async fn fetch_structure(session: &mut ImapSession, uid: u32) -> Result<Vec<MessagePart>> {
    let fetches = fetch_item(session, uid, "BODYSTRUCTURE").await?;

    let node = fetches
        .iter()
        .find_map(Fetch::bodystructure)
        .map(to_mime_node)
        .ok_or_else(|| Error::MissingFetchData {
            uid,
            item: "BODYSTRUCTURE".to_string(),
        })?;

    let parts = flatten_parts(node);
    debug!(part_count = parts.len(), "Fetched body structure");
    Ok(parts)
}

/// Fetches the message header without setting `\Seen`.
#[instrument(name = "session::fetch_header", skip(session))]
pub(crate) async fn fetch_header(session: &mut ImapSession, uid: u32) -> Result<Vec<u8>> {
    let fetches = fetch_item(session, uid, "BODY.PEEK[HEADER]").await?;

    fetches
        .iter()
        .find_map(|fetch| fetch.header().map(<[u8]>::to_vec))
        .ok_or_else(|| Error::MissingFetchData {
            uid,
            item: "BODY[HEADER]".to_string(),
        })
}

/// Fetches the raw content of one part without setting `\Seen`.
#[instrument(name = "session::fetch_part", skip(session))]
pub(crate) async fn fetch_part(
    session: &mut ImapSession,
    uid: u32,
    section: &str,
) -> Result<Vec<u8>> {
    let path = SectionPath::Part(section_numbers(section), None);
    let fetches = fetch_item(session, uid, &format!("BODY.PEEK[{section}]")).await?;

    fetches
        .iter()
        .find_map(|fetch| fetch.section(&path).map(<[u8]>::to_vec))
        .ok_or_else(|| Error::MissingFetchData {
            uid,
            item: format!("BODY[{section}]"),
        })
}

/// Adds the `\Seen` flag to a message.
#[instrument(name = "session::mark_seen", skip(session))]
pub(crate) async fn mark_seen(session: &mut ImapSession, uid: u32) -> Result<()> {
    let map_err = |source| Error::ImapStore { uid, source };

    let _updates: Vec<Fetch> = session
        .uid_store(uid.to_string(), "+FLAGS (\\Seen)")
        .await
        .map_err(map_err)?
        .try_collect()
        .await
        .map_err(map_err)?;

    debug!("Marked message as seen");
    Ok(())
}

/// Logs out from IMAP session.
#[instrument(name = "session::logout", skip(session))]
pub(crate) async fn logout(session: &mut ImapSession) -> Result<()> {
    debug!("Logging out");

    session
        .logout()
        .await
        .map_err(|source| Error::ImapLogout { source })?;

    Ok(())
}

/// Converts a section specifier such as `2.1` into part numbers.
fn section_numbers(section: &str) -> Vec<u32> {
    section
        .split('.')
        .filter_map(|n| n.parse().ok())
        .collect()
}

fn to_mime_node(structure: &BodyStructure<'_>) -> MimeNode {
    match structure {
        BodyStructure::Multipart { bodies, .. } => {
            MimeNode::Multipart(bodies.iter().map(to_mime_node).collect())
        }
        BodyStructure::Basic { common, other, .. }
        | BodyStructure::Text { common, other, .. }
        | BodyStructure::Message { common, other, .. } => {
            MimeNode::Leaf(leaf_info(common, other))
        }
    }
}

fn leaf_info(common: &BodyContentCommon<'_>, other: &BodyContentSinglePart<'_>) -> LeafInfo {
    let charset = common.ty.params.as_ref().and_then(|params| {
        params
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("charset"))
            .map(|(_, value)| value.to_string())
    });

    let transfer_encoding = match &other.transfer_encoding {
        ContentEncoding::SevenBit => "7bit".to_string(),
        ContentEncoding::EightBit => "8bit".to_string(),
        ContentEncoding::Binary => "binary".to_string(),
        ContentEncoding::Base64 => "base64".to_string(),
        ContentEncoding::QuotedPrintable => "quoted-printable".to_string(),
        ContentEncoding::Other(name) => name.to_ascii_lowercase(),
    };

    LeafInfo {
        mime_type: format!("{}/{}", common.ty.ty, common.ty.subtype).to_ascii_lowercase(),
        charset,
        transfer_encoding,
        disposition: Disposition::from_token(common.disposition.as_ref().map(|d| d.ty.as_ref())),
    }
}
