//! IMAP implementation of the mail-retrieval seam.
//!
//! [`ImapConnector`] opens one TLS session per mailbox against the configured
//! server; every protocol step is bounded by the matching timeout from
//! [`TimeoutConfig`].
//!
//! # Example
//!
//! ```no_run
//! use mailbox_otp::{ImapConnector, ImapSettings, MailConnector, MailboxCredential};
//!
//! # async fn example() -> mailbox_otp::Result<()> {
//! let connector = ImapConnector::new(ImapSettings::new("mail.example.com"));
//! let credential = MailboxCredential::new("user@example.com", "app-password");
//!
//! let mut session = connector.open(&credential).await?;
//! let unseen = session.unseen_uids().await?;
//! println!("{} unread messages", unseen.len());
//! session.logout().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{ImapSettings, TimeoutConfig};
use crate::connection;
use crate::error::{Error, Result};
use crate::mailbox::{MailConnector, MailSession, MessagePart};
use crate::session::{self, ImapSession};
use crate::store::MailboxCredential;
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Opens IMAP sessions for mailboxes on a single server.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    settings: ImapSettings,
}

impl ImapConnector {
    /// Creates a connector for the given server settings.
    #[must_use]
    pub fn new(settings: ImapSettings) -> Self {
        Self { settings }
    }

    /// Returns the server settings.
    #[must_use]
    pub fn settings(&self) -> &ImapSettings {
        &self.settings
    }

    /// Connects, authenticates and selects the configured folder.
    async fn initialize_session(&self, credential: &MailboxCredential) -> Result<ImapSession> {
        let settings = &self.settings;
        let timeouts = &settings.timeouts;
        let target_addr = settings.server_address();

        let tls_stream = tokio::time::timeout(
            timeouts.connect,
            connection::establish_tls_connection(&settings.host, &target_addr),
        )
        .await
        .map_err(|_| Error::ConnectTimeout {
            target: target_addr.clone(),
            timeout: timeouts.connect,
        })??;

        debug!("TLS connection established");

        let mut session = tokio::time::timeout(
            timeouts.auth,
            session::authenticate(tls_stream, credential.address(), credential.password()),
        )
        .await
        .map_err(|_| Error::AuthTimeout {
            email: credential.address().to_string(),
            timeout: timeouts.auth,
        })??;

        debug!("Authenticated");

        tokio::time::timeout(
            timeouts.select,
            session::select_mailbox(&mut session, &settings.mailbox),
        )
        .await
        .map_err(|_| Error::SelectTimeout {
            mailbox: settings.mailbox.clone(),
            timeout: timeouts.select,
        })??;

        debug!(mailbox = %settings.mailbox, "Selected mailbox");

        Ok(session)
    }
}

#[async_trait]
impl MailConnector for ImapConnector {
    #[instrument(
        name = "ImapConnector::open",
        skip_all,
        fields(email = %credential.address(), imap_host = %self.settings.host)
    )]
    async fn open(&self, credential: &MailboxCredential) -> Result<Box<dyn MailSession>> {
        let session = self.initialize_session(credential).await?;

        Ok(Box::new(ImapMailbox {
            session: Box::new(session),
            timeouts: self.settings.timeouts.clone(),
            email: credential.address().to_string(),
        }))
    }
}

/// An authenticated IMAP session with the inbox selected.
pub struct ImapMailbox {
    session: Box<ImapSession>,
    timeouts: TimeoutConfig,
    email: String,
}

impl ImapMailbox {
    fn fetch_timeout(&self, uid: u32) -> impl FnOnce(tokio::time::error::Elapsed) -> Error {
        let timeout = self.timeouts.fetch;
        move |_| Error::FetchTimeout { uid, timeout }
    }
}

#[async_trait]
impl MailSession for ImapMailbox {
    async fn unseen_uids(&mut self) -> Result<Vec<u32>> {
        let timeout = self.timeouts.search;

        tokio::time::timeout(timeout, session::search_unseen(&mut self.session))
            .await
            .map_err(|_| Error::SearchTimeout { timeout })?
    }

    async fn message_parts(&mut self, uid: u32) -> Result<Vec<MessagePart>> {
        let on_timeout = self.fetch_timeout(uid);

        tokio::time::timeout(
            self.timeouts.fetch,
            session::fetch_structure(&mut self.session, uid),
        )
        .await
        .map_err(on_timeout)?
    }

    async fn message_header(&mut self, uid: u32) -> Result<Vec<u8>> {
        let on_timeout = self.fetch_timeout(uid);

        tokio::time::timeout(
            self.timeouts.fetch,
            session::fetch_header(&mut self.session, uid),
        )
        .await
        .map_err(on_timeout)?
    }

    async fn part_content(&mut self, uid: u32, section: &str) -> Result<Vec<u8>> {
        let on_timeout = self.fetch_timeout(uid);

        tokio::time::timeout(
            self.timeouts.fetch,
            session::fetch_part(&mut self.session, uid, section),
        )
        .await
        .map_err(on_timeout)?
    }

    async fn mark_seen(&mut self, uid: u32) -> Result<()> {
        let timeout = self.timeouts.store;

        tokio::time::timeout(timeout, session::mark_seen(&mut self.session, uid))
            .await
            .map_err(|_| Error::StoreTimeout { uid, timeout })?
    }

    async fn logout(&mut self) -> Result<()> {
        let timeout = self.timeouts.logout;

        tokio::time::timeout(timeout, session::logout(&mut self.session))
            .await
            .map_err(|_| Error::LogoutTimeout { timeout })?
    }
}

impl std::fmt::Debug for ImapMailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapMailbox")
            .field("email", &self.email)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}
