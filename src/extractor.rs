//! OTP extraction engine.
//!
//! For each selected mailbox the engine opens a session, walks the unread
//! messages in server order and inspects every inline part until the matcher
//! finds a code. The first hit is persisted, its message marked `\Seen`, and
//! the session closed; messages without a hit are recorded in the audit log.
//!
//! # Example
//!
//! ```no_run
//! use mailbox_otp::{AuditLog, ImapConnector, ImapSettings, MailboxCredential, OtpExtractor, OtpStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> mailbox_otp::Result<()> {
//! let extractor = OtpExtractor::new(
//!     ImapConnector::new(ImapSettings::new("mail.example.com")),
//!     Arc::new(OtpStore::new("data/otp_results.txt")),
//!     Arc::new(AuditLog::new("data/no_otp_emails.log")),
//! );
//!
//! let credential = MailboxCredential::new("a1b2@example.com", "Xy7pQ2mN4rT8");
//! if let Some(record) = extractor.extract_otp_record(&credential).await {
//!     println!("{} -> {}", record.address, record.code);
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::mailbox::{MailConnector, MailSession, MessagePart};
use crate::matcher::{match_bodies, Matcher, OtpMatcher};
use crate::parser::{parse_envelope, parse_part, Envelope};
use crate::store::{AuditLog, MailboxCredential, OtpRecord, OtpStore};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Result of running the engine against one mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailboxOutcome {
    /// A new code was found and written to the OTP store.
    Stored(OtpRecord),
    /// A code was found but the store already held one for this address,
    /// which is kept.
    AlreadyStored(OtpRecord),
    /// The inbox had no unread messages.
    NoUnreadMail,
    /// No unread message contained a code.
    NotFound,
    /// The mailbox could not be processed.
    Failed {
        /// Description of the failure.
        message: String,
    },
}

impl MailboxOutcome {
    /// The stored record, if the outcome carries one.
    #[must_use]
    pub fn record(&self) -> Option<&OtpRecord> {
        match self {
            MailboxOutcome::Stored(record) | MailboxOutcome::AlreadyStored(record) => Some(record),
            _ => None,
        }
    }

    /// Converts the outcome into its stored record, if any.
    #[must_use]
    pub fn into_record(self) -> Option<OtpRecord> {
        match self {
            MailboxOutcome::Stored(record) | MailboxOutcome::AlreadyStored(record) => Some(record),
            _ => None,
        }
    }
}

/// Per-address outcomes of a batch, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    outcomes: Vec<(String, MailboxOutcome)>,
}

impl BatchReport {
    /// All `(address, outcome)` pairs in processing order.
    #[must_use]
    pub fn outcomes(&self) -> &[(String, MailboxOutcome)] {
        &self.outcomes
    }

    /// The outcome for `address`, if it was processed.
    #[must_use]
    pub fn get(&self, address: &str) -> Option<&MailboxOutcome> {
        self.outcomes
            .iter()
            .find(|(a, _)| a == address)
            .map(|(_, outcome)| outcome)
    }

    /// Number of mailboxes that ended with a stored code.
    #[must_use]
    pub fn found(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.record().is_some())
            .count()
    }

    /// Number of processed mailboxes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns `true` if nothing was processed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// What inspecting one part decided.
enum PartScan {
    Match(String),
    NoMatch,
    Unreadable,
}

/// Harvests one-time passcodes from provisioned mailboxes.
pub struct OtpExtractor<C> {
    connector: C,
    matcher: Box<dyn Matcher>,
    otps: Arc<OtpStore>,
    audit: Arc<AuditLog>,
}

impl<C: MailConnector> OtpExtractor<C> {
    /// Creates an engine using the default 5-6 digit [`OtpMatcher`].
    pub fn new(connector: C, otps: Arc<OtpStore>, audit: Arc<AuditLog>) -> Self {
        Self {
            connector,
            matcher: Box::new(OtpMatcher::new()),
            otps,
            audit,
        }
    }

    /// Replaces the matcher.
    #[must_use]
    pub fn with_matcher(mut self, matcher: impl Matcher + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    /// Runs the engine against one mailbox.
    ///
    /// The session is logged out on every path once it was opened.
    ///
    /// # Errors
    ///
    /// Returns the connection, protocol or timeout error that ended the run,
    /// or a storage error if the code could not be persisted.
    #[instrument(
        name = "OtpExtractor::extract_otp",
        skip_all,
        fields(email = %credential.address(), matcher = %self.matcher.description())
    )]
    pub async fn extract_otp(&self, credential: &MailboxCredential) -> Result<MailboxOutcome> {
        let mut session = self.connector.open(credential).await?;

        let result = self.scan_inbox(session.as_mut(), credential.address()).await;

        if let Err(e) = session.logout().await {
            debug!(error = %e, "Logout failed (ignored)");
        }

        result
    }

    /// Like [`extract_otp`](Self::extract_otp), but folds every outcome
    /// without a record, including errors, into `None`.
    pub async fn extract_otp_record(&self, credential: &MailboxCredential) -> Option<OtpRecord> {
        match self.extract_otp(credential).await {
            Ok(outcome) => outcome.into_record(),
            Err(e) => {
                warn!(email = %credential.address(), error = %e, "OTP extraction failed");
                None
            }
        }
    }

    /// Runs the engine for each address in `selected`, in that order.
    ///
    /// Addresses without a credential in `all` are skipped; repeated addresses
    /// are processed once. A failing mailbox is recorded as
    /// [`MailboxOutcome::Failed`] and the batch moves on.
    #[instrument(
        name = "OtpExtractor::extract_otps_for_selected",
        skip_all,
        fields(selected = selected.len())
    )]
    pub async fn extract_otps_for_selected(
        &self,
        all: &[MailboxCredential],
        selected: &[String],
    ) -> BatchReport {
        let mut report = BatchReport::default();
        let mut visited = HashSet::new();

        for address in selected {
            if !visited.insert(address.as_str()) {
                continue;
            }

            let Some(credential) = all.iter().find(|c| c.address() == address) else {
                warn!(email = %address, "No stored credential for selected address, skipping");
                continue;
            };

            let outcome = match self.extract_otp(credential).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    if e.is_mail_session() {
                        warn!(email = %address, error = %e, category = %e.category(), "Mailbox failed");
                    } else {
                        error!(email = %address, error = %e, category = %e.category(), "Mailbox failed");
                    }
                    MailboxOutcome::Failed {
                        message: e.to_string(),
                    }
                }
            };
            report.outcomes.push((address.clone(), outcome));
        }

        info!(
            processed = report.len(),
            found = report.found(),
            "OTP batch finished"
        );
        report
    }

    async fn scan_inbox(
        &self,
        session: &mut dyn MailSession,
        address: &str,
    ) -> Result<MailboxOutcome> {
        let uids = session.unseen_uids().await?;
        if uids.is_empty() {
            info!("No unread mail");
            return Ok(MailboxOutcome::NoUnreadMail);
        }

        for uid in uids {
            if let Some(code) = self.scan_message(session, address, uid).await? {
                let outcome = self.persist(address, code).await?;
                session.mark_seen(uid).await?;
                return Ok(outcome);
            }
        }

        info!("No OTP in unread mail");
        Ok(MailboxOutcome::NotFound)
    }

    /// Returns the first code found in the message's inline parts.
    #[instrument(name = "OtpExtractor::scan_message", skip(self, session, address))]
    async fn scan_message(
        &self,
        session: &mut dyn MailSession,
        address: &str,
        uid: u32,
    ) -> Result<Option<String>> {
        let parts = session.message_parts(uid).await?;
        let envelope = parse_envelope(&session.message_header(uid).await?);

        for part in parts.iter().filter(|p| p.is_inline()) {
            let content = session.part_content(uid, &part.section).await?;
            match self.scan_part(uid, &envelope, part, &content) {
                PartScan::Match(code) => return Ok(Some(code)),
                PartScan::NoMatch | PartScan::Unreadable => {}
            }
        }

        debug!(sender = %envelope.sender, subject = %envelope.subject, "No OTP in message");
        if let Err(e) = self
            .audit
            .record(address, &envelope.sender, &envelope.subject)
            .await
        {
            warn!(error = %e, "Failed to write audit log entry");
        }
        Ok(None)
    }

    fn scan_part(
        &self,
        uid: u32,
        envelope: &Envelope,
        part: &MessagePart,
        content: &[u8],
    ) -> PartScan {
        let message = match parse_part(uid, envelope, part, content) {
            Ok(message) => message,
            Err(e) => {
                warn!(uid, section = %part.section, error = %e, "Skipping unreadable part");
                return PartScan::Unreadable;
            }
        };

        match match_bodies(
            self.matcher.as_ref(),
            &message.plain_body,
            &message.html_body,
        ) {
            Some(code) => {
                debug!(uid, section = %part.section, "OTP found");
                PartScan::Match(code)
            }
            None => PartScan::NoMatch,
        }
    }

    async fn persist(&self, address: &str, code: String) -> Result<MailboxOutcome> {
        let record = OtpRecord::new(address, code);

        if self.otps.insert(&record).await? {
            info!(otp = %record.code, "OTP stored");
            return Ok(MailboxOutcome::Stored(record));
        }

        let existing = self.otps.find(address).await?.unwrap_or(record);
        info!(otp = %existing.code, "OTP already stored for address, keeping existing");
        Ok(MailboxOutcome::AlreadyStored(existing))
    }
}

impl<C> std::fmt::Debug for OtpExtractor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpExtractor")
            .field("matcher", &self.matcher.description())
            .field("otp_store", &self.otps.path())
            .field("audit_log", &self.audit.path())
            .finish_non_exhaustive()
    }
}
