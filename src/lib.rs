//! # mailbox-otp
//!
//! Provisions disposable mailboxes through a Mailcow admin API and harvests
//! one-time passcodes from them over IMAP.
//!
//! This crate provides:
//! - A provisioner that creates mailboxes with random credentials
//! - An extraction engine that walks unread mail and stores the first 5-6 digit code
//! - Flat-file stores for credentials, codes and an audit log of code-less mail
//! - An axum router exposing all of the above behind a small web page
//!
//! ## Quick Start
//!
//! ```no_run
//! use mailbox_otp::{
//!     AuditLog, CredentialStore, ImapConnector, ImapSettings, OtpExtractor, OtpStore,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> mailbox_otp::Result<()> {
//! let credentials = CredentialStore::new("data/mail_results.txt");
//! let extractor = OtpExtractor::new(
//!     ImapConnector::new(ImapSettings::new("mail.example.com")),
//!     Arc::new(OtpStore::new("data/otp_results.txt")),
//!     Arc::new(AuditLog::new("data/no_otp_emails.log")),
//! );
//!
//! let all = credentials.read_all().await?;
//! let selected: Vec<String> = all.iter().map(|c| c.address().to_string()).collect();
//! let report = extractor.extract_otps_for_selected(&all, &selected).await;
//! println!("{} of {} mailboxes had a code", report.found(), report.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Pattern Matching
//!
//! ```
//! use mailbox_otp::matcher::{Matcher, RegexMatcher};
//!
//! let matcher = RegexMatcher::new(r"token=([a-f0-9]{32})").unwrap();
//! assert!(matcher.find_match("no token here").is_none());
//! ```
//!
//! ## Observability
//!
//! The crate uses `tracing` for instrumentation.
//!
//! ### Span Naming Convention
//!
//! - `ImapConnector::open` - Connect, login and select
//! - `OtpExtractor::extract_otp` - One mailbox
//! - `OtpExtractor::extract_otps_for_selected` - One batch
//! - `OtpExtractor::scan_message` - One unread message
//! - `MailcowProvisioner::create_mailbox` - One admin API call
//! - `session::*` - Individual IMAP commands
//! - `connection::establish_tls` - TLS connection
//!
//! ### Standard Fields
//!
//! - `email` - Mailbox address
//! - `imap_host` - IMAP server hostname
//! - `matcher` - Matcher description
//! - `uid` - Message UID

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod config;
pub mod error;
pub mod extractor;
pub mod mailbox;
pub mod matcher;
pub mod parser;
pub mod provisioner;
pub mod store;
pub mod web;

// Internal modules
mod client;
mod connection;
mod session;

// Re-exports for ergonomic API
pub use client::{ImapConnector, ImapMailbox};
pub use config::{AppConfig, AppConfigBuilder, ImapSettings, StoragePaths, TimeoutConfig};
pub use error::{Error, ErrorCategory, Result};
pub use extractor::{BatchReport, MailboxOutcome, OtpExtractor};
pub use mailbox::{Disposition, MailConnector, MailSession, MessagePart};
pub use provisioner::{MailboxAdmin, MailcowProvisioner};
pub use store::{AuditLog, CredentialStore, MailboxCredential, OtpRecord, OtpStore};
