//! Integration tests against a real IMAP server.
//!
//! These tests are disabled by default. To run them:
//!
//! ```bash
//! export MAILBOX_OTP_TEST_EMAIL="box@example.com"
//! export MAILBOX_OTP_TEST_PASSWORD="mailbox-password"
//! export MAILBOX_OTP_TEST_IMAP_HOST="mail.example.com"   # optional, defaults to mail.<domain>
//!
//! cargo test --test integration -- --ignored
//! ```

use mailbox_otp::{
    AuditLog, Error, ImapConnector, ImapSettings, MailConnector, MailboxCredential,
    MailboxOutcome, OtpExtractor, OtpStore,
};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ─────────────────────────────────────────────────────────────────────────────
// Test Configuration Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn get_test_credential() -> Option<MailboxCredential> {
    dotenvy::dotenv().ok();
    let email = env::var("MAILBOX_OTP_TEST_EMAIL").ok()?;
    let password = env::var("MAILBOX_OTP_TEST_PASSWORD").ok()?;
    Some(MailboxCredential::new(email, password))
}

fn get_test_connector(credential: &MailboxCredential) -> ImapConnector {
    let host = env::var("MAILBOX_OTP_TEST_IMAP_HOST").unwrap_or_else(|_| {
        let domain = credential.address().split('@').nth(1).unwrap_or_default();
        format!("mail.{domain}")
    });
    ImapConnector::new(ImapSettings::new(host))
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires real IMAP server"]
async fn test_connect_and_logout() {
    let credential = get_test_credential().expect("Test credential from environment variables");
    let connector = get_test_connector(&credential);

    let mut session = connector
        .open(&credential)
        .await
        .expect("Failed to connect");

    session.logout().await.expect("Failed to logout");
}

#[tokio::test]
#[ignore = "requires real IMAP server"]
async fn test_inspection_does_not_mark_seen() {
    let credential = get_test_credential().expect("Test credential from environment variables");
    let connector = get_test_connector(&credential);

    let mut session = connector.open(&credential).await.expect("Failed to connect");
    let before = session.unseen_uids().await.expect("Search failed");

    if let Some(&uid) = before.first() {
        let parts = session.message_parts(uid).await.expect("Structure fetch failed");
        assert!(!parts.is_empty());
        session.message_header(uid).await.expect("Header fetch failed");
        for part in parts.iter().filter(|p| p.is_inline()) {
            session
                .part_content(uid, &part.section)
                .await
                .expect("Part fetch failed");
        }

        let after = session.unseen_uids().await.expect("Search failed");
        assert!(after.contains(&uid), "PEEK fetches must leave the message unread");
    }

    session.logout().await.ok();
}

#[tokio::test]
#[ignore = "requires real IMAP server"]
async fn test_wrong_password_is_rejected() {
    let credential = get_test_credential().expect("Test credential from environment variables");
    let connector = get_test_connector(&credential);
    let wrong = MailboxCredential::new(credential.address(), "definitely-not-the-password");

    let result = connector.open(&wrong).await;

    assert!(matches!(result, Err(Error::ImapLogin { .. })));
}

// ─────────────────────────────────────────────────────────────────────────────
// Extraction Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires real IMAP server"]
async fn test_extract_otp() {
    let credential = get_test_credential().expect("Test credential from environment variables");
    let dir = TempDir::new().unwrap();
    let extractor = OtpExtractor::new(
        get_test_connector(&credential),
        Arc::new(OtpStore::new(dir.path().join("otp_results.txt"))),
        Arc::new(AuditLog::new(dir.path().join("no_otp_emails.log"))),
    );

    let outcome = tokio::time::timeout(Duration::from_secs(120), extractor.extract_otp(&credential))
        .await
        .expect("Extraction took too long")
        .expect("Extraction failed");

    match outcome {
        MailboxOutcome::Stored(record) => {
            println!("Found OTP: {}", record.code);
            assert!((5..=6).contains(&record.code.len()));
        }
        other => println!("No OTP: {other:?}"),
    }
}
