//! Flat-file store behaviour against real files.

use mailbox_otp::{AuditLog, CredentialStore, MailboxCredential, OtpRecord, OtpStore};
use tempfile::TempDir;

fn credential(address: &str, password: &str) -> MailboxCredential {
    MailboxCredential::new(address, password)
}

#[tokio::test]
async fn test_missing_file_reads_empty() {
    let dir = TempDir::new().unwrap();
    let store = CredentialStore::new(dir.path().join("mail_results.txt"));

    assert!(store.read_all().await.unwrap().is_empty());
    assert_eq!(store.find("a@x.test").await.unwrap(), None);
}

#[tokio::test]
async fn test_canonical_file_rewrite_is_noop() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mail_results.txt");
    let contents = "a1@x.test,Pass1word001\nb2@x.test,Pass1word002\n";
    std::fs::write(&path, contents).unwrap();

    let store = CredentialStore::new(&path);
    let records = store.read_all().await.unwrap();
    store.rewrite_all(&records).await.unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), contents);
    assert_eq!(store.compact().await.unwrap(), 0);
}

#[tokio::test]
async fn test_duplicate_insert_adds_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mail_results.txt");
    let store = CredentialStore::new(&path);

    assert!(store.insert(&credential("a@x.test", "first")).await.unwrap());
    assert!(!store.insert(&credential("a@x.test", "second")).await.unwrap());

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "a@x.test,first\n");
}

#[tokio::test]
async fn test_insert_after_unterminated_line() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mail_results.txt");
    std::fs::write(&path, "a@x.test,first").unwrap();

    let store = CredentialStore::new(&path);
    store.insert(&credential("b@x.test", "second")).await.unwrap();

    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "a@x.test,first\nb@x.test,second\n"
    );
}

#[tokio::test]
async fn test_remove_exactly_selected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("otp_results.txt");
    let store = OtpStore::new(&path);
    for (address, code) in [("a@x.test", "11111"), ("b@x.test", "222222"), ("c@x.test", "33333")] {
        store.insert(&OtpRecord::new(address, code)).await.unwrap();
    }

    let removed = store
        .remove(&["a@x.test".to_string(), "c@x.test".to_string(), "z@x.test".to_string()])
        .await
        .unwrap();

    assert_eq!(removed, 2);
    assert_eq!(
        store.read_all().await.unwrap(),
        vec![OtpRecord::new("b@x.test", "222222")]
    );
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "Email: b@x.test, OTP: 222222\n"
    );
}

#[tokio::test]
async fn test_malformed_lines_are_skipped_but_kept_on_compact() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mail_results.txt");
    std::fs::write(
        &path,
        "a@x.test,one\nno comma here\n\nb@x.test,two,three\na@x.test,dup\nc@x.test,four\n",
    )
    .unwrap();

    let store = CredentialStore::new(&path);
    let addresses: Vec<String> = store
        .read_all()
        .await
        .unwrap()
        .iter()
        .map(|c| c.address().to_string())
        .collect();
    assert_eq!(addresses, ["a@x.test", "c@x.test"]);

    assert_eq!(store.compact().await.unwrap(), 1);
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "a@x.test,one\nno comma here\nb@x.test,two,three\nc@x.test,four\n"
    );
    assert_eq!(store.compact().await.unwrap(), 0);
}

#[tokio::test]
async fn test_password_with_comma_survives_compact_and_remove() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mail_results.txt");
    std::fs::write(&path, "a@x.test,pa,ss\nb@x.test,two\n").unwrap();

    let store = CredentialStore::new(&path);
    assert_eq!(store.compact().await.unwrap(), 0);
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "a@x.test,pa,ss\nb@x.test,two\n"
    );

    assert_eq!(store.remove(&["b@x.test".to_string()]).await.unwrap(), 1);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "a@x.test,pa,ss\n");
}

#[tokio::test]
async fn test_ensure_exists_creates_parents() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("data").join("otp_results.txt");
    let store = OtpStore::new(&path);

    store.ensure_exists().await.unwrap();
    store.ensure_exists().await.unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
}

#[tokio::test]
async fn test_audit_log_appends_single_lines() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("no_otp_emails.log");
    let log = AuditLog::new(&path);

    log.record("a@x.test", "News <news@shop.test>", "Weekly\r\n deals")
        .await
        .unwrap();
    log.record("a@x.test", "(no sender)", "(no subject)")
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "Email: a@x.test, From: News <news@shop.test>, Subject: Weekly  deals\n\
         Email: a@x.test, From: (no sender), Subject: (no subject)\n"
    );
}
