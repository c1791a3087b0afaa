//! Flat-file persistence for credentials, passcodes and the no-OTP audit trail.
//!
//! Each store is a UTF-8 text file with one record per line. Reads tolerate
//! damage: malformed lines are skipped with a warning and duplicate addresses
//! keep their first occurrence. Within the process, every operation on a store
//! runs under that store's mutex, so a check-then-append such as
//! [`FlatFileStore::insert`] cannot interleave with another writer. Nothing
//! guards against other processes editing the files.
//!
//! ```no_run
//! use mailbox_otp::{CredentialStore, MailboxCredential};
//!
//! # async fn example() -> mailbox_otp::Result<()> {
//! let store = CredentialStore::new("data/mail_results.txt");
//! store.insert(&MailboxCredential::new("a1b2@example.com", "Xy7pQ2mN4rT8")).await?;
//! for credential in store.read_all().await? {
//!     println!("{}", credential.address());
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Why a stored line could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    /// The line has the wrong number of comma-separated fields.
    #[error("expected {expected} fields, found {found}")]
    FieldCount {
        /// Fields the format requires.
        expected: usize,
        /// Fields present on the line.
        found: usize,
    },
    /// A required field is empty.
    #[error("missing {0}")]
    MissingField(&'static str),
    /// The line lacks the `Email: ` / `, OTP: ` markers.
    #[error("unrecognised line layout")]
    Layout,
    /// The stored code contains something other than ASCII digits.
    #[error("code is not numeric: {0}")]
    NonNumericCode(String),
    /// The stored code is not five or six digits long.
    #[error("code must be 5 or 6 digits, found {0}")]
    CodeLength(usize),
}

/// A record stored as one line of text, keyed by mailbox address.
pub trait LineRecord: Sized + Send + Sync {
    /// Human-readable name used in log messages.
    const KIND: &'static str;

    /// Parses one non-empty line.
    ///
    /// # Errors
    ///
    /// Returns a [`LineError`] describing why the line is malformed.
    fn parse_line(line: &str) -> std::result::Result<Self, LineError>;

    /// Serialises the record without a trailing newline.
    fn to_line(&self) -> String;

    /// The unique key of the record.
    fn address(&self) -> &str;
}

/// Login details of a provisioned mailbox.
///
/// The password is kept as a [`SecretString`] and never appears in `Debug` output.
#[derive(Clone)]
pub struct MailboxCredential {
    address: String,
    password: SecretString,
}

impl MailboxCredential {
    /// Creates a credential.
    #[must_use]
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// The full mailbox address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The mailbox password.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl PartialEq for MailboxCredential {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && self.password() == other.password()
    }
}

impl Eq for MailboxCredential {}

impl std::fmt::Debug for MailboxCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxCredential")
            .field("address", &self.address)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl LineRecord for MailboxCredential {
    const KIND: &'static str = "credential";

    fn parse_line(line: &str) -> std::result::Result<Self, LineError> {
        let fields: Vec<&str> = line.split(',').collect();
        let [address, password] = fields.as_slice() else {
            return Err(LineError::FieldCount {
                expected: 2,
                found: fields.len(),
            });
        };

        let address = address.trim();
        let password = password.trim();
        if address.is_empty() {
            return Err(LineError::MissingField("address"));
        }
        if password.is_empty() {
            return Err(LineError::MissingField("password"));
        }
        Ok(Self::new(address, password))
    }

    fn to_line(&self) -> String {
        format!("{},{}", self.address, self.password())
    }

    fn address(&self) -> &str {
        &self.address
    }
}

/// A passcode harvested from a mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OtpRecord {
    /// Mailbox the code was found in.
    pub address: String,
    /// The 5-6 digit code.
    pub code: String,
}

impl OtpRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(address: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            code: code.into(),
        }
    }
}

impl LineRecord for OtpRecord {
    const KIND: &'static str = "otp";

    fn parse_line(line: &str) -> std::result::Result<Self, LineError> {
        let rest = line.trim().strip_prefix("Email: ").ok_or(LineError::Layout)?;
        let (address, code) = rest.split_once(", OTP: ").ok_or(LineError::Layout)?;

        let address = address.trim();
        let code = code.trim();
        if address.is_empty() {
            return Err(LineError::MissingField("address"));
        }
        if code.is_empty() {
            return Err(LineError::MissingField("code"));
        }
        if !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LineError::NonNumericCode(code.to_string()));
        }
        if !(5..=6).contains(&code.len()) {
            return Err(LineError::CodeLength(code.len()));
        }
        Ok(Self::new(address, code))
    }

    fn to_line(&self) -> String {
        format!("Email: {}, OTP: {}", self.address, self.code)
    }

    fn address(&self) -> &str {
        &self.address
    }
}

/// Parses file contents, skipping malformed lines and later duplicates.
pub fn parse_records<R: LineRecord>(contents: &str) -> Vec<R> {
    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match R::parse_line(line) {
            Ok(record) => {
                if seen.insert(record.address().to_string()) {
                    records.push(record);
                } else {
                    warn!(
                        kind = R::KIND,
                        line = index + 1,
                        address = %record.address(),
                        "Duplicate address, keeping first entry"
                    );
                }
            }
            Err(e) => warn!(
                kind = R::KIND,
                line = index + 1,
                error = %e,
                "Skipping malformed line"
            ),
        }
    }

    records
}

/// Serialises records one per line, each terminated by `\n`.
pub fn serialize_records<R: LineRecord>(records: &[R]) -> String {
    records
        .iter()
        .map(|record| record.to_line() + "\n")
        .collect()
}

/// A line-oriented file of records keyed by address.
pub struct FlatFileStore<R> {
    path: PathBuf,
    lock: Mutex<()>,
    _records: PhantomData<fn() -> R>,
}

/// Store of `address,password` lines.
pub type CredentialStore = FlatFileStore<MailboxCredential>;

/// Store of `Email: <address>, OTP: <code>` lines.
pub type OtpStore = FlatFileStore<OtpRecord>;

impl<R: LineRecord> FlatFileStore<R> {
    /// Creates a store backed by `path`. The file is not touched until first use.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            _records: PhantomData,
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the file and its parent directories if missing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the file cannot be created.
    pub async fn ensure_exists(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        create_parent(&self.path).await?;
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|source| storage_error(&self.path, source))?;
        Ok(())
    }

    /// Reads every valid record. A missing file reads as empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the file exists but cannot be read.
    pub async fn read_all(&self) -> Result<Vec<R>> {
        let _guard = self.lock.lock().await;
        let contents = read_contents(&self.path).await?;
        Ok(parse_records(&contents))
    }

    /// Looks up the record for `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the file cannot be read.
    pub async fn find(&self, address: &str) -> Result<Option<R>> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .find(|record| record.address() == address))
    }

    /// Appends `record` unless its address is already stored.
    ///
    /// Returns `true` if the record was written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the file cannot be read or written.
    pub async fn insert(&self, record: &R) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let contents = read_contents(&self.path).await?;

        if parse_records::<R>(&contents)
            .iter()
            .any(|existing| existing.address() == record.address())
        {
            debug!(kind = R::KIND, address = %record.address(), "Address already stored");
            return Ok(false);
        }

        let mut line = String::new();
        if !contents.is_empty() && !contents.ends_with('\n') {
            line.push('\n');
        }
        line.push_str(&record.to_line());
        line.push('\n');

        append(&self.path, &line).await?;
        debug!(kind = R::KIND, address = %record.address(), "Record appended");
        Ok(true)
    }

    /// Replaces the file contents with `records`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the file cannot be written.
    pub async fn rewrite_all(&self, records: &[R]) -> Result<()> {
        let _guard = self.lock.lock().await;
        write_atomically(&self.path, &serialize_records(records)).await
    }

    /// Removes every record whose address is in `addresses`.
    ///
    /// Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the file cannot be read or written.
    pub async fn remove(&self, addresses: &[String]) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let contents = read_contents(&self.path).await?;

        let mut kept = String::with_capacity(contents.len());
        let mut removed = 0;
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            if let Ok(record) = R::parse_line(line) {
                if addresses.iter().any(|a| a == record.address()) {
                    removed += 1;
                    continue;
                }
            }
            kept.push_str(line);
            kept.push('\n');
        }

        write_atomically(&self.path, &kept).await?;
        debug!(kind = R::KIND, removed, "Records removed");
        Ok(removed)
    }

    /// Rewrites the file with later duplicates and blank lines dropped.
    ///
    /// Valid records are written in canonical form. Lines that do not parse
    /// are kept verbatim, apart from exact repeats.
    ///
    /// Returns the number of non-empty lines dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the file cannot be read or written.
    pub async fn compact(&self) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let contents = read_contents(&self.path).await?;
        let (compacted, dropped) = compact_lines::<R>(&contents);

        if compacted == contents {
            return Ok(0);
        }

        write_atomically(&self.path, &compacted).await?;
        debug!(kind = R::KIND, dropped, "File compacted");
        Ok(dropped)
    }
}

/// Canonical contents plus the number of duplicate lines left out.
fn compact_lines<R: LineRecord>(contents: &str) -> (String, usize) {
    let mut addresses = HashSet::new();
    let mut unparsed = HashSet::new();
    let mut compacted = String::with_capacity(contents.len());
    let mut dropped = 0;

    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        let kept = match R::parse_line(line) {
            Ok(record) if addresses.insert(record.address().to_string()) => Some(record.to_line()),
            Ok(_) => None,
            Err(_) if unparsed.insert(line) => Some(line.to_string()),
            Err(_) => None,
        };
        match kept {
            Some(line) => {
                compacted.push_str(&line);
                compacted.push('\n');
            }
            None => dropped += 1,
        }
    }

    (compacted, dropped)
}

impl<R> std::fmt::Debug for FlatFileStore<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatFileStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Append-only log of unread messages that contained no passcode.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuditLog {
    /// Creates a log backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `Email: <address>, From: <sender>, Subject: <subject>`.
    ///
    /// Line breaks inside the fields are flattened to spaces.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the file cannot be written.
    pub async fn record(&self, address: &str, sender: &str, subject: &str) -> Result<()> {
        let line = format!(
            "Email: {}, From: {}, Subject: {}\n",
            single_line(address),
            single_line(sender),
            single_line(subject)
        );

        let _guard = self.lock.lock().await;
        append(&self.path, &line).await
    }
}

fn single_line(value: &str) -> String {
    value.split(['\r', '\n']).filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ")
}

fn storage_error(path: &Path, source: std::io::Error) -> Error {
    Error::Storage {
        path: path.to_path_buf(),
        source,
    }
}

async fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| storage_error(parent, source)),
        _ => Ok(()),
    }
}

async fn read_contents(path: &Path) -> Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(source) => Err(storage_error(path, source)),
    }
}

async fn append(path: &Path, text: &str) -> Result<()> {
    create_parent(path).await?;
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|source| storage_error(path, source))?;

    file.write_all(text.as_bytes())
        .await
        .map_err(|source| storage_error(path, source))?;
    file.flush()
        .await
        .map_err(|source| storage_error(path, source))
}

async fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    create_parent(path).await?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|source| storage_error(&tmp, source))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|source| storage_error(path, source))
}
