//! Application configuration.
//!
//! Use [`AppConfigBuilder`] to create a configuration with sensible defaults:
//!
//! ```
//! use mailbox_otp::AppConfig;
//!
//! let config = AppConfig::builder()
//!     .mail_domain("example.com")
//!     .admin_api_key("XXXX-XXXX")
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.imap.host, "mail.example.com");
//! ```
//!
//! The binary uses [`AppConfig::from_env`], which reads the variables listed on
//! [`AppConfig::from_lookup`].

use crate::error::{Error, Result};
use email_address::EmailAddress;
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of the credential store inside the data directory.
pub const CREDENTIALS_FILE: &str = "mail_results.txt";
/// File name of the OTP store inside the data directory.
pub const OTPS_FILE: &str = "otp_results.txt";
/// File name of the no-OTP audit log inside the data directory.
pub const AUDIT_LOG_FILE: &str = "no_otp_emails.log";

/// Top-level configuration for the web service.
///
/// Note: the admin API key is stored as a [`SecretString`] to prevent
/// accidental logging.
#[derive(Clone)]
pub struct AppConfig {
    /// Port the HTTP server listens on.
    pub port: u16,
    /// Domain new mailboxes are created on.
    pub mail_domain: String,
    /// Full URL of the mailbox-creation endpoint.
    pub admin_api_url: String,
    /// API key sent in the `X-API-Key` header.
    admin_api_key: SecretString,
    /// IMAP server settings.
    pub imap: ImapSettings,
    /// Paths of the flat-file stores.
    pub storage: StoragePaths,
    /// Upper bound for a single create request.
    pub max_batch_create: u32,
    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("mail_domain", &self.mail_domain)
            .field("admin_api_url", &self.admin_api_url)
            .field("admin_api_key", &"[REDACTED]")
            .field("imap", &self.imap)
            .field("storage", &self.storage)
            .field("max_batch_create", &self.max_batch_create)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl AppConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Returns the admin API key.
    ///
    /// The key is intentionally not directly accessible to prevent accidental logging.
    #[must_use]
    pub fn admin_api_key(&self) -> &str {
        self.admin_api_key.expose_secret()
    }

    /// Builds a configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    ///
    /// | variable | meaning | default |
    /// |---|---|---|
    /// | `PORT` | HTTP port | 3000 |
    /// | `MAIL_DOMAIN` | domain for new mailboxes | required |
    /// | `MAILCOW_API_URL` | mailbox-creation endpoint | `https://mail.<domain>/api/v1/add/mailbox` |
    /// | `MAILCOW_API_KEY` | admin API key | required |
    /// | `IMAP_HOST` | IMAP server | `mail.<domain>` |
    /// | `IMAP_PORT` | IMAP port | 993 |
    /// | `DATA_DIR` | directory holding the store files | `data` |
    /// | `MAX_BATCH_CREATE` | create-request cap | 50 |
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(domain) = lookup("MAIL_DOMAIN") {
            builder = builder.mail_domain(domain);
        }
        if let Some(key) = lookup("MAILCOW_API_KEY") {
            builder = builder.admin_api_key(key);
        }
        if let Some(url) = lookup("MAILCOW_API_URL") {
            builder = builder.admin_api_url(url);
        }
        if let Some(host) = lookup("IMAP_HOST") {
            builder = builder.imap_host(host);
        }
        if let Some(dir) = lookup("DATA_DIR") {
            builder = builder.data_dir(dir);
        }
        if let Some(port) = lookup("PORT") {
            builder = builder.port(parse_var("PORT", &port)?);
        }
        if let Some(port) = lookup("IMAP_PORT") {
            builder = builder.imap_port(parse_var("IMAP_PORT", &port)?);
        }
        if let Some(max) = lookup("MAX_BATCH_CREATE") {
            builder = builder.max_batch_create(parse_var("MAX_BATCH_CREATE", &max)?);
        }

        builder.build()
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| Error::InvalidConfig {
        message: format!("{name} has an invalid value: {value}"),
    })
}

/// IMAP server settings shared by every mailbox on the domain.
#[derive(Debug, Clone)]
pub struct ImapSettings {
    /// IMAP server hostname.
    pub host: String,
    /// IMAP server port (default: 993 for IMAPS).
    pub port: u16,
    /// Folder scanned for unread mail.
    pub mailbox: String,
    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
}

impl ImapSettings {
    /// Creates settings for `host` with the default port, folder and timeouts.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 993,
            mailbox: "INBOX".to_string(),
            timeouts: TimeoutConfig::default(),
        }
    }

    /// Returns the full IMAP server address as "host:port".
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Locations of the flat files backing the stores.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    /// Credential store (`address,password` per line).
    pub credentials: PathBuf,
    /// OTP store (`Email: <address>, OTP: <code>` per line).
    pub otps: PathBuf,
    /// Append-only log of messages without an OTP.
    pub audit_log: PathBuf,
}

impl StoragePaths {
    /// Places all three files inside `dir`.
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            credentials: dir.join(CREDENTIALS_FILE),
            otps: dir.join(OTPS_FILE),
            audit_log: dir.join(AUDIT_LOG_FILE),
        }
    }
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::in_dir("data")
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for establishing TCP/TLS connection.
    pub connect: Duration,
    /// Timeout for IMAP authentication.
    pub auth: Duration,
    /// Timeout for selecting a mailbox.
    pub select: Duration,
    /// Timeout for the UNSEEN search.
    pub search: Duration,
    /// Timeout for fetching structure, headers or part content.
    pub fetch: Duration,
    /// Timeout for setting the `\Seen` flag.
    pub store: Duration,
    /// Timeout for logout operation.
    pub logout: Duration,
    /// Timeout for one mailbox-creation request.
    pub admin_api: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            auth: Duration::from_secs(5),
            select: Duration::from_secs(10),
            search: Duration::from_secs(10),
            fetch: Duration::from_secs(30),
            store: Duration::from_secs(10),
            logout: Duration::from_secs(5),
            admin_api: Duration::from_secs(30),
        }
    }
}

/// Validates a mail domain by checking that it forms a valid address.
fn validate_domain(domain: &str) -> Result<String> {
    let domain = domain.trim().to_ascii_lowercase();
    let probe = format!("postmaster@{domain}");
    if domain.is_empty() || !EmailAddress::is_valid(&probe) {
        return Err(Error::InvalidConfig {
            message: format!("invalid mail domain: {domain}"),
        });
    }
    Ok(domain)
}

/// Builder for [`AppConfig`].
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    port: Option<u16>,
    mail_domain: Option<String>,
    admin_api_url: Option<String>,
    admin_api_key: Option<String>,
    imap_host: Option<String>,
    imap_port: Option<u16>,
    storage: Option<StoragePaths>,
    max_batch_create: Option<u32>,
    timeouts: Option<TimeoutConfig>,
}

impl AppConfigBuilder {
    /// Sets the HTTP port (default 3000).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the domain new mailboxes are created on (required).
    #[must_use]
    pub fn mail_domain(mut self, domain: impl Into<String>) -> Self {
        self.mail_domain = Some(domain.into());
        self
    }

    /// Sets the mailbox-creation endpoint.
    ///
    /// Defaults to `https://mail.<domain>/api/v1/add/mailbox`.
    #[must_use]
    pub fn admin_api_url(mut self, url: impl Into<String>) -> Self {
        self.admin_api_url = Some(url.into());
        self
    }

    /// Sets the admin API key (required).
    #[must_use]
    pub fn admin_api_key(mut self, key: impl Into<String>) -> Self {
        self.admin_api_key = Some(key.into());
        self
    }

    /// Sets the IMAP server hostname. Defaults to `mail.<domain>`.
    #[must_use]
    pub fn imap_host(mut self, host: impl Into<String>) -> Self {
        self.imap_host = Some(host.into());
        self
    }

    /// Sets the IMAP server port (default 993).
    #[must_use]
    pub fn imap_port(mut self, port: u16) -> Self {
        self.imap_port = Some(port);
        self
    }

    /// Places the store files inside `dir`.
    #[must_use]
    pub fn data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.storage = Some(StoragePaths::in_dir(dir));
        self
    }

    /// Sets explicit store paths.
    #[must_use]
    pub fn storage(mut self, storage: StoragePaths) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Caps how many mailboxes one request may create (default 50).
    #[must_use]
    pub fn max_batch_create(mut self, max: u32) -> Self {
        self.max_batch_create = Some(max);
        self
    }

    /// Sets timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Sets the IMAP connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .connect = timeout;
        self
    }

    /// Sets the IMAP authentication timeout.
    #[must_use]
    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .auth = timeout;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or invalid.
    pub fn build(self) -> Result<AppConfig> {
        let domain_raw = self.mail_domain.ok_or_else(|| Error::InvalidConfig {
            message: "mail domain is required".into(),
        })?;
        let mail_domain = validate_domain(&domain_raw)?;

        let key_raw = self
            .admin_api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::InvalidConfig {
                message: "admin API key is required".into(),
            })?;

        let max_batch_create = self.max_batch_create.unwrap_or(50);
        if max_batch_create == 0 {
            return Err(Error::InvalidConfig {
                message: "max batch size must be positive".into(),
            });
        }

        let admin_api_url = self
            .admin_api_url
            .unwrap_or_else(|| format!("https://mail.{mail_domain}/api/v1/add/mailbox"));
        let timeouts = self.timeouts.unwrap_or_default();

        let mut imap = ImapSettings::new(
            self.imap_host
                .unwrap_or_else(|| format!("mail.{mail_domain}")),
        );
        imap.port = self.imap_port.unwrap_or(993);
        imap.timeouts = timeouts.clone();

        Ok(AppConfig {
            port: self.port.unwrap_or(3000),
            mail_domain,
            admin_api_url,
            admin_api_key: SecretString::from(key_raw),
            imap,
            storage: self.storage.unwrap_or_default(),
            max_batch_create,
            timeouts,
        })
    }
}
