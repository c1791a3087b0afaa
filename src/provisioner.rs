//! Mailbox provisioning through the Mailcow admin API.
//!
//! [`MailcowProvisioner`] creates one mailbox per call with a random
//! local-part and password. Persisting the returned credential is left to the
//! caller.

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::store::MailboxCredential;
use async_trait::async_trait;
use email_address::EmailAddress;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Quota given to every new mailbox, in MiB.
pub const MAILBOX_QUOTA_MB: u32 = 1024;

const LOCAL_PART_LEN: usize = 10;
const PASSWORD_LEN: usize = 12;
const LOWER_ALNUM: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Creates mailboxes on a mail domain.
#[async_trait]
pub trait MailboxAdmin: Send + Sync {
    /// Creates a new mailbox on `domain` and returns its credentials.
    async fn create_mailbox(&self, domain: &str) -> Result<MailboxCredential>;
}

#[derive(Debug, Serialize)]
struct CreateMailboxRequest<'a> {
    local_part: &'a str,
    domain: &'a str,
    name: &'a str,
    quota: u32,
    password: &'a str,
    password2: &'a str,
    active: &'static str,
    tls_enforce_in: &'static str,
    tls_enforce_out: &'static str,
}

/// [`MailboxAdmin`] backed by Mailcow's `add/mailbox` endpoint.
pub struct MailcowProvisioner {
    http: reqwest::Client,
    api_url: String,
    api_key: SecretString,
}

impl MailcowProvisioner {
    /// Creates a provisioner posting to `api_url` with the given key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdminApiRequest`] if the HTTP client cannot be built.
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| Error::AdminApiRequest { source })?;

        Ok(Self {
            http,
            api_url: api_url.into(),
            api_key: SecretString::from(api_key.into()),
        })
    }

    /// Creates a provisioner from the application configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdminApiRequest`] if the HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            config.admin_api_url.clone(),
            config.admin_api_key(),
            config.timeouts.admin_api,
        )
    }

    /// The endpoint mailboxes are created at.
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl MailboxAdmin for MailcowProvisioner {
    #[instrument(
        name = "MailcowProvisioner::create_mailbox",
        skip(self),
        fields(api_url = %self.api_url)
    )]
    async fn create_mailbox(&self, domain: &str) -> Result<MailboxCredential> {
        let (local_part, password) = {
            let mut rng = rand::thread_rng();
            (generate_local_part(&mut rng), generate_password(&mut rng))
        };

        let address = format!("{local_part}@{domain}");
        if !EmailAddress::is_valid(&address) {
            return Err(Error::InvalidEmailFormat { email: address });
        }

        let request = CreateMailboxRequest {
            local_part: &local_part,
            domain,
            name: &local_part,
            quota: MAILBOX_QUOTA_MB,
            password: &password,
            password2: &password,
            active: "1",
            tls_enforce_in: "1",
            tls_enforce_out: "1",
        };

        debug!(email = %address, "Requesting mailbox creation");

        let response = self
            .http
            .post(&self.api_url)
            .header("X-API-Key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|source| Error::AdminApiRequest { source })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| Error::AdminApiRequest { source })?;

        interpret_response(status, &body).map_err(|message| Error::MailboxCreation { message })?;

        info!(email = %address, "Mailbox created");
        Ok(MailboxCredential::new(address, password))
    }
}

impl std::fmt::Debug for MailcowProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailcowProvisioner")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// A lowercase letter followed by nine lowercase letters or digits.
pub fn generate_local_part<R: Rng>(rng: &mut R) -> String {
    let mut local_part = String::with_capacity(LOCAL_PART_LEN);
    local_part.push(char::from(rng.gen_range(b'a'..=b'z')));
    for _ in 1..LOCAL_PART_LEN {
        local_part.push(char::from(LOWER_ALNUM[rng.gen_range(0..LOWER_ALNUM.len())]));
    }
    local_part
}

/// Twelve ASCII letters and digits.
pub fn generate_password<R: Rng>(rng: &mut R) -> String {
    (0..PASSWORD_LEN)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect()
}

/// Decides whether an admin API reply reports success.
///
/// Mailcow answers with a JSON array whose first entry carries `type` and
/// `msg`; `msg` is either a string or a list of strings. Any other shape is a
/// failure.
fn interpret_response(status: StatusCode, body: &str) -> std::result::Result<(), String> {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let first = parsed.as_ref().and_then(|value| match value {
        Value::Array(items) => items.first(),
        _ => None,
    });

    let succeeded = first
        .and_then(|entry| entry.get("type"))
        .and_then(Value::as_str)
        == Some("success");
    if status == StatusCode::OK && succeeded {
        return Ok(());
    }

    let message = first.and_then(|entry| entry.get("msg")).and_then(message_text);
    Err(match message {
        Some(message) => message,
        None if status != StatusCode::OK => format!("unexpected status {status}"),
        None => "unknown error".to_string(),
    })
}

fn message_text(msg: &Value) -> Option<String> {
    match msg {
        Value::String(text) => Some(text.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .map(|item| match item {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_local_part_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let local = generate_local_part(&mut rng);
            assert_eq!(local.len(), 10);
            assert!(local.chars().next().unwrap().is_ascii_lowercase());
            assert!(local
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_password_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let password = generate_password(&mut rng);
        assert_eq!(password.len(), 12);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_success_response() {
        let body = r#"[{"type":"success","log":["mailbox","add"],"msg":["mailbox_added","ab@example.com"]}]"#;
        assert_eq!(interpret_response(StatusCode::OK, body), Ok(()));
    }

    #[test]
    fn test_error_message_string() {
        let body = r#"[{"type":"danger","msg":"domain_invalid"}]"#;
        assert_eq!(
            interpret_response(StatusCode::OK, body),
            Err("domain_invalid".to_string())
        );
    }

    #[test]
    fn test_error_message_list() {
        let body = r#"[{"type":"danger","msg":["object_exists","ab@example.com"]}]"#;
        assert_eq!(
            interpret_response(StatusCode::OK, body),
            Err("object_exists, ab@example.com".to_string())
        );
    }

    #[test]
    fn test_error_without_message() {
        assert_eq!(
            interpret_response(StatusCode::OK, "[]"),
            Err("unknown error".to_string())
        );
        assert_eq!(
            interpret_response(StatusCode::OK, "not json"),
            Err("unknown error".to_string())
        );
    }

    #[test]
    fn test_object_body_is_failure() {
        let body = r#"{"type":"success","msg":"mailbox_added"}"#;
        assert_eq!(
            interpret_response(StatusCode::OK, body),
            Err("unknown error".to_string())
        );
    }

    #[test]
    fn test_non_200_is_failure() {
        let body = r#"[{"type":"success","msg":"mailbox_added"}]"#;
        assert_eq!(
            interpret_response(StatusCode::CREATED, body),
            Err("mailbox_added".to_string())
        );
        assert_eq!(
            interpret_response(StatusCode::UNAUTHORIZED, ""),
            Err("unexpected status 401 Unauthorized".to_string())
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let provisioner =
            MailcowProvisioner::new("http://localhost/api", "super-secret", Duration::from_secs(1))
                .unwrap();
        let debug_str = format!("{provisioner:?}");
        assert!(!debug_str.contains("super-secret"));
    }
}
