//! HTTP front end.
//!
//! A single HTML page plus three JSON endpoints. Handlers are thin: they
//! validate input, call the provisioner or the extraction engine and read the
//! stores back for the response.

mod handlers;
mod page;
mod response;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::extractor::OtpExtractor;
use crate::mailbox::MailConnector;
use crate::provisioner::MailboxAdmin;
use crate::store::{AuditLog, CredentialStore, OtpStore};

/// Shared state of the HTTP handlers.
pub struct AppState<A, C> {
    /// Creates new mailboxes.
    pub admin: A,
    /// Harvests OTPs from selected mailboxes.
    pub extractor: OtpExtractor<C>,
    /// Credentials of every provisioned mailbox.
    pub credentials: Arc<CredentialStore>,
    /// Harvested codes.
    pub otps: Arc<OtpStore>,
    /// Domain new mailboxes are created on.
    pub mail_domain: String,
    /// Upper bound on `numberOfMails` per request.
    pub max_batch_create: u32,
}

impl<A, C> AppState<A, C>
where
    A: MailboxAdmin,
    C: MailConnector,
{
    /// Builds the state with stores at the configured paths.
    pub fn new(config: &AppConfig, admin: A, connector: C) -> Self {
        let credentials = Arc::new(CredentialStore::new(&config.storage.credentials));
        let otps = Arc::new(OtpStore::new(&config.storage.otps));
        let audit = Arc::new(AuditLog::new(&config.storage.audit_log));

        Self {
            admin,
            extractor: OtpExtractor::new(connector, Arc::clone(&otps), audit),
            credentials,
            otps,
            mail_domain: config.mail_domain.clone(),
            max_batch_create: config.max_batch_create,
        }
    }
}

/// Creates the router with all routes.
pub fn create_router<A, C>(state: Arc<AppState<A, C>>) -> Router
where
    A: MailboxAdmin + 'static,
    C: MailConnector + 'static,
{
    Router::new()
        .route("/", get(handlers::index))
        .route("/create-mails", post(handlers::create_mails))
        .route(
            "/get-otp-ajax",
            get(handlers::get_otp_query).post(handlers::get_otp_json),
        )
        .route("/delete-mails", post(handlers::delete_mails))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
