//! Route handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::{page, AppState};
use crate::error::{Error, Result};
use crate::mailbox::MailConnector;
use crate::provisioner::MailboxAdmin;

/// One row of the mailbox listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct MailboxEntry {
    pub email: String,
    pub password: String,
    pub otp: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatedMailbox {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateMailsResponse {
    pub success: bool,
    pub emails: Vec<CreatedMailbox>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateMailsRequest {
    #[serde(rename = "numberOfMails", default)]
    pub number_of_mails: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SelectionRequest {
    #[serde(default)]
    pub emails: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ListingResponse {
    pub success: bool,
    pub emails: Vec<MailboxEntry>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteMailsResponse {
    pub success: bool,
    pub message: String,
    pub removed: usize,
}

const INVALID_COUNT: &str = "Number of emails must be a positive integer.";
const NOTHING_TO_FETCH: &str = "Select at least one email to fetch OTPs.";
const NOTHING_TO_DELETE: &str = "No emails were selected for deletion.";

/// GET /
pub(crate) async fn index<A, C>(State(state): State<Arc<AppState<A, C>>>) -> Result<Html<String>>
where
    A: MailboxAdmin,
    C: MailConnector,
{
    let entries = listing(&state).await?;
    Ok(Html(page::render(&entries)))
}

/// POST /create-mails
pub(crate) async fn create_mails<A, C>(
    State(state): State<Arc<AppState<A, C>>>,
    payload: std::result::Result<Json<CreateMailsRequest>, JsonRejection>,
) -> Result<Json<CreateMailsResponse>>
where
    A: MailboxAdmin,
    C: MailConnector,
{
    let Json(request) = payload.map_err(|_| Error::invalid_request(INVALID_COUNT))?;
    let count = parse_count(request.number_of_mails.as_ref())?;

    if count > state.max_batch_create {
        return Err(Error::invalid_request(format!(
            "At most {} emails can be created per request.",
            state.max_batch_create
        )));
    }

    let mut created = Vec::new();
    for _ in 0..count {
        match state.admin.create_mailbox(&state.mail_domain).await {
            Ok(credential) => {
                if state.credentials.insert(&credential).await? {
                    created.push(CreatedMailbox {
                        email: credential.address().to_string(),
                        password: credential.password().to_string(),
                    });
                } else {
                    warn!(email = %credential.address(), "Created mailbox already stored, skipping");
                }
            }
            Err(e) => warn!(error = %e, "Mailbox creation failed, skipping"),
        }
    }

    state.credentials.compact().await?;
    info!(requested = count, created = created.len(), "Mailbox batch finished");

    Ok(Json(CreateMailsResponse {
        success: true,
        emails: created,
    }))
}

/// GET /get-otp-ajax?emails=..&emails=..
///
/// Accepts both `emails` and the `emails[]` form jQuery sends for arrays.
pub(crate) async fn get_otp_query<A, C>(
    State(state): State<Arc<AppState<A, C>>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<ListingResponse>>
where
    A: MailboxAdmin,
    C: MailConnector,
{
    let selected = params
        .into_iter()
        .filter(|(key, _)| key == "emails" || key == "emails[]")
        .map(|(_, value)| value)
        .collect();

    fetch_otps(&state, selected).await
}

/// POST /get-otp-ajax
pub(crate) async fn get_otp_json<A, C>(
    State(state): State<Arc<AppState<A, C>>>,
    payload: std::result::Result<Json<SelectionRequest>, JsonRejection>,
) -> Result<Json<ListingResponse>>
where
    A: MailboxAdmin,
    C: MailConnector,
{
    let Json(request) = payload.map_err(|_| Error::invalid_request(NOTHING_TO_FETCH))?;
    fetch_otps(&state, request.emails).await
}

/// POST /delete-mails
pub(crate) async fn delete_mails<A, C>(
    State(state): State<Arc<AppState<A, C>>>,
    payload: std::result::Result<Json<SelectionRequest>, JsonRejection>,
) -> Result<Json<DeleteMailsResponse>>
where
    A: MailboxAdmin,
    C: MailConnector,
{
    let Json(request) = payload.map_err(|_| Error::invalid_request(NOTHING_TO_DELETE))?;
    let selected = clean_selection(request.emails);
    if selected.is_empty() {
        return Err(Error::invalid_request(NOTHING_TO_DELETE));
    }

    let removed = state.credentials.remove(&selected).await?;
    let removed_otps = state.otps.remove(&selected).await?;
    info!(removed, removed_otps, "Mailboxes deleted");

    Ok(Json(DeleteMailsResponse {
        success: true,
        message: "Selected emails deleted.".to_string(),
        removed,
    }))
}

async fn fetch_otps<A, C>(
    state: &AppState<A, C>,
    selected: Vec<String>,
) -> Result<Json<ListingResponse>>
where
    A: MailboxAdmin,
    C: MailConnector,
{
    let selected = clean_selection(selected);
    if selected.is_empty() {
        return Err(Error::invalid_request(NOTHING_TO_FETCH));
    }

    let credentials = state.credentials.read_all().await?;
    state
        .extractor
        .extract_otps_for_selected(&credentials, &selected)
        .await;

    Ok(Json(ListingResponse {
        success: true,
        emails: listing(state).await?,
    }))
}

/// Every stored credential joined with its code, in credential-file order.
async fn listing<A, C>(state: &AppState<A, C>) -> Result<Vec<MailboxEntry>>
where
    A: MailboxAdmin,
    C: MailConnector,
{
    let credentials = state.credentials.read_all().await?;
    let otps: HashMap<String, String> = state
        .otps
        .read_all()
        .await?
        .into_iter()
        .map(|record| (record.address, record.code))
        .collect();

    Ok(credentials
        .into_iter()
        .map(|credential| MailboxEntry {
            otp: otps.get(credential.address()).cloned(),
            email: credential.address().to_string(),
            password: credential.password().to_string(),
        })
        .collect())
}

/// Accepts a JSON number or a numeric string, at least 1.
fn parse_count(value: Option<&Value>) -> Result<u32> {
    let count = match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    count
        .filter(|&n| n > 0)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| Error::invalid_request(INVALID_COUNT))
}

fn clean_selection(selected: Vec<String>) -> Vec<String> {
    selected
        .into_iter()
        .map(|address| address.trim().to_string())
        .filter(|address| !address.is_empty())
        .collect()
}
