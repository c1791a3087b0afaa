//! Provisioner tests against a local stand-in for the Mailcow admin API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use mailbox_otp::{Error, MailboxAdmin, MailcowProvisioner};
use serde_json::{json, Value};
use tokio::net::TcpListener;

const API_PATH: &str = "/api/v1/add/mailbox";

#[derive(Clone)]
struct FakeApi {
    reply_status: StatusCode,
    reply_body: Value,
    requests: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

async fn add_mailbox(
    State(api): State<FakeApi>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let key = headers
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    api.requests.lock().unwrap().push((key, body));
    (api.reply_status, Json(api.reply_body.clone()))
}

/// Starts the fake API and returns its endpoint URL and request log.
async fn spawn_api(
    reply_status: StatusCode,
    reply_body: Value,
) -> (String, Arc<Mutex<Vec<(Option<String>, Value)>>>) {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let api = FakeApi {
        reply_status,
        reply_body,
        requests: Arc::clone(&requests),
    };
    let app = Router::new()
        .route(API_PATH, post(add_mailbox))
        .with_state(api);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}{API_PATH}"), requests)
}

fn provisioner(url: &str) -> MailcowProvisioner {
    MailcowProvisioner::new(url, "test-key", Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_creates_mailbox() {
    let (url, requests) = spawn_api(
        StatusCode::OK,
        json!([{ "type": "success", "log": ["mailbox", "add"], "msg": ["mailbox_added"] }]),
    )
    .await;

    let credential = provisioner(&url)
        .create_mailbox("example.test")
        .await
        .unwrap();

    let (local_part, domain) = credential.address().split_once('@').unwrap();
    assert_eq!(domain, "example.test");
    assert_eq!(local_part.len(), 10);
    assert_eq!(credential.password().len(), 12);

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let (key, body) = &requests[0];
    assert_eq!(key.as_deref(), Some("test-key"));
    assert_eq!(body["local_part"], local_part);
    assert_eq!(body["name"], local_part);
    assert_eq!(body["domain"], "example.test");
    assert_eq!(body["quota"], 1024);
    assert_eq!(body["password"], credential.password());
    assert_eq!(body["password2"], credential.password());
    assert_eq!(body["active"], "1");
    assert_eq!(body["tls_enforce_in"], "1");
    assert_eq!(body["tls_enforce_out"], "1");
}

#[tokio::test]
async fn test_reports_api_message() {
    let (url, _) = spawn_api(
        StatusCode::OK,
        json!([{ "type": "danger", "msg": ["domain_invalid", "example.test"] }]),
    )
    .await;

    let err = provisioner(&url)
        .create_mailbox("example.test")
        .await
        .unwrap_err();

    match err {
        Error::MailboxCreation { message } => assert_eq!(message, "domain_invalid, example.test"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_object_reply_is_failure() {
    let (url, requests) = spawn_api(
        StatusCode::OK,
        json!({ "type": "success", "msg": "mailbox_added" }),
    )
    .await;

    let err = provisioner(&url)
        .create_mailbox("example.test")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MailboxCreation { .. }));
    assert_eq!(requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_non_200_is_failure() {
    let (url, _) = spawn_api(StatusCode::INTERNAL_SERVER_ERROR, json!([])).await;

    let err = provisioner(&url)
        .create_mailbox("example.test")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MailboxCreation { .. }));
}

#[tokio::test]
async fn test_unreachable_api() {
    let err = provisioner("http://127.0.0.1:1/api/v1/add/mailbox")
        .create_mailbox("example.test")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::AdminApiRequest { .. }));
}
