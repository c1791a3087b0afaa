//! Mailbox provisioner and OTP harvester web service.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mailbox_otp::web::{self, AppState};
use mailbox_otp::{AppConfig, ImapConnector, MailcowProvisioner};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailbox_otp=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(?config, "Loaded configuration");

    let admin = MailcowProvisioner::from_config(&config)?;
    let connector = ImapConnector::new(config.imap.clone());
    let state = Arc::new(AppState::new(&config, admin, connector));

    state.credentials.ensure_exists().await?;
    state.otps.ensure_exists().await?;
    let dropped = state.credentials.compact().await?;
    if dropped > 0 {
        tracing::info!(dropped, "Removed duplicate or malformed credential lines");
    }

    let app = web::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
