//! Process entry point: load configuration, boot the orchestration, serve.

use anyhow::{Context, Result};
use orchestrator_core::{config::Config, orchestration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,orchestrator_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting orchestrator core");

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!(auth_disabled = config.auth_disabled, "configuration loaded");

    let orchestration = orchestration::boot(&config).await.context("failed to boot orchestration")?;
    tracing::info!(runners = orchestration.runner_handles.len(), "job runners started");

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(%addr, "starting server");
    let listener = tokio::net::TcpListener::bind(&addr).await.context("failed to bind to address")?;

    axum::serve(listener, orchestration.router.into_make_service())
        .await
        .context("server error")?;

    Ok(())
}
