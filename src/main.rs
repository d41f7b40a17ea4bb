//! Process bootstrap: logging, configuration, store, sync components,
//! the fallback watchdog task, and the HTTP server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use ext_pulse::application::{
    AlertDispatcher, FallbackWatchdog, GapDetector, HealthSnapshotBuilder, SyncOrchestrator,
};
use ext_pulse::domain::MetricsProvider;
use ext_pulse::infrastructure::http_server::{router, AppState};
use ext_pulse::infrastructure::logging::init_logging;
use ext_pulse::infrastructure::{
    AppConfig, DatabaseConnection, ExtensionRepository, MarketplaceClient, MarketplaceClientConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env();
    init_logging(&config.logging)?;

    info!(
        bind_addr = %config.bind_addr,
        database_url = %config.database_url,
        production = config.production,
        "starting ext-pulse"
    );

    let db = DatabaseConnection::new(&config.database_url)
        .await
        .context("failed to open database")?;
    db.migrate().await.context("failed to run migrations")?;

    let repo = Arc::new(ExtensionRepository::new(db.pool().clone()));

    let client = MarketplaceClient::new(
        MarketplaceClientConfig {
            endpoint: config.marketplace_url.clone(),
            user_agent: config.sync.user_agent.clone(),
            timeout_seconds: config.sync.request_timeout_secs,
            max_requests_per_second: config.sync.max_requests_per_second,
        },
        config.retry.clone(),
    )
    .context("failed to build marketplace client")?;
    let provider: Arc<dyn MetricsProvider> = Arc::new(client);

    let gap_detector = GapDetector::new(repo.clone(), config.day_boundary_offset_minutes);
    let alerts = AlertDispatcher::new(config.alert_webhook_url.clone(), config.alert.clone());
    let orchestrator = Arc::new(SyncOrchestrator::new(
        repo.clone(),
        provider,
        gap_detector,
        alerts,
        &config,
    ));
    let health = Arc::new(HealthSnapshotBuilder::new(repo.clone()));

    if config.watchdog.enabled {
        let watchdog = FallbackWatchdog::new(
            health.clone(),
            orchestrator.clone(),
            Duration::from_secs(config.watchdog.poll_interval_secs),
        );
        tokio::spawn(watchdog.run());
    }

    let state = AppState {
        config: Arc::new(config),
        orchestrator,
        health,
    };

    let listener = tokio::net::TcpListener::bind(&state.config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", state.config.bind_addr))?;
    info!(addr = %state.config.bind_addr, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
    }
}
