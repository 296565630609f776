use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use fieldsync_core::config::SyncConfig;
use fieldsync_db::persistence::SqliteReportPersistence;
use fieldsync_db::store::ReportStore;
use fieldsync_sync::api::HttpReportApi;
use fieldsync_sync::engine::{Collaborators, EngineSettings};
use fieldsync_sync::infrastructure::{HttpInfrastructureApi, InfrastructureSync};
use fieldsync_sync::photo::{HttpPhotoUploader, PhotoStaging};
use fieldsync_sync::prober::HttpProber;
use fieldsync_sync::ReportsContext;
use fieldsync_worker::background;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "fieldsync_worker=debug,fieldsync_sync=debug,fieldsync_db=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = SyncConfig::from_env().context("Invalid configuration")?;
    tracing::info!(
        api = %config.api_base_url,
        probe = %config.probe.url,
        retention_days = config.retention_days,
        "Loaded sync configuration"
    );

    // --- Database ---
    let pool = fieldsync_db::create_pool(&config.database_url)
        .await
        .context("Failed to open database")?;
    tracing::info!("Database connection pool created");

    fieldsync_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    fieldsync_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Report store ---
    let persistence = Arc::new(SqliteReportPersistence::new(pool.clone()));
    let store = Arc::new(
        ReportStore::open(persistence)
            .await
            .context("Failed to load reports")?,
    );

    // --- HTTP collaborators ---
    let client = reqwest::Client::new();
    let collaborators = Collaborators {
        probe: Arc::new(HttpProber::with_client(client.clone(), config.probe.clone())),
        api: Arc::new(HttpReportApi::new(client.clone(), config.api_base_url.clone())),
        uploader: Arc::new(HttpPhotoUploader::new(
            client.clone(),
            config.api_base_url.clone(),
        )),
        staging: PhotoStaging::new(config.photo_dir.clone()),
    };

    // --- Reports context ---
    let context =
        ReportsContext::start(store, collaborators, EngineSettings::from_config(&config)).await;
    tracing::info!(
        pending = context.pending_count().await,
        "Reports context started"
    );

    // --- Background tasks ---
    let cancel = CancellationToken::new();

    let event_log_handle = tokio::spawn(background::event_log::run(
        context.subscribe(),
        cancel.clone(),
    ));

    let retention_handle = tokio::spawn(background::retention::run(
        Arc::clone(&context),
        config.retention_days,
        background::retention::SWEEP_INTERVAL,
        cancel.clone(),
    ));

    let infrastructure = Arc::new(
        InfrastructureSync::new(
            pool,
            Arc::new(HttpInfrastructureApi::new(client, config.api_base_url.clone())),
        )
        .with_request_timeout(config.infrastructure_timeout()),
    );
    let infrastructure_handle = tokio::spawn(background::infrastructure_sync::run(
        infrastructure,
        background::infrastructure_sync::SYNC_INTERVAL,
        cancel.clone(),
    ));

    tracing::info!("Worker running, press Ctrl-C to stop");
    shutdown_signal().await;

    // --- Shutdown ---
    tracing::info!("Shutting down");
    cancel.cancel();
    for handle in [retention_handle, infrastructure_handle, event_log_handle] {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    // Engines stop last; interrupted reports stay `loading` and resume on
    // the next start.
    context.dispose().await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
