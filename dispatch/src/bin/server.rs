//! Ride dispatch HTTP server.

use anyhow::Context;
use ride_dispatch::{
    AppState, Config, DispatchEngine, ExpirySweeper, Stores, build_router, metrics,
};
use ride_dispatch_core::environment::{Clock, SystemClock};
use ride_dispatch_postgres::{
    MIGRATOR, PostgresDriverEligibility, PostgresPresenceStore, PostgresRideStore,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{},ride_dispatch=debug,sqlx=warn", config.server.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ride dispatch server");

    config
        .dispatch
        .validate()
        .context("Invalid dispatch configuration")?;
    info!(
        liveness_window_secs = config.dispatch.liveness_window_secs,
        offer_ttl_secs = config.dispatch.offer_ttl_secs,
        tiers = config.dispatch.search_tiers.len(),
        "Configuration loaded"
    );

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .min_connections(config.postgres.min_connections)
        .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout))
        .connect(&config.postgres.url)
        .await
        .context("Failed to connect to database")?;
    MIGRATOR
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    info!("Database ready");

    let metrics_handle = metrics::install_prometheus().context("Failed to install metrics")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let stores = Stores {
        presence: Arc::new(PostgresPresenceStore::new(pool.clone())),
        rides: Arc::new(PostgresRideStore::new(pool.clone())),
        eligibility: Arc::new(PostgresDriverEligibility::new(pool.clone())),
    };
    let engine = Arc::new(DispatchEngine::new(
        stores,
        Arc::clone(&clock),
        config.dispatch.clone(),
    ));

    let (shutdown_tx, _) = broadcast::channel(1);
    let sweeper = config.dispatch.sweep_interval().map(|interval| {
        ExpirySweeper::new(
            engine.ride_store(),
            Arc::clone(&clock),
            interval,
            shutdown_tx.subscribe(),
        )
        .spawn()
    });

    let state = AppState::new(engine)
        .with_metrics(metrics_handle)
        .with_pool(pool);
    let app = build_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if shutdown_tx.send(()).is_err() {
        warn!("No background task was listening for shutdown");
    }
    if let Some(handle) = sweeper {
        if let Err(e) = handle.await {
            error!(error = %e, "Expiry sweeper task failed");
        }
    }

    info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
