#![warn(unused_extern_crates)]
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    routing::{get, post},
};
use dotenv::dotenv;
use herald::{
    config::Config, discord_api::DiscordApi, store::AnnouncementStore, sync::SyncEngine,
    tally_api::TallyApi,
};
use tokio::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<SyncEngine<DiscordApi>>>,
    admin_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize JSON logging for stdout
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        // HTTP/networking crates
        .add_directive("hyper_util=off".parse().unwrap())
        .add_directive("reqwest=off".parse().unwrap());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true),
        )
        .init();

    info!("Herald service starting up");

    let config = Config::from_env()?;

    let store = AnnouncementStore::connect(&config.database_url).await?;
    info!("Database connection established");

    let api = TallyApi::new(config.tally_api_key.clone(), config.organization_id.clone());
    let notifier = DiscordApi::new(
        config.discord_token.clone(),
        config.proposals_channel_id.clone(),
    );

    let mut engine = SyncEngine::new(api, notifier, store, config.governor_slug.clone());
    engine.hydrate().await?;
    let engine = Arc::new(Mutex::new(engine));

    // Health check and admin server
    let state = AppState {
        engine: engine.clone(),
        admin_token: config.admin_token.clone(),
    };
    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/admin/clear", post(clear_announcements))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000")
        .await
        .context("Failed to bind health check server")?;
    let addr = listener.local_addr().context("Failed to read local address")?;

    let server_handle = tokio::spawn(async move {
        info!(address = %addr, "Starting health check server");
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Health check server error");
        }
    });

    let sync_interval = config.sync_interval;
    let sync_handle = tokio::spawn(async move {
        loop {
            info!("Running sync cycle");
            {
                let mut engine = engine.lock().await;
                match engine.run_cycle().await {
                    Ok(stats) => info!(
                        fetched = stats.fetched,
                        announced = stats.announced,
                        updated = stats.updated,
                        finalized = stats.finalized,
                        failed = stats.failed,
                        "Sync cycle finished"
                    ),
                    Err(e) => error!(error = %e, "Sync cycle runtime error"),
                }
            }
            info!(
                "Sync cycle completed, sleeping for {} seconds",
                sync_interval.as_secs()
            );
            tokio::time::sleep(sync_interval).await;
        }
    });

    info!("All tasks started, application running indefinitely");

    tokio::select! {
        result = server_handle => {
            error!("Health server task completed unexpectedly: {:?}", result);
        }
        result = sync_handle => {
            error!("Sync task completed unexpectedly: {:?}", result);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully");
        }
    }

    info!("Application shutting down");
    Ok(())
}

/// Admin reset, gated on the configured bearer token. Clears the announced
/// proposal records so every active proposal is treated as new again.
async fn clear_announcements(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (StatusCode, String) {
    let Some(expected) = state.admin_token.as_deref() else {
        return (StatusCode::NOT_FOUND, "admin endpoints disabled".to_string());
    };

    let authorized = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {expected}"))
        .unwrap_or(false);
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "invalid admin token".to_string());
    }

    let mut engine = state.engine.lock().await;
    match engine.clear().await {
        Ok(removed) => (
            StatusCode::OK,
            format!("cleared {removed} announced proposals"),
        ),
        Err(e) => {
            error!(error = %e, "Failed to clear announcements");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to clear announcements".to_string(),
            )
        }
    }
}
