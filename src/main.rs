//! Invite Tracker Service
//!
//! Main entry point for the invite tracker bot.
//! This service provides:
//! - Gateway connection for invite and member events
//! - Invite snapshot cache with per-guild join resolution
//! - Join announcements in each guild's invite log channel

use invite_tracker::config::{AppConfig, LogFormat};
use invite_tracker::database::{create_pool, run_migrations};
use invite_tracker::dispatcher::EventDispatcher;
use invite_tracker::error::{AppError, AppResult};
use invite_tracker::platform::{DiscordRestClient, GatewayClient, PlatformClient};
use invite_tracker::repositories::{AttributionRepository, AttributionStore, InMemoryAttributionStore};
use invite_tracker::services::{InviteTracker, JoinLog};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Buffer between the gateway reader and the dispatcher
const EVENT_CHANNEL_CAPACITY: usize = 1024;

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("invite_tracker={},sqlx=warn", config.log_level).into()
    });

    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load environment variables first
    dotenv::dotenv().ok();

    // Load configuration
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        AppError::Config(e)
    })?;

    init_tracing(&config);

    info!("Invite tracker starting");
    info!("Environment: {}", config.environment);
    info!("Log level: {}", config.log_level);
    info!("Invite delete refresh delay: {:?}", config.delete_refresh_delay());

    // =========================================================================
    // ATTRIBUTION STORE
    // =========================================================================
    let attributions: Arc<dyn AttributionStore> = match &config.database {
        Some(database) => {
            info!("Connecting to database...");
            let pool = create_pool(database).await.map_err(|e| {
                error!("Failed to create database pool: {}", e);
                AppError::Database(e)
            })?;

            info!("Running database migrations...");
            run_migrations(&pool, None).await.map_err(|e| {
                error!("Database migration failed: {}", e);
                AppError::Database(e)
            })?;

            info!("✓ Attribution records stored in Postgres");
            Arc::new(AttributionRepository::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set - attribution records will not survive a restart");
            Arc::new(InMemoryAttributionStore::new())
        }
    };

    // =========================================================================
    // PLATFORM CLIENT
    // =========================================================================
    let rest = Arc::new(DiscordRestClient::new(&config.discord)?);
    let bot = rest.current_user().await.map_err(|e| {
        error!("Failed to fetch bot identity: {}", e);
        AppError::Platform(e)
    })?;
    info!("✓ Authenticated as {} ({})", bot.username, bot.id);

    // =========================================================================
    // CORE SERVICES
    // =========================================================================
    let tracker = Arc::new(InviteTracker::new(
        rest.clone(),
        attributions,
        bot.id,
        config.delete_refresh_delay(),
    ));
    let join_log = Arc::new(JoinLog::new(rest.clone(), config.invite_log_channels.clone()));
    info!(
        "✓ Invite tracker initialized ({} invite log channels)",
        config.invite_log_channels.len()
    );

    // =========================================================================
    // BACKGROUND TASKS
    // =========================================================================
    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let dispatcher = EventDispatcher::new(tracker.clone(), join_log);
    let dispatcher_handle = tokio::spawn(async move {
        dispatcher.start(events_rx).await;
    });

    let gateway = GatewayClient::new(&config.discord, events_tx);
    let gateway_handle = tokio::spawn(async move {
        gateway.start().await;
    });
    info!("✓ Gateway client started");
    info!("Press Ctrl+C to shutdown gracefully");

    // =========================================================================
    // SHUTDOWN HANDLING
    // =========================================================================
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down gracefully...");
        }
        _ = gateway_handle => {
            error!("Gateway client exited unexpectedly");
        }
        _ = dispatcher_handle => {
            error!("Event dispatcher exited unexpectedly");
        }
    }

    tracker.shutdown();
    info!("Invite tracker shutdown complete");
    Ok(())
}
