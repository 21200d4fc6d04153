//! kasalog API server.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use kasalog_api::{AppConfig, AppState, PositionBackend, StoreBackend};
use kasalog_core::{
    AcquireOptions, AddressResolver, InMemoryLocationRepository, LocationRepository,
    PositionSource,
};
use kasalog_db::{Database, PoolConfig};
use kasalog_geo::{FixedPositionSource, GpsdPositionSource, NominatimGeocoder, NoPositionSource};
use kasalog_workflow::BrowseOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "kasalog_api=debug,kasalog_workflow=debug,kasalog_geo=info,tower_http=debug".into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally log to a daily-rotated file
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("kasalog-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            // No ANSI in files unless asked for
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = AppConfig::from_env()?;

    // Store
    let mut database = None;
    let store: Arc<dyn LocationRepository> = match config.store {
        StoreBackend::Postgres => {
            let db = Database::connect_with_config(&config.database_url, PoolConfig::from_env())
                .await?;
            db.migrate().await?;
            info!(subsystem = "database", "Migrations applied");
            let repo: Arc<dyn LocationRepository> = Arc::new(db.locations.clone());
            database = Some(db);
            repo
        }
        StoreBackend::Memory => {
            warn!(
                subsystem = "database",
                "Using in-memory store; records are lost on restart"
            );
            Arc::new(InMemoryLocationRepository::new())
        }
    };

    // Positioning
    let positions: Arc<dyn PositionSource> = match config.position {
        PositionBackend::Gpsd => Arc::new(GpsdPositionSource::new(config.gpsd_addr.clone())),
        PositionBackend::Fixed => match config.fixed_position {
            Some(coordinate) => Arc::new(FixedPositionSource::new(coordinate)),
            None => anyhow::bail!("FIXED_POSITION is required for POSITION_SOURCE=fixed"),
        },
        PositionBackend::None => Arc::new(NoPositionSource),
    };

    // Reverse geocoding
    let resolver: Arc<dyn AddressResolver> =
        Arc::new(NominatimGeocoder::new(config.geocoder.clone())?);

    info!(
        store = %config.store,
        position_source = %config.position,
        geocoder = %config.geocoder.base_url,
        geocode_concurrency = config.geocode_concurrency,
        "Backends configured"
    );

    let mut state = AppState::new(store, positions, resolver)
        .with_acquire_options(AcquireOptions {
            timeout: config.acquire_timeout,
            ..AcquireOptions::default()
        })
        .with_browse_options(BrowseOptions {
            concurrency: config.geocode_concurrency,
            tiles: config.tiles.clone(),
            ..BrowseOptions::default()
        });
    if let Some(db) = database {
        state = state.with_database(db);
    }

    // Idle session sweeper
    let shutdown = CancellationToken::new();
    let sweeper = {
        let state = state.clone();
        let shutdown = shutdown.clone();
        let ttl = config.session_ttl;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ttl / 2);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        state.evict_idle_sessions(ttl).await;
                    }
                }
            }
        })
    };

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, kasalog_api::app(state))
        .with_graceful_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => warn!(error = %e, "Failed to listen for shutdown signal"),
            }
        })
        .await?;

    shutdown.cancel();
    sweeper.await.ok();
    Ok(())
}
