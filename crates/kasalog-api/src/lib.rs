//! # kasalog-api
//!
//! JSON API over the capture and browse workflows. The binary in `main.rs`
//! wires configuration, logging and backends; this library holds the router
//! so tests can serve it against in-memory backends.

pub mod config;
pub mod error;
pub mod handlers;
pub mod sessions;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use tracing::debug;
use uuid::Uuid;

use kasalog_core::{AcquireOptions, AddressResolver, LocationRepository, PositionSource};
use kasalog_db::Database;
use kasalog_workflow::{BrowseOptions, BrowseSession, CaptureSession};

pub use config::{AppConfig, ConfigError, PositionBackend, StoreBackend};
pub use error::ApiError;
pub use sessions::SessionRegistry;

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LocationRepository>,
    pub positions: Arc<dyn PositionSource>,
    pub resolver: Arc<dyn AddressResolver>,
    /// Set when records live in PostgreSQL; used by the health check.
    pub database: Option<Database>,
    pub acquire: AcquireOptions,
    pub browse: BrowseOptions,
    pub captures: SessionRegistry<Mutex<CaptureSession>>,
    pub browsers: SessionRegistry<BrowseSession>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn LocationRepository>,
        positions: Arc<dyn PositionSource>,
        resolver: Arc<dyn AddressResolver>,
    ) -> Self {
        Self {
            store,
            positions,
            resolver,
            database: None,
            acquire: AcquireOptions::default(),
            browse: BrowseOptions::default(),
            captures: SessionRegistry::new(),
            browsers: SessionRegistry::new(),
        }
    }

    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_acquire_options(mut self, acquire: AcquireOptions) -> Self {
        self.acquire = acquire;
        self
    }

    pub fn with_browse_options(mut self, browse: BrowseOptions) -> Self {
        self.browse = browse;
        self
    }

    /// Forget sessions idle for longer than `ttl`. Evicted browse sessions
    /// are closed so their enrichment stops.
    pub async fn evict_idle_sessions(&self, ttl: Duration) -> usize {
        let captures = self.captures.evict_idle(ttl).await.len();
        let browsers = self.browsers.evict_idle(ttl).await;
        for session in &browsers {
            session.close();
        }
        let evicted = captures + browsers.len();
        if evicted > 0 {
            debug!(subsystem = "sessions", evicted, "Evicted idle sessions");
        }
        evicted
    }
}

/// Routes without middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        // Capture
        .route("/scan", get(handlers::scan::start_scan))
        .route("/scan/:session", get(handlers::scan::get_scan))
        .route("/scan/:session/retry", post(handlers::scan::retry))
        .route("/scan/:session/manual", post(handlers::scan::submit_manual))
        .route("/scan/:session/locate", post(handlers::scan::locate))
        .route("/scan/:session/back", post(handlers::scan::back))
        .route(
            "/scan/:session/retry-manual",
            post(handlers::scan::retry_manual),
        )
        // Browse
        .route(
            "/locations/sessions",
            post(handlers::browse::open_session),
        )
        .route(
            "/locations/sessions/:session",
            get(handlers::browse::get_view).delete(handlers::browse::close_session),
        )
        .route(
            "/locations/sessions/:session/mode",
            put(handlers::browse::set_mode),
        )
        .route(
            "/locations/sessions/:session/select/:record",
            post(handlers::browse::select),
        )
        .route(
            "/locations/sessions/:session/selection",
            delete(handlers::browse::clear_selection),
        )
        .route(
            "/locations/sessions/:session/records/:record",
            delete(handlers::browse::delete_record),
        )
        .with_state(state)
}

/// Routes with request ids and HTTP tracing.
pub fn app(state: AppState) -> Router {
    router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id()),
    )
}
