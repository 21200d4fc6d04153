use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use tracing::warn;

use crate::AppState;

/// `GET /health`
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store = match &state.database {
        Some(db) => match db.ping().await {
            Ok(()) => "ok",
            Err(e) => {
                warn!(subsystem = "api", component = "health", error = %e, "Database ping failed");
                "unavailable"
            }
        },
        None => "memory",
    };
    let status = if store == "unavailable" {
        "degraded"
    } else {
        "healthy"
    };

    Json(serde_json::json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "store": store,
        "position_source": state.positions.name(),
    }))
}
