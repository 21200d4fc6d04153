//! Browse endpoints: list/map view sessions over all recorded locations.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use kasalog_workflow::{BrowseSession, BrowseView, ViewMode};

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct BrowseResponse {
    pub session_id: Uuid,
    #[serde(flatten)]
    pub view: BrowseView,
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: ViewMode,
}

async fn find_session(
    state: &AppState,
    session_id: Uuid,
) -> Result<Arc<BrowseSession>, ApiError> {
    state
        .browsers
        .get(session_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("browse session {} not found", session_id)))
}

fn respond(session_id: Uuid, session: &BrowseSession) -> Json<BrowseResponse> {
    Json(BrowseResponse {
        session_id,
        view: session.view(),
    })
}

/// `POST /locations/sessions`: list every record and start resolving
/// addresses in the background.
pub async fn open_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<BrowseResponse>), ApiError> {
    let session = BrowseSession::load(
        state.store.clone(),
        state.resolver.clone(),
        state.browse.clone(),
    )
    .await?;

    let (session_id, session) = state.browsers.insert(session).await;
    info!(
        subsystem = "api",
        component = "browse",
        session_id = %session_id,
        count = session.len(),
        "Browse session opened"
    );

    let enriching = session.clone();
    tokio::spawn(async move {
        let start = Instant::now();
        let applied = enriching.enrich().await;
        debug!(
            subsystem = "api",
            component = "browse",
            session_id = %session_id,
            applied,
            duration_ms = start.elapsed().as_millis() as u64,
            "Address enrichment finished"
        );
    });

    Ok((StatusCode::CREATED, respond(session_id, &session)))
}

/// `GET /locations/sessions/:session`
pub async fn get_view(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<BrowseResponse>, ApiError> {
    let session = find_session(&state, session_id).await?;
    Ok(respond(session_id, &session))
}

/// `PUT /locations/sessions/:session/mode`
pub async fn set_mode(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<ModeRequest>,
) -> Result<Json<BrowseResponse>, ApiError> {
    let session = find_session(&state, session_id).await?;
    session.set_view_mode(request.mode);
    Ok(respond(session_id, &session))
}

/// `POST /locations/sessions/:session/select/:record`
pub async fn select(
    State(state): State<AppState>,
    Path((session_id, record_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<BrowseResponse>, ApiError> {
    let session = find_session(&state, session_id).await?;
    session.select(record_id)?;
    Ok(respond(session_id, &session))
}

/// `DELETE /locations/sessions/:session/selection`
pub async fn clear_selection(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<BrowseResponse>, ApiError> {
    let session = find_session(&state, session_id).await?;
    session.clear_selection();
    Ok(respond(session_id, &session))
}

/// `DELETE /locations/sessions/:session/records/:record`: delete from the
/// store, then from the view. A store failure leaves the view untouched.
pub async fn delete_record(
    State(state): State<AppState>,
    Path((session_id, record_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<BrowseResponse>, ApiError> {
    let session = find_session(&state, session_id).await?;
    session.delete(record_id).await?;
    Ok(respond(session_id, &session))
}

/// `DELETE /locations/sessions/:session`: close the view; late address
/// results are discarded.
pub async fn close_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let session = state
        .browsers
        .remove(session_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("browse session {} not found", session_id)))?;
    session.close();
    Ok(StatusCode::NO_CONTENT)
}
