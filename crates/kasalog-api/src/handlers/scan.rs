//! Capture endpoints: one session per scanned tag.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use kasalog_workflow::{CaptureAction, CaptureError, CaptureSession, CaptureState, ScanContext};

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ScanQuery {
    #[serde(rename = "umbrellaId", alias = "umbrella_id")]
    pub umbrella_id: Option<String>,
}

/// A coordinate field as typed: text from a form, or a JSON number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CoordinateField {
    Text(String),
    Number(f64),
}

impl CoordinateField {
    fn into_text(self) -> String {
        match self {
            CoordinateField::Text(text) => text,
            CoordinateField::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ManualEntry {
    pub latitude: CoordinateField,
    pub longitude: CoordinateField,
}

#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    pub session_id: Uuid,
    pub umbrella_id: Option<String>,
    pub secure_context: bool,
    pub status: CaptureState,
    pub actions: Vec<CaptureAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaptureResponse {
    fn new(session_id: Uuid, capture: &CaptureSession) -> Self {
        Self {
            session_id,
            umbrella_id: capture.umbrella_id().map(str::to_string),
            secure_context: capture.context().is_secure(),
            status: capture.state().clone(),
            actions: capture.actions(),
            error: None,
        }
    }

    fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Classify the origin of a scan request. TLS terminates at a proxy if
/// anywhere, so trust `X-Forwarded-Proto`; without it the request is plain
/// HTTP.
pub fn scan_context(headers: &HeaderMap) -> ScanContext {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
    };
    let scheme = header_str("x-forwarded-proto").unwrap_or("http");
    let host = header_str("x-forwarded-host").or_else(|| header_str(header::HOST.as_str()));
    ScanContext::from_origin(Some(scheme), host)
}

async fn find_session(
    state: &AppState,
    session_id: Uuid,
) -> Result<Arc<Mutex<CaptureSession>>, ApiError> {
    state
        .captures
        .get(session_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("scan session {} not found", session_id)))
}

/// `GET /scan?umbrellaId=...`: open a session and try automatic positioning.
pub async fn start_scan(
    State(state): State<AppState>,
    Query(query): Query<ScanQuery>,
    headers: HeaderMap,
) -> Json<CaptureResponse> {
    let context = scan_context(&headers);
    let capture = CaptureSession::new(
        query.umbrella_id,
        context,
        state.positions.clone(),
        state.store.clone(),
    )
    .with_options(state.acquire);

    let (session_id, session) = state.captures.insert(Mutex::new(capture)).await;
    let mut capture = session.lock().await;
    info!(
        subsystem = "api",
        component = "scan",
        session_id = %session_id,
        umbrella_id = capture.umbrella_id().unwrap_or("(missing)"),
        secure = context.is_secure(),
        "Scan session opened"
    );

    if matches!(capture.state(), CaptureState::Idle) {
        if let Err(e) = capture.start().await {
            warn!(subsystem = "api", component = "scan", error = %e, "Scan start refused");
        }
    }

    Json(CaptureResponse::new(session_id, &capture))
}

/// `GET /scan/:session`
pub async fn get_scan(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<CaptureResponse>, ApiError> {
    let session = find_session(&state, session_id).await?;
    let capture = session.lock().await;
    Ok(Json(CaptureResponse::new(session_id, &capture)))
}

/// `POST /scan/:session/retry`: automatic positioning again, from idle.
pub async fn retry(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<CaptureResponse>, ApiError> {
    let session = find_session(&state, session_id).await?;
    let mut capture = session.lock().await;
    capture.start().await?;
    Ok(Json(CaptureResponse::new(session_id, &capture)))
}

/// `POST /scan/:session/manual`: submit typed coordinates. Invalid input
/// answers 422 with the unchanged manual-entry state.
pub async fn submit_manual(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(entry): Json<ManualEntry>,
) -> Result<(StatusCode, Json<CaptureResponse>), ApiError> {
    let session = find_session(&state, session_id).await?;
    let mut capture = session.lock().await;

    let latitude = entry.latitude.into_text();
    let longitude = entry.longitude.into_text();
    match capture.submit_manual(&latitude, &longitude).await {
        Ok(_) => Ok((
            StatusCode::OK,
            Json(CaptureResponse::new(session_id, &capture)),
        )),
        Err(e @ CaptureError::InvalidCoordinates(_)) => Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(CaptureResponse::new(session_id, &capture).with_error(e)),
        )),
        Err(e) => Err(e.into()),
    }
}

/// `POST /scan/:session/locate`: pre-fill manual entry from the device.
pub async fn locate(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<CaptureResponse>, ApiError> {
    let session = find_session(&state, session_id).await?;
    let mut capture = session.lock().await;
    capture.use_current_position().await?;
    Ok(Json(CaptureResponse::new(session_id, &capture)))
}

/// `POST /scan/:session/back`
pub async fn back(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<CaptureResponse>, ApiError> {
    let session = find_session(&state, session_id).await?;
    let mut capture = session.lock().await;
    capture.back()?;
    Ok(Json(CaptureResponse::new(session_id, &capture)))
}

/// `POST /scan/:session/retry-manual`: from a failed save, or from idle.
pub async fn retry_manual(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<CaptureResponse>, ApiError> {
    let session = find_session(&state, session_id).await?;
    let mut capture = session.lock().await;
    capture.enter_manually()?;
    Ok(Json(CaptureResponse::new(session_id, &capture)))
}
