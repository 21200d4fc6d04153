//! Capture workflow: one scan session from tag read to stored location.
//!
//! ```text
//! Idle ──start──▶ AutoAcquiring ──fix──▶ Saving ──ok──▶ Succeeded
//!  ▲  ╲                │                   ▲   ╲
//!  │   enter_manually  no fix              │    err──▶ Failed(SaveFailed)
//!  │        ╲          ▼                   │              │
//!  └──back── ManualInput ──submit_manual───┘   retry_manual / back
//! ```
//!
//! A missing umbrella id is terminal before any acquisition. Nothing retries
//! on its own; every retry is a caller action.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use kasalog_core::{
    AcquireOptions, Coordinate, LocationRepository, NewLocation, PositionError, PositionSource,
};

use crate::display::format_timestamp;
use crate::error::CaptureError;

/// Shown when the scan link carries no umbrella id.
pub const MISSING_IDENTIFIER_MESSAGE: &str = "Umbrella ID not found";

/// Shown when the store rejects the record.
pub const SAVE_FAILED_MESSAGE: &str = "Failed to record the location";

/// Manual-entry notice after an acquisition failure.
pub const POSITION_FAILED_NOTICE: &str =
    "Could not get your location. Check the location permission or enter the coordinates manually.";

/// Manual-entry notice when the scan came over an insecure connection.
pub const INSECURE_CONTEXT_NOTICE: &str =
    "Location access needs a secure (HTTPS) connection. Enter the coordinates manually.";

// =============================================================================
// SCAN CONTEXT
// =============================================================================

/// Where the scan request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanContext {
    secure: bool,
}

impl ScanContext {
    pub fn secure() -> Self {
        Self { secure: true }
    }

    pub fn insecure() -> Self {
        Self { secure: false }
    }

    /// Classify an origin. HTTPS is secure; so is plain HTTP to a loopback
    /// host (`localhost`, `*.localhost`, `127.0.0.1`, `::1`).
    pub fn from_origin(scheme: Option<&str>, host: Option<&str>) -> Self {
        let https = scheme.is_some_and(|s| s.eq_ignore_ascii_case("https"));
        let loopback = host.map(host_name).is_some_and(is_loopback);
        Self {
            secure: https || loopback,
        }
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }
}

/// Strip a port from a `Host` header value.
fn host_name(host: &str) -> &str {
    let host = host.trim();
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        // More than one colon without brackets is a bare IPv6 address.
        Some((name, _)) if !name.contains(':') => name,
        _ => host,
    }
}

fn is_loopback(host: &str) -> bool {
    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        return ip.is_loopback();
    }
    let host = host.to_ascii_lowercase();
    host == "localhost" || host.ends_with(".localhost")
}

// =============================================================================
// STATE
// =============================================================================

/// The two free-text fields of manual entry, plus what to tell the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManualForm {
    pub latitude: String,
    pub longitude: String,
    /// Why the user is here (acquisition failed, insecure connection).
    pub notice: Option<String>,
    /// Why the last submission was refused.
    pub validation_error: Option<String>,
}

impl ManualForm {
    fn with_notice(notice: Option<&str>) -> Self {
        Self {
            notice: notice.map(str::to_string),
            ..Self::default()
        }
    }

    fn prefill(&mut self, coordinate: Coordinate) {
        self.latitude = coordinate.latitude_display();
        self.longitude = coordinate.longitude_display();
    }
}

/// What a successful capture shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureReceipt {
    pub record_id: Uuid,
    pub umbrella_id: String,
    pub coordinate: Coordinate,
    /// Six-decimal latitude.
    pub latitude: String,
    /// Six-decimal longitude.
    pub longitude: String,
    /// Local time when the save completed, as displayed.
    pub recorded_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MissingIdentifier,
    SaveFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureFailure {
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CaptureState {
    Idle,
    AutoAcquiring,
    ManualInput(ManualForm),
    Saving,
    Succeeded(CaptureReceipt),
    Failed(CaptureFailure),
}

impl CaptureState {
    pub fn name(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::AutoAcquiring => "auto_acquiring",
            CaptureState::ManualInput(_) => "manual_input",
            CaptureState::Saving => "saving",
            CaptureState::Succeeded(_) => "succeeded",
            CaptureState::Failed(_) => "failed",
        }
    }

    /// Forward actions available to the user. Only the transient states
    /// have none.
    pub fn actions(&self) -> Vec<CaptureAction> {
        use CaptureAction::*;
        match self {
            CaptureState::Idle => vec![Retry, EnterManually, Home],
            CaptureState::AutoAcquiring | CaptureState::Saving => vec![],
            CaptureState::ManualInput(_) => vec![Submit, UseCurrentPosition, Back],
            CaptureState::Succeeded(_) => vec![ViewLocations, Home],
            CaptureState::Failed(f) => match f.kind {
                FailureKind::MissingIdentifier => vec![Home],
                FailureKind::SaveFailed => vec![EnterManually, Back, Home],
            },
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CaptureState::Succeeded(_)
                | CaptureState::Failed(CaptureFailure {
                    kind: FailureKind::MissingIdentifier,
                    ..
                })
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureAction {
    /// Try automatic positioning again.
    Retry,
    EnterManually,
    UseCurrentPosition,
    Submit,
    Back,
    ViewLocations,
    Home,
}

// =============================================================================
// SESSION
// =============================================================================

/// A single scan, driven by caller actions.
pub struct CaptureSession {
    umbrella_id: Option<String>,
    context: ScanContext,
    options: AcquireOptions,
    positions: Arc<dyn PositionSource>,
    store: Arc<dyn LocationRepository>,
    state: CaptureState,
    /// Fields to restore when returning to manual entry after a failed save.
    draft: ManualForm,
}

impl CaptureSession {
    /// Open a session for a scan. A missing or blank id fails immediately;
    /// any other id is kept exactly as scanned.
    pub fn new(
        umbrella_id: Option<String>,
        context: ScanContext,
        positions: Arc<dyn PositionSource>,
        store: Arc<dyn LocationRepository>,
    ) -> Self {
        let umbrella_id = umbrella_id.filter(|id| !id.trim().is_empty());

        let state = if umbrella_id.is_some() {
            CaptureState::Idle
        } else {
            warn!(subsystem = "capture", "Scan without umbrella id");
            CaptureState::Failed(CaptureFailure {
                kind: FailureKind::MissingIdentifier,
                message: MISSING_IDENTIFIER_MESSAGE.to_string(),
            })
        };

        Self {
            umbrella_id,
            context,
            options: AcquireOptions::default(),
            positions,
            store,
            state,
            draft: ManualForm::default(),
        }
    }

    pub fn with_options(mut self, options: AcquireOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn actions(&self) -> Vec<CaptureAction> {
        self.state.actions()
    }

    pub fn umbrella_id(&self) -> Option<&str> {
        self.umbrella_id.as_deref()
    }

    pub fn context(&self) -> ScanContext {
        self.context
    }

    fn refuse(&self, action: &'static str) -> CaptureError {
        if self.umbrella_id.is_none() {
            return CaptureError::MissingIdentifier;
        }
        CaptureError::InvalidTransition {
            action,
            state: self.state.name(),
        }
    }

    fn failure_notice(&self) -> &'static str {
        if self.context.is_secure() {
            POSITION_FAILED_NOTICE
        } else {
            INSECURE_CONTEXT_NOTICE
        }
    }

    async fn acquire(&self) -> Result<Coordinate, PositionError> {
        let start = Instant::now();
        let result = self.positions.acquire(&self.options).await;
        match &result {
            Ok(_) => debug!(
                subsystem = "capture",
                source = self.positions.name(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Position acquired"
            ),
            Err(e) => info!(
                subsystem = "capture",
                source = self.positions.name(),
                reason = ?e,
                secure = self.context.is_secure(),
                "Position acquisition failed"
            ),
        }
        result
    }

    /// Automatic positioning, then save. Falls back to manual entry when no
    /// position is available.
    pub async fn start(&mut self) -> Result<&CaptureState, CaptureError> {
        if !matches!(self.state, CaptureState::Idle) {
            return Err(self.refuse("start"));
        }

        self.state = CaptureState::AutoAcquiring;
        match self.acquire().await {
            Ok(coordinate) => {
                self.draft = ManualForm::default();
                self.draft.prefill(coordinate);
                self.save(coordinate).await;
            }
            Err(_) => {
                let mut form = ManualForm::with_notice(Some(self.failure_notice()));
                form.latitude = self.draft.latitude.clone();
                form.longitude = self.draft.longitude.clone();
                self.state = CaptureState::ManualInput(form);
            }
        }
        Ok(&self.state)
    }

    /// Skip automatic positioning.
    pub fn enter_manually(&mut self) -> Result<&CaptureState, CaptureError> {
        match &self.state {
            CaptureState::Idle => {
                self.state = CaptureState::ManualInput(ManualForm::with_notice(None));
                Ok(&self.state)
            }
            CaptureState::Failed(CaptureFailure {
                kind: FailureKind::SaveFailed,
                ..
            }) => self.retry_manual(),
            _ => Err(self.refuse("enter coordinates manually")),
        }
    }

    /// Validate and save the typed coordinates.
    ///
    /// Invalid input stays in manual entry with a validation error; the store
    /// is not called.
    pub async fn submit_manual(
        &mut self,
        latitude: &str,
        longitude: &str,
    ) -> Result<&CaptureState, CaptureError> {
        let CaptureState::ManualInput(form) = &mut self.state else {
            return Err(self.refuse("submit"));
        };

        form.latitude = latitude.to_string();
        form.longitude = longitude.to_string();

        match Coordinate::parse(latitude, longitude) {
            Ok(coordinate) => {
                form.validation_error = None;
                self.draft = form.clone();
                self.save(coordinate).await;
                Ok(&self.state)
            }
            Err(e) => {
                debug!(subsystem = "capture", error = %e, "Manual coordinates rejected");
                form.validation_error = Some(e.to_string());
                Err(CaptureError::InvalidCoordinates(e))
            }
        }
    }

    /// Ask for the device position to pre-fill the manual fields. Stays in
    /// manual entry either way.
    pub async fn use_current_position(&mut self) -> Result<&CaptureState, CaptureError> {
        if !matches!(self.state, CaptureState::ManualInput(_)) {
            return Err(self.refuse("use the current position"));
        }

        let result = self.acquire().await;
        let notice = self.failure_notice();
        if let CaptureState::ManualInput(form) = &mut self.state {
            match result {
                Ok(coordinate) => {
                    form.prefill(coordinate);
                    form.notice = None;
                    form.validation_error = None;
                }
                Err(_) => form.notice = Some(notice.to_string()),
            }
        }
        Ok(&self.state)
    }

    /// Back to the start: from manual entry or a failed save.
    pub fn back(&mut self) -> Result<&CaptureState, CaptureError> {
        match &self.state {
            CaptureState::ManualInput(form) => {
                self.draft = form.clone();
                self.state = CaptureState::Idle;
                Ok(&self.state)
            }
            CaptureState::Failed(CaptureFailure {
                kind: FailureKind::SaveFailed,
                ..
            }) => {
                self.state = CaptureState::Idle;
                Ok(&self.state)
            }
            _ => Err(self.refuse("go back")),
        }
    }

    /// After a failed save, return to manual entry with the last fields.
    pub fn retry_manual(&mut self) -> Result<&CaptureState, CaptureError> {
        if !matches!(
            self.state,
            CaptureState::Failed(CaptureFailure {
                kind: FailureKind::SaveFailed,
                ..
            })
        ) {
            return Err(self.refuse("retry manual entry"));
        }

        let mut form = self.draft.clone();
        form.notice = None;
        form.validation_error = None;
        self.state = CaptureState::ManualInput(form);
        Ok(&self.state)
    }

    async fn save(&mut self, coordinate: Coordinate) {
        let Some(umbrella_id) = self.umbrella_id.clone() else {
            return;
        };
        self.state = CaptureState::Saving;

        let start = Instant::now();
        match self
            .store
            .insert(NewLocation::now(umbrella_id.clone(), coordinate))
            .await
        {
            Ok(record_id) => {
                info!(
                    subsystem = "capture",
                    umbrella_id = %umbrella_id,
                    record_id = %record_id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Location recorded"
                );
                self.state = CaptureState::Succeeded(CaptureReceipt {
                    record_id,
                    umbrella_id,
                    coordinate,
                    latitude: coordinate.latitude_display(),
                    longitude: coordinate.longitude_display(),
                    recorded_at: format_timestamp(&Utc::now()),
                });
            }
            Err(e) => {
                warn!(
                    subsystem = "capture",
                    umbrella_id = %umbrella_id,
                    error = %e,
                    "Failed to record location"
                );
                self.state = CaptureState::Failed(CaptureFailure {
                    kind: FailureKind::SaveFailed,
                    message: SAVE_FAILED_MESSAGE.to_string(),
                });
            }
        }
    }
}
