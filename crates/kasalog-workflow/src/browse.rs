//! Browse coordinator: the list/map view over every recorded location.
//!
//! A session owns its view state (mode, selection, records with their
//! resolved addresses). Addresses are filled in by [`BrowseSession::enrich`],
//! which runs one lookup per record over a bounded pool and applies each
//! result to its own record by id, so completion order does not matter.
//! Closing the session cancels enrichment; results that still arrive are
//! dropped.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use kasalog_core::{
    defaults, Address, AddressResolver, Coordinate, LocationRecord, LocationRepository,
    ADDRESS_PENDING,
};

use crate::display::format_timestamp;
use crate::error::BrowseError;
use crate::map::{compute_viewport, LatLng, TileLayer, Viewport};

/// List-view message when nothing has been recorded.
pub const EMPTY_LIST_MESSAGE: &str = "No umbrella locations recorded yet";

/// Hint shown under [`EMPTY_LIST_MESSAGE`].
pub const EMPTY_LIST_HINT: &str = "Scan an NFC tag to record a location";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    List,
    Map,
}

#[derive(Debug, Clone)]
pub struct BrowseOptions {
    /// Maximum address lookups in flight.
    pub concurrency: usize,
    pub tiles: TileLayer,
    /// Fraction of the marker box added on each side of the map viewport.
    pub bounds_padding: f64,
}

impl Default for BrowseOptions {
    fn default() -> Self {
        Self {
            concurrency: defaults::GEOCODE_CONCURRENCY,
            tiles: TileLayer::default(),
            bounds_padding: defaults::MAP_BOUNDS_PADDING,
        }
    }
}

/// A stored record plus its view-local address.
#[derive(Debug, Clone)]
struct EnrichedRecord {
    record: LocationRecord,
    /// `None` until the lookup finishes.
    address: Option<Address>,
}

#[derive(Debug, Default)]
struct ViewState {
    mode: ViewMode,
    selected: Option<Uuid>,
    records: Vec<EnrichedRecord>,
}

impl ViewState {
    fn find(&self, id: Uuid) -> Option<&EnrichedRecord> {
        self.records.iter().find(|r| r.record.id == id)
    }
}

// =============================================================================
// VIEW MODELS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListRow {
    pub id: Uuid,
    pub umbrella_id: String,
    pub latitude: String,
    pub longitude: String,
    pub scanned_at: String,
    /// Address text, or the pending placeholder.
    pub address: String,
    pub address_resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListView {
    pub count: usize,
    pub rows: Vec<ListRow>,
    pub empty_message: Option<&'static str>,
    pub empty_hint: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerPopup {
    pub umbrella_id: String,
    pub scanned_at: String,
    pub coordinates: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub id: Uuid,
    pub position: LatLng,
    pub selected: bool,
    pub popup: MarkerPopup,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    pub tiles: TileLayer,
    pub markers: Vec<Marker>,
    pub viewport: Viewport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailAction {
    Delete,
    Close,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailView {
    pub id: Uuid,
    pub umbrella_id: String,
    pub latitude: String,
    pub longitude: String,
    pub scanned_at: String,
    pub address: String,
    pub actions: Vec<DetailAction>,
}

/// Everything a client needs to render the current session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrowseView {
    pub mode: ViewMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list: Option<ListView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<MapView>,
    pub detail: Option<DetailView>,
    pub pending_addresses: usize,
}

fn address_text(address: &Option<Address>) -> String {
    address
        .as_ref()
        .map_or(ADDRESS_PENDING, Address::display)
        .to_string()
}

fn degrees(value: f64) -> String {
    format!("{:.*}", defaults::COORDINATE_DECIMALS, value)
}

// =============================================================================
// SESSION
// =============================================================================

/// One user's browse view.
///
/// Cheap to clone; clones share state, so enrichment can run on a spawned
/// task while requests read views.
#[derive(Clone)]
pub struct BrowseSession {
    store: Arc<dyn LocationRepository>,
    resolver: Arc<dyn AddressResolver>,
    options: BrowseOptions,
    state: Arc<Mutex<ViewState>>,
    cancel: CancellationToken,
}

impl BrowseSession {
    /// Fetch every record. A listing failure yields no session at all.
    pub async fn load(
        store: Arc<dyn LocationRepository>,
        resolver: Arc<dyn AddressResolver>,
        options: BrowseOptions,
    ) -> Result<Self, BrowseError> {
        let start = Instant::now();
        let records = store.list_all().await.map_err(|e| {
            warn!(subsystem = "browse", error = %e, "Failed to list locations");
            BrowseError::Load(e.to_string())
        })?;

        debug!(
            subsystem = "browse",
            count = records.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Loaded locations"
        );

        let state = ViewState {
            records: records
                .into_iter()
                .map(|record| EnrichedRecord {
                    record,
                    address: None,
                })
                .collect(),
            ..ViewState::default()
        };

        Ok(Self {
            store,
            resolver,
            options,
            state: Arc::new(Mutex::new(state)),
            cancel: CancellationToken::new(),
        })
    }

    fn state(&self) -> MutexGuard<'_, ViewState> {
        // Nothing panics while holding the lock; recover the data regardless.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Resolve addresses for every record still pending. Returns how many
    /// results were applied.
    pub async fn enrich(&self) -> usize {
        let start = Instant::now();
        let targets: Vec<(Uuid, Result<Coordinate, Address>)> = self
            .state()
            .records
            .iter()
            .filter(|r| r.address.is_none())
            .map(|r| {
                let coordinate = r.record.coordinate().map_err(|e| {
                    warn!(
                        subsystem = "browse",
                        record_id = %r.record.id,
                        error = %e,
                        "Stored coordinate out of range"
                    );
                    Address::LookupFailed
                });
                (r.record.id, coordinate)
            })
            .collect();

        let total = targets.len();
        let resolver = self.resolver.clone();
        let mut lookups = stream::iter(targets)
            .map(|(id, coordinate)| {
                let resolver = resolver.clone();
                async move {
                    let address = match coordinate {
                        Ok(coordinate) => resolver.resolve(coordinate).await,
                        Err(sentinel) => sentinel,
                    };
                    (id, address)
                }
            })
            .buffer_unordered(self.options.concurrency.max(1));

        let mut applied = 0;
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(subsystem = "browse", applied, total, "Enrichment cancelled");
                    break;
                }
                next = lookups.next() => match next {
                    Some((id, address)) => {
                        if self.apply_address(id, address) {
                            applied += 1;
                        }
                    }
                    None => break,
                },
            }
        }

        debug!(
            subsystem = "browse",
            applied,
            total,
            duration_ms = start.elapsed().as_millis() as u64,
            "Enrichment finished"
        );
        applied
    }

    /// Merge one lookup result. Dropped after close or when the record has
    /// been deleted meanwhile.
    fn apply_address(&self, id: Uuid, address: Address) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let mut state = self.state();
        match state.records.iter_mut().find(|r| r.record.id == id) {
            Some(entry) => {
                entry.address = Some(address);
                true
            }
            None => false,
        }
    }

    pub fn mode(&self) -> ViewMode {
        self.state().mode
    }

    pub fn set_view_mode(&self, mode: ViewMode) {
        self.state().mode = mode;
    }

    pub fn selected(&self) -> Option<Uuid> {
        self.state().selected
    }

    /// Marker click.
    pub fn select(&self, id: Uuid) -> Result<(), BrowseError> {
        let mut state = self.state();
        if state.find(id).is_none() {
            return Err(BrowseError::NotFound(id));
        }
        state.selected = Some(id);
        Ok(())
    }

    /// Close the detail panel.
    pub fn clear_selection(&self) {
        self.state().selected = None;
    }

    /// Delete from the store, then from the view. On failure the view is
    /// left as it was.
    pub async fn delete(&self, id: Uuid) -> Result<(), BrowseError> {
        if self.state().find(id).is_none() {
            return Err(BrowseError::NotFound(id));
        }

        if let Err(e) = self.store.delete(id).await {
            warn!(subsystem = "browse", record_id = %id, error = %e, "Delete failed");
            return Err(BrowseError::Delete(e.to_string()));
        }

        let mut state = self.state();
        state.records.retain(|r| r.record.id != id);
        if state.selected == Some(id) {
            state.selected = None;
        }
        info!(subsystem = "browse", record_id = %id, "Location deleted");
        Ok(())
    }

    /// Stop enrichment; later results are discarded.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn len(&self) -> usize {
        self.state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records whose address is still loading.
    pub fn pending_addresses(&self) -> usize {
        self.state()
            .records
            .iter()
            .filter(|r| r.address.is_none())
            .count()
    }

    /// Resolved address of a record, if its lookup has finished.
    pub fn address_of(&self, id: Uuid) -> Option<Address> {
        self.state().find(id).and_then(|r| r.address.clone())
    }

    pub fn list_view(&self) -> ListView {
        let state = self.state();
        let rows: Vec<ListRow> = state
            .records
            .iter()
            .map(|r| ListRow {
                id: r.record.id,
                umbrella_id: r.record.umbrella_id.clone(),
                latitude: degrees(r.record.latitude),
                longitude: degrees(r.record.longitude),
                scanned_at: format_timestamp(&r.record.scanned_at),
                address: address_text(&r.address),
                address_resolved: r.address.as_ref().is_some_and(Address::is_resolved),
            })
            .collect();

        let empty = rows.is_empty();
        ListView {
            count: rows.len(),
            rows,
            empty_message: empty.then_some(EMPTY_LIST_MESSAGE),
            empty_hint: empty.then_some(EMPTY_LIST_HINT),
        }
    }

    pub fn map_view(&self) -> MapView {
        let state = self.state();
        let mut points = Vec::with_capacity(state.records.len());
        let mut markers = Vec::with_capacity(state.records.len());

        for r in &state.records {
            // Rows that fail the range check can't be placed on the map.
            let Ok(coordinate) = r.record.coordinate() else {
                continue;
            };
            points.push(coordinate);
            markers.push(Marker {
                id: r.record.id,
                position: coordinate.into(),
                selected: state.selected == Some(r.record.id),
                popup: MarkerPopup {
                    umbrella_id: r.record.umbrella_id.clone(),
                    scanned_at: format_timestamp(&r.record.scanned_at),
                    coordinates: coordinate.to_string(),
                },
            });
        }

        MapView {
            tiles: self.options.tiles.clone(),
            markers,
            viewport: compute_viewport(&points, self.options.bounds_padding),
        }
    }

    /// Detail panel for the selected record.
    pub fn detail(&self) -> Option<DetailView> {
        let state = self.state();
        let r = state.find(state.selected?)?;
        Some(DetailView {
            id: r.record.id,
            umbrella_id: r.record.umbrella_id.clone(),
            latitude: degrees(r.record.latitude),
            longitude: degrees(r.record.longitude),
            scanned_at: format_timestamp(&r.record.scanned_at),
            address: address_text(&r.address),
            actions: vec![DetailAction::Delete, DetailAction::Close],
        })
    }

    /// Snapshot for the current mode.
    pub fn view(&self) -> BrowseView {
        let mode = self.mode();
        BrowseView {
            mode,
            list: (mode == ViewMode::List).then(|| self.list_view()),
            map: (mode == ViewMode::Map).then(|| self.map_view()),
            detail: self.detail(),
            pending_addresses: self.pending_addresses(),
        }
    }
}
