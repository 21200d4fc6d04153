//! Centralized default constants for kasalog.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates and the API server reference these constants instead of defining
//! their own magic numbers.

// =============================================================================
// POSITIONING
// =============================================================================

/// Acquisition timeout in seconds.
pub const ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// Maximum age of a cached position in seconds (0 disables caching).
pub const ACQUIRE_MAXIMUM_AGE_SECS: u64 = 0;

/// Default gpsd address.
pub const GPSD_ADDR: &str = "127.0.0.1:2947";

/// Number of decimals used when displaying or pre-filling coordinates.
pub const COORDINATE_DECIMALS: usize = 6;

// =============================================================================
// REVERSE GEOCODING
// =============================================================================

/// Default Nominatim base URL.
pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

/// Default `accept-language` for address lookups.
pub const GEOCODE_LANGUAGE: &str = "ja";

/// Nominatim detail level (18 = building).
pub const GEOCODE_ZOOM: u8 = 18;

/// Timeout for a single address lookup in seconds.
pub const GEOCODE_TIMEOUT_SECS: u64 = 10;

/// Maximum in-flight address lookups per browse session.
pub const GEOCODE_CONCURRENCY: usize = 4;

/// Separator between formatted address parts (Japanese addresses concatenate).
pub const ADDRESS_SEPARATOR: &str = "";

/// User agent sent to the geocoding service.
pub const USER_AGENT: &str = concat!("kasalog/", env!("CARGO_PKG_VERSION"));

// =============================================================================
// MAP
// =============================================================================

/// Base map tile URL template.
pub const TILE_URL: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";

/// Attribution shown with the tile layer.
pub const TILE_ATTRIBUTION: &str = "© OpenStreetMap contributors";

/// Map center when there is nothing to frame (central Tokyo).
pub const MAP_DEFAULT_LATITUDE: f64 = 35.6762;

pub const MAP_DEFAULT_LONGITUDE: f64 = 139.6503;

/// Zoom level when there is nothing to frame.
pub const MAP_DEFAULT_ZOOM: u8 = 10;

/// Zoom level used when every marker sits on the same point.
pub const MAP_MAX_ZOOM: u8 = 18;

/// Fraction of the marker bounding box added on every side.
pub const MAP_BOUNDS_PADDING: f64 = 0.1;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Idle lifetime of capture and browse sessions in seconds.
pub const SESSION_TTL_SECS: u64 = 1800;

/// Default database URL.
pub const DATABASE_URL: &str = "postgres://localhost/kasalog";
