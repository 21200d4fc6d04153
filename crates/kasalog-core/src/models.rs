//! Core data models for kasalog.
//!
//! These types are shared across all kasalog crates and represent the core
//! domain entities: coordinates, stored location records, and the derived
//! address used for display.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::defaults;

// =============================================================================
// COORDINATES
// =============================================================================

/// Why a latitude/longitude pair was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinateError {
    #[error("{field} is not a number: {value:?}")]
    Unparseable { field: &'static str, value: String },

    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },

    #[error("latitude must be between -90 and 90, got {0}")]
    LatitudeOutOfRange(f64),

    #[error("longitude must be between -180 and 180, got {0}")]
    LongitudeOutOfRange(f64),
}

impl From<CoordinateError> for crate::Error {
    fn from(e: CoordinateError) -> Self {
        crate::Error::InvalidInput(e.to_string())
    }
}

/// A latitude/longitude pair in decimal degrees.
///
/// Construction through [`Coordinate::new`] or [`Coordinate::parse`]
/// guarantees `latitude ∈ [-90, 90]` and `longitude ∈ [-180, 180]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = CoordinateError;

    fn try_from(raw: RawCoordinate) -> std::result::Result<Self, Self::Error> {
        Coordinate::new(raw.latitude, raw.longitude)
    }
}

impl Coordinate {
    /// Build a coordinate, rejecting non-finite and out-of-range values.
    pub fn new(latitude: f64, longitude: f64) -> std::result::Result<Self, CoordinateError> {
        if !latitude.is_finite() {
            return Err(CoordinateError::NotFinite { field: "latitude" });
        }
        if !longitude.is_finite() {
            return Err(CoordinateError::NotFinite { field: "longitude" });
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::LatitudeOutOfRange(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::LongitudeOutOfRange(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Parse two free-text fields (as typed by a user) into a coordinate.
    pub fn parse(latitude: &str, longitude: &str) -> std::result::Result<Self, CoordinateError> {
        let lat = parse_degrees("latitude", latitude)?;
        let lng = parse_degrees("longitude", longitude)?;
        Self::new(lat, lng)
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Latitude with the display precision (`35.000000`).
    pub fn latitude_display(&self) -> String {
        format!("{:.*}", defaults::COORDINATE_DECIMALS, self.latitude)
    }

    /// Longitude with the display precision (`139.000000`).
    pub fn longitude_display(&self) -> String {
        format!("{:.*}", defaults::COORDINATE_DECIMALS, self.longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.latitude_display(), self.longitude_display())
    }
}

fn parse_degrees(field: &'static str, value: &str) -> std::result::Result<f64, CoordinateError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| CoordinateError::Unparseable {
            field,
            value: value.to_string(),
        })
}

// =============================================================================
// LOCATION RECORDS
// =============================================================================

/// A persisted sighting of an umbrella.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub id: Uuid,
    pub umbrella_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub scanned_at: DateTime<Utc>,
}

impl LocationRecord {
    /// Coordinate of the record.
    ///
    /// Stored rows are range-checked on insert, so this only fails on rows
    /// written by something other than kasalog.
    pub fn coordinate(&self) -> std::result::Result<Coordinate, CoordinateError> {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Request for recording a new location.
#[derive(Debug, Clone)]
pub struct NewLocation {
    pub umbrella_id: String,
    pub coordinate: Coordinate,
    pub scanned_at: DateTime<Utc>,
}

impl NewLocation {
    /// A location captured now.
    pub fn now(umbrella_id: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            umbrella_id: umbrella_id.into(),
            coordinate,
            scanned_at: Utc::now(),
        }
    }
}

// =============================================================================
// POSITIONING
// =============================================================================

/// Options for a single position acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireOptions {
    /// Prefer the most precise fix the device can produce.
    pub high_accuracy: bool,
    /// Give up after this long.
    pub timeout: Duration,
    /// Accept a previously acquired fix no older than this (zero disables).
    pub maximum_age: Duration,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(defaults::ACQUIRE_TIMEOUT_SECS),
            maximum_age: Duration::from_secs(defaults::ACQUIRE_MAXIMUM_AGE_SECS),
        }
    }
}

/// Classified acquisition failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionError {
    #[error("permission to read the position was denied")]
    PermissionDenied,

    #[error("position unavailable")]
    PositionUnavailable,

    #[error("timed out waiting for a position")]
    Timeout,
}

// =============================================================================
// ADDRESSES
// =============================================================================

/// Text shown while an address lookup is in flight.
pub const ADDRESS_PENDING: &str = "Loading...";

/// Text shown when the lookup succeeded but returned nothing usable.
pub const ADDRESS_UNKNOWN: &str = "Address unknown";

/// Text shown when the lookup itself failed.
pub const ADDRESS_LOOKUP_FAILED: &str = "Address lookup failed";

/// Outcome of a reverse-geocode lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum Address {
    Resolved(String),
    NoData,
    LookupFailed,
}

impl Address {
    /// Display string, with sentinels for the non-resolved outcomes.
    pub fn display(&self) -> &str {
        match self {
            Address::Resolved(text) => text,
            Address::NoData => ADDRESS_UNKNOWN,
            Address::LookupFailed => ADDRESS_LOOKUP_FAILED,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Address::Resolved(_))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_bounds_inclusive() {
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
        assert!(Coordinate::new(0.0, 0.0).is_ok());
    }

    #[test]
    fn test_coordinate_rejects_out_of_range() {
        assert_eq!(
            Coordinate::new(91.0, 0.0),
            Err(CoordinateError::LatitudeOutOfRange(91.0))
        );
        assert_eq!(
            Coordinate::new(0.0, -180.5),
            Err(CoordinateError::LongitudeOutOfRange(-180.5))
        );
    }

    #[test]
    fn test_coordinate_rejects_non_finite() {
        assert!(matches!(
            Coordinate::new(f64::NAN, 0.0),
            Err(CoordinateError::NotFinite { field: "latitude" })
        ));
        assert!(matches!(
            Coordinate::new(0.0, f64::INFINITY),
            Err(CoordinateError::NotFinite { field: "longitude" })
        ));
    }

    #[test]
    fn test_coordinate_parse_trims_input() {
        let c = Coordinate::parse(" 35.6762 ", "139.6503\n").unwrap();
        assert_eq!(c.latitude(), 35.6762);
        assert_eq!(c.longitude(), 139.6503);
    }

    #[test]
    fn test_coordinate_parse_rejects_text() {
        let err = Coordinate::parse("north", "0").unwrap_err();
        assert_eq!(
            err,
            CoordinateError::Unparseable {
                field: "latitude",
                value: "north".to_string()
            }
        );
        assert!(Coordinate::parse("", "0").is_err());
        assert!(Coordinate::parse("0", "NaN").is_err());
    }

    #[test]
    fn test_coordinate_display_precision() {
        let c = Coordinate::new(35.0, 139.0).unwrap();
        assert_eq!(c.latitude_display(), "35.000000");
        assert_eq!(c.longitude_display(), "139.000000");
        assert_eq!(c.to_string(), "35.000000, 139.000000");
    }

    #[test]
    fn test_coordinate_deserialize_validates() {
        let ok: Coordinate =
            serde_json::from_str(r#"{"latitude": 10.5, "longitude": -20.25}"#).unwrap();
        assert_eq!(ok.latitude(), 10.5);

        let bad = serde_json::from_str::<Coordinate>(r#"{"latitude": 95, "longitude": 0}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_coordinate_error_into_core_error() {
        let err: crate::Error = CoordinateError::LatitudeOutOfRange(91.0).into();
        assert!(matches!(err, crate::Error::InvalidInput(_)));
        assert!(err.to_string().contains("latitude"));
    }

    #[test]
    fn test_acquire_options_default_demands_fresh_precise_fix() {
        let opts = AcquireOptions::default();
        assert!(opts.high_accuracy);
        assert_eq!(opts.timeout, Duration::from_secs(10));
        assert_eq!(opts.maximum_age, Duration::ZERO);
    }

    #[test]
    fn test_address_display_sentinels() {
        assert_eq!(Address::Resolved("東京都千代田区".into()).display(), "東京都千代田区");
        assert_eq!(Address::NoData.display(), ADDRESS_UNKNOWN);
        assert_eq!(Address::LookupFailed.display(), ADDRESS_LOOKUP_FAILED);
        assert_ne!(ADDRESS_UNKNOWN, ADDRESS_LOOKUP_FAILED);
    }

    #[test]
    fn test_address_serialization() {
        let json = serde_json::to_value(Address::Resolved("Shibuya".into())).unwrap();
        assert_eq!(json["status"], "resolved");
        assert_eq!(json["text"], "Shibuya");

        let json = serde_json::to_value(Address::LookupFailed).unwrap();
        assert_eq!(json["status"], "lookup_failed");
    }

    #[test]
    fn test_record_coordinate() {
        let record = LocationRecord {
            id: Uuid::nil(),
            umbrella_id: "UMB-001".into(),
            latitude: 35.0,
            longitude: 139.0,
            scanned_at: Utc::now(),
        };
        assert_eq!(
            record.coordinate().unwrap(),
            Coordinate::new(35.0, 139.0).unwrap()
        );
    }
}
