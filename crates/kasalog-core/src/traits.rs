//! Core traits for kasalog abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// LOCATION REPOSITORY
// =============================================================================

/// Repository for umbrella location records.
///
/// Writes are visible to every client immediately; there is no locking or
/// transaction across calls.
#[async_trait]
pub trait LocationRepository: Send + Sync {
    /// Append one record and return its store-assigned id.
    async fn insert(&self, location: NewLocation) -> Result<Uuid>;

    /// All records, newest `scanned_at` first.
    async fn list_all(&self) -> Result<Vec<LocationRecord>>;

    /// Delete a record. Deleting an id that does not exist succeeds.
    async fn delete(&self, id: Uuid) -> Result<()>;
}

// =============================================================================
// POSITIONING
// =============================================================================

/// Device positioning capability.
///
/// Suspends until the device answers or `options.timeout` elapses. Never
/// retries internally.
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn acquire(&self, options: &AcquireOptions)
        -> std::result::Result<Coordinate, PositionError>;

    /// Short name for logs ("gpsd", "fixed", ...).
    fn name(&self) -> &str;
}

// =============================================================================
// REVERSE GEOCODING
// =============================================================================

/// Coordinate → human-readable address.
///
/// Implementations swallow every failure into [`Address::LookupFailed`] or
/// [`Address::NoData`]; an address is a convenience, never a requirement.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self, coordinate: Coordinate) -> Address;
}
