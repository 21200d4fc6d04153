//! # kasalog-geo
//!
//! Positioning and reverse-geocoding backends for kasalog.
//!
//! This crate provides:
//! - [`NominatimGeocoder`]: reverse geocoding against a Nominatim endpoint,
//!   degrading to sentinel addresses instead of failing
//! - [`GpsdPositionSource`]: device position from a gpsd daemon
//! - [`FixedPositionSource`] and [`NoPositionSource`] for stationary installs
//!   and manual-only deployments
//!
//! # Example
//!
//! ```rust,no_run
//! use kasalog_geo::NominatimGeocoder;
//! use kasalog_core::{AddressResolver, Coordinate};
//!
//! #[tokio::main]
//! async fn main() {
//!     let geocoder = NominatimGeocoder::from_env().unwrap();
//!     let address = geocoder
//!         .resolve(Coordinate::new(35.6812, 139.7671).unwrap())
//!         .await;
//!     println!("{}", address);
//! }
//! ```

pub mod address;
pub mod fixed;
pub mod gpsd;
pub mod nominatim;

// Re-export core types
pub use kasalog_core::*;

pub use address::{address_from_response, format_address, NominatimAddress, ReverseResponse};
pub use fixed::{FixedPositionSource, NoPositionSource};
pub use gpsd::{parse_report, GpsdPositionSource, Report};
pub use nominatim::{NominatimConfig, NominatimGeocoder};
