//! # kasalog-workflow
//!
//! The two user-facing flows of kasalog, independent of transport:
//!
//! - [`CaptureSession`]: scan → automatic positioning → manual fallback →
//!   store, with every failure classified into a recoverable state
//! - [`BrowseSession`]: list/map view state over all records, with
//!   concurrent address enrichment and marker selection
//!
//! Both depend only on the traits in `kasalog-core`, so any position source,
//! store, and resolver can be plugged in.

pub mod browse;
pub mod capture;
pub mod display;
pub mod error;
pub mod map;

// Test doubles for integration tests
// Note: Always compiled so integration tests in other crates can use them
pub mod testing;

pub use browse::{
    BrowseOptions, BrowseSession, BrowseView, DetailAction, DetailView, ListRow, ListView,
    MapView, Marker, MarkerPopup, ViewMode, EMPTY_LIST_HINT, EMPTY_LIST_MESSAGE,
};
pub use capture::{
    CaptureAction, CaptureFailure, CaptureReceipt, CaptureSession, CaptureState, FailureKind,
    ManualForm, ScanContext, INSECURE_CONTEXT_NOTICE, MISSING_IDENTIFIER_MESSAGE,
    POSITION_FAILED_NOTICE, SAVE_FAILED_MESSAGE,
};
pub use display::format_timestamp;
pub use error::{BrowseError, CaptureError};
pub use map::{compute_viewport, Bounds, LatLng, TileLayer, Viewport};
