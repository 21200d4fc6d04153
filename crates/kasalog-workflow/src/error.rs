//! Workflow error types.

use thiserror::Error;
use uuid::Uuid;

use kasalog_core::CoordinateError;

/// Why a capture action was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureError {
    #[error("umbrella id is missing")]
    MissingIdentifier,

    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(#[from] CoordinateError),

    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
}

/// Browse failures surfaced to the user.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BrowseError {
    /// Listing failed; nothing is shown.
    #[error("failed to load locations: {0}")]
    Load(String),

    /// The store refused the delete; local state is unchanged.
    #[error("failed to delete location: {0}")]
    Delete(String),

    #[error("location not in this view: {0}")]
    NotFound(Uuid),
}
