//! Position sources that never touch hardware.

use async_trait::async_trait;

use kasalog_core::{AcquireOptions, Coordinate, PositionError, PositionSource};

/// Always answers with the same coordinate.
///
/// Useful for a scanner mounted at a known spot (an umbrella stand by the
/// door) and for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedPositionSource {
    coordinate: Coordinate,
}

impl FixedPositionSource {
    pub fn new(coordinate: Coordinate) -> Self {
        Self { coordinate }
    }
}

#[async_trait]
impl PositionSource for FixedPositionSource {
    async fn acquire(
        &self,
        _options: &AcquireOptions,
    ) -> std::result::Result<Coordinate, PositionError> {
        Ok(self.coordinate)
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Positioning is not available on this host; every acquisition fails as
/// unavailable so captures go straight to manual entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPositionSource;

#[async_trait]
impl PositionSource for NoPositionSource {
    async fn acquire(
        &self,
        _options: &AcquireOptions,
    ) -> std::result::Result<Coordinate, PositionError> {
        Err(PositionError::PositionUnavailable)
    }

    fn name(&self) -> &str {
        "none"
    }
}
