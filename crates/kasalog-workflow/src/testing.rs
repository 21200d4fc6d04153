//! Scripted positioning and geocoding for deterministic tests.
//!
//! Always compiled so integration tests in other crates can drive the
//! workflows without a GPS receiver or network.
//!
//! ```rust,ignore
//! use kasalog_workflow::testing::{ScriptedPositionSource, ScriptedResolver};
//!
//! let positions = ScriptedPositionSource::new()
//!     .then_fail(PositionError::Timeout)
//!     .then_fix(Coordinate::new(35.0, 139.0)?);
//! let resolver = ScriptedResolver::new().with_address(coord, Address::NoData);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use kasalog_core::{
    AcquireOptions, Address, AddressResolver, Coordinate, PositionError, PositionSource,
};

type Outcome = Result<Coordinate, PositionError>;

/// Answers acquisitions from a queue; the last outcome repeats once the
/// queue is down to one entry. An empty script is always unavailable.
#[derive(Clone, Default)]
pub struct ScriptedPositionSource {
    script: Arc<Mutex<VecDeque<Outcome>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedPositionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_fix(self, coordinate: Coordinate) -> Self {
        self.push(Ok(coordinate))
    }

    pub fn then_fail(self, error: PositionError) -> Self {
        self.push(Err(error))
    }

    fn push(self, outcome: Outcome) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
        self
    }

    /// Number of acquisitions attempted so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PositionSource for ScriptedPositionSource {
    async fn acquire(&self, _options: &AcquireOptions) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Ok(mut script) = self.script.lock() else {
            return Err(PositionError::PositionUnavailable);
        };
        match script.len() {
            0 => Err(PositionError::PositionUnavailable),
            1 => script[0],
            _ => script
                .pop_front()
                .unwrap_or(Err(PositionError::PositionUnavailable)),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Key for per-coordinate scripting; exact bit patterns are fine here since
/// tests build coordinates from literals.
fn key(c: Coordinate) -> (u64, u64) {
    (c.latitude().to_bits(), c.longitude().to_bits())
}

/// Resolves coordinates from a table, with optional per-coordinate delay.
///
/// Unscripted coordinates resolve to `"<lat>,<lng>"`.
#[derive(Clone, Default)]
pub struct ScriptedResolver {
    answers: Arc<Mutex<HashMap<(u64, u64), (Address, Duration)>>>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(self, coordinate: Coordinate, address: Address) -> Self {
        self.with_delayed_address(coordinate, address, Duration::ZERO)
    }

    pub fn with_delayed_address(
        self,
        coordinate: Coordinate,
        address: Address,
        delay: Duration,
    ) -> Self {
        if let Ok(mut answers) = self.answers.lock() {
            answers.insert(key(coordinate), (address, delay));
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of lookups observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AddressResolver for ScriptedResolver {
    async fn resolve(&self, coordinate: Coordinate) -> Address {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let scripted = self
            .answers
            .lock()
            .ok()
            .and_then(|answers| answers.get(&key(coordinate)).cloned());

        let (address, delay) = scripted.unwrap_or_else(|| {
            (
                Address::Resolved(format!(
                    "{},{}",
                    coordinate.latitude(),
                    coordinate.longitude()
                )),
                Duration::ZERO,
            )
        });
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        address
    }
}
