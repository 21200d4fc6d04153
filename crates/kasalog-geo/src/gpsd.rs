//! Device position from a gpsd daemon.
//!
//! Speaks the gpsd JSON protocol over TCP: enable watch mode, then read
//! reports until a TPV (time-position-velocity) report carries a fix good
//! enough for the request.

use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use kasalog_core::{defaults, AcquireOptions, Coordinate, PositionError, PositionSource};

const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true};\n";

/// 2 = 2D fix, 3 = 3D fix.
const MODE_2D: u8 = 2;
const MODE_3D: u8 = 3;

#[derive(Debug, Deserialize)]
struct RawReport {
    class: String,
    #[serde(default)]
    mode: Option<u8>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    message: Option<String>,
}

/// One line from gpsd, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Fix(Coordinate),
    Error(String),
    Other,
}

/// Classify a gpsd report line.
///
/// With `high_accuracy` only 3D fixes count; otherwise a 2D fix is enough.
/// Unparseable lines and reports without a usable position are `Other`.
pub fn parse_report(line: &str, high_accuracy: bool) -> Report {
    let Ok(raw) = serde_json::from_str::<RawReport>(line.trim()) else {
        return Report::Other;
    };
    match raw.class.as_str() {
        "TPV" => {
            let required = if high_accuracy { MODE_3D } else { MODE_2D };
            match (raw.mode, raw.lat, raw.lon) {
                (Some(mode), Some(lat), Some(lon)) if mode >= required => {
                    Coordinate::new(lat, lon).map_or(Report::Other, Report::Fix)
                }
                _ => Report::Other,
            }
        }
        "ERROR" => Report::Error(raw.message.unwrap_or_default()),
        _ => Report::Other,
    }
}

fn classify_io(e: std::io::Error) -> PositionError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => PositionError::PermissionDenied,
        _ => PositionError::PositionUnavailable,
    }
}

/// Position source reading from gpsd.
pub struct GpsdPositionSource {
    addr: String,
    last_fix: Mutex<Option<(Instant, Coordinate)>>,
}

impl GpsdPositionSource {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            last_fix: Mutex::new(None),
        }
    }

    /// Reads `GPSD_ADDR`, defaulting to the local daemon.
    pub fn from_env() -> Self {
        Self::new(std::env::var("GPSD_ADDR").unwrap_or_else(|_| defaults::GPSD_ADDR.to_string()))
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn cached(&self, options: &AcquireOptions) -> Option<Coordinate> {
        if options.maximum_age.is_zero() {
            return None;
        }
        let guard = self.last_fix.lock().ok()?;
        guard
            .as_ref()
            .filter(|(at, _)| at.elapsed() <= options.maximum_age)
            .map(|(_, coordinate)| *coordinate)
    }

    fn remember(&self, coordinate: Coordinate) {
        if let Ok(mut guard) = self.last_fix.lock() {
            *guard = Some((Instant::now(), coordinate));
        }
    }

    async fn read_fix(
        &self,
        high_accuracy: bool,
    ) -> std::result::Result<Coordinate, PositionError> {
        let stream = TcpStream::connect(&self.addr).await.map_err(classify_io)?;
        let (reader, mut writer) = stream.into_split();
        writer.write_all(WATCH_COMMAND).await.map_err(classify_io)?;

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await.map_err(classify_io)? {
            match parse_report(&line, high_accuracy) {
                Report::Fix(coordinate) => return Ok(coordinate),
                Report::Error(message) => {
                    warn!(
                        subsystem = "position",
                        source = "gpsd",
                        detail = %message,
                        "gpsd reported an error"
                    );
                    return Err(PositionError::PositionUnavailable);
                }
                Report::Other => {}
            }
        }

        Err(PositionError::PositionUnavailable)
    }
}

#[async_trait]
impl PositionSource for GpsdPositionSource {
    async fn acquire(
        &self,
        options: &AcquireOptions,
    ) -> std::result::Result<Coordinate, PositionError> {
        if let Some(coordinate) = self.cached(options) {
            debug!(subsystem = "position", source = "gpsd", "Using cached fix");
            return Ok(coordinate);
        }

        let start = Instant::now();
        let result =
            match tokio::time::timeout(options.timeout, self.read_fix(options.high_accuracy)).await
            {
                Ok(result) => result,
                Err(_) => Err(PositionError::Timeout),
            };

        match &result {
            Ok(coordinate) => {
                self.remember(*coordinate);
                debug!(
                    subsystem = "position",
                    source = "gpsd",
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Acquired fix"
                );
            }
            Err(e) => {
                debug!(
                    subsystem = "position",
                    source = "gpsd",
                    addr = %self.addr,
                    error = %e,
                    "Acquisition failed"
                );
            }
        }
        result
    }

    fn name(&self) -> &str {
        "gpsd"
    }
}
