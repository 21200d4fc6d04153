//! Map framing: tile layer settings and the initial viewport.
//!
//! The viewport frames every marker. With no markers it falls back to a fixed
//! centre and zoom; with a single distinct point it centres there at street
//! level, since a zero-area box has no meaningful fit.

use serde::Serialize;

use kasalog_core::{defaults, Coordinate};

/// Base map imagery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileLayer {
    /// URL template with `{s}`, `{z}`, `{x}`, `{y}` placeholders.
    pub url: String,
    pub attribution: String,
}

impl Default for TileLayer {
    fn default() -> Self {
        Self {
            url: defaults::TILE_URL.to_string(),
            attribution: defaults::TILE_ATTRIBUTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<Coordinate> for LatLng {
    fn from(c: Coordinate) -> Self {
        Self {
            latitude: c.latitude(),
            longitude: c.longitude(),
        }
    }
}

/// Axis-aligned box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bounds {
    /// Smallest box containing every point, or `None` for no points.
    pub fn enclosing(points: &[Coordinate]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let seed = Self {
            south: first.latitude(),
            west: first.longitude(),
            north: first.latitude(),
            east: first.longitude(),
        };
        Some(rest.iter().fold(seed, |b, p| Self {
            south: b.south.min(p.latitude()),
            west: b.west.min(p.longitude()),
            north: b.north.max(p.latitude()),
            east: b.east.max(p.longitude()),
        }))
    }

    /// Grow by `ratio` of the span on every side, clamped to valid degrees.
    pub fn pad(&self, ratio: f64) -> Self {
        let lat_pad = (self.north - self.south) * ratio;
        let lng_pad = (self.east - self.west) * ratio;
        Self {
            south: (self.south - lat_pad).max(-90.0),
            west: (self.west - lng_pad).max(-180.0),
            north: (self.north + lat_pad).min(90.0),
            east: (self.east + lng_pad).min(180.0),
        }
    }

    pub fn is_point(&self) -> bool {
        self.south == self.north && self.west == self.east
    }

    pub fn center(&self) -> LatLng {
        LatLng {
            latitude: (self.south + self.north) / 2.0,
            longitude: (self.west + self.east) / 2.0,
        }
    }
}

/// Initial map framing handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Viewport {
    /// Nothing to show.
    Default { center: LatLng, zoom: u8 },
    /// Every marker sits on one spot.
    Point { center: LatLng, zoom: u8 },
    /// Fit the renderer to these bounds.
    Fit { bounds: Bounds, center: LatLng },
}

impl Viewport {
    pub fn default_view() -> Self {
        Viewport::Default {
            center: LatLng {
                latitude: defaults::MAP_DEFAULT_LATITUDE,
                longitude: defaults::MAP_DEFAULT_LONGITUDE,
            },
            zoom: defaults::MAP_DEFAULT_ZOOM,
        }
    }

    pub fn center(&self) -> LatLng {
        match self {
            Viewport::Default { center, .. }
            | Viewport::Point { center, .. }
            | Viewport::Fit { center, .. } => *center,
        }
    }
}

/// Frame `points`, padding the box by `padding` of its span per side.
pub fn compute_viewport(points: &[Coordinate], padding: f64) -> Viewport {
    match Bounds::enclosing(points) {
        None => Viewport::default_view(),
        Some(b) if b.is_point() => Viewport::Point {
            center: b.center(),
            zoom: defaults::MAP_MAX_ZOOM,
        },
        Some(b) => {
            let bounds = b.pad(padding);
            Viewport::Fit {
                center: bounds.center(),
                bounds,
            }
        }
    }
}
