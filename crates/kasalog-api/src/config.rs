//! Server configuration from environment variables.
//!
//! Every setting has a default from `kasalog_core::defaults`, so an empty
//! environment yields a working local server (PostgreSQL on localhost, gpsd
//! on localhost, the public Nominatim instance).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use kasalog_core::{defaults, Coordinate};
use kasalog_geo::NominatimConfig;
use kasalog_workflow::TileLayer;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid backend for {key}: {value}")]
    InvalidBackend { key: &'static str, value: String },

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Where location records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Postgres,
    /// Process memory; records are lost on restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::InvalidBackend {
                key: "STORE_BACKEND",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => write!(f, "postgres"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Where device positions come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionBackend {
    #[default]
    Gpsd,
    /// A configured stationary coordinate.
    Fixed,
    /// No positioning; every capture goes to manual entry.
    None,
}

impl FromStr for PositionBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gpsd" => Ok(Self::Gpsd),
            "fixed" => Ok(Self::Fixed),
            "none" | "manual" => Ok(Self::None),
            _ => Err(ConfigError::InvalidBackend {
                key: "POSITION_SOURCE",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for PositionBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpsd => write!(f, "gpsd"),
            Self::Fixed => write!(f, "fixed"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Complete server configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreBackend,
    pub database_url: String,
    pub position: PositionBackend,
    pub gpsd_addr: String,
    /// Required when `position` is `Fixed`.
    pub fixed_position: Option<Coordinate>,
    pub acquire_timeout: Duration,
    pub geocoder: NominatimConfig,
    pub geocode_concurrency: usize,
    pub tiles: TileLayer,
    pub session_ttl: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: defaults::SERVER_PORT,
            store: StoreBackend::default(),
            database_url: defaults::DATABASE_URL.to_string(),
            position: PositionBackend::default(),
            gpsd_addr: defaults::GPSD_ADDR.to_string(),
            fixed_position: None,
            acquire_timeout: Duration::from_secs(defaults::ACQUIRE_TIMEOUT_SECS),
            geocoder: NominatimConfig::default(),
            geocode_concurrency: defaults::GEOCODE_CONCURRENCY,
            tiles: TileLayer::default(),
            session_ttl: Duration::from_secs(defaults::SESSION_TTL_SECS),
        }
    }
}

fn parse_var<T: FromStr>(key: &'static str, value: Option<String>, default: T) -> ConfigResult<T>
where
    T::Err: fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

fn parse_fixed_position(raw: &str) -> ConfigResult<Coordinate> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        key: "FIXED_POSITION",
        value: raw.to_string(),
        reason,
    };
    let (lat, lng) = raw
        .split_once(',')
        .ok_or_else(|| invalid("expected \"lat,lng\"".to_string()))?;
    Coordinate::parse(lat, lng).map_err(|e| invalid(e.to_string()))
}

impl AppConfig {
    /// Load from the process environment and validate.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup and validate.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let d = Self::default();

        let fixed_position = lookup("FIXED_POSITION")
            .filter(|v| !v.trim().is_empty())
            .map(|v| parse_fixed_position(&v))
            .transpose()?;

        let geocoder = NominatimConfig {
            base_url: lookup("NOMINATIM_URL").unwrap_or(d.geocoder.base_url),
            language: lookup("GEOCODE_LANGUAGE").unwrap_or(d.geocoder.language),
            timeout: Duration::from_secs(parse_var(
                "GEOCODE_TIMEOUT_SECS",
                lookup("GEOCODE_TIMEOUT_SECS"),
                defaults::GEOCODE_TIMEOUT_SECS,
            )?),
            separator: lookup("ADDRESS_SEPARATOR").unwrap_or(d.geocoder.separator),
            ..NominatimConfig::default()
        };

        let config = Self {
            host: lookup("HOST").unwrap_or(d.host),
            port: parse_var("PORT", lookup("PORT"), d.port)?,
            store: lookup("STORE_BACKEND")
                .map(|v| v.parse::<StoreBackend>())
                .transpose()?
                .unwrap_or(d.store),
            database_url: lookup("DATABASE_URL").unwrap_or(d.database_url),
            position: lookup("POSITION_SOURCE")
                .map(|v| v.parse::<PositionBackend>())
                .transpose()?
                .unwrap_or(d.position),
            gpsd_addr: lookup("GPSD_ADDR").unwrap_or(d.gpsd_addr),
            fixed_position,
            acquire_timeout: Duration::from_secs(parse_var(
                "ACQUIRE_TIMEOUT_SECS",
                lookup("ACQUIRE_TIMEOUT_SECS"),
                defaults::ACQUIRE_TIMEOUT_SECS,
            )?),
            geocoder,
            geocode_concurrency: parse_var(
                "GEOCODE_CONCURRENCY",
                lookup("GEOCODE_CONCURRENCY"),
                d.geocode_concurrency,
            )?,
            tiles: TileLayer {
                url: lookup("TILE_URL").unwrap_or(d.tiles.url),
                attribution: lookup("TILE_ATTRIBUTION").unwrap_or(d.tiles.attribution),
            },
            session_ttl: Duration::from_secs(parse_var(
                "SESSION_TTL_SECS",
                lookup("SESSION_TTL_SECS"),
                defaults::SESSION_TTL_SECS,
            )?),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Validation("HOST cannot be empty".to_string()));
        }

        if self.store == StoreBackend::Postgres && self.database_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "DATABASE_URL is required for the postgres store".to_string(),
            ));
        }

        if self.position == PositionBackend::Fixed && self.fixed_position.is_none() {
            return Err(ConfigError::Validation(
                "FIXED_POSITION is required when POSITION_SOURCE=fixed".to_string(),
            ));
        }

        let base_url = &self.geocoder.base_url;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "NOMINATIM_URL must start with http:// or https://, got: {}",
                base_url
            )));
        }

        if self.geocode_concurrency == 0 {
            return Err(ConfigError::Validation(
                "GEOCODE_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        if self.acquire_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "ACQUIRE_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }

        if self.session_ttl.is_zero() {
            return Err(ConfigError::Validation(
                "SESSION_TTL_SECS must be at least 1".to_string(),
            ));
        }

        if !self.tiles.url.contains("{z}") {
            return Err(ConfigError::Validation(format!(
                "TILE_URL must contain {{z}}, {{x}} and {{y}} placeholders, got: {}",
                self.tiles.url
            )));
        }

        Ok(())
    }
}
