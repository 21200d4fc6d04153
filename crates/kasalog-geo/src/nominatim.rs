//! Nominatim reverse-geocoding backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument, warn};

use kasalog_core::{defaults, Address, AddressResolver, Coordinate, Error, Result};

use crate::address::{address_from_response, ReverseResponse};

/// Connection and formatting settings for [`NominatimGeocoder`].
#[derive(Debug, Clone)]
pub struct NominatimConfig {
    /// Service root; `/reverse` is appended.
    pub base_url: String,
    /// Sent as `accept-language`.
    pub language: String,
    /// Detail level (18 = building).
    pub zoom: u8,
    pub timeout: Duration,
    /// Joins the formatted address parts.
    pub separator: String,
    pub user_agent: String,
}

impl Default for NominatimConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::NOMINATIM_URL.to_string(),
            language: defaults::GEOCODE_LANGUAGE.to_string(),
            zoom: defaults::GEOCODE_ZOOM,
            timeout: Duration::from_secs(defaults::GEOCODE_TIMEOUT_SECS),
            separator: defaults::ADDRESS_SEPARATOR.to_string(),
            user_agent: defaults::USER_AGENT.to_string(),
        }
    }
}

impl NominatimConfig {
    /// Read `NOMINATIM_URL`, `GEOCODE_LANGUAGE`, `GEOCODE_TIMEOUT_SECS` and
    /// `ADDRESS_SEPARATOR`, falling back to the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("NOMINATIM_URL") {
            config.base_url = url;
        }
        if let Ok(language) = std::env::var("GEOCODE_LANGUAGE") {
            config.language = language;
        }
        if let Some(secs) = std::env::var("GEOCODE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.timeout = Duration::from_secs(secs);
        }
        if let Ok(separator) = std::env::var("ADDRESS_SEPARATOR") {
            config.separator = separator;
        }
        config
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Reverse geocoder backed by a Nominatim `/reverse` endpoint.
#[derive(Clone)]
pub struct NominatimGeocoder {
    client: Client,
    config: NominatimConfig,
}

impl NominatimGeocoder {
    pub fn new(config: NominatimConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        debug!(
            subsystem = "geocode",
            base_url = %config.base_url,
            language = %config.language,
            "Initializing Nominatim geocoder"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(NominatimConfig::from_env())
    }

    pub fn config(&self) -> &NominatimConfig {
        &self.config
    }

    fn reverse_url(&self) -> String {
        format!("{}/reverse", self.config.base_url.trim_end_matches('/'))
    }

    /// Perform one lookup, surfacing transport and decoding failures.
    ///
    /// [`AddressResolver::resolve`] folds the error case into
    /// [`Address::LookupFailed`].
    #[instrument(skip(self), fields(subsystem = "geocode", op = "reverse"))]
    pub async fn lookup(&self, coordinate: Coordinate) -> Result<Address> {
        let start = Instant::now();
        let zoom = self.config.zoom.to_string();
        let lat = coordinate.latitude().to_string();
        let lon = coordinate.longitude().to_string();

        let response = self
            .client
            .get(self.reverse_url())
            .query(&[
                ("format", "json"),
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("accept-language", self.config.language.as_str()),
                ("zoom", zoom.as_str()),
                ("addressdetails", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Request(format!(
                "geocoder returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: ReverseResponse = response.json().await?;
        let address = address_from_response(&body, &self.config.separator);

        debug!(
            resolved = address.is_resolved(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Reverse geocode complete"
        );
        Ok(address)
    }
}

#[async_trait]
impl AddressResolver for NominatimGeocoder {
    async fn resolve(&self, coordinate: Coordinate) -> Address {
        match self.lookup(coordinate).await {
            Ok(address) => address,
            Err(e) => {
                warn!(
                    subsystem = "geocode",
                    latitude = coordinate.latitude(),
                    longitude = coordinate.longitude(),
                    error = %e,
                    "Reverse geocode failed"
                );
                Address::LookupFailed
            }
        }
    }
}
