/// Service configuration.
///
/// Feed endpoints, poll intervals, and staleness windows come from a TOML
/// file; API keys for the keyed feeds come from the environment (loaded via
/// `.env` in development). Every field has a working default so the service
/// runs with no config file at all.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub feeds: FeedsConfig,
    pub filters: FilterDefaults,
}

impl Config {
    /// Loads configuration from a TOML file. Missing sections fall back to
    /// their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level: error | warn | info | debug | trace.
    pub level: String,
    /// Emit JSON-formatted events instead of human-readable lines.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Initial filter thresholds applied at startup. All of these are clamped by
/// the filter setters, so out-of-range config values degrade to the nearest
/// valid bound instead of failing the load.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilterDefaults {
    pub min_magnitude: f64,
    pub min_humidity: f64,
    pub min_pm25: f64,
    pub min_confidence: f64,
    pub time_window_hours: Option<u32>,
}

// ---------------------------------------------------------------------------
// Feed config
// ---------------------------------------------------------------------------

/// Endpoint and cadence for one feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,
    pub interval_secs: u64,
    /// Cache entries older than this are considered stale on subscription.
    /// Defaults to twice the refetch interval.
    pub stale_secs: Option<u64>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            interval_secs: 300,
            stale_secs: None,
        }
    }
}

impl FeedConfig {
    fn with(url: &str, interval_secs: u64) -> Self {
        Self {
            url: url.to_string(),
            interval_secs,
            stale_secs: None,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn stale_after(&self) -> Duration {
        match self.stale_secs {
            Some(secs) => Duration::from_secs(secs),
            None => self.interval() * 2,
        }
    }
}

/// The hotspot feed has two independently-keyed instrument endpoints behind
/// one poller.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HotspotFeedConfig {
    pub modis_url: String,
    pub viirs_url: String,
    pub interval_secs: u64,
    pub stale_secs: Option<u64>,
}

impl Default for HotspotFeedConfig {
    fn default() -> Self {
        Self {
            modis_url: "https://firms.modaps.eosdis.nasa.gov/api/hotspots/modis".to_string(),
            viirs_url: "https://firms.modaps.eosdis.nasa.gov/api/hotspots/viirs".to_string(),
            interval_secs: 300,
            stale_secs: None,
        }
    }
}

impl HotspotFeedConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn stale_after(&self) -> Duration {
        match self.stale_secs {
            Some(secs) => Duration::from_secs(secs),
            None => self.interval() * 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedsConfig {
    pub seismic: FeedConfig,
    pub hotspots: HotspotFeedConfig,
    pub rain_sensors: FeedConfig,
    pub rain_radar: FeedConfig,
    pub river_discharge: FeedConfig,
    pub rain_forecast: FeedConfig,
    pub air_quality: FeedConfig,
    pub drought: FeedConfig,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            seismic: FeedConfig::with(
                "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/all_day.geojson",
                60,
            ),
            hotspots: HotspotFeedConfig::default(),
            rain_sensors: FeedConfig::with(
                "https://rain-store.example.com/rest/v1/rain_readings",
                60,
            ),
            rain_radar: FeedConfig::with(
                "https://api.rainviewer.com/public/weather-maps.json",
                120,
            ),
            river_discharge: FeedConfig::with("https://flood-api.open-meteo.com/v1/flood", 3600),
            rain_forecast: FeedConfig::with("https://api.open-meteo.com/v1/forecast", 1800),
            air_quality: FeedConfig::with(
                "http://air4thai.pcd.go.th/services/getNewAQI_JSON.php",
                600,
            ),
            drought: FeedConfig::with("https://drought.example.com/api/v1/indices", 3600),
        }
    }
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// API keys for the keyed feeds, loaded from the environment. A missing key
/// is not a startup error — the affected feed degrades to an auth failure at
/// fetch time so the rest of the dashboard keeps working.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub hotspot_modis_key: Option<String>,
    pub hotspot_viirs_key: Option<String>,
    pub rain_store_key: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self {
            hotspot_modis_key: read_env("HOTSPOT_MODIS_KEY"),
            hotspot_viirs_key: read_env("HOTSPOT_VIIRS_KEY"),
            rain_store_key: read_env("RAIN_STORE_KEY"),
        }
    }
}

fn read_env(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
