/// Source clients for the external hazard feeds.
///
/// Each submodule owns one feed: its endpoint, raw payload shape, transport,
/// and the pure normalizer that turns the raw payload into canonical records.
/// Clients never retry internally — the poller's tick schedule is the retry
/// policy — and never touch filter state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::config::{Config, Secrets};
use crate::model::{FeedError, SourceKey, SourcePayload};

pub mod air;
pub mod drought;
pub mod hotspot;
pub mod radar;
pub mod rain_sensor;
pub mod river;
pub mod seismic;
pub mod weather;

pub type FetchResult = Result<SourcePayload, FeedError>;

// ---------------------------------------------------------------------------
// Client contract
// ---------------------------------------------------------------------------

/// One external feed: transport plus raw decode plus normalization into the
/// canonical payload. Implementations must not retry or sleep; a failed
/// fetch is reported once and the poller schedules the next attempt.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// The cache key this client's payloads live under.
    fn key(&self) -> SourceKey;

    /// How often the poller refetches while subscribed.
    fn refetch_interval(&self) -> Duration;

    /// Cache entries older than this are refetched on subscription.
    fn stale_after(&self) -> Duration {
        self.refetch_interval() * 2
    }

    async fn fetch(&self) -> FetchResult;
}

// ---------------------------------------------------------------------------
// Shared transport helpers
// ---------------------------------------------------------------------------

const USER_AGENT: &str = concat!("hazmon_service/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the shared HTTP client used by every source client.
pub fn build_http_client() -> Result<reqwest::Client, FeedError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| FeedError::Transport {
            key: SourceKey::Seismic,
            detail: format!("http client build failed: {}", e),
        })
}

/// GET a JSON document, mapping HTTP status onto the feed error taxonomy.
/// 401/403 are reported as auth failures so operators can tell a bad key
/// apart from an outage.
pub(crate) async fn get_json<T: DeserializeOwned>(
    http: &reqwest::Client,
    key: SourceKey,
    url: &str,
    query: &[(&str, String)],
    headers: &[(&str, &str)],
) -> Result<T, FeedError> {
    let mut request = http.get(url);
    if !query.is_empty() {
        request = request.query(query);
    }
    for (name, value) in headers {
        request = request.header(*name, *value);
    }

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            FeedError::Timeout { key }
        } else {
            FeedError::Transport {
                key,
                detail: e.to_string(),
            }
        }
    })?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(FeedError::AuthFailure { key });
    }
    if !status.is_success() {
        return Err(FeedError::SourceUnavailable {
            key,
            status: status.as_u16(),
        });
    }

    response.json::<T>().await.map_err(|e| FeedError::Decode {
        key,
        detail: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Client construction
// ---------------------------------------------------------------------------

/// Builds one client per feed from config + secrets, sharing a single HTTP
/// connection pool. The returned set feeds straight into `CacheRegistry::new`.
pub fn build_clients(
    config: &Config,
    secrets: &Secrets,
) -> Result<Vec<Arc<dyn SourceClient>>, FeedError> {
    validate_endpoints(config)?;
    let http = build_http_client()?;
    let feeds = &config.feeds;
    Ok(vec![
        Arc::new(seismic::SeismicClient::new(http.clone(), &feeds.seismic)),
        Arc::new(hotspot::HotspotClient::new(
            http.clone(),
            &feeds.hotspots,
            secrets.hotspot_modis_key.clone(),
            secrets.hotspot_viirs_key.clone(),
        )),
        Arc::new(rain_sensor::RainSensorClient::new(
            http.clone(),
            &feeds.rain_sensors,
            secrets.rain_store_key.clone(),
        )),
        Arc::new(radar::RadarClient::new(http.clone(), &feeds.rain_radar)),
        Arc::new(river::RiverDischargeClient::new(
            http.clone(),
            &feeds.river_discharge,
        )),
        Arc::new(weather::RainForecastClient::new(
            http.clone(),
            &feeds.rain_forecast,
        )),
        Arc::new(air::AirQualityClient::new(http.clone(), &feeds.air_quality)),
        Arc::new(drought::DroughtClient::new(http, &feeds.drought)),
    ])
}

/// Rejects malformed endpoint URLs at startup instead of at first fetch.
fn validate_endpoints(config: &Config) -> Result<(), FeedError> {
    let feeds = &config.feeds;
    let endpoints = [
        (SourceKey::Seismic, feeds.seismic.url.as_str()),
        (SourceKey::Hotspots, feeds.hotspots.modis_url.as_str()),
        (SourceKey::Hotspots, feeds.hotspots.viirs_url.as_str()),
        (SourceKey::RainSensors, feeds.rain_sensors.url.as_str()),
        (SourceKey::RainRadar, feeds.rain_radar.url.as_str()),
        (SourceKey::RiverDischarge, feeds.river_discharge.url.as_str()),
        (SourceKey::RainForecast, feeds.rain_forecast.url.as_str()),
        (SourceKey::AirQuality, feeds.air_quality.url.as_str()),
        (SourceKey::Drought, feeds.drought.url.as_str()),
    ];
    for (key, endpoint) in endpoints {
        url::Url::parse(endpoint).map_err(|e| FeedError::Transport {
            key,
            detail: format!("invalid endpoint url {endpoint:?}: {e}"),
        })?;
    }
    Ok(())
}

/// Coerces a JSON value that may be a number or a numeric string into f64.
/// Several upstream feeds are inconsistent about this. Sentinel values used
/// upstream for "no data" (-1, -999) come back as `None`.
pub(crate) fn lenient_f64(value: &serde_json::Value) -> Option<f64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    if !parsed.is_finite() || parsed == -1.0 || parsed <= -999.0 {
        return None;
    }
    Some(parsed)
}
