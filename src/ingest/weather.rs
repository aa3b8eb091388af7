/// Rain-forecast weather client.
///
/// Queries the hourly forecast feed per monitored point for temperature,
/// relative humidity, and precipitation. The headline record for a point is
/// the most recent hour that carries a defined precipitation value; a point
/// whose arrays are entirely undefined is omitted for the cycle.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::config::FeedConfig;
use crate::ingest::{get_json, FetchResult, SourceClient};
use crate::model::{
    FeedError, GeoPoint, HazardRecord, RainForecastRecord, SourceKey, SourcePayload,
};
use crate::points::{MonitoredPoint, POINT_REGISTRY};

// ---------------------------------------------------------------------------
// Raw feed structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ForecastResponse {
    pub hourly: HourlySeries,
}

#[derive(Debug, Deserialize)]
pub struct HourlySeries {
    /// Hour stamps as "YYYY-MM-DDTHH:MM" in UTC, aligned index-wise with the
    /// value arrays.
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    pub relative_humidity_2m: Vec<Option<f64>>,
    #[serde(default)]
    pub precipitation: Vec<Option<f64>>,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Builds one forecast record from a point's hourly series, anchored on the
/// last hour with a defined precipitation value.
pub fn normalize_point(point: &MonitoredPoint, hourly: &HourlySeries) -> Option<HazardRecord> {
    let position = GeoPoint::new(point.latitude, point.longitude)?;

    let (idx, precipitation) = hourly
        .precipitation
        .iter()
        .enumerate()
        .rev()
        .find_map(|(idx, v)| {
            let v = (*v)?;
            v.is_finite().then_some((idx, v))
        })?;

    let stamp = hourly.time.get(idx)?;
    let time = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%dT%H:%M")
        .ok()?
        .and_utc();

    Some(HazardRecord::RainForecast(RainForecastRecord {
        id: format!("wx-{}", point.id),
        point: position,
        time,
        point_name: point.name.to_string(),
        temperature_c: value_at(&hourly.temperature_2m, idx),
        humidity: value_at(&hourly.relative_humidity_2m, idx),
        precipitation_mm: Some(precipitation),
    }))
}

fn value_at(values: &[Option<f64>], idx: usize) -> Option<f64> {
    values.get(idx).copied().flatten().filter(|v| v.is_finite())
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct RainForecastClient {
    http: reqwest::Client,
    url: String,
    interval: Duration,
    stale_after: Duration,
}

impl RainForecastClient {
    pub fn new(http: reqwest::Client, config: &FeedConfig) -> Self {
        Self {
            http,
            url: config.url.clone(),
            interval: config.interval(),
            stale_after: config.stale_after(),
        }
    }

    async fn fetch_point(&self, point: &MonitoredPoint) -> Result<Option<HazardRecord>, FeedError> {
        let query = [
            ("latitude", point.latitude.to_string()),
            ("longitude", point.longitude.to_string()),
            (
                "hourly",
                "temperature_2m,relative_humidity_2m,precipitation".to_string(),
            ),
            ("past_hours", "6".to_string()),
            ("forecast_hours", "24".to_string()),
        ];
        let response: ForecastResponse =
            get_json(&self.http, self.key(), &self.url, &query, &[]).await?;
        Ok(normalize_point(point, &response.hourly))
    }
}

#[async_trait]
impl SourceClient for RainForecastClient {
    fn key(&self) -> SourceKey {
        SourceKey::RainForecast
    }

    fn refetch_interval(&self) -> Duration {
        self.interval
    }

    fn stale_after(&self) -> Duration {
        self.stale_after
    }

    async fn fetch(&self) -> FetchResult {
        let mut records = Vec::with_capacity(POINT_REGISTRY.len());
        let mut last_error = None;

        for point in POINT_REGISTRY {
            match self.fetch_point(point).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        source = %self.key(),
                        point = point.id,
                        error = %err,
                        "point query failed; continuing with remaining points"
                    );
                    last_error = Some(err);
                }
            }
        }

        match (records.is_empty(), last_error) {
            (true, Some(err)) => Err(err),
            _ => Ok(SourcePayload::Records(records)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
