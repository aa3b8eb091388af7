/// River-discharge feed client.
///
/// The flood feed is queried per monitored basin point and returns daily
/// arrays keyed by date: `river_discharge`, `river_discharge_median`, and
/// `river_discharge_max`. One fetch cycle queries every registry point; a
/// point that fails is skipped with a warning, and the cycle fails only if
/// no point returned data at all.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::config::FeedConfig;
use crate::ingest::{get_json, FetchResult, SourceClient};
use crate::model::{
    DischargeDay, FeedError, FloodPointRecord, GeoPoint, HazardRecord, SourceKey, SourcePayload,
};
use crate::points::{MonitoredPoint, POINT_REGISTRY};

// ---------------------------------------------------------------------------
// Raw feed structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct FloodResponse {
    pub daily: DailySeries,
}

#[derive(Debug, Deserialize)]
pub struct DailySeries {
    /// Dates as "YYYY-MM-DD", aligned index-wise with the value arrays.
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub river_discharge: Vec<Option<f64>>,
    #[serde(default)]
    pub river_discharge_median: Vec<Option<f64>>,
    #[serde(default)]
    pub river_discharge_max: Vec<Option<f64>>,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Builds one flood-point record from a point's daily series. Returns `None`
/// when the series has no defined discharge value at all — a point with no
/// data is omitted for this cycle rather than emitted as an empty marker.
pub fn normalize_point(point: &MonitoredPoint, daily: &DailySeries) -> Option<HazardRecord> {
    let position = GeoPoint::new(point.latitude, point.longitude)?;

    let mut series = Vec::with_capacity(daily.time.len());
    for (idx, date_str) in daily.time.iter().enumerate() {
        let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
            continue;
        };
        series.push(DischargeDay {
            date,
            discharge: value_at(&daily.river_discharge, idx),
            discharge_median: value_at(&daily.river_discharge_median, idx),
            discharge_max: value_at(&daily.river_discharge_max, idx),
        });
    }

    // Latest defined value anchors the record's headline number and stamp.
    let (latest_day, latest_discharge) = series
        .iter()
        .rev()
        .find_map(|day| day.discharge.map(|v| (day.date, v)))?;

    Some(HazardRecord::FloodPoint(FloodPointRecord {
        id: point.id.to_string(),
        point: position,
        time: latest_day.and_hms_opt(0, 0, 0)?.and_utc(),
        point_name: point.name.to_string(),
        province: Some(point.province.to_string()),
        latest_discharge,
        series,
    }))
}

fn value_at(values: &[Option<f64>], idx: usize) -> Option<f64> {
    values.get(idx).copied().flatten().filter(|v| v.is_finite())
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct RiverDischargeClient {
    http: reqwest::Client,
    url: String,
    interval: Duration,
    stale_after: Duration,
}

impl RiverDischargeClient {
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
                "daily",
                "river_discharge,river_discharge_median,river_discharge_max".to_string(),
            ),
        ];
        let response: FloodResponse =
            get_json(&self.http, self.key(), &self.url, &query, &[]).await?;
        Ok(normalize_point(point, &response.daily))
    }
}

#[async_trait]
impl SourceClient for RiverDischargeClient {
    fn key(&self) -> SourceKey {
        SourceKey::RiverDischarge
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
