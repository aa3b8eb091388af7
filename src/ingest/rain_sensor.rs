/// Rain-sensor store client.
///
/// The community rain sensors write rows into a hosted tabular store exposed
/// over REST. Rows are requested ordered by insertion time, newest first,
/// and each carries `humidity`, `is_raining`, `inserted_at`, and the sensor
/// location. The store is keyed; a missing key degrades this feed to an
/// auth failure without touching any other hazard type.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::FeedConfig;
use crate::ingest::{get_json, FetchResult, SourceClient};
use crate::model::{FeedError, GeoPoint, HazardRecord, RainSensorRecord, SourceKey, SourcePayload};

/// How many of the newest rows one fetch pulls.
const ROW_LIMIT: usize = 200;

// ---------------------------------------------------------------------------
// Raw row structure
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SensorRow {
    pub id: i64,
    pub humidity: Option<f64>,
    #[serde(default)]
    pub is_raining: Option<bool>,
    /// RFC 3339 insertion timestamp.
    pub inserted_at: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub station_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Converts store rows into canonical rain-sensor records. Rows without a
/// stored location, a humidity value, or a parseable timestamp are dropped
/// individually. A missing raining flag defaults to false.
pub fn normalize(rows: Vec<SensorRow>) -> Vec<HazardRecord> {
    let total = rows.len();
    let mut records = Vec::with_capacity(total);

    for row in rows {
        if let Some(record) = normalize_row(row) {
            records.push(record);
        }
    }

    let dropped = total - records.len();
    if dropped > 0 {
        tracing::warn!(source = %SourceKey::RainSensors, dropped, total, "dropped malformed rows");
    }
    records
}

fn normalize_row(row: SensorRow) -> Option<HazardRecord> {
    let point = GeoPoint::new(row.latitude?, row.longitude?)?;
    let humidity = row.humidity.filter(|h| h.is_finite())?;
    let inserted_at = DateTime::parse_from_rfc3339(&row.inserted_at)
        .ok()?
        .with_timezone(&Utc);

    Some(HazardRecord::RainSensor(RainSensorRecord {
        id: format!("sensor-{}", row.id),
        point,
        inserted_at,
        humidity: humidity.clamp(0.0, 100.0),
        is_raining: row.is_raining.unwrap_or(false),
        station_name: row.station_name,
    }))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct RainSensorClient {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    interval: Duration,
    stale_after: Duration,
}

impl RainSensorClient {
    pub fn new(http: reqwest::Client, config: &FeedConfig, api_key: Option<String>) -> Self {
        Self {
            http,
            url: config.url.clone(),
            api_key,
            interval: config.interval(),
            stale_after: config.stale_after(),
        }
    }
}

#[async_trait]
impl SourceClient for RainSensorClient {
    fn key(&self) -> SourceKey {
        SourceKey::RainSensors
    }

    fn refetch_interval(&self) -> Duration {
        self.interval
    }

    fn stale_after(&self) -> Duration {
        self.stale_after
    }

    async fn fetch(&self) -> FetchResult {
        let api_key = self.api_key.as_deref().ok_or(FeedError::AuthFailure {
            key: SourceKey::RainSensors,
        })?;
        let query = [
            ("order", "inserted_at.desc".to_string()),
            ("limit", ROW_LIMIT.to_string()),
        ];
        let rows: Vec<SensorRow> = get_json(
            &self.http,
            self.key(),
            &self.url,
            &query,
            &[("apikey", api_key)],
        )
        .await?;
        Ok(SourcePayload::Records(normalize(rows)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
