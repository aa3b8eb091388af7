/// Drought index feed client.
///
/// The drought service reports a standardized precipitation index per
/// reporting area. Severity bands are derived here from the index value so
/// downstream consumers never re-threshold it.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::FeedConfig;
use crate::ingest::{get_json, FetchResult, SourceClient};
use crate::model::{DroughtRecord, DroughtSeverity, GeoPoint, HazardRecord, SourceKey, SourcePayload};

// ---------------------------------------------------------------------------
// Raw feed structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DroughtFeed {
    #[serde(default)]
    pub areas: Vec<RawArea>,
}

#[derive(Debug, Deserialize)]
pub struct RawArea {
    pub id: Option<String>,
    pub name: Option<String>,
    pub province: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Standardized index; more negative is drier.
    pub index: Option<f64>,
    /// RFC 3339 stamp of the reading.
    pub updated_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Converts reporting areas into canonical drought records. Areas without a
/// location, a finite index, or a parseable stamp are dropped individually.
pub fn normalize(feed: DroughtFeed) -> Vec<HazardRecord> {
    let total = feed.areas.len();
    let mut records = Vec::with_capacity(total);

    for area in feed.areas {
        if let Some(record) = normalize_area(area) {
            records.push(record);
        }
    }

    let dropped = total - records.len();
    if dropped > 0 {
        tracing::warn!(source = %SourceKey::Drought, dropped, total, "dropped malformed areas");
    }
    records
}

fn normalize_area(area: RawArea) -> Option<HazardRecord> {
    let point = GeoPoint::new(area.latitude?, area.longitude?)?;
    let index = area.index.filter(|v| v.is_finite())?;
    let time = DateTime::parse_from_rfc3339(area.updated_at.as_deref()?)
        .ok()?
        .with_timezone(&Utc);
    let id = area.id?;

    Some(HazardRecord::Drought(DroughtRecord {
        id: format!("dr-{}", id),
        point,
        time,
        area_name: area.name.unwrap_or_else(|| id.clone()),
        province: area.province,
        index,
        severity: DroughtSeverity::from_index(index),
    }))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct DroughtClient {
    http: reqwest::Client,
    url: String,
    interval: Duration,
    stale_after: Duration,
}

impl DroughtClient {
    pub fn new(http: reqwest::Client, config: &FeedConfig) -> Self {
        Self {
            http,
            url: config.url.clone(),
            interval: config.interval(),
            stale_after: config.stale_after(),
        }
    }
}

#[async_trait]
impl SourceClient for DroughtClient {
    fn key(&self) -> SourceKey {
        SourceKey::Drought
    }

    fn refetch_interval(&self) -> Duration {
        self.interval
    }

    fn stale_after(&self) -> Duration {
        self.stale_after
    }

    async fn fetch(&self) -> FetchResult {
        let feed: DroughtFeed = get_json(&self.http, self.key(), &self.url, &[], &[]).await?;
        Ok(SourcePayload::Records(normalize(feed)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
