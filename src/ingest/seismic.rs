/// Seismic feed client.
///
/// Consumes the public GeoJSON summary feed of recent earthquake events.
/// Each feature carries `properties.mag`, `properties.time` (epoch ms),
/// `properties.place`, and `geometry.coordinates = [lon, lat, depth_km]` —
/// note the GeoJSON lon-first order, which the normalizer flips.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::FeedConfig;
use crate::ingest::{get_json, FetchResult, SourceClient};
use crate::model::{EarthquakeRecord, GeoPoint, HazardRecord, SourceKey, SourcePayload};

// ---------------------------------------------------------------------------
// Raw feed structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct QuakeFeed {
    #[serde(default)]
    pub features: Vec<QuakeFeature>,
}

#[derive(Debug, Deserialize)]
pub struct QuakeFeature {
    pub id: Option<String>,
    pub properties: QuakeProperties,
    pub geometry: Option<QuakeGeometry>,
}

#[derive(Debug, Deserialize)]
pub struct QuakeProperties {
    pub mag: Option<f64>,
    /// Event time in epoch milliseconds.
    pub time: Option<i64>,
    pub place: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuakeGeometry {
    /// `[lon, lat]` or `[lon, lat, depth_km]`.
    #[serde(default)]
    pub coordinates: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Converts the raw feed into canonical earthquake records. Features with
/// missing/invalid coordinates, magnitude, or time are dropped individually;
/// the rest of the batch is kept.
pub fn normalize(feed: QuakeFeed) -> Vec<HazardRecord> {
    let total = feed.features.len();
    let mut records = Vec::with_capacity(total);

    for feature in feed.features {
        if let Some(record) = normalize_feature(feature) {
            records.push(record);
        }
    }

    let dropped = total - records.len();
    if dropped > 0 {
        tracing::warn!(source = %SourceKey::Seismic, dropped, total, "dropped malformed features");
    }
    records
}

fn normalize_feature(feature: QuakeFeature) -> Option<HazardRecord> {
    let geometry = feature.geometry?;
    if geometry.coordinates.len() < 2 {
        return None;
    }
    // GeoJSON order is [lon, lat]; canonical order is lat-first.
    let point = GeoPoint::from_lon_lat(geometry.coordinates[0], geometry.coordinates[1])?;
    let depth_km = geometry.coordinates.get(2).copied();

    let magnitude = feature.properties.mag?;
    if !magnitude.is_finite() {
        return None;
    }
    let time = epoch_ms(feature.properties.time?)?;

    let id = feature
        .id
        .unwrap_or_else(|| format!("eq-{}-{:.3}-{:.3}", time.timestamp(), point.lat, point.lng));

    Some(HazardRecord::Earthquake(EarthquakeRecord {
        id,
        point,
        time,
        magnitude,
        depth_km,
        place: feature.properties.place.unwrap_or_default(),
    }))
}

fn epoch_ms(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct SeismicClient {
    http: reqwest::Client,
    url: String,
    interval: Duration,
    stale_after: Duration,
}

impl SeismicClient {
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
impl SourceClient for SeismicClient {
    fn key(&self) -> SourceKey {
        SourceKey::Seismic
    }

    fn refetch_interval(&self) -> Duration {
        self.interval
    }

    fn stale_after(&self) -> Duration {
        self.stale_after
    }

    async fn fetch(&self) -> FetchResult {
        let feed: QuakeFeed = get_json(&self.http, self.key(), &self.url, &[], &[]).await?;
        Ok(SourcePayload::Records(normalize(feed)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_from(json: &str) -> QuakeFeed {
        serde_json::from_str(json).expect("fixture should parse")
    }

    #[test]
    fn test_coordinates_are_flipped_from_geojson_order() {
        let feed = feed_from(
            r#"{
                "features": [{
                    "id": "us7000abcd",
                    "properties": { "mag": 4.6, "time": 1714564800000, "place": "off the coast" },
                    "geometry": { "coordinates": [98.65, 3.21, 35.0] }
                }]
            }"#,
        );
        let records = normalize(feed);
        assert_eq!(records.len(), 1);
        let point = records[0].point();
        assert_eq!(point.lat, 3.21, "latitude must come from the second element");
        assert_eq!(point.lng, 98.65, "longitude must come from the first element");
    }

    #[test]
    fn test_depth_comes_from_third_coordinate() {
        let feed = feed_from(
            r#"{
                "features": [{
                    "id": "us7000abcd",
                    "properties": { "mag": 4.6, "time": 1714564800000, "place": "x" },
                    "geometry": { "coordinates": [98.65, 3.21, 35.0] }
                }]
            }"#,
        );
        match &normalize(feed)[0] {
            HazardRecord::Earthquake(eq) => assert_eq!(eq.depth_km, Some(35.0)),
            other => panic!("expected earthquake record, got {:?}", other),
        }
    }

    #[test]
    fn test_feature_with_invalid_coordinates_is_dropped_not_zeroed() {
        let feed = feed_from(
            r#"{
                "features": [
                    {
                        "id": "good",
                        "properties": { "mag": 5.0, "time": 1714564800000, "place": "a" },
                        "geometry": { "coordinates": [100.0, 15.0] }
                    },
                    {
                        "id": "bad",
                        "properties": { "mag": 5.0, "time": 1714564800000, "place": "b" },
                        "geometry": { "coordinates": [200.0, 95.0] }
                    }
                ]
            }"#,
        );
        let records = normalize(feed);
        assert_eq!(records.len(), 1, "invalid coordinates must drop the record");
        assert_eq!(records[0].id(), "good");
        assert_ne!(records[0].point().lat, 0.0);
    }

    #[test]
    fn test_feature_without_magnitude_is_dropped_batch_survives() {
        let feed = feed_from(
            r#"{
                "features": [
                    {
                        "id": "nomag",
                        "properties": { "time": 1714564800000, "place": "a" },
                        "geometry": { "coordinates": [100.0, 15.0] }
                    },
                    {
                        "id": "ok",
                        "properties": { "mag": 3.2, "time": 1714564800000, "place": "b" },
                        "geometry": { "coordinates": [101.0, 16.0] }
                    }
                ]
            }"#,
        );
        let records = normalize(feed);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id(), "ok");
    }

    #[test]
    fn test_epoch_ms_timestamps_are_parsed() {
        let feed = feed_from(
            r#"{
                "features": [{
                    "id": "t",
                    "properties": { "mag": 3.0, "time": 1714564800000, "place": "x" },
                    "geometry": { "coordinates": [100.0, 15.0] }
                }]
            }"#,
        );
        let records = normalize(feed);
        assert_eq!(records[0].timestamp().timestamp(), 1_714_564_800);
    }

    #[test]
    fn test_empty_feed_normalizes_to_empty_set() {
        let records = normalize(feed_from(r#"{ "features": [] }"#));
        assert!(records.is_empty());
    }
}
