/// Air-quality feed client.
///
/// The national monitoring network publishes one document listing every
/// station with its latest reading nested under `AQILast`. The feed is
/// loosely typed: coordinates and pollutant values arrive as numbers or as
/// numeric strings, and "no data" is encoded with -1/-999 sentinels, so all
/// values go through the lenient coercion helper.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::config::FeedConfig;
use crate::ingest::{get_json, lenient_f64, FetchResult, SourceClient};
use crate::model::{AirStationRecord, GeoPoint, HazardRecord, SourceKey, SourcePayload};

// ---------------------------------------------------------------------------
// Raw feed structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AirFeed {
    #[serde(default)]
    pub stations: Vec<RawStation>,
}

#[derive(Debug, Deserialize)]
pub struct RawStation {
    #[serde(rename = "stationID")]
    pub station_id: Option<String>,
    #[serde(rename = "nameEN")]
    pub name_en: Option<String>,
    #[serde(rename = "areaEN")]
    pub area_en: Option<String>,
    /// Number or numeric string, depending on the station.
    pub lat: Option<Value>,
    pub long: Option<Value>,
    #[serde(rename = "AQILast")]
    pub aqi_last: Option<RawAqiLast>,
}

#[derive(Debug, Deserialize)]
pub struct RawAqiLast {
    /// Local reading date, "YYYY-MM-DD".
    pub date: Option<String>,
    /// Local reading time, "HH:MM".
    pub time: Option<String>,
    #[serde(rename = "AQI")]
    pub aqi: Option<RawPollutant>,
    #[serde(rename = "PM25")]
    pub pm25: Option<RawPollutant>,
    #[serde(rename = "PM10")]
    pub pm10: Option<RawPollutant>,
    #[serde(rename = "O3")]
    pub o3: Option<RawPollutant>,
    #[serde(rename = "NO2")]
    pub no2: Option<RawPollutant>,
    #[serde(rename = "SO2")]
    pub so2: Option<RawPollutant>,
    #[serde(rename = "CO")]
    pub co: Option<RawPollutant>,
}

#[derive(Debug, Deserialize)]
pub struct RawPollutant {
    pub value: Option<Value>,
    #[serde(default)]
    pub aqi: Option<Value>,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Stations report local time; the network runs on UTC+7.
const STATION_UTC_OFFSET_HOURS: i64 = 7;

/// Converts the station list into canonical records. `fetched_at` stands in
/// for the reading time when a station's own stamp is absent or unparseable,
/// keeping the function free of wall-clock reads.
pub fn normalize(feed: AirFeed, fetched_at: DateTime<Utc>) -> Vec<HazardRecord> {
    let total = feed.stations.len();
    let mut records = Vec::with_capacity(total);

    for station in feed.stations {
        if let Some(record) = normalize_station(station, fetched_at) {
            records.push(record);
        }
    }

    let dropped = total - records.len();
    if dropped > 0 {
        tracing::warn!(source = %SourceKey::AirQuality, dropped, total, "dropped malformed stations");
    }
    records
}

fn normalize_station(station: RawStation, fetched_at: DateTime<Utc>) -> Option<HazardRecord> {
    let lat = lenient_f64(station.lat.as_ref()?)?;
    let lng = lenient_f64(station.long.as_ref()?)?;
    let point = GeoPoint::new(lat, lng)?;

    let id = station.station_id?;
    let last = station.aqi_last?;

    let time = reading_time(&last).unwrap_or(fetched_at);

    Some(HazardRecord::AirStation(AirStationRecord {
        id: format!("aq-{}", id),
        point,
        time,
        station_name: station.name_en.unwrap_or_else(|| id.clone()),
        province: station.area_en,
        aqi: pollutant_aqi(last.aqi.as_ref()),
        pm25: pollutant_value(last.pm25.as_ref()),
        pm10: pollutant_value(last.pm10.as_ref()),
        o3: pollutant_value(last.o3.as_ref()),
        no2: pollutant_value(last.no2.as_ref()),
        so2: pollutant_value(last.so2.as_ref()),
        co: pollutant_value(last.co.as_ref()),
    }))
}

fn reading_time(last: &RawAqiLast) -> Option<DateTime<Utc>> {
    let stamp = format!("{} {}", last.date.as_deref()?, last.time.as_deref()?);
    let local = NaiveDateTime::parse_from_str(&stamp, "%Y-%m-%d %H:%M").ok()?;
    Some(local.and_utc() - chrono::Duration::hours(STATION_UTC_OFFSET_HOURS))
}

fn pollutant_value(p: Option<&RawPollutant>) -> Option<f64> {
    lenient_f64(p?.value.as_ref()?)
}

/// The composite AQI lives under `aqi`, not `value`, unlike the pollutants.
fn pollutant_aqi(p: Option<&RawPollutant>) -> Option<f64> {
    let p = p?;
    p.aqi
        .as_ref()
        .and_then(lenient_f64)
        .or_else(|| p.value.as_ref().and_then(lenient_f64))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct AirQualityClient {
    http: reqwest::Client,
    url: String,
    interval: Duration,
    stale_after: Duration,
}

impl AirQualityClient {
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
impl SourceClient for AirQualityClient {
    fn key(&self) -> SourceKey {
        SourceKey::AirQuality
    }

    fn refetch_interval(&self) -> Duration {
        self.interval
    }

    fn stale_after(&self) -> Duration {
        self.stale_after
    }

    async fn fetch(&self) -> FetchResult {
        let feed: AirFeed = get_json(&self.http, self.key(), &self.url, &[], &[]).await?;
        Ok(SourcePayload::Records(normalize(feed, Utc::now())))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn feed_from(json: &str) -> AirFeed {
        serde_json::from_str(json).expect("fixture should parse")
    }

    fn fetched_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 4, 0, 0).single().expect("valid stamp")
    }

    #[test]
    fn test_string_coordinates_and_values_are_coerced() {
        let feed = feed_from(
            r#"{
                "stations": [{
                    "stationID": "02t",
                    "nameEN": "Bansomdej",
                    "areaEN": "Bangkok",
                    "lat": "13.732",
                    "long": "100.489",
                    "AQILast": {
                        "date": "2026-06-01", "time": "10:00",
                        "AQI": { "aqi": "52" },
                        "PM25": { "value": "25.1" },
                        "PM10": { "value": 44 }
                    }
                }]
            }"#,
        );
        let records = normalize(feed, fetched_at());
        assert_eq!(records.len(), 1);
        match &records[0] {
            HazardRecord::AirStation(aq) => {
                assert_eq!(aq.point.lat, 13.732);
                assert_eq!(aq.aqi, Some(52.0));
                assert_eq!(aq.pm25, Some(25.1));
                assert_eq!(aq.pm10, Some(44.0));
            }
            other => panic!("expected air station record, got {:?}", other),
        }
    }

    #[test]
    fn test_sentinel_pollutant_values_become_none() {
        let feed = feed_from(
            r#"{
                "stations": [{
                    "stationID": "03t",
                    "nameEN": "x",
                    "lat": 13.7,
                    "long": 100.5,
                    "AQILast": {
                        "date": "2026-06-01", "time": "10:00",
                        "PM25": { "value": -1 },
                        "O3": { "value": "-999" }
                    }
                }]
            }"#,
        );
        match &normalize(feed, fetched_at())[0] {
            HazardRecord::AirStation(aq) => {
                assert_eq!(aq.pm25, None);
                assert_eq!(aq.o3, None);
            }
            other => panic!("expected air station record, got {:?}", other),
        }
    }

    #[test]
    fn test_local_reading_time_converts_to_utc() {
        let feed = feed_from(
            r#"{
                "stations": [{
                    "stationID": "02t",
                    "nameEN": "x",
                    "lat": 13.7,
                    "long": 100.5,
                    "AQILast": { "date": "2026-06-01", "time": "10:00" }
                }]
            }"#,
        );
        let records = normalize(feed, fetched_at());
        assert_eq!(records[0].timestamp().format("%H:%M").to_string(), "03:00");
    }

    #[test]
    fn test_missing_reading_time_falls_back_to_fetch_time() {
        let feed = feed_from(
            r#"{
                "stations": [{
                    "stationID": "02t",
                    "nameEN": "x",
                    "lat": 13.7,
                    "long": 100.5,
                    "AQILast": {}
                }]
            }"#,
        );
        let records = normalize(feed, fetched_at());
        assert_eq!(records[0].timestamp(), fetched_at());
    }

    #[test]
    fn test_station_without_coordinates_is_dropped() {
        let feed = feed_from(
            r#"{
                "stations": [
                    { "stationID": "bad", "nameEN": "x", "AQILast": {} },
                    {
                        "stationID": "good", "nameEN": "y",
                        "lat": 13.7, "long": 100.5, "AQILast": {}
                    }
                ]
            }"#,
        );
        let records = normalize(feed, fetched_at());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id(), "aq-good");
    }
}
