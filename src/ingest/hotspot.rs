/// Wildfire hotspot feed client.
///
/// Two independently-keyed instrument endpoints (MODIS and VIIRS) sit behind
/// one client. Both are fetched in the same cycle; when exactly one
/// instrument fails the other's detections are still served. Detections from
/// the two instruments are never merged — each record keeps its instrument
/// tag even when both cover the same point.
///
/// The feeds disagree about confidence: one reports a numeric 0–100 value,
/// the other a categorical low/nominal/high class. Both representations are
/// preserved as-is; see `Confidence` in the model.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;

use crate::config::HotspotFeedConfig;
use crate::ingest::{get_json, FetchResult, SourceClient};
use crate::model::{
    Confidence, ConfidenceClass, FeedError, GeoPoint, HazardRecord, HotspotRecord, Instrument,
    RiskLevel, SourceKey, SourcePayload,
};

// ---------------------------------------------------------------------------
// Raw feed structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HotspotFeed {
    #[serde(default)]
    pub features: Vec<HotspotFeature>,
}

#[derive(Debug, Deserialize)]
pub struct HotspotFeature {
    pub properties: HotspotProperties,
    pub geometry: Option<HotspotGeometry>,
}

#[derive(Debug, Deserialize)]
pub struct HotspotProperties {
    /// Numeric (0–100) or categorical ("low"/"nominal"/"high") depending on
    /// the instrument. Kept as a raw value until normalization.
    pub confidence: Option<serde_json::Value>,
    /// Fire radiative power, MW.
    pub frp: Option<f64>,
    pub acq_date: Option<String>,
    /// Acquisition time as "HHMM" (sometimes "HMM").
    pub acq_time: Option<String>,
    pub risk_level: Option<String>,
    pub province: Option<String>,
    pub district: Option<String>,
    pub subdistrict: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HotspotGeometry {
    /// `[lon, lat]` GeoJSON order.
    #[serde(default)]
    pub coordinates: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Converts one instrument's raw feed into canonical hotspot records, each
/// tagged with that instrument. Features with invalid coordinates or an
/// unparseable acquisition stamp are dropped individually.
pub fn normalize(feed: HotspotFeed, instrument: Instrument) -> Vec<HazardRecord> {
    let total = feed.features.len();
    let mut records = Vec::with_capacity(total);

    for feature in feed.features {
        if let Some(record) = normalize_feature(feature, instrument) {
            records.push(record);
        }
    }

    let dropped = total - records.len();
    if dropped > 0 {
        tracing::warn!(
            source = %SourceKey::Hotspots,
            instrument = %instrument,
            dropped,
            total,
            "dropped malformed detections"
        );
    }
    records
}

fn normalize_feature(feature: HotspotFeature, instrument: Instrument) -> Option<HazardRecord> {
    let geometry = feature.geometry?;
    if geometry.coordinates.len() < 2 {
        return None;
    }
    let point = GeoPoint::from_lon_lat(geometry.coordinates[0], geometry.coordinates[1])?;

    let props = feature.properties;
    let detected_at = parse_acquisition(props.acq_date.as_deref()?, props.acq_time.as_deref()?)?;

    let confidence = props
        .confidence
        .as_ref()
        .and_then(parse_confidence)
        // A detection the instrument did not grade at all is still a
        // detection; treat it as the lowest band rather than dropping it.
        .unwrap_or(Confidence::Categorical(ConfidenceClass::Low));

    let risk = props
        .risk_level
        .as_deref()
        .and_then(RiskLevel::parse)
        .unwrap_or_else(|| RiskLevel::from_confidence(&confidence));

    let id = format!(
        "{}-{}-{:.4}-{:.4}",
        instrument.as_str(),
        detected_at.timestamp(),
        point.lat,
        point.lng
    );

    Some(HazardRecord::Hotspot(HotspotRecord {
        id,
        point,
        detected_at,
        instrument,
        confidence,
        risk,
        frp: props.frp.filter(|v| v.is_finite()),
        province: props.province,
        district: props.district,
        subdistrict: props.subdistrict,
    }))
}

/// Coerces the mixed numeric/categorical confidence field without collapsing
/// the two representations into one scale.
pub fn parse_confidence(value: &serde_json::Value) -> Option<Confidence> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().map(Confidence::Numeric),
        serde_json::Value::String(s) => {
            if let Ok(v) = s.trim().parse::<f64>() {
                Some(Confidence::Numeric(v))
            } else {
                ConfidenceClass::parse(s).map(Confidence::Categorical)
            }
        }
        _ => None,
    }
}

/// `acq_date` is "YYYY-MM-DD"; `acq_time` is minutes-precision "HHMM", with
/// leading zeros sometimes missing ("934" for 09:34 UTC).
fn parse_acquisition(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    let digits = time.trim();
    if digits.is_empty() || digits.len() > 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let padded = format!("{:0>4}", digits);
    let time = NaiveTime::parse_from_str(&padded, "%H%M").ok()?;
    Some(date.and_time(time).and_utc())
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct HotspotClient {
    http: reqwest::Client,
    modis_url: String,
    viirs_url: String,
    modis_key: Option<String>,
    viirs_key: Option<String>,
    interval: Duration,
    stale_after: Duration,
}

impl HotspotClient {
    pub fn new(
        http: reqwest::Client,
        config: &HotspotFeedConfig,
        modis_key: Option<String>,
        viirs_key: Option<String>,
    ) -> Self {
        Self {
            http,
            modis_url: config.modis_url.clone(),
            viirs_url: config.viirs_url.clone(),
            modis_key,
            viirs_key,
            interval: config.interval(),
            stale_after: config.stale_after(),
        }
    }

    async fn fetch_instrument(
        &self,
        url: &str,
        key: Option<&str>,
        instrument: Instrument,
    ) -> Result<Vec<HazardRecord>, FeedError> {
        // A keyed endpoint with no configured key is an auth failure up
        // front, not a transport error after the fact.
        let api_key = key.ok_or(FeedError::AuthFailure {
            key: SourceKey::Hotspots,
        })?;
        let feed: HotspotFeed = get_json(
            &self.http,
            SourceKey::Hotspots,
            url,
            &[],
            &[("API-Key", api_key)],
        )
        .await?;
        Ok(normalize(feed, instrument))
    }
}

#[async_trait]
impl SourceClient for HotspotClient {
    fn key(&self) -> SourceKey {
        SourceKey::Hotspots
    }

    fn refetch_interval(&self) -> Duration {
        self.interval
    }

    fn stale_after(&self) -> Duration {
        self.stale_after
    }

    async fn fetch(&self) -> FetchResult {
        let (modis, viirs) = tokio::join!(
            self.fetch_instrument(&self.modis_url, self.modis_key.as_deref(), Instrument::Modis),
            self.fetch_instrument(&self.viirs_url, self.viirs_key.as_deref(), Instrument::Viirs),
        );

        match (modis, viirs) {
            (Ok(mut a), Ok(b)) => {
                a.extend(b);
                Ok(SourcePayload::Records(a))
            }
            (Ok(records), Err(err)) | (Err(err), Ok(records)) => {
                tracing::warn!(
                    source = %SourceKey::Hotspots,
                    error = %err,
                    "one instrument failed; serving the other"
                );
                Ok(SourcePayload::Records(records))
            }
            (Err(a), Err(b)) => {
                // Prefer the auth failure: it is the actionable one.
                if matches!(a, FeedError::AuthFailure { .. }) {
                    Err(a)
                } else if matches!(b, FeedError::AuthFailure { .. }) {
                    Err(b)
                } else {
                    Err(a)
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
