/// Core data types for the hazard monitoring service.
///
/// This module defines the shared domain model imported by all other modules:
/// the closed set of hazard types the dashboard can display, the canonical
/// record union every feed is normalized into, and the feed error taxonomy.
/// It contains no I/O — only types and small invariant-preserving helpers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Hazard types
// ---------------------------------------------------------------------------

/// The closed set of disaster categories the dashboard can display.
/// Exactly one is "active" at any instant; `Storm` and `Sinkhole` are
/// placeholder slots with no backing feed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HazardType {
    Earthquake,
    HeavyRain,
    OpenMeteoRain,
    Wildfire,
    AirPollution,
    Drought,
    Flood,
    Storm,
    Sinkhole,
}

impl HazardType {
    pub const ALL: [HazardType; 9] = [
        HazardType::Earthquake,
        HazardType::HeavyRain,
        HazardType::OpenMeteoRain,
        HazardType::Wildfire,
        HazardType::AirPollution,
        HazardType::Drought,
        HazardType::Flood,
        HazardType::Storm,
        HazardType::Sinkhole,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            HazardType::Earthquake => "earthquake",
            HazardType::HeavyRain => "heavy-rain",
            HazardType::OpenMeteoRain => "open-meteo-rain",
            HazardType::Wildfire => "wildfire",
            HazardType::AirPollution => "air-pollution",
            HazardType::Drought => "drought",
            HazardType::Flood => "flood",
            HazardType::Storm => "storm",
            HazardType::Sinkhole => "sinkhole",
        }
    }
}

impl std::fmt::Display for HazardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

// ---------------------------------------------------------------------------
// Source keys
// ---------------------------------------------------------------------------

/// Identifies one upstream feed / cache entry. Each key is owned by exactly
/// one poller; no two pollers may share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKey {
    Seismic,
    Hotspots,
    RainSensors,
    RainRadar,
    RiverDischarge,
    RainForecast,
    AirQuality,
    Drought,
}

impl SourceKey {
    pub const ALL: [SourceKey; 8] = [
        SourceKey::Seismic,
        SourceKey::Hotspots,
        SourceKey::RainSensors,
        SourceKey::RainRadar,
        SourceKey::RiverDischarge,
        SourceKey::RainForecast,
        SourceKey::AirQuality,
        SourceKey::Drought,
    ];
}

impl std::fmt::Display for SourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SourceKey::Seismic => "seismic",
            SourceKey::Hotspots => "hotspots",
            SourceKey::RainSensors => "rain_sensors",
            SourceKey::RainRadar => "rain_radar",
            SourceKey::RiverDischarge => "river_discharge",
            SourceKey::RainForecast => "rain_forecast",
            SourceKey::AirQuality => "air_quality",
            SourceKey::Drought => "drought",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

/// A validated WGS84 position, always stored latitude-first regardless of
/// the order the upstream feed emitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Returns `None` for non-finite or out-of-range coordinates. Records
    /// with invalid positions are dropped, never coerced to (0, 0).
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        if !lat.is_finite() || !lng.is_finite() {
            return None;
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return None;
        }
        Some(Self { lat, lng })
    }

    /// GeoJSON geometries carry `[lon, lat]`; this flips them into canonical
    /// lat-first order.
    pub fn from_lon_lat(lon: f64, lat: f64) -> Option<Self> {
        Self::new(lat, lon)
    }
}

// ---------------------------------------------------------------------------
// Hotspot confidence
// ---------------------------------------------------------------------------

/// Categorical detection confidence reported by some satellite instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceClass {
    Low,
    Nominal,
    High,
}

impl ConfidenceClass {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "l" => Some(ConfidenceClass::Low),
            "nominal" | "n" => Some(ConfidenceClass::Nominal),
            "high" | "h" => Some(ConfidenceClass::High),
            _ => None,
        }
    }
}

/// Detection confidence as reported upstream. One instrument reports a
/// numeric 0–100 value, the other a categorical class; no documented mapping
/// exists between the two scales, so the original representation is always
/// preserved and only a derived score is used for threshold filtering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Confidence {
    Numeric(f64),
    Categorical(ConfidenceClass),
}

impl Confidence {
    /// Derived comparable score in 0–100, for threshold filtering only.
    /// Categorical classes get rank-preserving anchors (low=0, nominal=50,
    /// high=100); these are ordering anchors, not claimed equivalences with
    /// the numeric scale.
    pub fn score(&self) -> f64 {
        match self {
            Confidence::Numeric(v) => v.clamp(0.0, 100.0),
            Confidence::Categorical(ConfidenceClass::Low) => 0.0,
            Confidence::Categorical(ConfidenceClass::Nominal) => 50.0,
            Confidence::Categorical(ConfidenceClass::High) => 100.0,
        }
    }
}

/// Which satellite instrument produced a hotspot detection. Two instruments
/// covering the same point yield two records, never one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Instrument {
    Modis,
    Viirs,
}

impl Instrument {
    pub fn as_str(&self) -> &'static str {
        match self {
            Instrument::Modis => "MODIS",
            Instrument::Viirs => "VIIRS",
        }
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hotspot risk banding used by the dashboard's marker colours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "moderate" | "medium" => Some(RiskLevel::Moderate),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }

    /// Default banding when the feed omits a risk level: derived from the
    /// confidence score thirds.
    pub fn from_confidence(confidence: &Confidence) -> Self {
        let score = confidence.score();
        if score >= 66.0 {
            RiskLevel::High
        } else if score >= 33.0 {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Canonical records
// ---------------------------------------------------------------------------

/// A seismic event from the public earthquake feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EarthquakeRecord {
    pub id: String,
    pub point: GeoPoint,
    pub time: DateTime<Utc>,
    pub magnitude: f64,
    pub depth_km: Option<f64>,
    pub place: String,
}

/// One row from the rain-sensor store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RainSensorRecord {
    pub id: String,
    pub point: GeoPoint,
    pub inserted_at: DateTime<Utc>,
    pub humidity: f64,
    pub is_raining: bool,
    pub station_name: Option<String>,
}

/// A thermal anomaly detection from one satellite instrument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotspotRecord {
    pub id: String,
    pub point: GeoPoint,
    pub detected_at: DateTime<Utc>,
    pub instrument: Instrument,
    pub confidence: Confidence,
    pub risk: RiskLevel,
    /// Fire radiative power in MW, when reported.
    pub frp: Option<f64>,
    pub province: Option<String>,
    pub district: Option<String>,
    pub subdistrict: Option<String>,
}

/// Latest pollutant readings for one air-quality station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AirStationRecord {
    pub id: String,
    pub point: GeoPoint,
    pub time: DateTime<Utc>,
    pub station_name: String,
    pub province: Option<String>,
    pub aqi: Option<f64>,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub o3: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub co: Option<f64>,
}

/// One day of the river-discharge series for a monitored point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DischargeDay {
    pub date: NaiveDate,
    pub discharge: Option<f64>,
    pub discharge_median: Option<f64>,
    pub discharge_max: Option<f64>,
}

/// River-discharge state for one monitored basin point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FloodPointRecord {
    pub id: String,
    pub point: GeoPoint,
    pub time: DateTime<Utc>,
    pub point_name: String,
    pub province: Option<String>,
    /// Most recent defined discharge value in the series, m³/s.
    pub latest_discharge: f64,
    pub series: Vec<DischargeDay>,
}

/// Rain-forecast reading for one monitored point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RainForecastRecord {
    pub id: String,
    pub point: GeoPoint,
    pub time: DateTime<Utc>,
    pub point_name: String,
    pub temperature_c: Option<f64>,
    pub humidity: Option<f64>,
    pub precipitation_mm: Option<f64>,
}

/// Drought index reading for one reporting area.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroughtRecord {
    pub id: String,
    pub point: GeoPoint,
    pub time: DateTime<Utc>,
    pub area_name: String,
    pub province: Option<String>,
    /// Standardized index value; more negative is drier.
    pub index: f64,
    pub severity: DroughtSeverity,
}

/// Drought severity bands by standardized index value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DroughtSeverity {
    None,
    Moderate,
    Severe,
    Extreme,
}

impl DroughtSeverity {
    pub fn from_index(index: f64) -> Self {
        if index <= -2.0 {
            DroughtSeverity::Extreme
        } else if index <= -1.5 {
            DroughtSeverity::Severe
        } else if index <= -1.0 {
            DroughtSeverity::Moderate
        } else {
            DroughtSeverity::None
        }
    }
}

/// The canonical record union: one variant per feed-backed hazard type.
/// Every variant carries a stable id, a validated position, and a UTC
/// timestamp, plus its type-specific measurements.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HazardRecord {
    Earthquake(EarthquakeRecord),
    RainSensor(RainSensorRecord),
    Hotspot(HotspotRecord),
    AirStation(AirStationRecord),
    FloodPoint(FloodPointRecord),
    RainForecast(RainForecastRecord),
    Drought(DroughtRecord),
}

impl HazardRecord {
    pub fn id(&self) -> &str {
        match self {
            HazardRecord::Earthquake(r) => &r.id,
            HazardRecord::RainSensor(r) => &r.id,
            HazardRecord::Hotspot(r) => &r.id,
            HazardRecord::AirStation(r) => &r.id,
            HazardRecord::FloodPoint(r) => &r.id,
            HazardRecord::RainForecast(r) => &r.id,
            HazardRecord::Drought(r) => &r.id,
        }
    }

    pub fn point(&self) -> GeoPoint {
        match self {
            HazardRecord::Earthquake(r) => r.point,
            HazardRecord::RainSensor(r) => r.point,
            HazardRecord::Hotspot(r) => r.point,
            HazardRecord::AirStation(r) => r.point,
            HazardRecord::FloodPoint(r) => r.point,
            HazardRecord::RainForecast(r) => r.point,
            HazardRecord::Drought(r) => r.point,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            HazardRecord::Earthquake(r) => r.time,
            HazardRecord::RainSensor(r) => r.inserted_at,
            HazardRecord::Hotspot(r) => r.detected_at,
            HazardRecord::AirStation(r) => r.time,
            HazardRecord::FloodPoint(r) => r.time,
            HazardRecord::RainForecast(r) => r.time,
            HazardRecord::Drought(r) => r.time,
        }
    }

    /// The hazard type this record belongs to on the dashboard.
    pub fn hazard_type(&self) -> HazardType {
        match self {
            HazardRecord::Earthquake(_) => HazardType::Earthquake,
            HazardRecord::RainSensor(_) => HazardType::HeavyRain,
            HazardRecord::Hotspot(_) => HazardType::Wildfire,
            HazardRecord::AirStation(_) => HazardType::AirPollution,
            HazardRecord::FloodPoint(_) => HazardType::Flood,
            HazardRecord::RainForecast(_) => HazardType::OpenMeteoRain,
            HazardRecord::Drought(_) => HazardType::Drought,
        }
    }
}

// ---------------------------------------------------------------------------
// Radar frames
// ---------------------------------------------------------------------------

/// One time-stamped tile-path frame from the rain-radar feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadarFrame {
    pub time: DateTime<Utc>,
    pub path: String,
}

/// The rain-radar overlay payload: observed frames, forecast frames, and the
/// infrared satellite group. These feed tiled map overlays rather than point
/// markers, so they sit outside the record union.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RadarFrames {
    pub past: Vec<RadarFrame>,
    pub nowcast: Vec<RadarFrame>,
    pub infrared: Vec<RadarFrame>,
}

// ---------------------------------------------------------------------------
// Source payloads
// ---------------------------------------------------------------------------

/// What one fetch cycle of a source produces: either normalized point
/// records or the radar overlay frames.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SourcePayload {
    Records(Vec<HazardRecord>),
    Radar(RadarFrames),
}

impl SourcePayload {
    pub fn records(&self) -> &[HazardRecord] {
        match self {
            SourcePayload::Records(records) => records,
            SourcePayload::Radar(_) => &[],
        }
    }

    pub fn radar(&self) -> Option<&RadarFrames> {
        match self {
            SourcePayload::Radar(frames) => Some(frames),
            SourcePayload::Records(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise when fetching or decoding a feed. Individual
/// malformed records are not errors — the normalizers drop and count them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedError {
    /// Non-2xx HTTP response from the feed.
    #[error("{key} unavailable: HTTP {status}")]
    SourceUnavailable { key: SourceKey, status: u16 },
    /// Missing or rejected API key on a keyed feed. Reported distinctly from
    /// transport failure so operators can diagnose configuration issues.
    #[error("{key} auth failure: missing or rejected API key")]
    AuthFailure { key: SourceKey },
    /// The response body could not be deserialized.
    #[error("{key} response could not be decoded: {detail}")]
    Decode { key: SourceKey, detail: String },
    /// The fetch did not resolve within its timeout bound.
    #[error("{key} fetch timed out")]
    Timeout { key: SourceKey },
    /// Connection-level failure (DNS, refused, reset).
    #[error("{key} transport error: {detail}")]
    Transport { key: SourceKey, detail: String },
}

impl FeedError {
    pub fn key(&self) -> SourceKey {
        match self {
            FeedError::SourceUnavailable { key, .. }
            | FeedError::AuthFailure { key }
            | FeedError::Decode { key, .. }
            | FeedError::Timeout { key }
            | FeedError::Transport { key, .. } => *key,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
