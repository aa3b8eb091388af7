/// Summary statistics per hazard type.
///
/// `reduce` is a pure fold over an already-filtered record batch: same
/// records and same `now` always produce the same stats, so a view can be
/// re-rendered from cache without drift. Averages skip undefined values
/// rather than counting them as zero.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

use crate::model::{DroughtSeverity, HazardRecord, HazardType, RiskLevel};

/// Magnitude at and above which a quake counts as major.
const MAJOR_MAGNITUDE: f64 = 6.0;

/// AQI above which a station counts as unhealthy.
const UNHEALTHY_AQI: f64 = 100.0;

/// How many provinces the hotspot ranking keeps.
const TOP_PROVINCES: usize = 5;

// ---------------------------------------------------------------------------
// Stat shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HazardStats {
    Earthquake(EarthquakeStats),
    HeavyRain(RainStats),
    Wildfire(WildfireStats),
    AirPollution(AirQualityStats),
    Flood(FloodStats),
    RainForecast(ForecastStats),
    Drought(DroughtStats),
    /// Types with no reducer yet, and empty batches of unmapped types.
    Empty(EmptyStats),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmptyStats {
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EarthquakeStats {
    pub total: usize,
    pub major: usize,
    pub last_24h: usize,
    pub strongest_magnitude: Option<f64>,
    pub average_magnitude: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RainStats {
    pub total: usize,
    pub raining: usize,
    pub average_humidity: Option<f64>,
    pub max_humidity: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WildfireStats {
    pub total: usize,
    pub modis: usize,
    pub viirs: usize,
    pub high_risk: usize,
    pub top_provinces: Vec<ProvinceCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvinceCount {
    pub province: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AirQualityStats {
    pub total: usize,
    pub unhealthy: usize,
    pub max_aqi: Option<f64>,
    pub average_pm25: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FloodStats {
    pub total: usize,
    pub above_median: usize,
    pub max_discharge: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ForecastStats {
    pub total: usize,
    pub raining_points: usize,
    pub max_precipitation: Option<f64>,
    pub average_temperature: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DroughtStats {
    pub total: usize,
    pub moderate: usize,
    pub severe: usize,
    pub extreme: usize,
    pub driest_index: Option<f64>,
}

// ---------------------------------------------------------------------------
// Reducer
// ---------------------------------------------------------------------------

/// Folds a record batch into the active type's stats. Records of other
/// variants are ignored so a mixed batch cannot skew the numbers.
pub fn reduce(hazard: HazardType, records: &[HazardRecord], now: DateTime<Utc>) -> HazardStats {
    match hazard {
        HazardType::Earthquake => HazardStats::Earthquake(reduce_earthquakes(records, now)),
        HazardType::HeavyRain => HazardStats::HeavyRain(reduce_rain(records)),
        HazardType::Wildfire => HazardStats::Wildfire(reduce_wildfire(records)),
        HazardType::AirPollution => HazardStats::AirPollution(reduce_air(records)),
        HazardType::Flood => HazardStats::Flood(reduce_flood(records)),
        HazardType::OpenMeteoRain => HazardStats::RainForecast(reduce_forecast(records)),
        HazardType::Drought => HazardStats::Drought(reduce_drought(records)),
        HazardType::Storm | HazardType::Sinkhole => HazardStats::Empty(EmptyStats {
            total: records.len(),
        }),
    }
}

fn reduce_earthquakes(records: &[HazardRecord], now: DateTime<Utc>) -> EarthquakeStats {
    let cutoff = now - ChronoDuration::hours(24);
    let mut stats = EarthquakeStats::default();
    let mut magnitude_sum = 0.0;

    for record in records {
        let HazardRecord::Earthquake(eq) = record else {
            continue;
        };
        stats.total += 1;
        magnitude_sum += eq.magnitude;
        if eq.magnitude >= MAJOR_MAGNITUDE {
            stats.major += 1;
        }
        if eq.time >= cutoff {
            stats.last_24h += 1;
        }
        if stats.strongest_magnitude.is_none_or(|m| eq.magnitude > m) {
            stats.strongest_magnitude = Some(eq.magnitude);
        }
    }

    if stats.total > 0 {
        stats.average_magnitude = Some(magnitude_sum / stats.total as f64);
    }
    stats
}

fn reduce_rain(records: &[HazardRecord]) -> RainStats {
    let mut stats = RainStats::default();
    let mut humidity_sum = 0.0;

    for record in records {
        let HazardRecord::RainSensor(rs) = record else {
            continue;
        };
        stats.total += 1;
        humidity_sum += rs.humidity;
        if rs.is_raining {
            stats.raining += 1;
        }
        if stats.max_humidity.is_none_or(|m| rs.humidity > m) {
            stats.max_humidity = Some(rs.humidity);
        }
    }

    if stats.total > 0 {
        stats.average_humidity = Some(humidity_sum / stats.total as f64);
    }
    stats
}

fn reduce_wildfire(records: &[HazardRecord]) -> WildfireStats {
    let mut stats = WildfireStats::default();
    let mut provinces: HashMap<&str, usize> = HashMap::new();

    for record in records {
        let HazardRecord::Hotspot(hs) = record else {
            continue;
        };
        stats.total += 1;
        match hs.instrument {
            crate::model::Instrument::Modis => stats.modis += 1,
            crate::model::Instrument::Viirs => stats.viirs += 1,
        }
        if hs.risk == RiskLevel::High {
            stats.high_risk += 1;
        }
        if let Some(province) = hs.province.as_deref() {
            *provinces.entry(province).or_default() += 1;
        }
    }

    stats.top_provinces = rank_provinces(provinces);
    stats
}

/// Orders by count descending, name ascending on ties, so the ranking is
/// stable across runs regardless of map iteration order.
fn rank_provinces(provinces: HashMap<&str, usize>) -> Vec<ProvinceCount> {
    let mut ranked: Vec<ProvinceCount> = provinces
        .into_iter()
        .map(|(province, count)| ProvinceCount {
            province: province.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.province.cmp(&b.province)));
    ranked.truncate(TOP_PROVINCES);
    ranked
}

fn reduce_air(records: &[HazardRecord]) -> AirQualityStats {
    let mut stats = AirQualityStats::default();
    let mut pm25_sum = 0.0;
    let mut pm25_count = 0usize;

    for record in records {
        let HazardRecord::AirStation(aq) = record else {
            continue;
        };
        stats.total += 1;
        if let Some(aqi) = aq.aqi {
            if aqi > UNHEALTHY_AQI {
                stats.unhealthy += 1;
            }
            if stats.max_aqi.is_none_or(|m| aqi > m) {
                stats.max_aqi = Some(aqi);
            }
        }
        if let Some(pm25) = aq.pm25 {
            pm25_sum += pm25;
            pm25_count += 1;
        }
    }

    if pm25_count > 0 {
        stats.average_pm25 = Some(pm25_sum / pm25_count as f64);
    }
    stats
}

fn reduce_flood(records: &[HazardRecord]) -> FloodStats {
    let mut stats = FloodStats::default();

    for record in records {
        let HazardRecord::FloodPoint(fp) = record else {
            continue;
        };
        stats.total += 1;
        if stats.max_discharge.is_none_or(|m| fp.latest_discharge > m) {
            stats.max_discharge = Some(fp.latest_discharge);
        }
        let latest_median = fp
            .series
            .iter()
            .rev()
            .find_map(|day| day.discharge_median);
        if latest_median.is_some_and(|median| fp.latest_discharge > median) {
            stats.above_median += 1;
        }
    }
    stats
}

fn reduce_forecast(records: &[HazardRecord]) -> ForecastStats {
    let mut stats = ForecastStats::default();
    let mut temp_sum = 0.0;
    let mut temp_count = 0usize;

    for record in records {
        let HazardRecord::RainForecast(wx) = record else {
            continue;
        };
        stats.total += 1;
        if let Some(precip) = wx.precipitation_mm {
            if precip > 0.0 {
                stats.raining_points += 1;
            }
            if stats.max_precipitation.is_none_or(|m| precip > m) {
                stats.max_precipitation = Some(precip);
            }
        }
        if let Some(temp) = wx.temperature_c {
            temp_sum += temp;
            temp_count += 1;
        }
    }

    if temp_count > 0 {
        stats.average_temperature = Some(temp_sum / temp_count as f64);
    }
    stats
}

fn reduce_drought(records: &[HazardRecord]) -> DroughtStats {
    let mut stats = DroughtStats::default();

    for record in records {
        let HazardRecord::Drought(dr) = record else {
            continue;
        };
        stats.total += 1;
        match dr.severity {
            DroughtSeverity::None => {}
            DroughtSeverity::Moderate => stats.moderate += 1,
            DroughtSeverity::Severe => stats.severe += 1,
            DroughtSeverity::Extreme => stats.extreme += 1,
        }
        if stats.driest_index.is_none_or(|m| dr.index < m) {
            stats.driest_index = Some(dr.index);
        }
    }
    stats
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
