/// Per-type record filters.
///
/// Filter state is a set of minimum thresholds plus layer toggles. Setters
/// clamp out-of-range values into the legal range instead of rejecting them,
/// so a bad slider value degrades to the nearest sane threshold. Filtering
/// itself is pure: records in, records out, no clock reads beyond the `now`
/// the caller passes for the time window.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::config::FilterDefaults;
use crate::model::{HazardRecord, HazardType, Instrument};

// ---------------------------------------------------------------------------
// Threshold ranges
// ---------------------------------------------------------------------------

const MAGNITUDE_RANGE: (f64, f64) = (0.0, 10.0);
const HUMIDITY_RANGE: (f64, f64) = (0.0, 100.0);
const CONFIDENCE_RANGE: (f64, f64) = (0.0, 100.0);
const PM25_MIN: f64 = 0.0;

// ---------------------------------------------------------------------------
// Filter state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    min_magnitude: f64,
    min_humidity: f64,
    min_pm25: f64,
    min_confidence: f64,
    show_modis: bool,
    show_viirs: bool,
    /// Records older than this window (relative to the caller's `now`) are
    /// hidden. `None` disables the window.
    time_window: Option<ChronoDuration>,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            min_magnitude: MAGNITUDE_RANGE.0,
            min_humidity: HUMIDITY_RANGE.0,
            min_pm25: PM25_MIN,
            min_confidence: CONFIDENCE_RANGE.0,
            show_modis: true,
            show_viirs: true,
            time_window: None,
        }
    }
}

impl FilterState {
    pub fn from_defaults(defaults: &FilterDefaults) -> Self {
        let mut state = Self::default();
        state.set_min_magnitude(defaults.min_magnitude);
        state.set_min_humidity(defaults.min_humidity);
        state.set_min_pm25(defaults.min_pm25);
        state.set_min_confidence(defaults.min_confidence);
        if let Some(hours) = defaults.time_window_hours {
            state.set_time_window_hours(Some(hours));
        }
        state
    }

    pub fn min_magnitude(&self) -> f64 {
        self.min_magnitude
    }

    pub fn min_humidity(&self) -> f64 {
        self.min_humidity
    }

    pub fn min_pm25(&self) -> f64 {
        self.min_pm25
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    pub fn set_min_magnitude(&mut self, value: f64) {
        self.min_magnitude = clamp_threshold("min_magnitude", value, MAGNITUDE_RANGE);
    }

    pub fn set_min_humidity(&mut self, value: f64) {
        self.min_humidity = clamp_threshold("min_humidity", value, HUMIDITY_RANGE);
    }

    pub fn set_min_pm25(&mut self, value: f64) {
        self.min_pm25 = clamp_threshold("min_pm25", value, (PM25_MIN, f64::MAX));
    }

    pub fn set_min_confidence(&mut self, value: f64) {
        self.min_confidence = clamp_threshold("min_confidence", value, CONFIDENCE_RANGE);
    }

    pub fn set_instrument_visible(&mut self, instrument: Instrument, visible: bool) {
        match instrument {
            Instrument::Modis => self.show_modis = visible,
            Instrument::Viirs => self.show_viirs = visible,
        }
    }

    pub fn instrument_visible(&self, instrument: Instrument) -> bool {
        match instrument {
            Instrument::Modis => self.show_modis,
            Instrument::Viirs => self.show_viirs,
        }
    }

    pub fn set_time_window_hours(&mut self, hours: Option<u32>) {
        self.time_window = hours.map(|h| ChronoDuration::hours(i64::from(h.max(1))));
    }

    pub fn time_window(&self) -> Option<ChronoDuration> {
        self.time_window
    }
}

/// Pulls a requested threshold into its legal range. A non-finite request is
/// treated as the range floor.
fn clamp_threshold(name: &str, value: f64, (lo, hi): (f64, f64)) -> f64 {
    if !value.is_finite() {
        tracing::warn!(threshold = name, "non-finite threshold requested; using minimum");
        return lo;
    }
    let clamped = value.clamp(lo, hi);
    if clamped != value {
        tracing::warn!(threshold = name, requested = value, applied = clamped, "threshold clamped");
    }
    clamped
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Applies the active type's thresholds to a record batch. Records belonging
/// to a different hazard type are dropped outright, so a mixed payload never
/// leaks foreign records into a view. The input slice is untouched; survivors
/// are cloned out in their original order.
pub fn filter_records(
    hazard: HazardType,
    records: &[HazardRecord],
    filters: &FilterState,
    now: DateTime<Utc>,
) -> Vec<HazardRecord> {
    records
        .iter()
        .filter(|record| {
            record.hazard_type() == hazard
                && within_window(record, filters, now)
                && passes(hazard, record, filters)
        })
        .cloned()
        .collect()
}

fn within_window(record: &HazardRecord, filters: &FilterState, now: DateTime<Utc>) -> bool {
    match filters.time_window {
        Some(window) => record.timestamp() >= now - window,
        None => true,
    }
}

fn passes(hazard: HazardType, record: &HazardRecord, filters: &FilterState) -> bool {
    match (hazard, record) {
        (HazardType::Earthquake, HazardRecord::Earthquake(eq)) => {
            eq.magnitude >= filters.min_magnitude
        }
        (HazardType::HeavyRain, HazardRecord::RainSensor(rs)) => {
            rs.humidity >= filters.min_humidity
        }
        (HazardType::Wildfire, HazardRecord::Hotspot(hs)) => {
            filters.instrument_visible(hs.instrument)
                && hs.confidence.score() >= filters.min_confidence
        }
        (HazardType::AirPollution, HazardRecord::AirStation(aq)) => {
            // Stations without a PM2.5 reading only show when the threshold
            // is at its floor.
            aq.pm25.map_or(filters.min_pm25 <= PM25_MIN, |v| v >= filters.min_pm25)
        }
        // Remaining types carry no threshold; every record of the matching
        // type passes.
        _ => true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
