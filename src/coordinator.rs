/// Active-selection coordinator.
///
/// Tracks which hazard type the dashboard is showing, wires each type to its
/// source poller, and assembles the per-type view from the cache: filtered
/// records, summary stats, and a view phase. Switching types subscribes the
/// new type's source but never stops the old one, so switching back serves
/// the cached view instantly while the background schedule keeps both warm.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::cache::{CacheRegistry, Snapshot};
use crate::filter::{filter_records, FilterState};
use crate::model::{FeedError, HazardRecord, HazardType, RadarFrames, SourceKey};
use crate::stats::{reduce, HazardStats};

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPhase {
    /// No source mapped, or nothing fetched yet and nothing in flight.
    Idle,
    /// First fetch in flight with no previous payload to show.
    Loading,
    /// A payload is on hand. Stays `Ready` through background refetches and
    /// even through refetch failures, which surface via `error` instead.
    Ready,
    /// Fetch failed and there is no previous payload to fall back on.
    Error,
}

/// What the dashboard renders for one hazard type.
#[derive(Debug, Clone)]
pub struct HazardView {
    pub hazard: HazardType,
    pub phase: ViewPhase,
    pub records: Vec<HazardRecord>,
    pub stats: HazardStats,
    /// True while any fetch is in flight, including background refetches of
    /// a `Ready` view.
    pub is_loading: bool,
    pub error: Option<FeedError>,
    pub last_updated: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct Coordinator {
    registry: CacheRegistry,
    active: HazardType,
    filters: FilterState,
    /// Last update stamp acknowledged per source, for update attribution.
    seen: HashMap<SourceKey, DateTime<Utc>>,
    /// Sources this coordinator holds a subscription on. Pollers refcount
    /// subscribers, so each source is subscribed at most once from here.
    subscribed: HashSet<SourceKey>,
}

impl Coordinator {
    /// Builds the coordinator and activates the initial type, kicking off
    /// its first fetch.
    pub fn new(registry: CacheRegistry, filters: FilterState, initial: HazardType) -> Self {
        let mut coordinator = Self {
            registry,
            active: initial,
            filters,
            seen: HashMap::new(),
            subscribed: HashSet::new(),
        };
        coordinator.activate(initial);
        coordinator
    }

    /// Which source feeds a hazard type. Types without a live feed yet map
    /// to nothing and render as an idle view.
    pub fn source_for(hazard: HazardType) -> Option<SourceKey> {
        match hazard {
            HazardType::Earthquake => Some(SourceKey::Seismic),
            HazardType::HeavyRain => Some(SourceKey::RainSensors),
            HazardType::OpenMeteoRain => Some(SourceKey::RainForecast),
            HazardType::Wildfire => Some(SourceKey::Hotspots),
            HazardType::AirPollution => Some(SourceKey::AirQuality),
            HazardType::Drought => Some(SourceKey::Drought),
            HazardType::Flood => Some(SourceKey::RiverDischarge),
            HazardType::Storm | HazardType::Sinkhole => None,
        }
    }

    pub fn active_type(&self) -> HazardType {
        self.active
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut FilterState {
        &mut self.filters
    }

    /// Makes a hazard type the active selection. The type's source starts
    /// polling on first activation; previously active sources keep polling
    /// so their caches stay warm for the next switch.
    pub fn set_active_type(&mut self, hazard: HazardType) {
        self.active = hazard;
        self.activate(hazard);
    }

    fn activate(&mut self, hazard: HazardType) {
        if let Some(key) = Self::source_for(hazard) {
            self.subscribe_once(key);
        }
        // The radar overlay accompanies the rain view.
        if hazard == HazardType::HeavyRain {
            self.subscribe_once(SourceKey::RainRadar);
        }
    }

    fn subscribe_once(&mut self, key: SourceKey) {
        if self.subscribed.insert(key) {
            self.registry.subscribe(key);
        }
    }

    /// The active type's view. Pure over the cache contents and `now`.
    pub fn current_view(&self, now: DateTime<Utc>) -> HazardView {
        self.view_for(self.active, now)
    }

    pub fn view_for(&self, hazard: HazardType, now: DateTime<Utc>) -> HazardView {
        let Some(key) = Self::source_for(hazard) else {
            return HazardView {
                hazard,
                phase: ViewPhase::Idle,
                records: Vec::new(),
                stats: reduce(hazard, &[], now),
                is_loading: false,
                error: None,
                last_updated: None,
            };
        };

        let snapshot = self.registry.snapshot(key);
        let records = match snapshot.data.as_deref() {
            Some(payload) => filter_records(hazard, payload.records(), &self.filters, now),
            None => Vec::new(),
        };
        let stats = reduce(hazard, &records, now);

        HazardView {
            hazard,
            phase: phase_of(&snapshot),
            records,
            stats,
            is_loading: snapshot.is_loading,
            error: snapshot.error,
            last_updated: snapshot.last_updated,
        }
    }

    pub fn stats_for(&self, hazard: HazardType, now: DateTime<Utc>) -> HazardStats {
        self.view_for(hazard, now).stats
    }

    /// Filtered records for map marker rendering.
    pub fn records_for(&self, hazard: HazardType, now: DateTime<Utc>) -> Vec<HazardRecord> {
        self.view_for(hazard, now).records
    }

    pub fn loading_for(&self, hazard: HazardType) -> bool {
        Self::source_for(hazard)
            .map(|key| self.registry.snapshot(key).is_loading)
            .unwrap_or(false)
    }

    /// Latest radar overlay frames, independent of the active type's record
    /// view. `None` until the radar feed has produced a payload.
    pub fn radar_frames(&self) -> Option<RadarFrames> {
        let snapshot = self.registry.snapshot(SourceKey::RainRadar);
        snapshot.data.as_deref().and_then(|payload| payload.radar().cloned())
    }

    /// Forces a refetch of the active type's source and returns the fresh
    /// view. A type without a source returns its idle view unchanged.
    pub async fn refresh_active(&mut self, now: DateTime<Utc>) -> HazardView {
        if let Some(key) = Self::source_for(self.active) {
            if let Some(poller) = self.registry.poller(key) {
                poller.force_refetch().await;
            }
        }
        self.current_view(now)
    }

    /// Reports whether the active type's data advanced since the last call,
    /// for an "updated" notice in the UI. Updates landing for inactive types
    /// are acknowledged silently so they never fire a notice later — neither
    /// while inactive nor retroactively on the next switch.
    pub fn take_update_notice(&mut self) -> Option<HazardType> {
        let active_key = Self::source_for(self.active);
        let mut notice = None;

        for key in SourceKey::ALL {
            let snapshot = self.registry.snapshot(key);
            let Some(updated) = snapshot.last_updated else {
                continue;
            };
            let advanced = self.seen.get(&key).is_none_or(|seen| updated > *seen);
            if advanced {
                self.seen.insert(key, updated);
                if Some(key) == active_key {
                    notice = Some(self.active);
                }
            }
        }
        notice
    }
}

fn phase_of(snapshot: &Snapshot) -> ViewPhase {
    match (&snapshot.data, &snapshot.error, snapshot.is_loading) {
        (Some(_), _, _) => ViewPhase::Ready,
        (None, _, true) => ViewPhase::Loading,
        (None, Some(_), false) => ViewPhase::Error,
        (None, None, false) => ViewPhase::Idle,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::ingest::{FetchResult, SourceClient};
    use crate::model::{EarthquakeRecord, GeoPoint, HotspotRecord, SourcePayload};

    /// Counts fetches and returns a fixed payload per source.
    struct FixedClient {
        key: SourceKey,
        calls: Arc<AtomicUsize>,
        payload: SourcePayload,
    }

    #[async_trait]
    impl SourceClient for FixedClient {
        fn key(&self) -> SourceKey {
            self.key
        }

        fn refetch_interval(&self) -> Duration {
            Duration::from_secs(600)
        }

        async fn fetch(&self) -> FetchResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(self.payload.clone())
        }
    }

    fn quake(id: &str, magnitude: f64) -> HazardRecord {
        HazardRecord::Earthquake(EarthquakeRecord {
            id: id.to_string(),
            point: GeoPoint::new(15.0, 100.0).unwrap(),
            time: Utc::now(),
            magnitude,
            depth_km: None,
            place: String::new(),
        })
    }

    fn hotspot(id: &str) -> HazardRecord {
        HazardRecord::Hotspot(HotspotRecord {
            id: id.to_string(),
            point: GeoPoint::new(16.0, 101.0).unwrap(),
            detected_at: Utc::now(),
            instrument: crate::model::Instrument::Modis,
            confidence: crate::model::Confidence::Numeric(80.0),
            risk: crate::model::RiskLevel::Moderate,
            frp: None,
            province: None,
            district: None,
            subdistrict: None,
        })
    }

    fn client(
        key: SourceKey,
        calls: &Arc<AtomicUsize>,
        records: Vec<HazardRecord>,
    ) -> Arc<dyn SourceClient> {
        Arc::new(FixedClient {
            key,
            calls: Arc::clone(calls),
            payload: SourcePayload::Records(records),
        })
    }

    async fn wait_for_ready(coordinator: &Coordinator, hazard: HazardType) {
        while coordinator.view_for(hazard, Utc::now()).phase != ViewPhase::Ready {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_back_serves_cached_view_without_refetch() {
        let seismic_calls = Arc::new(AtomicUsize::new(0));
        let hotspot_calls = Arc::new(AtomicUsize::new(0));
        let registry = CacheRegistry::new(vec![
            client(SourceKey::Seismic, &seismic_calls, vec![quake("a", 4.0)]),
            client(SourceKey::Hotspots, &hotspot_calls, vec![hotspot("h")]),
        ]);
        let mut coordinator =
            Coordinator::new(registry, FilterState::default(), HazardType::Earthquake);
        wait_for_ready(&coordinator, HazardType::Earthquake).await;

        coordinator.set_active_type(HazardType::Wildfire);
        wait_for_ready(&coordinator, HazardType::Wildfire).await;

        coordinator.set_active_type(HazardType::Earthquake);
        let view = coordinator.current_view(Utc::now());
        assert_eq!(view.phase, ViewPhase::Ready, "cached view must serve instantly");
        assert_eq!(view.records.len(), 1);
        assert_eq!(
            seismic_calls.load(Ordering::SeqCst),
            1,
            "switching back must not trigger a foreground refetch"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmapped_type_renders_idle() {
        let registry = CacheRegistry::new(vec![]);
        let coordinator = Coordinator::new(registry, FilterState::default(), HazardType::Storm);
        let view = coordinator.current_view(Utc::now());
        assert_eq!(view.phase, ViewPhase::Idle);
        assert!(view.records.is_empty());
        assert!(view.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failing_source_does_not_poison_others() {
        struct FailingClient;

        #[async_trait]
        impl SourceClient for FailingClient {
            fn key(&self) -> SourceKey {
                SourceKey::Hotspots
            }
            fn refetch_interval(&self) -> Duration {
                Duration::from_secs(600)
            }
            async fn fetch(&self) -> FetchResult {
                Err(FeedError::AuthFailure {
                    key: SourceKey::Hotspots,
                })
            }
        }

        let seismic_calls = Arc::new(AtomicUsize::new(0));
        let registry = CacheRegistry::new(vec![
            client(SourceKey::Seismic, &seismic_calls, vec![quake("a", 4.0)]),
            Arc::new(FailingClient),
        ]);
        let mut coordinator =
            Coordinator::new(registry, FilterState::default(), HazardType::Earthquake);
        wait_for_ready(&coordinator, HazardType::Earthquake).await;

        coordinator.set_active_type(HazardType::Wildfire);
        while coordinator.view_for(HazardType::Wildfire, Utc::now()).error.is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let wildfire = coordinator.view_for(HazardType::Wildfire, Utc::now());
        assert_eq!(wildfire.phase, ViewPhase::Error);
        assert!(matches!(wildfire.error, Some(FeedError::AuthFailure { .. })));

        let earthquake = coordinator.view_for(HazardType::Earthquake, Utc::now());
        assert_eq!(earthquake.phase, ViewPhase::Ready, "other types stay usable");
    }

    #[tokio::test(start_paused = true)]
    async fn test_filters_apply_to_the_rendered_view() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = CacheRegistry::new(vec![client(
            SourceKey::Seismic,
            &calls,
            vec![quake("small", 2.1), quake("big", 6.8)],
        )]);
        let mut coordinator =
            Coordinator::new(registry, FilterState::default(), HazardType::Earthquake);
        wait_for_ready(&coordinator, HazardType::Earthquake).await;

        coordinator.filters_mut().set_min_magnitude(5.0);
        assert_eq!(coordinator.filters().min_magnitude(), 5.0);
        let view = coordinator.current_view(Utc::now());
        assert_eq!(view.records.len(), 1);
        assert_eq!(view.records[0].id(), "big");
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_updates_are_acknowledged_silently() {
        let seismic_calls = Arc::new(AtomicUsize::new(0));
        let hotspot_calls = Arc::new(AtomicUsize::new(0));
        let registry = CacheRegistry::new(vec![
            client(SourceKey::Seismic, &seismic_calls, vec![quake("a", 4.0)]),
            client(SourceKey::Hotspots, &hotspot_calls, vec![hotspot("h")]),
        ]);
        let mut coordinator =
            Coordinator::new(registry, FilterState::default(), HazardType::Earthquake);
        wait_for_ready(&coordinator, HazardType::Earthquake).await;
        assert_eq!(
            coordinator.take_update_notice(),
            Some(HazardType::Earthquake),
            "first active payload fires a notice"
        );

        // Warm the wildfire cache while earthquakes stay active.
        coordinator.set_active_type(HazardType::Wildfire);
        coordinator.set_active_type(HazardType::Earthquake);
        wait_for_ready(&coordinator, HazardType::Wildfire).await;

        assert_eq!(
            coordinator.take_update_notice(),
            None,
            "inactive update must not fire a notice"
        );
        coordinator.set_active_type(HazardType::Wildfire);
        assert_eq!(
            coordinator.take_update_notice(),
            None,
            "already-acknowledged update must not fire retroactively"
        );
    }
}
