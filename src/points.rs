/// Monitored-point registry for the hazard dashboard.
///
/// The river-discharge and rain-forecast feeds are queried per fixed
/// geographic point rather than returning their own station lists, so this
/// module is the single source of truth for which basin points the service
/// polls. All other modules should reference points from here rather than
/// hardcoding coordinates.

// ---------------------------------------------------------------------------
// Point metadata
// ---------------------------------------------------------------------------

/// Metadata for a single monitored basin point.
pub struct MonitoredPoint {
    /// Stable identifier used as the record id for this point.
    pub id: &'static str,
    /// Human-readable point name shown on the dashboard.
    pub name: &'static str,
    /// Province the point sits in, for stats breakdowns.
    pub province: &'static str,
    /// WGS84 latitude.
    pub latitude: f64,
    /// WGS84 longitude.
    pub longitude: f64,
}

/// All monitored basin points, ordered roughly downstream to upstream along
/// the Chao Phraya system plus its major tributaries.
pub static POINT_REGISTRY: &[MonitoredPoint] = &[
    MonitoredPoint {
        id: "cp-bangkok",
        name: "Chao Phraya at Bangkok",
        province: "Bangkok",
        latitude: 13.7563,
        longitude: 100.5018,
    },
    MonitoredPoint {
        id: "cp-ayutthaya",
        name: "Chao Phraya at Ayutthaya",
        province: "Phra Nakhon Si Ayutthaya",
        latitude: 14.3532,
        longitude: 100.5684,
    },
    MonitoredPoint {
        id: "cp-nakhon-sawan",
        name: "Chao Phraya at Nakhon Sawan",
        province: "Nakhon Sawan",
        latitude: 15.7047,
        longitude: 100.1372,
    },
    MonitoredPoint {
        id: "ping-chiang-mai",
        name: "Ping River at Chiang Mai",
        province: "Chiang Mai",
        latitude: 18.7883,
        longitude: 98.9853,
    },
    MonitoredPoint {
        id: "nan-phitsanulok",
        name: "Nan River at Phitsanulok",
        province: "Phitsanulok",
        latitude: 16.8211,
        longitude: 100.2659,
    },
    MonitoredPoint {
        id: "yom-sukhothai",
        name: "Yom River at Sukhothai",
        province: "Sukhothai",
        latitude: 17.0078,
        longitude: 99.8236,
    },
    MonitoredPoint {
        id: "mun-ubon",
        name: "Mun River at Ubon Ratchathani",
        province: "Ubon Ratchathani",
        latitude: 15.2287,
        longitude: 104.8564,
    },
    MonitoredPoint {
        id: "songkhla-hat-yai",
        name: "U-Taphao Canal at Hat Yai",
        province: "Songkhla",
        latitude: 7.0086,
        longitude: 100.4747,
    },
];

/// Returns the ids of all monitored points.
pub fn all_point_ids() -> Vec<&'static str> {
    POINT_REGISTRY.iter().map(|p| p.id).collect()
}

/// Looks up a point by id. Returns `None` if not found.
pub fn find_point(id: &str) -> Option<&'static MonitoredPoint> {
    POINT_REGISTRY.iter().find(|p| p.id == id)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
