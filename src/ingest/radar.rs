/// Rain-radar feed client.
///
/// The public radar feed describes time-stamped tile-path frames split into
/// observed (`radar.past`) and forecast (`radar.nowcast`) groups, plus an
/// infrared satellite group. Frames feed tiled map overlays rather than
/// point markers, so this source produces the radar payload instead of
/// canonical records.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::FeedConfig;
use crate::ingest::{get_json, FetchResult, SourceClient};
use crate::model::{RadarFrame, RadarFrames, SourceKey, SourcePayload};

// ---------------------------------------------------------------------------
// Raw feed structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RadarFeed {
    #[serde(default)]
    pub radar: RadarGroups,
    #[serde(default)]
    pub satellite: SatelliteGroups,
}

#[derive(Debug, Default, Deserialize)]
pub struct RadarGroups {
    #[serde(default)]
    pub past: Vec<RawFrame>,
    #[serde(default)]
    pub nowcast: Vec<RawFrame>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SatelliteGroups {
    #[serde(default)]
    pub infrared: Vec<RawFrame>,
}

#[derive(Debug, Deserialize)]
pub struct RawFrame {
    /// Frame time in epoch seconds.
    pub time: i64,
    pub path: String,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Converts the raw feed into the radar overlay payload, keeping the
/// past/nowcast/infrared split. Frames with an unrepresentable timestamp or
/// empty path are dropped.
pub fn normalize(feed: RadarFeed) -> RadarFrames {
    RadarFrames {
        past: normalize_group(feed.radar.past),
        nowcast: normalize_group(feed.radar.nowcast),
        infrared: normalize_group(feed.satellite.infrared),
    }
}

fn normalize_group(frames: Vec<RawFrame>) -> Vec<RadarFrame> {
    frames
        .into_iter()
        .filter_map(|frame| {
            if frame.path.trim().is_empty() {
                return None;
            }
            let time = DateTime::<Utc>::from_timestamp(frame.time, 0)?;
            Some(RadarFrame {
                time,
                path: frame.path,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct RadarClient {
    http: reqwest::Client,
    url: String,
    interval: Duration,
    stale_after: Duration,
}

impl RadarClient {
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
impl SourceClient for RadarClient {
    fn key(&self) -> SourceKey {
        SourceKey::RainRadar
    }

    fn refetch_interval(&self) -> Duration {
        self.interval
    }

    fn stale_after(&self) -> Duration {
        self.stale_after
    }

    async fn fetch(&self) -> FetchResult {
        let feed: RadarFeed = get_json(&self.http, self.key(), &self.url, &[], &[]).await?;
        Ok(SourcePayload::Radar(normalize(feed)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
