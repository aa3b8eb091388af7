/// Live multi-hazard data aggregation for the monitoring dashboard.
///
/// Feeds come in through `ingest`, land in the keyed `cache`, and are shaped
/// into per-type views by `filter`, `stats`, and `coordinator`. Everything
/// downstream of the source clients is pure over cache contents, so views
/// re-render deterministically from whatever the pollers last stored.
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod filter;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod points;
pub mod stats;
