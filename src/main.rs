/// Service entry point.
///
/// Boots the aggregation layer standalone: loads config and secrets, builds
/// the source clients and cache registry, activates the initial hazard type,
/// and then logs view summaries as updates land. The dashboard embeds the
/// library directly; this binary exists for operating the pollers headless.

use std::error::Error;
use std::time::Duration;

use chrono::Utc;

use hazmon_service::cache::CacheRegistry;
use hazmon_service::config::{Config, Secrets};
use hazmon_service::coordinator::Coordinator;
use hazmon_service::filter::FilterState;
use hazmon_service::ingest::build_clients;
use hazmon_service::logging::init_logging;
use hazmon_service::model::HazardType;

const DEFAULT_CONFIG_PATH: &str = "hazmon.toml";

/// How often the headless loop checks for landed updates.
const NOTICE_POLL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config_path =
        std::env::var("HAZMON_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            // Defaults are complete, so a missing file is not fatal.
            eprintln!("config not loaded from {config_path} ({err}); using defaults");
            Config::default()
        }
    };
    init_logging(&config.logging)?;

    let secrets = Secrets::from_env();
    let clients = build_clients(&config, &secrets)?;
    let registry = CacheRegistry::new(clients);
    let filters = FilterState::from_defaults(&config.filters);
    let mut coordinator = Coordinator::new(registry, filters, HazardType::Earthquake);

    tracing::info!(
        config = %config_path,
        min_magnitude = coordinator.filters().min_magnitude(),
        min_pm25 = coordinator.filters().min_pm25(),
        "hazard aggregation service started"
    );

    loop {
        tokio::select! {
            _ = tokio::time::sleep(NOTICE_POLL) => {
                if let Some(hazard) = coordinator.take_update_notice() {
                    let view = coordinator.current_view(Utc::now());
                    tracing::info!(
                        hazard = %hazard,
                        records = view.records.len(),
                        phase = ?view.phase,
                        "view updated"
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                break;
            }
        }
    }
    Ok(())
}
