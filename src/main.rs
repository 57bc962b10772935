//! ARBSCAN: multi-region sports betting arbitrage scanner.
//!
//! Entry point. Loads configuration, initialises structured logging, opens
//! the shared store, starts the API and runs the scan cycle on an interval
//! with graceful shutdown.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use arbscan::api::{self, ApiState};
use arbscan::cache::ScanCache;
use arbscan::config;
use arbscan::detector::OpportunityDetector;
use arbscan::engine::{RegionScanSummary, RegionScanner, SnapshotProvider};
use arbscan::progress::ScanProgressStream;
use arbscan::storage::{MemoryScanStore, ScanStore, SqliteScanStore};

const BANNER: &str = r#"
    _    ____  ____  ____   ____    _    _   _
   / \  |  _ \| __ )/ ___| / ___|  / \  | \ | |
  / _ \ | |_) |  _ \\___ \| |     / _ \ |  \| |
 / ___ \|  _ <| |_) |___) | |___ / ___ \| |\  |
/_/   \_\_| \_\____/|____/ \____/_/   \_\_| \_|

  Multi-region arbitrage, value and middle scanner
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;
    init_logging();
    cfg.validate().context("Invalid configuration")?;

    println!("{BANNER}");
    info!(
        scanner = %cfg.scanner.name,
        scan_interval_secs = cfg.scanner.scan_interval_secs,
        sports = cfg.scanner.sports.len(),
        default_region = %cfg.cache.default_region,
        "ARBSCAN starting up"
    );

    // -- Initialise components -------------------------------------------

    let store: Arc<dyn ScanStore> = match cfg.cache.database_url.as_deref() {
        Some(url) => Arc::new(SqliteScanStore::connect(url).await?),
        None => {
            warn!("No database_url configured, results live in memory only");
            Arc::new(MemoryScanStore::new())
        }
    };
    info!(store = store.name(), "Scan store ready");

    let cache = ScanCache::new(store.clone(), &cfg.cache);
    let progress = ScanProgressStream::new(store);
    let detector = Arc::new(OpportunityDetector::new(cfg.detector_config()));
    let provider = Arc::new(SnapshotProvider::new(&cfg.provider.snapshot_dir));

    let scanner = RegionScanner::new(
        provider,
        detector,
        cache.clone(),
        progress.clone(),
        &cfg.scanner,
    );

    if cfg.api.enabled {
        let state = Arc::new(ApiState::new(cache.clone(), progress.clone()));
        api::spawn_api(state, cfg.api.port).await?;
    }

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.scanner.scan_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.scanner.scan_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    let mut cycle: u64 = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                cycle += 1;
                let summaries = scanner.run_cycle().await;
                log_cycle_report(cycle, &summaries);
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!(cycles = cycle, "ARBSCAN shut down cleanly.");
    Ok(())
}

/// Log a one-line summary per scanned region.
fn log_cycle_report(cycle: u64, summaries: &[RegionScanSummary]) {
    for s in summaries {
        let best = s
            .data
            .results
            .opportunities
            .iter()
            .map(|o| o.profit_percentage)
            .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.max(p))));
        info!(
            cycle,
            region = %s.region,
            scan_id = %s.scan_id,
            opportunities = s.data.results.len(),
            arbs = s.data.stats.arbs_found,
            value_bets = s.data.stats.value_bets_found,
            middles = s.data.line_stats.middles_found,
            best_profit = ?best,
            stored = s.stored,
            timed_out = s.timed_out,
            "Cycle complete"
        );
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("arbscan=info"));

    let json_logging = std::env::var("ARBSCAN_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
