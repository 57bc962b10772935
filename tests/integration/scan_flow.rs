//! Full region scans: provider → detector → progress stream → cache → query.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

use arbscan::cache::{ScanCache, ScanQuery};
use arbscan::config::{CacheConfig, ScannerConfig};
use arbscan::detector::{DetectorConfig, OpportunityDetector};
use arbscan::engine::RegionScanner;
use arbscan::progress::ScanProgressStream;
use arbscan::storage::{MemoryScanStore, ScanStore, SqliteScanStore};
use arbscan::types::*;

use crate::mock_provider::{epl_arb, epl_value, nba_middle, MockProvider};

struct Harness {
    scanner: RegionScanner,
    cache: ScanCache,
    progress: ScanProgressStream,
    provider: Arc<MockProvider>,
}

fn scanner_config() -> ScannerConfig {
    ScannerConfig {
        name: "integration".to_string(),
        scan_interval_secs: 60,
        sports: vec!["soccer_epl".to_string(), "basketball_nba".to_string()],
        sports_per_batch: 1,
        scan_budget_secs: 10,
    }
}

fn harness(store: Arc<dyn ScanStore>, provider: MockProvider) -> Harness {
    let provider = Arc::new(provider);
    let cache = ScanCache::new(store.clone(), &CacheConfig::default());
    let progress = ScanProgressStream::new(store);
    let scanner = RegionScanner::new(
        provider.clone(),
        Arc::new(OpportunityDetector::new(DetectorConfig::default())),
        cache.clone(),
        progress.clone(),
        &scanner_config(),
    );
    Harness {
        scanner,
        cache,
        progress,
        provider,
    }
}

fn au_provider() -> MockProvider {
    MockProvider::new()
        .with_events(Region::Au, "soccer_epl", vec![epl_arb(), epl_value()])
        .with_events(Region::Au, "basketball_nba", vec![nba_middle()])
}

#[tokio::test]
async fn test_full_region_scan() {
    let h = harness(Arc::new(MemoryScanStore::new()), au_provider());

    let summary = h.scanner.scan_region(Region::Au).await;
    assert!(summary.stored);
    assert!(!summary.timed_out);
    assert_eq!(summary.data.stats.sports_scanned, 2);
    assert!(!summary.data.stats.is_partial());
    assert!(!summary.data.line_stats.is_partial());

    let merged = assert_ok!(h.cache.get_merged_scan(h.cache.max_age_secs()).await);
    assert!(merged.region_ages[&Region::Au].is_some());

    // Scenario A: equal returns from a $100 split.
    let arb = merged
        .results
        .opportunities
        .iter()
        .find(|o| o.event.id == "epl-arb")
        .expect("epl arb detected");
    assert_eq!(arb.kind, ArbKind::Arb);
    assert!((arb.profit_percentage - 3.73).abs() < 0.01);
    assert!((arb.legs[0].stake - 49.40).abs() < 0.01);
    assert!((arb.legs[1].stake - 50.60).abs() < 0.01);
    for leg in &arb.legs {
        assert!((leg.payout() - 103.73).abs() < 0.05);
    }

    let value = &merged.results.value_bets;
    assert_eq!(value.len(), 1);
    assert_eq!(value[0].bookmaker, "ladbrokes");
    assert_eq!(value[0].outcome, "Liverpool");
    assert!(value[0].edge_percentage > 3.0);

    // Scenario B: both legs win inside (215.5, 220.5).
    assert_eq!(merged.results.middles.len(), 1);
    let middle = &merged.results.middles[0];
    assert_eq!(middle.middle_range, MiddleRange { low: 215.5, high: 220.5 });
    assert!(middle.settle(218.0) > 0.0);
    for outside in [210.0, 225.0] {
        let loss = middle.settle(outside);
        assert!(loss < 0.0);
        assert!(loss > -middle.total_stake * 0.05);
    }
    assert_eq!(merged.line_stats.middles_found, 1);
}

#[tokio::test]
async fn test_progress_stream_follows_scan() {
    let h = harness(Arc::new(MemoryScanStore::new()), au_provider());
    let summary = h.scanner.scan_region(Region::Au).await;

    let batches = assert_ok!(h.progress.since(summary.scan_id, None).await);
    assert_eq!(batches.len(), 5);
    assert!(batches.windows(2).all(|w| w[0].phase <= w[1].phase));
    assert!(batches.windows(2).all(|w| w[0].results.len() <= w[1].results.len()));
    assert_eq!(batches[0].sport_keys, vec!["soccer_epl".to_string()]);

    let last = assert_ok!(h.progress.latest(summary.scan_id).await).expect("final batch");
    assert!(last.is_last_batch);
    assert_eq!(last.results, summary.data.results);

    // Markets requested per phase.
    let calls = h.provider.calls();
    assert_eq!(calls.len(), 4);
    assert!(calls[..2].iter().all(|c| c.markets == vec![MarketKind::H2h, MarketKind::H2hLay]));
    assert!(calls[2..].iter().all(|c| c.markets == vec![MarketKind::Spreads, MarketKind::Totals]));
}

#[tokio::test]
async fn test_query_filters_merged_scan() {
    let h = harness(Arc::new(MemoryScanStore::new()), au_provider());
    h.scanner.scan_region(Region::Au).await;
    let merged = assert_ok!(h.cache.get_merged_scan(h.cache.max_age_secs()).await);

    let query = ScanQuery {
        middles: false,
        value_bets: false,
        min_profit: Some(3.0),
        ..Default::default()
    };
    let response = query.apply(merged, Utc::now());
    assert!(response.middles.is_empty());
    assert!(response.value_bets.is_empty());
    assert_eq!(response.opportunities.len(), 1);
    assert_eq!(response.opportunities[0].event.id, "epl-arb");

    let json = assert_ok!(serde_json::to_value(&response));
    assert!(json.get("regionAges").is_some());
    assert!(json.get("remainingCredits").is_some());
}

#[tokio::test]
async fn test_budget_exhaustion_publishes_partial_scan() {
    let provider = au_provider().with_slow_sport("basketball_nba");
    let h = harness(Arc::new(MemoryScanStore::new()), provider);
    let scanner = h.scanner.with_budget(Duration::from_millis(300));

    let summary = scanner.scan_region(Region::Au).await;
    assert!(summary.timed_out);
    assert!(summary.stored);
    assert_eq!(summary.data.stats.sports_scanned, 1);
    assert_eq!(summary.data.stats.sports_total, 2);
    assert!(summary.data.stats.is_partial());
    assert!(summary.data.results.middles.is_empty());

    let last = assert_ok!(h.progress.latest(summary.scan_id).await).expect("final batch");
    assert!(last.is_last_batch);
    assert!(last.stats.is_partial());
}

#[tokio::test]
async fn test_provider_outage_keeps_previous_bucket() {
    let h = harness(Arc::new(MemoryScanStore::new()), au_provider());
    let first = h.scanner.scan_region(Region::Au).await;
    assert!(first.stored);

    h.provider.set_error("upstream 503");
    let second = h.scanner.scan_region(Region::Au).await;
    assert!(!second.stored);

    let merged = assert_ok!(h.cache.get_merged_scan(h.cache.max_age_secs()).await);
    assert_eq!(merged.scanned_at, Some(first.data.scanned_at));
    assert_eq!(merged.results.len(), first.data.results.len());

    h.provider.clear_error();
    let third = h.scanner.scan_region(Region::Au).await;
    assert!(third.stored);
}

#[tokio::test]
async fn test_cycle_with_sqlite_store() {
    let store = assert_ok!(SqliteScanStore::connect("sqlite::memory:").await);
    let provider = au_provider().with_events(Region::Uk, "soccer_epl", vec![epl_arb()]);
    let h = harness(Arc::new(store), provider);

    let summaries = h.scanner.run_cycle().await;
    let regions: Vec<Region> = summaries.iter().map(|s| s.region).collect();
    assert_eq!(regions, vec![Region::Au, Region::Uk]);
    assert!(summaries.iter().all(|s| s.stored));

    // The same arb seen from AU and UK collapses to one entry.
    let merged = assert_ok!(h.cache.get_merged_scan(h.cache.max_age_secs()).await);
    let epl: Vec<_> = merged
        .results
        .opportunities
        .iter()
        .filter(|o| o.event.id == "epl-arb")
        .collect();
    assert_eq!(epl.len(), 1);
    assert!(merged.region_ages[&Region::Uk].is_some());
    assert!(merged.region_ages[&Region::Us].is_none());

    let next = h.scanner.run_cycle().await;
    assert_eq!(next[1].region, Region::Us);
}
