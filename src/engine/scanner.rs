//! Region scanner and scan cycle.
//!
//! A region scan walks the configured sports in groups: the moneyline
//! phase first, then spreads/totals, publishing a progress batch per group.
//! When the time budget runs out the scan stops fetching and publishes what
//! it has, with `sports_scanned < sports_total`.
//!
//! Each cycle scans the default region and the next rotated region
//! concurrently; one region failing never affects the other.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::provider::OddsProvider;
use crate::cache::ScanCache;
use crate::config::ScannerConfig;
use crate::detector::OpportunityDetector;
use crate::progress::{ProgressRecorder, ScanProgressStream};
use crate::types::{LineStats, MarketKind, Region, RegionScanData, ScanPhase, ScanStats};

/// Provider calls in flight at once within one region scan.
const FETCH_CONCURRENCY: usize = 2;

const H2H_MARKETS: &[MarketKind] = &[MarketKind::H2h, MarketKind::H2hLay];
const LINE_MARKETS: &[MarketKind] = &[MarketKind::Spreads, MarketKind::Totals];

/// Outcome of one region scan.
#[derive(Debug, Clone)]
pub struct RegionScanSummary {
    pub region: Region,
    pub scan_id: Uuid,
    pub data: RegionScanData,
    /// The budget ran out before every group was fetched.
    pub timed_out: bool,
    /// The region bucket was written.
    pub stored: bool,
}

/// Scans regions and publishes results to the cache and progress stream.
pub struct RegionScanner {
    provider: Arc<dyn OddsProvider>,
    detector: Arc<OpportunityDetector>,
    cache: ScanCache,
    progress: ScanProgressStream,
    sports: Vec<String>,
    sports_per_batch: usize,
    budget: Duration,
}

impl RegionScanner {
    pub fn new(
        provider: Arc<dyn OddsProvider>,
        detector: Arc<OpportunityDetector>,
        cache: ScanCache,
        progress: ScanProgressStream,
        config: &ScannerConfig,
    ) -> Self {
        Self {
            provider,
            detector,
            cache,
            progress,
            sports: config.sports.clone(),
            sports_per_batch: config.sports_per_batch.max(1),
            budget: Duration::from_secs(config.scan_budget_secs),
        }
    }

    /// Override the scan time budget.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Scan both the default region and the next rotated region.
    pub async fn run_cycle(&self) -> Vec<RegionScanSummary> {
        let default_region = self.cache.default_region();
        let rotated = match self.cache.next_rotated_region().await {
            Ok(region) => Some(region),
            Err(e) => {
                error!(error = %e, "Rotation lookup failed, scanning default region only");
                None
            }
        };

        match rotated {
            Some(region) if region != default_region => {
                let (a, b) = tokio::join!(self.scan_region(default_region), self.scan_region(region));
                vec![a, b]
            }
            _ => vec![self.scan_region(default_region).await],
        }
    }

    /// Scan one region end to end and store its bucket.
    pub async fn scan_region(&self, region: Region) -> RegionScanSummary {
        let started = Instant::now();
        let deadline = started + self.budget;
        let groups: Vec<Vec<String>> = self
            .sports
            .chunks(self.sports_per_batch)
            .map(|c| c.to_vec())
            .collect();

        let mut recorder = self.progress.begin(region, self.sports.len() as u64).await;
        let mut credits = None;

        let mut timed_out = self
            .run_phase(region, ScanPhase::H2h, &groups, deadline, &mut recorder, &mut credits)
            .await;
        if !timed_out {
            timed_out = self
                .run_phase(region, ScanPhase::Lines, &groups, deadline, &mut recorder, &mut credits)
                .await;
        }

        let fetched_any = recorder.stats().sports_scanned + recorder.line_stats().sports_scanned > 0;
        if let Err(e) = recorder.finish().await {
            warn!(region = %region, error = %e, "Could not close progress stream");
        }

        let data = RegionScanData {
            results: recorder.results().clone(),
            stats: recorder.stats().clone(),
            line_stats: recorder.line_stats().clone(),
            scanned_at: Utc::now(),
            scan_duration_ms: started.elapsed().as_millis() as u64,
            remaining_credits: credits,
        };

        // A scan that fetched nothing keeps the previous bucket, which ages out.
        let stored = if !fetched_any {
            warn!(region = %region, "No sports fetched, region bucket left unchanged");
            false
        } else {
            match self.cache.update_region_scan(region, &data).await {
                Ok(()) => true,
                Err(e) => {
                    error!(region = %region, error = %e, "Failed to store region scan");
                    false
                }
            }
        };

        info!(
            region = %region,
            stats = %data.stats,
            timed_out,
            duration_ms = data.scan_duration_ms,
            "Region scan finished"
        );

        RegionScanSummary {
            region,
            scan_id: recorder.scan_id(),
            data,
            timed_out,
            stored,
        }
    }

    /// Fetch and detect every group for one phase. Returns `true` when the
    /// budget expired first.
    async fn run_phase(
        &self,
        region: Region,
        phase: ScanPhase,
        groups: &[Vec<String>],
        deadline: Instant,
        recorder: &mut ProgressRecorder,
        credits: &mut Option<u64>,
    ) -> bool {
        let markets = match phase {
            ScanPhase::H2h => H2H_MARKETS,
            _ => LINE_MARKETS,
        };
        let provider = &self.provider;
        if let Err(e) = recorder.start_phase(phase) {
            warn!(region = %region, phase = %phase, error = %e, "Phase rejected by progress stream");
        }

        let mut fetches = std::pin::pin!(stream::iter(groups)
            .map(|group| async move { (group, provider.fetch_odds(group, markets, region).await) })
            .buffered(FETCH_CONCURRENCY));

        loop {
            let next = match tokio::time::timeout_at(deadline, fetches.next()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(region = %region, phase = %phase, "Scan budget exhausted");
                    return true;
                }
            };
            let Some((group, result)) = next else {
                return false;
            };

            let response = match result {
                Ok(r) => r,
                Err(e) => {
                    warn!(region = %region, phase = %phase, sports = ?group, error = %e, "Odds fetch failed");
                    continue;
                }
            };
            if let Some(remaining) = response.meta.remaining_requests {
                *credits = Some(remaining);
            }

            let recorded = match phase {
                ScanPhase::H2h => {
                    let scan = self.detector.detect_moneyline(&response.events);
                    let stats = ScanStats {
                        sports_scanned: group.len() as u64,
                        ..scan.stats
                    };
                    recorder
                        .record(phase, group.clone(), scan.results, &stats, &LineStats::default())
                        .await
                }
                _ => {
                    let scan = self.detector.detect_lines(&response.events);
                    let line_stats = LineStats {
                        sports_scanned: group.len() as u64,
                        ..scan.stats
                    };
                    recorder
                        .record(phase, group.clone(), scan.results, &ScanStats::default(), &line_stats)
                        .await
                }
            };
            if let Err(e) = recorded {
                warn!(region = %region, error = %e, "Progress batch rejected");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
