//! Scan progress stream.
//!
//! A scan publishes one immutable batch per sport group. Each batch carries
//! the cumulative results and running stats, so the newest batch alone is
//! the full in-progress picture. Batches expire after [`PROGRESS_TTL_SECS`].

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::storage::ScanStore;
use crate::types::{
    LineStats, Region, ScanError, ScanPhase, ScanProgressBatch, ScanResults, ScanStats,
};

/// Batches older than this are invisible to readers and purged.
pub const PROGRESS_TTL_SECS: i64 = 300;

/// Entry point for writers (`begin`) and readers (`latest`, `since`).
#[derive(Clone)]
pub struct ScanProgressStream {
    store: Arc<dyn ScanStore>,
    ttl: Duration,
}

impl ScanProgressStream {
    pub fn new(store: Arc<dyn ScanStore>) -> Self {
        Self {
            store,
            ttl: Duration::seconds(PROGRESS_TTL_SECS),
        }
    }

    /// Start a new scan for `region` covering `sports_total` sports and drop
    /// batches of any earlier scan of that region. Cleanup failures are
    /// logged and do not block the scan.
    pub async fn begin(&self, region: Region, sports_total: u64) -> ProgressRecorder {
        let scan_id = Uuid::new_v4();
        match self.store.drop_other_scans(region, scan_id).await {
            Ok(removed) if removed > 0 => {
                debug!(region = %region, removed, "Cleared batches of previous scans");
            }
            Ok(_) => {}
            Err(e) => warn!(region = %region, error = %e, "Failed to clear previous scan batches"),
        }
        if let Err(e) = self.store.purge_expired(Utc::now() - self.ttl).await {
            warn!(error = %e, "Failed to purge expired batches");
        }

        info!(region = %region, scan_id = %scan_id, sports_total, "Scan started");
        ProgressRecorder {
            store: self.store.clone(),
            scan_id,
            region,
            next_index: 0,
            phase: ScanPhase::H2h,
            finished: false,
            results: ScanResults::default(),
            stats: ScanStats {
                sports_total,
                ..Default::default()
            },
            line_stats: LineStats {
                sports_total,
                ..Default::default()
            },
        }
    }

    /// Newest visible batch of a scan.
    pub async fn latest(&self, scan_id: Uuid) -> Result<Option<ScanProgressBatch>> {
        Ok(self.since(scan_id, None).await?.pop())
    }

    /// Visible batches of a scan with `batch_index > after`, in order.
    pub async fn since(&self, scan_id: Uuid, after: Option<u32>) -> Result<Vec<ScanProgressBatch>> {
        self.since_at(scan_id, after, Utc::now()).await
    }

    async fn since_at(
        &self,
        scan_id: Uuid,
        after: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScanProgressBatch>> {
        self.store.batches(scan_id, after, now - self.ttl).await
    }
}

/// Writer side of one scan.
pub struct ProgressRecorder {
    store: Arc<dyn ScanStore>,
    scan_id: Uuid,
    region: Region,
    next_index: u32,
    phase: ScanPhase,
    finished: bool,
    results: ScanResults,
    stats: ScanStats,
    line_stats: LineStats,
}

impl ProgressRecorder {
    pub fn scan_id(&self) -> Uuid {
        self.scan_id
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    /// Running results so far.
    pub fn results(&self) -> &ScanResults {
        &self.results
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    pub fn line_stats(&self) -> &LineStats {
        &self.line_stats
    }

    /// Move to `phase` before its first group completes, so the phase counts
    /// as started even if none of its groups are recorded.
    pub fn start_phase(&mut self, phase: ScanPhase) -> Result<(), ScanError> {
        self.advance(phase)
    }

    /// Fold one sport group's output into the running totals and publish a
    /// batch. Running totals advance even when the write fails.
    pub async fn record(
        &mut self,
        phase: ScanPhase,
        sport_keys: Vec<String>,
        results: ScanResults,
        stats: &ScanStats,
        line_stats: &LineStats,
    ) -> Result<(), ScanError> {
        self.advance(phase)?;
        self.results.extend(results);
        self.stats.accumulate(stats);
        self.line_stats.accumulate(line_stats);
        self.publish(sport_keys, false).await;
        Ok(())
    }

    /// Publish the final batch. Nothing may be recorded afterwards.
    ///
    /// Once the lines phase has started, a sport only counts as scanned in
    /// the final stats if it was fetched in both phases.
    pub async fn finish(&mut self) -> Result<(), ScanError> {
        let lines_started = self.phase >= ScanPhase::Lines;
        self.advance(ScanPhase::Complete)?;
        if lines_started {
            self.stats.sports_scanned = self.stats.sports_scanned.min(self.line_stats.sports_scanned);
        }
        self.publish(Vec::new(), true).await;
        self.finished = true;
        info!(
            region = %self.region,
            scan_id = %self.scan_id,
            batches = self.next_index,
            opportunities = self.results.len(),
            "Scan complete"
        );
        Ok(())
    }

    fn advance(&mut self, phase: ScanPhase) -> Result<(), ScanError> {
        if self.finished {
            return Err(ScanError::ScanFinished(self.scan_id));
        }
        if phase < self.phase {
            return Err(ScanError::PhaseRegression {
                from: self.phase,
                to: phase,
            });
        }
        self.phase = phase;
        Ok(())
    }

    async fn publish(&mut self, sport_keys: Vec<String>, is_last_batch: bool) {
        let batch = ScanProgressBatch {
            scan_id: self.scan_id,
            region: self.region,
            batch_index: self.next_index,
            sport_keys,
            results: self.results.clone(),
            stats: self.stats.clone(),
            line_stats: self.line_stats.clone(),
            phase: self.phase,
            is_last_batch,
            created_at: Utc::now(),
        };
        self.next_index += 1;

        if let Err(e) = self.store.append_batch(&batch).await {
            warn!(
                region = %self.region,
                scan_id = %self.scan_id,
                batch_index = batch.batch_index,
                error = %e,
                "Failed to publish progress batch"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
