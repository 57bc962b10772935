//! Region-partitioned scan cache.
//!
//! One bucket per region, each overwritten wholesale by that region's latest
//! completed scan, plus a rotation counter deciding which non-default region
//! is scanned next. Reads merge every fresh bucket.

pub mod merge;
pub mod query;

pub use merge::{MergedScan, OpportunityKey};
pub use query::{QueryResponse, ScanQuery};

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::storage::ScanStore;
use crate::types::{Region, RegionScanData};

/// Shared scan cache over a `ScanStore`.
#[derive(Clone)]
pub struct ScanCache {
    store: Arc<dyn ScanStore>,
    default_region: Region,
    rotation: Vec<Region>,
    max_age_secs: i64,
}

impl ScanCache {
    pub fn new(store: Arc<dyn ScanStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            default_region: config.default_region,
            rotation: config.rotation.clone(),
            max_age_secs: config.max_age_secs,
        }
    }

    pub fn store(&self) -> Arc<dyn ScanStore> {
        self.store.clone()
    }

    /// Region scanned on every cycle.
    pub fn default_region(&self) -> Region {
        self.default_region
    }

    /// Configured freshness bound for merged reads.
    pub fn max_age_secs(&self) -> i64 {
        self.max_age_secs
    }

    /// Overwrite one region's bucket.
    pub async fn update_region_scan(&self, region: Region, data: &RegionScanData) -> Result<()> {
        self.store
            .put_region_scan(region, data)
            .await
            .with_context(|| format!("Failed to update {region} scan"))?;

        info!(
            region = %region,
            opportunities = data.results.len(),
            duration_ms = data.scan_duration_ms,
            remaining_credits = ?data.remaining_credits,
            "Region scan stored"
        );
        Ok(())
    }

    /// Merge every region scanned within `max_age_secs`.
    pub async fn get_merged_scan(&self, max_age_secs: i64) -> Result<MergedScan> {
        let scans = self.store.region_scans().await?;
        let merged = merge::merge_regions(scans, max_age_secs, Utc::now());

        debug!(
            opportunities = merged.results.len(),
            fresh_regions = merged.region_ages.values().filter(|a| a.is_some()).count(),
            "Merged scan"
        );
        Ok(merged)
    }

    /// Read-then-increment the rotation counter in one atomic step,
    /// returning the pre-increment value.
    pub async fn get_and_increment_rotation(&self) -> Result<u64> {
        self.store.next_rotation().await
    }

    /// Next non-default region to scan: `rotation[counter % len]`.
    pub async fn next_rotated_region(&self) -> Result<Region> {
        anyhow::ensure!(!self.rotation.is_empty(), "Rotation order is empty");
        let value = self.get_and_increment_rotation().await?;
        Ok(self.rotation[(value % self.rotation.len() as u64) as usize])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
