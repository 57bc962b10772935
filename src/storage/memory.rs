//! In-process store.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::ScanStore;
use crate::types::{Region, RegionScanData, ScanProgressBatch};

/// Region buckets and progress batches held behind async locks; the rotation
/// counter is a lock-free atomic.
#[derive(Default)]
pub struct MemoryScanStore {
    regions: RwLock<BTreeMap<Region, RegionScanData>>,
    rotation: AtomicU64,
    batches: RwLock<Vec<ScanProgressBatch>>,
}

impl MemoryScanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScanStore for MemoryScanStore {
    async fn put_region_scan(&self, region: Region, data: &RegionScanData) -> Result<()> {
        self.regions.write().await.insert(region, data.clone());
        Ok(())
    }

    async fn region_scans(&self) -> Result<Vec<(Region, RegionScanData)>> {
        let regions = self.regions.read().await;
        Ok(regions.iter().map(|(r, d)| (*r, d.clone())).collect())
    }

    async fn next_rotation(&self) -> Result<u64> {
        Ok(self.rotation.fetch_add(1, Ordering::SeqCst))
    }

    async fn append_batch(&self, batch: &ScanProgressBatch) -> Result<()> {
        let mut batches = self.batches.write().await;
        if batches
            .iter()
            .any(|b| b.scan_id == batch.scan_id && b.batch_index == batch.batch_index)
        {
            anyhow::bail!("Batch {} of scan {} already exists", batch.batch_index, batch.scan_id);
        }
        batches.push(batch.clone());
        Ok(())
    }

    async fn drop_other_scans(&self, region: Region, keep: Uuid) -> Result<u64> {
        let mut batches = self.batches.write().await;
        let before = batches.len();
        batches.retain(|b| b.region != region || b.scan_id == keep);
        Ok((before - batches.len()) as u64)
    }

    async fn batches(
        &self,
        scan_id: Uuid,
        after: Option<u32>,
        since: DateTime<Utc>,
    ) -> Result<Vec<ScanProgressBatch>> {
        let batches = self.batches.read().await;
        let mut found: Vec<ScanProgressBatch> = batches
            .iter()
            .filter(|b| b.scan_id == scan_id && b.created_at >= since)
            .filter(|b| after.map_or(true, |a| b.batch_index > a))
            .cloned()
            .collect();
        found.sort_by_key(|b| b.batch_index);
        Ok(found)
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut batches = self.batches.write().await;
        let before = batches.len();
        batches.retain(|b| b.created_at >= cutoff);
        Ok((before - batches.len()) as u64)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{LineStats, ScanPhase, ScanResults, ScanStats};
    use chrono::Duration;
    use std::sync::Arc;

    pub fn region_data(scanned_at: DateTime<Utc>, arbs: u64) -> RegionScanData {
        RegionScanData {
            results: ScanResults::default(),
            stats: ScanStats {
                arbs_found: arbs,
                ..Default::default()
            },
            line_stats: LineStats::default(),
            scanned_at,
            scan_duration_ms: 1200,
            remaining_credits: Some(480),
        }
    }

    pub fn batch(scan_id: Uuid, region: Region, index: u32, created_at: DateTime<Utc>) -> ScanProgressBatch {
        ScanProgressBatch {
            scan_id,
            region,
            batch_index: index,
            sport_keys: vec!["basketball_nba".to_string()],
            results: ScanResults::default(),
            stats: ScanStats::default(),
            line_stats: LineStats::default(),
            phase: ScanPhase::H2h,
            is_last_batch: false,
            created_at,
        }
    }

    #[tokio::test]
    async fn test_region_overwrite_is_isolated() {
        let store = MemoryScanStore::new();
        let now = Utc::now();
        store.put_region_scan(Region::Au, &region_data(now, 1)).await.unwrap();
        store.put_region_scan(Region::Uk, &region_data(now, 2)).await.unwrap();
        store.put_region_scan(Region::Au, &region_data(now, 5)).await.unwrap();

        let scans = store.region_scans().await.unwrap();
        assert_eq!(scans.len(), 2);
        assert_eq!(scans[0].0, Region::Au);
        assert_eq!(scans[0].1.stats.arbs_found, 5);
        assert_eq!(scans[1].1.stats.arbs_found, 2);
    }

    #[tokio::test]
    async fn test_rotation_returns_previous_value() {
        let store = Arc::new(MemoryScanStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.next_rotation().await.unwrap() }));
        }
        let mut seen = Vec::new();
        for h in handles {
            seen.push(h.await.unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..32).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_batches_filtering_and_cleanup() {
        let store = MemoryScanStore::new();
        let now = Utc::now();
        let old_scan = Uuid::new_v4();
        let scan = Uuid::new_v4();
        let other_region = Uuid::new_v4();

        store.append_batch(&batch(old_scan, Region::Uk, 0, now)).await.unwrap();
        store.append_batch(&batch(other_region, Region::Us, 0, now)).await.unwrap();
        for i in 0..3 {
            store.append_batch(&batch(scan, Region::Uk, i, now)).await.unwrap();
        }

        // Batches are immutable: re-appending an index fails and keeps the original.
        let mut rewrite = batch(scan, Region::Uk, 1, now);
        rewrite.is_last_batch = true;
        assert!(store.append_batch(&rewrite).await.is_err());
        assert!(!store.batches(scan, Some(0), now).await.unwrap()[0].is_last_batch);

        let removed = store.drop_other_scans(Region::Uk, scan).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.batches(other_region, None, now).await.unwrap().len(), 1);

        let after = store.batches(scan, Some(0), now).await.unwrap();
        assert_eq!(after.iter().map(|b| b.batch_index).collect::<Vec<_>>(), vec![1, 2]);

        // Not yet purged but already past the visibility window.
        let hidden = store
            .batches(scan, None, now + Duration::seconds(1))
            .await
            .unwrap();
        assert!(hidden.is_empty());

        let purged = store.purge_expired(now + Duration::seconds(1)).await.unwrap();
        assert_eq!(purged, 4);
    }
}
