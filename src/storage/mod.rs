//! Persistence layer.
//!
//! Defines the `ScanStore` trait behind the scan cache and progress stream,
//! with two implementations:
//! - `MemoryScanStore`: single long-running process
//! - `SqliteScanStore`: shared SQLite file for multi-process deployments
//!
//! Every mutation is one atomic operation: a lock-scoped insert or
//! `fetch_add` in memory, a single upsert or `RETURNING` statement in SQLite.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryScanStore;
pub use sqlite::SqliteScanStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::{Region, RegionScanData, ScanProgressBatch};

/// Storage seam for region buckets, the rotation counter and progress batches.
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Overwrite one region's bucket. Other regions are untouched.
    async fn put_region_scan(&self, region: Region, data: &RegionScanData) -> Result<()>;

    /// Every region bucket currently stored, in region order.
    async fn region_scans(&self) -> Result<Vec<(Region, RegionScanData)>>;

    /// Increment the rotation counter and return its previous value.
    async fn next_rotation(&self) -> Result<u64>;

    /// Append an immutable progress batch. Fails if `(scan_id, batch_index)`
    /// is already present.
    async fn append_batch(&self, batch: &ScanProgressBatch) -> Result<()>;

    /// Delete every batch for `region` not belonging to `keep`. Returns the
    /// number of batches removed.
    async fn drop_other_scans(&self, region: Region, keep: Uuid) -> Result<u64>;

    /// Batches for a scan created at or after `since`, ordered by index,
    /// optionally only those with `batch_index > after`.
    async fn batches(
        &self,
        scan_id: Uuid,
        after: Option<u32>,
        since: DateTime<Utc>,
    ) -> Result<Vec<ScanProgressBatch>>;

    /// Remove batches created before `cutoff`. Returns the number removed.
    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Store name for logging.
    fn name(&self) -> &str;
}
