//! SQLite-backed store shared by every scanner and API process.
//!
//! Documents are stored as validated JSON payloads; timestamps as epoch
//! milliseconds so TTL checks are plain integer comparisons.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::{info, warn};
use uuid::Uuid;

use super::ScanStore;
use crate::types::{Region, RegionScanData, ScanProgressBatch};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS region_scans (
    region TEXT PRIMARY KEY,
    payload_json TEXT NOT NULL,
    scanned_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Singleton row; the counter only ever moves through one upsert.
CREATE TABLE IF NOT EXISTS rotation_counter (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    value INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS progress_batches (
    scan_id TEXT NOT NULL,
    batch_index INTEGER NOT NULL,
    region TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (scan_id, batch_index)
);

CREATE INDEX IF NOT EXISTS idx_progress_region
    ON progress_batches(region, scan_id);

CREATE INDEX IF NOT EXISTS idx_progress_created
    ON progress_batches(created_at);
"#;

/// `ScanStore` over a SQLite connection pool.
pub struct SqliteScanStore {
    pool: SqlitePool,
}

impl SqliteScanStore {
    /// Open (creating if needed) the database at `url` and apply the schema.
    ///
    /// `sqlite::memory:` databases are private to a connection, so they get a
    /// single connection that is never recycled.
    pub async fn connect(url: &str) -> Result<Self> {
        let in_memory = url.contains(":memory:");
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database URL {url}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let mut pool_options = SqlitePoolOptions::new();
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(8)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database at {url}"))?;

        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&pool)
            .await
            .context("Failed to initialise database schema")?;

        info!(url, "Scan store ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl ScanStore for SqliteScanStore {
    async fn put_region_scan(&self, region: Region, data: &RegionScanData) -> Result<()> {
        let payload = serde_json::to_string(data).context("Failed to serialise region scan")?;
        sqlx::query(
            "INSERT INTO region_scans (region, payload_json, scanned_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(region) DO UPDATE SET
                payload_json = excluded.payload_json,
                scanned_at = excluded.scanned_at,
                updated_at = excluded.updated_at",
        )
        .bind(region.as_str())
        .bind(payload)
        .bind(data.scanned_at.timestamp_millis())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to write {region} scan"))?;
        Ok(())
    }

    async fn region_scans(&self) -> Result<Vec<(Region, RegionScanData)>> {
        let rows = sqlx::query("SELECT region, payload_json FROM region_scans")
            .fetch_all(&self.pool)
            .await
            .context("Failed to read region scans")?;

        let mut scans = Vec::with_capacity(rows.len());
        for row in rows {
            let code: String = row.try_get("region")?;
            let payload: String = row.try_get("payload_json")?;
            let region = match code.parse::<Region>() {
                Ok(r) => r,
                Err(e) => {
                    warn!(region = %code, error = %e, "Ignoring unknown region row");
                    continue;
                }
            };
            // One corrupt document must not hide the other regions.
            match serde_json::from_str::<RegionScanData>(&payload) {
                Ok(data) => scans.push((region, data)),
                Err(e) => warn!(region = %region, error = %e, "Ignoring invalid region scan document"),
            }
        }
        scans.sort_by_key(|(r, _)| *r);
        Ok(scans)
    }

    async fn next_rotation(&self) -> Result<u64> {
        let previous: i64 = sqlx::query_scalar(
            "INSERT INTO rotation_counter (id, value) VALUES (1, 1)
             ON CONFLICT(id) DO UPDATE SET value = value + 1
             RETURNING value - 1",
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to advance rotation counter")?;
        Ok(previous.max(0) as u64)
    }

    async fn append_batch(&self, batch: &ScanProgressBatch) -> Result<()> {
        let payload = serde_json::to_string(batch).context("Failed to serialise progress batch")?;
        sqlx::query(
            "INSERT INTO progress_batches (scan_id, batch_index, region, payload_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(batch.scan_id.to_string())
        .bind(i64::from(batch.batch_index))
        .bind(batch.region.as_str())
        .bind(payload)
        .bind(batch.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to append batch {} of scan {}", batch.batch_index, batch.scan_id))?;
        Ok(())
    }

    async fn drop_other_scans(&self, region: Region, keep: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM progress_batches WHERE region = ?1 AND scan_id != ?2")
            .bind(region.as_str())
            .bind(keep.to_string())
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to clear old {region} scans"))?;
        Ok(result.rows_affected())
    }

    async fn batches(
        &self,
        scan_id: Uuid,
        after: Option<u32>,
        since: DateTime<Utc>,
    ) -> Result<Vec<ScanProgressBatch>> {
        let rows = sqlx::query(
            "SELECT payload_json FROM progress_batches
             WHERE scan_id = ?1 AND batch_index > ?2 AND created_at >= ?3
             ORDER BY batch_index",
        )
        .bind(scan_id.to_string())
        .bind(after.map_or(-1, i64::from))
        .bind(since.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to read batches of scan {scan_id}"))?;

        rows.iter()
            .map(|row| -> Result<ScanProgressBatch> {
                let payload: String = row.try_get("payload_json")?;
                serde_json::from_str(&payload).context("Invalid progress batch document")
            })
            .collect()
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM progress_batches WHERE created_at < ?1")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await
            .context("Failed to purge expired batches")?;
        Ok(result.rows_affected())
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::tests::{batch, region_data};
    use chrono::Duration;

    async fn store() -> SqliteScanStore {
        SqliteScanStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_region_upsert_overwrites() {
        let store = store().await;
        let now = Utc::now();
        store.put_region_scan(Region::Eu, &region_data(now, 1)).await.unwrap();
        store.put_region_scan(Region::Au, &region_data(now, 2)).await.unwrap();
        store.put_region_scan(Region::Eu, &region_data(now, 7)).await.unwrap();

        let scans = store.region_scans().await.unwrap();
        assert_eq!(scans.len(), 2);
        assert_eq!(scans[0].0, Region::Au);
        assert_eq!(scans[1].0, Region::Eu);
        assert_eq!(scans[1].1.stats.arbs_found, 7);
        assert_eq!(scans[1].1.remaining_credits, Some(480));
    }

    #[tokio::test]
    async fn test_invalid_document_is_skipped() {
        let store = store().await;
        store
            .put_region_scan(Region::Au, &region_data(Utc::now(), 1))
            .await
            .unwrap();
        sqlx::query("INSERT INTO region_scans VALUES ('uk', '{\"results\": 5}', 0, 0)")
            .execute(&store.pool)
            .await
            .unwrap();

        let scans = store.region_scans().await.unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].0, Region::Au);
    }

    #[tokio::test]
    async fn test_rotation_counter_sequence() {
        let store = store().await;
        let values = [
            store.next_rotation().await.unwrap(),
            store.next_rotation().await.unwrap(),
            store.next_rotation().await.unwrap(),
        ];
        assert_eq!(values, [0, 1, 2]);
    }

    #[tokio::test]
    async fn test_batches_roundtrip_and_ttl() {
        let store = store().await;
        let now = Utc::now();
        let scan = Uuid::new_v4();
        let stale = Uuid::new_v4();

        store
            .append_batch(&batch(stale, Region::Au, 0, now - Duration::minutes(10)))
            .await
            .unwrap();
        for i in 0..3 {
            store.append_batch(&batch(scan, Region::Au, i, now)).await.unwrap();
        }
        // Batches are immutable: re-appending an index fails.
        assert!(store.append_batch(&batch(scan, Region::Au, 1, now)).await.is_err());

        let after = store.batches(scan, Some(1), now - Duration::minutes(5)).await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].batch_index, 2);
        assert_eq!(after[0].scan_id, scan);

        let purged = store.purge_expired(now - Duration::minutes(5)).await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.drop_other_scans(Region::Au, scan).await.unwrap(), 0);
    }
}
