//! Odds provider seam.
//!
//! The network client for the upstream odds feed lives outside this crate;
//! the scanner only sees normalised events through [`OddsProvider`]. A
//! file-backed [`SnapshotProvider`] lets the binary run from saved odds.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

use crate::types::{Event, MarketKind, Region};

/// Request accounting reported by the upstream feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMeta {
    pub source: String,
    pub remaining_requests: Option<u64>,
    pub used_requests: Option<u64>,
}

/// One provider call's worth of events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OddsResponse {
    pub events: Vec<Event>,
    pub meta: ProviderMeta,
}

/// Supplier of normalised odds.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OddsProvider: Send + Sync {
    /// Fetch events for `sport_keys` in `region`, carrying quotes for the
    /// requested market kinds only.
    async fn fetch_odds(
        &self,
        sport_keys: &[String],
        markets: &[MarketKind],
        region: Region,
    ) -> Result<OddsResponse>;
}

/// Reads `<dir>/<region>/<sport_key>.json`, each a JSON array of events.
pub struct SnapshotProvider {
    dir: PathBuf,
}

impl SnapshotProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, region: Region, sport_key: &str) -> PathBuf {
        self.dir.join(region.as_str()).join(format!("{sport_key}.json"))
    }
}

#[async_trait]
impl OddsProvider for SnapshotProvider {
    async fn fetch_odds(
        &self,
        sport_keys: &[String],
        markets: &[MarketKind],
        region: Region,
    ) -> Result<OddsResponse> {
        let mut events = Vec::new();

        for sport_key in sport_keys {
            let path = self.path_for(region, sport_key);
            let json = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
            let mut sport_events: Vec<Event> = serde_json::from_str(&json)
                .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;

            for event in &mut sport_events {
                event.bookmakers.retain(|q| markets.contains(&q.market));
            }
            debug!(
                region = %region,
                sport = %sport_key,
                events = sport_events.len(),
                "Snapshot loaded"
            );
            events.extend(sport_events);
        }

        Ok(OddsResponse {
            events,
            meta: ProviderMeta {
                source: "snapshot".to_string(),
                remaining_requests: None,
                used_requests: None,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
