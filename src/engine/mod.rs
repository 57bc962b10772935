//! Scan engine: the odds provider seam and the region scanner.

pub mod provider;
pub mod scanner;

pub use provider::{OddsProvider, OddsResponse, ProviderMeta, SnapshotProvider};
pub use scanner::{RegionScanSummary, RegionScanner};
