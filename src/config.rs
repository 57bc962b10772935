//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Invalid thresholds are rejected by [`AppConfig::validate`] before the
//! scanner starts.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::detector::DetectorConfig;
use crate::types::{Region, ScanError};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    pub detector: DetectorSettings,
    #[serde(default)]
    pub cache: CacheConfig,
    pub api: ApiConfig,
    pub provider: ProviderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    pub name: String,
    pub scan_interval_secs: u64,
    /// Sport keys scanned in every region.
    pub sports: Vec<String>,
    /// Sports fetched per provider call (one progress batch each).
    pub sports_per_batch: usize,
    /// Wall-clock budget for one region scan.
    pub scan_budget_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectorSettings {
    pub near_arb_threshold: f64,
    pub value_threshold: f64,
    pub min_consensus_books: usize,
    #[serde(default)]
    pub exchange_key: Option<String>,
    pub exchange_commission: f64,
    pub total_stake: f64,
    pub middle_max_loss_pct: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub max_age_secs: i64,
    /// Region scanned on every cycle.
    pub default_region: Region,
    /// Non-default regions, one per cycle in this order.
    pub rotation: Vec<Region>,
    /// SQLite URL; the in-memory store is used when unset.
    #[serde(default)]
    pub database_url: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 600,
            default_region: Region::Au,
            rotation: vec![Region::Uk, Region::Us, Region::Eu],
            database_url: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// Directory of `<region>/<sport_key>.json` odds snapshots.
    pub snapshot_dir: String,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Reject threshold and scheduling values the scanner cannot run with.
    pub fn validate(&self) -> Result<(), ScanError> {
        let d = &self.detector;
        let fail = |msg: String| Err(ScanError::Config(msg));

        if !(d.near_arb_threshold.is_finite() && d.near_arb_threshold >= 0.0) {
            return fail(format!("near_arb_threshold must be >= 0, got {}", d.near_arb_threshold));
        }
        if !d.value_threshold.is_finite() || d.value_threshold < 0.0 {
            return fail(format!("value_threshold must be >= 0, got {}", d.value_threshold));
        }
        if d.min_consensus_books < 2 {
            return fail(format!("min_consensus_books must be >= 2, got {}", d.min_consensus_books));
        }
        if !(0.0..1.0).contains(&d.exchange_commission) {
            return fail(format!("exchange_commission must be in [0, 1), got {}", d.exchange_commission));
        }
        if !(d.total_stake.is_finite() && d.total_stake > 0.0) {
            return fail(format!("total_stake must be positive, got {}", d.total_stake));
        }
        if !(d.middle_max_loss_pct.is_finite() && d.middle_max_loss_pct >= 0.0) {
            return fail(format!("middle_max_loss_pct must be >= 0, got {}", d.middle_max_loss_pct));
        }

        let c = &self.cache;
        if c.max_age_secs <= 0 {
            return fail(format!("cache max_age_secs must be positive, got {}", c.max_age_secs));
        }
        if c.rotation.is_empty() {
            return fail("cache rotation must name at least one region".to_string());
        }
        if c.rotation.contains(&c.default_region) {
            return fail(format!("default region {} must not be in the rotation", c.default_region));
        }

        let s = &self.scanner;
        if s.sports.is_empty() {
            return fail("scanner sports list is empty".to_string());
        }
        if s.sports_per_batch == 0 {
            return fail("sports_per_batch must be at least 1".to_string());
        }
        if s.scan_interval_secs == 0 || s.scan_budget_secs == 0 {
            return fail("scan interval and budget must be positive".to_string());
        }
        Ok(())
    }

    /// Detector thresholds as used by the scanner.
    pub fn detector_config(&self) -> DetectorConfig {
        let d = &self.detector;
        DetectorConfig {
            near_arb_threshold: d.near_arb_threshold,
            value_threshold: d.value_threshold,
            min_consensus_books: d.min_consensus_books,
            exchange_key: d.exchange_key.clone(),
            exchange_commission: d.exchange_commission,
            total_stake: d.total_stake,
            middle_max_loss_pct: d.middle_max_loss_pct,
        }
    }
}
