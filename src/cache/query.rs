//! Caller-facing filter over a merged scan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::merge::MergedScan;
use crate::types::{
    ArbKind, ArbOpportunity, EventRef, LineArb, LineStats, MiddleOpportunity, Region, ScanStats,
    ValueBet,
};

/// Query parameters. Every toggle defaults to on.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanQuery {
    /// Minimum profit (arbs, line arbs), edge (value bets) or both-win
    /// profit (middles), in percent.
    pub min_profit: Option<f64>,
    /// Only events starting within this many hours.
    pub max_hours: Option<f64>,
    pub arbs: bool,
    pub near_arbs: bool,
    pub value_bets: bool,
    pub spreads: bool,
    pub totals: bool,
    pub middles: bool,
}

impl Default for ScanQuery {
    fn default() -> Self {
        Self {
            min_profit: None,
            max_hours: None,
            arbs: true,
            near_arbs: true,
            value_bets: true,
            spreads: true,
            totals: true,
            middles: true,
        }
    }
}

/// Filtered scan as served to consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub opportunities: Vec<ArbOpportunity>,
    pub value_bets: Vec<ValueBet>,
    pub spread_arbs: Vec<LineArb>,
    pub totals_arbs: Vec<LineArb>,
    pub middles: Vec<MiddleOpportunity>,
    pub stats: ScanStats,
    pub line_stats: LineStats,
    pub scanned_at: Option<DateTime<Utc>>,
    pub region_ages: BTreeMap<Region, Option<i64>>,
    pub remaining_credits: Option<u64>,
}

impl ScanQuery {
    fn in_window(&self, event: &EventRef, now: DateTime<Utc>) -> bool {
        self.max_hours
            .map_or(true, |h| event.hours_until_start(now) <= h)
    }

    fn meets(&self, value: f64) -> bool {
        self.min_profit.map_or(true, |m| value >= m)
    }

    /// Apply the filters to a merged scan.
    pub fn apply(&self, merged: MergedScan, now: DateTime<Utc>) -> QueryResponse {
        let results = merged.results;

        let opportunities = results
            .opportunities
            .into_iter()
            .filter(|o| match o.kind {
                ArbKind::Arb => self.arbs,
                ArbKind::NearArb => self.near_arbs,
            })
            .filter(|o| self.in_window(&o.event, now) && self.meets(o.profit_percentage))
            .collect();

        let value_bets = if self.value_bets {
            results
                .value_bets
                .into_iter()
                .filter(|v| self.in_window(&v.event, now) && self.meets(v.edge_percentage))
                .collect()
        } else {
            Vec::new()
        };

        let lines = |enabled: bool, arbs: Vec<LineArb>| -> Vec<LineArb> {
            if !enabled {
                return Vec::new();
            }
            arbs.into_iter()
                .filter(|l| self.in_window(&l.event, now) && self.meets(l.profit_percentage))
                .collect()
        };
        let spread_arbs = lines(self.spreads, results.spread_arbs);
        let totals_arbs = lines(self.totals, results.totals_arbs);

        let middles = if self.middles {
            results
                .middles
                .into_iter()
                .filter(|m| self.in_window(&m.event, now) && self.meets(m.potential_profit))
                .collect()
        } else {
            Vec::new()
        };

        QueryResponse {
            opportunities,
            value_bets,
            spread_arbs,
            totals_arbs,
            middles,
            stats: merged.stats,
            line_stats: merged.line_stats,
            scanned_at: merged.scanned_at,
            region_ages: merged.region_ages,
            remaining_credits: merged.remaining_credits,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
