//! Cross-region merge: freshness filter, concatenation in region order,
//! composite-key dedup and stats aggregation.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;

use crate::types::{
    ArbOpportunity, LineArb, LineStats, MarketKind, MiddleOpportunity, Region, RegionScanData,
    ScanResults, ScanStats, ValueBet,
};

/// Line value(s) identifying a spread/totals position, in hundredths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LineKey {
    Single(i64),
    Range(i64, i64),
}

fn hundredths(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

/// Identity of an opportunity across regions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpportunityKey {
    pub event_id: String,
    pub market: MarketKind,
    pub bookmaker_a: String,
    pub bookmaker_b: Option<String>,
    pub outcome: Option<String>,
    pub line: Option<LineKey>,
}

impl OpportunityKey {
    pub fn for_arb(arb: &ArbOpportunity) -> Self {
        let book = |i: usize| arb.legs.get(i).map(|l| l.bookmaker.clone());
        Self {
            event_id: arb.event.id.clone(),
            market: arb.market,
            bookmaker_a: book(0).unwrap_or_default(),
            bookmaker_b: book(1),
            // Back/lay arbs on one event differ only by selection.
            outcome: if arb.is_exchange() {
                arb.legs.first().map(|l| l.outcome.clone())
            } else {
                None
            },
            line: None,
        }
    }

    pub fn for_value_bet(bet: &ValueBet) -> Self {
        Self {
            event_id: bet.event.id.clone(),
            market: bet.market,
            bookmaker_a: bet.bookmaker.clone(),
            bookmaker_b: None,
            outcome: Some(bet.outcome.clone()),
            line: None,
        }
    }

    pub fn for_line_arb(arb: &LineArb) -> Self {
        Self {
            event_id: arb.event.id.clone(),
            market: arb.market,
            bookmaker_a: arb.legs.first().map(|l| l.bookmaker.clone()).unwrap_or_default(),
            bookmaker_b: arb.legs.get(1).map(|l| l.bookmaker.clone()),
            outcome: None,
            line: Some(LineKey::Single(hundredths(arb.line))),
        }
    }

    pub fn for_middle(middle: &MiddleOpportunity) -> Self {
        Self {
            event_id: middle.event.id.clone(),
            market: middle.market,
            bookmaker_a: middle.legs.first().map(|l| l.bookmaker.clone()).unwrap_or_default(),
            bookmaker_b: middle.legs.get(1).map(|l| l.bookmaker.clone()),
            outcome: None,
            line: Some(LineKey::Range(
                hundredths(middle.middle_range.low),
                hundredths(middle.middle_range.high),
            )),
        }
    }
}

/// Keep the first occurrence of every key.
pub fn dedup_by_key<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(key(item))).collect()
}

/// Deduplicate every result list of a merged set.
pub fn dedup_results(results: ScanResults) -> ScanResults {
    ScanResults {
        opportunities: dedup_by_key(results.opportunities, OpportunityKey::for_arb),
        value_bets: dedup_by_key(results.value_bets, OpportunityKey::for_value_bet),
        spread_arbs: dedup_by_key(results.spread_arbs, OpportunityKey::for_line_arb),
        totals_arbs: dedup_by_key(results.totals_arbs, OpportunityKey::for_line_arb),
        middles: dedup_by_key(results.middles, OpportunityKey::for_middle),
    }
}

/// Aggregated view over every fresh region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedScan {
    pub results: ScanResults,
    pub stats: ScanStats,
    pub line_stats: LineStats,
    /// Latest `scanned_at` among included regions.
    pub scanned_at: Option<DateTime<Utc>>,
    /// Age in seconds per region; `None` when stale or never scanned.
    pub region_ages: BTreeMap<Region, Option<i64>>,
    /// Credits reported by the most recent included scan.
    pub remaining_credits: Option<u64>,
}

/// Merge region buckets fresh at `now` (age ≤ `max_age_secs`), in AU, UK,
/// US, EU order.
pub fn merge_regions(
    mut scans: Vec<(Region, RegionScanData)>,
    max_age_secs: i64,
    now: DateTime<Utc>,
) -> MergedScan {
    scans.sort_by_key(|(r, _)| *r);

    let mut merged = MergedScan {
        region_ages: Region::ALL.iter().map(|r| (*r, None)).collect(),
        ..Default::default()
    };
    let mut combined = ScanResults::default();

    for (region, data) in scans {
        if !data.is_fresh(now, max_age_secs) {
            continue;
        }
        merged.region_ages.insert(region, Some(data.age_secs(now).max(0)));
        merged.stats.merge_region(&data.stats);
        merged.line_stats.merge_region(&data.line_stats);
        if merged.scanned_at.map_or(true, |t| data.scanned_at > t) {
            merged.scanned_at = Some(data.scanned_at);
            merged.remaining_credits = data.remaining_credits;
        }
        combined.extend(data.results);
    }

    merged.results = dedup_results(combined);
    merged
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
