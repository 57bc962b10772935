//! Opportunity detection.
//!
//! Pure, synchronous comparison of already-fetched odds across bookmakers:
//! moneyline arbs and near-arbs, back/lay arbs against an exchange, value
//! bets against a de-vigged or exchange reference, and spread/totals arbs
//! and middles. Nothing here touches shared state, so sport groups can be
//! processed in parallel.

pub mod lines;
pub mod moneyline;
pub mod value;

use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::stakes::StakeCalculator;
use crate::types::{ArbKind, Event, LineArb, LineStats, MarketKind, ScanResults, ScanStats};

// ---------------------------------------------------------------------------
// Configuration (defaults, overridden by config.toml at runtime)
// ---------------------------------------------------------------------------

/// Detection thresholds.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Implied sums in `[1, 1 + near_arb_threshold)` are reported as near-arbs.
    pub near_arb_threshold: f64,
    /// Minimum value-bet edge, in percent.
    pub value_threshold: f64,
    /// Complete bookmaker markets needed before a consensus price is trusted.
    pub min_consensus_books: usize,
    /// Bookmaker key of the exchange used for back/lay arbs and as the
    /// preferred value reference.
    pub exchange_key: Option<String>,
    /// Exchange commission on net winnings.
    pub exchange_commission: f64,
    /// Stake that allocations are computed for.
    pub total_stake: f64,
    /// Middles whose worst case loses more than this percentage are dropped.
    pub middle_max_loss_pct: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            near_arb_threshold: 0.02,
            value_threshold: 3.0,
            min_consensus_books: 3,
            exchange_key: None,
            exchange_commission: 0.05,
            total_stake: 100.0,
            middle_max_loss_pct: 5.0,
        }
    }
}

impl DetectorConfig {
    fn is_exchange(&self, bookmaker: &str) -> bool {
        self.exchange_key.as_deref() == Some(bookmaker)
    }
}

// ---------------------------------------------------------------------------
// Scan outputs
// ---------------------------------------------------------------------------

/// Moneyline pass output: arbs, near-arbs and value bets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoneylineScan {
    pub results: ScanResults,
    pub stats: ScanStats,
}

/// Lines pass output: spread/totals arbs and middles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineScan {
    pub results: ScanResults,
    pub stats: LineStats,
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Cross-bookmaker opportunity detector.
pub struct OpportunityDetector {
    config: DetectorConfig,
    stakes: StakeCalculator,
}

impl OpportunityDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            stakes: StakeCalculator::default(),
        }
    }

    /// Access the detection configuration.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Moneyline pass over a batch of events.
    ///
    /// Output ordering depends only on the input, so identical event lists
    /// always produce identical results.
    pub fn detect_moneyline(&self, events: &[Event]) -> MoneylineScan {
        let mut scan = MoneylineScan::default();
        let mut bookmakers: BTreeSet<&str> = BTreeSet::new();

        for event in events {
            scan.stats.total_events += 1;
            for quote in event.quotes(MarketKind::H2h) {
                bookmakers.insert(quote.bookmaker_key.as_str());
            }
            if event.bookmaker_count(MarketKind::H2h) < 2 {
                continue;
            }
            scan.stats.events_with_multiple_bookmakers += 1;

            if let Some(arb) = self.moneyline_arb(event) {
                scan.results.opportunities.push(arb);
            }
            scan.results.opportunities.extend(self.exchange_arbs(event));
            scan.results.value_bets.extend(self.value_bets(event));
        }

        scan.stats.total_bookmakers = bookmakers.len() as u64;
        for o in &scan.results.opportunities {
            match o.kind {
                ArbKind::Arb => scan.stats.arbs_found += 1,
                ArbKind::NearArb => scan.stats.near_arbs_found += 1,
            }
        }
        scan.stats.value_bets_found = scan.results.value_bets.len() as u64;

        // Best first; stable sort keeps input order among equals.
        scan.results.opportunities.sort_by(|a, b| {
            b.profit_percentage
                .partial_cmp(&a.profit_percentage)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scan.results.value_bets.sort_by(|a, b| {
            b.edge_percentage
                .partial_cmp(&a.edge_percentage)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        info!(
            events = scan.stats.total_events,
            arbs = scan.stats.arbs_found,
            near_arbs = scan.stats.near_arbs_found,
            value_bets = scan.stats.value_bets_found,
            "Moneyline detection complete"
        );

        scan
    }

    /// Spread/totals pass over a batch of events.
    pub fn detect_lines(&self, events: &[Event]) -> LineScan {
        let mut scan = LineScan::default();

        for event in events {
            let has_lines = event.quotes(MarketKind::Spreads).next().is_some()
                || event.quotes(MarketKind::Totals).next().is_some();
            if !has_lines {
                continue;
            }
            scan.stats.events_with_lines += 1;

            for market in [MarketKind::Spreads, MarketKind::Totals] {
                let book = lines::LineBook::build(event, market);
                if book.is_empty() {
                    continue;
                }
                for arb in self.line_arbs(event, &book) {
                    match market {
                        MarketKind::Spreads => scan.results.spread_arbs.push(arb),
                        _ => scan.results.totals_arbs.push(arb),
                    }
                }
                scan.results.middles.extend(self.middles(event, &book));
            }
        }

        scan.stats.spread_arbs_found = scan.results.spread_arbs.len() as u64;
        scan.stats.totals_arbs_found = scan.results.totals_arbs.len() as u64;
        scan.stats.middles_found = scan.results.middles.len() as u64;

        let by_profit = |a: &LineArb, b: &LineArb| {
            b.profit_percentage
                .partial_cmp(&a.profit_percentage)
                .unwrap_or(std::cmp::Ordering::Equal)
        };
        scan.results.spread_arbs.sort_by(by_profit);
        scan.results.totals_arbs.sort_by(by_profit);
        scan.results.middles.sort_by(|a, b| {
            b.potential_profit
                .partial_cmp(&a.potential_profit)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.expected_profit
                        .partial_cmp(&a.expected_profit)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });

        debug!(
            events_with_lines = scan.stats.events_with_lines,
            spread_arbs = scan.stats.spread_arbs_found,
            totals_arbs = scan.stats.totals_arbs_found,
            middles = scan.stats.middles_found,
            "Line detection complete"
        );

        scan
    }

    /// Arb kind for an implied sum, provided the computed profit agrees with
    /// it (guards the exact `S == 1` float boundary).
    fn classify(&self, implied_sum: f64, profit_pct: f64) -> Option<ArbKind> {
        let kind = ArbKind::classify(implied_sum, self.config.near_arb_threshold)?;
        if (profit_pct > 0.0) != (kind == ArbKind::Arb) {
            return None;
        }
        Some(kind)
    }
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
