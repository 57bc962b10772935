//! Spread and totals detection.
//!
//! Prices are bucketed by side and line. Opposite sides of the same line
//! form an arb when the implied sum is below 1; opposite sides of crossing
//! lines form a middle, a range of final values where both legs win.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::OpportunityDetector;
use crate::types::{round2, ArbLeg, Event, LineArb, MarketKind, MiddleOpportunity, MiddleRange};

/// Which side of a line a price is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LineSide {
    Over,
    Under,
    Home,
    Away,
}

/// Line values keyed in hundredths so they can be ordered and matched exactly.
fn line_key(point: f64) -> i64 {
    (point * 100.0).round() as i64
}

/// One bookmaker's best price for one side of one line.
#[derive(Debug, Clone, PartialEq)]
pub struct LinePrice {
    pub outcome: String,
    pub bookmaker: String,
    pub point: f64,
    pub odds: f64,
}

/// Prices for one market of an event, keyed by side and line.
///
/// Each key holds at most one price per bookmaker, best first; ties go to
/// the lexicographically smallest bookmaker key.
#[derive(Debug, Default)]
pub struct LineBook {
    market: Option<MarketKind>,
    prices: BTreeMap<(LineSide, i64), Vec<LinePrice>>,
}

impl LineBook {
    pub fn build(event: &Event, market: MarketKind) -> Self {
        let mut prices: BTreeMap<(LineSide, i64), Vec<LinePrice>> = BTreeMap::new();

        for quote in event.quotes(market) {
            for outcome in &quote.outcomes {
                let Some(point) = outcome.point.filter(|p| p.is_finite()) else {
                    continue;
                };
                if !outcome.has_valid_price() {
                    continue;
                }
                let side = match market {
                    MarketKind::Totals if outcome.name.eq_ignore_ascii_case("over") => LineSide::Over,
                    MarketKind::Totals if outcome.name.eq_ignore_ascii_case("under") => LineSide::Under,
                    MarketKind::Spreads if outcome.name == event.home_team => LineSide::Home,
                    MarketKind::Spreads if outcome.name == event.away_team => LineSide::Away,
                    _ => continue,
                };

                let entries = prices.entry((side, line_key(point))).or_default();
                match entries.iter_mut().find(|p| p.bookmaker == quote.bookmaker_key) {
                    Some(existing) if outcome.price > existing.odds => {
                        existing.odds = outcome.price;
                        existing.point = point;
                    }
                    Some(_) => {}
                    None => entries.push(LinePrice {
                        outcome: outcome.name.clone(),
                        bookmaker: quote.bookmaker_key.clone(),
                        point,
                        odds: outcome.price,
                    }),
                }
            }
        }

        for entries in prices.values_mut() {
            entries.sort_by(|a, b| {
                b.odds
                    .total_cmp(&a.odds)
                    .then_with(|| a.bookmaker.cmp(&b.bookmaker))
            });
        }

        Self {
            market: Some(market),
            prices,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Best price on one side of one line.
    pub fn best(&self, side: LineSide, point: f64) -> Option<&LinePrice> {
        self.prices.get(&(side, line_key(point))).and_then(|p| p.first())
    }

    fn side(&self, side: LineSide) -> impl Iterator<Item = (i64, &[LinePrice])> {
        self.prices
            .iter()
            .filter(move |((s, _), _)| *s == side)
            .map(|((_, k), p)| (*k, p.as_slice()))
    }

    /// Opposing (first, second) pairs on the same line.
    ///
    /// Totals pair Over x with Under x. Spreads pair Home p with Away −p.
    fn same_line_pairs(&self) -> Vec<(&LinePrice, &LinePrice)> {
        let opposite = match self.market {
            Some(MarketKind::Totals) => (LineSide::Over, LineSide::Under, 1),
            Some(MarketKind::Spreads) => (LineSide::Home, LineSide::Away, -1),
            _ => return Vec::new(),
        };
        let (first_side, second_side, sign) = opposite;

        self.side(first_side)
            .filter_map(|(k, first)| {
                let second = self.prices.get(&(second_side, sign * k))?;
                cross_book_pair(first, second)
            })
            .collect()
    }

    /// Opposing pairs on crossing lines, with the range where both win.
    ///
    /// Totals: Over a with Under b for a < b, range (a, b) on the combined
    /// score. Spreads: Home p_h with Away p_a where p_h + p_a > 0, range
    /// (−p_h, p_a) on the home margin.
    fn crossing_pairs(&self) -> Vec<(&LinePrice, &LinePrice, MiddleRange)> {
        let mut pairs = Vec::new();
        match self.market {
            Some(MarketKind::Totals) => {
                for (a, overs) in self.side(LineSide::Over) {
                    for (b, unders) in self.side(LineSide::Under) {
                        if a >= b {
                            continue;
                        }
                        if let Some((over, under)) = cross_book_pair(overs, unders) {
                            pairs.push((over, under, MiddleRange { low: over.point, high: under.point }));
                        }
                    }
                }
            }
            Some(MarketKind::Spreads) => {
                for (h, homes) in self.side(LineSide::Home) {
                    for (a, aways) in self.side(LineSide::Away) {
                        if h + a <= 0 {
                            continue;
                        }
                        if let Some((home, away)) = cross_book_pair(homes, aways) {
                            pairs.push((home, away, MiddleRange { low: -home.point, high: away.point }));
                        }
                    }
                }
            }
            _ => {}
        }
        pairs
    }
}

/// Cheapest pair of prices from two different bookmakers.
///
/// Uses the best price on each side unless both come from the same book, in
/// which case the runner-up on one side replaces it, whichever leaves the
/// lower implied sum.
fn cross_book_pair<'a>(
    first: &'a [LinePrice],
    second: &'a [LinePrice],
) -> Option<(&'a LinePrice, &'a LinePrice)> {
    let (a, b) = (first.first()?, second.first()?);
    if a.bookmaker != b.bookmaker {
        return Some((a, b));
    }

    let implied = |(x, y): (&LinePrice, &LinePrice)| 1.0 / x.odds + 1.0 / y.odds;
    let swap_first = first.get(1).map(|a2| (a2, b));
    let swap_second = second.get(1).map(|b2| (a, b2));
    match (swap_first, swap_second) {
        (Some(x), Some(y)) => Some(if implied(x) <= implied(y) { x } else { y }),
        (x, y) => x.or(y),
    }
}

impl OpportunityDetector {
    /// Same-line arbs for one market of an event.
    pub(super) fn line_arbs(&self, event: &Event, book: &LineBook) -> Vec<LineArb> {
        let Some(market) = book.market else {
            return Vec::new();
        };
        let total = self.config.total_stake;
        let mut found = Vec::new();

        for (first, second) in book.same_line_pairs() {
            let odds = [first.odds, second.odds];
            let implied_sum = 1.0 / first.odds + 1.0 / second.odds;
            if implied_sum >= 1.0 {
                continue;
            }
            let profit_percentage = (1.0 / implied_sum - 1.0) * 100.0;
            if profit_percentage <= 0.0 {
                continue;
            }

            let stakes = match self.stakes.stakes_for_book_vs_book(&odds, total) {
                Ok(s) => s,
                Err(e) => {
                    debug!(event_id = %event.id, error = %e, "Skipping line candidate");
                    continue;
                }
            };
            if let Err(e) = self
                .stakes
                .validate_book_vs_book(&odds, &stakes, total, profit_percentage)
            {
                warn!(event_id = %event.id, market = %market, error = %e, "Discarding line arb that failed stake check");
                continue;
            }

            debug!(
                event_id = %event.id,
                market = %market,
                line = first.point,
                profit = format!("{:.2}%", profit_percentage),
                "Line arb"
            );

            found.push(LineArb {
                event: event.event_ref(),
                market,
                line: first.point,
                legs: vec![to_leg(first, stakes[0]), to_leg(second, stakes[1])],
                implied_sum,
                profit_percentage,
                total_stake: total,
            });
        }
        found
    }

    /// Middles for one market of an event, dropping any whose worst case
    /// loses more than `middle_max_loss_pct`.
    pub(super) fn middles(&self, event: &Event, book: &LineBook) -> Vec<MiddleOpportunity> {
        let Some(market) = book.market else {
            return Vec::new();
        };
        let total = self.config.total_stake;
        let mut found = Vec::new();

        for (first, second, middle_range) in book.crossing_pairs() {
            let odds = [first.odds, second.odds];
            let implied_sum = 1.0 / first.odds + 1.0 / second.odds;
            let worst_case = (1.0 / implied_sum - 1.0) * 100.0;
            if worst_case < -self.config.middle_max_loss_pct {
                continue;
            }

            let stakes = match self.stakes.stakes_for_book_vs_book(&odds, total) {
                Ok(s) => s,
                Err(e) => {
                    debug!(event_id = %event.id, error = %e, "Skipping middle candidate");
                    continue;
                }
            };
            if let Err(e) = self
                .stakes
                .validate_book_vs_book(&odds, &stakes, total, worst_case)
            {
                warn!(event_id = %event.id, market = %market, error = %e, "Discarding middle that failed stake check");
                continue;
            }

            let both_win = stakes[0] * odds[0] + stakes[1] * odds[1];
            let potential = (both_win / total - 1.0) * 100.0;

            debug!(
                event_id = %event.id,
                market = %market,
                low = middle_range.low,
                high = middle_range.high,
                worst = format!("{:.2}%", worst_case),
                middle = format!("{:.2}%", potential),
                "Middle"
            );

            found.push(MiddleOpportunity {
                event: event.event_ref(),
                market,
                legs: vec![to_leg(first, stakes[0]), to_leg(second, stakes[1])],
                middle_range,
                total_stake: total,
                expected_profit: round2(worst_case),
                potential_profit: round2(potential),
            });
        }
        found
    }
}

fn to_leg(price: &LinePrice, stake: f64) -> ArbLeg {
    ArbLeg::back(&price.outcome, &price.bookmaker, price.odds, stake).with_point(Some(price.point))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
