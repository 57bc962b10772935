//! Moneyline arbs: best price per outcome across bookmakers, plus back/lay
//! positions against the configured exchange.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use super::OpportunityDetector;
use crate::types::{ArbKind, ArbLeg, ArbOpportunity, BetSide, BookmakerQuote, Event, MarketKind};

/// Best available back price for one outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct BestPrice<'a> {
    pub outcome: &'a str,
    pub bookmaker: &'a str,
    pub odds: f64,
}

/// Highest valid price per outcome name over `quotes`.
///
/// Equal prices resolve to the lexicographically smallest bookmaker key, so
/// the result does not depend on the order quotes arrive in.
pub fn best_by_outcome<'a, I>(quotes: I) -> (BTreeMap<&'a str, BestPrice<'a>>, BTreeSet<&'a str>)
where
    I: Iterator<Item = &'a BookmakerQuote>,
{
    let mut best: BTreeMap<&str, BestPrice> = BTreeMap::new();
    let mut names: BTreeSet<&str> = BTreeSet::new();

    for quote in quotes {
        for outcome in &quote.outcomes {
            names.insert(outcome.name.as_str());
            if !outcome.has_valid_price() {
                continue;
            }
            let candidate = BestPrice {
                outcome: outcome.name.as_str(),
                bookmaker: quote.bookmaker_key.as_str(),
                odds: outcome.price,
            };
            let replace = match best.get(outcome.name.as_str()) {
                Some(current) => {
                    candidate.odds > current.odds
                        || (candidate.odds == current.odds && candidate.bookmaker < current.bookmaker)
                }
                None => true,
            };
            if replace {
                best.insert(outcome.name.as_str(), candidate);
            }
        }
    }

    (best, names)
}

impl OpportunityDetector {
    /// Best-price moneyline arb or near-arb for an event, if any.
    ///
    /// Skipped when any outcome has no valid price anywhere, when the market
    /// is not two- or three-way, or when every best price sits at the same
    /// bookmaker.
    pub(super) fn moneyline_arb(&self, event: &Event) -> Option<ArbOpportunity> {
        let quotes = event
            .quotes(MarketKind::H2h)
            .filter(|q| !self.config.is_exchange(&q.bookmaker_key));
        let (best, names) = best_by_outcome(quotes);

        if !(2..=3).contains(&names.len()) || best.len() != names.len() {
            return None;
        }

        let mut legs: Vec<BestPrice> = best.into_values().collect();
        legs.sort_by_key(|l| {
            let rank = if l.outcome == event.home_team {
                0
            } else if l.outcome == event.away_team {
                1
            } else {
                2
            };
            (rank, l.outcome)
        });

        let distinct_books: BTreeSet<&str> = legs.iter().map(|l| l.bookmaker).collect();
        if distinct_books.len() < 2 {
            return None;
        }

        let odds: Vec<f64> = legs.iter().map(|l| l.odds).collect();
        let implied_sum: f64 = odds.iter().map(|o| 1.0 / o).sum();
        let profit_percentage = (1.0 / implied_sum - 1.0) * 100.0;
        let kind = self.classify(implied_sum, profit_percentage)?;

        let total = self.config.total_stake;
        let stakes = match self.stakes.stakes_for_book_vs_book(&odds, total) {
            Ok(s) => s,
            Err(e) => {
                debug!(event_id = %event.id, error = %e, "Skipping moneyline candidate");
                return None;
            }
        };
        if let Err(e) = self
            .stakes
            .validate_book_vs_book(&odds, &stakes, total, profit_percentage)
        {
            warn!(event_id = %event.id, error = %e, "Discarding moneyline arb that failed stake check");
            return None;
        }

        let opp = ArbOpportunity {
            kind,
            event: event.event_ref(),
            market: MarketKind::H2h,
            legs: legs
                .iter()
                .zip(&stakes)
                .map(|(l, s)| ArbLeg::back(l.outcome, l.bookmaker, l.odds, *s))
                .collect(),
            implied_sum,
            profit_percentage,
            total_stake: total,
        };

        debug!(
            event = %opp.event,
            kind = %kind,
            implied_sum = format!("{:.4}", implied_sum),
            profit = format!("{:.2}%", profit_percentage),
            "Moneyline candidate"
        );

        Some(opp)
    }

    /// Back/lay arbs and near-arbs: best bookmaker back price against the
    /// exchange lay price for the same selection.
    pub(super) fn exchange_arbs(&self, event: &Event) -> Vec<ArbOpportunity> {
        let Some(exchange) = self.config.exchange_key.as_deref() else {
            return Vec::new();
        };
        let commission = self.config.exchange_commission;

        let (backs, _) = best_by_outcome(
            event
                .quotes(MarketKind::H2h)
                .filter(|q| q.bookmaker_key != exchange),
        );

        let mut found = Vec::new();
        for lay_quote in event
            .quotes(MarketKind::H2hLay)
            .filter(|q| q.bookmaker_key == exchange)
        {
            for lay in lay_quote.outcomes.iter().filter(|o| o.has_valid_price()) {
                let Some(back) = backs.get(lay.name.as_str()) else {
                    continue;
                };

                let stakes = match self.stakes.stakes_for_book_vs_betfair(
                    back.odds,
                    self.config.total_stake,
                    lay.price,
                    commission,
                ) {
                    Ok(s) => s,
                    Err(e) => {
                        debug!(event_id = %event.id, error = %e, "Skipping back/lay candidate");
                        continue;
                    }
                };

                let implied_sum = stakes.implied_sum();
                let profit_percentage = stakes.profit_percentage();
                let Some(kind) = self.classify(implied_sum, profit_percentage) else {
                    continue;
                };
                if let Err(e) = self.stakes.validate_book_vs_betfair(&stakes, profit_percentage) {
                    warn!(event_id = %event.id, error = %e, "Discarding back/lay arb that failed stake check");
                    continue;
                }

                let lay_leg = ArbLeg {
                    outcome: lay.name.clone(),
                    bookmaker: exchange.to_string(),
                    odds: lay.price,
                    stake: stakes.lay_stake,
                    side: BetSide::Lay,
                    point: None,
                    liability: Some(stakes.liability),
                };

                found.push(ArbOpportunity {
                    kind,
                    event: event.event_ref(),
                    market: MarketKind::H2hLay,
                    legs: vec![
                        ArbLeg::back(back.outcome, back.bookmaker, back.odds, stakes.back_stake),
                        lay_leg,
                    ],
                    implied_sum,
                    profit_percentage,
                    total_stake: stakes.back_stake,
                });

                if kind == ArbKind::Arb {
                    debug!(
                        event_id = %event.id,
                        outcome = %lay.name,
                        back = back.odds,
                        lay = lay.price,
                        profit = format!("{:.2}%", profit_percentage),
                        "Back/lay arb"
                    );
                }
            }
        }
        found
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::super::DetectorConfig;
    use super::*;

    fn detector() -> OpportunityDetector {
        OpportunityDetector::new(DetectorConfig::default())
    }

    #[test]
    fn test_two_way_arb_scenario() {
        let e = event(
            "e1",
            vec![
                quote("sportsbet", MarketKind::H2h, &[("Home", 2.10), ("Away", 1.80)]),
                quote("tab", MarketKind::H2h, &[("Home", 1.70), ("Away", 2.05)]),
            ],
        );
        let arb = detector().moneyline_arb(&e).unwrap();

        assert_eq!(arb.kind, ArbKind::Arb);
        assert!((arb.implied_sum - 0.96400).abs() < 1e-4);
        assert!((arb.profit_percentage - 3.734).abs() < 0.01);
        assert_eq!(arb.legs[0].bookmaker, "sportsbet");
        assert_eq!(arb.legs[1].bookmaker, "tab");
        assert!((arb.legs[0].stake - 49.40).abs() < 0.01);
        assert!((arb.legs[1].stake - 50.60).abs() < 0.01);
        assert!((arb.legs[0].payout() - arb.legs[1].payout()).abs() < 1e-9);
    }

    #[test]
    fn test_three_way_market() {
        let e = event(
            "soccer",
            vec![
                quote("a", MarketKind::H2h, &[("Home", 2.9), ("Away", 3.0), ("Draw", 3.2)]),
                quote("b", MarketKind::H2h, &[("Home", 2.6), ("Away", 3.6), ("Draw", 3.1)]),
                quote("c", MarketKind::H2h, &[("Home", 2.7), ("Away", 3.1), ("Draw", 3.4)]),
            ],
        );
        let arb = detector().moneyline_arb(&e).unwrap();
        assert_eq!(arb.legs.len(), 3);
        assert_eq!(arb.legs[2].outcome, "Draw");
        assert_eq!(arb.legs[2].bookmaker, "c");
        // 1/2.9 + 1/3.6 + 1/3.4 = 0.9169
        assert_eq!(arb.kind, ArbKind::Arb);
    }

    #[test]
    fn test_near_arb_and_rejected_sums() {
        // 1/1.98 + 1/2.0 = 1.00505
        let near = event(
            "near",
            vec![
                quote("a", MarketKind::H2h, &[("Home", 1.98), ("Away", 1.90)]),
                quote("b", MarketKind::H2h, &[("Home", 1.85), ("Away", 2.00)]),
            ],
        );
        let arb = detector().moneyline_arb(&near).unwrap();
        assert_eq!(arb.kind, ArbKind::NearArb);
        assert!(arb.profit_percentage < 0.0);

        // 1/1.90 + 1/1.90 = 1.0526, outside the 2% window.
        let wide = event(
            "wide",
            vec![
                quote("a", MarketKind::H2h, &[("Home", 1.90), ("Away", 1.80)]),
                quote("b", MarketKind::H2h, &[("Home", 1.85), ("Away", 1.90)]),
            ],
        );
        assert!(detector().moneyline_arb(&wide).is_none());
    }

    #[test]
    fn test_skips_same_bookmaker_and_missing_prices() {
        let same_book = event(
            "same",
            vec![
                quote("a", MarketKind::H2h, &[("Home", 2.20), ("Away", 2.10)]),
                quote("b", MarketKind::H2h, &[("Home", 1.50), ("Away", 1.50)]),
            ],
        );
        assert!(detector().moneyline_arb(&same_book).is_none());

        let missing = event(
            "missing",
            vec![
                quote("a", MarketKind::H2h, &[("Home", 2.20), ("Away", 1.0)]),
                quote("b", MarketKind::H2h, &[("Home", 1.50), ("Away", f64::NAN)]),
            ],
        );
        assert!(detector().moneyline_arb(&missing).is_none());
    }

    #[test]
    fn test_best_price_tie_break_is_order_independent() {
        let forward = vec![
            quote("neds", MarketKind::H2h, &[("Home", 2.0)]),
            quote("bet365", MarketKind::H2h, &[("Home", 2.0)]),
        ];
        let reversed: Vec<_> = forward.iter().cloned().rev().collect();

        let (a, _) = best_by_outcome(forward.iter());
        let (b, _) = best_by_outcome(reversed.iter());
        assert_eq!(a["Home"].bookmaker, "bet365");
        assert_eq!(b["Home"].bookmaker, "bet365");
    }

    #[test]
    fn test_exchange_back_lay_arb() {
        let detector = OpportunityDetector::new(DetectorConfig {
            exchange_key: Some("betfair_ex_au".to_string()),
            exchange_commission: 0.02,
            ..DetectorConfig::default()
        });
        let e = event(
            "lay",
            vec![
                quote("sportsbet", MarketKind::H2h, &[("Home", 3.40), ("Away", 1.30)]),
                quote("tab", MarketKind::H2h, &[("Home", 3.10), ("Away", 1.35)]),
                quote("betfair_ex_au", MarketKind::H2hLay, &[("Home", 3.00), ("Away", 1.60)]),
            ],
        );

        let arbs = detector.exchange_arbs(&e);
        assert_eq!(arbs.len(), 1);
        let arb = &arbs[0];
        assert!(arb.is_exchange());
        assert_eq!(arb.market, MarketKind::H2hLay);
        assert_eq!(arb.kind, ArbKind::Arb);
        assert_eq!(arb.legs[0].bookmaker, "sportsbet");
        assert_eq!(arb.legs[1].side, BetSide::Lay);
        let liability = arb.legs[1].liability.unwrap();
        assert!((liability - arb.legs[1].stake * 2.0).abs() < 1e-9);
        assert!(arb.profit_percentage > 0.0);
    }

    #[test]
    fn test_exchange_excluded_from_book_vs_book() {
        let detector = OpportunityDetector::new(DetectorConfig {
            exchange_key: Some("betfair_ex_au".to_string()),
            ..DetectorConfig::default()
        });
        let e = event(
            "ex",
            vec![
                quote("betfair_ex_au", MarketKind::H2h, &[("Home", 2.50), ("Away", 2.50)]),
                quote("a", MarketKind::H2h, &[("Home", 1.80), ("Away", 1.95)]),
                quote("b", MarketKind::H2h, &[("Home", 1.95), ("Away", 1.80)]),
            ],
        );
        // 1/1.95 + 1/1.95 = 1.0256: nothing without the exchange's back prices.
        assert!(detector.moneyline_arb(&e).is_none());
    }
}
