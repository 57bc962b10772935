//! Value bets: a bookmaker price above the fair price implied by either the
//! exchange (commission-adjusted lay) or a de-vigged bookmaker consensus.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::OpportunityDetector;
use crate::types::{Event, FairReference, MarketKind, ValueBet};

/// Fair probabilities averaged across complete bookmaker markets.
#[derive(Debug, Clone, PartialEq)]
pub struct Consensus {
    pub probabilities: BTreeMap<String, f64>,
    pub books: usize,
}

/// Remove each bookmaker's margin multiplicatively, then average the
/// resulting probabilities per outcome.
///
/// Only bookmakers pricing every outcome validly (and agreeing on the outcome
/// set) contribute.
pub fn consensus(event: &Event, exclude: Option<&str>) -> Option<Consensus> {
    let quotes: Vec<_> = event
        .quotes(MarketKind::H2h)
        .filter(|q| Some(q.bookmaker_key.as_str()) != exclude)
        .collect();

    let mut reference: Option<BTreeSet<&str>> = None;
    let mut sums: BTreeMap<String, f64> = BTreeMap::new();
    let mut books = 0usize;

    for quote in quotes {
        let names: BTreeSet<&str> = quote.outcomes.iter().map(|o| o.name.as_str()).collect();
        let complete = (2..=3).contains(&names.len())
            && names.len() == quote.outcomes.len()
            && quote.outcomes.iter().all(|o| o.has_valid_price());
        if !complete {
            continue;
        }
        if *reference.get_or_insert_with(|| names.clone()) != names {
            continue;
        }

        let margin: f64 = quote.outcomes.iter().map(|o| 1.0 / o.price).sum();
        for o in &quote.outcomes {
            *sums.entry(o.name.clone()).or_insert(0.0) += (1.0 / o.price) / margin;
        }
        books += 1;
    }

    if books == 0 {
        return None;
    }
    let probabilities = sums
        .into_iter()
        .map(|(name, total)| (name, total / books as f64))
        .collect();
    Some(Consensus { probabilities, books })
}

/// Fair odds implied by laying on an exchange: the lay price with commission
/// taken off the winnings, `1 + (lay − 1)(1 − c)`.
pub fn exchange_fair_odds(lay_odds: f64, commission: f64) -> f64 {
    1.0 + (lay_odds - 1.0) * (1.0 - commission)
}

impl OpportunityDetector {
    /// Bookmaker prices whose edge over the fair reference meets
    /// `value_threshold`. The exchange is never flagged against itself.
    pub(super) fn value_bets(&self, event: &Event) -> Vec<ValueBet> {
        let exchange = self.config.exchange_key.as_deref();
        let commission = self.config.exchange_commission;

        let lays: BTreeMap<&str, f64> = match exchange {
            Some(ex) => event
                .quotes(MarketKind::H2hLay)
                .filter(|q| q.bookmaker_key == ex)
                .flat_map(|q| q.outcomes.iter())
                .filter(|o| o.has_valid_price())
                .map(|o| (o.name.as_str(), o.price))
                .collect(),
            None => BTreeMap::new(),
        };
        let consensus = consensus(event, exchange)
            .filter(|c| c.books >= self.config.min_consensus_books);

        if lays.is_empty() && consensus.is_none() {
            return Vec::new();
        }

        let mut found = Vec::new();
        for quote in event.quotes(MarketKind::H2h) {
            if Some(quote.bookmaker_key.as_str()) == exchange {
                continue;
            }
            for outcome in quote.outcomes.iter().filter(|o| o.has_valid_price()) {
                let (fair_probability, fair_odds, reference) =
                    if let (Some(ex), Some(&lay)) = (exchange, lays.get(outcome.name.as_str())) {
                        let fair_odds = exchange_fair_odds(lay, commission);
                        (
                            1.0 / fair_odds,
                            fair_odds,
                            FairReference::Exchange {
                                exchange: ex.to_string(),
                                lay_odds: lay,
                                commission,
                            },
                        )
                    } else if let Some(p) = consensus
                        .as_ref()
                        .and_then(|c| c.probabilities.get(&outcome.name))
                    {
                        (*p, 1.0 / p, FairReference::Consensus {
                            books: consensus.as_ref().map_or(0, |c| c.books),
                        })
                    } else {
                        continue;
                    };

                if !(fair_probability > 0.0 && fair_probability < 1.0) {
                    continue;
                }
                let edge_percentage = (outcome.price * fair_probability - 1.0) * 100.0;
                if edge_percentage < self.config.value_threshold {
                    continue;
                }

                debug!(
                    event_id = %event.id,
                    bookmaker = %quote.bookmaker_key,
                    outcome = %outcome.name,
                    odds = outcome.price,
                    fair = format!("{:.3}", fair_odds),
                    edge = format!("{:.2}%", edge_percentage),
                    "Value bet"
                );

                found.push(ValueBet {
                    event: event.event_ref(),
                    market: MarketKind::H2h,
                    outcome: outcome.name.clone(),
                    bookmaker: quote.bookmaker_key.clone(),
                    odds: outcome.price,
                    fair_probability,
                    fair_odds,
                    edge_percentage,
                    reference,
                });
            }
        }
        found
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
