//! Equal-payout stake allocation.
//!
//! Splits a bankroll across the legs of an arb so that every outcome
//! returns the same amount, solves back/lay stakes against an exchange
//! that charges commission on net winnings, and re-checks every result
//! before it is allowed out of the detector.

use tracing::debug;

/// Relative tolerance used by the self-checks.
pub const STAKE_EPSILON: f64 = 1e-6;

/// Errors raised while sizing or checking stakes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StakeError {
    #[error("Invalid stake input: {0}")]
    InvalidInput(String),

    #[error("Stake mismatch: declared {declared:.6}%, achieved {achieved:.6}%")]
    StakeMismatch { declared: f64, achieved: f64 },
}

/// Stakes for backing at a bookmaker and laying the same selection on an
/// exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct BackLayStakes {
    pub back_odds: f64,
    pub back_stake: f64,
    pub lay_odds: f64,
    pub lay_stake: f64,
    /// Amount at risk on the lay: `lay_stake × (lay_odds − 1)`.
    pub liability: f64,
    pub commission: f64,
    /// Net result if the selection wins (back pays, lay loses).
    pub profit_if_back_wins: f64,
    /// Net result if the selection loses (lay pays less commission).
    pub profit_if_lay_wins: f64,
}

impl BackLayStakes {
    /// Equal-outcome profit as a percentage of the back stake.
    pub fn profit_percentage(&self) -> f64 {
        self.profit_if_lay_wins / self.back_stake * 100.0
    }

    /// Implied-sum equivalent: `(lay − c) / (back × (1 − c))`.
    ///
    /// Below 1 exactly when the position is profitable, so it classifies
    /// with the same thresholds as a book-vs-book arb.
    pub fn implied_sum(&self) -> f64 {
        (self.lay_odds - self.commission) / (self.back_odds * (1.0 - self.commission))
    }
}

/// Stake sizing and validation.
#[derive(Debug, Clone)]
pub struct StakeCalculator {
    epsilon: f64,
}

impl Default for StakeCalculator {
    fn default() -> Self {
        Self { epsilon: STAKE_EPSILON }
    }
}

impl StakeCalculator {
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }

    /// Split `total_stake` so every leg returns the same amount:
    /// `stake_i = total × (1/odds_i) / Σ(1/odds_j)`.
    pub fn stakes_for_book_vs_book(&self, odds: &[f64], total_stake: f64) -> Result<Vec<f64>, StakeError> {
        check_total(total_stake)?;
        if odds.len() < 2 {
            return Err(StakeError::InvalidInput(format!(
                "need at least 2 legs, got {}",
                odds.len()
            )));
        }
        for &o in odds {
            check_odds(o)?;
        }

        let implied_sum: f64 = odds.iter().map(|o| 1.0 / o).sum();
        Ok(odds
            .iter()
            .map(|o| total_stake * (1.0 / o) / implied_sum)
            .collect())
    }

    /// Solve the lay stake that equalises profit whether the back or the lay
    /// wins. Commission applies to lay winnings only:
    /// `lay_stake = back_stake × back_odds / (lay_odds − commission)`.
    pub fn stakes_for_book_vs_betfair(
        &self,
        back_odds: f64,
        back_stake: f64,
        lay_odds: f64,
        commission: f64,
    ) -> Result<BackLayStakes, StakeError> {
        check_odds(back_odds)?;
        check_odds(lay_odds)?;
        check_total(back_stake)?;
        if !(0.0..1.0).contains(&commission) {
            return Err(StakeError::InvalidInput(format!(
                "commission rate {commission} outside [0, 1)"
            )));
        }

        let lay_stake = back_stake * back_odds / (lay_odds - commission);
        let liability = lay_stake * (lay_odds - 1.0);

        let stakes = BackLayStakes {
            back_odds,
            back_stake,
            lay_odds,
            lay_stake,
            liability,
            commission,
            profit_if_back_wins: back_stake * (back_odds - 1.0) - liability,
            profit_if_lay_wins: lay_stake * (1.0 - commission) - back_stake,
        };

        debug!(
            back_odds,
            lay_odds,
            lay_stake = format!("{:.2}", stakes.lay_stake),
            liability = format!("{:.2}", stakes.liability),
            profit = format!("{:.4}", stakes.profit_if_lay_wins),
            "Back/lay stakes solved"
        );

        Ok(stakes)
    }

    /// Recompute the returns of a book-vs-book allocation and check they are
    /// equal, sum to the total, and reproduce `declared_profit_pct`.
    pub fn validate_book_vs_book(
        &self,
        odds: &[f64],
        stakes: &[f64],
        total_stake: f64,
        declared_profit_pct: f64,
    ) -> Result<(), StakeError> {
        if odds.len() != stakes.len() || odds.is_empty() {
            return Err(StakeError::InvalidInput(format!(
                "{} odds for {} stakes",
                odds.len(),
                stakes.len()
            )));
        }
        check_total(total_stake)?;

        let staked: f64 = stakes.iter().sum();
        let returns: Vec<f64> = odds.iter().zip(stakes).map(|(o, s)| o * s).collect();
        let min_return = returns.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_return = returns.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let achieved = (min_return / total_stake - 1.0) * 100.0;

        let mismatch = StakeError::StakeMismatch {
            declared: declared_profit_pct,
            achieved,
        };

        if (staked - total_stake).abs() > self.epsilon * total_stake {
            return Err(mismatch);
        }
        if max_return - min_return > self.epsilon * max_return {
            return Err(mismatch);
        }
        self.check_profit(declared_profit_pct, achieved)
    }

    /// Recompute both outcomes of a back/lay position and check they agree
    /// with each other and with `declared_profit_pct`.
    pub fn validate_book_vs_betfair(
        &self,
        stakes: &BackLayStakes,
        declared_profit_pct: f64,
    ) -> Result<(), StakeError> {
        let liability = stakes.lay_stake * (stakes.lay_odds - 1.0);
        let if_back_wins = stakes.back_stake * (stakes.back_odds - 1.0) - liability;
        let if_lay_wins = stakes.lay_stake * (1.0 - stakes.commission) - stakes.back_stake;
        let achieved = if_lay_wins.min(if_back_wins) / stakes.back_stake * 100.0;

        if (if_back_wins - if_lay_wins).abs() > self.epsilon * stakes.back_stake {
            return Err(StakeError::StakeMismatch {
                declared: declared_profit_pct,
                achieved,
            });
        }
        self.check_profit(declared_profit_pct, achieved)
    }

    fn check_profit(&self, declared: f64, achieved: f64) -> Result<(), StakeError> {
        // Compare as return ratios so the tolerance is relative to the stake.
        if ((1.0 + declared / 100.0) - (1.0 + achieved / 100.0)).abs() > self.epsilon {
            return Err(StakeError::StakeMismatch { declared, achieved });
        }
        Ok(())
    }
}

fn check_odds(odds: f64) -> Result<(), StakeError> {
    if !odds.is_finite() || odds <= 1.0 {
        return Err(StakeError::InvalidInput(format!("odds {odds} must be above 1.0")));
    }
    Ok(())
}

fn check_total(total: f64) -> Result<(), StakeError> {
    if !total.is_finite() || total <= 0.0 {
        return Err(StakeError::InvalidInput(format!("stake {total} must be positive")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
