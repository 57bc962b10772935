//! Shared types for the ARBSCAN scanner.
//!
//! These types form the data model used across all modules: normalised
//! odds events coming in from a provider, the opportunities the detector
//! produces, and the per-region documents the scan cache persists.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Regions
// ---------------------------------------------------------------------------

/// Odds-provider region bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Au,
    Uk,
    Us,
    Eu,
}

impl Region {
    /// All regions, in merge order.
    pub const ALL: [Region; 4] = [Region::Au, Region::Uk, Region::Us, Region::Eu];

    /// Provider-facing region code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Au => "au",
            Region::Uk => "uk",
            Region::Us => "us",
            Region::Eu => "eu",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

impl std::str::FromStr for Region {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "au" => Ok(Region::Au),
            "uk" => Ok(Region::Uk),
            "us" => Ok(Region::Us),
            "eu" => Ok(Region::Eu),
            _ => Err(anyhow::anyhow!("Unknown region: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Events & quotes
// ---------------------------------------------------------------------------

/// Market type carried by a bookmaker quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    /// Moneyline (head to head).
    H2h,
    /// Exchange lay prices for the moneyline.
    H2hLay,
    Spreads,
    Totals,
}

impl MarketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketKind::H2h => "h2h",
            MarketKind::H2hLay => "h2h_lay",
            MarketKind::Spreads => "spreads",
            MarketKind::Totals => "totals",
        }
    }

    /// Whether quotes of this kind carry a `point` line value.
    pub fn has_lines(&self) -> bool {
        matches!(self, MarketKind::Spreads | MarketKind::Totals)
    }
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single priced outcome within a bookmaker's market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub name: String,
    /// Decimal odds.
    pub price: f64,
    /// Line value for spreads/totals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point: Option<f64>,
}

impl Outcome {
    /// Decimal odds must be finite and strictly above evens-minus-stake (1.0).
    pub fn has_valid_price(&self) -> bool {
        self.price.is_finite() && self.price > 1.0
    }
}

/// One bookmaker's prices for one market of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmakerQuote {
    pub bookmaker_key: String,
    pub market: MarketKind,
    pub outcomes: Vec<Outcome>,
}

/// A normalised sporting event with per-bookmaker prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub sport_key: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
    #[serde(default)]
    pub bookmakers: Vec<BookmakerQuote>,
}

impl Event {
    /// Quotes for a single market kind.
    pub fn quotes(&self, market: MarketKind) -> impl Iterator<Item = &BookmakerQuote> {
        self.bookmakers.iter().filter(move |q| q.market == market)
    }

    /// Number of distinct bookmakers quoting the given market.
    pub fn bookmaker_count(&self, market: MarketKind) -> usize {
        self.quotes(market)
            .map(|q| q.bookmaker_key.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn event_ref(&self) -> EventRef {
        EventRef {
            id: self.id.clone(),
            sport_key: self.sport_key.clone(),
            home_team: self.home_team.clone(),
            away_team: self.away_team.clone(),
            commence_time: self.commence_time,
        }
    }
}

/// Lightweight reference to an event, embedded in every opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRef {
    pub id: String,
    pub sport_key: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
}

impl EventRef {
    /// Hours from `now` until the event starts (negative once started).
    pub fn hours_until_start(&self, now: DateTime<Utc>) -> f64 {
        (self.commence_time - now).num_seconds() as f64 / 3600.0
    }
}

impl fmt::Display for EventRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} vs {} [{}]", self.home_team, self.away_team, self.sport_key)
    }
}

// ---------------------------------------------------------------------------
// Opportunities
// ---------------------------------------------------------------------------

/// Guaranteed-profit arb versus near-miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArbKind {
    Arb,
    NearArb,
}

impl ArbKind {
    /// Classify an implied-probability sum. `None` when the sum is too far
    /// above 1 to be worth surfacing.
    pub fn classify(implied_sum: f64, near_arb_threshold: f64) -> Option<Self> {
        if !implied_sum.is_finite() || implied_sum <= 0.0 {
            None
        } else if implied_sum < 1.0 {
            Some(ArbKind::Arb)
        } else if implied_sum < 1.0 + near_arb_threshold {
            Some(ArbKind::NearArb)
        } else {
            None
        }
    }
}

impl fmt::Display for ArbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArbKind::Arb => write!(f, "ARB"),
            ArbKind::NearArb => write!(f, "NEAR-ARB"),
        }
    }
}

/// Back a selection at a bookmaker, or lay it on an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetSide {
    Back,
    Lay,
}

/// One leg of a multi-bookmaker position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArbLeg {
    pub outcome: String,
    pub bookmaker: String,
    pub odds: f64,
    pub stake: f64,
    pub side: BetSide,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point: Option<f64>,
    /// Exposure of a lay leg: `stake × (odds − 1)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liability: Option<f64>,
}

impl ArbLeg {
    pub fn back(outcome: &str, bookmaker: &str, odds: f64, stake: f64) -> Self {
        Self {
            outcome: outcome.to_string(),
            bookmaker: bookmaker.to_string(),
            odds,
            stake,
            side: BetSide::Back,
            point: None,
            liability: None,
        }
    }

    pub fn with_point(mut self, point: Option<f64>) -> Self {
        self.point = point;
        self
    }

    /// Gross return if a back leg wins.
    pub fn payout(&self) -> f64 {
        self.stake * self.odds
    }
}

/// Moneyline arbitrage or near-arbitrage across bookmakers (or book vs exchange).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArbOpportunity {
    pub kind: ArbKind,
    pub event: EventRef,
    pub market: MarketKind,
    pub legs: Vec<ArbLeg>,
    /// Σ(1/odds) over the legs (or its back/lay equivalent).
    pub implied_sum: f64,
    pub profit_percentage: f64,
    pub total_stake: f64,
}

impl ArbOpportunity {
    /// Back/lay opportunity against an exchange.
    pub fn is_exchange(&self) -> bool {
        self.legs.iter().any(|l| l.side == BetSide::Lay)
    }
}

impl fmt::Display for ArbOpportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let legs: Vec<String> = self
            .legs
            .iter()
            .map(|l| format!("{} @{:.2} ({})", l.outcome, l.odds, l.bookmaker))
            .collect();
        write!(
            f,
            "{} {} | {} | {:+.2}%",
            self.kind,
            self.event,
            legs.join(" / "),
            self.profit_percentage,
        )
    }
}

/// Where a value bet's fair probability came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum FairReference {
    /// De-vigged average of `books` complete bookmaker markets.
    Consensus { books: usize },
    /// Exchange lay price adjusted for commission.
    #[serde(rename_all = "camelCase")]
    Exchange {
        exchange: String,
        lay_odds: f64,
        commission: f64,
    },
}

/// Single-sided bet priced above its estimated fair probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueBet {
    pub event: EventRef,
    pub market: MarketKind,
    pub outcome: String,
    pub bookmaker: String,
    pub odds: f64,
    pub fair_probability: f64,
    pub fair_odds: f64,
    pub edge_percentage: f64,
    pub reference: FairReference,
}

impl fmt::Display for ValueBet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VALUE {} | {} @{:.2} ({}) fair={:.2} | edge={:.2}%",
            self.event, self.outcome, self.odds, self.bookmaker, self.fair_odds, self.edge_percentage,
        )
    }
}

/// Arbitrage on opposite sides of the same spread or total line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineArb {
    pub event: EventRef,
    pub market: MarketKind,
    /// Totals: the shared line. Spreads: the home team's handicap.
    pub line: f64,
    pub legs: Vec<ArbLeg>,
    pub implied_sum: f64,
    pub profit_percentage: f64,
    pub total_stake: f64,
}

/// Open interval of final values for which both middle legs win.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MiddleRange {
    pub low: f64,
    pub high: f64,
}

impl MiddleRange {
    pub fn contains(&self, value: f64) -> bool {
        value > self.low && value < self.high
    }

    pub fn width(&self) -> f64 {
        self.high - self.low
    }
}

/// Result of grading one leg against a final value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegResult {
    Win,
    Push,
    Lose,
}

/// Opposite-side bets on different lines that can both win.
///
/// For totals the range is over the final combined score; for spreads it is
/// over the home team's winning margin (home score − away score).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiddleOpportunity {
    pub event: EventRef,
    pub market: MarketKind,
    pub legs: Vec<ArbLeg>,
    pub middle_range: MiddleRange,
    pub total_stake: f64,
    /// Worst-case profit as a percentage of total stake (one leg wins).
    pub expected_profit: f64,
    /// Profit as a percentage of total stake if both legs win.
    pub potential_profit: f64,
}

impl MiddleOpportunity {
    /// Grade a leg against the final total (totals) or home margin (spreads).
    pub fn grade_leg(&self, leg: &ArbLeg, final_value: f64) -> LegResult {
        let point = leg.point.unwrap_or(0.0);
        let margin = match self.market {
            MarketKind::Totals if leg.outcome.eq_ignore_ascii_case("over") => final_value - point,
            MarketKind::Totals => point - final_value,
            _ if leg.outcome == self.event.home_team => final_value + point,
            _ => point - final_value,
        };
        if margin > 0.0 {
            LegResult::Win
        } else if margin == 0.0 {
            LegResult::Push
        } else {
            LegResult::Lose
        }
    }

    /// Money profit for a given final value, using the legs' stakes.
    pub fn settle(&self, final_value: f64) -> f64 {
        let returned: f64 = self
            .legs
            .iter()
            .map(|leg| match self.grade_leg(leg, final_value) {
                LegResult::Win => leg.payout(),
                LegResult::Push => leg.stake,
                LegResult::Lose => 0.0,
            })
            .sum();
        returned - self.total_stake
    }
}

impl fmt::Display for MiddleOpportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MIDDLE {} {} ({}, {}) | worst={:+.2}% middle={:+.2}%",
            self.event,
            self.market,
            self.middle_range.low,
            self.middle_range.high,
            self.expected_profit,
            self.potential_profit,
        )
    }
}

/// Tagged union used at every serialization boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Opportunity {
    Arb(ArbOpportunity),
    NearArb(ArbOpportunity),
    ValueBet(ValueBet),
    Spread(LineArb),
    Totals(LineArb),
    Middle(MiddleOpportunity),
}

impl Opportunity {
    pub fn type_name(&self) -> &'static str {
        match self {
            Opportunity::Arb(_) => "arb",
            Opportunity::NearArb(_) => "near-arb",
            Opportunity::ValueBet(_) => "value-bet",
            Opportunity::Spread(_) => "spread",
            Opportunity::Totals(_) => "totals",
            Opportunity::Middle(_) => "middle",
        }
    }

    pub fn event(&self) -> &EventRef {
        match self {
            Opportunity::Arb(o) | Opportunity::NearArb(o) => &o.event,
            Opportunity::ValueBet(v) => &v.event,
            Opportunity::Spread(l) | Opportunity::Totals(l) => &l.event,
            Opportunity::Middle(m) => &m.event,
        }
    }

    /// Check the structural invariants of a record.
    pub fn validate(&self) -> Result<(), ScanError> {
        let fail = |reason: &str| ScanError::InvalidRecord {
            kind: self.type_name(),
            event_id: self.event().id.clone(),
            reason: reason.to_string(),
        };
        let legs_ok = |legs: &[ArbLeg]| legs.iter().all(|l| l.odds.is_finite() && l.odds > 1.0);

        match self {
            Opportunity::Arb(o) | Opportunity::NearArb(o) => {
                let expected = if matches!(self, Opportunity::Arb(_)) {
                    ArbKind::Arb
                } else {
                    ArbKind::NearArb
                };
                if o.kind != expected {
                    return Err(fail("kind does not match record type"));
                }
                if !(2..=3).contains(&o.legs.len()) {
                    return Err(fail("arb must have 2 or 3 legs"));
                }
                if !legs_ok(&o.legs) {
                    return Err(fail("leg odds must be above 1.0"));
                }
                if (o.profit_percentage > 0.0) != (o.kind == ArbKind::Arb) {
                    return Err(fail("profit sign disagrees with kind"));
                }
            }
            Opportunity::ValueBet(v) => {
                if !(v.odds.is_finite() && v.odds > 1.0) {
                    return Err(fail("odds must be above 1.0"));
                }
                if !(v.fair_probability > 0.0 && v.fair_probability < 1.0) {
                    return Err(fail("fair probability outside (0, 1)"));
                }
            }
            Opportunity::Spread(l) | Opportunity::Totals(l) => {
                let expected = if matches!(self, Opportunity::Spread(_)) {
                    MarketKind::Spreads
                } else {
                    MarketKind::Totals
                };
                if l.market != expected {
                    return Err(fail("market does not match record type"));
                }
                if l.legs.len() != 2 || !legs_ok(&l.legs) {
                    return Err(fail("line arb needs two priced legs"));
                }
                if l.profit_percentage <= 0.0 {
                    return Err(fail("line arb must be profitable"));
                }
            }
            Opportunity::Middle(m) => {
                if !m.market.has_lines() {
                    return Err(fail("middle must be on a line market"));
                }
                if m.legs.len() != 2 || !legs_ok(&m.legs) {
                    return Err(fail("middle needs two priced legs"));
                }
                if m.middle_range.low >= m.middle_range.high {
                    return Err(fail("empty middle range"));
                }
                if m.potential_profit < m.expected_profit {
                    return Err(fail("potential profit below worst case"));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Result sets & stats
// ---------------------------------------------------------------------------

/// Every detected result for a region or an in-progress scan.
///
/// Serialized as a flat list of tagged [`Opportunity`] records; each record
/// is validated when a document is read back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Opportunity>", into = "Vec<Opportunity>")]
pub struct ScanResults {
    pub opportunities: Vec<ArbOpportunity>,
    pub value_bets: Vec<ValueBet>,
    pub spread_arbs: Vec<LineArb>,
    pub totals_arbs: Vec<LineArb>,
    pub middles: Vec<MiddleOpportunity>,
}

impl ScanResults {
    pub fn len(&self) -> usize {
        self.opportunities.len()
            + self.value_bets.len()
            + self.spread_arbs.len()
            + self.totals_arbs.len()
            + self.middles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn extend(&mut self, other: ScanResults) {
        self.opportunities.extend(other.opportunities);
        self.value_bets.extend(other.value_bets);
        self.spread_arbs.extend(other.spread_arbs);
        self.totals_arbs.extend(other.totals_arbs);
        self.middles.extend(other.middles);
    }

    /// Flatten into tagged records.
    pub fn to_records(&self) -> Vec<Opportunity> {
        let mut records = Vec::with_capacity(self.len());
        for o in &self.opportunities {
            records.push(match o.kind {
                ArbKind::Arb => Opportunity::Arb(o.clone()),
                ArbKind::NearArb => Opportunity::NearArb(o.clone()),
            });
        }
        records.extend(self.value_bets.iter().cloned().map(Opportunity::ValueBet));
        records.extend(self.spread_arbs.iter().cloned().map(Opportunity::Spread));
        records.extend(self.totals_arbs.iter().cloned().map(Opportunity::Totals));
        records.extend(self.middles.iter().cloned().map(Opportunity::Middle));
        records
    }

    /// Route validated records into their typed buckets.
    pub fn from_records(records: Vec<Opportunity>) -> Result<Self, ScanError> {
        let mut results = ScanResults::default();
        for record in records {
            record.validate()?;
            results.push(record);
        }
        Ok(results)
    }

    /// Add a single record to its bucket (no validation).
    pub fn push(&mut self, record: Opportunity) {
        match record {
            Opportunity::Arb(o) | Opportunity::NearArb(o) => self.opportunities.push(o),
            Opportunity::ValueBet(v) => self.value_bets.push(v),
            Opportunity::Spread(l) => self.spread_arbs.push(l),
            Opportunity::Totals(l) => self.totals_arbs.push(l),
            Opportunity::Middle(m) => self.middles.push(m),
        }
    }
}

impl From<ScanResults> for Vec<Opportunity> {
    fn from(results: ScanResults) -> Self {
        results.to_records()
    }
}

impl TryFrom<Vec<Opportunity>> for ScanResults {
    type Error = ScanError;

    fn try_from(records: Vec<Opportunity>) -> Result<Self, Self::Error> {
        ScanResults::from_records(records)
    }
}

/// Moneyline scan counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub total_events: u64,
    pub events_with_multiple_bookmakers: u64,
    pub total_bookmakers: u64,
    pub arbs_found: u64,
    pub near_arbs_found: u64,
    pub value_bets_found: u64,
    pub sports_scanned: u64,
    pub sports_total: u64,
}

impl ScanStats {
    /// Fold another sport group of the same scan into a running total.
    pub fn accumulate(&mut self, other: &ScanStats) {
        self.total_events += other.total_events;
        self.events_with_multiple_bookmakers += other.events_with_multiple_bookmakers;
        self.total_bookmakers = self.total_bookmakers.max(other.total_bookmakers);
        self.arbs_found += other.arbs_found;
        self.near_arbs_found += other.near_arbs_found;
        self.value_bets_found += other.value_bets_found;
        self.sports_scanned += other.sports_scanned;
        self.sports_total = self.sports_total.max(other.sports_total);
    }

    /// Fold another region into a cross-region aggregate: counts sum,
    /// gauges take the maximum.
    pub fn merge_region(&mut self, other: &ScanStats) {
        self.total_events += other.total_events;
        self.events_with_multiple_bookmakers += other.events_with_multiple_bookmakers;
        self.arbs_found += other.arbs_found;
        self.near_arbs_found += other.near_arbs_found;
        self.value_bets_found += other.value_bets_found;
        self.total_bookmakers = self.total_bookmakers.max(other.total_bookmakers);
        self.sports_scanned = self.sports_scanned.max(other.sports_scanned);
        self.sports_total = self.sports_total.max(other.sports_total);
    }

    /// A scan that stopped before covering every configured sport.
    pub fn is_partial(&self) -> bool {
        self.sports_scanned < self.sports_total
    }
}

impl fmt::Display for ScanStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "events={} multi_book={} books={} arbs={} near={} value={} sports={}/{}",
            self.total_events,
            self.events_with_multiple_bookmakers,
            self.total_bookmakers,
            self.arbs_found,
            self.near_arbs_found,
            self.value_bets_found,
            self.sports_scanned,
            self.sports_total,
        )
    }
}

/// Spread/totals scan counters. The sports fields cover the lines phase only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LineStats {
    pub events_with_lines: u64,
    pub spread_arbs_found: u64,
    pub totals_arbs_found: u64,
    pub middles_found: u64,
    pub sports_scanned: u64,
    pub sports_total: u64,
}

impl LineStats {
    /// Fold one sport group into a running total for the same scan.
    pub fn accumulate(&mut self, other: &LineStats) {
        self.events_with_lines += other.events_with_lines;
        self.spread_arbs_found += other.spread_arbs_found;
        self.totals_arbs_found += other.totals_arbs_found;
        self.middles_found += other.middles_found;
        self.sports_scanned += other.sports_scanned;
        self.sports_total = self.sports_total.max(other.sports_total);
    }

    /// Fold another region's totals in. Counts sum, sports are gauges.
    pub fn merge_region(&mut self, other: &LineStats) {
        self.events_with_lines += other.events_with_lines;
        self.spread_arbs_found += other.spread_arbs_found;
        self.totals_arbs_found += other.totals_arbs_found;
        self.middles_found += other.middles_found;
        self.sports_scanned = self.sports_scanned.max(other.sports_scanned);
        self.sports_total = self.sports_total.max(other.sports_total);
    }

    pub fn is_partial(&self) -> bool {
        self.sports_scanned < self.sports_total
    }
}

// ---------------------------------------------------------------------------
// Persisted documents
// ---------------------------------------------------------------------------

/// Latest completed scan for one region. Overwritten wholesale per scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionScanData {
    pub results: ScanResults,
    pub stats: ScanStats,
    #[serde(default)]
    pub line_stats: LineStats,
    pub scanned_at: DateTime<Utc>,
    pub scan_duration_ms: u64,
    pub remaining_credits: Option<u64>,
}

impl RegionScanData {
    /// Age in whole seconds at `now`.
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.scanned_at).num_seconds()
    }

    /// Whether the scan is at most `max_age_secs` old at `now`, exactly.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age_secs: i64) -> bool {
        now - self.scanned_at <= Duration::seconds(max_age_secs)
    }
}

/// Stage of a scan reported by a progress batch. Ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPhase {
    H2h,
    Lines,
    Complete,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanPhase::H2h => write!(f, "h2h"),
            ScanPhase::Lines => write!(f, "lines"),
            ScanPhase::Complete => write!(f, "complete"),
        }
    }
}

/// Immutable snapshot of an in-progress scan after one sport group.
///
/// `results` and the stats are running totals for the whole scan so far,
/// so the latest batch alone is a complete picture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgressBatch {
    pub scan_id: Uuid,
    pub region: Region,
    pub batch_index: u32,
    pub sport_keys: Vec<String>,
    pub results: ScanResults,
    pub stats: ScanStats,
    #[serde(default)]
    pub line_stats: LineStats,
    pub phase: ScanPhase,
    pub is_last_batch: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Round a published figure to 2 decimal places, half away from zero.
pub fn round2(value: f64) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for scan data.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Invalid {kind} record for event {event_id}: {reason}")]
    InvalidRecord {
        kind: &'static str,
        event_id: String,
        reason: String,
    },

    #[error("Scan phase cannot move from {from} to {to}")]
    PhaseRegression { from: ScanPhase, to: ScanPhase },

    #[error("Scan {0} already published its last batch")]
    ScanFinished(Uuid),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
