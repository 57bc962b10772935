//! Mock odds provider for integration testing.
//!
//! Serves fixed events per `(region, sport)` with no network access. Errors
//! and slow sports are controllable from test code.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use arbscan::engine::{OddsProvider, OddsResponse, ProviderMeta};
use arbscan::types::*;

/// A call the provider received.
#[derive(Debug, Clone)]
pub struct FetchCall {
    pub region: Region,
    pub sport_keys: Vec<String>,
    pub markets: Vec<MarketKind>,
}

pub struct MockProvider {
    events: HashMap<(Region, String), Vec<Event>>,
    remaining: Arc<Mutex<u64>>,
    calls: Arc<Mutex<Vec<FetchCall>>>,
    slow_sports: HashSet<String>,
    /// If set, every fetch returns this error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            events: HashMap::new(),
            remaining: Arc::new(Mutex::new(500)),
            calls: Arc::new(Mutex::new(Vec::new())),
            slow_sports: HashSet::new(),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_events(mut self, region: Region, sport: &str, events: Vec<Event>) -> Self {
        self.events.insert((region, sport.to_string()), events);
        self
    }

    /// Fetches including `sport` never complete within a test budget.
    pub fn with_slow_sport(mut self, sport: &str) -> Self {
        self.slow_sports.insert(sport.to_string());
        self
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OddsProvider for MockProvider {
    async fn fetch_odds(
        &self,
        sport_keys: &[String],
        markets: &[MarketKind],
        region: Region,
    ) -> Result<OddsResponse> {
        self.calls.lock().unwrap().push(FetchCall {
            region,
            sport_keys: sport_keys.to_vec(),
            markets: markets.to_vec(),
        });

        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }
        if sport_keys.iter().any(|s| self.slow_sports.contains(s)) {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        }

        let mut events = Vec::new();
        for sport in sport_keys {
            if let Some(found) = self.events.get(&(region, sport.clone())) {
                for event in found {
                    let mut event = event.clone();
                    event.bookmakers.retain(|q| markets.contains(&q.market));
                    events.push(event);
                }
            }
        }

        let remaining = {
            let mut r = self.remaining.lock().unwrap();
            *r = r.saturating_sub(markets.len() as u64);
            *r
        };

        Ok(OddsResponse {
            events,
            meta: ProviderMeta {
                source: "mock".to_string(),
                remaining_requests: Some(remaining),
                used_requests: Some(500 - remaining),
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Event builders
// ---------------------------------------------------------------------------

pub fn quote(book: &str, market: MarketKind, prices: &[(&str, f64, Option<f64>)]) -> BookmakerQuote {
    BookmakerQuote {
        bookmaker_key: book.to_string(),
        market,
        outcomes: prices
            .iter()
            .map(|(name, price, point)| Outcome {
                name: name.to_string(),
                price: *price,
                point: *point,
            })
            .collect(),
    }
}

pub fn event(id: &str, sport: &str, home: &str, away: &str, bookmakers: Vec<BookmakerQuote>) -> Event {
    Event {
        id: id.to_string(),
        sport_key: sport.to_string(),
        home_team: home.to_string(),
        away_team: away.to_string(),
        commence_time: Utc::now() + Duration::hours(6),
        bookmakers,
    }
}

/// Sportsbet Arsenal 2.10 vs TAB Chelsea 2.05.
pub fn epl_arb() -> Event {
    event(
        "epl-arb",
        "soccer_epl",
        "Arsenal",
        "Chelsea",
        vec![
            quote("sportsbet", MarketKind::H2h, &[("Arsenal", 2.10, None), ("Chelsea", 1.80, None)]),
            quote("tab", MarketKind::H2h, &[("Arsenal", 1.70, None), ("Chelsea", 2.05, None)]),
        ],
    )
}

/// Three books at 1.90/1.90 and Ladbrokes well over on the home side.
pub fn epl_value() -> Event {
    event(
        "epl-value",
        "soccer_epl",
        "Liverpool",
        "Everton",
        vec![
            quote("bet365", MarketKind::H2h, &[("Liverpool", 1.90, None), ("Everton", 1.90, None)]),
            quote("neds", MarketKind::H2h, &[("Liverpool", 1.90, None), ("Everton", 1.90, None)]),
            quote("unibet", MarketKind::H2h, &[("Liverpool", 1.90, None), ("Everton", 1.90, None)]),
            quote("ladbrokes", MarketKind::H2h, &[("Liverpool", 2.20, None), ("Everton", 1.70, None)]),
        ],
    )
}

/// Over 215.5 at one book, Under 220.5 at another.
pub fn nba_middle() -> Event {
    event(
        "nba-middle",
        "basketball_nba",
        "Lakers",
        "Celtics",
        vec![
            quote(
                "pointsbet",
                MarketKind::Totals,
                &[("Over", 1.91, Some(215.5)), ("Under", 1.91, Some(215.5))],
            ),
            quote(
                "betright",
                MarketKind::Totals,
                &[("Over", 1.91, Some(220.5)), ("Under", 1.91, Some(220.5))],
            ),
        ],
    )
}
