use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::outcome::Outcome;

/// One bookmaker's 1X2 decimal prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookQuote {
    pub bookmaker: String,
    #[serde(default)]
    pub home_win: Option<f64>,
    #[serde(default)]
    pub draw: Option<f64>,
    #[serde(default)]
    pub away_win: Option<f64>,
}

impl BookQuote {
    pub fn get(&self, outcome: Outcome) -> Option<f64> {
        match outcome {
            Outcome::HomeWin => self.home_win,
            Outcome::Draw => self.draw,
            Outcome::AwayWin => self.away_win,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OddsSnapshot {
    #[serde(default)]
    pub taken_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub quotes: Vec<BookQuote>,
}

/// Median usable price per outcome across books.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConsensusOdds {
    pub home_win: Option<f64>,
    pub draw: Option<f64>,
    pub away_win: Option<f64>,
    pub books: usize,
}

impl ConsensusOdds {
    pub fn get(&self, outcome: Outcome) -> Option<f64> {
        match outcome {
            Outcome::HomeWin => self.home_win,
            Outcome::Draw => self.draw,
            Outcome::AwayWin => self.away_win,
        }
    }

    pub fn is_complete(&self) -> bool {
        Outcome::ALL.iter().all(|o| self.get(*o).is_some())
    }

    pub fn is_empty(&self) -> bool {
        Outcome::ALL.iter().all(|o| self.get(*o).is_none())
    }
}

impl OddsSnapshot {
    pub fn single(bookmaker: &str, home_win: f64, draw: f64, away_win: f64) -> Self {
        Self {
            taken_at: None,
            quotes: vec![BookQuote {
                bookmaker: bookmaker.to_string(),
                home_win: Some(home_win),
                draw: Some(draw),
                away_win: Some(away_win),
            }],
        }
    }

    pub fn consensus(&self) -> ConsensusOdds {
        let median_for = |o: Outcome| {
            let prices: Vec<f64> = self
                .quotes
                .iter()
                .filter_map(|q| q.get(o))
                .filter(|p| usable_price(*p))
                .collect();
            median_f64(&prices)
        };
        ConsensusOdds {
            home_win: median_for(Outcome::HomeWin),
            draw: median_for(Outcome::Draw),
            away_win: median_for(Outcome::AwayWin),
            books: self.quotes.len(),
        }
    }
}

/// Decimal prices at or below 1.0 pay nothing beyond the stake.
pub fn usable_price(price: f64) -> bool {
    price.is_finite() && price > 1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OddsMovement {
    pub outcome: Outcome,
    pub previous: f64,
    pub current: f64,
    /// Signed fractional change relative to the previous price.
    pub change: f64,
    pub significant: bool,
}

/// Compares consensus prices; outcomes unpriced in either snapshot are skipped.
pub fn detect_movement(
    previous: &OddsSnapshot,
    current: &OddsSnapshot,
    threshold: f64,
) -> Vec<OddsMovement> {
    let before = previous.consensus();
    let after = current.consensus();
    Outcome::ALL
        .into_iter()
        .filter_map(|o| {
            let (p, c) = (before.get(o)?, after.get(o)?);
            let change = (c - p) / p;
            Some(OddsMovement {
                outcome: o,
                previous: p,
                current: c,
                change,
                significant: change.abs() > threshold,
            })
        })
        .collect()
}

fn median_f64(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
