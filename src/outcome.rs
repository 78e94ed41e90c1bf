use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    HomeWin,
    Draw,
    AwayWin,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::HomeWin, Outcome::Draw, Outcome::AwayWin];

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::HomeWin => "home_win",
            Outcome::Draw => "draw",
            Outcome::AwayWin => "away_win",
        }
    }

    /// Case-insensitive wire tokens; surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "home_win" => Some(Outcome::HomeWin),
            "draw" => Some(Outcome::Draw),
            "away_win" => Some(Outcome::AwayWin),
            _ => None,
        }
    }

    pub fn from_score(home: u32, away: u32) -> Self {
        if home > away {
            Outcome::HomeWin
        } else if home < away {
            Outcome::AwayWin
        } else {
            Outcome::Draw
        }
    }

    /// Single-letter code used by half-time/full-time markets.
    pub fn letter(self) -> char {
        match self {
            Outcome::HomeWin => 'H',
            Outcome::Draw => 'D',
            Outcome::AwayWin => 'A',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'H' => Some(Outcome::HomeWin),
            'D' => Some(Outcome::Draw),
            'A' => Some(Outcome::AwayWin),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ScoreLine {
    pub home: u32,
    pub away: u32,
}

impl ScoreLine {
    pub fn new(home: u32, away: u32) -> Self {
        Self { home, away }
    }

    pub fn total(&self) -> u32 {
        self.home + self.away
    }

    pub fn goal_difference(&self) -> i64 {
        self.home as i64 - self.away as i64
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::from_score(self.home, self.away)
    }
}

impl fmt::Display for ScoreLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.home, self.away)
    }
}

/// Probability mass over the three full-time outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OutcomeProbs {
    pub home_win: f64,
    pub draw: f64,
    pub away_win: f64,
}

impl OutcomeProbs {
    pub fn new(home_win: f64, draw: f64, away_win: f64) -> Self {
        Self {
            home_win,
            draw,
            away_win,
        }
    }

    pub fn from_fn(mut f: impl FnMut(Outcome) -> f64) -> Self {
        Self::new(f(Outcome::HomeWin), f(Outcome::Draw), f(Outcome::AwayWin))
    }

    pub fn uniform() -> Self {
        Self::new(1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0)
    }

    pub fn get(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::HomeWin => self.home_win,
            Outcome::Draw => self.draw,
            Outcome::AwayWin => self.away_win,
        }
    }

    pub fn add(&mut self, outcome: Outcome, mass: f64) {
        match outcome {
            Outcome::HomeWin => self.home_win += mass,
            Outcome::Draw => self.draw += mass,
            Outcome::AwayWin => self.away_win += mass,
        }
    }

    pub fn sum(&self) -> f64 {
        self.home_win + self.draw + self.away_win
    }

    /// Rescales to unit mass; degenerate input collapses to uniform.
    pub fn normalized(&self) -> Self {
        let sum = self.sum();
        if !sum.is_finite() || sum <= 0.0 {
            return Self::uniform();
        }
        Self::new(self.home_win / sum, self.draw / sum, self.away_win / sum)
    }

    /// Highest-mass outcome; exact ties resolve in `Outcome::ALL` order.
    pub fn argmax(&self) -> Outcome {
        let mut best = Outcome::HomeWin;
        for outcome in Outcome::ALL {
            if self.get(outcome) > self.get(best) {
                best = outcome;
            }
        }
        best
    }

    pub fn iter(&self) -> impl Iterator<Item = (Outcome, f64)> + '_ {
        Outcome::ALL.into_iter().map(|o| (o, self.get(o)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_mixed_case_tokens() {
        assert_eq!(Outcome::parse(" HOME_WIN "), Some(Outcome::HomeWin));
        assert_eq!(Outcome::parse("draw"), Some(Outcome::Draw));
        assert_eq!(Outcome::parse("away"), None);
    }

    #[test]
    fn normalized_degenerate_is_uniform() {
        let p = OutcomeProbs::new(0.0, 0.0, 0.0).normalized();
        assert!((p.home_win - 1.0 / 3.0).abs() < 1e-12);
        assert!((p.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn argmax_prefers_earlier_on_tie() {
        let p = OutcomeProbs::new(0.4, 0.2, 0.4);
        assert_eq!(p.argmax(), Outcome::HomeWin);
    }

    #[test]
    fn outcome_serializes_as_wire_token() {
        let json = serde_json::to_string(&Outcome::AwayWin).unwrap();
        assert_eq!(json, "\"away_win\"");
    }
}
