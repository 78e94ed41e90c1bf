use serde::{Deserialize, Serialize};

/// Home-advantage factor assumed for the home side when none is supplied.
pub const DEFAULT_HOME_ADVANTAGE: f64 = 1.1;
pub const DEFAULT_AWAY_ADVANTAGE: f64 = 1.0;
pub const DEFAULT_REST_DAYS: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchImportance {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackingStyle {
    #[default]
    Balanced,
    WingPlay,
    Central,
    Possession,
    Counter,
}

impl AttackingStyle {
    /// Multiplier on the base corner rate.
    pub fn corner_factor(self) -> f64 {
        match self {
            AttackingStyle::WingPlay => 1.2,
            AttackingStyle::Central => 0.9,
            _ => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Weather {
    #[serde(default)]
    pub temperature: f64,
    /// Millimetres per hour.
    #[serde(default)]
    pub precipitation: f64,
    /// Metres per second.
    #[serde(default)]
    pub wind_speed: f64,
}

impl Weather {
    /// Rough scoring impact in [-1, 1]; rain and wind only ever hurt.
    pub fn impact(&self) -> f64 {
        let impact = -0.1 * self.precipitation.max(0.0) - 0.05 * self.wind_speed.max(0.0);
        impact.clamp(-1.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSnapshot {
    pub name: String,
    /// 0 to 100.
    pub rating: f64,
    /// W/D/L characters, most recent first.
    #[serde(default)]
    pub form: String,
    #[serde(default)]
    pub form_points: u32,
    #[serde(default)]
    pub win_streak: u32,
    #[serde(default)]
    pub goals_scored_avg: f64,
    #[serde(default)]
    pub goals_conceded_avg: f64,
    #[serde(default = "default_rest_days")]
    pub rest_days: u32,
    #[serde(default)]
    pub home_advantage: Option<f64>,
}

fn default_rest_days() -> u32 {
    DEFAULT_REST_DAYS
}

impl TeamSnapshot {
    pub fn new(name: &str, rating: f64) -> Self {
        Self {
            name: name.to_string(),
            rating,
            form: String::new(),
            form_points: 0,
            win_streak: 0,
            goals_scored_avg: 0.0,
            goals_conceded_avg: 0.0,
            rest_days: DEFAULT_REST_DAYS,
            home_advantage: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeadToHead {
    pub home_wins: u32,
    pub away_wins: u32,
    pub draws: u32,
}

/// Everything the engine is allowed to know about a fixture before kickoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchContext {
    pub match_id: String,
    #[serde(default)]
    pub competition: String,
    #[serde(default)]
    pub kickoff: Option<String>,
    pub home: TeamSnapshot,
    pub away: TeamSnapshot,
    #[serde(default)]
    pub head_to_head: HeadToHead,
    #[serde(default)]
    pub is_derby: bool,
    #[serde(default)]
    pub neutral_venue: bool,
    #[serde(default)]
    pub importance: MatchImportance,
    #[serde(default)]
    pub attacking_style: AttackingStyle,
    /// Shot-volume adjustment, roughly -2..2 with 0 as neutral.
    #[serde(default)]
    pub attacking_factor: f64,
    #[serde(default)]
    pub weather: Option<Weather>,
}

impl MatchContext {
    pub fn home_advantage(&self) -> f64 {
        let default = if self.neutral_venue {
            DEFAULT_AWAY_ADVANTAGE
        } else {
            DEFAULT_HOME_ADVANTAGE
        };
        self.home.home_advantage.unwrap_or(default)
    }

    pub fn away_advantage(&self) -> f64 {
        self.away.home_advantage.unwrap_or(DEFAULT_AWAY_ADVANTAGE)
    }

    pub fn weather_impact(&self) -> f64 {
        self.weather.map(|w| w.impact()).unwrap_or(0.0)
    }

    pub fn home_attacking_strength(&self) -> f64 {
        attacking_strength(&self.home, self.home_advantage())
    }

    pub fn away_attacking_strength(&self) -> f64 {
        attacking_strength(&self.away, self.away_advantage())
    }
}

/// W=2, D=1, L=0 averaged over the form string and scaled to [0, 1].
///
/// Characters other than W/D/L count as a draw; an empty string is neutral.
pub fn form_strength(form: &str) -> f64 {
    let chars: Vec<char> = form.chars().filter(|c| !c.is_whitespace()).collect();
    if chars.is_empty() {
        return 0.5;
    }
    let points: u32 = chars
        .iter()
        .map(|c| match c.to_ascii_uppercase() {
            'W' => 2,
            'L' => 0,
            _ => 1,
        })
        .sum();
    points as f64 / (chars.len() as f64 * 2.0)
}

/// rating × 0.4 + form strength × 0.3 + home advantage × 0.3.
pub fn attacking_strength(team: &TeamSnapshot, home_advantage: f64) -> f64 {
    team.rating * 0.4 + form_strength(&team.form) * 0.3 + home_advantage * 0.3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_strength_weights_results() {
        assert!((form_strength("WWWWW") - 1.0).abs() < 1e-12);
        assert!((form_strength("LLLLL") - 0.0).abs() < 1e-12);
        assert!((form_strength("WDL") - 0.5).abs() < 1e-12);
        assert!((form_strength("") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn weather_impact_is_clamped() {
        let storm = Weather {
            temperature: 5.0,
            precipitation: 30.0,
            wind_speed: 20.0,
        };
        assert!((storm.impact() + 1.0).abs() < 1e-12);
        assert_eq!(Weather::default().impact(), 0.0);
    }

    #[test]
    fn home_side_gets_default_advantage() {
        let ctx = MatchContext {
            match_id: "m".into(),
            competition: String::new(),
            kickoff: None,
            home: TeamSnapshot::new("A", 80.0),
            away: TeamSnapshot::new("B", 80.0),
            head_to_head: HeadToHead::default(),
            is_derby: false,
            neutral_venue: false,
            importance: MatchImportance::Medium,
            attacking_style: AttackingStyle::Balanced,
            attacking_factor: 0.0,
            weather: None,
        };
        assert!(ctx.home_attacking_strength() > ctx.away_attacking_strength());
    }
}
