use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, Rivalries};
use crate::error::{SettlementError, SportError, ValidationError};
use crate::forecast::{ForecastCandidate, RawForecast, validate_forecast};
use crate::match_context::{
    AttackingStyle, DEFAULT_REST_DAYS, HeadToHead, MatchContext, MatchImportance, TeamSnapshot,
    Weather,
};
use crate::outcome::ScoreLine;
use crate::settlement::{MatchResult, SettledPrediction, StoredPrediction, settle};

const FORM_WINDOW: usize = 5;
const H2H_WINDOW: usize = 10;
const MAX_REST_DAYS: i64 = 14;

/// A finished fixture from stored history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedMatch {
    pub match_id: String,
    pub kickoff: DateTime<Utc>,
    pub home: String,
    pub away: String,
    pub score: ScoreLine,
}

/// The upcoming fixture as the scheduler knows it, before history is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub match_id: String,
    #[serde(default)]
    pub competition: String,
    pub kickoff: DateTime<Utc>,
    pub home: String,
    pub away: String,
    pub home_rating: f64,
    pub away_rating: f64,
    #[serde(default)]
    pub neutral_venue: bool,
    #[serde(default)]
    pub importance: MatchImportance,
    #[serde(default)]
    pub attacking_style: AttackingStyle,
    #[serde(default)]
    pub attacking_factor: f64,
    #[serde(default)]
    pub weather: Option<Weather>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FormSummary {
    /// Most recent first.
    pub form: String,
    pub points: u32,
    pub win_streak: u32,
    pub goals_scored_avg: f64,
    pub goals_conceded_avg: f64,
    pub matches: usize,
}

/// What a sport has to provide to be predicted and settled.
pub trait SportRules: Send + Sync {
    fn code(&self) -> &'static str;

    fn prepare_features(&self, fixture: &Fixture, history: &[CompletedMatch]) -> MatchContext;

    fn calculate_form(
        &self,
        team: &str,
        history: &[CompletedMatch],
        before: DateTime<Utc>,
    ) -> FormSummary;

    fn calculate_head_to_head(
        &self,
        home: &str,
        away: &str,
        history: &[CompletedMatch],
        before: DateTime<Utc>,
    ) -> HeadToHead;

    fn validate_prediction(
        &self,
        provider_id: &str,
        candidate: &ForecastCandidate,
    ) -> Result<RawForecast, ValidationError>;

    fn settle(
        &self,
        prediction: &StoredPrediction,
        result: &MatchResult,
        settled_at: DateTime<Utc>,
    ) -> Result<SettledPrediction, SettlementError>;
}

#[derive(Debug, Clone)]
pub struct Soccer {
    rivalries: Rivalries,
    points_per_correct: u32,
}

impl Soccer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            rivalries: config.rivalries.clone(),
            points_per_correct: config.points_per_correct,
        }
    }

    fn rest_days(&self, team: &str, history: &[CompletedMatch], before: DateTime<Utc>) -> u32 {
        history
            .iter()
            .filter(|m| m.kickoff < before && involves(m, team))
            .map(|m| m.kickoff)
            .max()
            .map(|last| (before - last).num_days().clamp(0, MAX_REST_DAYS) as u32)
            .unwrap_or(DEFAULT_REST_DAYS)
    }

    fn snapshot(
        &self,
        name: &str,
        rating: f64,
        history: &[CompletedMatch],
        before: DateTime<Utc>,
    ) -> TeamSnapshot {
        let form = self.calculate_form(name, history, before);
        TeamSnapshot {
            name: name.to_string(),
            rating,
            form: form.form,
            form_points: form.points,
            win_streak: form.win_streak,
            goals_scored_avg: form.goals_scored_avg,
            goals_conceded_avg: form.goals_conceded_avg,
            rest_days: self.rest_days(name, history, before),
            home_advantage: None,
        }
    }
}

impl SportRules for Soccer {
    fn code(&self) -> &'static str {
        "soccer"
    }

    fn prepare_features(&self, fixture: &Fixture, history: &[CompletedMatch]) -> MatchContext {
        let before = fixture.kickoff;
        MatchContext {
            match_id: fixture.match_id.clone(),
            competition: fixture.competition.clone(),
            kickoff: Some(fixture.kickoff.to_rfc3339()),
            home: self.snapshot(&fixture.home, fixture.home_rating, history, before),
            away: self.snapshot(&fixture.away, fixture.away_rating, history, before),
            head_to_head: self.calculate_head_to_head(
                &fixture.home,
                &fixture.away,
                history,
                before,
            ),
            is_derby: self.rivalries.is_derby(&fixture.home, &fixture.away),
            neutral_venue: fixture.neutral_venue,
            importance: fixture.importance,
            attacking_style: fixture.attacking_style,
            attacking_factor: fixture.attacking_factor,
            weather: fixture.weather,
        }
    }

    fn calculate_form(
        &self,
        team: &str,
        history: &[CompletedMatch],
        before: DateTime<Utc>,
    ) -> FormSummary {
        let recent = recent_for(history, before, FORM_WINDOW, |m| involves(m, team));
        if recent.is_empty() {
            return FormSummary::default();
        }

        let mut out = FormSummary {
            matches: recent.len(),
            ..FormSummary::default()
        };
        let mut scored = 0u32;
        let mut conceded = 0u32;
        let mut streak = 0u32;
        for m in &recent {
            let (gf, ga) = if same_team(&m.home, team) {
                (m.score.home, m.score.away)
            } else {
                (m.score.away, m.score.home)
            };
            scored += gf;
            conceded += ga;
            let letter = if gf > ga {
                out.points += 3;
                streak += 1;
                'W'
            } else {
                if gf == ga {
                    out.points += 1;
                }
                streak = 0;
                if gf == ga { 'D' } else { 'L' }
            };
            out.win_streak = out.win_streak.max(streak);
            out.form.push(letter);
        }
        let n = recent.len() as f64;
        out.goals_scored_avg = scored as f64 / n;
        out.goals_conceded_avg = conceded as f64 / n;
        out
    }

    fn calculate_head_to_head(
        &self,
        home: &str,
        away: &str,
        history: &[CompletedMatch],
        before: DateTime<Utc>,
    ) -> HeadToHead {
        let meetings = recent_for(history, before, H2H_WINDOW, |m| {
            involves(m, home) && involves(m, away)
        });
        let mut h2h = HeadToHead::default();
        for m in meetings {
            let home_goals = if same_team(&m.home, home) {
                m.score.home
            } else {
                m.score.away
            };
            let away_goals = m.score.total() - home_goals;
            if home_goals > away_goals {
                h2h.home_wins += 1;
            } else if home_goals < away_goals {
                h2h.away_wins += 1;
            } else {
                h2h.draws += 1;
            }
        }
        h2h
    }

    fn validate_prediction(
        &self,
        provider_id: &str,
        candidate: &ForecastCandidate,
    ) -> Result<RawForecast, ValidationError> {
        validate_forecast(provider_id, candidate)
    }

    fn settle(
        &self,
        prediction: &StoredPrediction,
        result: &MatchResult,
        settled_at: DateTime<Utc>,
    ) -> Result<SettledPrediction, SettlementError> {
        settle(prediction, result, self.points_per_correct, settled_at)
    }
}

/// Sport rules keyed by code.
pub struct SportRegistry {
    rules: BTreeMap<String, Box<dyn SportRules>>,
}

impl SportRegistry {
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Every built-in sport, configured from `config`.
    pub fn new(config: &EngineConfig) -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(Soccer::new(config)));
        registry
    }

    pub fn register(&mut self, rules: Box<dyn SportRules>) {
        self.rules.insert(rules.code().to_string(), rules);
    }

    pub fn get(&self, code: &str) -> Result<&dyn SportRules, SportError> {
        let key = match code.trim().to_ascii_lowercase().as_str() {
            "football" => "soccer".to_string(),
            other => other.to_string(),
        };
        self.rules
            .get(&key)
            .map(|r| r.as_ref())
            .ok_or_else(|| SportError::Unsupported(code.to_string()))
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }
}

fn same_team(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn involves(m: &CompletedMatch, team: &str) -> bool {
    same_team(&m.home, team) || same_team(&m.away, team)
}

/// The `limit` latest matches before `before` passing `keep`, most recent first.
fn recent_for<'a>(
    history: &'a [CompletedMatch],
    before: DateTime<Utc>,
    limit: usize,
    keep: impl Fn(&CompletedMatch) -> bool,
) -> Vec<&'a CompletedMatch> {
    let mut out: Vec<&CompletedMatch> = history
        .iter()
        .filter(|m| m.kickoff < before && keep(m))
        .collect();
    out.sort_by(|a, b| b.kickoff.cmp(&a.kickoff));
    out.truncate(limit);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn played(day: u32, home: &str, away: &str, h: u32, a: u32) -> CompletedMatch {
        CompletedMatch {
            match_id: format!("{home}-{away}-{day}"),
            kickoff: Utc.with_ymd_and_hms(2025, 3, day, 15, 0, 0).unwrap(),
            home: home.to_string(),
            away: away.to_string(),
            score: ScoreLine::new(h, a),
        }
    }

    fn soccer() -> Soccer {
        Soccer::new(&EngineConfig::default())
    }

    #[test]
    fn form_is_most_recent_first_and_windowed() {
        let history = vec![
            played(1, "Reds", "Blues", 0, 1),
            played(4, "Greens", "Reds", 1, 1),
            played(8, "Reds", "Whites", 2, 0),
            played(12, "Blacks", "Reds", 0, 3),
            played(15, "Reds", "Golds", 1, 0),
            played(20, "Reds", "Blues", 0, 2),
        ];
        let before = Utc.with_ymd_and_hms(2025, 3, 25, 0, 0, 0).unwrap();
        let f = soccer().calculate_form("reds", &history, before);
        assert_eq!(f.form, "LWWWD");
        assert_eq!(f.points, 10);
        assert_eq!(f.win_streak, 3);
        assert_eq!(f.matches, 5);
    }

    #[test]
    fn head_to_head_counts_both_venues() {
        let history = vec![
            played(1, "Reds", "Blues", 2, 1),
            played(8, "Blues", "Reds", 2, 0),
            played(15, "Blues", "Reds", 1, 1),
            played(16, "Reds", "Greens", 5, 0),
        ];
        let before = Utc.with_ymd_and_hms(2025, 3, 25, 0, 0, 0).unwrap();
        let h = soccer().calculate_head_to_head("Reds", "Blues", &history, before);
        assert_eq!(
            h,
            HeadToHead {
                home_wins: 1,
                away_wins: 1,
                draws: 1
            }
        );
    }

    #[test]
    fn rest_days_default_and_cap() {
        let s = soccer();
        let before = Utc.with_ymd_and_hms(2025, 3, 25, 15, 0, 0).unwrap();
        assert_eq!(s.rest_days("Nobody", &[], before), DEFAULT_REST_DAYS);
        let old = vec![played(1, "Reds", "Blues", 0, 0)];
        assert_eq!(s.rest_days("Reds", &old, before), 14);
        let recent = vec![played(21, "Reds", "Blues", 0, 0)];
        assert_eq!(s.rest_days("Reds", &recent, before), 4);
    }

    #[test]
    fn features_attach_history_and_configured_derby() {
        let config = EngineConfig {
            rivalries: Rivalries::parse("Reds:Blues"),
            ..EngineConfig::default()
        };
        let rules = Soccer::new(&config);
        let fixture = Fixture {
            match_id: "reds-blues".into(),
            competition: "League".into(),
            kickoff: Utc.with_ymd_and_hms(2025, 3, 25, 15, 0, 0).unwrap(),
            home: "Reds".into(),
            away: "Blues".into(),
            home_rating: 78.0,
            away_rating: 74.0,
            neutral_venue: false,
            importance: MatchImportance::High,
            attacking_style: AttackingStyle::Balanced,
            attacking_factor: 0.0,
            weather: None,
        };
        let history = vec![
            played(1, "Reds", "Blues", 2, 1),
            played(18, "Greens", "Reds", 0, 2),
            // after kickoff, must be ignored
            played(28, "Reds", "Blues", 0, 5),
        ];
        let ctx = rules.prepare_features(&fixture, &history);
        assert!(ctx.is_derby);
        assert_eq!(ctx.home.form, "WW");
        assert_eq!(ctx.home.rest_days, 7);
        assert_eq!(ctx.away.form, "L");
        assert_eq!(ctx.head_to_head.home_wins, 1);
        assert_eq!(ctx.importance, MatchImportance::High);
    }

    #[test]
    fn sport_validation_rejects_out_of_range_confidence() {
        let candidate: ForecastCandidate = serde_json::from_str(
            r#"{"predicted_outcome":"draw","score_prediction":{"home":1,"away":1},"confidence":1.5,"reasoning":["x"]}"#,
        )
        .unwrap();
        assert!(matches!(
            soccer().validate_prediction("gpt4", &candidate),
            Err(ValidationError::ConfidenceOutOfRange(_))
        ));
    }

    #[test]
    fn registry_rejects_unknown_sport() {
        let reg = SportRegistry::new(&EngineConfig::default());
        assert_eq!(reg.get("Football").map(|r| r.code()), Ok("soccer"));
        assert!(matches!(reg.get("cricket"), Err(SportError::Unsupported(_))));
    }
}
