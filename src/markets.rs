use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ensemble::EnsembleForecast;
use crate::error::ValidationError;
use crate::match_context::{MatchContext, MatchImportance};
use crate::outcome::{Outcome, OutcomeProbs, ScoreLine};
use crate::score_grid::{ScoreGrid, poisson_pmf};

// Confidence decay per market. All at or below 1.0 so no market can claim
// more certainty than the ensemble it came from.
const OVER_UNDER_DECAY: f64 = 0.9;
const BTTS_DECAY: f64 = 0.85;
const FIRST_HALF_DECAY: f64 = 0.7;
const CORNERS_DECAY: f64 = 0.75;
const CARDS_DECAY: f64 = 0.7;
const POSSESSION_DECAY: f64 = 0.65;
const SHOTS_DECAY: f64 = 0.6;
const DOUBLE_CHANCE_DECAY: f64 = 0.85;
const HANDICAP_DECAY: f64 = 0.8;
const HTFT_DECAY: f64 = 0.6;
const CLEAN_SHEET_DECAY: f64 = 0.8;
const WIN_TO_NIL_DECAY: f64 = 0.75;
const DRAW_NO_BET_DECAY: f64 = 0.85;

const FIRST_HALF_SHARE: f64 = 0.4;
const BASE_CORNERS: f64 = 10.0;
const CORNERS_FIRST_HALF_SHARE: f64 = 0.45;
const BASE_CARDS: f64 = 4.0;
const DERBY_CARD_FACTOR: f64 = 1.3;
const HIGH_IMPORTANCE_CARD_FACTOR: f64 = 1.2;
const RED_CARD_INTENSITY: f64 = 1.4;
const RED_CARD_SHARE: f64 = 0.15;
const BASE_SHOTS: f64 = 12.0;
const ON_TARGET_SHARE: f64 = 0.4;

const DOUBLE_CHANCE_THRESHOLD: f64 = 0.6;
const HANDICAP_THRESHOLD: f64 = 0.55;
const HALF_GRID_MAX: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Half {
    First,
    Second,
    Equal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dominance {
    Home,
    Away,
    Balanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverUnder {
    pub total: u32,
    pub over_1_5: bool,
    pub over_2_5: bool,
    pub over_3_5: bool,
    pub over_2_5_probability: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BothTeamsToScore {
    pub prediction: bool,
    pub probability: f64,
    pub first_half: bool,
    pub second_half: bool,
    pub either_half: bool,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FirstHalf {
    pub home: u32,
    pub away: u32,
    pub total: u32,
    pub outcome: Outcome,
    pub highest_scoring_half: Half,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Corners {
    pub total: u32,
    pub home: u32,
    pub away: u32,
    pub over_8_5: bool,
    pub over_10_5: bool,
    pub first_half: u32,
    pub second_half: u32,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cards {
    pub total: u32,
    pub yellow: u32,
    pub red: u32,
    pub home: u32,
    pub away: u32,
    /// Minute by which the first booking is expected.
    pub first_yellow_before: u32,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Possession {
    pub home: u32,
    pub away: u32,
    pub dominant: Dominance,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shots {
    pub total: u32,
    pub on_target: u32,
    pub home: u32,
    pub away: u32,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub probability: f64,
    pub recommended: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DoubleChance {
    pub home_or_draw: Selection,
    pub away_or_draw: Selection,
    pub home_or_away: Selection,
    pub confidence: f64,
}

/// A quarter-free handicap line, applied to the home side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct HandicapLine {
    half_goals: i32,
}

impl HandicapLine {
    pub const ALL: [f64; 9] = [-2.0, -1.5, -1.0, -0.5, 0.0, 0.5, 1.0, 1.5, 2.0];

    pub fn new(line: f64) -> Result<Self, ValidationError> {
        let doubled = line * 2.0;
        if !doubled.is_finite() || doubled.fract() != 0.0 || doubled.abs() > 4.0 {
            return Err(ValidationError::InvalidHandicapLine(line));
        }
        Ok(Self {
            half_goals: doubled as i32,
        })
    }

    pub fn value(self) -> f64 {
        self.half_goals as f64 / 2.0
    }

    pub fn all() -> impl Iterator<Item = Self> {
        (-4..=4).map(|half_goals| Self { half_goals })
    }
}

impl TryFrom<f64> for HandicapLine {
    type Error = ValidationError;

    fn try_from(v: f64) -> Result<Self, Self::Error> {
        Self::new(v)
    }
}

impl From<HandicapLine> for f64 {
    fn from(line: HandicapLine) -> f64 {
        line.value()
    }
}

impl fmt::Display for HandicapLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+.1}", self.value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AsianHandicap {
    pub line: HandicapLine,
    /// Home covers, stake refunds removed.
    pub probability: f64,
    pub push_probability: f64,
    pub recommended: bool,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HalftimeFulltime {
    /// Keyed by two-letter code, half-time first: `HH`, `HD`, ... `AA`.
    pub probabilities: BTreeMap<String, f64>,
    pub most_likely: String,
    pub confidence: f64,
}

impl HalftimeFulltime {
    pub fn probability(&self, code: &str) -> Result<f64, ValidationError> {
        let (ht, ft) = parse_htft_code(code)?;
        let key = htft_code(ht, ft);
        Ok(self.probabilities.get(&key).copied().unwrap_or(0.0))
    }
}

/// Splits `HD` style codes into half-time and full-time outcomes.
pub fn parse_htft_code(code: &str) -> Result<(Outcome, Outcome), ValidationError> {
    let invalid = || ValidationError::InvalidCombination(code.to_string());
    let mut chars = code.trim().chars();
    let ht = chars.next().and_then(Outcome::from_letter).ok_or_else(invalid)?;
    let ft = chars.next().and_then(Outcome::from_letter).ok_or_else(invalid)?;
    if chars.next().is_some() {
        return Err(invalid());
    }
    Ok((ht, ft))
}

fn htft_code(ht: Outcome, ft: Outcome) -> String {
    format!("{}{}", ht.letter(), ft.letter())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CleanSheet {
    pub home: bool,
    pub away: bool,
    pub home_probability: f64,
    pub away_probability: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WinToNil {
    pub home: bool,
    pub away: bool,
    pub home_probability: f64,
    pub away_probability: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawNoBet {
    pub pick: Outcome,
    pub probability: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMarkets {
    pub over_under: OverUnder,
    pub btts: BothTeamsToScore,
    pub first_half: FirstHalf,
    pub corners: Corners,
    pub cards: Cards,
    pub possession: Possession,
    pub shots: Shots,
    pub double_chance: DoubleChance,
    pub asian_handicap: Vec<AsianHandicap>,
    pub halftime_fulltime: HalftimeFulltime,
    pub clean_sheet: CleanSheet,
    pub win_to_nil: WinToNil,
    pub draw_no_bet: DrawNoBet,
}

/// A market that exposes a numeric total, for interval and correlation reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericMarket {
    pub name: &'static str,
    pub total: f64,
    pub confidence: f64,
}

impl DerivedMarkets {
    /// Every market's confidence, handicap lines named individually.
    pub fn confidences(&self) -> Vec<(String, f64)> {
        let mut out = vec![
            ("over_under".to_string(), self.over_under.confidence),
            ("btts".to_string(), self.btts.confidence),
            ("first_half".to_string(), self.first_half.confidence),
            ("corners".to_string(), self.corners.confidence),
            ("cards".to_string(), self.cards.confidence),
            ("possession".to_string(), self.possession.confidence),
            ("shots".to_string(), self.shots.confidence),
            ("double_chance".to_string(), self.double_chance.confidence),
            ("halftime_fulltime".to_string(), self.halftime_fulltime.confidence),
            ("clean_sheet".to_string(), self.clean_sheet.confidence),
            ("win_to_nil".to_string(), self.win_to_nil.confidence),
            ("draw_no_bet".to_string(), self.draw_no_bet.confidence),
        ];
        out.extend(
            self.asian_handicap
                .iter()
                .map(|h| (format!("asian_handicap {}", h.line), h.confidence)),
        );
        out
    }

    pub fn numeric(&self) -> Vec<NumericMarket> {
        vec![
            NumericMarket {
                name: "over_under",
                total: self.over_under.total as f64,
                confidence: self.over_under.confidence,
            },
            NumericMarket {
                name: "corners",
                total: self.corners.total as f64,
                confidence: self.corners.confidence,
            },
            NumericMarket {
                name: "cards",
                total: self.cards.total as f64,
                confidence: self.cards.confidence,
            },
            NumericMarket {
                name: "shots",
                total: self.shots.total as f64,
                confidence: self.shots.confidence,
            },
        ]
    }

    pub fn handicap(&self, line: f64) -> Result<&AsianHandicap, ValidationError> {
        let line = HandicapLine::new(line)?;
        self.asian_handicap
            .iter()
            .find(|h| h.line == line)
            .ok_or(ValidationError::InvalidHandicapLine(line.value()))
    }
}

/// Expands the ensemble into secondary markets. Deterministic in its inputs.
pub fn generate(ensemble: &EnsembleForecast, ctx: &MatchContext) -> DerivedMarkets {
    let c = ensemble.confidence;
    let score = ensemble.score;
    let grid = ScoreGrid::poisson(ensemble.expected_home_goals, ensemble.expected_away_goals)
        .rescaled_to(&ensemble.probabilities);
    let home_strength = ctx.home_attacking_strength();
    let away_strength = ctx.away_attacking_strength();

    let first_half = first_half(score, c);
    let second = ScoreLine::new(
        score.home.saturating_sub(first_half.home),
        score.away.saturating_sub(first_half.away),
    );

    DerivedMarkets {
        over_under: OverUnder {
            total: score.total(),
            over_1_5: score.total() > 1,
            over_2_5: score.total() > 2,
            over_3_5: score.total() > 3,
            over_2_5_probability: grid.mass_where(|s| s.total() > 2),
            confidence: c * OVER_UNDER_DECAY,
        },
        btts: BothTeamsToScore {
            prediction: score.home > 0 && score.away > 0,
            probability: grid.mass_where(|s| s.home > 0 && s.away > 0),
            first_half: first_half.home > 0 && first_half.away > 0,
            second_half: second.home > 0 && second.away > 0,
            either_half: (first_half.home > 0 && first_half.away > 0)
                || (second.home > 0 && second.away > 0),
            confidence: c * BTTS_DECAY,
        },
        first_half,
        corners: corners(ctx, home_strength, away_strength, c),
        cards: cards(ctx, home_strength, away_strength, c),
        possession: possession(home_strength, away_strength, c),
        shots: shots(ctx.attacking_factor, home_strength, away_strength, c),
        double_chance: double_chance(&ensemble.probabilities, c),
        asian_handicap: HandicapLine::all()
            .map(|line| asian_handicap(&grid, line, c))
            .collect(),
        halftime_fulltime: halftime_fulltime(ensemble, c),
        clean_sheet: CleanSheet {
            home: score.away == 0,
            away: score.home == 0,
            home_probability: grid.mass_where(|s| s.away == 0),
            away_probability: grid.mass_where(|s| s.home == 0),
            confidence: c * CLEAN_SHEET_DECAY,
        },
        win_to_nil: WinToNil {
            home: score.home > 0 && score.away == 0,
            away: score.away > 0 && score.home == 0,
            home_probability: grid.mass_where(|s| s.home > 0 && s.away == 0),
            away_probability: grid.mass_where(|s| s.away > 0 && s.home == 0),
            confidence: c * WIN_TO_NIL_DECAY,
        },
        draw_no_bet: draw_no_bet(&ensemble.probabilities, c),
    }
}

fn first_half(score: ScoreLine, c: f64) -> FirstHalf {
    let home = share(score.home, FIRST_HALF_SHARE);
    let away = share(score.away, FIRST_HALF_SHARE);
    let first_total = home + away;
    let second_total = score.total().saturating_sub(first_total);
    let highest_scoring_half = if first_total > second_total {
        Half::First
    } else if second_total > first_total {
        Half::Second
    } else {
        Half::Equal
    };
    FirstHalf {
        home,
        away,
        total: first_total,
        outcome: Outcome::from_score(home, away),
        highest_scoring_half,
        confidence: c * FIRST_HALF_DECAY,
    }
}

fn corners(ctx: &MatchContext, home_strength: f64, away_strength: f64, c: f64) -> Corners {
    let total = (BASE_CORNERS * ctx.attacking_style.corner_factor()).round() as u32;
    let home = split(total, home_strength, away_strength);
    let first_half = share(total, CORNERS_FIRST_HALF_SHARE);
    Corners {
        total,
        home,
        away: total - home,
        over_8_5: total > 8,
        over_10_5: total > 10,
        first_half,
        second_half: total - first_half,
        confidence: c * CORNERS_DECAY,
    }
}

fn cards(ctx: &MatchContext, home_strength: f64, away_strength: f64, c: f64) -> Cards {
    let mut intensity = 1.0;
    if ctx.is_derby {
        intensity *= DERBY_CARD_FACTOR;
    }
    if ctx.importance == MatchImportance::High {
        intensity *= HIGH_IMPORTANCE_CARD_FACTOR;
    }
    let total = (BASE_CARDS * intensity).round() as u32;
    let red = if intensity > RED_CARD_INTENSITY {
        share(total, RED_CARD_SHARE).max(1).min(total)
    } else {
        0
    };
    // The weaker side is expected to pick up more bookings.
    let home = split(total, away_strength, home_strength);
    Cards {
        total,
        yellow: total - red,
        red,
        home,
        away: total - home,
        first_yellow_before: if ctx.is_derby { 30 } else { 45 },
        confidence: c * CARDS_DECAY,
    }
}

fn possession(home_strength: f64, away_strength: f64, c: f64) -> Possession {
    let home = split(100, home_strength, away_strength);
    let dominant = if home > 55 {
        Dominance::Home
    } else if home < 45 {
        Dominance::Away
    } else {
        Dominance::Balanced
    };
    Possession {
        home,
        away: 100 - home,
        dominant,
        confidence: c * POSSESSION_DECAY,
    }
}

fn shots(attacking_factor: f64, home_strength: f64, away_strength: f64, c: f64) -> Shots {
    let af = if attacking_factor.is_finite() {
        attacking_factor
    } else {
        0.0
    };
    let total = (BASE_SHOTS + af * 2.0).round().max(0.0) as u32;
    let home = split(total, home_strength, away_strength);
    Shots {
        total,
        on_target: share(total, ON_TARGET_SHARE),
        home,
        away: total - home,
        confidence: c * SHOTS_DECAY,
    }
}

fn double_chance(p: &OutcomeProbs, c: f64) -> DoubleChance {
    let selection = |probability: f64| Selection {
        probability,
        recommended: probability >= DOUBLE_CHANCE_THRESHOLD,
    };
    DoubleChance {
        home_or_draw: selection(p.home_win + p.draw),
        away_or_draw: selection(p.away_win + p.draw),
        home_or_away: selection(p.home_win + p.away_win),
        confidence: c * DOUBLE_CHANCE_DECAY,
    }
}

fn asian_handicap(grid: &ScoreGrid, line: HandicapLine, c: f64) -> AsianHandicap {
    let mut win = 0.0;
    let mut push = 0.0;
    for (gd, p) in grid.goal_difference() {
        let adjusted = 2 * gd + line.half_goals as i64;
        if adjusted > 0 {
            win += p;
        } else if adjusted == 0 {
            push += p;
        }
    }
    let probability = if push < 1.0 { win / (1.0 - push) } else { 0.0 };
    AsianHandicap {
        line,
        probability,
        push_probability: push,
        recommended: probability >= HANDICAP_THRESHOLD,
        confidence: c * HANDICAP_DECAY * (1.0 - 0.05 * line.value().abs()),
    }
}

// First half at 40% of each side's rate, second half at 60%, then the
// full-time columns are rescaled to the ensemble's outcome mass.
fn halftime_fulltime(ensemble: &EnsembleForecast, c: f64) -> HalftimeFulltime {
    let lh = ensemble.expected_home_goals.max(0.0);
    let la = ensemble.expected_away_goals.max(0.0);
    let ht_h = poisson_pmf(lh * FIRST_HALF_SHARE, HALF_GRID_MAX);
    let ht_a = poisson_pmf(la * FIRST_HALF_SHARE, HALF_GRID_MAX);
    let sh_h = poisson_pmf(lh * (1.0 - FIRST_HALF_SHARE), HALF_GRID_MAX);
    let sh_a = poisson_pmf(la * (1.0 - FIRST_HALF_SHARE), HALF_GRID_MAX);

    let mut joint: BTreeMap<(Outcome, Outcome), f64> = BTreeMap::new();
    for (i, pi) in ht_h.iter().enumerate() {
        for (j, pj) in ht_a.iter().enumerate() {
            let ht = Outcome::from_score(i as u32, j as u32);
            for (k, pk) in sh_h.iter().enumerate() {
                for (l, pl) in sh_a.iter().enumerate() {
                    let ft = Outcome::from_score((i + k) as u32, (j + l) as u32);
                    *joint.entry((ht, ft)).or_insert(0.0) += pi * pj * pk * pl;
                }
            }
        }
    }

    let target = ensemble.probabilities.normalized();
    let mut ft_mass = OutcomeProbs::default();
    for ((_, ft), p) in &joint {
        ft_mass.add(*ft, *p);
    }

    let mut probabilities = BTreeMap::new();
    for ht in Outcome::ALL {
        for ft in Outcome::ALL {
            let raw = joint.get(&(ht, ft)).copied().unwrap_or(0.0);
            let have = ft_mass.get(ft);
            let p = if have > 0.0 {
                raw * target.get(ft) / have
            } else {
                0.0
            };
            probabilities.insert(htft_code(ht, ft), p);
        }
    }

    let most_likely = probabilities
        .iter()
        .fold(None::<(&String, f64)>, |best, (code, p)| match best {
            Some((_, bp)) if bp >= *p => best,
            _ => Some((code, *p)),
        })
        .map(|(code, _)| code.clone())
        .unwrap_or_else(|| "DD".to_string());

    HalftimeFulltime {
        probabilities,
        most_likely,
        confidence: c * HTFT_DECAY,
    }
}

fn draw_no_bet(p: &OutcomeProbs, c: f64) -> DrawNoBet {
    let decided = p.home_win + p.away_win;
    let (pick, probability) = if decided <= 0.0 {
        (Outcome::HomeWin, 0.5)
    } else if p.home_win >= p.away_win {
        (Outcome::HomeWin, p.home_win / decided)
    } else {
        (Outcome::AwayWin, p.away_win / decided)
    };
    DrawNoBet {
        pick,
        probability,
        confidence: c * DRAW_NO_BET_DECAY,
    }
}

fn share(n: u32, fraction: f64) -> u32 {
    (n as f64 * fraction).round() as u32
}

/// The first side's rounded share of `total`, proportional to strength.
fn split(total: u32, first: f64, second: f64) -> u32 {
    let sum = first.max(0.0) + second.max(0.0);
    if sum <= 0.0 || !sum.is_finite() {
        return total / 2;
    }
    ((total as f64 * first.max(0.0) / sum).round() as u32).min(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handicap_lines_outside_fixed_set_are_rejected() {
        for bad in [0.25, -0.75, 2.5, -3.0, f64::NAN, f64::INFINITY] {
            assert!(HandicapLine::new(bad).is_err(), "{bad} should be rejected");
        }
        for good in HandicapLine::ALL {
            assert_eq!(HandicapLine::new(good).unwrap().value(), good);
        }
    }

    #[test]
    fn handicap_line_deserialize_validates() {
        let ok: HandicapLine = serde_json::from_str("-1.5").unwrap();
        assert_eq!(ok.value(), -1.5);
        assert!(serde_json::from_str::<HandicapLine>("0.75").is_err());
    }

    #[test]
    fn htft_codes_parse_and_reject() {
        assert_eq!(
            parse_htft_code("hd").unwrap(),
            (Outcome::HomeWin, Outcome::Draw)
        );
        for bad in ["", "H", "HX", "HDA", "XY"] {
            assert!(matches!(
                parse_htft_code(bad),
                Err(ValidationError::InvalidCombination(_))
            ));
        }
    }

    #[test]
    fn split_is_proportional_and_total_preserving() {
        assert_eq!(split(10, 3.0, 1.0), 8);
        assert_eq!(split(10, 0.0, 0.0), 5);
        assert_eq!(split(7, 1.0, 1.0), 4);
    }

    #[test]
    fn first_half_goes_to_second_half_when_low_scoring() {
        let fh = first_half(ScoreLine::new(1, 1), 0.8);
        assert_eq!((fh.home, fh.away), (0, 0));
        assert_eq!(fh.highest_scoring_half, Half::Second);
        assert!((fh.confidence - 0.56).abs() < 1e-12);
    }
}
